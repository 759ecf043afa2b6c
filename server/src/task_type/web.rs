use askama::Template;
use axum::{
    Form, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::forms::{FormErrors, require};
use crate::pagination::Page;
use crate::task_type::{TaskType, TaskTypeService, TaskTypeServiceError, TypeTask};
use crate::web::AppState;

const PAGE_SIZE: u64 = 9;
const LIST_URL: &str = "/task-types/";

#[derive(Debug, Deserialize)]
pub struct TaskTypeListQuery {
    #[serde(default)]
    name: String,
    #[serde(default)]
    page: String,
}

#[derive(Debug, Deserialize)]
pub struct TaskTypeForm {
    #[serde(default)]
    name: String,
}

/// Custom error type for task type handler operations.
#[derive(Debug, thiserror::Error)]
enum TaskTypeError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents a task type service error.
    #[error("Task type service error")]
    Service(#[from] TaskTypeServiceError),
}

impl IntoResponse for TaskTypeError {
    fn into_response(self) -> Response {
        match self {
            TaskTypeError::Service(TaskTypeServiceError::NotFound(_)) => (
                StatusCode::NOT_FOUND,
                Html("<h1>Not Found</h1><p>No task type matches the given ID.</p>".to_string()),
            )
                .into_response(),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(
                    "<h1>Internal Server Error</h1><p>An unexpected error occurred while \
                     processing your request. Please try again later.</p>"
                        .to_string(),
                ),
            )
                .into_response(),
        }
    }
}

#[derive(Template)]
#[template(path = "task_types/list.html")]
struct TaskTypeListTemplate {
    page: Page<TaskType>,
    query: String,
}

#[derive(Template)]
#[template(path = "task_types/detail.html")]
struct TaskTypeDetailTemplate {
    task_type: TaskType,
    tasks: Vec<TypeTask>,
}

#[derive(Template)]
#[template(path = "task_types/form.html")]
struct TaskTypeFormTemplate {
    title: &'static str,
    action: String,
    name: String,
    errors: FormErrors,
}

#[derive(Template)]
#[template(path = "task_types/confirm_delete.html")]
struct TaskTypeConfirmDeleteTemplate {
    task_type: TaskType,
    task_count: usize,
}

/// Handler for GET /task-types/ that lists task types with search and
/// pagination.
#[tracing::instrument(skip(state))]
async fn task_type_list_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TaskTypeListQuery>,
) -> Result<Html<String>, TaskTypeError> {
    let task_type_service = TaskTypeService::new(&state.db);
    let page_number = params.page.parse().unwrap_or(1);
    let page = task_type_service
        .search(params.name.trim(), page_number, PAGE_SIZE)
        .await?;

    let template = TaskTypeListTemplate {
        page,
        query: params.name,
    };
    template.render().map(Html).map_err(TaskTypeError::from)
}

/// Handler for GET /task-types/{id}/ that shows a task type and its tasks.
#[tracing::instrument(skip(state))]
async fn task_type_detail_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Html<String>, TaskTypeError> {
    let task_type_service = TaskTypeService::new(&state.db);
    let (task_type, tasks) = task_type_service.get_with_tasks(id).await?;

    let template = TaskTypeDetailTemplate { task_type, tasks };
    template.render().map(Html).map_err(TaskTypeError::from)
}

/// Handler for GET /task-types/create/ that shows an empty form.
#[tracing::instrument]
async fn task_type_create_page_handler() -> Result<Html<String>, TaskTypeError> {
    let template = TaskTypeFormTemplate {
        title: "Create task type",
        action: "/task-types/create/".to_string(),
        name: String::new(),
        errors: FormErrors::new(),
    };
    template.render().map(Html).map_err(TaskTypeError::from)
}

/// Handler for POST /task-types/create/.
#[tracing::instrument(skip(state))]
async fn task_type_create_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<TaskTypeForm>,
) -> Result<Response, TaskTypeError> {
    let mut errors = FormErrors::new();
    let name = form.name.trim().to_string();

    if require(&mut errors, "name", &name) {
        let task_type_service = TaskTypeService::new(&state.db);
        match task_type_service.create(name.clone()).await {
            Ok(_) => return Ok(Redirect::to(LIST_URL).into_response()),
            Err(TaskTypeServiceError::DuplicateName(_)) => {
                errors.add("name", "Task type with this Name already exists.");
            }
            Err(err) => return Err(TaskTypeError::Service(err)),
        }
    }

    let template = TaskTypeFormTemplate {
        title: "Create task type",
        action: "/task-types/create/".to_string(),
        name,
        errors,
    };
    let html = template.render().map_err(TaskTypeError::from)?;
    Ok(Html(html).into_response())
}

/// Handler for GET /task-types/{id}/update/ that shows the prefilled form.
#[tracing::instrument(skip(state))]
async fn task_type_update_page_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Html<String>, TaskTypeError> {
    let task_type_service = TaskTypeService::new(&state.db);
    let task_type = task_type_service.get(id).await?;

    let template = TaskTypeFormTemplate {
        title: "Update task type",
        action: format!("/task-types/{id}/update/"),
        name: task_type.name().to_string(),
        errors: FormErrors::new(),
    };
    template.render().map(Html).map_err(TaskTypeError::from)
}

/// Handler for POST /task-types/{id}/update/.
#[tracing::instrument(skip(state))]
async fn task_type_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Form(form): Form<TaskTypeForm>,
) -> Result<Response, TaskTypeError> {
    let mut errors = FormErrors::new();
    let name = form.name.trim().to_string();

    if require(&mut errors, "name", &name) {
        let task_type_service = TaskTypeService::new(&state.db);
        match task_type_service.update(id, name.clone()).await {
            Ok(_) => return Ok(Redirect::to(LIST_URL).into_response()),
            Err(TaskTypeServiceError::DuplicateName(_)) => {
                errors.add("name", "Task type with this Name already exists.");
            }
            Err(err) => return Err(TaskTypeError::Service(err)),
        }
    }

    let template = TaskTypeFormTemplate {
        title: "Update task type",
        action: format!("/task-types/{id}/update/"),
        name,
        errors,
    };
    let html = template.render().map_err(TaskTypeError::from)?;
    Ok(Html(html).into_response())
}

/// Handler for GET /task-types/{id}/delete/ that asks for confirmation and
/// warns about the cascade.
#[tracing::instrument(skip(state))]
async fn task_type_delete_page_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Html<String>, TaskTypeError> {
    let task_type_service = TaskTypeService::new(&state.db);
    let (task_type, tasks) = task_type_service.get_with_tasks(id).await?;

    let template = TaskTypeConfirmDeleteTemplate {
        task_type,
        task_count: tasks.len(),
    };
    template.render().map(Html).map_err(TaskTypeError::from)
}

/// Handler for POST /task-types/{id}/delete/ that deletes the type and its
/// tasks.
#[tracing::instrument(skip(state))]
async fn task_type_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Redirect, TaskTypeError> {
    let task_type_service = TaskTypeService::new(&state.db);
    task_type_service.delete(id).await?;
    Ok(Redirect::to(LIST_URL))
}

/// Creates and returns the task type router with all task type routes.
pub fn create_task_type_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/task-types/", get(task_type_list_handler))
        .route("/task-types/{id}/", get(task_type_detail_handler))
        .route(
            "/task-types/create/",
            get(task_type_create_page_handler).post(task_type_create_handler),
        )
        .route(
            "/task-types/{id}/update/",
            get(task_type_update_page_handler).post(task_type_update_handler),
        )
        .route(
            "/task-types/{id}/delete/",
            get(task_type_delete_page_handler).post(task_type_delete_handler),
        )
        .with_state(state)
}
