use askama::Template;
use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::Form;
use chrono::NaiveDateTime;
use sea_orm::Iterable;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::CurrentUser;
use crate::entities::task::Priority;
use crate::forms::{FormErrors, SelectOption, parse_deadline, require};
use crate::pagination::Page;
use crate::task::{NewTask, Task, TaskChanges, TaskService, TaskServiceError};
use crate::task_type::{TaskType, TaskTypeService, TaskTypeServiceError};
use crate::web::AppState;
use crate::worker::{Worker, WorkerService, WorkerServiceError};

const PAGE_SIZE: u64 = 5;
const LIST_URL: &str = "/tasks/";

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    #[serde(default)]
    name: String,
    #[serde(default)]
    page: String,
}

/// Form payload for creating or updating a task. The assignees select is
/// multi-valued, hence the `axum_extra` form extractor on the handlers.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct TaskForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    deadline: String,
    #[serde(default)]
    priority: String,
    #[serde(default)]
    task_type: String,
    #[serde(default)]
    assignees: Vec<String>,
}

/// Hidden field posted with the completion and assignment toggles so the
/// handler can send the user back to the list page they came from. The
/// detail page posts no page at all.
#[derive(Debug, Deserialize, Default)]
pub struct ToggleForm {
    #[serde(default)]
    page: String,
}

/// Custom error type for task handler operations.
#[derive(Debug, thiserror::Error)]
enum TaskError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents a task service error.
    #[error("Task service error")]
    Service(#[from] TaskServiceError),
    /// Represents a task type service error.
    #[error("Task type service error")]
    TaskType(#[from] TaskTypeServiceError),
    /// Represents a worker service error.
    #[error("Worker service error")]
    Worker(#[from] WorkerServiceError),
    /// Represents a logged-in user without a matching worker row.
    #[error("No worker account for the current user")]
    UnknownAccount,
}

impl IntoResponse for TaskError {
    fn into_response(self) -> Response {
        match self {
            TaskError::Service(TaskServiceError::NotFound(_)) => (
                StatusCode::NOT_FOUND,
                Html("<h1>Not Found</h1><p>No task matches the given ID.</p>".to_string()),
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
#[template(path = "tasks/list.html")]
struct TaskListTemplate {
    page: Page<Task>,
    query: String,
    username: String,
}

#[derive(Template)]
#[template(path = "tasks/detail.html")]
struct TaskDetailTemplate {
    task: Task,
    assigned_to_me: bool,
}

#[derive(Template)]
#[template(path = "tasks/form.html")]
struct TaskFormTemplate {
    title: &'static str,
    action: String,
    name: String,
    description: String,
    deadline: String,
    priorities: Vec<SelectOption>,
    task_types: Vec<SelectOption>,
    assignees: Vec<SelectOption>,
    errors: FormErrors,
}

#[derive(Template)]
#[template(path = "tasks/confirm_delete.html")]
struct TaskConfirmDeleteTemplate {
    task: Task,
}

fn priority_options(selected: Option<Priority>) -> Vec<SelectOption> {
    Priority::iter()
        .map(|priority| {
            SelectOption::new(priority.value(), priority.label(), selected == Some(priority))
        })
        .collect()
}

fn task_type_options(task_types: Vec<TaskType>, selected: Option<i32>) -> Vec<SelectOption> {
    task_types
        .into_iter()
        .map(|t| SelectOption::new(t.id().to_string(), t.name(), selected == Some(t.id())))
        .collect()
}

fn assignee_options(workers: Vec<Worker>, selected: &[i32]) -> Vec<SelectOption> {
    workers
        .into_iter()
        .map(|w| {
            SelectOption::new(
                w.id().to_string(),
                w.username(),
                selected.contains(&w.id()),
            )
        })
        .collect()
}

/// Values extracted from a [`TaskForm`] during validation.
#[derive(Debug, Default)]
struct ParsedTaskForm {
    deadline: Option<NaiveDateTime>,
    priority: Option<Priority>,
    task_type_id: Option<i32>,
    assignee_ids: Vec<i32>,
}

fn validate_task(form: &TaskForm) -> (FormErrors, ParsedTaskForm) {
    let mut errors = FormErrors::new();
    let mut parsed = ParsedTaskForm::default();

    require(&mut errors, "name", &form.name);
    require(&mut errors, "description", &form.description);

    if require(&mut errors, "deadline", &form.deadline) {
        parsed.deadline = parse_deadline(&form.deadline);
        if parsed.deadline.is_none() {
            errors.add("deadline", "Enter a valid date/time.");
        }
    }

    if require(&mut errors, "priority", &form.priority) {
        parsed.priority = Priority::parse(form.priority.trim());
        if parsed.priority.is_none() {
            errors.add("priority", "Select a valid choice.");
        }
    }

    if require(&mut errors, "task_type", &form.task_type) {
        parsed.task_type_id = form.task_type.trim().parse().ok();
        if parsed.task_type_id.is_none() {
            errors.add("task_type", "Select a valid choice.");
        }
    }

    for value in &form.assignees {
        match value.trim().parse() {
            Ok(id) => parsed.assignee_ids.push(id),
            Err(_) => {
                errors.add("assignees", "Select a valid choice.");
                break;
            }
        }
    }

    (errors, parsed)
}

/// Handler for GET /tasks/ that lists tasks ordered by deadline, with search
/// by name and pagination.
#[tracing::instrument(skip(state))]
async fn task_list_handler(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Query(params): Query<TaskListQuery>,
) -> Result<Html<String>, TaskError> {
    let task_service = TaskService::new(&state.db);
    let page_number = params.page.parse().unwrap_or(1);
    let page = task_service
        .search(params.name.trim(), page_number, PAGE_SIZE)
        .await?;

    let template = TaskListTemplate {
        page,
        query: params.name,
        username: current_user.username,
    };
    template.render().map(Html).map_err(TaskError::from)
}

/// Handler for GET /tasks/{id}/ that shows a task with its type and
/// assignees.
#[tracing::instrument(skip(state))]
async fn task_detail_handler(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Html<String>, TaskError> {
    let task_service = TaskService::new(&state.db);
    let task = task_service.get(id).await?;
    let assigned_to_me = task
        .assignees()
        .iter()
        .any(|assignee| assignee.username == current_user.username);

    let template = TaskDetailTemplate {
        task,
        assigned_to_me,
    };
    template.render().map(Html).map_err(TaskError::from)
}

async fn form_options(
    state: &AppState,
    selected_priority: Option<Priority>,
    selected_task_type: Option<i32>,
    selected_assignees: &[i32],
) -> Result<(Vec<SelectOption>, Vec<SelectOption>, Vec<SelectOption>), TaskError> {
    let task_types = TaskTypeService::new(&state.db).all().await?;
    let workers = WorkerService::new(&state.db).all().await?;
    Ok((
        priority_options(selected_priority),
        task_type_options(task_types, selected_task_type),
        assignee_options(workers, selected_assignees),
    ))
}

/// Handler for GET /tasks/create/ that shows an empty creation form.
#[tracing::instrument(skip(state))]
async fn task_create_page_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Html<String>, TaskError> {
    let (priorities, task_types, assignees) = form_options(&state, None, None, &[]).await?;
    let template = TaskFormTemplate {
        title: "Create task",
        action: "/tasks/create/".to_string(),
        name: String::new(),
        description: String::new(),
        deadline: String::new(),
        priorities,
        task_types,
        assignees,
        errors: FormErrors::new(),
    };
    template.render().map(Html).map_err(TaskError::from)
}

/// Handler for POST /tasks/create/.
#[tracing::instrument(skip(state, form))]
async fn task_create_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<TaskForm>,
) -> Result<Response, TaskError> {
    let (mut errors, parsed) = validate_task(&form);

    if errors.is_empty() {
        let task_service = TaskService::new(&state.db);
        let new_task = NewTask {
            name: form.name.trim().to_string(),
            description: form.description.trim().to_string(),
            deadline: parsed.deadline.unwrap_or_default(),
            priority: parsed.priority.unwrap_or(Priority::Medium),
            task_type_id: parsed.task_type_id.unwrap_or_default(),
            assignee_ids: parsed.assignee_ids.clone(),
        };
        match task_service.create(new_task).await {
            Ok(_) => return Ok(Redirect::to(LIST_URL).into_response()),
            Err(TaskServiceError::DuplicateName(_)) => {
                errors.add("name", "Task with this Name already exists.");
            }
            Err(TaskServiceError::UnknownTaskType(_)) => {
                errors.add("task_type", "Select a valid choice.");
            }
            Err(TaskServiceError::UnknownAssignee(_)) => {
                errors.add("assignees", "Select a valid choice.");
            }
            Err(err) => return Err(TaskError::Service(err)),
        }
    }

    let (priorities, task_types, assignees) = form_options(
        &state,
        parsed.priority,
        parsed.task_type_id,
        &parsed.assignee_ids,
    )
    .await?;
    let template = TaskFormTemplate {
        title: "Create task",
        action: "/tasks/create/".to_string(),
        name: form.name,
        description: form.description,
        deadline: form.deadline,
        priorities,
        task_types,
        assignees,
        errors,
    };
    let html = template.render().map_err(TaskError::from)?;
    Ok(Html(html).into_response())
}

/// Handler for GET /tasks/{id}/update/ that shows the prefilled form.
#[tracing::instrument(skip(state))]
async fn task_update_page_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Html<String>, TaskError> {
    let task_service = TaskService::new(&state.db);
    let task = task_service.get(id).await?;
    let (priorities, task_types, assignees) = form_options(
        &state,
        Some(task.priority()),
        Some(task.task_type_id()),
        &task.assignee_ids(),
    )
    .await?;

    let template = TaskFormTemplate {
        title: "Update task",
        action: format!("/tasks/{id}/update/"),
        name: task.name().to_string(),
        description: task.description().to_string(),
        deadline: task.deadline().format("%Y-%m-%dT%H:%M").to_string(),
        priorities,
        task_types,
        assignees,
        errors: FormErrors::new(),
    };
    template.render().map(Html).map_err(TaskError::from)
}

/// Handler for POST /tasks/{id}/update/. The completion flag is left alone;
/// it only changes through the done toggle.
#[tracing::instrument(skip(state, form))]
async fn task_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Form(form): Form<TaskForm>,
) -> Result<Response, TaskError> {
    let (mut errors, parsed) = validate_task(&form);

    if errors.is_empty() {
        let task_service = TaskService::new(&state.db);
        let changes = TaskChanges {
            name: form.name.trim().to_string(),
            description: form.description.trim().to_string(),
            deadline: parsed.deadline.unwrap_or_default(),
            priority: parsed.priority.unwrap_or(Priority::Medium),
            task_type_id: parsed.task_type_id.unwrap_or_default(),
            assignee_ids: parsed.assignee_ids.clone(),
        };
        match task_service.update(id, changes).await {
            Ok(_) => return Ok(Redirect::to(LIST_URL).into_response()),
            Err(TaskServiceError::DuplicateName(_)) => {
                errors.add("name", "Task with this Name already exists.");
            }
            Err(TaskServiceError::UnknownTaskType(_)) => {
                errors.add("task_type", "Select a valid choice.");
            }
            Err(TaskServiceError::UnknownAssignee(_)) => {
                errors.add("assignees", "Select a valid choice.");
            }
            Err(err) => return Err(TaskError::Service(err)),
        }
    }

    let (priorities, task_types, assignees) = form_options(
        &state,
        parsed.priority,
        parsed.task_type_id,
        &parsed.assignee_ids,
    )
    .await?;
    let template = TaskFormTemplate {
        title: "Update task",
        action: format!("/tasks/{id}/update/"),
        name: form.name,
        description: form.description,
        deadline: form.deadline,
        priorities,
        task_types,
        assignees,
        errors,
    };
    let html = template.render().map_err(TaskError::from)?;
    Ok(Html(html).into_response())
}

/// Handler for GET /tasks/{id}/delete/ that asks for confirmation.
#[tracing::instrument(skip(state))]
async fn task_delete_page_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Html<String>, TaskError> {
    let task_service = TaskService::new(&state.db);
    let task = task_service.get(id).await?;

    let template = TaskConfirmDeleteTemplate { task };
    template.render().map(Html).map_err(TaskError::from)
}

/// Handler for POST /tasks/{id}/delete/ that performs the deletion.
#[tracing::instrument(skip(state))]
async fn task_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Redirect, TaskError> {
    let task_service = TaskService::new(&state.db);
    task_service.delete(id).await?;
    Ok(Redirect::to(LIST_URL))
}

fn list_url_for_page(page: &str) -> String {
    let page: u64 = page.parse().unwrap_or(1);
    format!("{LIST_URL}?page={page}")
}

/// Handler for POST /tasks/{id}/done/ that flips the completion flag and
/// sends the user back to the list page they toggled from. Other methods get
/// a 405 from the router.
#[tracing::instrument(skip(state, form))]
async fn task_done_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Form(form): Form<ToggleForm>,
) -> Result<Redirect, TaskError> {
    let task_service = TaskService::new(&state.db);
    task_service.toggle_completed(id).await?;
    Ok(Redirect::to(&list_url_for_page(&form.page)))
}

/// Handler for POST /tasks/{id}/toggle-assign/ that assigns the current user
/// to the task, or unassigns them if already assigned.
#[tracing::instrument(skip(state, form))]
async fn task_toggle_assign_handler(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Form(form): Form<ToggleForm>,
) -> Result<Redirect, TaskError> {
    let worker_service = WorkerService::new(&state.db);
    let worker = worker_service
        .find_by_username(&current_user.username)
        .await?
        .ok_or(TaskError::UnknownAccount)?;

    let task_service = TaskService::new(&state.db);
    task_service.toggle_assignment(id, worker.id).await?;

    if form.page.is_empty() {
        Ok(Redirect::to(&format!("/tasks/{id}/")))
    } else {
        Ok(Redirect::to(&list_url_for_page(&form.page)))
    }
}

/// Creates and returns the task router with all task routes.
pub fn create_task_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tasks/", get(task_list_handler))
        .route("/tasks/{id}/", get(task_detail_handler))
        .route(
            "/tasks/create/",
            get(task_create_page_handler).post(task_create_handler),
        )
        .route(
            "/tasks/{id}/update/",
            get(task_update_page_handler).post(task_update_handler),
        )
        .route(
            "/tasks/{id}/delete/",
            get(task_delete_page_handler).post(task_delete_handler),
        )
        .route("/tasks/{id}/done/", post(task_done_handler))
        .route(
            "/tasks/{id}/toggle-assign/",
            post(task_toggle_assign_handler),
        )
        .with_state(state)
}
