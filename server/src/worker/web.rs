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

use crate::auth::hash_password;
use crate::forms::{FormErrors, SelectOption, parse_optional_id, require};
use crate::pagination::Page;
use crate::position::{Position, PositionService, PositionServiceError};
use crate::web::AppState;
use crate::worker::{AssignedTask, NewWorker, Worker, WorkerChanges, WorkerService, WorkerServiceError};

const PAGE_SIZE: u64 = 5;
const LIST_URL: &str = "/workers/";

#[derive(Debug, Deserialize)]
pub struct WorkerListQuery {
    #[serde(default)]
    query: String,
    #[serde(default)]
    page: String,
}

/// Form payload for creating a worker.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct WorkerCreateForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password1: String,
    #[serde(default)]
    password2: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    position: String,
}

/// Form payload for updating a worker. The password is not editable here.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct WorkerUpdateForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    position: String,
}

/// Custom error type for worker handler operations.
#[derive(Debug, thiserror::Error)]
enum WorkerError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents a worker service error.
    #[error("Worker service error")]
    Service(#[from] WorkerServiceError),
    /// Represents a position service error.
    #[error("Position service error")]
    Position(#[from] PositionServiceError),
    /// Represents a password hashing failure.
    #[error("Password hashing failed")]
    PasswordHash,
}

impl IntoResponse for WorkerError {
    fn into_response(self) -> Response {
        match self {
            WorkerError::Service(WorkerServiceError::NotFound(_)) => (
                StatusCode::NOT_FOUND,
                Html("<h1>Not Found</h1><p>No worker matches the given ID.</p>".to_string()),
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
#[template(path = "workers/list.html")]
struct WorkerListTemplate {
    page: Page<Worker>,
    query: String,
}

#[derive(Template)]
#[template(path = "workers/detail.html")]
struct WorkerDetailTemplate {
    worker: Worker,
    completed_tasks: Vec<AssignedTask>,
    incomplete_tasks: Vec<AssignedTask>,
}

#[derive(Template)]
#[template(path = "workers/form.html")]
struct WorkerFormTemplate {
    title: &'static str,
    action: String,
    username: String,
    first_name: String,
    last_name: String,
    email: String,
    positions: Vec<SelectOption>,
    errors: FormErrors,
    with_password: bool,
}

#[derive(Template)]
#[template(path = "workers/confirm_delete.html")]
struct WorkerConfirmDeleteTemplate {
    worker: Worker,
}

fn position_options(positions: Vec<Position>, selected: Option<i32>) -> Vec<SelectOption> {
    positions
        .into_iter()
        .map(|p| SelectOption::new(p.id().to_string(), p.name(), selected == Some(p.id())))
        .collect()
}

/// Handler for GET /workers/ that lists workers with search and pagination.
/// The query matches username, first name or last name.
#[tracing::instrument(skip(state))]
async fn worker_list_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WorkerListQuery>,
) -> Result<Html<String>, WorkerError> {
    let worker_service = WorkerService::new(&state.db);
    let page_number = params.page.parse().unwrap_or(1);
    let page = worker_service
        .search(params.query.trim(), page_number, PAGE_SIZE)
        .await?;

    let template = WorkerListTemplate {
        page,
        query: params.query,
    };
    template.render().map(Html).map_err(WorkerError::from)
}

/// Handler for GET /workers/{id}/ that shows a worker and their tasks split
/// into completed and incomplete.
#[tracing::instrument(skip(state))]
async fn worker_detail_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Html<String>, WorkerError> {
    let worker_service = WorkerService::new(&state.db);
    let worker = worker_service.get(id).await?;
    let (completed_tasks, incomplete_tasks): (Vec<AssignedTask>, Vec<AssignedTask>) =
        worker_service
            .assigned_tasks(id)
            .await?
            .into_iter()
            .partition(|task| task.is_completed);

    let template = WorkerDetailTemplate {
        worker,
        completed_tasks,
        incomplete_tasks,
    };
    template.render().map(Html).map_err(WorkerError::from)
}

/// Handler for GET /workers/create/ that shows an empty creation form.
#[tracing::instrument(skip(state))]
async fn worker_create_page_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Html<String>, WorkerError> {
    let positions = PositionService::new(&state.db).all().await?;
    let template = WorkerFormTemplate {
        title: "Create worker",
        action: "/workers/create/".to_string(),
        username: String::new(),
        first_name: String::new(),
        last_name: String::new(),
        email: String::new(),
        positions: position_options(positions, None),
        errors: FormErrors::new(),
        with_password: true,
    };
    template.render().map(Html).map_err(WorkerError::from)
}

fn validate_create(form: &WorkerCreateForm) -> (FormErrors, Option<i32>) {
    let mut errors = FormErrors::new();

    require(&mut errors, "username", &form.username);
    require(&mut errors, "password1", &form.password1);
    if require(&mut errors, "password2", &form.password2)
        && !form.password1.is_empty()
        && form.password1 != form.password2
    {
        errors.add("password2", "Passwords don't match.");
    }
    if !form.email.trim().is_empty() && !form.email.contains('@') {
        errors.add("email", "Enter a valid email address.");
    }
    let position_id = parse_optional_id(&mut errors, "position", &form.position);

    (errors, position_id)
}

/// Handler for POST /workers/create/.
#[tracing::instrument(skip(state, form))]
async fn worker_create_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<WorkerCreateForm>,
) -> Result<Response, WorkerError> {
    let (mut errors, position_id) = validate_create(&form);

    if errors.is_empty() {
        let worker_service = WorkerService::new(&state.db);
        let new_worker = NewWorker {
            username: form.username.trim().to_string(),
            password_hash: hash_password(&form.password1).map_err(|_| WorkerError::PasswordHash)?,
            first_name: form.first_name.trim().to_string(),
            last_name: form.last_name.trim().to_string(),
            email: form.email.trim().to_string(),
            position_id,
        };
        match worker_service.create(new_worker).await {
            Ok(_) => return Ok(Redirect::to(LIST_URL).into_response()),
            Err(WorkerServiceError::DuplicateUsername(_)) => {
                errors.add("username", "A user with that username already exists.");
            }
            Err(WorkerServiceError::UnknownPosition(_)) => {
                errors.add("position", "Select a valid choice.");
            }
            Err(err) => return Err(WorkerError::Service(err)),
        }
    }

    let positions = PositionService::new(&state.db).all().await?;
    let template = WorkerFormTemplate {
        title: "Create worker",
        action: "/workers/create/".to_string(),
        username: form.username,
        first_name: form.first_name,
        last_name: form.last_name,
        email: form.email,
        positions: position_options(positions, position_id),
        errors,
        with_password: true,
    };
    let html = template.render().map_err(WorkerError::from)?;
    Ok(Html(html).into_response())
}

/// Handler for GET /workers/{id}/update/ that shows the prefilled form.
#[tracing::instrument(skip(state))]
async fn worker_update_page_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Html<String>, WorkerError> {
    let worker_service = WorkerService::new(&state.db);
    let worker = worker_service.get(id).await?;
    let positions = PositionService::new(&state.db).all().await?;

    let template = WorkerFormTemplate {
        title: "Update worker",
        action: format!("/workers/{id}/update/"),
        username: worker.username().to_string(),
        first_name: worker.first_name().to_string(),
        last_name: worker.last_name().to_string(),
        email: worker.email().to_string(),
        positions: position_options(positions, worker.position_id()),
        errors: FormErrors::new(),
        with_password: false,
    };
    template.render().map(Html).map_err(WorkerError::from)
}

fn validate_update(form: &WorkerUpdateForm) -> (FormErrors, Option<i32>) {
    let mut errors = FormErrors::new();

    require(&mut errors, "username", &form.username);
    if !form.email.trim().is_empty() && !form.email.contains('@') {
        errors.add("email", "Enter a valid email address.");
    }
    let position_id = parse_optional_id(&mut errors, "position", &form.position);

    (errors, position_id)
}

/// Handler for POST /workers/{id}/update/. The password stays untouched.
#[tracing::instrument(skip(state, form))]
async fn worker_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Form(form): Form<WorkerUpdateForm>,
) -> Result<Response, WorkerError> {
    let (mut errors, position_id) = validate_update(&form);

    if errors.is_empty() {
        let worker_service = WorkerService::new(&state.db);
        let changes = WorkerChanges {
            username: form.username.trim().to_string(),
            first_name: form.first_name.trim().to_string(),
            last_name: form.last_name.trim().to_string(),
            email: form.email.trim().to_string(),
            position_id,
        };
        match worker_service.update(id, changes).await {
            Ok(_) => return Ok(Redirect::to(LIST_URL).into_response()),
            Err(WorkerServiceError::DuplicateUsername(_)) => {
                errors.add("username", "A user with that username already exists.");
            }
            Err(WorkerServiceError::UnknownPosition(_)) => {
                errors.add("position", "Select a valid choice.");
            }
            Err(err) => return Err(WorkerError::Service(err)),
        }
    }

    let positions = PositionService::new(&state.db).all().await?;
    let template = WorkerFormTemplate {
        title: "Update worker",
        action: format!("/workers/{id}/update/"),
        username: form.username,
        first_name: form.first_name,
        last_name: form.last_name,
        email: form.email,
        positions: position_options(positions, position_id),
        errors,
        with_password: false,
    };
    let html = template.render().map_err(WorkerError::from)?;
    Ok(Html(html).into_response())
}

/// Handler for GET /workers/{id}/delete/ that asks for confirmation.
#[tracing::instrument(skip(state))]
async fn worker_delete_page_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Html<String>, WorkerError> {
    let worker_service = WorkerService::new(&state.db);
    let worker = worker_service.get(id).await?;

    let template = WorkerConfirmDeleteTemplate { worker };
    template.render().map(Html).map_err(WorkerError::from)
}

/// Handler for POST /workers/{id}/delete/ that performs the deletion.
#[tracing::instrument(skip(state))]
async fn worker_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Redirect, WorkerError> {
    let worker_service = WorkerService::new(&state.db);
    worker_service.delete(id).await?;
    Ok(Redirect::to(LIST_URL))
}

/// Creates and returns the worker router with all worker routes.
pub fn create_worker_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/workers/", get(worker_list_handler))
        .route("/workers/{id}/", get(worker_detail_handler))
        .route(
            "/workers/create/",
            get(worker_create_page_handler).post(worker_create_handler),
        )
        .route(
            "/workers/{id}/update/",
            get(worker_update_page_handler).post(worker_update_handler),
        )
        .route(
            "/workers/{id}/delete/",
            get(worker_delete_page_handler).post(worker_delete_handler),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_form_requires_matching_passwords() {
        let form = WorkerCreateForm {
            username: "john".to_string(),
            password1: "one-password".to_string(),
            password2: "another-password".to_string(),
            ..Default::default()
        };
        let (errors, _) = validate_create(&form);
        assert_eq!(errors.field("password2"), ["Passwords don't match."]);
    }

    #[test]
    fn create_form_accepts_blank_optional_fields() {
        let form = WorkerCreateForm {
            username: "john".to_string(),
            password1: "pass".to_string(),
            password2: "pass".to_string(),
            ..Default::default()
        };
        let (errors, position_id) = validate_create(&form);
        assert!(errors.is_empty());
        assert_eq!(position_id, None);
    }

    #[test]
    fn update_form_has_no_password_requirement() {
        let form = WorkerUpdateForm {
            username: "john".to_string(),
            position: "3".to_string(),
            ..Default::default()
        };
        let (errors, position_id) = validate_update(&form);
        assert!(errors.is_empty());
        assert_eq!(position_id, Some(3));
    }

    #[test]
    fn forms_reject_malformed_email() {
        let form = WorkerUpdateForm {
            username: "john".to_string(),
            email: "not-an-email".to_string(),
            ..Default::default()
        };
        let (errors, _) = validate_update(&form);
        assert!(errors.has("email"));
    }
}
