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
use crate::position::{Position, PositionService, PositionServiceError, PositionWorker};
use crate::web::AppState;

const PAGE_SIZE: u64 = 9;
const LIST_URL: &str = "/positions/";

#[derive(Debug, Deserialize)]
pub struct PositionListQuery {
    #[serde(default)]
    name: String,
    #[serde(default)]
    page: String,
}

#[derive(Debug, Deserialize)]
pub struct PositionForm {
    #[serde(default)]
    name: String,
}

/// Custom error type for position handler operations.
#[derive(Debug, thiserror::Error)]
enum PositionError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents a position service error.
    #[error("Position service error")]
    Service(#[from] PositionServiceError),
}

impl IntoResponse for PositionError {
    fn into_response(self) -> Response {
        match self {
            PositionError::Service(PositionServiceError::NotFound(_)) => (
                StatusCode::NOT_FOUND,
                Html("<h1>Not Found</h1><p>No position matches the given ID.</p>".to_string()),
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
#[template(path = "positions/list.html")]
struct PositionListTemplate {
    page: Page<Position>,
    query: String,
}

#[derive(Template)]
#[template(path = "positions/detail.html")]
struct PositionDetailTemplate {
    position: Position,
    workers: Vec<PositionWorker>,
}

#[derive(Template)]
#[template(path = "positions/form.html")]
struct PositionFormTemplate {
    title: &'static str,
    action: String,
    name: String,
    errors: FormErrors,
}

#[derive(Template)]
#[template(path = "positions/confirm_delete.html")]
struct PositionConfirmDeleteTemplate {
    position: Position,
}

/// Handler for GET /positions/ that lists positions with search and
/// pagination.
#[tracing::instrument(skip(state))]
async fn position_list_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PositionListQuery>,
) -> Result<Html<String>, PositionError> {
    let position_service = PositionService::new(&state.db);
    let page_number = params.page.parse().unwrap_or(1);
    let page = position_service
        .search(params.name.trim(), page_number, PAGE_SIZE)
        .await?;

    let template = PositionListTemplate {
        page,
        query: params.name,
    };
    template.render().map(Html).map_err(PositionError::from)
}

/// Handler for GET /positions/{id}/ that shows a position and its workers.
#[tracing::instrument(skip(state))]
async fn position_detail_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Html<String>, PositionError> {
    let position_service = PositionService::new(&state.db);
    let (position, workers) = position_service.get_with_workers(id).await?;

    let template = PositionDetailTemplate { position, workers };
    template.render().map(Html).map_err(PositionError::from)
}

/// Handler for GET /positions/create/ that shows an empty form.
#[tracing::instrument]
async fn position_create_page_handler() -> Result<Html<String>, PositionError> {
    let template = PositionFormTemplate {
        title: "Create position",
        action: "/positions/create/".to_string(),
        name: String::new(),
        errors: FormErrors::new(),
    };
    template.render().map(Html).map_err(PositionError::from)
}

/// Handler for POST /positions/create/.
#[tracing::instrument(skip(state))]
async fn position_create_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<PositionForm>,
) -> Result<Response, PositionError> {
    let mut errors = FormErrors::new();
    let name = form.name.trim().to_string();

    if require(&mut errors, "name", &name) {
        let position_service = PositionService::new(&state.db);
        match position_service.create(name.clone()).await {
            Ok(_) => return Ok(Redirect::to(LIST_URL).into_response()),
            Err(PositionServiceError::DuplicateName(_)) => {
                errors.add("name", "Position with this Name already exists.");
            }
            Err(err) => return Err(PositionError::Service(err)),
        }
    }

    let template = PositionFormTemplate {
        title: "Create position",
        action: "/positions/create/".to_string(),
        name,
        errors,
    };
    let html = template.render().map_err(PositionError::from)?;
    Ok(Html(html).into_response())
}

/// Handler for GET /positions/{id}/update/ that shows the prefilled form.
#[tracing::instrument(skip(state))]
async fn position_update_page_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Html<String>, PositionError> {
    let position_service = PositionService::new(&state.db);
    let position = position_service.get(id).await?;

    let template = PositionFormTemplate {
        title: "Update position",
        action: format!("/positions/{id}/update/"),
        name: position.name().to_string(),
        errors: FormErrors::new(),
    };
    template.render().map(Html).map_err(PositionError::from)
}

/// Handler for POST /positions/{id}/update/.
#[tracing::instrument(skip(state))]
async fn position_update_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Form(form): Form<PositionForm>,
) -> Result<Response, PositionError> {
    let mut errors = FormErrors::new();
    let name = form.name.trim().to_string();

    if require(&mut errors, "name", &name) {
        let position_service = PositionService::new(&state.db);
        match position_service.update(id, name.clone()).await {
            Ok(_) => return Ok(Redirect::to(LIST_URL).into_response()),
            Err(PositionServiceError::DuplicateName(_)) => {
                errors.add("name", "Position with this Name already exists.");
            }
            Err(err) => return Err(PositionError::Service(err)),
        }
    }

    let template = PositionFormTemplate {
        title: "Update position",
        action: format!("/positions/{id}/update/"),
        name,
        errors,
    };
    let html = template.render().map_err(PositionError::from)?;
    Ok(Html(html).into_response())
}

/// Handler for GET /positions/{id}/delete/ that asks for confirmation.
#[tracing::instrument(skip(state))]
async fn position_delete_page_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Html<String>, PositionError> {
    let position_service = PositionService::new(&state.db);
    let position = position_service.get(id).await?;

    let template = PositionConfirmDeleteTemplate { position };
    template.render().map(Html).map_err(PositionError::from)
}

/// Handler for POST /positions/{id}/delete/ that performs the deletion.
#[tracing::instrument(skip(state))]
async fn position_delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Redirect, PositionError> {
    let position_service = PositionService::new(&state.db);
    position_service.delete(id).await?;
    Ok(Redirect::to(LIST_URL))
}

/// Creates and returns the position router with all position routes.
pub fn create_position_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/positions/", get(position_list_handler))
        .route("/positions/{id}/", get(position_detail_handler))
        .route(
            "/positions/create/",
            get(position_create_page_handler).post(position_create_handler),
        )
        .route(
            "/positions/{id}/update/",
            get(position_update_page_handler).post(position_update_handler),
        )
        .route(
            "/positions/{id}/delete/",
            get(position_delete_page_handler).post(position_delete_handler),
        )
        .with_state(state)
}
