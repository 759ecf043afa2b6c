use askama::Template;
use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::http::header;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::Html;
use migration::MigratorTrait;
use sea_orm::Database;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceBuilder;
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::{
    AuthState, CurrentUser, FilteredMakeSpan, auth_user_middleware, create_auth_router,
    ensure_admin, login_redirect_middleware,
};
use crate::config;
use crate::pagination::Page;
use crate::position::web::create_position_router;
use crate::position::{PositionService, PositionServiceError};
use crate::task::web::create_task_router;
use crate::task::{Task, TaskService, TaskServiceError};
use crate::task_type::web::create_task_type_router;
use crate::task_type::{TaskTypeService, TaskTypeServiceError};
use crate::worker::web::create_worker_router;
use crate::worker::{WorkerService, WorkerServiceError};

const DASHBOARD_PAGE_SIZE: u64 = 5;

/// Shared state for the page handlers. The visit counter is keyed by the
/// session identifier minted at login, so each login session counts its own
/// dashboard visits.
pub struct AppState {
    pub db: Arc<sea_orm::DatabaseConnection>,
    visits: Mutex<HashMap<Uuid, u64>>,
}

impl AppState {
    pub fn new(db: Arc<sea_orm::DatabaseConnection>) -> Self {
        Self {
            db,
            visits: Mutex::new(HashMap::new()),
        }
    }

    /// Increments the visit count for a session and returns the new value.
    pub fn record_visit(&self, session: Uuid) -> u64 {
        let mut visits = match self.visits.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let count = visits.entry(session).or_insert(0);
        *count += 1;
        *count
    }
}

/// Custom error type for web handler operations.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    /// Represents an error during template rendering.
    /// The specific `askama::Error` is captured as the source of this error.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents a position service error.
    #[error("Position service error")]
    Position(#[from] PositionServiceError),
    /// Represents a task type service error.
    #[error("Task type service error")]
    TaskType(#[from] TaskTypeServiceError),
    /// Represents a worker service error.
    #[error("Worker service error")]
    Worker(#[from] WorkerServiceError),
    /// Represents a task service error.
    #[error("Task service error")]
    Task(#[from] TaskServiceError),
}

impl axum::response::IntoResponse for WebError {
    fn into_response(self) -> axum::response::Response {
        let user_facing_error_message =
            "An unexpected error occurred while processing your request. Please try again later.";
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!(
                "<h1>Internal Server Error</h1><p>{}</p>",
                user_facing_error_message
            )),
        )
            .into_response()
    }
}

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: config::Config) -> anyhow::Result<()> {
    use axum::Router;

    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    let db = Database::connect(&config.db_url).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    let db = Arc::new(db);
    ensure_admin(&db, &config).await?;

    let auth_state = Arc::new(AuthState::new(&config, db.clone()));
    let auth_router = create_auth_router(auth_state.clone());

    let app_state = Arc::new(AppState::new(db));

    let protected_routes = Router::new()
        .route("/", axum::routing::get(index_handler))
        .with_state(app_state.clone())
        .merge(create_position_router(app_state.clone()))
        .merge(create_task_type_router(app_state.clone()))
        .merge(create_worker_router(app_state.clone()))
        .merge(create_task_router(app_state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(auth_state.clone(), auth_user_middleware))
                .layer(from_fn(login_redirect_middleware)),
        );

    let public_routes = Router::new()
        .route("/health", axum::routing::get(health_check_handler))
        .merge(auth_router)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(auth_state.clone(), auth_user_middleware)),
        );

    let app = Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetSensitiveRequestHeadersLayer::new([header::COOKIE]))
                .layer(TraceLayer::new_for_http().make_span_with(FilteredMakeSpan)),
        );

    axum::serve(listener, app).await?;
    Ok(())
}

#[tracing::instrument]
pub async fn health_check_handler() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    #[serde(default)]
    page: String,
}

/// Handler for GET / that renders the dashboard: entity counts, the visit
/// count of the current session and a page of upcoming tasks.
#[tracing::instrument(skip(state))]
pub async fn index_handler(
    State(state): State<Arc<AppState>>,
    Extension(current_user): Extension<CurrentUser>,
    Query(params): Query<IndexQuery>,
) -> Result<Html<String>, WebError> {
    let num_positions = PositionService::new(&state.db).count().await?;
    let num_task_types = TaskTypeService::new(&state.db).count().await?;
    let num_workers = WorkerService::new(&state.db).count().await?;

    let task_service = TaskService::new(&state.db);
    let num_tasks = task_service.count().await?;
    let page_number = params.page.parse().unwrap_or(1);
    let page = task_service
        .search("", page_number, DASHBOARD_PAGE_SIZE)
        .await?;

    let num_visits = state.record_visit(current_user.session);

    let template = IndexTemplate {
        username: current_user.username,
        num_positions,
        num_task_types,
        num_workers,
        num_tasks,
        num_visits,
        page,
    };
    template.render().map(Html).map_err(WebError::from)
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    username: String,
    num_positions: u64,
    num_task_types: u64,
    num_workers: u64,
    num_tasks: u64,
    num_visits: u64,
    page: Page<Task>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn can_handle_template_error_with_internal_server_error() {
        let custom_error_message = "Simulated template rendering failure".to_string();
        let template_error = askama::Error::Custom(custom_error_message.into());

        let web_error = WebError::Template(template_error);
        let response = axum::response::IntoResponse::into_response(web_error);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body_text = std::str::from_utf8(&body).unwrap();

        assert_eq!(
            body_text,
            "<h1>Internal Server Error</h1><p>An unexpected error occurred while processing your request. Please try again later.</p>"
        );
    }

    #[test]
    fn visit_counter_is_per_session() {
        let state = AppState::new(Arc::new(sea_orm::DatabaseConnection::default()));
        let first_session = Uuid::new_v4();
        let second_session = Uuid::new_v4();

        assert_eq!(state.record_visit(first_session), 1);
        assert_eq!(state.record_visit(first_session), 2);
        assert_eq!(state.record_visit(second_session), 1);
        assert_eq!(state.record_visit(first_session), 3);
    }
}
