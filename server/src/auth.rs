use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use askama::Template;
use axum::Router;
use axum::extract::{Extension, Form, MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use jsonwebtoken::encode;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::MakeSpan;
use tracing::Span;
use uuid::Uuid;

use crate::config::Config;
use crate::forms::{FormErrors, SelectOption, parse_optional_id, require};
use crate::position::PositionService;
use crate::worker::{NewWorker, WorkerService, WorkerServiceError};

/// Represents the currently authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub username: String,
    /// Session identifier minted at login, used to key per-session state
    /// such as the dashboard visit counter.
    pub session: Uuid,
}

impl CurrentUser {
    pub fn new(username: String, session: Uuid) -> Self {
        Self { username, session }
    }
}

/// Authentication state: the JWT secret and the database the worker
/// credentials live in.
#[derive(Clone)]
pub struct AuthState {
    pub jwt_secret: String,
    pub db: Arc<sea_orm::DatabaseConnection>,
}

impl AuthState {
    pub fn new(config: &Config, db: Arc<sea_orm::DatabaseConnection>) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            db,
        }
    }
}

/// Creates the router with the anonymous-accessible authentication routes.
pub fn create_auth_router(state: Arc<AuthState>) -> Router<()> {
    Router::new()
        .route(
            "/login",
            axum::routing::get(login_page_handler).post(login_handler),
        )
        .route("/logout", axum::routing::get(logout_handler))
        .route(
            "/register/",
            axum::routing::get(register_page_handler).post(register_handler),
        )
        .with_state(state)
}

/// Authentication middleware that checks for a valid JWT token and sets the
/// CurrentUser extension. This middleware only populates the extension and
/// does not perform redirects.
pub async fn auth_user_middleware(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token_cookie) = jar.get("auth_token") {
        if let Ok(claims) = decode_jwt(token_cookie.value(), &state.jwt_secret) {
            let current_user = CurrentUser::new(claims.username, claims.sid);
            request.extensions_mut().insert(current_user);
        }
    }

    next.run(request).await
}

/// Login redirect middleware that redirects unauthenticated users to the
/// login page. Applied after auth_user_middleware so the CurrentUser
/// extension is already populated.
pub async fn login_redirect_middleware(request: Request, next: Next) -> Response {
    let is_authenticated = request.extensions().get::<CurrentUser>().is_some();

    if !is_authenticated {
        return Redirect::to("/login").into_response();
    }

    next.run(request).await
}

#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct Claims {
    pub exp: usize,       // Expiry time of the token
    pub iat: usize,       // Issued at time of the token
    pub username: String, // Username of the authenticated user
    pub sid: Uuid,        // Session identifier
}

/// Custom error type for authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents an error during JWT operations.
    #[error("JWT operation failed")]
    Jwt,
    /// Represents a password hashing failure.
    #[error("Password hashing failed")]
    PasswordHash,
    /// Represents a worker service error.
    #[error("Worker service error")]
    Worker(#[from] WorkerServiceError),
    /// Represents a position service error.
    #[error("Position service error")]
    Position(#[from] crate::position::PositionServiceError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let user_facing_error_message =
            "An unexpected error occurred while processing your request. Please try again later.";
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!(
                "<h1>Internal Server Error</h1><p>{}</p>",
                user_facing_error_message
            )),
        )
            .into_response()
    }
}

/// Hashes a raw password into an argon2id PHC string.
pub fn hash_password(raw: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(raw.as_bytes(), &salt)
        .map_err(|_| AuthError::PasswordHash)?;
    Ok(hash.to_string())
}

/// Verifies a raw password against a stored PHC string.
pub fn verify_password(raw: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(raw.as_bytes(), &parsed)
        .is_ok()
}

/// Creates the configured admin account when it does not exist yet, so a
/// fresh deployment has a first login.
#[tracing::instrument(skip(db, config))]
pub async fn ensure_admin(
    db: &sea_orm::DatabaseConnection,
    config: &Config,
) -> anyhow::Result<()> {
    use sea_orm::{ActiveModelTrait, ActiveValue};

    let worker_service = WorkerService::new(db);
    if worker_service
        .find_by_username(&config.admin_username)
        .await?
        .is_some()
    {
        return Ok(());
    }

    let password_hash =
        hash_password(&config.admin_password).map_err(|_| anyhow::anyhow!("hashing failed"))?;
    let admin = crate::entities::worker::ActiveModel {
        username: ActiveValue::Set(config.admin_username.clone()),
        password_hash: ActiveValue::Set(password_hash),
        first_name: ActiveValue::Set(String::new()),
        last_name: ActiveValue::Set(String::new()),
        email: ActiveValue::Set(String::new()),
        is_staff: ActiveValue::Set(true),
        is_superuser: ActiveValue::Set(true),
        position_id: ActiveValue::Set(None),
        ..Default::default()
    };
    admin.insert(db).await?;
    tracing::info!("Created admin account '{}'", config.admin_username);
    Ok(())
}

/// Handles the login request: verifies the submitted credentials against the
/// worker table and issues a session cookie on success.
#[tracing::instrument(skip(state, jar, payload))]
pub async fn login_handler(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    Form(payload): Form<LoginRequest>,
) -> Result<(CookieJar, Response), AuthError> {
    let worker_service = WorkerService::new(&state.db);
    let worker = worker_service.find_by_username(&payload.username).await?;

    let verified = worker
        .as_ref()
        .is_some_and(|w| verify_password(&payload.password, &w.password_hash));

    if verified {
        let session = Uuid::new_v4();
        let jwt_token = encode_jwt(payload.username.clone(), session, &state.jwt_secret)
            .map_err(|_| AuthError::Jwt)?;

        let cookie = Cookie::build(("auth_token", jwt_token))
            .http_only(true)
            .secure(false) // Set to true in production with HTTPS
            .same_site(SameSite::Lax)
            .max_age(time::Duration::hours(24))
            .path("/")
            .build();

        let updated_jar = jar.add(cookie);
        Ok((updated_jar, Redirect::to("/").into_response()))
    } else {
        let html = LoginTemplate {
            username: None,
            failed: true,
        }
        .render()
        .map_err(AuthError::from)?;
        Ok((jar, Html(html).into_response()))
    }
}

/// Handles GET requests to display the login page.
#[tracing::instrument]
pub async fn login_page_handler(
    current_user: Option<Extension<CurrentUser>>,
) -> Result<Html<String>, AuthError> {
    let username = current_user.map(|Extension(user)| user.username);

    let template = LoginTemplate {
        username,
        failed: false,
    };
    template.render().map(Html).map_err(AuthError::from)
}

/// Clears the session cookie and sends the user back to the login page.
#[tracing::instrument(skip(jar))]
pub async fn logout_handler(jar: CookieJar) -> (CookieJar, Redirect) {
    let mut cookie = Cookie::from("auth_token");
    cookie.set_path("/");
    (jar.remove(cookie), Redirect::to("/login"))
}

/// Form payload for the registration page. All fields default to empty so a
/// partial submission validates instead of failing extraction.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct RegistrationForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub position: String,
}

/// Checks the registration input. Returns the parsed position id alongside
/// any field errors.
fn validate_registration(form: &RegistrationForm) -> (FormErrors, Option<i32>) {
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

/// Handles GET requests to display the registration form.
#[tracing::instrument(skip(state))]
pub async fn register_page_handler(
    State(state): State<Arc<AuthState>>,
) -> Result<Html<String>, AuthError> {
    let form = RegistrationForm::default();
    let template = RegisterTemplate {
        positions: position_options(&state, &form.position).await?,
        errors: FormErrors::new(),
        form,
    };
    template.render().map(Html).map_err(AuthError::from)
}

/// Handles the registration submission: creates a worker with a hashed
/// password on success, re-renders the form with field errors otherwise.
#[tracing::instrument(skip(state, form))]
pub async fn register_handler(
    State(state): State<Arc<AuthState>>,
    Form(form): Form<RegistrationForm>,
) -> Result<Html<String>, AuthError> {
    let (mut errors, position_id) = validate_registration(&form);

    if errors.is_empty() {
        let worker_service = WorkerService::new(&state.db);
        let new_worker = NewWorker {
            username: form.username.trim().to_string(),
            password_hash: hash_password(&form.password1)?,
            first_name: form.first_name.trim().to_string(),
            last_name: form.last_name.trim().to_string(),
            email: form.email.trim().to_string(),
            position_id,
        };
        match worker_service.create(new_worker).await {
            Ok(worker) => {
                let template = RegisterDoneTemplate {
                    username: worker.username().to_string(),
                };
                return template.render().map(Html).map_err(AuthError::from);
            }
            Err(WorkerServiceError::DuplicateUsername(_)) => {
                errors.add("username", "A user with that username already exists.");
            }
            Err(WorkerServiceError::UnknownPosition(_)) => {
                errors.add("position", "Select a valid choice.");
            }
            Err(err) => return Err(AuthError::Worker(err)),
        }
    }

    let template = RegisterTemplate {
        positions: position_options(&state, &form.position).await?,
        errors,
        form,
    };
    template.render().map(Html).map_err(AuthError::from)
}

async fn position_options(
    state: &AuthState,
    selected: &str,
) -> Result<Vec<SelectOption>, AuthError> {
    let positions = PositionService::new(&state.db).all().await?;
    Ok(positions
        .into_iter()
        .map(|p| {
            let value = p.id().to_string();
            let selected = value == selected;
            SelectOption::new(value, p.name(), selected)
        })
        .collect())
}

pub fn encode_jwt(username: String, session: Uuid, jwt_secret: &str) -> anyhow::Result<String> {
    let now = chrono::Utc::now();
    let expire = chrono::Duration::hours(24);
    let exp = (now + expire).timestamp() as usize;
    let iat = now.timestamp() as usize;
    let claims = Claims {
        exp,
        iat,
        username,
        sid: session,
    };
    let jwt = encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(jwt_secret.as_bytes()),
    )?;
    Ok(jwt)
}

pub fn decode_jwt(token: &str, jwt_secret: &str) -> anyhow::Result<Claims> {
    let token_data = jsonwebtoken::decode(
        token,
        &jsonwebtoken::DecodingKey::from_secret(jwt_secret.as_bytes()),
        &jsonwebtoken::Validation::default(),
    )?;
    Ok(token_data.claims)
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub username: Option<String>,
    pub failed: bool,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub form: RegistrationForm,
    pub errors: FormErrors,
    pub positions: Vec<SelectOption>,
}

#[derive(Template)]
#[template(path = "register_done.html")]
pub struct RegisterDoneTemplate {
    pub username: String,
}

/// Custom span maker that filters sensitive data from credential-carrying
/// requests. This implementation avoids logging request bodies and cookies
/// for the login and registration routes.
#[derive(Clone, Debug)]
pub struct FilteredMakeSpan;

impl<B> MakeSpan<B> for FilteredMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> Span {
        let uri = request.uri();
        let method = request.method();
        let matched_path = request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str);

        if uri.path() == "/login" || uri.path() == "/register/" {
            tracing::info_span!(
                "request",
                method = %method,
                uri = %uri,
                matched_path,
                sensitive_route = true,
                // Explicitly omit headers, cookies, and body for these requests
            )
        } else {
            tracing::info_span!(
                "request",
                method = %method,
                uri = %uri,
                matched_path,
            )
        }
    }
}
