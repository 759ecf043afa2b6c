use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use planner_server::auth::{
    AuthState, auth_user_middleware, create_auth_router, ensure_admin, login_redirect_middleware,
};
use planner_server::config::Config;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use testcontainers_modules::{postgres, testcontainers};
use tower::{ServiceBuilder, ServiceExt};

mod common;

pub struct TestContext {
    #[allow(dead_code)] // container is kept to ensure it's not dropped
    pub container: testcontainers::ContainerAsync<postgres::Postgres>,
    pub db: DatabaseConnection,
}

async fn setup() -> anyhow::Result<TestContext> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().try_init();
    let container = common::setup_container().await?;
    let db = common::setup_db(&container).await?;
    Ok(TestContext { db, container })
}

fn test_config() -> Config {
    Config {
        db_url: "".to_string(),
        port: 8080,
        jwt_secret: "some_secret".to_string(),
        admin_username: "admin".to_string(),
        admin_password: "admin-password".to_string(),
    }
}

/// Builds the auth router plus a protected route, the way the real server
/// composes them.
fn build_app(auth_state: Arc<AuthState>) -> Router {
    let protected = Router::new()
        .route("/secret", get(|| async { "secret" }))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(auth_state.clone(), auth_user_middleware))
                .layer(from_fn(login_redirect_middleware)),
        );
    let public = create_auth_router(auth_state.clone()).layer(from_fn_with_state(
        auth_state.clone(),
        auth_user_middleware,
    ));
    Router::new().merge(protected).merge(public)
}

fn form_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn anonymous_requests_are_redirected_to_login() {
    let auth_state = Arc::new(AuthState::new(
        &test_config(),
        Arc::new(DatabaseConnection::default()),
    ));
    let app = build_app(auth_state);

    let request = Request::builder()
        .uri("/secret")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");
}

#[tokio::test]
async fn can_register_and_login() {
    let state = setup().await.expect("Failed to setup test context");
    let auth_state = Arc::new(AuthState::new(&test_config(), Arc::new(state.db)));
    let app = build_app(auth_state);

    let response = app
        .clone()
        .oneshot(form_request(
            "/register/",
            "username=neo&password1=matrix-pass&password2=matrix-pass\
             &first_name=Thomas&last_name=Anderson&email=neo%40example.com&position=",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("Registration complete"));

    let response = app
        .clone()
        .oneshot(form_request("/login", "username=neo&password=matrix-pass"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");

    let set_cookie = response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("auth_token="));
    let cookie_pair = set_cookie.split(';').next().unwrap().to_string();

    let request = Request::builder()
        .uri("/secret")
        .header(header::COOKIE, cookie_pair)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "secret");
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let state = setup().await.expect("Failed to setup test context");
    let config = test_config();
    ensure_admin(&state.db, &config)
        .await
        .expect("Failed to seed admin");
    let auth_state = Arc::new(AuthState::new(&config, Arc::new(state.db)));
    let app = build_app(auth_state);

    let response = app
        .oneshot(form_request("/login", "username=admin&password=wrong"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        body_text(response)
            .await
            .contains("Please enter a correct username and password.")
    );
}

#[tokio::test]
async fn admin_seeded_at_startup_can_login() {
    let state = setup().await.expect("Failed to setup test context");
    let config = test_config();
    ensure_admin(&state.db, &config)
        .await
        .expect("Failed to seed admin");
    // A second run must not try to create the admin again.
    ensure_admin(&state.db, &config)
        .await
        .expect("ensure_admin should be idempotent");

    let auth_state = Arc::new(AuthState::new(&config, Arc::new(state.db)));
    let app = build_app(auth_state);

    let response = app
        .oneshot(form_request(
            "/login",
            "username=admin&password=admin-password",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn registration_rejects_password_mismatch() {
    let state = setup().await.expect("Failed to setup test context");
    let auth_state = Arc::new(AuthState::new(&test_config(), Arc::new(state.db)));
    let app = build_app(auth_state);

    let response = app
        .oneshot(form_request(
            "/register/",
            "username=neo&password1=one&password2=two",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        body_text(response)
            .await
            .contains("Passwords don&#x27;t match.")
    );
}

#[tokio::test]
async fn registration_rejects_taken_username() {
    let state = setup().await.expect("Failed to setup test context");
    let config = test_config();
    ensure_admin(&state.db, &config)
        .await
        .expect("Failed to seed admin");
    let auth_state = Arc::new(AuthState::new(&config, Arc::new(state.db)));
    let app = build_app(auth_state);

    let response = app
        .oneshot(form_request(
            "/register/",
            "username=admin&password1=pass&password2=pass",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        body_text(response)
            .await
            .contains("A user with that username already exists.")
    );
}

#[tokio::test]
async fn logout_clears_the_session_cookie() {
    let auth_state = Arc::new(AuthState::new(
        &test_config(),
        Arc::new(DatabaseConnection::default()),
    ));
    let app = build_app(auth_state);

    let request = Request::builder()
        .uri("/logout")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.starts_with("auth_token="));
}
