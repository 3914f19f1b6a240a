use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use pretty_assertions::assert_eq;
use serde_json::Value;
use tower::ServiceExt;

use streamit_auth::server::{router, AppState, Configuration};
use streamit_auth::{
    AuthError, DeviceFlowClient, FileTokenStore, FlowState, Settings, DEVICE_CODE_GRANT_TYPE,
};

const CLIENT_ID: &str = "streamit-tv";

fn app() -> Router {
    let state = AppState::new(&Configuration::for_client(CLIENT_ID)).unwrap();
    router(state)
}

fn form(pairs: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn post_form(app: &Router, uri: &str, pairs: &[(&str, &str)]) -> (StatusCode, String) {
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form(pairs)))
        .unwrap();
    send(app, request).await
}

async fn post_json(app: &Router, uri: &str, pairs: &[(&str, &str)]) -> (StatusCode, Value) {
    let (status, body) = post_form(app, uri, pairs).await;
    (status, serde_json::from_str(&body).unwrap())
}

async fn request_device_code(app: &Router) -> Value {
    let (status, body) = post_json(
        app,
        "/oauth/device/code",
        &[("client_id", CLIENT_ID), ("scope", "openid profile email")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

async fn poll_token(app: &Router, device_code: &str) -> (StatusCode, Value) {
    post_json(
        app,
        "/oauth/token",
        &[
            ("grant_type", DEVICE_CODE_GRANT_TYPE),
            ("device_code", device_code),
            ("client_id", CLIENT_ID),
        ],
    )
    .await
}

#[tokio::test]
async fn test_device_code_endpoint_issues_grant() {
    let app = app();

    let body = request_device_code(&app).await;

    let user_code = body["user_code"].as_str().unwrap();
    assert_eq!(user_code.len(), 9);
    assert_eq!(body["verification_uri"], "http://localhost:8080/activate");
    assert_eq!(
        body["verification_uri_complete"],
        format!("http://localhost:8080/activate?user_code={}", user_code)
    );
    assert_eq!(body["expires_in"], 600);
    assert_eq!(body["interval"], 5);
    assert!(!body["device_code"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_device_code_rejects_unknown_client() {
    let app = app();

    let (status, body) = post_json(&app, "/oauth/device/code", &[("client_id", "other")]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_client");

    let (status, body) = post_json(&app, "/oauth/device/code", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_token_endpoint_reports_pending_until_approved() {
    let app = app();
    let grant = request_device_code(&app).await;
    let device_code = grant["device_code"].as_str().unwrap();
    let user_code = grant["user_code"].as_str().unwrap();

    let (status, body) = poll_token(&app, device_code).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "authorization_pending");

    let (status, page) = post_form(
        &app,
        "/activate",
        &[("user_code", user_code), ("action", "approve")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(page.contains("signed in"));

    let (status, tokens) = poll_token(&app, device_code).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tokens["token_type"], "Bearer");
    assert_eq!(tokens["scope"], "openid profile email");
    let access_token = tokens["access_token"].as_str().unwrap();
    assert!(tokens["id_token"].as_str().unwrap().contains('.'));

    // Tokens are handed out once
    let (status, body) = poll_token(&app, device_code).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "invalid_grant");

    let request = Request::get("/userinfo")
        .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let user: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(user["sub"], "streamit|demo-viewer");
    assert_eq!(user["name"], "Demo Viewer");
}

#[tokio::test]
async fn test_denied_activation_reports_access_denied() {
    let app = app();
    let grant = request_device_code(&app).await;

    // Lower case with spaces is accepted
    let typed = grant["user_code"]
        .as_str()
        .unwrap()
        .to_lowercase()
        .replace('-', " ");
    let (status, page) =
        post_form(&app, "/activate", &[("user_code", typed.as_str()), ("action", "deny")]).await;
    assert_eq!(status, StatusCode::OK);
    assert!(page.contains("Sign-in cancelled"));

    let (status, body) = poll_token(&app, grant["device_code"].as_str().unwrap()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "access_denied");
}

#[tokio::test]
async fn test_token_endpoint_validates_grant_type_and_code() {
    let app = app();

    let (status, body) = post_json(
        &app,
        "/oauth/token",
        &[
            ("grant_type", "authorization_code"),
            ("client_id", CLIENT_ID),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unsupported_grant_type");

    let (status, body) = poll_token(&app, "not-a-device-code").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn test_userinfo_requires_issued_token() {
    let app = app();

    let (status, body) = send(&app, Request::get("/userinfo").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"], "invalid_token");

    let request = Request::get("/userinfo")
        .header(header::AUTHORIZATION, "Bearer forged")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_activate_page_only_echoes_valid_codes() {
    let app = app();

    let (status, page) = send(
        &app,
        Request::get("/activate?user_code=bcdf-ghjk")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(page.contains(r#"value="BCDF-GHJK""#));

    let (_, page) = send(
        &app,
        Request::get("/activate?user_code=%3Cscript%3E")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert!(!page.contains("<script>"));
    assert!(page.contains(r#"value="""#));
}

#[tokio::test]
async fn test_activation_of_unknown_code() {
    let app = app();

    let (status, page) = post_form(
        &app,
        "/activate",
        &[("user_code", "BCDF-GHJK"), ("action", "approve")],
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(page.contains("couldn't find that code"));
}

#[tokio::test]
async fn test_health_check() {
    let app = app();
    request_device_code(&app).await;

    let (status, body) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["active_grants"], 1);
}

/// Serve the provider on a loopback port with a one second poll interval.
async fn spawn_provider() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let mut configuration = Configuration::for_client(CLIENT_ID);
    configuration.server.public_url = base_url.clone();
    configuration.server.poll_interval_seconds = 1;
    let app = router(AppState::new(&configuration).unwrap());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base_url
}

async fn decide(base_url: &str, user_code: &str, action: &str) {
    let response = reqwest::Client::new()
        .post(format!("{}/activate", base_url))
        .form(&[("user_code", user_code), ("action", action)])
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_device_flow_against_dev_provider() {
    let base_url = spawn_provider().await;
    let token_dir = tempfile::tempdir().unwrap();
    let settings = Settings::for_provider(base_url.clone(), CLIENT_ID);
    let client = DeviceFlowClient::new(
        settings.clone(),
        Arc::new(FileTokenStore::in_dir(token_dir.path()).unwrap()),
    )
    .unwrap();

    let handle = client.start().await.unwrap();
    assert_eq!(handle.authorization().poll_interval, Duration::from_secs(1));
    assert_eq!(
        handle.authorization().verification_uri,
        format!("{}/activate", base_url)
    );

    decide(&base_url, &handle.authorization().user_code, "approve").await;

    let session = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.user.display_name, "Demo Viewer");
    assert_eq!(session.user.email.as_deref(), Some("viewer@streamit.dev"));
    assert!(session.expires_at.is_some());
    assert_eq!(client.state(), FlowState::Succeeded);

    // A fresh client picks the session up from disk
    let restored = DeviceFlowClient::new(
        settings,
        Arc::new(FileTokenStore::in_dir(token_dir.path()).unwrap()),
    )
    .unwrap()
    .restore_session()
    .await
    .unwrap()
    .unwrap();
    assert_eq!(restored.access_token, session.access_token);
    assert_eq!(restored.user.subject_id, "streamit|demo-viewer");
}

#[tokio::test]
async fn test_denied_flow_against_dev_provider() {
    let base_url = spawn_provider().await;
    let client = DeviceFlowClient::new(
        Settings::for_provider(base_url.clone(), CLIENT_ID),
        Arc::new(streamit_auth::MemoryTokenStore::new()),
    )
    .unwrap();

    let handle = client.start().await.unwrap();
    decide(&base_url, &handle.authorization().user_code, "deny").await;

    let result = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .unwrap();
    assert_eq!(result, Err(AuthError::UserDeniedAccess));
    assert!(!client.token_store().is_authenticated());
}
