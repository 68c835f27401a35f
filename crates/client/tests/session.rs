//! Sign-in flows and session persistence.

use classroom_client::config::ClientConfig;
use classroom_client::{Navigation, Portal, Route, SessionStorage};
use classroom_shared::Role;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig {
        api_url: server.uri(),
        // nothing listens here; the live client just keeps retrying quietly
        ws_url: "ws://127.0.0.1:9/ws".into(),
        ..ClientConfig::default()
    }
}

fn teacher_json() -> serde_json::Value {
    json!({"id": 1, "email": "teacher@school.test", "role": "teacher", "active": true})
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_partial_json(json!({"email": "teacher@school.test"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Login successful",
            "token": "jwt-1",
            "user": teacher_json()
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn login_persists_and_restores_session() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    let dir = TempDir::new().unwrap();

    let portal = Portal::new(config_for(&server), SessionStorage::new(dir.path()));
    let user = portal.login("teacher@school.test", "secret").await.unwrap();
    assert_eq!(user.role, Role::Teacher);
    assert!(portal.is_authenticated());
    assert!(portal.live().is_some());
    assert_eq!(portal.navigate(Route::TeacherSubjects), Navigation::Proceed);
    drop(portal);

    let restored = Portal::restore(config_for(&server), SessionStorage::new(dir.path()));
    assert_eq!(restored.token().as_deref(), Some("jwt-1"));
    assert_eq!(restored.user().map(|u| u.email), Some("teacher@school.test".into()));
    assert_eq!(
        restored.navigate(Route::StudentAssignments),
        Navigation::Redirect(Route::TeacherDashboard)
    );
}

#[tokio::test]
async fn login_failure_reports_server_message_or_default() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid credentials"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/register"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let portal = Portal::new(config_for(&server), SessionStorage::new(dir.path()));

    let err = portal.login("teacher@school.test", "wrong").await.unwrap_err();
    assert_eq!(err.message, "Invalid credentials");
    assert!(err.source.is_unauthorized());

    let err = portal
        .register("new@school.test", "pw", Role::Student)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Registration failed");

    assert!(!portal.is_authenticated());
    assert!(!portal.storage().exists("session"));
}

#[tokio::test]
async fn login_with_html_error_page_uses_default_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(500)
                .insert_header("content-type", "text/html")
                .set_body_string("<!doctype html><title>500 Internal Server Error</title>"),
        )
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let portal = Portal::new(config_for(&server), SessionStorage::new(dir.path()));

    let err = portal.login("teacher@school.test", "secret").await.unwrap_err();
    assert_eq!(err.message, "Login failed");
    assert_eq!(err.source.server_message(), None);
    assert!(!portal.is_authenticated());
}

#[tokio::test]
async fn refresh_failure_signs_out() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer jwt-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Token has expired"})))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let portal = Portal::new(config_for(&server), SessionStorage::new(dir.path()));
    portal.login("teacher@school.test", "secret").await.unwrap();
    assert!(portal.storage().exists("session"));

    let err = portal.refresh_user().await.unwrap_err();
    assert!(err.is_unauthorized());
    assert!(!portal.is_authenticated());
    assert!(!portal.storage().exists("session"));
}

#[tokio::test]
async fn role_change_on_refresh_rebuilds_stores() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": {"id": 1, "email": "teacher@school.test", "role": "student"}
        })))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let portal = Portal::new(config_for(&server), SessionStorage::new(dir.path()));
    portal.login("teacher@school.test", "secret").await.unwrap();
    let before = portal.assignments().unwrap();
    assert_eq!(before.viewer().role, Role::Teacher);

    let user = portal.refresh_user().await.unwrap();
    assert_eq!(user.role, Role::Student);
    assert_eq!(portal.assignments().unwrap().viewer().role, Role::Student);
    assert_eq!(portal.token().as_deref(), Some("jwt-1"));
}
