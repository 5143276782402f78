//! HTTP API integration tests.
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot`, using a
//! scripted `sh` toolchain and tempfile directories for the workspace and
//! the device.

#![cfg(unix)]

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use flash_core::FlashConfig;
use flash_daemon::server::{create_router, AppState, SESSION_COOKIE};
use tempfile::TempDir;
use tower::ServiceExt;

// ============================================================================
// Test Utilities
// ============================================================================

const COPY_SCRIPT: &str = r#"mkdir -p "$1" && cat main.cpp > "$1/main.bin""#;

struct TestServer {
    app: Router,
    state: AppState,
    build: TempDir,
    device: TempDir,
}

fn server_with_script(script: &str) -> TestServer {
    server_with_config(script, |_| {})
}

fn server_with_config(script: &str, customize: impl FnOnce(&mut FlashConfig)) -> TestServer {
    let build = TempDir::new().expect("Failed to create build dir");
    let device = TempDir::new().expect("Failed to create device dir");

    let mut config = FlashConfig::default_with_boards();
    config.workspace.root = build.path().join("main");
    config.toolchain.program = "sh".to_string();
    config.toolchain.args = vec![
        "-c".to_string(),
        script.to_string(),
        "toolchain".to_string(),
        "{build_dir}".to_string(),
        "{target}".to_string(),
    ];
    config.toolchain.timeout_secs = 10;
    customize(&mut config);

    let state = AppState::new(&config);
    TestServer {
        app: create_router(state.clone()),
        state,
        build,
        device,
    }
}

fn form(uri: &str, cookie: Option<&str>, body: String) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8_lossy(&bytes).to_string()
}

/// Extract `name=value` from a Set-Cookie header.
fn session_cookie(response: &axum::response::Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("Expected a session cookie")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

impl TestServer {
    /// Select target and destination, returning the session cookie.
    async fn configure(&self, target: &str, destination: &str) -> String {
        let response = self
            .app
            .clone()
            .oneshot(form("/target", None, format!("target={}", target)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = session_cookie(&response);

        let response = self
            .app
            .clone()
            .oneshot(form(
                "/destination",
                Some(&cookie),
                format!("destination={}", destination),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        cookie
    }
}

// ============================================================================
// Session Configuration
// ============================================================================

#[tokio::test]
async fn test_select_target_returns_confirmation_and_cookie() {
    let server = server_with_script(COPY_SCRIPT);

    let response = server
        .app
        .clone()
        .oneshot(form("/saveBoardSelected", None, "board=NUCLEO_F401RE".to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);
    assert!(cookie.starts_with(SESSION_COOKIE));
    assert_eq!(body_string(response).await, "Board selected: NUCLEO_F401RE");
}

#[tokio::test]
async fn test_session_cookie_carries_configuration() {
    let server = server_with_script(COPY_SCRIPT);
    let cookie = server.configure("NUCLEO_L476RG", "/mnt/device").await;

    let response = server
        .app
        .clone()
        .oneshot(get("/session", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["data"]["target"], "NUCLEO_L476RG");
    assert_eq!(json["data"]["destination"], "/mnt/device");
}

#[tokio::test]
async fn test_set_destination_legacy_field() {
    let server = server_with_script(COPY_SCRIPT);

    let response = server
        .app
        .clone()
        .oneshot(form("/setBoardLetter", None, "boardPath=/media/NODE_F401RE".to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "Destination set: /media/NODE_F401RE");
}

#[tokio::test]
async fn test_client_chosen_session_id_is_not_adopted() {
    let server = server_with_script(COPY_SCRIPT);
    let chosen = format!("{}=4b1c3a9e-0f2d-4d6e-9a7b-5c8d2e1f0a3b", SESSION_COOKIE);

    let response = server
        .app
        .clone()
        .oneshot(form("/target", Some(&chosen), "target=NUCLEO_F401RE".to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let issued = session_cookie(&response);
    assert_ne!(issued, chosen);

    let response = server
        .app
        .clone()
        .oneshot(get("/session", Some(&chosen)))
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert!(json["data"]["target"].is_null());
}

// ============================================================================
// Build
// ============================================================================

#[tokio::test]
async fn test_oversized_source_is_rejected() {
    let server = server_with_config(COPY_SCRIPT, |config| config.server.max_source_bytes = 1024);
    let device = server.device.path().display().to_string();
    let cookie = server.configure("NUCLEO_F401RE", &device).await;

    let response = server
        .app
        .clone()
        .oneshot(form("/build", Some(&cookie), format!("source={}", "x".repeat(4096))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(!server.build.path().join("main/main.cpp").exists());
    assert!(!server.device.path().join("main.bin").exists());
    assert_eq!(server.state.stats.total(), 0);
}

#[tokio::test]
async fn test_build_deploys_to_destination() {
    let server = server_with_script(COPY_SCRIPT);
    let device = server.device.path().display().to_string();
    let cookie = server.configure("NUCLEO_F401RE", &device).await;

    let response = server
        .app
        .clone()
        .oneshot(form(
            "/writeFile",
            Some(&cookie),
            "textarea=int main(){return 0;}".to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "");
    assert_eq!(
        std::fs::read_to_string(server.device.path().join("main.bin")).unwrap(),
        "int main(){return 0;}"
    );
    assert_eq!(
        std::fs::read_to_string(server.build.path().join("main/main.cpp")).unwrap(),
        "int main(){return 0;}"
    );
    assert_eq!(server.state.stats.total(), 1);
    assert_eq!(server.state.stats.failed(), 0);
}

#[tokio::test]
async fn test_build_without_configuration_is_conflict() {
    let server = server_with_script(COPY_SCRIPT);

    let response = server
        .app
        .clone()
        .oneshot(form("/build", None, "source=int main(){}".to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["kind"], "config_missing");
    assert_eq!(json["stage"], "configuring");
    assert!(!server.build.path().join("main/main.cpp").exists());
}

#[tokio::test]
async fn test_failed_toolchain_reports_stage_and_log() {
    let server = server_with_script(r#"echo "undefined reference to setup" >&2; exit 1"#);
    let device = server.device.path().display().to_string();
    let cookie = server.configure("NUCLEO_F401RE", &device).await;

    let response = server
        .app
        .clone()
        .oneshot(form("/build", Some(&cookie), "source=int main(){}".to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["kind"], "build_failed");
    assert_eq!(json["stage"], "building");
    assert!(json["log_tail"]
        .as_str()
        .unwrap()
        .contains("undefined reference"));
    assert!(!server.device.path().join("main.bin").exists());
    assert_eq!(server.state.stats.failed(), 1);
}

#[tokio::test]
async fn test_unmounted_destination_is_server_error() {
    let server = server_with_script(COPY_SCRIPT);
    let missing = server.device.path().join("unmounted").display().to_string();
    let cookie = server.configure("NUCLEO_F401RE", &missing).await;

    let response = server
        .app
        .clone()
        .oneshot(form("/build", Some(&cookie), "source=int main(){}".to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["kind"], "io_error");
    assert_eq!(json["stage"], "relocating");
}

// ============================================================================
// Health, Status, Boards
// ============================================================================

#[tokio::test]
async fn test_health_and_boards() {
    let server = server_with_script(COPY_SCRIPT);

    let response = server.app.clone().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = server.app.clone().oneshot(get("/boards", None)).await.unwrap();
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    let ids: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|b| b["id"].as_str())
        .collect();
    assert!(ids.contains(&"NUCLEO_F401RE"));
}

#[tokio::test]
async fn test_status_reports_last_build() {
    let server = server_with_script("exit 2");
    let device = server.device.path().display().to_string();
    let cookie = server.configure("NUCLEO_F401RE", &device).await;

    server
        .app
        .clone()
        .oneshot(form("/build", Some(&cookie), "source=int main(){}".to_string()))
        .await
        .unwrap();

    let response = server.app.clone().oneshot(get("/status", None)).await.unwrap();
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["data"]["builds_total"], 1);
    assert_eq!(json["data"]["builds_failed"], 1);
    assert_eq!(json["data"]["last_build"]["outcome"], "failed");
    assert_eq!(json["data"]["last_build"]["kind"], "build_failed");
    assert_eq!(json["data"]["sessions"], 1);
}
