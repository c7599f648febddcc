pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::chat::handlers as chat;
use crate::model::handlers as models;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/profile", get(chat::handle_get_profile))
        // Chat
        .route("/api/v1/chat", post(chat::handle_chat))
        .route("/api/v1/chat/status", get(chat::handle_chat_status))
        .route("/api/v1/chat/initialize", post(chat::handle_chat_initialize))
        .route("/api/v1/chat/release", post(chat::handle_chat_release))
        // Model lifecycle
        .route(
            "/api/v1/models",
            get(models::handle_list_models).delete(models::handle_delete_model),
        )
        .route("/api/v1/models/status", get(models::handle_model_status))
        .route("/api/v1/models/download", post(models::handle_download_model))
        .route(
            "/api/v1/models/diagnostics",
            get(models::handle_model_diagnostics),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::StaticCapabilities;
    use crate::chat::{ChatService, FallbackPolicy};
    use crate::config::Config;
    use crate::intent::IntentResolver;
    use crate::model::manager::test_support::{
        manager_for, mark_downloading, write_file, TEST_FLOOR,
    };
    use crate::model::{ModelCatalog, ModelManager};
    use crate::models::profile::Profile;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> Config {
        Config {
            port: 0,
            rust_log: "info".to_string(),
            profile_path: None,
            model_catalog_path: None,
            model_dir: None,
            inference_url: None,
            chat_fallback: FallbackPolicy::RuleBased,
            min_model_bytes: None,
            prefetch_model: false,
        }
    }

    fn state_with(models: ModelManager) -> AppState {
        let profile = Arc::new(Profile::builtin().unwrap());
        let intents = Arc::new(IntentResolver::new(profile.clone()).unwrap());
        AppState {
            config: config(),
            profile,
            chat: Arc::new(ChatService::rules_only(intents)),
            models: Arc::new(models),
        }
    }

    /// Serves the router on an ephemeral port and returns its base URL.
    async fn serve(state: AppState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Whether the SSE body carries an event named `name`.
    fn has_event(body: &str, name: &str) -> bool {
        body.lines()
            .any(|line| line.strip_prefix("event:").map(str::trim) == Some(name))
    }

    #[tokio::test]
    async fn test_health_and_profile() {
        let dir = TempDir::new().unwrap();
        let base = serve(state_with(manager_for(
            dir.path(),
            &[("tiny", "http://unused".to_string())],
        )))
        .await;

        let health: Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["model_backend"], false);

        let profile: Value = reqwest::get(format!("{base}/api/v1/profile"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(profile["name"], "Dev Gupta");
    }

    #[tokio::test]
    async fn test_chat_turn_over_http() {
        let dir = TempDir::new().unwrap();
        let base = serve(state_with(manager_for(
            dir.path(),
            &[("tiny", "http://unused".to_string())],
        )))
        .await;
        let client = reqwest::Client::new();

        let turn: Value = client
            .post(format!("{base}/api/v1/chat"))
            .json(&json!({"question": "Do you know React Native?"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(turn["question"]["sender"], "user");
        assert_eq!(turn["answer"]["sender"], "assistant");
        assert_eq!(turn["answer"]["backend"], "rules");
        assert_eq!(turn["answer"]["intent"], "technology");
        assert!(turn["answer"]["text"].as_str().unwrap().contains("React Native"));

        let empty = client
            .post(format!("{base}/api/v1/chat"))
            .json(&json!({"question": ""}))
            .send()
            .await
            .unwrap();
        assert_eq!(empty.status(), 200);

        let too_long = client
            .post(format!("{base}/api/v1/chat"))
            .json(&json!({"question": "a".repeat(5000)}))
            .send()
            .await
            .unwrap();
        assert_eq!(too_long.status(), 400);
        let body: Value = too_long.json().await.unwrap();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let warm = client
            .post(format!("{base}/api/v1/chat/initialize"))
            .send()
            .await
            .unwrap();
        assert_eq!(warm.status(), 503);
    }

    #[tokio::test]
    async fn test_model_routes_lifecycle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tiny.gguf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; TEST_FLOOR as usize]))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let manager = manager_for(dir.path(), &[("tiny", format!("{}/tiny.gguf", server.uri()))]);
        let base = serve(state_with(manager)).await;
        let client = reqwest::Client::new();

        let status: Value = reqwest::get(format!("{base}/api/v1/models/status?model_id=tiny"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["exists"], false);

        let events = client
            .post(format!("{base}/api/v1/models/download?model_id=tiny"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(has_event(&events, "progress"));
        assert!(has_event(&events, "completed"));
        assert!(!has_event(&events, "error"));

        let status: Value = reqwest::get(format!("{base}/api/v1/models/status?model_id=tiny"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["exists"], true);

        let deleted: Value = client
            .delete(format!("{base}/api/v1/models?model_id=tiny"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(deleted["deleted"], true);
        assert!(!dir.path().join("tiny.gguf").exists());
    }

    #[tokio::test]
    async fn test_failed_download_streams_error_event() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let manager = manager_for(dir.path(), &[("tiny", format!("{}/tiny.gguf", server.uri()))]);
        let base = serve(state_with(manager)).await;

        let events = reqwest::Client::new()
            .post(format!("{base}/api/v1/models/download"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(has_event(&events, "error"));
        assert!(events.contains("TRANSPORT_FAILURE"));
        assert!(events.contains(r#""retryable":true"#));
        assert!(!has_event(&events, "completed"));
        assert!(!dir.path().join("tiny.gguf").exists());
    }

    #[tokio::test]
    async fn test_download_already_running_is_409() {
        let dir = TempDir::new().unwrap();
        let manager = manager_for(dir.path(), &[("tiny", "http://unused".to_string())]);
        mark_downloading(&manager, "tiny");
        let base = serve(state_with(manager)).await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/v1/models/download?model_id=tiny"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 409);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"]["code"], "DOWNLOAD_IN_PROGRESS");

        let status: Value = reqwest::get(format!("{base}/api/v1/models/status?model_id=tiny"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["exists"], false);
    }

    #[tokio::test]
    async fn test_unknown_model_is_404() {
        let dir = TempDir::new().unwrap();
        let base = serve(state_with(manager_for(
            dir.path(),
            &[("tiny", "http://unused".to_string())],
        )))
        .await;

        let response = reqwest::Client::new()
            .post(format!("{base}/api/v1/models/download?model_id=nope"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_headless_model_routes() {
        let dir = TempDir::new().unwrap();
        write_file(&dir.path().join("tiny.gguf"), TEST_FLOOR as usize);
        let manager = ModelManager::new(
            ModelCatalog::builtin().unwrap(),
            dir.path().to_path_buf(),
            Arc::new(StaticCapabilities::headless()),
        );
        let base = serve(state_with(manager)).await;
        let client = reqwest::Client::new();

        let download = client
            .post(format!("{base}/api/v1/models/download"))
            .send()
            .await
            .unwrap();
        assert_eq!(download.status(), 501);

        let delete = client
            .delete(format!("{base}/api/v1/models"))
            .send()
            .await
            .unwrap();
        assert_eq!(delete.status(), 501);

        let status: Value = reqwest::get(format!("{base}/api/v1/models/status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["exists"], false);

        let diagnostics: Value = reqwest::get(format!("{base}/api/v1/models/diagnostics"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(diagnostics["filesystem"], false);
    }
}
