//! HTTP API Server
//!
//! Starts and manages the axum-based HTTP server.

use axum::Router;
use axum::http::HeaderValue;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use wpp_core::ApiConfig;
use wpp_whatsapp::{DeliveryRecorder, MessageDispatcher, SessionHandle};

use crate::routes::routes;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session: SessionHandle,
    pub dispatcher: MessageDispatcher,
    pub recorder: DeliveryRecorder,
}

impl AppState {
    pub fn new(session: SessionHandle, recorder: DeliveryRecorder) -> Self {
        Self {
            dispatcher: MessageDispatcher::new(session.clone()),
            session,
            recorder,
        }
    }
}

/// Build the CORS layer; permissive when no origins are configured
fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let Some(origins) = allowed_origins else {
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the application with all routes and layers
pub fn app(config: &ApiConfig, state: AppState) -> Router {
    Router::new()
        .merge(routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config.allowed_origins.as_deref()))
        .with_state(state)
}

/// Start the HTTP API server
pub async fn start_server(config: ApiConfig, state: AppState) -> anyhow::Result<()> {
    let app = app(&config, state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("HTTP API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tower::ServiceExt;
    use wpp_core::{CredentialStore, DeliveryStore};
    use wpp_whatsapp::driver::event_channel;
    use wpp_whatsapp::testing::{FakeDriver, session_with};
    use wpp_whatsapp::{DriverEvent, ReconnectPolicy, SessionManager};

    fn state_for(session: SessionHandle) -> AppState {
        let store = Arc::new(DeliveryStore::in_memory().unwrap());
        let recorder = DeliveryRecorder::new(MessageDispatcher::new(session.clone()), store);
        AppState::new(session, recorder)
    }

    async fn test_app(driver: Arc<FakeDriver>, ready: bool) -> (Router, AppState) {
        let state = state_for(session_with(driver, ready).await);
        (app(&ApiConfig::default(), state.clone()), state)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn button_body(contact: &str) -> Value {
        json!({
            "contact": contact,
            "button": {
                "title": "Consulta",
                "body": "Confirma a consulta?",
                "footer": "Responda abaixo",
                "buttons": [{"body": "Sim"}, {"body": "Não"}]
            }
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app(Arc::new(FakeDriver::new()), true).await;
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_state_reports_ready() {
        let (app, _) = test_app(Arc::new(FakeDriver::new()), true).await;
        let response = app
            .oneshot(Request::get("/wpp/state").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"state": "READY"}));
    }

    #[tokio::test]
    async fn test_state_without_driver_is_unavailable() {
        let session = SessionHandle::new(
            "test-client",
            CredentialStore::default(),
            Duration::from_millis(200),
        );
        let app = app(&ApiConfig::default(), state_for(session));
        let response = app
            .oneshot(Request::get("/wpp/state").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_qrcode_json_and_png() {
        let session = SessionHandle::new(
            "test-client",
            CredentialStore::default(),
            Duration::from_millis(200),
        );
        let (_tx, rx) = event_channel();
        let mut manager = SessionManager::attach(
            session.clone(),
            Arc::new(FakeDriver::new()),
            rx,
            ReconnectPolicy::default(),
        )
        .unwrap();
        manager.apply(DriverEvent::Qr("2@pairing-code".to_string())).await;
        let app = app(&ApiConfig::default(), state_for(session));

        let response = app
            .clone()
            .oneshot(
                Request::get("/wpp/qrcode")
                    .header(header::ACCEPT, "application/json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(response).await, json!({"qrcode": "2@pairing-code"}));

        let response = app
            .oneshot(Request::get("/wpp/qrcode").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    }

    #[tokio::test]
    async fn test_qrcode_png_not_pending() {
        let (app, _) = test_app(Arc::new(FakeDriver::new()), true).await;
        let response = app
            .oneshot(Request::get("/wpp/qrcode").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_send_message() {
        let driver = Arc::new(FakeDriver::new());
        driver.register("5511999999999");
        let (app, _) = test_app(driver.clone(), true).await;

        let response = app
            .oneshot(post_json(
                "/wpp/send-message",
                json!({"contact": "(11) 99999-9999", "message": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "OK");
        assert!(body["id"].is_string());
        assert_eq!(driver.send_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_message_unregistered_is_bad_request() {
        let driver = Arc::new(FakeDriver::new());
        let (app, _) = test_app(driver.clone(), true).await;

        let response = app
            .oneshot(post_json(
                "/wpp/send-message",
                json!({"contact": "11888888888", "message": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(driver.send_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_send_message_not_ready() {
        let (app, _) = test_app(Arc::new(FakeDriver::new()), false).await;
        let response = app
            .oneshot(post_json(
                "/wpp/send-message",
                json!({"contact": "11999999999", "message": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_send_message_lookup_timeout_is_unregistered() {
        let driver = Arc::new(FakeDriver::new());
        driver.hang();
        let (app, _) = test_app(driver, true).await;
        let response = app
            .oneshot(post_json(
                "/wpp/send-message",
                json!({"contact": "11999999999", "message": "hello"}),
            ))
            .await
            .unwrap();
        // the lookup times out and is treated as unregistered
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_send_button_message() {
        let driver = Arc::new(FakeDriver::new());
        let (app, _) = test_app(driver.clone(), true).await;

        let response = app
            .oneshot(post_json("/wpp/send-button-message", button_body("11977776666")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "Envio OK");
        assert_eq!(driver.lookup_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_send_button_failure_is_ok_with_reason() {
        let driver = Arc::new(FakeDriver::new());
        driver.fail_sends("Evaluation failed");
        let (app, _) = test_app(driver, true).await;

        let response = app
            .oneshot(post_json("/wpp/send-button-message", button_body("11977776666")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "Driver error: Evaluation failed");
        assert!(body.get("id").is_none());
    }

    #[tokio::test]
    async fn test_send_button_invalid_payload() {
        let driver = Arc::new(FakeDriver::new());
        let (app, _) = test_app(driver.clone(), true).await;

        let response = app
            .clone()
            .oneshot(post_json(
                "/wpp/send-button-message",
                json!({"contact": "11977776666"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut body = button_body("11977776666");
        body["button"]["title"] = json!("");
        let response = app
            .oneshot(post_json("/wpp/send-button-message", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(driver.send_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_integration_always_acknowledges() {
        let driver = Arc::new(FakeDriver::new());
        driver.register("5511999999999");
        let (app, state) = test_app(driver.clone(), true).await;

        let response = app
            .clone()
            .oneshot(post_json(
                "/integration",
                json!({
                    "StatusId": 800,
                    "Cliente": {"Telefone": "11999999999"},
                    "SmsProfissionalCaminho": "Profissional a caminho"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"result": "Ok"}));
        assert_eq!(driver.send_calls.load(Ordering::SeqCst), 1);

        let response = app
            .clone()
            .oneshot(post_json("/integration", json!({"unexpected": true})))
            .await
            .unwrap();
        assert_eq!(body_json(response).await, json!({"result": "Ok"}));

        let response = app
            .oneshot(
                Request::get("/wpp/delivery-log?limit=10")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let rows = body_json(response).await;
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(state.recorder.store().count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delivery_log_by_contact() {
        let driver = Arc::new(FakeDriver::new());
        driver.register("5511999999999");
        let (app, _) = test_app(driver, true).await;

        for phone in ["11999999999", "11888888888", "11999999999"] {
            app.clone()
                .oneshot(post_json(
                    "/integration",
                    json!({
                        "StatusId": 800,
                        "Cliente": {"Telefone": phone},
                        "SmsProfissionalCaminho": "Profissional a caminho"
                    }),
                ))
                .await
                .unwrap();
        }

        let response = app
            .oneshot(
                Request::get("/wpp/delivery-log?contact=(11)%2099999-9999")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let rows = body_json(response).await;
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r["contact"] == "5511999999999"));
    }

    #[tokio::test]
    async fn test_integration_acknowledges_unparseable_bodies() {
        let driver = Arc::new(FakeDriver::new());
        let (app, state) = test_app(driver.clone(), true).await;

        let without_content_type = Request::builder()
            .method("POST")
            .uri("/integration")
            .body(Body::from(r#"{"StatusId": 700}"#))
            .unwrap();
        let not_json = Request::builder()
            .method("POST")
            .uri("/integration")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("not json"))
            .unwrap();

        for request in [without_content_type, not_json] {
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await, json!({"result": "Ok"}));
        }
        assert_eq!(driver.send_calls.load(Ordering::SeqCst), 0);
        assert_eq!(state.recorder.store().count().unwrap(), 0);
    }
}
