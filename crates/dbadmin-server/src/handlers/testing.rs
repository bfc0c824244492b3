//! Router wired to in-memory stores

use crate::storage::memory::{MemoryCache, MemorySchema, MemoryUsers};
use crate::{api_routes, handlers, AppState};
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::routing::get;
use axum::Router;
use dbadmin_core::{AppConfig, ConfigHandle};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub schema: Arc<MemorySchema>,
}

impl TestApp {
    pub fn new() -> Self {
        let schema = Arc::new(MemorySchema::new());
        let state = AppState {
            config: ConfigHandle::new(AppConfig::default(), "config/config.yaml"),
            users: Arc::new(MemoryUsers::new()),
            schema: schema.clone(),
            cache: Arc::new(MemoryCache::new()),
        };

        let router = Router::new()
            .route("/health", get(handlers::health))
            .nest("/api/v1", api_routes())
            .with_state(state);

        Self { router, schema }
    }

    /// Send a request and decode the JSON reply (`Null` for an empty body).
    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        self.send_request(request).await
    }

    /// Raw body, for payloads that are not valid JSON
    pub async fn send_raw(&self, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        self.send_request(request).await
    }

    async fn send_request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}
