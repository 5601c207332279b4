use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use jaggerbot_core::StreamEvent;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::dispatcher::Handoff;
use crate::webhook::{self, CallbackError, CALLBACK_PATH};
use crate::telemetry;

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    webhook_secret: Arc<[u8]>,
    events: Handoff<StreamEvent>,
    errors: Handoff<CallbackError>,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        webhook_secret: Arc<[u8]>,
        events: Handoff<StreamEvent>,
        errors: Handoff<CallbackError>,
    ) -> Self {
        Self {
            metrics,
            webhook_secret,
            events,
            errors,
        }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn webhook_secret(&self) -> Arc<[u8]> {
        self.webhook_secret.clone()
    }

    pub fn events(&self) -> &Handoff<StreamEvent> {
        &self.events
    }

    pub fn errors(&self) -> &Handoff<CallbackError> {
        &self.errors
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route(CALLBACK_PATH, post(webhook::handle))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}
