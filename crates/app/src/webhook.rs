use std::{fmt, time::Instant};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use jaggerbot_core::{decode_callback, verify_signature, Callback, MessageType};
use metrics::{counter, histogram};
use tracing::{debug, error, info, warn};

use crate::router::AppState;

pub const CALLBACK_PATH: &str = "/jagger/callback";

const HEADER_MESSAGE_ID: &str = "Twitch-Eventsub-Message-Id";
const HEADER_TIMESTAMP: &str = "Twitch-Eventsub-Message-Timestamp";
const HEADER_SIGNATURE: &str = "Twitch-Eventsub-Message-Signature";
const HEADER_MESSAGE_TYPE: &str = "Twitch-Eventsub-Message-Type";

/// Per-request problem relayed to the control loop for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    SignatureMismatch {
        message_id: String,
    },
    Decode {
        message_id: String,
        message_type: String,
        detail: String,
    },
    SubscriptionRevoked {
        subscription_id: String,
        status: String,
    },
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignatureMismatch { message_id } => {
                write!(f, "signature mismatch for message {message_id}")
            }
            Self::Decode {
                message_id,
                message_type,
                detail,
            } => write!(
                f,
                "could not decode {message_type} message {message_id}: {detail}"
            ),
            Self::SubscriptionRevoked {
                subscription_id,
                status,
            } => write!(f, "subscription {subscription_id} revoked ({status})"),
        }
    }
}

/// Rejections answered with an empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookRejection {
    Forbidden,
    BadRequest,
    Unavailable,
}

impl IntoResponse for WebhookRejection {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        status.into_response()
    }
}

pub async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookRejection> {
    let start = Instant::now();
    let message_type = MessageType::from_header(header_str(&headers, HEADER_MESSAGE_TYPE));
    let message_label = message_type.metric_label();

    let result = process(&state, &headers, &message_type, &body).await;

    histogram!("webhook_ack_latency_seconds", "type" => message_label)
        .record(start.elapsed().as_secs_f64());
    result
}

async fn process(
    state: &AppState,
    headers: &HeaderMap,
    message_type: &MessageType,
    body: &Bytes,
) -> Result<Response, WebhookRejection> {
    let message_label = message_type.metric_label();
    let message_id = header_str(headers, HEADER_MESSAGE_ID);
    let timestamp = header_str(headers, HEADER_TIMESTAMP);
    let signature = header_str(headers, HEADER_SIGNATURE);
    debug!(stage = "ingress", %message_id, message_type = message_label, size_bytes = body.len(), "callback received");

    if let Err(err) = verify_signature(
        state.webhook_secret().as_ref(),
        message_id,
        timestamp,
        body,
        signature,
    ) {
        counter!("eventsub_invalid_signature_total", "type" => message_label).increment(1);
        warn!(stage = "ingress", %message_id, message_type = message_label, error = %err, "rejecting callback");
        report(
            state,
            CallbackError::SignatureMismatch {
                message_id: message_id.to_string(),
            },
        )
        .await;
        return Err(WebhookRejection::Forbidden);
    }

    counter!("eventsub_ingress_total", "type" => message_label).increment(1);

    let callback = match decode_callback(message_type, body) {
        Ok(callback) => callback,
        Err(err) => {
            counter!("eventsub_decode_errors_total", "type" => message_label).increment(1);
            warn!(stage = "ingress", %message_id, message_type = message_label, error = %err, "cannot decode callback");
            report(
                state,
                CallbackError::Decode {
                    message_id: message_id.to_string(),
                    message_type: header_str(headers, HEADER_MESSAGE_TYPE).to_string(),
                    detail: err.to_string(),
                },
            )
            .await;
            return Err(WebhookRejection::BadRequest);
        }
    };

    match callback {
        Callback::Challenge(challenge) => {
            info!(
                stage = "ingress",
                %message_id,
                subscription_id = %challenge.subscription.id,
                "answering webhook challenge"
            );
            let mut response = Response::new(Body::from(challenge.challenge));
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            Ok(response)
        }
        Callback::Notification(notification) => {
            info!(
                stage = "ingress",
                %message_id,
                subscription_type = %notification.subscription.kind,
                broadcaster_id = %notification.event.broadcaster_user_id,
                "dispatching stream event"
            );
            state.events().send(notification.event).await.map_err(|err| {
                error!(stage = "dispatch", %message_id, error = %err, "stream event not delivered");
                WebhookRejection::Unavailable
            })?;
            counter!("stream_events_dispatched_total").increment(1);
            Ok(StatusCode::OK.into_response())
        }
        Callback::Revocation(revocation) => {
            let subscription = revocation.subscription;
            warn!(
                stage = "ingress",
                %message_id,
                subscription_id = %subscription.id,
                status = %subscription.status,
                "subscription revoked by provider"
            );
            report(
                state,
                CallbackError::SubscriptionRevoked {
                    subscription_id: subscription.id,
                    status: subscription.status,
                },
            )
            .await;
            Ok(StatusCode::OK.into_response())
        }
    }
}

async fn report(state: &AppState, err: CallbackError) {
    if let Err(dispatch) = state.errors().send(err).await {
        error!(stage = "dispatch", error = %dispatch, "callback diagnostic not delivered");
    }
}

/// Missing or non-ASCII headers read as empty, which then fails verification.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}
