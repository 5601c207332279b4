use jaggerbot_core::types::{Subscription, WEBHOOK_METHOD};
use thiserror::Error;
use tracing::{info, warn};

use crate::helix::{CreateOutcome, HelixClient, HelixError};
use crate::oauth::{AppTokenSource, OAuthError};

/// How existing subscriptions are treated before registering a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionPolicy {
    /// Delete every subscription the app owns, then create a fresh one.
    Flush,
    /// Keep a live subscription that already targets the callback and delete
    /// every other `stream.online` subscription for the broadcaster; create
    /// a fresh one when none is live.
    #[default]
    Reconcile,
}

/// What [`SubscriptionManager::ensure_subscription`] ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionOutcome {
    Kept { subscription: Subscription, deleted: usize },
    Created { subscription: Subscription, deleted: usize },
    AlreadyExists { deleted: usize },
}

/// Ensures exactly one `stream.online` webhook subscription exists for the
/// configured broadcaster.
#[derive(Clone)]
pub struct SubscriptionManager {
    tokens: AppTokenSource,
    helix: HelixClient,
    policy: SubscriptionPolicy,
}

impl SubscriptionManager {
    pub fn new(tokens: AppTokenSource, helix: HelixClient, policy: SubscriptionPolicy) -> Self {
        Self {
            tokens,
            helix,
            policy,
        }
    }

    pub async fn ensure_subscription(
        &self,
        broadcaster_id: &str,
        secret: &str,
        callback_url: &str,
    ) -> Result<SubscriptionOutcome, SubscriptionError> {
        let token = self.tokens.access_token().await?;
        let existing = self.helix.list_all_subscriptions(&token).await?;
        info!(
            stage = "subscription",
            existing = existing.len(),
            policy = ?self.policy,
            "listed eventsub subscriptions"
        );

        let kept = match self.policy {
            SubscriptionPolicy::Flush => None,
            SubscriptionPolicy::Reconcile => existing
                .iter()
                .find(|sub| is_current(sub, broadcaster_id, callback_url)),
        };
        let stale: Vec<&Subscription> = match self.policy {
            SubscriptionPolicy::Flush => existing.iter().collect(),
            SubscriptionPolicy::Reconcile => existing
                .iter()
                .filter(|sub| sub.watches_stream_online(broadcaster_id))
                .filter(|sub| kept.map_or(true, |current| current.id != sub.id))
                .collect(),
        };

        for subscription in &stale {
            self.helix
                .delete_subscription(&token, &subscription.id)
                .await?;
            info!(
                stage = "subscription",
                subscription_id = %subscription.id,
                kind = %subscription.kind,
                status = %subscription.status,
                "deleted subscription"
            );
        }
        let deleted = stale.len();

        if let Some(current) = kept {
            info!(
                stage = "subscription",
                subscription_id = %current.id,
                status = %current.status,
                deleted,
                "live subscription already registered"
            );
            return Ok(SubscriptionOutcome::Kept {
                subscription: current.clone(),
                deleted,
            });
        }

        let request = Subscription::stream_online_webhook(broadcaster_id, callback_url, secret);
        match self.helix.create_subscription(&token, &request).await? {
            CreateOutcome::Created(subscription) => {
                info!(
                    stage = "subscription",
                    subscription_id = %subscription.id,
                    status = %subscription.status,
                    broadcaster_id,
                    "created stream.online subscription"
                );
                Ok(SubscriptionOutcome::Created {
                    subscription,
                    deleted,
                })
            }
            CreateOutcome::AlreadyExists => {
                warn!(
                    stage = "subscription",
                    broadcaster_id,
                    "subscription already exists, doing nothing"
                );
                Ok(SubscriptionOutcome::AlreadyExists { deleted })
            }
        }
    }
}

fn is_current(subscription: &Subscription, broadcaster_id: &str, callback_url: &str) -> bool {
    subscription.watches_stream_online(broadcaster_id)
        && subscription.is_live()
        && subscription.transport.method == WEBHOOK_METHOD
        && subscription.transport.callback == callback_url
}

/// Startup-time failure to register with the provider.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("failed to obtain app access token: {0}")]
    Auth(#[from] OAuthError),
    #[error("helix request failed: {0}")]
    Helix(#[from] HelixError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::TwitchOAuthClient;
    use httpmock::prelude::*;
    use httpmock::{Method, MockServer};
    use reqwest::Client;
    use serde_json::{json, Value};
    use url::Url;

    const CALLBACK: &str = "https://example.com/jagger/callback";

    fn manager(server: &MockServer, policy: SubscriptionPolicy) -> SubscriptionManager {
        let http = Client::builder().build().expect("client");
        let oauth = TwitchOAuthClient::new(
            "client-id",
            "client-secret",
            Url::parse(&server.url("/oauth2/")).expect("url"),
            http.clone(),
        );
        let helix = HelixClient::new(
            "client-id",
            Url::parse(&server.url("/helix/")).expect("url"),
            http,
        );
        SubscriptionManager::new(AppTokenSource::new(oauth), helix, policy)
    }

    fn subscription(id: &str, broadcaster: &str, status: &str, callback: &str) -> Value {
        json!({
            "id": id,
            "status": status,
            "type": "stream.online",
            "version": "1",
            "cost": 1,
            "condition": {"broadcaster_user_id": broadcaster},
            "transport": {"method": "webhook", "callback": callback},
            "created_at": "2024-01-01T00:00:00Z"
        })
    }

    async fn mock_token(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth2/token");
                then.status(200).json_body(json!({
                    "access_token": "app-token",
                    "expires_in": 3600,
                    "token_type": "bearer"
                }));
            })
            .await;
    }

    async fn mock_listing(server: &MockServer, data: Vec<Value>) {
        server
            .mock_async(move |when, then| {
                when.method(GET)
                    .path("/helix/eventsub/subscriptions")
                    .header("Authorization", "Bearer app-token");
                then.status(200).json_body(json!({
                    "data": data,
                    "total": 0,
                    "pagination": {}
                }));
            })
            .await;
    }

    #[tokio::test]
    async fn reconcile_keeps_live_subscription_for_same_callback() {
        let server = MockServer::start_async().await;
        mock_token(&server).await;
        mock_listing(
            &server,
            vec![subscription("sub-1", "b-1", "enabled", CALLBACK)],
        )
        .await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST).path("/helix/eventsub/subscriptions");
                then.status(202).json_body(json!({"data": []}));
            })
            .await;

        let outcome = manager(&server, SubscriptionPolicy::Reconcile)
            .ensure_subscription("b-1", "secret", CALLBACK)
            .await
            .expect("ensure");

        assert!(matches!(
            outcome,
            SubscriptionOutcome::Kept { subscription, deleted: 0 } if subscription.id == "sub-1"
        ));
        create.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn reconcile_keeps_current_and_deletes_other_callbacks() {
        let server = MockServer::start_async().await;
        mock_token(&server).await;
        mock_listing(
            &server,
            vec![
                subscription("sub-old", "b-1", "enabled", "https://old.example.com/cb"),
                subscription("sub-cur", "b-1", "enabled", CALLBACK),
            ],
        )
        .await;
        let delete_old = server
            .mock_async(|when, then| {
                when.method(Method::DELETE)
                    .path("/helix/eventsub/subscriptions")
                    .query_param("id", "sub-old");
                then.status(204);
            })
            .await;
        let delete_current = server
            .mock_async(|when, then| {
                when.method(Method::DELETE)
                    .path("/helix/eventsub/subscriptions")
                    .query_param("id", "sub-cur");
                then.status(204);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST).path("/helix/eventsub/subscriptions");
                then.status(202).json_body(json!({"data": []}));
            })
            .await;

        let outcome = manager(&server, SubscriptionPolicy::Reconcile)
            .ensure_subscription("b-1", "secret", CALLBACK)
            .await
            .expect("ensure");

        delete_old.assert_async().await;
        delete_current.assert_hits_async(0).await;
        create.assert_hits_async(0).await;
        assert!(matches!(
            outcome,
            SubscriptionOutcome::Kept { subscription, deleted: 1 } if subscription.id == "sub-cur"
        ));
    }

    #[tokio::test]
    async fn reconcile_replaces_stale_subscription() {
        let server = MockServer::start_async().await;
        mock_token(&server).await;
        mock_listing(
            &server,
            vec![
                subscription("sub-old", "b-1", "enabled", "https://old.example.com/cb"),
                subscription("sub-other", "b-2", "enabled", CALLBACK),
            ],
        )
        .await;
        let delete_old = server
            .mock_async(|when, then| {
                when.method(Method::DELETE)
                    .path("/helix/eventsub/subscriptions")
                    .query_param("id", "sub-old");
                then.status(204);
            })
            .await;
        let delete_other = server
            .mock_async(|when, then| {
                when.method(Method::DELETE)
                    .path("/helix/eventsub/subscriptions")
                    .query_param("id", "sub-other");
                then.status(204);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/helix/eventsub/subscriptions")
                    .json_body_partial(r#"{"type":"stream.online","transport":{"callback":"https://example.com/jagger/callback"}}"#);
                then.status(202).json_body(json!({
                    "data": [subscription(
                        "sub-new",
                        "b-1",
                        "webhook_callback_verification_pending",
                        CALLBACK
                    )]
                }));
            })
            .await;

        let outcome = manager(&server, SubscriptionPolicy::Reconcile)
            .ensure_subscription("b-1", "secret", CALLBACK)
            .await
            .expect("ensure");

        delete_old.assert_async().await;
        delete_other.assert_hits_async(0).await;
        create.assert_async().await;
        match outcome {
            SubscriptionOutcome::Created {
                subscription,
                deleted,
            } => {
                assert_eq!(subscription.id, "sub-new");
                assert_eq!(deleted, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn flush_deletes_everything_before_creating() {
        let server = MockServer::start_async().await;
        mock_token(&server).await;
        mock_listing(
            &server,
            vec![
                subscription("sub-1", "b-1", "enabled", CALLBACK),
                subscription("sub-2", "b-2", "enabled", CALLBACK),
            ],
        )
        .await;
        let delete = server
            .mock_async(|when, then| {
                when.method(Method::DELETE)
                    .path("/helix/eventsub/subscriptions");
                then.status(204);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST).path("/helix/eventsub/subscriptions");
                then.status(202).json_body(json!({
                    "data": [subscription("sub-new", "b-1", "webhook_callback_verification_pending", CALLBACK)]
                }));
            })
            .await;

        let outcome = manager(&server, SubscriptionPolicy::Flush)
            .ensure_subscription("b-1", "secret", CALLBACK)
            .await
            .expect("ensure");

        delete.assert_hits_async(2).await;
        create.assert_async().await;
        assert!(matches!(
            outcome,
            SubscriptionOutcome::Created { deleted: 2, .. }
        ));
    }

    #[tokio::test]
    async fn conflict_on_create_is_not_an_error() {
        let server = MockServer::start_async().await;
        mock_token(&server).await;
        mock_listing(&server, Vec::new()).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/helix/eventsub/subscriptions");
                then.status(409).body("subscription already exists");
            })
            .await;

        let outcome = manager(&server, SubscriptionPolicy::Reconcile)
            .ensure_subscription("b-1", "secret", CALLBACK)
            .await
            .expect("ensure");
        assert_eq!(outcome, SubscriptionOutcome::AlreadyExists { deleted: 0 });
    }

    #[tokio::test]
    async fn token_failure_aborts_setup() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth2/token");
                then.status(403).body("invalid client");
            })
            .await;

        let err = manager(&server, SubscriptionPolicy::Reconcile)
            .ensure_subscription("b-1", "secret", CALLBACK)
            .await
            .expect_err("should fail");
        assert!(matches!(err, SubscriptionError::Auth(_)));
    }
}
