use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

/// Tokens are refreshed this long before the provider-reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Client responsible for OAuth flow interactions with Twitch.
#[derive(Clone)]
pub struct TwitchOAuthClient {
    http: Client,
    base_url: Url,
    client_id: String,
    client_secret: String,
}

impl TwitchOAuthClient {
    /// Creates a new client with the provided HTTP instance and configuration.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        base_url: Url,
        http: Client,
    ) -> Self {
        Self {
            http,
            base_url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Requests an app access token with the client-credentials grant.
    pub async fn client_credentials(&self) -> Result<TokenResponse, OAuthError> {
        let url = self.base_url.join("token")?;
        let response = self
            .http
            .post(url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        parse_json(response).await
    }
}

/// Token response returned by the Twitch token endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    pub token_type: String,
}

impl TokenResponse {
    /// Computes the expiration timestamp relative to the provided instant.
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::seconds(self.expires_in as i64)
    }
}

/// Caches the app access token and re-issues it once it is close to expiry.
#[derive(Clone)]
pub struct AppTokenSource {
    oauth: TwitchOAuthClient,
    cached: Arc<Mutex<Option<CachedToken>>>,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl AppTokenSource {
    pub fn new(oauth: TwitchOAuthClient) -> Self {
        Self {
            oauth,
            cached: Arc::new(Mutex::new(None)),
            clock: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns a usable app access token, requesting a new one when needed.
    pub async fn access_token(&self) -> Result<String, OAuthError> {
        let mut guard = self.cached.lock().await;
        let now = (self.clock)();
        if let Some(token) = guard.as_ref() {
            if token.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now {
                return Ok(token.access_token.clone());
            }
        }

        let response = self.oauth.client_credentials().await?;
        let token = CachedToken {
            expires_at: response.expires_at(now),
            access_token: response.access_token,
        };
        let access_token = token.access_token.clone();
        *guard = Some(token);
        Ok(access_token)
    }

    /// Drops the cached token so the next call requests a fresh one.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }
}

/// Errors that can occur during OAuth interactions.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

async fn parse_json<T>(response: Response) -> Result<T, OAuthError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(OAuthError::Status { status, body });
    }

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn client(base_url: &Url) -> TwitchOAuthClient {
        TwitchOAuthClient::new(
            "client",
            "secret",
            base_url.clone(),
            Client::builder().build().expect("client"),
        )
    }

    fn token_body(token: &str, expires_in: u64) -> serde_json::Value {
        json!({
            "access_token": token,
            "expires_in": expires_in,
            "token_type": "bearer"
        })
    }

    #[tokio::test]
    async fn client_credentials_posts_form() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/oauth2/")).expect("url");
        let client = client(&base);

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/oauth2/token")
                    .body_contains("client_id=client")
                    .body_contains("client_secret=secret")
                    .body_contains("grant_type=client_credentials");
                then.status(200).json_body(token_body("app-token", 5011271));
            })
            .await;

        let response = client.client_credentials().await.expect("token");
        mock.assert_async().await;
        assert_eq!(response.access_token, "app-token");
        assert_eq!(response.expires_in, 5011271);
    }

    #[tokio::test]
    async fn non_success_status_returns_error() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/oauth2/")).expect("url");
        let client = client(&base);

        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth2/token");
                then.status(400).body("invalid client secret");
            })
            .await;

        let err = client.client_credentials().await.expect_err("should error");
        match err {
            OAuthError::Status { status, body } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, "invalid client secret");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn token_source_reuses_token_until_expiry() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/oauth2/")).expect("url");

        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth2/token");
                then.status(200).json_body(token_body("app-token", 3600));
            })
            .await;

        let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .expect("time")
            .with_timezone(&Utc);
        let now = Arc::new(StdMutex::new(start));
        let clock_now = now.clone();
        let source = AppTokenSource::new(client(&base))
            .with_clock(Arc::new(move || *clock_now.lock().expect("clock")));

        assert_eq!(source.access_token().await.expect("token"), "app-token");
        assert_eq!(source.access_token().await.expect("token"), "app-token");
        mock.assert_hits_async(1).await;

        *now.lock().expect("clock") = start + Duration::seconds(3600);
        source.access_token().await.expect("token");
        mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn invalidate_forces_new_token() {
        let server = MockServer::start_async().await;
        let base = Url::parse(&server.url("/oauth2/")).expect("url");

        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth2/token");
                then.status(200).json_body(token_body("app-token", 3600));
            })
            .await;

        let source = AppTokenSource::new(client(&base));
        source.access_token().await.expect("token");
        source.invalidate().await;
        source.access_token().await.expect("token");
        mock.assert_hits_async(2).await;
    }
}
