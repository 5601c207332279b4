use jaggerbot_core::types::{ChannelInformation, Subscription};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Client for the Helix endpoints the bot relies on: EventSub subscription
/// management and channel information.
#[derive(Clone)]
pub struct HelixClient {
    http: Client,
    base_url: Url,
    client_id: String,
}

impl HelixClient {
    /// Creates a new Helix client with the provided configuration.
    pub fn new(client_id: impl Into<String>, base_url: Url, http: Client) -> Self {
        Self {
            http,
            base_url,
            client_id: client_id.into(),
        }
    }

    /// Fetches one page of EventSub subscriptions owned by the app.
    pub async fn list_subscriptions(
        &self,
        access_token: &str,
        after: Option<&str>,
    ) -> Result<SubscriptionPage, HelixError> {
        let mut url = self.base_url.join("eventsub/subscriptions")?;
        if let Some(after) = after {
            url.query_pairs_mut().append_pair("after", after);
        }

        let response = self
            .authorized_request(Method::GET, url, access_token)
            .send()
            .await?;

        parse_json::<SubscriptionListResponse>(response)
            .await
            .map(SubscriptionPage::from)
    }

    /// Fetches every EventSub subscription, following pagination cursors.
    pub async fn list_all_subscriptions(
        &self,
        access_token: &str,
    ) -> Result<Vec<Subscription>, HelixError> {
        let mut subscriptions = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .list_subscriptions(access_token, cursor.as_deref())
                .await?;
            debug!(
                stage = "subscription",
                fetched = page.data.len(),
                total = page.total,
                "listed subscription page"
            );
            subscriptions.extend(page.data);
            match page.cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(subscriptions)
    }

    /// Registers a new EventSub subscription.
    pub async fn create_subscription(
        &self,
        access_token: &str,
        request: &Subscription,
    ) -> Result<CreateOutcome, HelixError> {
        let url = self.base_url.join("eventsub/subscriptions")?;
        let response = self
            .authorized_request(Method::POST, url, access_token)
            .json(request)
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            return Ok(CreateOutcome::AlreadyExists);
        }

        let mut created = parse_json::<SubscriptionListResponse>(response).await?;
        match created.data.pop() {
            Some(subscription) => Ok(CreateOutcome::Created(subscription)),
            None => Err(HelixError::EmptyResponse),
        }
    }

    /// Deletes the subscription with the given identifier.
    pub async fn delete_subscription(
        &self,
        access_token: &str,
        subscription_id: &str,
    ) -> Result<(), HelixError> {
        let mut url = self.base_url.join("eventsub/subscriptions")?;
        url.query_pairs_mut().append_pair("id", subscription_id);

        let response = self
            .authorized_request(Method::DELETE, url, access_token)
            .send()
            .await?;

        ensure_success(response).await
    }

    /// Fetches channel information (title, category) for a broadcaster.
    pub async fn get_channel_information(
        &self,
        access_token: &str,
        broadcaster_id: &str,
    ) -> Result<Vec<ChannelInformation>, HelixError> {
        let mut url = self.base_url.join("channels")?;
        url.query_pairs_mut()
            .append_pair("broadcaster_id", broadcaster_id);

        let response = self
            .authorized_request(Method::GET, url, access_token)
            .send()
            .await?;

        parse_json::<DataResponse<ChannelInformation>>(response)
            .await
            .map(|body| body.data)
    }

    fn authorized_request(
        &self,
        method: Method,
        url: Url,
        access_token: &str,
    ) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("Client-Id", &self.client_id)
            .header("Authorization", format!("Bearer {access_token}"))
    }
}

/// Result of a create call.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(Subscription),
    /// The provider already holds an identical subscription.
    AlreadyExists,
}

/// Page of subscription results.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionPage {
    pub data: Vec<Subscription>,
    pub total: u64,
    pub cursor: Option<String>,
}

impl From<SubscriptionListResponse> for SubscriptionPage {
    fn from(value: SubscriptionListResponse) -> Self {
        Self {
            data: value.data,
            total: value.total,
            cursor: value.pagination.and_then(|p| p.cursor),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SubscriptionListResponse {
    data: Vec<Subscription>,
    #[serde(default)]
    total: u64,
    pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Deserialize)]
struct DataResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct Pagination {
    cursor: Option<String>,
}

/// Errors produced by the Helix client.
#[derive(Debug, Error)]
pub enum HelixError {
    #[error("failed to build url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("response contained no data")]
    EmptyResponse,
}

impl HelixError {
    /// Returns `true` when the provider rejected the access token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status == StatusCode::UNAUTHORIZED)
    }
}

async fn ensure_success(response: Response) -> Result<(), HelixError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(HelixError::Status { status, body });
    }
    Ok(())
}

async fn parse_json<T>(response: Response) -> Result<T, HelixError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(HelixError::Status { status, body });
    }

    Ok(response.json().await?)
}
