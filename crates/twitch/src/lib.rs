pub mod helix;
pub mod oauth;
pub mod subscription;

pub use helix::{CreateOutcome, HelixClient, HelixError, SubscriptionPage};
pub use oauth::{AppTokenSource, OAuthError, TokenResponse, TwitchOAuthClient};
pub use subscription::{
    SubscriptionError, SubscriptionManager, SubscriptionOutcome, SubscriptionPolicy,
};
