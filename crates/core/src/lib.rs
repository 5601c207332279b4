//! Domain types and the authentication/decoding steps of EventSub webhook
//! ingestion. Nothing in this crate performs I/O.
pub mod decoder;
pub mod signature;
pub mod types;

pub use decoder::{decode_callback, Callback, DecodeError, MessageType};
pub use signature::{compute_signature, verify_signature, SignatureError};
pub use types::{
    ChallengeMessage, ChannelInformation, NotificationMessage, RevocationMessage, StreamEvent,
    Subscription, SubscriptionTransport,
};
