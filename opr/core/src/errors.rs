use std::time::Duration;
use thiserror::Error;

/// Terminal conditions reported by the height feed.
///
/// Once raised, heights from the feed can no longer be trusted and every
/// consumer must wind down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("no new height observed within {0:?}")]
    Timeout(Duration),

    #[error("chain connection lost: {0}")]
    Disconnected(String),
}
