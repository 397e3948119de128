use raildelay_core::error::ClockError;
use raildelay_core::model::PassageKey;

#[derive(thiserror::Error, Debug)]
pub enum RealtimeError {
    #[error("no passage recorded for key {0}")]
    ItemNotFound(PassageKey),
    #[error("realtime store failure: {0}")]
    Store(#[from] sled::Error),
    #[error("failed to encode or decode a passage record: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("vendor API request failed: {0}")]
    Http(String),
    #[error("vendor API retry budget of {0}s exhausted for {1}")]
    RetryTimeout(u64, String),
    #[error("cannot parse vendor payload: {0}")]
    Parse(String),
    #[error("clock failure on realtime data: {0}")]
    Clock(#[from] ClockError),
    #[error("invalid realtime configuration: {0}")]
    Configuration(String),
}
