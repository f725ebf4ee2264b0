use thiserror::Error;

/// Why an inbound payload could not be turned into an event.
#[derive(Error, Debug)]
pub enum EventError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid event: {0}")]
    Invalid(String),
}
