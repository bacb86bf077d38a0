use calcbench_core::{CalcError, EnvelopeError, FrameError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Address parsing error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Invalid WebSocket message type")]
    InvalidType,

    #[error("Error in Axum: {0}")]
    Axum(#[from] axum::Error),

    #[error("Error in Tungstenite: {0}")]
    Tungstenite(#[from] tungstenite::Error),

    #[error("{0}")]
    Frame(#[from] FrameError),
}

/// Failure to turn one signed request into one signed result.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Request failed verification: {0}")]
    Verify(#[source] EnvelopeError),

    #[error(transparent)]
    Calculation(#[from] CalcError),

    #[error("Unable to sign result: {0}")]
    Sign(#[source] EnvelopeError),
}
