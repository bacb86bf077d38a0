use calcbench_core::{AuthError, CalcError, EnvelopeError};
use calcbench_server::StreamError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Error in parsing URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] tungstenite::http::header::InvalidHeaderValue),

    #[error("Unable to obtain credential: {0}")]
    Credential(#[from] AuthError),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Calculation(#[from] CalcError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
}

impl TransportError {
    /// The server understood the request and refused it.
    pub fn is_rejection(&self) -> bool {
        matches!(self, TransportError::Status { status, .. } if *status == 400)
    }
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Setup failed: {0}")]
    Setup(#[from] TransportError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
