use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Error framing reply with Bincode: {0}")]
pub struct FrameError(#[from] Box<bincode::ErrorKind>);

/// A server-to-client frame on either result stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// Signed envelope around an encoded [`Calculation`](crate::Calculation).
    Result(Vec<u8>),

    /// The request could not be performed. The stream stays open.
    Rejected { id: Option<i32>, reason: String },
}

impl Reply {
    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
