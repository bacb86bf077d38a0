//! Message integrity envelope.
//!
//! Both ends share one [`MessageSigner`]. Request and response bodies are
//! wrapped before they hit the wire and unwrapped on receipt; everything in
//! between treats the envelope as opaque bytes.
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Error decoding envelope with Bincode: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),

    #[error("Envelope signature is malformed")]
    MalformedSignature,

    #[error("Unable to verify data: {0}")]
    BadSignature(#[from] ed25519_dalek::SignatureError),
}

pub trait MessageSigner: Send + Sync {
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, EnvelopeError>;

    /// Check the envelope and hand back the payload it carries.
    fn verify(&self, envelope: &[u8]) -> Result<Vec<u8>, EnvelopeError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    payload: Vec<u8>,
    signature: Vec<u8>,
}

/// Detached Ed25519 signatures over the raw payload.
#[derive(Clone)]
pub struct Ed25519Signer {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl Ed25519Signer {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Derive the key from a passphrase both ends were configured with.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        Self::from_seed(seed)
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("verifying_key", &self.verifying_key.as_bytes())
            .finish()
    }
}

impl MessageSigner for Ed25519Signer {
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        let signature = self.signing_key.sign(payload);
        let envelope = Envelope {
            payload: payload.to_vec(),
            signature: signature.to_bytes().to_vec(),
        };
        Ok(bincode::serialize(&envelope)?)
    }

    fn verify(&self, envelope: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        let envelope: Envelope = bincode::deserialize(envelope)?;
        let signature = Signature::from_slice(&envelope.signature)
            .map_err(|_| EnvelopeError::MalformedSignature)?;
        if let Err(err) = self.verifying_key.verify(&envelope.payload, &signature) {
            debug!("Envelope signature mismatch for {} byte payload", envelope.payload.len());
            return Err(err.into());
        }
        Ok(envelope.payload)
    }
}
