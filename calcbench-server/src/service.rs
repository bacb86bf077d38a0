use crate::error::ProcessError;
use calcbench_core::{perform, MessageSigner};
use std::sync::Arc;

/// Verify, calculate, re-sign.
#[derive(Clone)]
pub struct CalcService {
    signer: Arc<dyn MessageSigner>,
}

impl CalcService {
    pub fn new(signer: Arc<dyn MessageSigner>) -> Self {
        Self { signer }
    }

    pub fn process(&self, envelope: &[u8]) -> Result<Vec<u8>, ProcessError> {
        let payload = self.signer.verify(envelope).map_err(ProcessError::Verify)?;
        let result = perform(&payload)?;
        self.signer.sign(&result).map_err(ProcessError::Sign)
    }
}
