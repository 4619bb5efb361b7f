//! Backend trait and boundary error type.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::core::Circuit;

/// Failure of a backend call. Stored in workflow state and shown to the user, so it is
/// clonable and carries its details as text.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendError {
    #[error("Invalid circuit: {details}")]
    InvalidCircuit { details: String },
    #[error("SRS setup failed: {details}")]
    SrsUnavailable { details: String },
    #[error("Witness creation failed: {details}")]
    WitnessCreation { details: String },
    #[error("Proof generation failed: {details}")]
    ProverInternal { details: String },
    #[error("Verification key generation failed: {details}")]
    VerificationKey { details: String },
    #[error("Malformed proof: {details}")]
    MalformedProof { details: String },
    #[error("Proof verification failed: {details}")]
    Verifier { details: String },
    #[error("backend operation timed out after {after:?}")]
    Timeout { after: Duration },
    #[error("backend task aborted before returning")]
    TaskAborted,
}

impl BackendError {
    pub fn prover(details: impl Into<String>) -> Self {
        BackendError::ProverInternal {
            details: details.into(),
        }
    }

    pub fn verifier(details: impl Into<String>) -> Self {
        BackendError::Verifier {
            details: details.into(),
        }
    }
}

/// A proving system reachable from the workflow.
///
/// Calls block for as long as proving or verification takes; callers that must stay
/// responsive run them on a blocking thread.
pub trait ProverBackend: Send + Sync {
    /// Returns the backend name (e.g., "barretenberg", "mock").
    fn name(&self) -> &str;

    /// Returns the backend version, if available.
    fn version(&self) -> Option<String>;

    /// Generate a proof for `circuit`.
    ///
    /// # Arguments
    /// * `circuit` - The compiled program bundle, forwarded as-is
    /// * `srs_path` - Locally cached SRS; `None` lets the backend obtain one itself
    /// * `inputs` - String-encoded field elements in ABI parameter order
    ///
    /// # Returns
    /// The proof bytes
    fn generate_proof(
        &self,
        circuit: &Circuit,
        srs_path: Option<&Path>,
        inputs: &[String],
    ) -> Result<Vec<u8>, BackendError>;

    /// Verify `proof` against `circuit`.
    ///
    /// `Ok(false)` means the backend ran and rejected the proof; `Err` means the call
    /// itself failed.
    fn verify_proof(&self, circuit: &Circuit, proof: &[u8]) -> Result<bool, BackendError>;
}
