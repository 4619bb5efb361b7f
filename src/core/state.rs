//! Observable workflow state and its transitions.
//!
//! `WorkflowState` is a plain value: every transition is a synchronous method that either
//! accepts (returning a ticket for the backend call it authorises) or reports why it was
//! ignored. The controller owns the only mutable copy and publishes clones to observers.
//!
//! Each operation kind keeps two ids:
//! - `attempt`: the attempt whose result may be shown. Bumped on every accepted request and
//!   whenever the status is invalidated.
//! - `in_flight`: the attempt whose backend call is still outstanding. This is the busy flag.
//!
//! A completion is applied only when its ticket matches both; otherwise it is discarded.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::backend::BackendError;

/// Proof bytes owned by the workflow.
#[derive(Clone, PartialEq, Eq)]
pub struct ProofArtifact(Arc<[u8]>);

impl ProofArtifact {
    pub fn new(bytes: Vec<u8>) -> Self {
        ProofArtifact(Arc::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sha256(&self) -> String {
        crate::sha256_hex(&self.0)
    }
}

impl fmt::Debug for ProofArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProofArtifact({} bytes)", self.0.len())
    }
}

/// Result payload of a kind of operation, plus the text shown for it.
pub trait OperationKind: Clone + fmt::Debug + PartialEq + Serialize {
    /// Status text while the backend call is outstanding.
    const RUNNING: &'static str;
    /// Prefix for a failed call.
    const FAILED: &'static str;

    fn describe(&self) -> String;
}

/// Successful proof generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Generated {
    pub proof_len: usize,
}

impl OperationKind for Generated {
    const RUNNING: &'static str = "Generating proof...";
    const FAILED: &'static str = "Error generating proof";

    fn describe(&self) -> String {
        format!("Proof generated successfully ({} bytes).", self.proof_len)
    }
}

/// A verification call that returned normally. `valid == false` means the backend
/// rejected the proof, not that the call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verified {
    pub valid: bool,
}

impl OperationKind for Verified {
    const RUNNING: &'static str = "Verifying proof...";
    const FAILED: &'static str = "Error verifying proof";

    fn describe(&self) -> String {
        format!("Proof verification result: {}", self.valid)
    }
}

/// Last recorded status of one operation kind.
///
/// `Succeeded` and `Failed` are annotations on an idle operation: once recorded, a new
/// request of the same kind may start.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus<T> {
    Idle,
    Running,
    Succeeded(T),
    Failed(BackendError),
}

impl<T> Default for OperationStatus<T> {
    fn default() -> Self {
        OperationStatus::Idle
    }
}

impl<T: OperationKind> OperationStatus<T> {
    /// User-facing status line, `None` when idle with nothing to report.
    pub fn text(&self) -> Option<String> {
        match self {
            OperationStatus::Idle => None,
            OperationStatus::Running => Some(T::RUNNING.to_string()),
            OperationStatus::Succeeded(out) => Some(out.describe()),
            OperationStatus::Failed(err) => Some(format!("{}: {err}", T::FAILED)),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OperationStatus::Idle => "idle",
            OperationStatus::Running => "running",
            OperationStatus::Succeeded(_) => "succeeded",
            OperationStatus::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationState<T> {
    status: OperationStatus<T>,
    attempt: u64,
    in_flight: Option<u64>,
    started_at: Option<String>,
    finished_at: Option<String>,
}

impl<T> Default for OperationState<T> {
    fn default() -> Self {
        OperationState {
            status: OperationStatus::Idle,
            attempt: 0,
            in_flight: None,
            started_at: None,
            finished_at: None,
        }
    }
}

impl<T: OperationKind> OperationState<T> {
    pub fn status(&self) -> &OperationStatus<T> {
        &self.status
    }

    /// A backend call of this kind is outstanding.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn started_at(&self) -> Option<&str> {
        self.started_at.as_deref()
    }

    pub fn finished_at(&self) -> Option<&str> {
        self.finished_at.as_deref()
    }

    pub fn text(&self) -> Option<String> {
        self.status.text()
    }

    fn begin(&mut self) -> Option<u64> {
        if self.in_flight.is_some() {
            return None;
        }
        self.attempt += 1;
        self.in_flight = Some(self.attempt);
        self.status = OperationStatus::Running;
        self.started_at = Some(crate::now_rfc3339());
        self.finished_at = None;
        Some(self.attempt)
    }

    /// Forget the shown status so no outstanding result can land on it.
    /// The busy flag is left alone: the call is still running.
    fn invalidate(&mut self) {
        self.attempt += 1;
        self.status = OperationStatus::Idle;
        self.started_at = None;
        self.finished_at = None;
    }

    fn finish(&mut self, attempt: u64, status: OperationStatus<T>) -> Completion {
        let was_in_flight = self.in_flight == Some(attempt);
        if was_in_flight {
            self.in_flight = None;
        }
        if !was_in_flight || self.attempt != attempt {
            return Completion::StaleDiscarded;
        }
        self.status = status;
        self.finished_at = Some(crate::now_rfc3339());
        Completion::Applied
    }

    fn report(&self) -> OperationReport<T> {
        let (result, error) = match &self.status {
            OperationStatus::Succeeded(out) => (Some(out.clone()), None),
            OperationStatus::Failed(err) => (None, Some(err.clone())),
            _ => (None, None),
        };
        OperationReport {
            status: self.status.label(),
            busy: self.is_busy(),
            attempt: self.attempt,
            message: self.text(),
            result,
            error,
            started_at: self.started_at.clone(),
            finished_at: self.finished_at.clone(),
        }
    }
}

/// Why a request was not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    GenerationBusy,
    VerificationBusy,
    NoProof,
}

impl fmt::Display for Ignored {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ignored::GenerationBusy => f.write_str("proof generation already running"),
            Ignored::VerificationBusy => f.write_str("proof verification already running"),
            Ignored::NoProof => f.write_str("no proof to verify"),
        }
    }
}

/// What happened to a backend result when it came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    StaleDiscarded,
}

/// Authorises one proof generation call.
#[derive(Debug)]
pub struct GenerationTicket {
    attempt: u64,
}

impl GenerationTicket {
    pub fn attempt(&self) -> u64 {
        self.attempt
    }
}

/// Authorises one verification call against a specific proof.
#[derive(Debug)]
pub struct VerificationTicket {
    attempt: u64,
    proof: ProofArtifact,
}

impl VerificationTicket {
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn proof(&self) -> &ProofArtifact {
        &self.proof
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowState {
    generation: OperationState<Generated>,
    verification: OperationState<Verified>,
    current_proof: Option<ProofArtifact>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> &OperationState<Generated> {
        &self.generation
    }

    pub fn verification(&self) -> &OperationState<Verified> {
        &self.verification
    }

    pub fn current_proof(&self) -> Option<&ProofArtifact> {
        self.current_proof.as_ref()
    }

    /// Accept a generation request. Clears the current proof and any verification status
    /// before the backend call is made.
    pub fn begin_generation(&mut self) -> Result<GenerationTicket, Ignored> {
        let attempt = self.generation.begin().ok_or(Ignored::GenerationBusy)?;
        self.current_proof = None;
        self.verification.invalidate();
        Ok(GenerationTicket { attempt })
    }

    pub fn finish_generation(
        &mut self,
        ticket: GenerationTicket,
        result: Result<Vec<u8>, BackendError>,
    ) -> Completion {
        let (status, proof) = match result {
            Ok(bytes) => {
                let proof = ProofArtifact::new(bytes);
                let status = OperationStatus::Succeeded(Generated {
                    proof_len: proof.len(),
                });
                (status, Some(proof))
            }
            Err(err) => (OperationStatus::Failed(err), None),
        };
        let completion = self.generation.finish(ticket.attempt, status);
        if completion == Completion::Applied {
            self.current_proof = proof;
        }
        completion
    }

    /// Accept a verification request for the current proof.
    pub fn begin_verification(&mut self) -> Result<VerificationTicket, Ignored> {
        let proof = self.current_proof.clone().ok_or(Ignored::NoProof)?;
        let attempt = self
            .verification
            .begin()
            .ok_or(Ignored::VerificationBusy)?;
        Ok(VerificationTicket { attempt, proof })
    }

    pub fn finish_verification(
        &mut self,
        ticket: VerificationTicket,
        result: Result<bool, BackendError>,
    ) -> Completion {
        let status = match result {
            Ok(valid) => OperationStatus::Succeeded(Verified { valid }),
            Err(err) => OperationStatus::Failed(err),
        };
        self.verification.finish(ticket.attempt, status)
    }

    /// Serializable view of the state.
    pub fn report(&self) -> StateReport {
        StateReport {
            generation: self.generation.report(),
            verification: self.verification.report(),
            proof_len: self.current_proof.as_ref().map(ProofArtifact::len),
            proof_sha256: self.current_proof.as_ref().map(ProofArtifact::sha256),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationReport<T> {
    pub status: &'static str,
    pub busy: bool,
    pub attempt: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BackendError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateReport {
    pub generation: OperationReport<Generated>,
    pub verification: OperationReport<Verified>,
    pub proof_len: Option<usize>,
    pub proof_sha256: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generated(state: &mut WorkflowState, bytes: Vec<u8>) -> ProofArtifact {
        let ticket = state.begin_generation().unwrap();
        assert_eq!(
            state.finish_generation(ticket, Ok(bytes)),
            Completion::Applied
        );
        state.current_proof().cloned().unwrap()
    }

    #[test]
    fn test_initial_state_is_idle() {
        let state = WorkflowState::new();
        assert_eq!(state.generation().status(), &OperationStatus::Idle);
        assert_eq!(state.verification().status(), &OperationStatus::Idle);
        assert!(!state.generation().is_busy());
        assert!(state.current_proof().is_none());
        assert!(state.generation().text().is_none());
    }

    #[test]
    fn test_begin_generation_marks_running() {
        let mut state = WorkflowState::new();
        let ticket = state.begin_generation().unwrap();
        assert_eq!(ticket.attempt(), 1);
        assert!(state.generation().is_busy());
        assert_eq!(
            state.generation().text().as_deref(),
            Some("Generating proof...")
        );
    }

    #[test]
    fn test_second_generation_ignored_while_busy() {
        let mut state = WorkflowState::new();
        let _ticket = state.begin_generation().unwrap();
        let before = state.clone();
        assert_eq!(
            state.begin_generation().unwrap_err(),
            Ignored::GenerationBusy
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_generation_success_stores_proof() {
        let mut state = WorkflowState::new();
        let proof = generated(&mut state, vec![7u8; 480]);
        assert_eq!(proof.len(), 480);
        assert!(!state.generation().is_busy());
        assert_eq!(
            state.generation().status(),
            &OperationStatus::Succeeded(Generated { proof_len: 480 })
        );
        assert_eq!(
            state.generation().text().as_deref(),
            Some("Proof generated successfully (480 bytes).")
        );
        assert!(state.generation().finished_at().is_some());
    }

    #[test]
    fn test_generation_failure_leaves_no_proof() {
        let mut state = WorkflowState::new();
        let ticket = state.begin_generation().unwrap();
        let err = BackendError::SrsUnavailable {
            details: "SRS fetch failed".into(),
        };
        state.finish_generation(ticket, Err(err.clone()));
        assert!(state.current_proof().is_none());
        assert!(!state.generation().is_busy());
        assert_eq!(state.generation().status(), &OperationStatus::Failed(err));
        assert!(
            state
                .generation()
                .text()
                .unwrap()
                .contains("SRS fetch failed")
        );
        assert_eq!(
            state.begin_verification().unwrap_err(),
            Ignored::NoProof
        );
    }

    #[test]
    fn test_new_generation_clears_proof_and_verification() {
        let mut state = WorkflowState::new();
        generated(&mut state, vec![1, 2, 3]);
        let ticket = state.begin_verification().unwrap();
        state.finish_verification(ticket, Ok(true));
        assert!(matches!(
            state.verification().status(),
            OperationStatus::Succeeded(Verified { valid: true })
        ));

        let _ticket = state.begin_generation().unwrap();
        assert!(state.current_proof().is_none());
        assert_eq!(state.verification().status(), &OperationStatus::Idle);
        assert!(state.verification().text().is_none());
    }

    #[test]
    fn test_verification_requires_proof() {
        let mut state = WorkflowState::new();
        let before = state.clone();
        assert_eq!(
            state.begin_verification().unwrap_err(),
            Ignored::NoProof
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_verification_single_flight() {
        let mut state = WorkflowState::new();
        generated(&mut state, vec![9; 4]);
        let _ticket = state.begin_verification().unwrap();
        assert_eq!(
            state.begin_verification().unwrap_err(),
            Ignored::VerificationBusy
        );
    }

    #[test]
    fn test_verification_ticket_carries_current_proof() {
        let mut state = WorkflowState::new();
        let proof = generated(&mut state, vec![5; 480]);
        let ticket = state.begin_verification().unwrap();
        assert_eq!(ticket.proof(), &proof);
        assert_eq!(ticket.proof().as_bytes(), &[5u8; 480][..]);
    }

    #[test]
    fn test_invalid_proof_is_a_successful_call() {
        let mut state = WorkflowState::new();
        generated(&mut state, vec![0; 8]);

        let ticket = state.begin_verification().unwrap();
        state.finish_verification(ticket, Ok(false));
        let rejected = state.verification().status().clone();
        assert_eq!(
            rejected,
            OperationStatus::Succeeded(Verified { valid: false })
        );
        assert_eq!(
            state.verification().text().as_deref(),
            Some("Proof verification result: false")
        );

        let ticket = state.begin_verification().unwrap();
        state.finish_verification(
            ticket,
            Err(BackendError::MalformedProof {
                details: "truncated".into(),
            }),
        );
        assert_ne!(state.verification().status(), &rejected);
        assert_eq!(state.verification().status().label(), "failed");
        assert!(
            state
                .verification()
                .text()
                .unwrap()
                .starts_with("Error verifying proof: ")
        );
    }

    #[test]
    fn test_superseded_verification_is_discarded() {
        let mut state = WorkflowState::new();
        generated(&mut state, vec![1; 16]);
        let stale = state.begin_verification().unwrap();

        let gen_ticket = state.begin_generation().unwrap();
        // Verification status is reset but the old call still holds the busy flag.
        assert_eq!(state.verification().status(), &OperationStatus::Idle);
        assert!(state.verification().is_busy());

        state.finish_generation(gen_ticket, Ok(vec![2; 16]));
        assert_eq!(
            state.begin_verification().unwrap_err(),
            Ignored::VerificationBusy
        );

        assert_eq!(
            state.finish_verification(stale, Ok(true)),
            Completion::StaleDiscarded
        );
        assert_eq!(state.verification().status(), &OperationStatus::Idle);
        assert!(!state.verification().is_busy());
        assert!(state.begin_verification().is_ok());
    }

    #[test]
    fn test_superseded_generation_is_discarded() {
        let mut state = WorkflowState::new();
        let first = state.begin_generation().unwrap();
        state.finish_generation(first, Err(BackendError::TaskAborted));

        let current = state.begin_generation().unwrap();
        let late = GenerationTicket { attempt: 1 };
        assert_eq!(
            state.finish_generation(late, Ok(vec![0xAA; 32])),
            Completion::StaleDiscarded
        );
        assert!(state.current_proof().is_none());
        assert_eq!(state.generation().status(), &OperationStatus::Running);
        assert!(state.generation().is_busy());

        state.finish_generation(current, Ok(vec![0xBB; 64]));
        assert_eq!(state.current_proof().unwrap().as_bytes(), &[0xBB; 64][..]);
    }

    #[test]
    fn test_duplicate_completion_is_discarded() {
        let mut state = WorkflowState::new();
        generated(&mut state, vec![3; 10]);
        let replay = GenerationTicket { attempt: 1 };
        assert_eq!(
            state.finish_generation(replay, Err(BackendError::TaskAborted)),
            Completion::StaleDiscarded
        );
        assert!(matches!(
            state.generation().status(),
            OperationStatus::Succeeded(_)
        ));
    }

    #[test]
    fn test_report_serializes() {
        let mut state = WorkflowState::new();
        generated(&mut state, vec![4; 480]);
        let json = serde_json::to_value(state.report()).unwrap();
        assert_eq!(json["proof_len"], 480);
        assert_eq!(json["generation"]["status"], "succeeded");
        assert_eq!(json["generation"]["result"]["proof_len"], 480);
        assert_eq!(json["verification"]["status"], "idle");
        assert_eq!(json["verification"]["busy"], false);
    }
}
