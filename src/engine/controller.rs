//! The proof workflow controller.
//!
//! Two user intents, "generate" and "verify", each start at most one backend call at a time.
//! All state lives in a `watch` channel: request acceptance and backend completions both go
//! through `send_if_modified`, so the busy check and the busy set happen under one lock and
//! observers only ever see whole snapshots.
//!
//! Backend calls block, so they run on Tokio's blocking pool. Their results are tagged with
//! the attempt that dispatched them; results from superseded attempts are dropped.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, ProverBackend};
use crate::core::{Circuit, Completion, Ignored, WorkflowState};
use crate::{FlowError, FlowResult};

/// What to prove: the circuit and the arguments forwarded with every generation call.
#[derive(Debug, Clone)]
pub struct ProofJob {
    /// Compiled program bundle
    pub circuit: Circuit,
    /// Locally cached SRS, if any
    pub srs_path: Option<PathBuf>,
    /// Inputs in ABI parameter order
    pub public_inputs: Vec<String>,
}

impl ProofJob {
    pub fn new(circuit: Circuit) -> Self {
        ProofJob {
            circuit,
            srs_path: None,
            public_inputs: Vec::new(),
        }
    }

    /// Set the SRS path.
    pub fn with_srs_path(mut self, srs_path: impl Into<PathBuf>) -> Self {
        self.srs_path = Some(srs_path.into());
        self
    }

    /// Set the inputs.
    pub fn with_public_inputs(mut self, inputs: Vec<String>) -> Self {
        self.public_inputs = inputs;
        self
    }
}

/// Result of a request.
#[derive(Debug)]
pub enum Dispatch {
    /// The backend call was dispatched; the handle resolves once its result is recorded.
    Started(JoinHandle<Completion>),
    /// A precondition did not hold and nothing happened.
    Ignored(Ignored),
}

impl Dispatch {
    pub fn is_started(&self) -> bool {
        matches!(self, Dispatch::Started(_))
    }

    pub fn ignored(&self) -> Option<Ignored> {
        match self {
            Dispatch::Ignored(reason) => Some(*reason),
            Dispatch::Started(_) => None,
        }
    }

    /// Wait for the dispatched call to be recorded. `None` if nothing was started or the
    /// task was cancelled with its runtime.
    pub async fn completion(self) -> Option<Completion> {
        match self {
            Dispatch::Started(handle) => handle.await.ok(),
            Dispatch::Ignored(_) => None,
        }
    }
}

struct Inner {
    backend: Arc<dyn ProverBackend>,
    job: ProofJob,
    state: watch::Sender<WorkflowState>,
    runtime: Handle,
}

/// Owns the workflow state and mediates between requests and the backend.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ProofWorkflowController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ProofWorkflowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofWorkflowController")
            .field("backend", &self.inner.backend.name())
            .field("job", &self.inner.job)
            .finish()
    }
}

impl ProofWorkflowController {
    /// Create a controller bound to the current Tokio runtime.
    pub fn new(backend: Arc<dyn ProverBackend>, job: ProofJob) -> FlowResult<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            FlowError::Message(format!("workflow controller needs a Tokio runtime: {e}"))
        })?;
        Ok(Self::with_runtime(backend, job, runtime))
    }

    /// Create a controller that spawns its tasks on `runtime`.
    pub fn with_runtime(backend: Arc<dyn ProverBackend>, job: ProofJob, runtime: Handle) -> Self {
        let (state, _) = watch::channel(WorkflowState::new());
        ProofWorkflowController {
            inner: Arc::new(Inner {
                backend,
                job,
                state,
                runtime,
            }),
        }
    }

    pub fn job(&self) -> &ProofJob {
        &self.inner.job
    }

    pub fn backend_name(&self) -> &str {
        self.inner.backend.name()
    }

    /// A consistent copy of the current state.
    pub fn snapshot(&self) -> WorkflowState {
        self.inner.state.borrow().clone()
    }

    /// Receive every published state.
    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.inner.state.subscribe()
    }

    /// Start generating a proof unless one is already being generated.
    ///
    /// On acceptance the current proof and the verification status are cleared before
    /// anything is dispatched.
    pub fn request_generate(&self) -> Dispatch {
        let mut outcome = Err(Ignored::GenerationBusy);
        self.inner.state.send_if_modified(|state| {
            outcome = state.begin_generation();
            outcome.is_ok()
        });
        let ticket = match outcome {
            Ok(ticket) => ticket,
            Err(reason) => {
                debug!(%reason, "generate request ignored");
                return Dispatch::Ignored(reason);
            }
        };

        let attempt = ticket.attempt();
        info!(
            attempt,
            circuit = self.inner.job.circuit.short_id(),
            backend = self.backend_name(),
            "proof generation started"
        );

        let inner = Arc::clone(&self.inner);
        let handle = self.inner.runtime.spawn(async move {
            let backend = Arc::clone(&inner.backend);
            let job = inner.job.clone();
            let start = Instant::now();
            let result = tokio::task::spawn_blocking(move || {
                backend.generate_proof(&job.circuit, job.srs_path.as_deref(), &job.public_inputs)
            })
            .await
            .unwrap_or_else(|e| {
                warn!(attempt, error = %e, "proof generation task aborted");
                Err(BackendError::TaskAborted)
            });
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(proof) => info!(attempt, bytes = proof.len(), elapsed_ms, "proof generated"),
                Err(err) => warn!(attempt, error = %err, elapsed_ms, "proof generation failed"),
            }

            let mut completion = Completion::StaleDiscarded;
            inner.state.send_if_modified(|state| {
                completion = state.finish_generation(ticket, result);
                true
            });
            if completion == Completion::StaleDiscarded {
                debug!(attempt, "stale generation result discarded");
            }
            completion
        });
        Dispatch::Started(handle)
    }

    /// Start verifying the current proof unless there is none or a verification is
    /// already outstanding.
    pub fn request_verify(&self) -> Dispatch {
        let mut outcome = Err(Ignored::NoProof);
        self.inner.state.send_if_modified(|state| {
            outcome = state.begin_verification();
            outcome.is_ok()
        });
        let ticket = match outcome {
            Ok(ticket) => ticket,
            Err(reason) => {
                debug!(%reason, "verify request ignored");
                return Dispatch::Ignored(reason);
            }
        };

        let attempt = ticket.attempt();
        info!(
            attempt,
            proof_bytes = ticket.proof().len(),
            backend = self.backend_name(),
            "proof verification started"
        );

        let inner = Arc::clone(&self.inner);
        let handle = self.inner.runtime.spawn(async move {
            let backend = Arc::clone(&inner.backend);
            let circuit = inner.job.circuit.clone();
            let proof = ticket.proof().clone();
            let start = Instant::now();
            let result = tokio::task::spawn_blocking(move || {
                backend.verify_proof(&circuit, proof.as_bytes())
            })
            .await
            .unwrap_or_else(|e| {
                warn!(attempt, error = %e, "proof verification task aborted");
                Err(BackendError::TaskAborted)
            });
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(valid) => info!(attempt, valid, elapsed_ms, "proof verified"),
                Err(err) => warn!(attempt, error = %err, elapsed_ms, "proof verification failed"),
            }

            let mut completion = Completion::StaleDiscarded;
            inner.state.send_if_modified(|state| {
                completion = state.finish_verification(ticket, result);
                true
            });
            if completion == Completion::StaleDiscarded {
                debug!(attempt, "stale verification result discarded");
            }
            completion
        });
        Dispatch::Started(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockConfig};

    fn job() -> ProofJob {
        ProofJob::new(Circuit::new(include_str!("../../circuits/fib.json")))
    }

    #[test]
    fn test_proof_job_builder() {
        let job = job()
            .with_srs_path("/tmp/srs.local")
            .with_public_inputs(vec!["1".into(), "2".into()]);
        assert_eq!(job.srs_path, Some(PathBuf::from("/tmp/srs.local")));
        assert_eq!(job.public_inputs, vec!["1", "2"]);
    }

    #[test]
    fn test_new_requires_runtime() {
        let backend = Arc::new(MockBackend::default_mock());
        assert!(ProofWorkflowController::new(backend, job()).is_err());
    }

    #[tokio::test]
    async fn test_generate_then_verify() {
        let backend = Arc::new(MockBackend::default_mock());
        let controller = ProofWorkflowController::new(backend.clone(), job()).unwrap();

        let completion = controller.request_generate().completion().await;
        assert_eq!(completion, Some(Completion::Applied));
        let proof = controller.snapshot().current_proof().cloned().unwrap();
        assert_eq!(proof.len(), 480);

        let completion = controller.request_verify().completion().await;
        assert_eq!(completion, Some(Completion::Applied));
        assert_eq!(backend.last_verified_proof().as_deref(), Some(proof.as_bytes()));
    }

    #[tokio::test]
    async fn test_panicking_backend_clears_busy_flag() {
        struct Panicking;
        impl ProverBackend for Panicking {
            fn name(&self) -> &str {
                "panicking"
            }
            fn version(&self) -> Option<String> {
                None
            }
            fn generate_proof(
                &self,
                _circuit: &Circuit,
                _srs_path: Option<&std::path::Path>,
                _inputs: &[String],
            ) -> Result<Vec<u8>, BackendError> {
                panic!("prover crashed")
            }
            fn verify_proof(
                &self,
                _circuit: &Circuit,
                _proof: &[u8],
            ) -> Result<bool, BackendError> {
                Ok(true)
            }
        }

        let controller = ProofWorkflowController::new(Arc::new(Panicking), job()).unwrap();
        let completion = controller.request_generate().completion().await;
        assert_eq!(completion, Some(Completion::Applied));

        let state = controller.snapshot();
        assert!(!state.generation().is_busy());
        assert_eq!(
            state.generation().status(),
            &crate::core::OperationStatus::Failed(BackendError::TaskAborted)
        );
        assert!(controller.request_generate().is_started());
    }

    #[tokio::test]
    async fn test_verify_uses_configured_circuit() {
        let backend = Arc::new(MockBackend::new(MockConfig::new("mock")));
        let controller = ProofWorkflowController::new(backend.clone(), job()).unwrap();
        controller.request_generate().completion().await;
        controller.request_verify().completion().await;

        let fingerprint = controller.job().circuit.fingerprint().to_string();
        for call in backend.calls() {
            let circuit = match call {
                crate::backend::MockCall::Generate { circuit, .. } => circuit,
                crate::backend::MockCall::Verify { circuit, .. } => circuit,
            };
            assert_eq!(circuit, fingerprint);
        }
    }
}
