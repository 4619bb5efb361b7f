//! One-shot workflow: generate a proof, then verify it.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::config::FlowConfig;
use crate::core::{OperationStatus, StateReport, WorkflowState};
use crate::engine::ProofWorkflowController;
use crate::{FlowError, FlowResult};

#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
    pub name: String,
    pub version: Option<String>,
}

/// Machine-readable record of a prove run.
#[derive(Debug, Clone, Serialize)]
pub struct ProveSummary {
    pub timestamp: String,
    pub circuit_sha256: String,
    pub noir_version: Option<String>,
    pub backend: BackendInfo,
    #[serde(flatten)]
    pub state: StateReport,
}

/// Press "generate", wait, then press "verify" and wait. Returns the final state.
///
/// Fails if no proof was produced; a verification that ran is reported in the state,
/// whatever its result.
pub async fn generate_and_verify(
    controller: &ProofWorkflowController,
) -> FlowResult<WorkflowState> {
    controller.request_generate().completion().await;
    let state = controller.snapshot();
    if let Some(text) = state.generation().text() {
        println!("{text}");
    }
    if let OperationStatus::Failed(err) = state.generation().status() {
        return Err(FlowError::Backend(err.clone()));
    }

    controller.request_verify().completion().await;
    let state = controller.snapshot();
    if let Some(text) = state.verification().text() {
        println!("{text}");
    }
    Ok(state)
}

fn write_json(path: &Path, summary: &ProveSummary) -> FlowResult<()> {
    let s = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, s)?;
    Ok(())
}

pub fn run(config: FlowConfig, out: Option<PathBuf>, json: Option<PathBuf>) -> FlowResult<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let backend = config.build_backend()?;
    let job = config.build_job()?;
    let backend_info = BackendInfo {
        name: backend.name().to_string(),
        version: backend.version(),
    };
    let noir_version = job.circuit.header().ok().and_then(|h| h.noir_version);
    let circuit_sha256 = job.circuit.fingerprint().to_string();

    let controller = ProofWorkflowController::with_runtime(backend, job, runtime.handle().clone());
    let state = runtime.block_on(generate_and_verify(&controller))?;

    if let (Some(path), Some(proof)) = (out.as_ref(), state.current_proof()) {
        std::fs::write(path, proof.as_bytes())?;
        info!(path = %path.display(), bytes = proof.len(), "proof written");
    }

    if let Some(path) = json.as_ref() {
        let summary = ProveSummary {
            timestamp: crate::now_rfc3339(),
            circuit_sha256,
            noir_version,
            backend: backend_info,
            state: state.report(),
        };
        write_json(path, &summary)?;
    }

    match state.verification().status() {
        OperationStatus::Succeeded(v) if v.valid => Ok(()),
        OperationStatus::Succeeded(_) => Err(FlowError::Message("proof did not verify".into())),
        OperationStatus::Failed(err) => Err(FlowError::Backend(err.clone())),
        _ => Err(FlowError::Message("verification did not run".into())),
    }
}
