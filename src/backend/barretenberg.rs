//! Barretenberg backend implementation.
//!
//! Witnesses are produced by a [`Toolchain`]; proving, verification-key derivation and
//! verification shell out to the `bb` CLI. Each call works in its own temp directory.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use super::traits::{BackendError, ProverBackend};
use crate::core::Circuit;
use crate::engine::toolchain::{NargoToolchain, Toolchain, prover_toml_for};

/// Configuration for the Barretenberg backend.
#[derive(Clone)]
pub struct BarretenbergConfig {
    /// Path to the bb binary
    pub bb_path: PathBuf,
    /// Extra arguments to pass to bb commands
    pub extra_args: Vec<String>,
    /// Limit for each bb invocation; zero means none
    pub timeout: Duration,
    /// Witness generator
    pub toolchain: Arc<dyn Toolchain>,
}

impl std::fmt::Debug for BarretenbergConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BarretenbergConfig")
            .field("bb_path", &self.bb_path)
            .field("extra_args", &self.extra_args)
            .field("timeout", &self.timeout)
            .field("toolchain", &self.toolchain.name())
            .finish()
    }
}

impl Default for BarretenbergConfig {
    fn default() -> Self {
        BarretenbergConfig {
            bb_path: PathBuf::from("bb"),
            extra_args: Vec::new(),
            timeout: Duration::ZERO,
            toolchain: Arc::new(NargoToolchain::new()),
        }
    }
}

impl BarretenbergConfig {
    /// Create a new config with the given bb path.
    pub fn new(bb_path: impl Into<PathBuf>) -> Self {
        BarretenbergConfig {
            bb_path: bb_path.into(),
            ..Default::default()
        }
    }

    /// Add extra arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Set the per-invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a different witness generator.
    pub fn with_toolchain(mut self, toolchain: Arc<dyn Toolchain>) -> Self {
        self.toolchain = toolchain;
        self
    }
}

/// Barretenberg proving backend.
#[derive(Debug)]
pub struct BarretenbergBackend {
    config: BarretenbergConfig,
}

/// Outcome of one finished bb invocation.
struct BbRun {
    status: ExitStatus,
    stderr: String,
    elapsed_ms: u128,
}

impl BarretenbergBackend {
    /// Create a new Barretenberg backend with the given configuration.
    pub fn new(config: BarretenbergConfig) -> Self {
        BarretenbergBackend { config }
    }

    /// Create a backend with just the bb path.
    pub fn from_path(bb_path: impl Into<PathBuf>) -> Self {
        Self::new(BarretenbergConfig::new(bb_path))
    }

    pub fn config(&self) -> &BarretenbergConfig {
        &self.config
    }

    fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(&self.config.bb_path);
        cmd.arg(subcommand);
        cmd
    }

    /// Run a bb command to completion, polling for the timeout.
    ///
    /// stderr goes to a file in `work_dir` so a chatty child cannot fill the pipe.
    fn run(&self, mut cmd: Command, work_dir: &Path) -> Result<BbRun, BackendError> {
        for arg in &self.config.extra_args {
            cmd.arg(arg);
        }
        let stderr_path = work_dir.join("bb.stderr");
        let stderr_file = File::create(&stderr_path)
            .map_err(|e| BackendError::prover(format!("failed to create stderr log: {e}")))?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_file));
        debug!(?cmd, "running bb");

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| BackendError::prover(format!("failed to spawn bb: {e}")))?;

        let timeout = self.config.timeout;
        let status = loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|e| BackendError::prover(e.to_string()))?
            {
                break status;
            }
            if !timeout.is_zero() && start.elapsed() >= timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(BackendError::Timeout { after: timeout });
            }
            std::thread::sleep(Duration::from_millis(50));
        };

        let stderr = std::fs::read_to_string(&stderr_path).unwrap_or_default();
        Ok(BbRun {
            status,
            stderr,
            elapsed_ms: start.elapsed().as_millis(),
        })
    }

    /// Write the bundle where bb and the toolchain can read it.
    fn write_artifact(circuit: &Circuit, work_dir: &Path) -> Result<PathBuf, BackendError> {
        let path = work_dir.join("program.json");
        std::fs::write(&path, circuit.as_str())
            .map_err(|e| BackendError::prover(format!("failed to write artifact: {e}")))?;
        Ok(path)
    }

    /// Detect bb version.
    fn detect_version(&self) -> Option<String> {
        Command::new(&self.config.bb_path)
            .arg("--version")
            .output()
            .ok()
            .filter(|o| o.status.success())
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Map a failed `bb prove` to a boundary error, pulling out SRS problems.
fn classify_prove_failure(status: ExitStatus, stderr: &str) -> BackendError {
    let lower = stderr.to_ascii_lowercase();
    let details = format!("bb prove failed: status={status} stderr={}", stderr.trim());
    if lower.contains("crs") || lower.contains("srs") {
        BackendError::SrsUnavailable { details }
    } else {
        BackendError::ProverInternal { details }
    }
}

/// Read a finished `bb verify`.
///
/// Only a clean non-zero exit is a rejected proof. A signal, or stderr showing bb could not
/// load its inputs, means the call itself failed.
fn classify_verify_outcome(status: ExitStatus, stderr: &str) -> Result<bool, BackendError> {
    if status.success() {
        return Ok(true);
    }
    let Some(code) = status.code() else {
        return Err(BackendError::Verifier {
            details: format!("bb verify terminated abnormally: {status} stderr={}", stderr.trim()),
        });
    };
    let lower = stderr.to_ascii_lowercase();
    let details = format!("bb verify failed: exit code {code} stderr={}", stderr.trim());
    if lower.contains("exception") || lower.contains("deserializ") || lower.contains("malformed")
    {
        Err(BackendError::MalformedProof { details })
    } else if lower.contains("no such file") || lower.contains("unable to open") {
        Err(BackendError::Verifier { details })
    } else {
        Ok(false)
    }
}

fn temp_work_dir() -> Result<tempfile::TempDir, BackendError> {
    tempfile::Builder::new()
        .prefix("noir-proof-flow-")
        .tempdir()
        .map_err(|e| BackendError::prover(format!("failed to create temp dir: {e}")))
}

impl ProverBackend for BarretenbergBackend {
    fn name(&self) -> &str {
        "barretenberg"
    }

    fn version(&self) -> Option<String> {
        self.detect_version()
    }

    fn generate_proof(
        &self,
        circuit: &Circuit,
        srs_path: Option<&Path>,
        inputs: &[String],
    ) -> Result<Vec<u8>, BackendError> {
        let header = circuit.header()?;
        let prover_toml = prover_toml_for(&header, inputs)?;

        if let Some(srs) = srs_path {
            if !srs.exists() {
                return Err(BackendError::SrsUnavailable {
                    details: format!("SRS not found at {}", srs.display()),
                });
            }
        }

        let work_dir = temp_work_dir()?;
        let artifact = Self::write_artifact(circuit, work_dir.path())?;
        let prover_toml_path = work_dir.path().join("Prover.toml");
        std::fs::write(&prover_toml_path, prover_toml)
            .map_err(|e| BackendError::prover(format!("failed to write Prover.toml: {e}")))?;

        let witness =
            self.config
                .toolchain
                .gen_witness(&artifact, &prover_toml_path, work_dir.path())?;
        debug!(
            toolchain = self.config.toolchain.name(),
            ms = witness.witness_gen_time_ms,
            "witness generated"
        );

        let out_dir = work_dir.path().join("out");
        std::fs::create_dir_all(&out_dir)
            .map_err(|e| BackendError::prover(format!("failed to create out dir: {e}")))?;

        let mut cmd = self.command("prove");
        cmd.arg("-b")
            .arg(&artifact)
            .arg("-w")
            .arg(&witness.witness_path)
            .arg("-o")
            .arg(&out_dir);
        if let Some(srs) = srs_path {
            cmd.arg("-c").arg(srs);
        }

        let run = self.run(cmd, work_dir.path())?;
        if !run.status.success() {
            return Err(classify_prove_failure(run.status, &run.stderr));
        }
        debug!(ms = run.elapsed_ms, "bb prove finished");

        let proof_path = out_dir.join("proof");
        std::fs::read(&proof_path)
            .map_err(|e| BackendError::prover(format!("bb prove produced no proof: {e}")))
    }

    fn verify_proof(&self, circuit: &Circuit, proof: &[u8]) -> Result<bool, BackendError> {
        if proof.is_empty() {
            return Err(BackendError::MalformedProof {
                details: "proof is empty".into(),
            });
        }
        circuit.header()?;

        let work_dir = temp_work_dir()?;
        let artifact = Self::write_artifact(circuit, work_dir.path())?;
        let vk_dir = work_dir.path().join("vk_out");
        std::fs::create_dir_all(&vk_dir)
            .map_err(|e| BackendError::verifier(format!("failed to create vk dir: {e}")))?;

        let mut cmd = self.command("write_vk");
        cmd.arg("-b").arg(&artifact).arg("-o").arg(&vk_dir);
        let run = self
            .run(cmd, work_dir.path())
            .map_err(|e| match e {
                BackendError::ProverInternal { details } => {
                    BackendError::VerificationKey { details }
                }
                other => other,
            })?;
        if !run.status.success() {
            return Err(BackendError::VerificationKey {
                details: format!(
                    "bb write_vk failed: status={} stderr={}",
                    run.status,
                    run.stderr.trim()
                ),
            });
        }
        let vk_path = vk_dir.join("vk");
        if !vk_path.is_file() {
            return Err(BackendError::VerificationKey {
                details: format!("bb write_vk produced no key at {}", vk_path.display()),
            });
        }

        let proof_path = work_dir.path().join("proof");
        std::fs::write(&proof_path, proof)
            .map_err(|e| BackendError::verifier(format!("failed to write proof: {e}")))?;

        let mut cmd = self.command("verify");
        cmd.arg("-p").arg(&proof_path).arg("-k").arg(&vk_path);
        let run = self
            .run(cmd, work_dir.path())
            .map_err(|e| match e {
                BackendError::ProverInternal { details } => BackendError::Verifier { details },
                other => other,
            })?;
        debug!(ms = run.elapsed_ms, ok = run.status.success(), "bb verify finished");

        classify_verify_outcome(run.status, &run.stderr)
    }
}
