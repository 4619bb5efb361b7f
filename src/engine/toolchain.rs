//! Toolchain abstraction for witness generation.
//!
//! A `Toolchain` turns a compiled program plus its inputs into a witness. It knows nothing
//! about proving; that is the `ProverBackend`'s job.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::backend::BackendError;
use crate::core::CircuitHeader;

/// Output from witness generation.
#[derive(Debug, Clone)]
pub struct WitnessArtifact {
    /// Path to the generated witness file
    pub witness_path: PathBuf,
    /// Witness generation time in milliseconds
    pub witness_gen_time_ms: u128,
}

/// Trait for Noir toolchain operations.
pub trait Toolchain: Send + Sync {
    /// Returns the toolchain name (e.g., "nargo").
    fn name(&self) -> &'static str;

    /// Execute `artifact` with the inputs in `prover_toml` and write the witness into `out_dir`.
    fn gen_witness(
        &self,
        artifact: &Path,
        prover_toml: &Path,
        out_dir: &Path,
    ) -> Result<WitnessArtifact, BackendError>;
}

/// Render a `Prover.toml` that assigns `inputs` to the ABI parameters in declared order.
///
/// Only scalar parameters (field, integer, boolean) can be fed from a flat input list.
pub fn prover_toml_for(header: &CircuitHeader, inputs: &[String]) -> Result<String, BackendError> {
    let params = &header.abi.parameters;
    if params.len() != inputs.len() {
        return Err(BackendError::WitnessCreation {
            details: format!(
                "circuit expects {} input(s), got {}",
                params.len(),
                inputs.len()
            ),
        });
    }
    let mut table = toml::Table::new();
    for (param, value) in params.iter().zip(inputs) {
        if !param.typ.is_scalar() {
            return Err(BackendError::WitnessCreation {
                details: format!(
                    "parameter '{}' has non-scalar type '{}'",
                    param.name, param.typ.kind
                ),
            });
        }
        table.insert(param.name.clone(), toml::Value::String(value.clone()));
    }
    toml::to_string(&table).map_err(|e| BackendError::WitnessCreation {
        details: format!("failed to encode inputs: {e}"),
    })
}

/// Nargo toolchain implementation.
///
/// Executes the program in-process with the Noir ACVM and the BN254 black-box solver.
#[derive(Debug, Default, Clone, Copy)]
pub struct NargoToolchain;

impl NargoToolchain {
    pub fn new() -> Self {
        NargoToolchain
    }
}

impl Toolchain for NargoToolchain {
    fn name(&self) -> &'static str {
        "nargo"
    }

    fn gen_witness(
        &self,
        artifact: &Path,
        prover_toml: &Path,
        out_dir: &Path,
    ) -> Result<WitnessArtifact, BackendError> {
        use bn254_blackbox_solver::Bn254BlackBoxSolver;
        use nargo::foreign_calls::DefaultForeignCallBuilder;
        use noir_artifact_cli::execution::execute as execute_program_artifact;
        use noir_artifact_cli::fs::artifact::read_program_from_file;
        use noir_artifact_cli::fs::witness::save_witness_to_dir;

        let start = Instant::now();

        let program = read_program_from_file(artifact).map_err(|e| BackendError::InvalidCircuit {
            details: format!("failed to read artifact: {e}"),
        })?;
        let compiled: noirc_driver::CompiledProgram = program.into();

        let exec_res = execute_program_artifact(
            &compiled,
            &Bn254BlackBoxSolver(false),
            &mut DefaultForeignCallBuilder::default().build(),
            prover_toml,
        )
        .map_err(|e| BackendError::WitnessCreation {
            details: e.to_string(),
        })?;

        let witness_path = save_witness_to_dir(&exec_res.witness_stack, "witness", out_dir)
            .map_err(|e| BackendError::WitnessCreation {
                details: format!("failed to save witness: {e}"),
            })?;

        Ok(WitnessArtifact {
            witness_path,
            witness_gen_time_ms: start.elapsed().as_millis(),
        })
    }
}

/// Mock toolchain for testing purposes.
///
/// Writes a placeholder witness file without executing anything.
#[derive(Debug, Clone, Default)]
pub struct MockToolchain {
    /// Whether witness generation should fail
    pub should_fail: bool,
}

impl MockToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make witness generation fail.
    pub fn failing(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

impl Toolchain for MockToolchain {
    fn name(&self) -> &'static str {
        "mock-nargo"
    }

    fn gen_witness(
        &self,
        _artifact: &Path,
        _prover_toml: &Path,
        out_dir: &Path,
    ) -> Result<WitnessArtifact, BackendError> {
        if self.should_fail {
            return Err(BackendError::WitnessCreation {
                details: "mock witness gen failed".into(),
            });
        }
        let witness_path = out_dir.join("witness.gz");
        std::fs::write(&witness_path, b"mock-witness").map_err(|e| {
            BackendError::WitnessCreation {
                details: e.to_string(),
            }
        })?;
        Ok(WitnessArtifact {
            witness_path,
            witness_gen_time_ms: 0,
        })
    }
}
