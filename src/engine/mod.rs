//! Engine module: drives the proving backend on behalf of the user.
//!
//! # Architecture
//!
//! - **Toolchain**: Noir-specific witness generation (`NargoToolchain` executes in-process).
//! - **Backend**: proving system operations, defined in `crate::backend`.
//! - **Controller**: `ProofWorkflowController` owns the workflow state, enforces
//!   single-flight per operation kind and records backend outcomes.
//!
//! # Boundaries
//!
//! - The controller never looks inside the circuit; it forwards `ProofJob` to the backend.
//! - `Toolchain` does NOT know about proving/verification - that's the Backend's job.

pub mod controller;
pub mod toolchain;

// Re-export key types for convenience
pub use controller::{Dispatch, ProofJob, ProofWorkflowController};
pub use toolchain::{MockToolchain, NargoToolchain, Toolchain, WitnessArtifact};
