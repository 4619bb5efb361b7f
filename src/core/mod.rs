//! Core types for noir-proof-flow.
//!
//! `circuit` holds the opaque compiled-program descriptor; `state` holds the observable
//! workflow state machine the controller drives.

pub mod circuit;
pub mod state;

// Re-export key types for convenience
pub use circuit::{AbiParameter, Circuit, CircuitHeader};
pub use state::{
    Completion, Generated, GenerationTicket, Ignored, OperationKind, OperationState,
    OperationStatus, ProofArtifact, StateReport, VerificationTicket, Verified, WorkflowState,
};
