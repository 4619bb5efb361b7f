//! Proving backends reachable from the workflow.
//!
//! `ProverBackend` is the boundary the controller calls through; everything behind it
//! (witness execution, SRS handling, proving, verification) is the backend's business.

pub mod barretenberg;
pub mod mock;
pub mod traits;

// Re-export key types
pub use barretenberg::{BarretenbergBackend, BarretenbergConfig};
pub use mock::{MockBackend, MockCall, MockConfig, MockGate};
pub use traits::{BackendError, ProverBackend};
