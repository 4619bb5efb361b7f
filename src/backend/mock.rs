//! Mock backend for testing.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use super::traits::{BackendError, ProverBackend};
use crate::core::Circuit;

/// Holds backend calls until opened.
///
/// Clones share the same gate, so a test can keep one handle and give the other to a
/// `MockConfig`.
#[derive(Debug, Clone, Default)]
pub struct MockGate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl MockGate {
    /// A gate that blocks until [`MockGate::open`] is called.
    pub fn closed() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner()) = true;
        cvar.notify_all();
    }

    pub fn close(&self) {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner()) = false;
    }

    fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut open = lock.lock().unwrap_or_else(|e| e.into_inner());
        while !*open {
            open = cvar.wait(open).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Configuration for mock backend responses.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Name to report
    pub name: String,
    /// Version to report
    pub version: Option<String>,
    /// Proof bytes returned by generate_proof
    pub proof: Vec<u8>,
    /// Result returned by verify_proof
    pub verify_result: bool,
    /// Error returned by generate_proof instead of a proof
    pub generate_error: Option<BackendError>,
    /// Error returned by verify_proof instead of a result
    pub verify_error: Option<BackendError>,
    /// Time each call spends "working"
    pub latency: Duration,
    /// Gate every generate_proof call waits on
    pub generate_gate: Option<MockGate>,
    /// Gate every verify_proof call waits on
    pub verify_gate: Option<MockGate>,
}

impl MockConfig {
    /// Create a new mock config with the given name. Proofs are 480 bytes and verify as valid.
    pub fn new(name: impl Into<String>) -> Self {
        MockConfig {
            name: name.into(),
            version: Some("mock-1.0.0".to_string()),
            proof: vec![0xA5; 480],
            verify_result: true,
            generate_error: None,
            verify_error: None,
            latency: Duration::ZERO,
            generate_gate: None,
            verify_gate: None,
        }
    }

    /// Set the proof bytes.
    pub fn with_proof(mut self, proof: Vec<u8>) -> Self {
        self.proof = proof;
        self
    }

    /// Set the verification result.
    pub fn with_verify_result(mut self, valid: bool) -> Self {
        self.verify_result = valid;
        self
    }

    /// Make generate_proof fail.
    pub fn generate_fails(mut self, err: BackendError) -> Self {
        self.generate_error = Some(err);
        self
    }

    /// Make verify_proof fail.
    pub fn verify_fails(mut self, err: BackendError) -> Self {
        self.verify_error = Some(err);
        self
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Hold generate_proof calls on `gate`.
    pub fn with_generate_gate(mut self, gate: MockGate) -> Self {
        self.generate_gate = Some(gate);
        self
    }

    /// Hold verify_proof calls on `gate`.
    pub fn with_verify_gate(mut self, gate: MockGate) -> Self {
        self.verify_gate = Some(gate);
        self
    }
}

#[derive(Debug, Default)]
struct Concurrency {
    current: AtomicUsize,
    max: AtomicUsize,
    calls: AtomicUsize,
}

impl Concurrency {
    fn enter(&self) -> ConcurrencyGuard<'_> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        ConcurrencyGuard(self)
    }
}

struct ConcurrencyGuard<'a>(&'a Concurrency);

impl Drop for ConcurrencyGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Generate {
        circuit: String,
        srs_path: Option<PathBuf>,
        inputs: Vec<String>,
    },
    Verify {
        circuit: String,
        proof: Vec<u8>,
    },
}

/// Mock backend for unit testing.
///
/// Returns configured results without doing any proving, and records what it was asked
/// to do so tests can check the workflow's side of the contract.
#[derive(Debug)]
pub struct MockBackend {
    config: MockConfig,
    generate: Concurrency,
    verify: Concurrency,
    calls: Mutex<Vec<MockCall>>,
}

impl MockBackend {
    /// Create a new mock backend with the given configuration.
    pub fn new(config: MockConfig) -> Self {
        MockBackend {
            config,
            generate: Concurrency::default(),
            verify: Concurrency::default(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock backend with default configuration.
    pub fn default_mock() -> Self {
        Self::new(MockConfig::new("mock"))
    }

    pub fn generate_calls(&self) -> usize {
        self.generate.calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify.calls.load(Ordering::SeqCst)
    }

    /// Highest number of generate_proof calls seen running at once.
    pub fn max_concurrent_generates(&self) -> usize {
        self.generate.max.load(Ordering::SeqCst)
    }

    /// Highest number of verify_proof calls seen running at once.
    pub fn max_concurrent_verifies(&self) -> usize {
        self.verify.max.load(Ordering::SeqCst)
    }

    /// Every call received, in arrival order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Proof bytes of the most recent verify_proof call.
    pub fn last_verified_proof(&self) -> Option<Vec<u8>> {
        self.calls().into_iter().rev().find_map(|call| match call {
            MockCall::Verify { proof, .. } => Some(proof),
            _ => None,
        })
    }

    fn record(&self, call: MockCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }

    fn work(&self, gate: Option<&MockGate>) {
        if let Some(gate) = gate {
            gate.wait();
        }
        if !self.config.latency.is_zero() {
            std::thread::sleep(self.config.latency);
        }
    }
}

impl ProverBackend for MockBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn version(&self) -> Option<String> {
        self.config.version.clone()
    }

    fn generate_proof(
        &self,
        circuit: &Circuit,
        srs_path: Option<&Path>,
        inputs: &[String],
    ) -> Result<Vec<u8>, BackendError> {
        let _guard = self.generate.enter();
        self.record(MockCall::Generate {
            circuit: circuit.fingerprint().to_string(),
            srs_path: srs_path.map(Path::to_path_buf),
            inputs: inputs.to_vec(),
        });
        self.work(self.config.generate_gate.as_ref());
        match &self.config.generate_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.config.proof.clone()),
        }
    }

    fn verify_proof(&self, circuit: &Circuit, proof: &[u8]) -> Result<bool, BackendError> {
        let _guard = self.verify.enter();
        self.record(MockCall::Verify {
            circuit: circuit.fingerprint().to_string(),
            proof: proof.to_vec(),
        });
        self.work(self.config.verify_gate.as_ref());
        match &self.config.verify_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.config.verify_result),
        }
    }
}
