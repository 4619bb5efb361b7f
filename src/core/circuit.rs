//! Compiled circuit descriptor.
//!
//! A `Circuit` is the compiled program bundle (`program.json`) produced by the Noir toolchain:
//! version tag, content hash, ABI, compressed bytecode and debug symbols. The workflow only
//! forwards it to the backend, so construction never parses or validates anything. Backends
//! that need to look inside call [`Circuit::header`].

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::FlowResult;
use crate::backend::BackendError;

/// Immutable, cheaply clonable circuit bundle.
#[derive(Clone)]
pub struct Circuit {
    raw: Arc<str>,
    fingerprint: Arc<str>,
}

impl Circuit {
    /// Wrap raw bundle JSON. Never fails.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw: String = raw.into();
        let fingerprint = crate::sha256_hex(raw.as_bytes());
        Circuit {
            raw: Arc::from(raw),
            fingerprint: Arc::from(fingerprint),
        }
    }

    /// Load a bundle from disk.
    pub fn from_file(path: &Path) -> FlowResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            crate::FlowError::Message(format!("failed to read circuit {}: {e}", path.display()))
        })?;
        Ok(Self::new(raw))
    }

    /// The bundle text exactly as supplied.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// SHA-256 of the bundle text, hex encoded.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Short form of the fingerprint for log lines.
    pub fn short_id(&self) -> &str {
        &self.fingerprint[..12.min(self.fingerprint.len())]
    }

    /// Parse the parts of the bundle a backend needs.
    pub fn header(&self) -> Result<CircuitHeader, BackendError> {
        let header: CircuitHeader =
            serde_json::from_str(&self.raw).map_err(|e| BackendError::InvalidCircuit {
                details: format!("failed to parse circuit JSON: {e}"),
            })?;
        match header.bytecode.as_ref() {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Ok(header),
            _ => Err(BackendError::InvalidCircuit {
                details: "circuit JSON missing 'bytecode' field".into(),
            }),
        }
    }
}

impl fmt::Debug for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Circuit")
            .field("fingerprint", &self.short_id())
            .field("len", &self.raw.len())
            .finish()
    }
}

impl PartialEq for Circuit {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }
}

impl Eq for Circuit {}

/// Minimal view of a compiled program bundle.
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitHeader {
    #[serde(default)]
    pub noir_version: Option<String>,
    #[serde(default)]
    pub hash: Option<u64>,
    #[serde(default)]
    pub abi: AbiHeader,
    #[serde(default)]
    bytecode: Option<serde_json::Value>,
    #[serde(default)]
    pub names: Vec<String>,
}

impl CircuitHeader {
    /// Length of the encoded bytecode string.
    pub fn bytecode_len(&self) -> usize {
        match &self.bytecode {
            Some(serde_json::Value::String(s)) => s.len(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AbiHeader {
    #[serde(default)]
    pub parameters: Vec<AbiParameter>,
    #[serde(default)]
    pub return_type: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub typ: AbiTypeHeader,
    #[serde(default)]
    pub visibility: Option<String>,
}

impl AbiParameter {
    pub fn is_public(&self) -> bool {
        self.visibility.as_deref() == Some("public")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiTypeHeader {
    pub kind: String,
}

impl AbiTypeHeader {
    /// Whether a single string value can encode this parameter.
    pub fn is_scalar(&self) -> bool {
        matches!(self.kind.as_str(), "field" | "integer" | "boolean")
    }
}
