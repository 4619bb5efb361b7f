//! TOML configuration for a proving session.
//!
//! ```toml
//! circuit = "circuits/fib_10k.json"
//! srs_path = "srs.local"          # optional; omit to let the backend fetch it
//! public_inputs = []
//!
//! [backend]
//! kind = "barretenberg"           # or "mock"
//! bb_path = "/usr/local/bin/bb"
//! args = "--scheme ultra_honk"
//! timeout_secs = 600
//! ```
//!
//! Relative paths are resolved against the config file's directory. Command-line flags
//! override file values through [`Overrides`].

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::backend::{BarretenbergBackend, BarretenbergConfig, MockBackend, ProverBackend};
use crate::core::Circuit;
use crate::engine::ProofJob;
use crate::{FlowError, FlowResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Barretenberg,
    Mock,
}

impl FromStr for BackendKind {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "barretenberg" | "bb" => Ok(BackendKind::Barretenberg),
            "mock" => Ok(BackendKind::Mock),
            other => Err(FlowError::Message(format!("unknown backend '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendSection {
    #[serde(default)]
    pub kind: BackendKind,
    #[serde(default)]
    pub bb_path: Option<PathBuf>,
    /// Extra bb arguments, shell-quoted
    #[serde(default)]
    pub args: Option<String>,
    /// Per-invocation limit; 0 disables it
    #[serde(default)]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowConfig {
    #[serde(default)]
    pub circuit: Option<PathBuf>,
    #[serde(default)]
    pub srs_path: Option<PathBuf>,
    #[serde(default)]
    pub public_inputs: Vec<String>,
    #[serde(default)]
    pub backend: BackendSection,
}

/// Values given on the command line; `None`/empty leaves the file value alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub circuit: Option<PathBuf>,
    pub srs_path: Option<PathBuf>,
    pub public_inputs: Vec<String>,
    pub backend: Option<BackendKind>,
    pub bb_path: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

pub fn load_config(path: &Path) -> FlowResult<FlowConfig> {
    let s = std::fs::read_to_string(path).map_err(|e| {
        FlowError::Message(format!("failed to read config {}: {e}", path.display()))
    })?;
    let mut cfg: FlowConfig = toml::from_str(&s)?;
    if let Some(base) = path.parent() {
        cfg.resolve_relative_to(base);
    }
    Ok(cfg)
}

fn resolve(base: &Path, p: &mut Option<PathBuf>) {
    if let Some(path) = p.as_mut() {
        if path.is_relative() {
            *path = base.join(&*path);
        }
    }
}

impl FlowConfig {
    fn resolve_relative_to(&mut self, base: &Path) {
        resolve(base, &mut self.circuit);
        resolve(base, &mut self.srs_path);
        resolve(base, &mut self.backend.bb_path);
    }

    /// Load `path` if given, otherwise start from defaults, then apply `overrides`.
    pub fn load(path: Option<&Path>, overrides: Overrides) -> FlowResult<Self> {
        let cfg = match path {
            Some(p) => load_config(p)?,
            None => FlowConfig::default(),
        };
        Ok(cfg.with_overrides(overrides))
    }

    pub fn with_overrides(mut self, o: Overrides) -> Self {
        if o.circuit.is_some() {
            self.circuit = o.circuit;
        }
        if o.srs_path.is_some() {
            self.srs_path = o.srs_path;
        }
        if !o.public_inputs.is_empty() {
            self.public_inputs = o.public_inputs;
        }
        if let Some(kind) = o.backend {
            self.backend.kind = kind;
        }
        if o.bb_path.is_some() {
            self.backend.bb_path = o.bb_path;
        }
        if let Some(secs) = o.timeout_secs {
            self.backend.timeout_secs = secs;
        }
        self
    }

    /// Split the configured bb arguments.
    pub fn backend_args(&self) -> FlowResult<Vec<String>> {
        match self.backend.args.as_deref() {
            None => Ok(Vec::new()),
            Some(raw) => shlex::split(raw).ok_or_else(|| {
                FlowError::Message(format!("could not split backend args: {raw}"))
            }),
        }
    }

    pub fn build_backend(&self) -> FlowResult<Arc<dyn ProverBackend>> {
        Ok(match self.backend.kind {
            BackendKind::Mock => Arc::new(MockBackend::default_mock()),
            BackendKind::Barretenberg => {
                let bb_path = self
                    .backend
                    .bb_path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("bb"));
                let config = BarretenbergConfig::new(bb_path)
                    .with_args(self.backend_args()?)
                    .with_timeout(Duration::from_secs(self.backend.timeout_secs));
                Arc::new(BarretenbergBackend::new(config))
            }
        })
    }

    pub fn circuit_path(&self) -> FlowResult<&Path> {
        self.circuit.as_deref().ok_or_else(|| {
            FlowError::Message(
                "no circuit configured (pass --circuit or set `circuit` in the config file)".into(),
            )
        })
    }

    pub fn build_job(&self) -> FlowResult<ProofJob> {
        let circuit = Circuit::from_file(self.circuit_path()?)?;
        let mut job = ProofJob::new(circuit).with_public_inputs(self.public_inputs.clone());
        if let Some(srs) = &self.srs_path {
            job = job.with_srs_path(srs);
        }
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.toml");
        std::fs::write(
            &path,
            r#"
circuit = "circuits/fib.json"
srs_path = "/abs/srs.local"
public_inputs = ["1", "2"]

[backend]
kind = "mock"
args = "--scheme 'ultra honk'"
timeout_secs = 30
"#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.circuit, Some(dir.path().join("circuits/fib.json")));
        assert_eq!(cfg.srs_path, Some(PathBuf::from("/abs/srs.local")));
        assert_eq!(cfg.public_inputs, vec!["1", "2"]);
        assert_eq!(cfg.backend.kind, BackendKind::Mock);
        assert_eq!(cfg.backend.timeout_secs, 30);
        assert_eq!(cfg.backend_args().unwrap(), vec!["--scheme", "ultra honk"]);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.toml");
        std::fs::write(&path, "circut = \"typo.json\"\n").unwrap();
        assert!(matches!(load_config(&path), Err(FlowError::Toml(_))));
    }

    #[test]
    fn test_overrides_win() {
        let cfg = FlowConfig {
            circuit: Some(PathBuf::from("a.json")),
            public_inputs: vec!["1".into()],
            ..Default::default()
        }
        .with_overrides(Overrides {
            circuit: Some(PathBuf::from("b.json")),
            backend: Some(BackendKind::Mock),
            ..Default::default()
        });
        assert_eq!(cfg.circuit, Some(PathBuf::from("b.json")));
        assert_eq!(cfg.public_inputs, vec!["1"]);
        assert_eq!(cfg.backend.kind, BackendKind::Mock);
    }

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("bb".parse::<BackendKind>().unwrap(), BackendKind::Barretenberg);
        assert_eq!("Mock".parse::<BackendKind>().unwrap(), BackendKind::Mock);
        assert!("groth16".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_build_job_requires_circuit() {
        let err = FlowConfig::default().build_job().unwrap_err();
        assert!(err.to_string().contains("no circuit configured"));
    }

    #[test]
    fn test_build_job_reads_circuit() {
        let dir = tempfile::tempdir().unwrap();
        let circuit = dir.path().join("fib.json");
        std::fs::write(&circuit, include_str!("../circuits/fib.json")).unwrap();
        let cfg = FlowConfig {
            circuit: Some(circuit),
            srs_path: Some(PathBuf::from("/srs.local")),
            ..Default::default()
        };
        let job = cfg.build_job().unwrap();
        assert_eq!(job.srs_path, Some(PathBuf::from("/srs.local")));
        assert!(job.circuit.header().is_ok());
    }

    #[test]
    fn test_build_backend_names() {
        let mut cfg = FlowConfig::default();
        assert_eq!(cfg.build_backend().unwrap().name(), "barretenberg");
        cfg.backend.kind = BackendKind::Mock;
        assert_eq!(cfg.build_backend().unwrap().name(), "mock");
    }
}
