#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use noir_proof_flow::config::{BackendKind, FlowConfig, Overrides};
use noir_proof_flow::{inspect_cmd, prove_cmd, session_cmd};

#[derive(Parser, Debug)]
#[command(name = "noir-proof-flow")]
#[command(about = "Generate and verify Noir proofs, one at a time", long_about = None)]
struct Cli {
    /// Enable verbose logging (or set NOIR_PROOF_FLOW_LOG)
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct JobArgs {
    /// Session config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Path to program artifact (program.json)
    #[arg(long)]
    circuit: Option<PathBuf>,
    /// Locally cached SRS; omit to let the backend fetch one
    #[arg(long)]
    srs: Option<PathBuf>,
    /// Circuit input, in ABI parameter order (repeatable)
    #[arg(long = "input", short = 'i')]
    inputs: Vec<String>,
    /// Backend name (barretenberg, mock)
    #[arg(long)]
    backend: Option<BackendKind>,
    /// Path to backend binary
    #[arg(long)]
    bb_path: Option<PathBuf>,
    /// Timeout seconds per backend invocation (0 = none)
    #[arg(long)]
    timeout: Option<u64>,
}

impl JobArgs {
    fn into_config(self) -> noir_proof_flow::FlowResult<FlowConfig> {
        FlowConfig::load(
            self.config.as_deref(),
            Overrides {
                circuit: self.circuit,
                srs_path: self.srs,
                public_inputs: self.inputs,
                backend: self.backend,
                bb_path: self.bb_path,
                timeout_secs: self.timeout,
            },
        )
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive session: type generate / verify / status / wait / quit
    Session {
        #[command(flatten)]
        job: JobArgs,
    },

    /// Generate a proof, then verify it
    Prove {
        #[command(flatten)]
        job: JobArgs,
        /// Write the proof bytes to this file
        #[arg(long)]
        out: Option<PathBuf>,
        /// Write machine-readable JSON report to this file
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Print circuit descriptor metadata
    Inspect {
        /// Path to program artifact (program.json)
        #[arg(long)]
        circuit: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let env = std::env::var("NOIR_PROOF_FLOW_LOG").unwrap_or_else(|_| {
        if verbose {
            "noir_proof_flow=debug".to_string()
        } else {
            "noir_proof_flow=info".to_string()
        }
    });
    let _ = tracing_subscriber::fmt()
        .with_span_events(FmtSpan::ACTIVE)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_env_filter(EnvFilter::new(env))
        .try_init();
}

fn main() {
    color_eyre::install().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Session { job } => job.into_config().and_then(session_cmd::run),
        Commands::Prove { job, out, json } => job
            .into_config()
            .and_then(|config| prove_cmd::run(config, out, json)),
        Commands::Inspect { circuit } => inspect_cmd::run(&circuit),
    };

    if let Err(e) = result {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
