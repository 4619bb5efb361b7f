//! Line-driven proving session: the two buttons, on stdin.
//!
//! Commands: `generate` (`g`), `verify` (`v`), `status` (`s`), `wait` (`w`), `quit` (`q`).
//! Every change to the workflow state is printed as it is published.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;

use crate::FlowResult;
use crate::config::FlowConfig;
use crate::core::WorkflowState;
use crate::engine::{Dispatch, ProofWorkflowController};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Generate,
    Verify,
    Status,
    Wait,
    Quit,
}

impl SessionCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "g" | "generate" => Some(SessionCommand::Generate),
            "v" | "verify" => Some(SessionCommand::Verify),
            "s" | "status" => Some(SessionCommand::Status),
            "w" | "wait" => Some(SessionCommand::Wait),
            "q" | "quit" | "exit" => Some(SessionCommand::Quit),
            _ => None,
        }
    }
}

/// Status lines for one snapshot, as the two controls would show them.
pub fn render(state: &WorkflowState) -> Vec<String> {
    let generate = if state.generation().is_busy() {
        "Generating..."
    } else {
        "Generate Noir Proof"
    };
    let verify = if state.verification().is_busy() {
        "Verifying..."
    } else {
        "Verify Noir Proof"
    };
    let verify_enabled = state.current_proof().is_some() && !state.verification().is_busy();

    let mut lines = vec![format!(
        "[{generate}]{}",
        if state.generation().is_busy() { " (disabled)" } else { "" }
    )];
    if let Some(text) = state.generation().text() {
        lines.push(format!("  {text}"));
    }
    lines.push(format!(
        "[{verify}]{}",
        if verify_enabled { "" } else { " (disabled)" }
    ));
    if let Some(text) = state.verification().text() {
        lines.push(format!("  {text}"));
    }
    lines
}

fn print_state(state: &WorkflowState) {
    for line in render(state) {
        println!("{line}");
    }
}

/// Block until no backend call is outstanding.
async fn wait_idle(controller: &ProofWorkflowController) {
    let mut rx = controller.subscribe();
    let _ = rx
        .wait_for(|s| !s.generation().is_busy() && !s.verification().is_busy())
        .await;
}

fn report_dispatch(what: &str, dispatch: Dispatch) {
    if let Some(reason) = dispatch.ignored() {
        println!("({what} ignored: {reason})");
    }
}

/// Drive `controller` from `input` until EOF or `quit`. Returns the final state.
pub async fn run_session<R>(
    controller: &ProofWorkflowController,
    input: R,
) -> FlowResult<WorkflowState>
where
    R: AsyncBufRead + Unpin,
{
    let mut updates = controller.subscribe();
    let printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            print_state(&state);
        }
    });

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match SessionCommand::parse(&line) {
            Some(SessionCommand::Generate) => {
                report_dispatch("generate", controller.request_generate())
            }
            Some(SessionCommand::Verify) => report_dispatch("verify", controller.request_verify()),
            Some(SessionCommand::Status) => print_state(&controller.snapshot()),
            Some(SessionCommand::Wait) => wait_idle(controller).await,
            Some(SessionCommand::Quit) => break,
            None => println!(
                "unknown command '{}' (generate|verify|status|wait|quit)",
                line.trim()
            ),
        }
    }

    printer.abort();
    Ok(controller.snapshot())
}

pub fn run(config: FlowConfig) -> FlowResult<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let backend = config.build_backend()?;
        let job = config.build_job()?;
        let controller = ProofWorkflowController::new(backend, job)?;
        info!(
            backend = controller.backend_name(),
            circuit = controller.job().circuit.short_id(),
            "session started"
        );
        print_state(&controller.snapshot());
        run_session(&controller, BufReader::new(tokio::io::stdin())).await?;
        info!("session ended");
        Ok::<(), crate::FlowError>(())
    })
}
