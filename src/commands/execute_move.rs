use clap::Args;
use serde::Serialize;

use tether::update::{ExecutionSummary, PlanWarning};
use tether::MoveRequest;

use crate::commands::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct ExecuteMoveArgs {
    /// Current path of the file, relative to the root
    old: String,
    /// Destination path, relative to the root
    new: String,
}

#[derive(Serialize)]
pub struct ExecuteMoveOutput {
    pub command: &'static str,
    pub from: String,
    pub to: String,
    pub summary: ExecutionSummary,
    pub warnings: Vec<PlanWarning>,
    pub broken_after: usize,
}

/// Exit code 0 on success. Failures (after rollback) surface as errors and exit 1.
pub fn run(args: ExecuteMoveArgs, global: &GlobalArgs) -> CmdResult<ExecuteMoveOutput> {
    let mut manager = global.open_manager()?;
    let (plan, summary) = manager.execute_moves(&[MoveRequest::new(args.old, args.new)])?;

    tether::log_status!(
        "execute-move",
        "{} moved, {} edits in {} files",
        summary.moves_applied,
        summary.edits_applied,
        summary.files_written.len()
    );

    let broken_after = manager.graph().broken().count();
    let moved = plan.moves.first();

    Ok((
        ExecuteMoveOutput {
            command: "execute-move",
            from: moved.map(|m| m.old_path.clone()).unwrap_or_default(),
            to: moved.map(|m| m.new_path.clone()).unwrap_or_default(),
            summary,
            warnings: plan.warnings,
            broken_after,
        },
        0,
    ))
}
