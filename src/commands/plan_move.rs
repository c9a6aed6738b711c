use clap::Args;
use serde::Serialize;

use tether::{MoveRequest, UpdatePlan};

use crate::commands::{write_artifact, CmdResult, GlobalArgs};

#[derive(Args)]
pub struct PlanMoveArgs {
    /// Current path of the file, relative to the root
    old: String,
    /// Destination path, relative to the root
    new: String,
    /// Write the update plan as JSON to this file
    #[arg(long, value_name = "FILE")]
    output: Option<String>,
}

#[derive(Serialize)]
pub struct PlanMoveOutput {
    pub command: &'static str,
    pub plan: UpdatePlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

pub fn run(args: PlanMoveArgs, global: &GlobalArgs) -> CmdResult<PlanMoveOutput> {
    let mut manager = global.open_manager()?;
    let plan = manager.plan_moves(&[MoveRequest::new(args.old, args.new)])?;

    tether::log_status!(
        "plan-move",
        "{} operations, {} warnings",
        plan.ordered_operations.len(),
        plan.warnings.len()
    );

    let output_file = write_artifact(args.output.as_deref(), &plan)?;

    Ok((
        PlanMoveOutput {
            command: "plan-move",
            plan,
            output_file,
        },
        0,
    ))
}
