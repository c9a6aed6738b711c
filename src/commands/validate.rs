use clap::Args;
use serde::Serialize;

use tether::IntegrityReport;

use crate::commands::{write_artifact, CmdResult, GlobalArgs};

#[derive(Args)]
pub struct ValidateArgs {
    /// Write the integrity report as JSON to this file
    #[arg(long, value_name = "FILE")]
    output: Option<String>,
}

#[derive(Serialize)]
pub struct ValidateOutput {
    pub command: &'static str,
    pub passed: bool,
    pub pass_threshold: f64,
    pub report: IntegrityReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

/// Exit code 0 when the integrity score meets the pass threshold, 1 otherwise.
pub fn run(args: ValidateArgs, global: &GlobalArgs) -> CmdResult<ValidateOutput> {
    let mut manager = global.open_manager()?;
    let report = manager.validate();
    let settings = &manager.config().validate;
    let passed = report.passes(settings);

    tether::log_status!(
        "validate",
        "integrity {:.2} ({} broken of {})",
        report.integrity_score,
        report.broken_relationships,
        report.total_relationships
    );

    let output_file = write_artifact(args.output.as_deref(), &report)?;
    let exit_code = if passed { 0 } else { 1 };

    Ok((
        ValidateOutput {
            command: "validate",
            passed,
            pass_threshold: settings.pass_threshold,
            report,
            output_file,
        },
        exit_code,
    ))
}
