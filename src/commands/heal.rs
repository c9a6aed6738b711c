use clap::Args;
use serde::Serialize;

use tether::heal::HealReport;

use crate::commands::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct HealArgs {
    /// Rewrite references with several same-named candidates to the preferred one
    #[arg(long)]
    resolve_ambiguous: bool,
}

#[derive(Serialize)]
pub struct HealOutput {
    pub command: &'static str,
    #[serde(flatten)]
    pub report: HealReport,
}

/// Best-effort: exits 0 whatever was or was not healed.
pub fn run(args: HealArgs, global: &GlobalArgs) -> CmdResult<HealOutput> {
    let mut manager = global.open_manager()?;
    if args.resolve_ambiguous {
        manager.config_mut().heal.resolve_ambiguous = true;
    }

    let report = manager.heal()?;

    tether::log_status!(
        "heal",
        "{} healed, {} ambiguous, {} unresolved",
        report.healed_count,
        report.ambiguous.len(),
        report.unresolved.len()
    );

    Ok((
        HealOutput {
            command: "heal",
            report,
        },
        0,
    ))
}
