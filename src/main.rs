use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;
mod tty;

use commands::{discover, execute_move, heal, plan_move, validate, GlobalArgs};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the log filter (e.g. `TETHER_LOG=tether=debug`).
const LOG_ENV: &str = "TETHER_LOG";

#[derive(Parser)]
#[command(name = "tether")]
#[command(version = VERSION)]
#[command(about = "Discover, validate and safely rewrite cross-file references")]
struct Cli {
    /// Root directory of the tree (supports ~)
    #[arg(long, global = true, default_value = ".", value_name = "DIR")]
    root: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the tree and build the relationship graph
    Discover(discover::DiscoverArgs),
    /// Report broken references and orphaned files; exits 1 below the pass threshold
    Validate(validate::ValidateArgs),
    /// Repair broken references whose target exists elsewhere under the same name; always exits 0
    Heal(heal::HealArgs),
    /// Plan the edits a file move requires without touching the tree
    PlanMove(plan_move::PlanMoveArgs),
    /// Move a file and rewrite every reference to it; exits 1 on any failure, after rollback
    ExecuteMove(execute_move::ExecuteMoveArgs),
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let global = GlobalArgs { root: cli.root };

    let (json_result, exit_code) = commands::run_json(cli.command, &global);

    if let Err(e) = output::print_json_result(json_result) {
        tracing::error!(error = %e, "failed to write response");
        return std::process::ExitCode::from(1);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
