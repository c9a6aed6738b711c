use serde::Serialize;
use std::path::{Path, PathBuf};

use tether::{Error, Manager};

pub type CmdResult<T> = tether::Result<(T, i32)>;

pub(crate) struct GlobalArgs {
    /// Tree root as given on the command line (`~` not yet expanded).
    pub root: String,
}

impl GlobalArgs {
    pub(crate) fn root_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.root).to_string())
    }

    /// Open a manager over `--root`, loading its `tether.json`.
    pub(crate) fn open_manager(&self) -> tether::Result<Manager> {
        Manager::open(&self.root_path())
    }
}

/// Write `artifact` as pretty JSON to `--output` when one was given.
///
/// Returns the expanded path written, for inclusion in the command output.
pub(crate) fn write_artifact<T: Serialize>(
    output: Option<&str>,
    artifact: &T,
) -> tether::Result<Option<String>> {
    let Some(output) = output else {
        return Ok(None);
    };

    let expanded = shellexpand::tilde(output).to_string();
    let json = serde_json::to_string_pretty(artifact).map_err(|e| {
        Error::internal_json(e.to_string(), Some(format!("serialize {}", expanded)))
    })?;
    tether::io::write_file_atomic(Path::new(&expanded), &json, "write output artifact")?;

    Ok(Some(expanded))
}

pub mod discover;
pub mod execute_move;
pub mod heal;
pub mod plan_move;
pub mod validate;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (tether::Result<serde_json::Value>, i32) {
    crate::tty::status("tether is working...");

    match command {
        crate::Commands::Discover(args) => dispatch!(args, global, discover),
        crate::Commands::Validate(args) => dispatch!(args, global, validate),
        // Best-effort: even a failed heal exits 0, the envelope carries the error
        crate::Commands::Heal(args) => (dispatch!(args, global, heal).0, 0),
        crate::Commands::PlanMove(args) => dispatch!(args, global, plan_move),
        crate::Commands::ExecuteMove(args) => dispatch!(args, global, execute_move),
    }
}
