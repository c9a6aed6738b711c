use clap::Args;
use serde::Serialize;

use tether::scan::ScanIssue;

use crate::commands::{write_artifact, CmdResult, GlobalArgs};

#[derive(Args)]
pub struct DiscoverArgs {
    /// Write the full relationship graph as JSON to this file
    #[arg(long, value_name = "FILE")]
    output: Option<String>,
}

#[derive(Serialize)]
pub struct DiscoverOutput {
    pub command: &'static str,
    pub root: String,
    pub scanned_files: usize,
    pub relationships: usize,
    pub broken: usize,
    pub scan_issues: Vec<ScanIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

pub fn run(args: DiscoverArgs, global: &GlobalArgs) -> CmdResult<DiscoverOutput> {
    let mut manager = global.open_manager()?;
    let root = manager.root().display().to_string();
    let graph = manager.discover();

    tether::log_status!(
        "discover",
        "{} relationships in {} files",
        graph.relationships().len(),
        graph.scanned_files().len()
    );

    let output_file = write_artifact(args.output.as_deref(), graph)?;

    Ok((
        DiscoverOutput {
            command: "discover",
            root,
            scanned_files: graph.scanned_files().len(),
            relationships: graph.relationships().len(),
            broken: graph.broken().count(),
            scan_issues: graph.scan_issues().to_vec(),
            output_file,
        },
        0,
    ))
}
