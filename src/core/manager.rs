//! Per-invocation owner of the graph and the plans applied to it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::defaults::{self, TetherConfig};
use crate::error::{Error, ErrorCode, ExecutionFailedDetails, Result, RollbackFailedDetails};
use crate::graph::{self, IntegrityReport, RelationshipGraph};
use crate::heal::{self, HealReport};
use crate::path;
use crate::scan::{self, CancellationToken};
use crate::update::{self, DiskOps, ExecutionSummary, FileOps, MoveRequest, UpdatePlan};

/// Owns one root, its configuration and the current graph snapshot.
///
/// Nothing is shared between managers; every command builds its own.
pub struct Manager {
    root: PathBuf,
    config: TetherConfig,
    cancel: CancellationToken,
    graph: Option<RelationshipGraph>,
    executed_plans: HashSet<String>,
}

impl Manager {
    pub fn new(root: impl Into<PathBuf>, config: TetherConfig) -> Self {
        Self {
            root: root.into(),
            config,
            cancel: CancellationToken::new(),
            graph: None,
            executed_plans: HashSet::new(),
        }
    }

    /// Open `root`, loading `tether.json` from it when present.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::validation_invalid_argument(
                "root",
                "Root is not a directory",
                Some(root.display().to_string()),
                None,
            ));
        }
        let config = defaults::load_config(root)?;
        Ok(Self::new(root, config))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &TetherConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut TetherConfig {
        &mut self.config
    }

    /// Token that stops an in-progress scan between files.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Scan the tree and replace the current graph.
    pub fn discover(&mut self) -> &RelationshipGraph {
        let outcome = scan::scan(&self.root, &self.config.scan, &self.cancel);
        if outcome.cancelled {
            tracing::warn!(
                unscanned = outcome.unscanned_files.len(),
                "scan cancelled, graph is partial"
            );
        }
        self.graph.insert(RelationshipGraph::from_scan(outcome))
    }

    /// The current graph, scanning first if none exists yet.
    pub fn graph(&mut self) -> &RelationshipGraph {
        if self.graph.is_none() {
            self.discover();
        }
        self.graph.get_or_insert_with(RelationshipGraph::default)
    }

    pub fn validate(&mut self) -> IntegrityReport {
        let settings = self.config.validate.clone();
        graph::validate(self.graph(), &settings)
    }

    /// Normalize `moves` against the root and plan them.
    pub fn plan_moves(&mut self, moves: &[MoveRequest]) -> Result<UpdatePlan> {
        let mut normalized = Vec::with_capacity(moves.len());
        for m in moves {
            let old_path = self.normalize_argument("old_path", &m.old_path)?;
            let new_path = self.normalize_argument("new_path", &m.new_path)?;
            if !self.root.join(&old_path).is_file() {
                return Err(Error::validation_invalid_argument(
                    "old_path",
                    "File does not exist",
                    Some(old_path),
                    None,
                ));
            }
            normalized.push(MoveRequest { old_path, new_path });
        }

        let root = self.root.clone();
        update::plan(self.graph(), &root, &normalized)
    }

    pub fn execute(&mut self, plan: &UpdatePlan) -> Result<ExecutionSummary> {
        self.execute_with(plan, &DiskOps)
    }

    /// Execute `plan`, then rescan and confirm no edited reference broke.
    pub fn execute_with(&mut self, plan: &UpdatePlan, ops: &impl FileOps) -> Result<ExecutionSummary> {
        if self.executed_plans.contains(&plan.id) {
            return Err(Error::plan_already_applied(&plan.id));
        }

        let summary = update::execute(plan, &self.root, ops)?;
        self.executed_plans.insert(plan.id.clone());

        let broken = self.verify(plan);
        if let Some(cause) = broken {
            tracing::warn!(plan = %plan.id, cause = %cause, "verification failed, rolling back");
            let rolled_back = plan.ordered_operations.len();
            if let Err(e) = update::execute(&plan.inverted(), &self.root, ops) {
                self.discover();
                return Err(undo_failed(plan, cause, e));
            }
            self.discover();
            return Err(Error::execution_verification_failed(ExecutionFailedDetails {
                plan_id: plan.id.clone(),
                failed_operation: serde_json::Value::Null,
                cause,
                rolled_back,
            }));
        }

        Ok(summary)
    }

    pub fn execute_moves(
        &mut self,
        moves: &[MoveRequest],
    ) -> Result<(UpdatePlan, ExecutionSummary)> {
        let plan = self.plan_moves(moves)?;
        let summary = self.execute(&plan)?;
        Ok((plan, summary))
    }

    /// Heal broken references, then rescan.
    pub fn heal(&mut self) -> Result<HealReport> {
        let scan_settings = self.config.scan.clone();
        let heal_settings = self.config.heal.clone();
        let root = self.root.clone();

        let report = heal::heal(self.graph(), &root, &scan_settings, &heal_settings, &DiskOps)?;
        if report.healed_count > 0 {
            self.discover();
        }
        Ok(report)
    }

    /// Rescan and describe the first edited reference that was valid before the
    /// plan and is now broken or resolves somewhere other than planned.
    fn verify(&mut self, plan: &UpdatePlan) -> Option<String> {
        let graph = self.discover();

        plan.edits
            .iter()
            .filter(|edit| !edit.relationship.is_broken)
            .find_map(|edit| {
                let rescanned = graph.outgoing(&edit.file).into_iter().find(|r| {
                    r.source_line_number == edit.relationship.source_line_number
                        && r.target_reference == edit.new_reference
                });
                let line = edit.relationship.source_line_number;
                match rescanned {
                    Some(r) if r.is_broken => Some(format!(
                        "{}:{} '{}' is broken after the move",
                        edit.file, line, edit.new_reference
                    )),
                    Some(r) if r.resolved_target != edit.new_target => Some(format!(
                        "{}:{} '{}' resolves to {} instead of {}",
                        edit.file, line, edit.new_reference, r.resolved_target, edit.new_target
                    )),
                    _ => None,
                }
            })
    }

    fn normalize_argument(&self, field: &str, value: &str) -> Result<String> {
        let raw = Path::new(value);
        let relative = if raw.is_absolute() {
            let canonical_root = self.root.canonicalize().ok();
            raw.strip_prefix(&self.root)
                .ok()
                .or_else(|| canonical_root.as_deref().and_then(|r| raw.strip_prefix(r).ok()))
                .map(|p| path::to_relative(Path::new(""), p))
                .ok_or_else(|| {
                    Error::validation_invalid_argument(
                        field,
                        "Path is outside the root",
                        Some(value.to_string()),
                        None,
                    )
                })?
        } else {
            value.replace('\\', "/")
        };

        path::normalize(&relative)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                Error::validation_invalid_argument(
                    field,
                    "Path must name a file inside the root",
                    Some(value.to_string()),
                    None,
                )
            })
    }
}

/// The undo of a verified-bad plan failed: report what is left applied.
fn undo_failed(plan: &UpdatePlan, cause: String, error: Error) -> Error {
    if error.code == ErrorCode::ExecutionRollbackFailed {
        return error;
    }

    // The undo rolled itself back, so the whole plan is still applied.
    let unrecovered_operations = plan
        .rollback_operations
        .iter()
        .map(|op| serde_json::to_value(op).unwrap_or(serde_json::Value::Null))
        .collect();

    Error::execution_rollback_failed(RollbackFailedDetails {
        plan_id: plan.id.clone(),
        failed_operation: serde_json::Value::Null,
        cause,
        unrecovered_operations,
        rollback_errors: vec![error.message],
    })
}
