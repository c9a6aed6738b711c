//! Basename-driven repair of broken references.
//!
//! A broken reference is rewritten only when exactly one file in the tree shares
//! its target's basename. Several matches are reported as ambiguous with a
//! deterministic preferred candidate; they are rewritten only on request.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::defaults::{HealSettings, ScanSettings};
use crate::error::{ErrorCode, Result};
use crate::graph::RelationshipGraph;
use crate::path;
use crate::relationship::Relationship;
use crate::scan::walker;
use crate::update::plan::{build_plan, Layout, Rewrite};
use crate::update::{execute, FileOps};

#[derive(Debug, Clone, Serialize)]
pub struct HealedReference {
    pub source_file: String,
    pub line: usize,
    pub old_reference: String,
    pub new_reference: String,
    pub new_target: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AmbiguousReference {
    pub source_file: String,
    pub line: usize,
    pub target_reference: String,
    /// Every file sharing the basename, sorted.
    pub candidates: Vec<String>,
    /// Lexicographically smallest candidate.
    pub preferred: String,
    /// Whether `preferred` was written because ambiguous resolution was requested.
    pub rewritten: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnresolvedReference {
    pub source_file: String,
    pub line: usize,
    pub target_reference: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct HealReport {
    pub healed_count: usize,
    pub healed: Vec<HealedReference>,
    pub ambiguous: Vec<AmbiguousReference>,
    pub unresolved: Vec<UnresolvedReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
}

/// Repair what can be repaired. Best-effort: a batch whose execution fails is
/// rolled back and its references reported as unresolved. Only a failed
/// rollback is returned as an error.
pub fn heal(
    graph: &RelationshipGraph,
    root: &Path,
    scan_settings: &ScanSettings,
    settings: &HealSettings,
    ops: &impl FileOps,
) -> Result<HealReport> {
    let mut report = HealReport::default();

    let candidates: Vec<&Relationship> = graph
        .broken()
        .filter(|r| r.relationship_type.healable() && r.confidence >= settings.min_confidence)
        .collect();

    if candidates.is_empty() {
        return Ok(report);
    }

    let index = basename_index(root, scan_settings);
    let layout = Layout::new(root, &[]);
    let mut rewrites = Vec::new();

    for rel in candidates {
        let name = path::basename(&rel.resolved_target);
        let matches: Vec<String> = index
            .get(name)
            .map(|paths| {
                paths
                    .iter()
                    .filter(|p| **p != rel.resolved_target && **p != rel.source_file)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let chosen = match matches.as_slice() {
            [] => {
                report.unresolved.push(unresolved(rel, "no file with this name exists"));
                continue;
            }
            [only] => only.clone(),
            [preferred, ..] => {
                report.ambiguous.push(AmbiguousReference {
                    source_file: rel.source_file.clone(),
                    line: rel.source_line_number,
                    target_reference: rel.target_reference.clone(),
                    candidates: matches.clone(),
                    preferred: preferred.clone(),
                    rewritten: settings.resolve_ambiguous,
                });
                if !settings.resolve_ambiguous {
                    continue;
                }
                preferred.clone()
            }
        };

        rewrites.push(Rewrite {
            relationship: rel,
            file: rel.source_file.clone(),
            new_reference: layout.render(rel, &rel.source_file, &chosen),
            new_target: chosen,
        });
    }

    if rewrites.is_empty() {
        return Ok(report);
    }

    let plan = build_plan(Vec::new(), rewrites);

    for warning in &plan.warnings {
        report.unresolved.push(UnresolvedReference {
            source_file: warning.file.clone(),
            line: warning.line,
            target_reference: warning.reference.clone(),
            reason: warning.message.clone(),
        });
    }

    match execute(&plan, root, ops) {
        Ok(_) => {
            for edit in &plan.edits {
                report.healed.push(HealedReference {
                    source_file: edit.file.clone(),
                    line: edit.relationship.source_line_number,
                    old_reference: edit.relationship.target_reference.clone(),
                    new_reference: edit.new_reference.clone(),
                    new_target: edit.new_target.clone(),
                });
            }
            report.healed_count = report.healed.len();
            report.plan_id = Some(plan.id.clone());
        }
        Err(e) if e.code == ErrorCode::ExecutionFailed => {
            tracing::warn!(error = %e, "heal batch rolled back");
            for edit in &plan.edits {
                report
                    .unresolved
                    .push(unresolved(&edit.relationship, &format!("rewrite rolled back: {}", e)));
            }
        }
        Err(e) => return Err(e),
    }

    report.ambiguous.sort_by(|a, b| {
        a.source_file
            .cmp(&b.source_file)
            .then(a.line.cmp(&b.line))
    });
    report.unresolved.sort_by(|a, b| {
        a.source_file
            .cmp(&b.source_file)
            .then(a.line.cmp(&b.line))
    });

    Ok(report)
}

fn unresolved(rel: &Relationship, reason: &str) -> UnresolvedReference {
    UnresolvedReference {
        source_file: rel.source_file.clone(),
        line: rel.source_line_number,
        target_reference: rel.target_reference.clone(),
        reason: reason.to_string(),
    }
}

/// Basename -> sorted root-relative paths of every walked file.
fn basename_index(root: &Path, settings: &ScanSettings) -> BTreeMap<String, Vec<String>> {
    let mut index: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for file in walker::walk_tree(root, settings) {
        let relative = path::to_relative(root, &file);
        index
            .entry(path::basename(&relative).to_string())
            .or_default()
            .push(relative);
    }

    for paths in index.values_mut() {
        paths.sort();
    }

    index
}
