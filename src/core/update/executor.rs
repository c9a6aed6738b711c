//! Transactional plan execution.
//!
//! Operations run in plan order. Edits to one file are applied together in
//! memory and written once. If any step fails, the inverses of exactly the
//! operations already applied are replayed, always to completion.

use serde::Serialize;
use std::path::Path;

use super::plan::{Operation, UpdatePlan};
use crate::scan::split_lines;
use crate::error::{Error, ExecutionFailedDetails, Result, RollbackFailedDetails};

/// Filesystem primitives used by the executor.
pub trait FileOps {
    fn exists(&self, path: &Path) -> bool;
    fn read(&self, path: &Path) -> Result<String>;
    fn write(&self, path: &Path, content: &str) -> Result<()>;
    /// Rename, creating the destination's parent directories.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskOps;

impl FileOps for DiskOps {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> Result<String> {
        crate::io::read_file(path, "read file for edit")
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        crate::io::write_file_atomic(path, content, "write edited file")
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        crate::io::rename_file(from, to, "move file")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    pub plan_id: String,
    pub moves_applied: usize,
    pub edits_applied: usize,
    /// Root-relative files rewritten, in write order.
    pub files_written: Vec<String>,
}

/// A unit of work: one move, or every consecutive edit to one file.
enum Step<'a> {
    Move { from: &'a str, to: &'a str },
    Edits { file: &'a str, edits: Vec<LineEdit<'a>> },
}

struct LineEdit<'a> {
    line: usize,
    expected: &'a str,
    replacement: &'a str,
}

impl Step<'_> {
    fn len(&self) -> usize {
        match self {
            Step::Move { .. } => 1,
            Step::Edits { edits, .. } => edits.len(),
        }
    }
}

/// A failed step: offset of the failing operation within the step, and why.
struct StepFailure {
    offset: usize,
    cause: String,
}

fn group_steps(operations: &[Operation]) -> Vec<Step<'_>> {
    let mut steps: Vec<Step> = Vec::new();

    for op in operations {
        match op {
            Operation::Move { from, to } => steps.push(Step::Move { from, to }),
            Operation::Edit {
                file,
                line,
                expected,
                replacement,
            } => {
                let edit = LineEdit {
                    line: *line,
                    expected,
                    replacement,
                };
                match steps.last_mut() {
                    Some(Step::Edits { file: current, edits }) if *current == file.as_str() => {
                        edits.push(edit)
                    }
                    _ => steps.push(Step::Edits {
                        file,
                        edits: vec![edit],
                    }),
                }
            }
        }
    }

    steps
}

fn apply_step(step: &Step, root: &Path, ops: &impl FileOps) -> std::result::Result<(), StepFailure> {
    match step {
        Step::Move { from, to } => {
            let source = root.join(from);
            let destination = root.join(to);
            if !ops.exists(&source) {
                return Err(StepFailure {
                    offset: 0,
                    cause: format!("{} does not exist", from),
                });
            }
            if ops.exists(&destination) {
                return Err(StepFailure {
                    offset: 0,
                    cause: format!("{} already exists", to),
                });
            }
            ops.rename(&source, &destination).map_err(|e| StepFailure {
                offset: 0,
                cause: format!("move {} -> {}: {}", from, to, describe(&e)),
            })
        }
        Step::Edits { file, edits } => {
            let path = root.join(file);
            let content = ops.read(&path).map_err(|e| StepFailure {
                offset: 0,
                cause: format!("read {}: {}", file, describe(&e)),
            })?;

            let mut lines: Vec<(String, &str)> = split_lines(&content)
                .into_iter()
                .map(|(body, ending)| (body.to_string(), ending))
                .collect();

            let mut order: Vec<usize> = (0..edits.len()).collect();
            order.sort_by(|&a, &b| edits[b].line.cmp(&edits[a].line));

            for idx in order {
                let edit = &edits[idx];
                let Some(slot) = edit.line.checked_sub(1).and_then(|i| lines.get_mut(i)) else {
                    return Err(StepFailure {
                        offset: idx,
                        cause: format!("{} has no line {}", file, edit.line),
                    });
                };
                if slot.0 != edit.expected {
                    return Err(StepFailure {
                        offset: idx,
                        cause: format!(
                            "line {} of {} no longer matches the planned text",
                            edit.line, file
                        ),
                    });
                }
                slot.0 = edit.replacement.to_string();
            }

            let rewritten: String = lines
                .into_iter()
                .map(|(body, ending)| body + ending)
                .collect();

            ops.write(&path, &rewritten).map_err(|e| StepFailure {
                offset: 0,
                cause: format!("write {}: {}", file, describe(&e)),
            })
        }
    }
}

fn describe(error: &Error) -> String {
    error.details["error"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| error.message.clone())
}

fn to_value(op: &Operation) -> serde_json::Value {
    serde_json::to_value(op).unwrap_or(serde_json::Value::Null)
}

/// Apply `plan` under `root`. On failure every applied operation is undone.
pub fn execute(plan: &UpdatePlan, root: &Path, ops: &impl FileOps) -> Result<ExecutionSummary> {
    if !plan.is_executable() {
        return Err(Error::plan_invalid(
            &plan.id,
            "rollback_operations is not the exact inverse of ordered_operations",
        ));
    }

    let mut applied = 0usize;
    let mut summary = ExecutionSummary {
        plan_id: plan.id.clone(),
        moves_applied: 0,
        edits_applied: 0,
        files_written: Vec::new(),
    };

    for step in group_steps(&plan.ordered_operations) {
        match apply_step(&step, root, ops) {
            Ok(()) => {
                applied += step.len();
                match step {
                    Step::Move { from, to } => {
                        tracing::debug!(from, to, "moved");
                        summary.moves_applied += 1;
                    }
                    Step::Edits { file, edits } => {
                        tracing::debug!(file, edits = edits.len(), "edited");
                        summary.edits_applied += edits.len();
                        summary.files_written.push(file.to_string());
                    }
                }
            }
            Err(failure) => {
                let failed_operation = to_value(&plan.ordered_operations[applied + failure.offset]);
                tracing::warn!(
                    plan = %plan.id,
                    cause = %failure.cause,
                    applied,
                    "execution failed, rolling back"
                );
                return Err(rollback(plan, root, ops, applied, failed_operation, failure.cause));
            }
        }
    }

    Ok(summary)
}

/// Undo the first `applied` operations of `plan`. Never stops early: every
/// inverse is attempted and each one that fails is reported.
fn rollback(
    plan: &UpdatePlan,
    root: &Path,
    ops: &impl FileOps,
    applied: usize,
    failed_operation: serde_json::Value,
    cause: String,
) -> Error {
    let n = plan.rollback_operations.len();
    let inverses = &plan.rollback_operations[n - applied..];

    let mut unrecovered_operations = Vec::new();
    let mut rollback_errors = Vec::new();
    let mut consumed = 0usize;

    for step in group_steps(inverses) {
        let count = step.len();
        if let Err(failure) = apply_step(&step, root, ops) {
            tracing::error!(cause = %failure.cause, "rollback step failed");
            rollback_errors.push(failure.cause);
            unrecovered_operations.extend(inverses[consumed..consumed + count].iter().map(to_value));
        }
        consumed += count;
    }

    if unrecovered_operations.is_empty() {
        Error::execution_failed(ExecutionFailedDetails {
            plan_id: plan.id.clone(),
            failed_operation,
            cause,
            rolled_back: applied,
        })
    } else {
        Error::execution_rollback_failed(RollbackFailedDetails {
            plan_id: plan.id.clone(),
            failed_operation,
            cause,
            unrecovered_operations,
            rollback_errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::update::plan::{plan as build, MoveRequest};
    use crate::graph::RelationshipGraph;
    use crate::relationship::{ReferenceStyle, Relationship, RelationshipType};
    use chrono::Utc;
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    /// Disk operations that fail the Nth write (1-indexed) or every rename.
    struct FlakyOps {
        fail_write: usize,
        fail_renames: bool,
        writes: Cell<usize>,
    }

    impl FlakyOps {
        fn failing_write(n: usize) -> Self {
            Self {
                fail_write: n,
                fail_renames: false,
                writes: Cell::new(0),
            }
        }
    }

    impl FileOps for FlakyOps {
        fn exists(&self, path: &Path) -> bool {
            DiskOps.exists(path)
        }

        fn read(&self, path: &Path) -> Result<String> {
            DiskOps.read(path)
        }

        fn write(&self, path: &Path, content: &str) -> Result<()> {
            self.writes.set(self.writes.get() + 1);
            if self.writes.get() == self.fail_write {
                return Err(Error::internal_io("disk full", None));
            }
            DiskOps.write(path, content)
        }

        fn rename(&self, from: &Path, to: &Path) -> Result<()> {
            if self.fail_renames && self.writes.get() >= self.fail_write {
                return Err(Error::internal_io("device busy", None));
            }
            DiskOps.rename(from, to)
        }
    }

    fn rel(source: &str, line_text: &str, reference: &str, resolved: &str) -> Relationship {
        Relationship {
            source_file: source.to_string(),
            target_reference: reference.to_string(),
            relationship_type: RelationshipType::Hyperlink,
            source_line_number: 1,
            source_column: line_text.find(reference).map(|i| i + 1).unwrap_or(1),
            source_line_text: line_text.to_string(),
            resolved_target: resolved.to_string(),
            reference_style: ReferenceStyle::SourceRelative,
            confidence: 1.0,
            is_broken: false,
            last_verified: Utc::now(),
        }
    }

    fn fixture() -> (TempDir, UpdatePlan) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "[t](t.md)\nend\n").unwrap();
        fs::write(dir.path().join("b.md"), "[t](t.md)\r\n").unwrap();
        fs::write(dir.path().join("t.md"), "target").unwrap();

        let graph = RelationshipGraph::build(
            vec![
                rel("a.md", "[t](t.md)", "t.md", "t.md"),
                rel("b.md", "[t](t.md)", "t.md", "t.md"),
            ],
            vec![],
            vec![],
        );
        let plan = build(&graph, dir.path(), &[MoveRequest::new("t.md", "moved/t.md")]).unwrap();
        (dir, plan)
    }

    #[test]
    fn applies_moves_and_edits() {
        let (dir, plan) = fixture();

        let summary = execute(&plan, dir.path(), &DiskOps).unwrap();

        assert_eq!(summary.moves_applied, 1);
        assert_eq!(summary.edits_applied, 2);
        assert!(!dir.path().join("t.md").exists());
        assert!(dir.path().join("moved/t.md").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("a.md")).unwrap(),
            "[t](moved/t.md)\nend\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("b.md")).unwrap(),
            "[t](moved/t.md)\r\n"
        );
    }

    #[test]
    fn failure_rolls_back_applied_operations() {
        let (dir, plan) = fixture();

        let err = execute(&plan, dir.path(), &FlakyOps::failing_write(2)).unwrap_err();

        assert_eq!(err.code, ErrorCode::ExecutionFailed);
        assert_eq!(err.details["rolledBack"], 2);
        assert_eq!(err.details["failedOperation"]["file"], "b.md");
        assert!(dir.path().join("t.md").exists());
        assert!(!dir.path().join("moved/t.md").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("a.md")).unwrap(),
            "[t](t.md)\nend\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("b.md")).unwrap(),
            "[t](t.md)\r\n"
        );
    }

    #[test]
    fn failing_rollback_lists_unrecovered_operations() {
        let (dir, plan) = fixture();
        let ops = FlakyOps {
            fail_write: 2,
            fail_renames: true,
            writes: Cell::new(0),
        };

        let err = execute(&plan, dir.path(), &ops).unwrap_err();

        assert_eq!(err.code, ErrorCode::ExecutionRollbackFailed);
        let unrecovered = err.details["unrecoveredOperations"].as_array().unwrap();
        assert_eq!(unrecovered.len(), 1);
        assert_eq!(unrecovered[0]["op"], "move");
        assert_eq!(unrecovered[0]["from"], "moved/t.md");
        // The edit inverse still ran
        assert_eq!(
            fs::read_to_string(dir.path().join("a.md")).unwrap(),
            "[t](t.md)\nend\n"
        );
    }

    #[test]
    fn drifted_line_fails_without_writing() {
        let (dir, plan) = fixture();
        fs::write(dir.path().join("b.md"), "changed since scan\r\n").unwrap();

        let err = execute(&plan, dir.path(), &DiskOps).unwrap_err();

        assert_eq!(err.code, ErrorCode::ExecutionFailed);
        assert!(err.message.contains("no longer matches"));
        assert!(dir.path().join("t.md").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("a.md")).unwrap(),
            "[t](t.md)\nend\n"
        );
    }

    #[test]
    fn move_never_clobbers() {
        let (dir, plan) = fixture();
        fs::create_dir_all(dir.path().join("moved")).unwrap();
        fs::write(dir.path().join("moved/t.md"), "occupied").unwrap();

        let err = execute(&plan, dir.path(), &DiskOps).unwrap_err();

        assert_eq!(err.code, ErrorCode::ExecutionFailed);
        assert_eq!(err.details["rolledBack"], 0);
        assert_eq!(
            fs::read_to_string(dir.path().join("moved/t.md")).unwrap(),
            "occupied"
        );
    }

    #[test]
    fn non_executable_plan_rejected() {
        let (dir, mut plan) = fixture();
        plan.rollback_operations.reverse();

        let err = execute(&plan, dir.path(), &DiskOps).unwrap_err();
        assert_eq!(err.code, ErrorCode::PlanInvalid);
        assert!(dir.path().join("t.md").exists());
    }

    #[test]
    fn edits_final_line_ending_in_bare_carriage_return() {
        use crate::defaults::ScanSettings;
        use crate::scan::{scan, CancellationToken};

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "intro\r\n[t](t.md)\r").unwrap();
        fs::write(dir.path().join("t.md"), "target").unwrap();

        let graph = RelationshipGraph::from_scan(scan(
            dir.path(),
            &ScanSettings::default(),
            &CancellationToken::new(),
        ));
        assert_eq!(graph.outgoing("a.md")[0].source_line_text, "[t](t.md)");

        let plan = build(&graph, dir.path(), &[MoveRequest::new("t.md", "moved/t.md")]).unwrap();
        execute(&plan, dir.path(), &DiskOps).unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("a.md")).unwrap(),
            "intro\r\n[t](moved/t.md)\r"
        );
    }
}
