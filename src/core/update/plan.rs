//! Move planning: compute every edit a batch of moves requires.
//!
//! Planning never modifies the filesystem; it only checks which paths exist so
//! that every rewritten reference resolves to its target once the moves are
//! done. The plan is a snapshot of the graph it was built from; every edit
//! records the exact line text it expects to replace, so a plan applied against
//! a drifted tree fails instead of corrupting it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use crate::error::{Error, Result};
use crate::graph::RelationshipGraph;
use crate::path;
use crate::relationship::{split_suffix, ReferenceStyle, Relationship, RelationshipType};
use crate::scan::matchers::matcher_for;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Current root-relative path.
    pub old_path: String,
    /// Destination root-relative path.
    pub new_path: String,
}

impl MoveRequest {
    pub fn new(old_path: impl Into<String>, new_path: impl Into<String>) -> Self {
        Self {
            old_path: old_path.into(),
            new_path: new_path.into(),
        }
    }
}

/// One filesystem or text mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Move {
        from: String,
        to: String,
    },
    /// Replace line `line` (1-indexed) of `file`, which must read `expected`.
    Edit {
        file: String,
        line: usize,
        expected: String,
        replacement: String,
    },
}

impl Operation {
    /// The operation that exactly undoes this one.
    pub fn inverse(&self) -> Operation {
        match self {
            Operation::Move { from, to } => Operation::Move {
                from: to.clone(),
                to: from.clone(),
            },
            Operation::Edit {
                file,
                line,
                expected,
                replacement,
            } => Operation::Edit {
                file: file.clone(),
                line: *line,
                expected: replacement.clone(),
                replacement: expected.clone(),
            },
        }
    }
}

/// A relationship whose line will be rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedEdit {
    pub relationship: Relationship,
    /// File the edit applies to: the source's path after the batch's moves.
    pub file: String,
    pub new_reference: String,
    /// Root-relative path `new_reference` resolves to after the batch.
    pub new_target: String,
    /// Full line after every edit planned for it.
    pub new_line_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanWarning {
    /// Warning category.
    pub kind: String,
    /// File path relative to root.
    pub file: String,
    pub line: usize,
    pub reference: String,
    /// Human-readable description.
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePlan {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub moves: Vec<MoveRequest>,
    pub edits: Vec<PlannedEdit>,
    /// Moves in request order, then edits by file and descending line.
    pub ordered_operations: Vec<Operation>,
    /// Inverses of `ordered_operations`, last first.
    pub rollback_operations: Vec<Operation>,
    pub warnings: Vec<PlanWarning>,
}

impl UpdatePlan {
    fn new(
        moves: Vec<MoveRequest>,
        edits: Vec<PlannedEdit>,
        ordered_operations: Vec<Operation>,
        warnings: Vec<PlanWarning>,
    ) -> Self {
        let rollback_operations = ordered_operations
            .iter()
            .rev()
            .map(Operation::inverse)
            .collect();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            moves,
            edits,
            ordered_operations,
            rollback_operations,
            warnings,
        }
    }

    /// True when every operation has its exact inverse at the mirrored rollback position.
    pub fn is_executable(&self) -> bool {
        let n = self.ordered_operations.len();
        n == self.rollback_operations.len()
            && self
                .ordered_operations
                .iter()
                .enumerate()
                .all(|(i, op)| self.rollback_operations[n - 1 - i] == op.inverse())
    }

    /// The plan that undoes this one.
    pub fn inverted(&self) -> UpdatePlan {
        UpdatePlan {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            moves: self
                .moves
                .iter()
                .rev()
                .map(|m| MoveRequest::new(&m.new_path, &m.old_path))
                .collect(),
            edits: Vec::new(),
            ordered_operations: self.rollback_operations.clone(),
            rollback_operations: self.ordered_operations.clone(),
            warnings: Vec::new(),
        }
    }
}

/// A reference to rewrite in place.
pub(crate) struct Rewrite<'a> {
    pub relationship: &'a Relationship,
    pub file: String,
    pub new_reference: String,
    pub new_target: String,
}

/// The tree as it will look once a batch of moves is applied.
pub(crate) struct Layout<'a> {
    root: &'a Path,
    removed: HashSet<&'a str>,
    added: HashSet<&'a str>,
}

impl<'a> Layout<'a> {
    pub(crate) fn new(root: &'a Path, moves: &'a [MoveRequest]) -> Self {
        Self {
            root,
            removed: moves.iter().map(|m| m.old_path.as_str()).collect(),
            added: moves.iter().map(|m| m.new_path.as_str()).collect(),
        }
    }

    fn exists(&self, relative: &str) -> bool {
        if self.added.contains(relative) {
            return true;
        }
        !self.removed.contains(relative) && self.root.join(relative).exists()
    }

    fn is_file(&self, relative: &str) -> bool {
        if self.added.contains(relative) {
            return true;
        }
        !self.removed.contains(relative) && self.root.join(relative).is_file()
    }

    fn probe(&self, candidate: &str, implicit_extensions: &[&str]) -> Option<String> {
        if self.exists(candidate) {
            return Some(candidate.to_string());
        }
        implicit_extensions
            .iter()
            .map(|ext| format!("{}.{}", candidate, ext))
            .find(|with_ext| self.is_file(with_ext))
    }

    /// Where `reference`, written in `source_file`, resolves in this layout:
    /// source-relative first, then root-relative.
    fn resolve(&self, source_file: &str, reference: &str, implicit_extensions: &[&str]) -> Option<String> {
        let (target_path, _) = split_suffix(reference);
        if let Some(absolute) = target_path.strip_prefix('/') {
            let normalized = path::normalize(absolute).filter(|p| !p.is_empty())?;
            return self.probe(&normalized, implicit_extensions);
        }

        let source_relative =
            path::join(path::parent(source_file), target_path).filter(|p| !p.is_empty());
        if let Some(hit) = source_relative
            .as_deref()
            .and_then(|c| self.probe(c, implicit_extensions))
        {
            return Some(hit);
        }

        path::normalize(target_path)
            .filter(|p| !p.is_empty() && Some(p) != source_relative.as_ref())
            .and_then(|c| self.probe(&c, implicit_extensions))
    }

    /// The reference `rel` should contain so that, from `new_source`, it
    /// resolves to `new_target`. An unchanged reference that still resolves
    /// there is kept as is. Otherwise the written style is kept when it resolves
    /// correctly, falling back to source-relative, then root-absolute.
    pub(crate) fn render(&self, rel: &Relationship, new_source: &str, new_target: &str) -> String {
        let preferred = render_reference(rel, new_source, new_target);
        if !self.exists(new_target) {
            return preferred;
        }

        let extensions = matcher_for(rel.relationship_type).implicit_extensions();
        let resolves = |reference: &str| {
            self.resolve(new_source, reference, extensions).as_deref() == Some(new_target)
        };
        if resolves(&rel.target_reference) {
            return rel.target_reference.clone();
        }
        if resolves(&preferred) {
            return preferred;
        }

        let fallback = [ReferenceStyle::SourceRelative, ReferenceStyle::RootAbsolute]
            .into_iter()
            .filter(|style| *style != rel.reference_style)
            .map(|style| render_in_style(rel, style, new_source, new_target))
            .find(|candidate| resolves(candidate));

        match fallback {
            Some(reference) => {
                tracing::debug!(
                    file = %rel.source_file,
                    line = rel.source_line_number,
                    reference = %reference,
                    "written style would resolve elsewhere, style changed"
                );
                reference
            }
            None => preferred,
        }
    }
}

/// Whether the source-relative reading of a root-relative `rel` lands on
/// `destination`, so moving a file there would capture the reference.
fn shadowed_by(rel: &Relationship, destination: &str) -> bool {
    if rel.is_broken || rel.reference_style != ReferenceStyle::RootRelative {
        return false;
    }
    let Some(reading) = path::join(path::parent(&rel.source_file), rel.target_path()) else {
        return false;
    };
    destination == reading
        || destination
            .strip_prefix(reading.as_str())
            .is_some_and(|rest| rest.starts_with('.') && !rest[1..].contains('/'))
}

/// Plan the edits keeping every reference valid across `moves`.
///
/// Fails only when the batch itself is ambiguous: an old path or new path
/// given twice, or a destination that is also moved in the same batch.
pub fn plan(graph: &RelationshipGraph, root: &Path, moves: &[MoveRequest]) -> Result<UpdatePlan> {
    let mut sources: HashSet<&str> = HashSet::new();
    let mut destinations: HashSet<&str> = HashSet::new();

    for m in moves {
        if !sources.insert(m.old_path.as_str()) {
            return Err(Error::planning_ambiguous_move(&m.old_path, "source"));
        }
        if !destinations.insert(m.new_path.as_str()) {
            return Err(Error::planning_ambiguous_move(&m.new_path, "destination"));
        }
    }
    if let Some(m) = moves.iter().find(|m| sources.contains(m.new_path.as_str())) {
        return Err(Error::planning_ambiguous_move(&m.new_path, "destination"));
    }

    let relocated: HashMap<&str, &str> = moves
        .iter()
        .map(|m| (m.old_path.as_str(), m.new_path.as_str()))
        .collect();

    // Everything pointing at a moved file, the moved files' own references,
    // which change meaning when their source directory changes, and
    // root-relative references a destination would capture.
    let incoming = moves.iter().flat_map(|m| graph.incoming(&m.old_path));
    let outgoing = moves.iter().flat_map(|m| {
        graph
            .outgoing(&m.old_path)
            .into_iter()
            .filter(|r| !r.is_broken)
    });
    let shadowed = graph
        .relationships()
        .iter()
        .filter(|r| moves.iter().any(|m| shadowed_by(r, &m.new_path)));

    let layout = Layout::new(root, moves);

    let mut seen: HashSet<(&str, usize, usize)> = HashSet::new();
    let mut rewrites = Vec::new();

    for rel in incoming.chain(outgoing).chain(shadowed) {
        let key = (
            rel.source_file.as_str(),
            rel.source_line_number,
            rel.source_column,
        );
        if !seen.insert(key) {
            continue;
        }

        let new_source = relocated
            .get(rel.source_file.as_str())
            .copied()
            .unwrap_or(rel.source_file.as_str());
        let new_target = relocated
            .get(rel.resolved_target.as_str())
            .copied()
            .unwrap_or(rel.resolved_target.as_str());

        let new_reference = layout.render(rel, new_source, new_target);
        if new_reference == rel.target_reference {
            continue;
        }

        rewrites.push(Rewrite {
            relationship: rel,
            file: new_source.to_string(),
            new_reference,
            new_target: new_target.to_string(),
        });
    }

    let plan = build_plan(moves.to_vec(), rewrites);

    tracing::debug!(
        plan = %plan.id,
        moves = plan.moves.len(),
        edits = plan.edits.len(),
        warnings = plan.warnings.len(),
        "planned moves"
    );

    Ok(plan)
}

/// Assemble a plan from moves and per-reference rewrites.
///
/// Rewrites sharing a line merge into one edit operation. A rewrite whose
/// reference cannot be located in its recorded line is dropped with a warning.
pub(crate) fn build_plan(moves: Vec<MoveRequest>, rewrites: Vec<Rewrite>) -> UpdatePlan {
    let mut by_line: BTreeMap<(String, usize), Vec<Rewrite>> = BTreeMap::new();
    for rewrite in rewrites {
        by_line
            .entry((rewrite.file.clone(), rewrite.relationship.source_line_number))
            .or_default()
            .push(rewrite);
    }

    let mut edits = Vec::new();
    let mut edit_ops = Vec::new();
    let mut warnings = Vec::new();

    for ((file, line), group) in by_line {
        let original = group[0].relationship.source_line_text.clone();
        let mut spans: Vec<(usize, usize, &str)> = Vec::new();
        let mut applied: Vec<&Rewrite> = Vec::new();

        for rewrite in &group {
            let rel = rewrite.relationship;
            let located = locate_reference(&original, rel.source_column, &rel.target_reference)
                .filter(|&start| {
                    let end = start + rel.target_reference.len();
                    !spans.iter().any(|&(s, e, _)| start < e && end > s)
                });

            match located {
                Some(start) => {
                    spans.push((
                        start,
                        start + rel.target_reference.len(),
                        &rewrite.new_reference,
                    ));
                    applied.push(rewrite);
                }
                None => {
                    tracing::warn!(
                        file = %rel.source_file,
                        line = rel.source_line_number,
                        reference = %rel.target_reference,
                        "reference not found in recorded line, edit dropped"
                    );
                    warnings.push(PlanWarning {
                        kind: "reference_not_found".to_string(),
                        file: rel.source_file.clone(),
                        line: rel.source_line_number,
                        reference: rel.target_reference.clone(),
                        message: format!(
                            "Could not locate '{}' in line {} of {}; reference left unchanged",
                            rel.target_reference, rel.source_line_number, rel.source_file
                        ),
                    });
                }
            }
        }

        if spans.is_empty() {
            continue;
        }

        // Replace from end to start so earlier offsets stay valid
        spans.sort_by(|a, b| b.0.cmp(&a.0));
        let mut replacement = original.clone();
        for (start, end, new_reference) in &spans {
            replacement.replace_range(start..end, new_reference);
        }

        if replacement == original {
            continue;
        }

        for rewrite in applied {
            edits.push(PlannedEdit {
                relationship: rewrite.relationship.clone(),
                file: file.clone(),
                new_reference: rewrite.new_reference.clone(),
                new_target: rewrite.new_target.clone(),
                new_line_text: replacement.clone(),
            });
        }

        edit_ops.push(Operation::Edit {
            file,
            line,
            expected: original,
            replacement,
        });
    }

    edit_ops.sort_by(|a, b| match (a, b) {
        (
            Operation::Edit {
                file: fa, line: la, ..
            },
            Operation::Edit {
                file: fb, line: lb, ..
            },
        ) => fa.cmp(fb).then(lb.cmp(la)),
        _ => std::cmp::Ordering::Equal,
    });

    let mut ordered_operations: Vec<Operation> = moves
        .iter()
        .map(|m| Operation::Move {
            from: m.old_path.clone(),
            to: m.new_path.clone(),
        })
        .collect();
    ordered_operations.extend(edit_ops);

    UpdatePlan::new(moves, edits, ordered_operations, warnings)
}

/// Byte offset of `reference` in `line`: at the recorded 1-indexed column when it
/// still matches there, otherwise its only occurrence in the line.
fn locate_reference(line: &str, column: usize, reference: &str) -> Option<usize> {
    if reference.is_empty() {
        return None;
    }

    let at_column = column.checked_sub(1)?;
    if line
        .get(at_column..)
        .is_some_and(|rest| rest.starts_with(reference))
    {
        return Some(at_column);
    }

    let mut occurrences = line.match_indices(reference).map(|(idx, _)| idx);
    match (occurrences.next(), occurrences.next()) {
        (Some(idx), None) => Some(idx),
        _ => None,
    }
}

/// Render the reference `rel` should contain once its source lives at
/// `new_source` and its target at `new_target`, keeping the written style:
/// leading `/` or `./`, implicit extension, fragment and query.
pub fn render_reference(rel: &Relationship, new_source: &str, new_target: &str) -> String {
    render_in_style(rel, rel.reference_style, new_source, new_target)
}

fn render_in_style(
    rel: &Relationship,
    style: ReferenceStyle,
    new_source: &str,
    new_target: &str,
) -> String {
    let (written, suffix) = split_suffix(&rel.target_reference);
    let target = strip_implicit_extension(written, &rel.resolved_target, new_target);

    let rendered = match style {
        ReferenceStyle::RootAbsolute => format!("/{}", target),
        ReferenceStyle::RootRelative => target.to_string(),
        ReferenceStyle::SourceRelative => {
            let relative = path::relative_to(path::parent(new_source), target);
            // Relative import specifiers must start with a dot
            let dotted = written.starts_with("./")
                || (rel.relationship_type == RelationshipType::ImportReference
                    && written.starts_with("../"));
            if dotted && !relative.starts_with("../") {
                format!("./{}", relative)
            } else {
                relative
            }
        }
    };

    format!("{}{}", rendered, suffix)
}

/// Drop the extension the resolver appended if the reference was written without it.
fn strip_implicit_extension<'a>(written: &str, resolved: &str, new_target: &'a str) -> &'a str {
    let written_name = path::basename(written);
    if written_name.is_empty() || written_name == "." || written_name == ".." {
        return new_target;
    }

    let Some(ext) = path::basename(resolved)
        .strip_prefix(written_name)
        .and_then(|rest| rest.strip_prefix('.'))
        .filter(|ext| !ext.is_empty())
    else {
        return new_target;
    };

    new_target
        .strip_suffix(ext)
        .and_then(|t| t.strip_suffix('.'))
        .unwrap_or(new_target)
}
