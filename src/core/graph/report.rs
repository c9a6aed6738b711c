//! Integrity validation over a built graph.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::RelationshipGraph;
use crate::defaults::ValidateSettings;
use crate::relationship::RelationshipType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    BrokenReference,
    OrphanedFile,
    UnreadableFile,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityIssue {
    pub kind: IssueKind,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub message: String,
}

/// Result of validating a graph. Contains no timestamps, so validating an
/// unchanged tree twice yields equal reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityReport {
    pub total_relationships: usize,
    pub broken_relationships: usize,
    pub orphaned_files: usize,
    pub by_type_counts: BTreeMap<String, usize>,
    pub integrity_score: f64,
    pub issues: Vec<IntegrityIssue>,
    pub recommendations: Vec<String>,
}

impl IntegrityReport {
    pub fn passes(&self, settings: &ValidateSettings) -> bool {
        self.integrity_score >= settings.pass_threshold
    }
}

/// Validate `graph`. Pure: reads nothing from disk.
pub fn validate(graph: &RelationshipGraph, settings: &ValidateSettings) -> IntegrityReport {
    let relationships = graph.relationships();
    let total = relationships.len();

    let mut by_type_counts: BTreeMap<String, usize> = RelationshipType::ALL
        .iter()
        .map(|kind| (kind.as_str().to_string(), 0))
        .collect();
    for rel in relationships {
        *by_type_counts
            .entry(rel.relationship_type.as_str().to_string())
            .or_default() += 1;
    }

    let mut issues = Vec::new();

    for rel in graph.broken() {
        issues.push(IntegrityIssue {
            kind: IssueKind::BrokenReference,
            file: rel.source_file.clone(),
            line: Some(rel.source_line_number),
            target: Some(rel.target_reference.clone()),
            message: format!(
                "{} reference '{}' points to missing file {}",
                rel.relationship_type.as_str(),
                rel.target_reference,
                rel.resolved_target
            ),
        });
    }
    let broken = issues.len();

    let orphans: BTreeSet<&String> = graph
        .scanned_files()
        .iter()
        .filter(|f| !graph.is_referenced(f))
        .collect();
    for file in &orphans {
        issues.push(IntegrityIssue {
            kind: IssueKind::OrphanedFile,
            file: (*file).clone(),
            line: None,
            target: None,
            message: "No discovered reference points to this file".to_string(),
        });
    }

    for issue in graph.scan_issues() {
        issues.push(IntegrityIssue {
            kind: IssueKind::UnreadableFile,
            file: issue.file.clone(),
            line: None,
            target: None,
            message: format!("Skipped during scan: {}", issue.error),
        });
    }

    issues.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then(a.file.cmp(&b.file))
            .then(a.line.cmp(&b.line))
            .then(a.target.cmp(&b.target))
    });

    let integrity_score = if total == 0 {
        1.0
    } else {
        1.0 - broken as f64 / total as f64
    };

    let recommendations = recommend(
        broken,
        orphans.len(),
        integrity_score,
        graph.scan_issues().len(),
        settings,
    );

    IntegrityReport {
        total_relationships: total,
        broken_relationships: broken,
        orphaned_files: orphans.len(),
        by_type_counts,
        integrity_score,
        issues,
        recommendations,
    }
}

fn recommend(
    broken: usize,
    orphans: usize,
    score: f64,
    unreadable: usize,
    settings: &ValidateSettings,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if broken > 0 {
        recommendations.push(format!(
            "Fix {} broken reference(s): run `tether heal` or plan the moves that caused them",
            broken
        ));
    }
    if orphans > settings.orphan_review_threshold {
        recommendations.push(format!(
            "Review {} orphaned file(s) for potential cleanup",
            orphans
        ));
    }
    if score < settings.pass_threshold {
        recommendations.push(format!(
            "Integrity score {:.2} is below {:.2}: consider a systematic reference cleanup",
            score, settings.pass_threshold
        ));
    }
    if unreadable > 0 {
        recommendations.push(format!(
            "{} file(s) could not be read: check their encoding",
            unreadable
        ));
    }

    recommendations
}
