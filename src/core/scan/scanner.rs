//! Parallel reference extraction.
//!
//! Files fan out over a rayon pool; each worker reads one file and extracts its
//! relationships with no shared mutable state. Results are merged and sorted
//! once every worker has finished.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::cancel::CancellationToken;
use super::matchers::{self, matcher_for};
use super::resolve::resolve;
use super::walker;
use crate::defaults::ScanSettings;
use crate::relationship::{split_suffix, Relationship};

/// A file the scan could not read. Non-fatal: the file is skipped.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ScanIssue {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub relationships: Vec<Relationship>,
    /// Root-relative paths of every file whose text was scanned.
    pub scanned_files: Vec<String>,
    pub issues: Vec<ScanIssue>,
    pub cancelled: bool,
    /// Files not read because the scan was cancelled first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unscanned_files: Vec<String>,
}

enum FileOutcome {
    Scanned(String, Vec<Relationship>),
    Unreadable(ScanIssue),
    Cancelled(String),
}

/// Heuristic confidence for one extracted reference, clamped to [0, 1].
pub fn score_confidence(
    base: f64,
    strong_extension: bool,
    exists: bool,
    reference_len: usize,
    long_reference_threshold: usize,
) -> f64 {
    let mut score = base;
    if strong_extension {
        score += 0.1;
    }
    if exists {
        score += 0.1;
    } else {
        score -= 0.3;
    }
    if reference_len > long_reference_threshold {
        score -= 0.2;
    }
    score.clamp(0.0, 1.0)
}

/// Walk `root` and extract every relationship from scannable files.
pub fn scan(root: &Path, settings: &ScanSettings, cancel: &CancellationToken) -> ScanOutcome {
    let all_files = walker::walk_tree(root, settings);
    let files = walker::scannable(&all_files, settings);
    let verified_at = Utc::now();

    let run = || -> Vec<FileOutcome> {
        files
            .par_iter()
            .map(|path| scan_one(root, path, settings, cancel, verified_at))
            .collect()
    };

    let outcomes = if settings.threads > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(settings.threads)
            .build()
        {
            Ok(pool) => pool.install(run),
            Err(e) => {
                tracing::warn!(error = %e, "could not build scan pool, using default");
                run()
            }
        }
    } else {
        run()
    };

    let mut relationships = Vec::new();
    let mut scanned_files = Vec::new();
    let mut issues = Vec::new();
    let mut unscanned_files = Vec::new();

    for outcome in outcomes {
        match outcome {
            FileOutcome::Scanned(file, found) => {
                scanned_files.push(file);
                relationships.extend(found);
            }
            FileOutcome::Unreadable(issue) => issues.push(issue),
            FileOutcome::Cancelled(file) => unscanned_files.push(file),
        }
    }

    relationships.sort_by(|a, b| {
        a.source_file
            .cmp(&b.source_file)
            .then(a.source_line_number.cmp(&b.source_line_number))
            .then(a.source_column.cmp(&b.source_column))
    });
    scanned_files.sort();
    issues.sort();
    unscanned_files.sort();

    let cancelled = !unscanned_files.is_empty();

    tracing::debug!(
        files = scanned_files.len(),
        relationships = relationships.len(),
        issues = issues.len(),
        cancelled,
        "scan complete"
    );

    ScanOutcome {
        relationships,
        scanned_files,
        issues,
        cancelled,
        unscanned_files,
    }
}

fn scan_one(
    root: &Path,
    path: &PathBuf,
    settings: &ScanSettings,
    cancel: &CancellationToken,
    verified_at: DateTime<Utc>,
) -> FileOutcome {
    let relative = crate::path::to_relative(root, path);

    if cancel.is_cancelled() {
        return FileOutcome::Cancelled(relative);
    }

    match crate::io::read_file(path, "scan file") {
        Ok(content) => {
            let found = extract_file(root, &relative, &content, settings, verified_at);
            FileOutcome::Scanned(relative, found)
        }
        Err(e) => {
            let error = e.details["error"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| e.message.clone());
            tracing::warn!(file = %relative, error = %error, "skipping unreadable file");
            FileOutcome::Unreadable(ScanIssue {
                file: relative,
                error,
            })
        }
    }
}

/// Split content into (line body, line terminator) pairs. A body never ends in
/// `\n` or `\r`, including a final line without a newline.
pub fn split_lines(content: &str) -> Vec<(&str, &str)> {
    content
        .split_inclusive('\n')
        .map(|segment| {
            let body = segment.strip_suffix('\n').unwrap_or(segment);
            let body = body.strip_suffix('\r').unwrap_or(body);
            segment.split_at(body.len())
        })
        .collect()
}

/// Extract relationships from one file's text.
pub fn extract_file(
    root: &Path,
    source_file: &str,
    content: &str,
    settings: &ScanSettings,
    verified_at: DateTime<Utc>,
) -> Vec<Relationship> {
    let mut relationships = Vec::new();

    for (line_idx, (line, _)) in split_lines(content).into_iter().enumerate() {
        for (kind, candidate) in matchers::extract_line(line) {
            let (target_path, _) = split_suffix(&candidate.target);
            if target_path.is_empty() || walker::is_ignored(target_path, settings) {
                continue;
            }

            let matcher = matcher_for(kind);
            let Some(resolution) =
                resolve(root, source_file, target_path, matcher.implicit_extensions())
            else {
                continue;
            };

            if walker::is_ignored(&resolution.resolved_target, settings) {
                continue;
            }

            let confidence = score_confidence(
                candidate.base_confidence,
                matcher.strong_extension(&resolution.resolved_target),
                resolution.exists,
                candidate.target.len(),
                settings.long_reference_threshold,
            );

            relationships.push(Relationship {
                source_file: source_file.to_string(),
                target_reference: candidate.target,
                relationship_type: kind,
                source_line_number: line_idx + 1,
                source_column: candidate.column + 1,
                source_line_text: line.to_string(),
                resolved_target: resolution.resolved_target,
                reference_style: resolution.style,
                confidence,
                is_broken: !resolution.exists,
                last_verified: verified_at,
            });
        }
    }

    relationships
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::{ReferenceStyle, RelationshipType};
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn confidence_formula() {
        assert!((score_confidence(0.8, true, true, 10, 120) - 1.0).abs() < 1e-9);
        assert!((score_confidence(0.8, true, false, 10, 120) - 0.6).abs() < 1e-9);
        assert!((score_confidence(0.8, false, false, 10, 120) - 0.5).abs() < 1e-9);
        assert!((score_confidence(0.8, false, false, 500, 120) - 0.3).abs() < 1e-9);
        assert_eq!(score_confidence(0.1, false, false, 500, 120), 0.0);
    }

    #[test]
    fn scan_finds_hyperlink_and_verifies_target() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "docs/a.md", "# A\n\nRead the [guide](docs/b.md).\n");
        write(dir.path(), "docs/b.md", "# B\n");

        let outcome = scan(dir.path(), &ScanSettings::default(), &CancellationToken::new());

        assert_eq!(outcome.scanned_files, vec!["docs/a.md", "docs/b.md"]);
        assert_eq!(outcome.relationships.len(), 1);
        let rel = &outcome.relationships[0];
        assert_eq!(rel.source_file, "docs/a.md");
        assert_eq!(rel.target_reference, "docs/b.md");
        assert_eq!(rel.relationship_type, RelationshipType::Hyperlink);
        assert_eq!(rel.source_line_number, 3);
        assert_eq!(rel.source_line_text, "Read the [guide](docs/b.md).");
        assert_eq!(rel.reference_style, ReferenceStyle::RootRelative);
        assert!(!rel.is_broken);
        assert!(rel.confidence >= 0.8);
    }

    #[test]
    fn split_lines_strips_every_terminator() {
        assert_eq!(
            split_lines("a\r\nb\nc\r"),
            vec![("a", "\r\n"), ("b", "\n"), ("c", "\r")]
        );
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn fragment_stripped_before_existence_check() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.md", "[x](b.md#part) [y](b.md?plain=1)\n");
        write(dir.path(), "b.md", "");

        let outcome = scan(dir.path(), &ScanSettings::default(), &CancellationToken::new());
        assert_eq!(outcome.relationships.len(), 2);
        assert!(outcome.relationships.iter().all(|r| !r.is_broken));
        assert!(outcome.relationships.iter().all(|r| r.resolved_target == "b.md"));
    }

    #[test]
    fn unreadable_file_is_reported_not_fatal() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "good.md", "[b](b.md)\n");
        fs::write(dir.path().join("bad.md"), [0xff, 0xfe, 0xfd]).unwrap();

        let outcome = scan(dir.path(), &ScanSettings::default(), &CancellationToken::new());
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].file, "bad.md");
        assert_eq!(outcome.scanned_files, vec!["good.md"]);
        assert_eq!(outcome.relationships.len(), 1);
        assert!(outcome.relationships[0].is_broken);
    }

    #[test]
    fn cancelled_scan_reads_nothing() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.md", "[b](b.md)\n");
        write(dir.path(), "b.md", "");

        let token = CancellationToken::new();
        token.cancel();
        let outcome = scan(dir.path(), &ScanSettings::default(), &token);

        assert!(outcome.cancelled);
        assert!(outcome.relationships.is_empty());
        assert_eq!(outcome.unscanned_files, vec!["a.md", "b.md"]);
    }

    #[test]
    fn ignore_patterns_drop_references() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.md", "[x](generated/api.md) [y](b.md)\n");

        let settings = ScanSettings {
            ignore_patterns: vec!["generated/**".to_string()],
            ..ScanSettings::default()
        };
        let outcome = scan(dir.path(), &settings, &CancellationToken::new());
        assert_eq!(outcome.relationships.len(), 1);
        assert_eq!(outcome.relationships[0].target_reference, "b.md");
    }

    #[test]
    fn explicit_thread_count_matches_default_pool() {
        let dir = TempDir::new().unwrap();
        for i in 0..12 {
            write(dir.path(), &format!("doc{}.md", i), &format!("[n](doc{}.md)\n", i + 1));
        }

        let default = scan(dir.path(), &ScanSettings::default(), &CancellationToken::new());
        let settings = ScanSettings {
            threads: 2,
            ..ScanSettings::default()
        };
        let pooled = scan(dir.path(), &settings, &CancellationToken::new());

        let key = |o: &ScanOutcome| {
            o.relationships
                .iter()
                .map(|r| (r.source_file.clone(), r.target_reference.clone(), r.is_broken))
                .collect::<Vec<_>>()
        };
        assert_eq!(key(&default), key(&pooled));
        assert_eq!(default.relationships.iter().filter(|r| r.is_broken).count(), 1);
    }
}
