//! Bidirectional relationship graph.
//!
//! Built once from a complete scan. The outgoing index is keyed by referring
//! file, the incoming index by the normalized root-relative target, so one file
//! referenced as `b.md`, `./b.md` and `/docs/b.md` collects a single bucket.

mod report;

pub use report::{validate, IntegrityIssue, IntegrityReport, IssueKind};

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use crate::relationship::Relationship;
use crate::scan::{ScanIssue, ScanOutcome};

#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    relationships: Vec<Relationship>,
    scanned_files: Vec<String>,
    scan_issues: Vec<ScanIssue>,
    outgoing: BTreeMap<String, Vec<usize>>,
    incoming: BTreeMap<String, Vec<usize>>,
}

impl RelationshipGraph {
    /// Index `relationships` in a single pass.
    pub fn build(
        relationships: Vec<Relationship>,
        scanned_files: Vec<String>,
        scan_issues: Vec<ScanIssue>,
    ) -> Self {
        let mut outgoing: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut incoming: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for (idx, rel) in relationships.iter().enumerate() {
            outgoing
                .entry(rel.source_file.clone())
                .or_default()
                .push(idx);
            incoming
                .entry(rel.resolved_target.clone())
                .or_default()
                .push(idx);
        }

        Self {
            relationships,
            scanned_files,
            scan_issues,
            outgoing,
            incoming,
        }
    }

    pub fn from_scan(outcome: ScanOutcome) -> Self {
        Self::build(outcome.relationships, outcome.scanned_files, outcome.issues)
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn scanned_files(&self) -> &[String] {
        &self.scanned_files
    }

    pub fn scan_issues(&self) -> &[ScanIssue] {
        &self.scan_issues
    }

    /// Relationships written in `source_file`.
    pub fn outgoing(&self, source_file: &str) -> Vec<&Relationship> {
        self.lookup(&self.outgoing, source_file)
    }

    /// Relationships whose normalized target is `target`.
    pub fn incoming(&self, target: &str) -> Vec<&Relationship> {
        self.lookup(&self.incoming, target)
    }

    pub fn is_referenced(&self, target: &str) -> bool {
        self.incoming.contains_key(target)
    }

    pub fn broken(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(|r| r.is_broken)
    }

    fn lookup(&self, index: &BTreeMap<String, Vec<usize>>, key: &str) -> Vec<&Relationship> {
        index
            .get(key)
            .map(|ids| ids.iter().map(|&i| &self.relationships[i]).collect())
            .unwrap_or_default()
    }
}

/// Index map rendered as `key -> [relationship]`.
struct IndexView<'a> {
    graph: &'a RelationshipGraph,
    index: &'a BTreeMap<String, Vec<usize>>,
}

impl Serialize for IndexView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.index.len()))?;
        for (key, ids) in self.index {
            let rels: Vec<&Relationship> =
                ids.iter().map(|&i| &self.graph.relationships[i]).collect();
            map.serialize_entry(key, &rels)?;
        }
        map.end()
    }
}

impl Serialize for RelationshipGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RelationshipGraph", 5)?;
        state.serialize_field("relationships", &self.relationships)?;
        state.serialize_field(
            "outgoing",
            &IndexView {
                graph: self,
                index: &self.outgoing,
            },
        )?;
        state.serialize_field(
            "incoming",
            &IndexView {
                graph: self,
                index: &self.incoming,
            },
        )?;
        state.serialize_field("scanned_files", &self.scanned_files)?;
        state.serialize_field("scan_issues", &self.scan_issues)?;
        state.end()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::relationship::{ReferenceStyle, RelationshipType};
    use chrono::Utc;

    pub(crate) fn rel(source: &str, reference: &str, resolved: &str, broken: bool) -> Relationship {
        Relationship {
            source_file: source.to_string(),
            target_reference: reference.to_string(),
            relationship_type: RelationshipType::Hyperlink,
            source_line_number: 1,
            source_column: 5,
            source_line_text: format!("[x]({})", reference),
            resolved_target: resolved.to_string(),
            reference_style: ReferenceStyle::SourceRelative,
            confidence: if broken { 0.6 } else { 1.0 },
            is_broken: broken,
            last_verified: Utc::now(),
        }
    }

    #[test]
    fn every_relationship_is_in_both_indices() {
        let graph = RelationshipGraph::build(
            vec![
                rel("docs/a.md", "b.md", "docs/b.md", false),
                rel("README.md", "/docs/b.md", "docs/b.md", false),
                rel("docs/b.md", "../README.md", "README.md", false),
            ],
            vec!["README.md".into(), "docs/a.md".into(), "docs/b.md".into()],
            vec![],
        );

        for r in graph.relationships() {
            assert!(graph.outgoing(&r.source_file).contains(&r));
            assert!(graph.incoming(&r.resolved_target).contains(&r));
            assert!((0.0..=1.0).contains(&r.confidence));
        }
        assert_eq!(graph.incoming("docs/b.md").len(), 2);
        assert!(graph.incoming("docs/a.md").is_empty());
        assert!(!graph.is_referenced("docs/a.md"));
    }

    #[test]
    fn serializes_indices_as_relationship_lists() {
        let graph = RelationshipGraph::build(
            vec![rel("a.md", "b.md", "b.md", true)],
            vec!["a.md".into()],
            vec![],
        );
        let json = serde_json::to_value(&graph).unwrap();
        assert_eq!(json["relationships"].as_array().unwrap().len(), 1);
        assert_eq!(json["outgoing"]["a.md"][0]["target_reference"], "b.md");
        assert_eq!(json["incoming"]["b.md"][0]["source_file"], "a.md");
        assert_eq!(json["scanned_files"][0], "a.md");
        assert_eq!(graph.broken().count(), 1);
    }
}
