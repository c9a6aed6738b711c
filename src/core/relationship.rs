//! Relationship records: one detected reference from a file/line to another file.
//!
//! Relationships are immutable values recomputed on every scan. Broken status is
//! only ever produced by a fresh scan, never patched in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tagged category of reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Hyperlink,
    ReferenceLink,
    ImportReference,
    FilePathReference,
    ImageReference,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 5] = [
        RelationshipType::Hyperlink,
        RelationshipType::ReferenceLink,
        RelationshipType::ImportReference,
        RelationshipType::FilePathReference,
        RelationshipType::ImageReference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Hyperlink => "hyperlink",
            RelationshipType::ReferenceLink => "reference_link",
            RelationshipType::ImportReference => "import_reference",
            RelationshipType::FilePathReference => "file_path_reference",
            RelationshipType::ImageReference => "image_reference",
        }
    }

    /// Whether the auto-healer may rewrite broken references of this type.
    ///
    /// Imports resolve through language tooling (index files, path aliases), so a
    /// basename match is not enough evidence to rewrite one.
    pub fn healable(&self) -> bool {
        !matches!(self, RelationshipType::ImportReference)
    }
}

/// How a reference was written relative to the tree; kept so a rewritten
/// reference reads the same way the author wrote it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceStyle {
    /// Relative to the referring file's directory (`../img/a.png`).
    SourceRelative,
    /// Relative to the root without a leading slash (`docs/b.md` from `docs/a.md`).
    RootRelative,
    /// Leading slash, resolved against the root (`/docs/b.md`).
    RootAbsolute,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Root-relative path of the referring file.
    pub source_file: String,
    /// Reference exactly as written, fragment and query included.
    pub target_reference: String,
    pub relationship_type: RelationshipType,
    /// 1-indexed.
    pub source_line_number: usize,
    /// 1-indexed byte column of `target_reference` within the line.
    pub source_column: usize,
    pub source_line_text: String,
    /// Root-relative path the reference resolves to.
    pub resolved_target: String,
    pub reference_style: ReferenceStyle,
    pub confidence: f64,
    pub is_broken: bool,
    pub last_verified: DateTime<Utc>,
}

impl Relationship {
    /// The reference with any `#fragment` or `?query` removed.
    pub fn target_path(&self) -> &str {
        split_suffix(&self.target_reference).0
    }
}

/// Split a reference into its path and its `#fragment`/`?query` suffix.
pub fn split_suffix(reference: &str) -> (&str, &str) {
    match reference.find(['#', '?']) {
        Some(idx) => reference.split_at(idx),
        None => (reference, ""),
    }
}
