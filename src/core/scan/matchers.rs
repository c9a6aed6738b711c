//! Per-type reference matchers.
//!
//! Each `RelationshipType` owns one `RelationshipMatcher`. The fixed table in
//! `MATCHERS` is also the claim order: when two matchers find the same target
//! span on a line, the earlier one keeps it.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::relationship::RelationshipType;

/// Confidence every candidate starts from before scanner adjustments.
pub const BASE_CONFIDENCE: f64 = 0.8;

/// A raw match on a single line.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub target: String,
    /// 0-indexed byte offset of `target` within the line.
    pub column: usize,
    pub base_confidence: f64,
}

pub trait RelationshipMatcher: Send + Sync {
    fn relationship_type(&self) -> RelationshipType;

    /// Extract candidate targets from one line. External URLs and anchors are
    /// already filtered out.
    fn extract(&self, line: &str) -> Vec<Candidate>;

    /// Whether the target's extension is typical for this reference type.
    fn strong_extension(&self, target_path: &str) -> bool;

    /// Extensions tried, in order, when the target as written does not exist.
    fn implicit_extensions(&self) -> &'static [&'static str] {
        &[]
    }
}

const DOC_EXTENSIONS: &[&str] = &[
    "md", "markdown", "mdx", "rst", "txt", "adoc", "html", "htm", "pdf",
];

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "ico", "bmp",
];

const IMPORT_EXTENSIONS: &[&str] = &[
    "js", "jsx", "ts", "tsx", "mjs", "cjs", "vue", "svelte", "css", "scss", "less", "h", "hpp",
    "json",
];

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "php", "js", "jsx", "ts", "tsx", "mjs", "json", "toml", "yaml", "yml", "md", "txt",
    "sh", "py", "rb", "go", "c", "h", "cpp", "hpp", "css", "scss", "html", "png", "jpg", "svg",
];

/// Extensions that indicate domain-like patterns (not file paths)
const DOMAIN_EXTENSIONS: &[&str] = &[
    ".com", ".org", ".io", ".net", ".dev", ".co", ".app", ".ai", ".xyz",
];

// Regex patterns for reference extraction

static HYPERLINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    // [text](target) or [text](target "title"), angle-bracketed targets allowed.
    // Text may hold an image, as in badge links: [![ci](badge.svg)](docs/ci.md)
    Regex::new(
        r#"\[(?:[^\[\]]|!\[[^\]]*\]\([^)]*\))*\]\(\s*<?([^()\s<>]+)>?(?:\s+"[^"]*")?\s*\)"#,
    )
    .unwrap()
});

static REFERENCE_DEFINITION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    // [label]: target   (footnotes `[^1]:` excluded)
    Regex::new(r"^\s{0,3}\[[^\]^][^\]]*\]:\s*<?([^\s<>]+)>?").unwrap()
});

static MARKDOWN_IMAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"!\[[^\]]*\]\(\s*<?([^()\s<>]+)>?(?:\s+"[^"]*")?\s*\)"#).unwrap()
});

static HTML_IMAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).unwrap()
});

static IMPORT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // import x from './x' / export { y } from '../y'
        r#"\bfrom\s+["'](\.{1,2}/[^"']+)["']"#,
        // import './side-effect'
        r#"\bimport\s+["'](\.{1,2}/[^"']+)["']"#,
        // require('./x') / import('./x')
        r#"\b(?:require|import)\s*\(\s*["'](\.{1,2}/[^"']+)["']\s*\)"#,
        // @import "partials/base.css" / @import url("./x.css")
        r#"@import\s+(?:url\(\s*)?["']([^"']+)["']"#,
        // #include "local.h"
        r#"^\s*#\s*include\s+"([^"]+)""#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static FILE_PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    // Quoted or backticked paths with at least one directory separator and an
    // extension, e.g. `src/main.rs`, "../assets/logo.png", '/inc/Engine/Tool.php'
    Regex::new(
        r#"`(/?(?:[\w.-]+/)+[\w.-]+\.[a-zA-Z0-9]+)`|"(/?(?:[\w.-]+/)+[\w.-]+\.[a-zA-Z0-9]+)"|'(/?(?:[\w.-]+/)+[\w.-]+\.[a-zA-Z0-9]+)'"#,
    )
    .unwrap()
});

static URL_SCHEME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*:").unwrap());

/// Whether a target points outside the tree (URL, anchor, template placeholder).
pub fn is_external(target: &str) -> bool {
    target.is_empty()
        || target.starts_with('#')
        || target.starts_with("//")
        || URL_SCHEME_PATTERN.is_match(target)
        || target.contains("{{")
        || target.contains("${")
}

/// Lowercased extension of the final path segment.
pub fn extension_of(path: &str) -> Option<String> {
    let name = crate::path::basename(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn has_extension_in(path: &str, set: &[&str]) -> bool {
    extension_of(path).is_some_and(|ext| set.contains(&ext.as_str()))
}

/// Check if a path looks like a domain rather than a file (mysite.com/page).
fn is_domain_like(path: &str) -> bool {
    let first = path.trim_start_matches('/').split('/').next().unwrap_or("");
    DOMAIN_EXTENSIONS.iter().any(|ext| first.ends_with(ext))
}

/// Check if a path looks like a MIME type (platform-agnostic, IANA standard).
fn is_mime_type(path: &str) -> bool {
    let lower = path.to_lowercase();
    lower.starts_with("application/")
        || lower.starts_with("text/")
        || lower.starts_with("image/")
        || lower.starts_with("audio/")
        || lower.starts_with("video/")
        || lower.starts_with("font/")
        || lower.starts_with("multipart/")
}

fn candidate_from(caps: &Captures, group: usize) -> Option<Candidate> {
    let m = caps.get(group)?;
    if is_external(m.as_str()) {
        return None;
    }
    Some(Candidate {
        target: m.as_str().to_string(),
        column: m.start(),
        base_confidence: BASE_CONFIDENCE,
    })
}

// ============================================================================
// Matchers
// ============================================================================

pub struct HyperlinkMatcher;

impl RelationshipMatcher for HyperlinkMatcher {
    fn relationship_type(&self) -> RelationshipType {
        RelationshipType::Hyperlink
    }

    fn extract(&self, line: &str) -> Vec<Candidate> {
        HYPERLINK_PATTERN
            .captures_iter(line)
            .filter(|caps| {
                let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
                // `![alt](x)` belongs to the image matcher
                start == 0 || line.as_bytes()[start - 1] != b'!'
            })
            .filter_map(|caps| candidate_from(&caps, 1))
            .collect()
    }

    fn strong_extension(&self, target_path: &str) -> bool {
        has_extension_in(target_path, DOC_EXTENSIONS)
    }
}

pub struct ReferenceLinkMatcher;

impl RelationshipMatcher for ReferenceLinkMatcher {
    fn relationship_type(&self) -> RelationshipType {
        RelationshipType::ReferenceLink
    }

    fn extract(&self, line: &str) -> Vec<Candidate> {
        REFERENCE_DEFINITION_PATTERN
            .captures_iter(line)
            .filter_map(|caps| candidate_from(&caps, 1))
            .collect()
    }

    fn strong_extension(&self, target_path: &str) -> bool {
        has_extension_in(target_path, DOC_EXTENSIONS)
    }
}

pub struct ImageMatcher;

impl RelationshipMatcher for ImageMatcher {
    fn relationship_type(&self) -> RelationshipType {
        RelationshipType::ImageReference
    }

    fn extract(&self, line: &str) -> Vec<Candidate> {
        let mut found: Vec<Candidate> = MARKDOWN_IMAGE_PATTERN
            .captures_iter(line)
            .filter_map(|caps| candidate_from(&caps, 1))
            .collect();
        found.extend(
            HTML_IMAGE_PATTERN
                .captures_iter(line)
                .filter_map(|caps| candidate_from(&caps, 1)),
        );
        found.sort_by_key(|c| c.column);
        found
    }

    fn strong_extension(&self, target_path: &str) -> bool {
        has_extension_in(target_path, IMAGE_EXTENSIONS)
    }
}

pub struct ImportMatcher;

impl RelationshipMatcher for ImportMatcher {
    fn relationship_type(&self) -> RelationshipType {
        RelationshipType::ImportReference
    }

    fn extract(&self, line: &str) -> Vec<Candidate> {
        let mut found: Vec<Candidate> = Vec::new();
        for pattern in IMPORT_PATTERNS.iter() {
            for caps in pattern.captures_iter(line) {
                if let Some(candidate) = candidate_from(&caps, 1) {
                    if !found.iter().any(|c| c.column == candidate.column) {
                        found.push(candidate);
                    }
                }
            }
        }
        found.sort_by_key(|c| c.column);
        found
    }

    fn strong_extension(&self, target_path: &str) -> bool {
        has_extension_in(target_path, IMPORT_EXTENSIONS)
    }

    fn implicit_extensions(&self) -> &'static [&'static str] {
        &["ts", "tsx", "js", "jsx", "mjs", "cjs"]
    }
}

pub struct FilePathMatcher;

impl RelationshipMatcher for FilePathMatcher {
    fn relationship_type(&self) -> RelationshipType {
        RelationshipType::FilePathReference
    }

    fn extract(&self, line: &str) -> Vec<Candidate> {
        let mut found = Vec::new();

        for caps in FILE_PATH_PATTERN.captures_iter(line) {
            let Some(group) = (1..=3).find(|g| caps.get(*g).is_some()) else {
                continue;
            };
            let Some(candidate) = candidate_from(&caps, group) else {
                continue;
            };

            let path = candidate.target.as_str();

            // Skip domain-like patterns (mysite.com/page.html)
            if is_domain_like(path) {
                continue;
            }

            // Skip MIME types (application/*, text/*, etc.)
            if is_mime_type(path) {
                continue;
            }

            // Skip very short paths that might be false positives
            if path.len() < 5 {
                continue;
            }

            found.push(candidate);
        }

        found
    }

    fn strong_extension(&self, target_path: &str) -> bool {
        has_extension_in(target_path, SOURCE_EXTENSIONS)
    }
}

/// Registered matchers in claim order.
pub static MATCHERS: &[&dyn RelationshipMatcher] = &[
    &ImageMatcher,
    &HyperlinkMatcher,
    &ReferenceLinkMatcher,
    &ImportMatcher,
    &FilePathMatcher,
];

/// The registered matcher for a relationship type.
pub fn matcher_for(kind: RelationshipType) -> &'static dyn RelationshipMatcher {
    match kind {
        RelationshipType::ImageReference => &ImageMatcher,
        RelationshipType::Hyperlink => &HyperlinkMatcher,
        RelationshipType::ReferenceLink => &ReferenceLinkMatcher,
        RelationshipType::ImportReference => &ImportMatcher,
        RelationshipType::FilePathReference => &FilePathMatcher,
    }
}

/// Run every matcher over a line, dropping spans an earlier matcher claimed.
pub fn extract_line(line: &str) -> Vec<(RelationshipType, Candidate)> {
    let mut claimed: Vec<(usize, usize)> = Vec::new();
    let mut results = Vec::new();

    for matcher in MATCHERS {
        for candidate in matcher.extract(line) {
            let start = candidate.column;
            let end = start + candidate.target.len();
            if claimed.iter().any(|&(s, e)| start < e && end > s) {
                continue;
            }
            claimed.push((start, end));
            results.push((matcher.relationship_type(), candidate));
        }
    }

    results.sort_by_key(|(_, c)| c.column);
    results
}
