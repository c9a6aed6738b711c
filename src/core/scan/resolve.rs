//! Target resolution against the tree.
//!
//! A reference is tried under several interpretations, mirroring how readers
//! and renderers actually follow links: relative to the referring file first,
//! then relative to the root.

use std::path::Path;

use crate::path;
use crate::relationship::ReferenceStyle;

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub resolved_target: String,
    pub style: ReferenceStyle,
    pub exists: bool,
}

/// Resolve `target_path` (fragment already stripped) written in `source_file`.
///
/// Returns `None` for references that leave the root or name the root itself.
/// When no interpretation exists on disk, the one whose parent directory still
/// exists is kept (source-relative on ties), so deleting a target does not
/// change what the reference resolves to.
pub fn resolve(
    root: &Path,
    source_file: &str,
    target_path: &str,
    implicit_extensions: &[&str],
) -> Option<Resolution> {
    if let Some(absolute) = target_path.strip_prefix('/') {
        let normalized = path::normalize(absolute).filter(|p| !p.is_empty())?;
        let (resolved_target, exists) = probe(root, &normalized, implicit_extensions);
        return Some(Resolution {
            resolved_target,
            style: ReferenceStyle::RootAbsolute,
            exists,
        });
    }

    let source_relative =
        path::join(path::parent(source_file), target_path).filter(|p| !p.is_empty());
    let root_relative = path::normalize(target_path).filter(|p| !p.is_empty());

    if let Some(candidate) = &source_relative {
        let (resolved_target, exists) = probe(root, candidate, implicit_extensions);
        if exists {
            return Some(Resolution {
                resolved_target,
                style: ReferenceStyle::SourceRelative,
                exists,
            });
        }
    }

    if let Some(candidate) = &root_relative {
        if source_relative.as_ref() != Some(candidate) {
            let (resolved_target, exists) = probe(root, candidate, implicit_extensions);
            if exists {
                return Some(Resolution {
                    resolved_target,
                    style: ReferenceStyle::RootRelative,
                    exists,
                });
            }
        }
    }

    let parent_exists = |p: &String| root.join(path::parent(p)).is_dir();

    let (resolved_target, style) = match (source_relative, root_relative) {
        (Some(src), Some(rr)) if !parent_exists(&src) && parent_exists(&rr) => {
            (rr, ReferenceStyle::RootRelative)
        }
        (Some(src), _) => (src, ReferenceStyle::SourceRelative),
        (None, Some(rr)) => (rr, ReferenceStyle::RootRelative),
        (None, None) => return None,
    };

    Some(Resolution {
        resolved_target,
        style,
        exists: false,
    })
}

/// Check a candidate on disk, trying implicit extensions when it is missing.
fn probe(root: &Path, candidate: &str, implicit_extensions: &[&str]) -> (String, bool) {
    if root.join(candidate).exists() {
        return (candidate.to_string(), true);
    }

    for ext in implicit_extensions {
        let with_ext = format!("{}.{}", candidate, ext);
        if root.join(&with_ext).is_file() {
            return (with_ext, true);
        }
    }

    (candidate.to_string(), false)
}
