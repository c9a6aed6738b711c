//! Lexical path helpers for root-relative, `/`-separated paths.
//!
//! Nothing here touches the filesystem: references are compared and
//! rewritten as strings so the same answer comes back on every platform.

use std::path::Path;

/// Normalize a `/`-separated relative path, folding `.` and `..` segments.
///
/// Returns `None` when the path climbs above its starting point.
pub fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }

    Some(parts.join("/"))
}

/// Join a relative reference onto a directory and normalize the result.
pub fn join(dir: &str, reference: &str) -> Option<String> {
    if dir.is_empty() {
        normalize(reference)
    } else {
        normalize(&format!("{}/{}", dir, reference))
    }
}

/// Directory portion of a root-relative file path ("" for top-level files).
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Final segment of a `/`-separated path.
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Path from directory `from_dir` to `target`, both root-relative.
pub fn relative_to(from_dir: &str, target: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = Vec::new();
    parts.extend(std::iter::repeat("..").take(from.len() - common));
    parts.extend(&to[common..]);

    parts.join("/")
}

/// Render a filesystem path under `root` as a root-relative `/`-separated string.
pub fn to_relative(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
