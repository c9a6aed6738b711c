//! Tree walking with skip rules.

use glob_match::glob_match;
use std::path::{Path, PathBuf};

use crate::defaults::ScanSettings;

/// Suffix of the temp files written by atomic writes; never scanned.
const TEMP_SUFFIX: &str = ".tether-tmp";

/// Walk `root` and return every file (any extension), sorted by path.
///
/// Skip rules:
/// - dot-prefixed entries unless `include_hidden`
/// - `skip_dirs` at any depth (VCS metadata, dependency caches)
/// - `root_skip_dirs` directly under the root only: `build/` at the root is
///   output, `scripts/build/` may hold sources
/// - files whose root-relative path matches an ignore pattern
/// - symlinked directories (avoids cycles)
pub fn walk_tree(root: &Path, settings: &ScanSettings) -> Vec<PathBuf> {
    let mut files = Vec::new();
    walk_recursive(root, root, settings, &mut files);
    files.sort();
    files
}

/// Files whose extension is in the scannable set.
pub fn scannable(files: &[PathBuf], settings: &ScanSettings) -> Vec<PathBuf> {
    files
        .iter()
        .filter(|f| {
            f.extension()
                .and_then(|e| e.to_str())
                .map(|ext| {
                    settings
                        .extensions
                        .iter()
                        .any(|allowed| allowed.eq_ignore_ascii_case(ext))
                })
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Whether a root-relative path or reference matches a configured ignore glob.
pub fn is_ignored(value: &str, settings: &ScanSettings) -> bool {
    settings
        .ignore_patterns
        .iter()
        .any(|pattern| glob_match(pattern, value))
}

fn walk_recursive(dir: &Path, root: &Path, settings: &ScanSettings, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        tracing::debug!(dir = %dir.display(), "unreadable directory skipped");
        return;
    };

    let is_root = dir == root;

    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let name = entry.file_name().to_string_lossy().to_string();

        if !settings.include_hidden && name.starts_with('.') {
            continue;
        }

        let path = entry.path();

        if file_type.is_dir() {
            // Always skip VCS/dependency dirs at any depth
            if settings.skip_dirs.iter().any(|d| d == &name) {
                continue;
            }
            // Skip build output dirs only at root level
            if is_root && settings.root_skip_dirs.iter().any(|d| d == &name) {
                continue;
            }
            walk_recursive(&path, root, settings, files);
        } else if file_type.is_file() || (file_type.is_symlink() && path.is_file()) {
            if name.ends_with(TEMP_SUFFIX) {
                continue;
            }
            let relative = crate::path::to_relative(root, &path);
            if is_ignored(&relative, settings) {
                continue;
            }
            files.push(path);
        }
    }
}
