use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// File name of the optional per-tree configuration.
pub const CONFIG_FILE: &str = "tether.json";

/// Root configuration structure for tether.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TetherConfig {
    #[serde(default)]
    pub scan: ScanSettings,

    #[serde(default)]
    pub validate: ValidateSettings,

    #[serde(default)]
    pub heal: HealSettings,
}

/// Which files are walked and how references are extracted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    /// File extensions (without dot) whose text is scanned for references.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directory names skipped at any depth.
    #[serde(default = "default_skip_dirs")]
    pub skip_dirs: Vec<String>,

    /// Directory names skipped only directly under the root (build output).
    #[serde(default = "default_root_skip_dirs")]
    pub root_skip_dirs: Vec<String>,

    /// Walk dot-prefixed files and directories.
    #[serde(default)]
    pub include_hidden: bool,

    /// Glob patterns; matching references or files are ignored entirely.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// References longer than this are treated as likely malformed captures.
    #[serde(default = "default_long_reference_threshold")]
    pub long_reference_threshold: usize,

    /// Scan worker count; 0 uses the rayon default.
    #[serde(default)]
    pub threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateSettings {
    /// Minimum integrity score for `validate` to exit 0.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,

    /// Orphan count above which cleanup review is recommended.
    #[serde(default = "default_orphan_review_threshold")]
    pub orphan_review_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealSettings {
    /// Broken references below this confidence are never rewritten.
    #[serde(default = "default_min_heal_confidence")]
    pub min_confidence: f64,

    /// Rewrite to the preferred candidate when several share a basename.
    #[serde(default)]
    pub resolve_ambiguous: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            skip_dirs: default_skip_dirs(),
            root_skip_dirs: default_root_skip_dirs(),
            include_hidden: false,
            ignore_patterns: Vec::new(),
            long_reference_threshold: default_long_reference_threshold(),
            threads: 0,
        }
    }
}

impl Default for ValidateSettings {
    fn default() -> Self {
        Self {
            pass_threshold: default_pass_threshold(),
            orphan_review_threshold: default_orphan_review_threshold(),
        }
    }
}

impl Default for HealSettings {
    fn default() -> Self {
        Self {
            min_confidence: default_min_heal_confidence(),
            resolve_ambiguous: false,
        }
    }
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_extensions() -> Vec<String> {
    [
        "md", "markdown", "mdx", "rst", "txt", "adoc", "html", "htm", "js", "jsx", "ts", "tsx",
        "mjs", "cjs", "vue", "svelte", "css", "scss", "less", "json", "yaml", "yml", "toml",
        "c", "h", "cpp", "hpp", "py", "rs", "sh",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_skip_dirs() -> Vec<String> {
    [
        "node_modules",
        "vendor",
        ".git",
        ".svn",
        ".hg",
        "__pycache__",
        ".venv",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_root_skip_dirs() -> Vec<String> {
    ["build", "dist", "target", "cache", "tmp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_long_reference_threshold() -> usize {
    120
}

fn default_pass_threshold() -> f64 {
    0.9
}

fn default_orphan_review_threshold() -> usize {
    10
}

fn default_min_heal_confidence() -> f64 {
    0.5
}

// =============================================================================
// Loading
// =============================================================================

impl TetherConfig {
    /// Check ranges serde cannot express.
    pub fn validate(&self) -> Result<()> {
        check_unit_interval("validate.pass_threshold", self.validate.pass_threshold)?;
        check_unit_interval("heal.min_confidence", self.heal.min_confidence)?;

        if self.scan.extensions.is_empty() {
            return Err(Error::config_invalid_value(
                "scan.extensions",
                None,
                "At least one scannable extension is required",
            ));
        }

        Ok(())
    }
}

fn check_unit_interval(key: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::config_invalid_value(
            key,
            Some(value.to_string()),
            "Must be between 0.0 and 1.0",
        ))
    }
}

/// Load `tether.json` from the tree root, falling back to defaults when absent.
pub fn load_config(root: &Path) -> Result<TetherConfig> {
    let path = root.join(CONFIG_FILE);
    if !path.is_file() {
        return Ok(TetherConfig::default());
    }

    let raw = crate::io::read_file(&path, "read tether.json")?;
    let config: TetherConfig = serde_json::from_str(&raw)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(dir.path()).unwrap();
        assert!(config.scan.extensions.iter().any(|e| e == "md"));
        assert_eq!(config.validate.pass_threshold, 0.9);
        assert_eq!(config.heal.min_confidence, 0.5);
    }

    #[test]
    fn partial_config_keeps_remaining_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"scan": {"extensions": ["md"], "ignore_patterns": ["drafts/**"]}}"#,
        )
        .unwrap();

        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.scan.extensions, vec!["md".to_string()]);
        assert_eq!(config.scan.ignore_patterns, vec!["drafts/**".to_string()]);
        assert!(config.scan.skip_dirs.iter().any(|d| d == "node_modules"));
        assert_eq!(config.scan.long_reference_threshold, 120);
    }

    #[test]
    fn invalid_json_is_reported_with_path() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();

        let err = load_config(dir.path()).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_json");
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"validate": {"pass_threshold": 1.5}}"#,
        )
        .unwrap();

        let err = load_config(dir.path()).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
        assert_eq!(err.details["key"], "validate.pass_threshold");
    }
}
