//! Mapping from a changed source file to the output its compiler produces.
//!
//! Every compiler declares its rule explicitly. A rule yields one primary
//! output name and at most one alternate, and resolution probes exactly
//! those two names before giving up.

use std::path::{Path, PathBuf};

use stitch_config::NamingConfig;

/// Naming contract between a source key and its compiled output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamingRule {
    /// `pkg/Foo.java` → `<out>/pkg/Foo.<extension>`. No alternate.
    SameStem {
        /// Output extension, without the dot.
        extension: String,
    },
    /// `pkg/Util.kt` → `<out>/pkg/Util.<extension>`, alternate
    /// `<out>/pkg/UtilKt.<extension>` (or the suffix stripped when the stem
    /// already ends with it).
    FacadeSuffix {
        /// Output extension, without the dot.
        extension: String,
        /// Stem suffix toggled by the alternate name.
        suffix: String,
    },
}

impl From<&NamingConfig> for NamingRule {
    fn from(config: &NamingConfig) -> Self {
        match config {
            NamingConfig::SameStem { extension } => NamingRule::SameStem {
                extension: extension.clone(),
            },
            NamingConfig::FacadeSuffix { extension, suffix } => NamingRule::FacadeSuffix {
                extension: extension.clone(),
                suffix: suffix.clone(),
            },
        }
    }
}

impl NamingRule {
    fn extension(&self) -> &str {
        match self {
            NamingRule::SameStem { extension } | NamingRule::FacadeSuffix { extension, .. } => {
                extension
            }
        }
    }

    /// The expected output for a `/`-separated source key.
    pub fn primary(&self, key: &str, output_dir: &Path) -> PathBuf {
        let (dir, stem) = split_key(key);
        output_dir.join(dir).join(format!("{stem}.{}", self.extension()))
    }

    /// The single fallback name, if the rule has one.
    pub fn alternate(&self, key: &str, output_dir: &Path) -> Option<PathBuf> {
        match self {
            NamingRule::SameStem { .. } => None,
            NamingRule::FacadeSuffix { extension, suffix } => {
                let (dir, stem) = split_key(key);
                let toggled = match stem.strip_suffix(suffix.as_str()) {
                    Some(stripped) if !stripped.is_empty() => stripped.to_string(),
                    _ => format!("{stem}{suffix}"),
                };
                Some(output_dir.join(dir).join(format!("{toggled}.{extension}")))
            }
        }
    }

    /// Probes the primary name, then the alternate, returning the first that exists.
    pub fn resolve(&self, key: &str, output_dir: &Path) -> Option<PathBuf> {
        let primary = self.primary(key, output_dir);
        if primary.exists() {
            return Some(primary);
        }
        self.alternate(key, output_dir).filter(|alt| alt.exists())
    }
}

/// Splits `a/b/Foo.java` into (`a/b`, `Foo`).
fn split_key(key: &str) -> (&str, &str) {
    let (dir, file) = key.rsplit_once('/').unwrap_or(("", key));
    let stem = match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    };
    (dir, stem)
}
