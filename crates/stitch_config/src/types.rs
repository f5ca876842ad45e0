//! Configuration types deserialized from `stitch.toml`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// The top-level project configuration parsed from `stitch.toml`.
///
/// Describes the modules taking part in a build, the compilers that turn
/// their sources into outputs, and the packaging tool that bundles and merges
/// those outputs.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Core project metadata.
    pub project: ProjectMeta,
    /// Where per-task baselines are persisted.
    #[serde(default)]
    pub cache: CacheConfig,
    /// The packaging tool. Only required by commands that package.
    #[serde(default)]
    pub packager: Option<PackagerConfig>,
    /// Named compiler definitions (e.g., "java", "kotlin").
    #[serde(default)]
    pub compilers: BTreeMap<String, CompilerConfig>,
    /// Named modules (e.g., "app", "feature_login").
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleConfig>,
}

/// Core project metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMeta {
    /// The project name.
    pub name: String,
    /// The project version string.
    #[serde(default)]
    pub version: String,
}

/// Location of the history store.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Directory holding baseline records, relative to the project root.
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> String {
    ".stitch/history".to_string()
}

/// The external packaging tool (e.g., a dexer).
///
/// The tool is invoked as `<program> --output <dir> <args...> <inputs...>`
/// and is expected to write `fragment_name` into `<dir>`.
#[derive(Debug, Clone, Deserialize)]
pub struct PackagerConfig {
    /// Executable name or path.
    pub program: String,
    /// Extra arguments placed before the input files.
    #[serde(default)]
    pub args: Vec<String>,
    /// Name of the file the tool writes into its output directory.
    #[serde(default = "default_fragment_name")]
    pub fragment_name: String,
    /// Per-module fragment directory, relative to the module directory.
    #[serde(default = "default_fragment_dir")]
    pub fragment_dir: String,
    /// Merged artifact directory, relative to the project root.
    #[serde(default = "default_merged_dir")]
    pub merged_dir: String,
}

fn default_fragment_name() -> String {
    "classes.dex".to_string()
}

fn default_fragment_dir() -> String {
    "build/outputs/incremental".to_string()
}

fn default_merged_dir() -> String {
    "build/outputs/merged".to_string()
}

/// An external compiler for one source language.
#[derive(Debug, Clone, Deserialize)]
pub struct CompilerConfig {
    /// Task name used in history keys. Defaults to `compile<Name>`.
    #[serde(default)]
    pub task: Option<String>,
    /// Executable name or path.
    pub program: String,
    /// Arguments placed before the source files. `{output}` and `{classpath}`
    /// are substituted with the output directory and the joined classpath.
    #[serde(default)]
    pub args: Vec<String>,
    /// Source file extensions this compiler consumes, without the dot.
    ///
    /// Accepts either a single string or a list of strings.
    #[serde(deserialize_with = "deserialize_string_or_vec")]
    pub extensions: Vec<String>,
    /// Output directory, relative to the module directory.
    pub output_dir: String,
    /// How a source file maps to its compiled output.
    #[serde(default)]
    pub naming: NamingConfig,
}

/// Rule mapping a source file to the output the compiler produces for it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum NamingConfig {
    /// `a/b/Foo.java` compiles to `a/b/Foo.<extension>`.
    SameStem {
        /// Output file extension, without the dot.
        extension: String,
    },
    /// Like `SameStem`, but the output may instead carry (or drop) `suffix` on
    /// its stem, as with Kotlin file facades (`Util.kt` → `UtilKt.class`).
    FacadeSuffix {
        /// Output file extension, without the dot.
        extension: String,
        /// Stem suffix toggled by the alternate name.
        suffix: String,
    },
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self::SameStem {
            extension: "class".to_string(),
        }
    }
}

/// A module taking part in the build.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    /// Module directory relative to the project root. Defaults to the module name.
    #[serde(default)]
    pub path: Option<String>,
    /// Source roots relative to the module directory.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Classpath entries (jars or directories) relative to the module directory.
    #[serde(default)]
    pub classpath: Vec<String>,
    /// Names of the compilers that run for this module.
    #[serde(default)]
    pub compilers: Vec<String>,
}

/// Deserializes a field that can be either a single string or a list of strings.
///
/// Allows `extensions = "java"` as well as `extensions = ["kt", "kts"]`.
fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut vec = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                vec.push(val);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}
