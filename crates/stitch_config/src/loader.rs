//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::path::Path;

/// Name of the configuration file at the project root.
pub const CONFIG_FILE: &str = "stitch.toml";

/// Loads and validates a `stitch.toml` configuration from a project directory.
///
/// Reads `<project_dir>/stitch.toml`, parses it, and validates required fields.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `stitch.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that required fields are present and references resolve.
fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.project.name.is_empty() {
        return Err(ConfigError::MissingField("project.name".to_string()));
    }
    if config.modules.is_empty() {
        return Err(ConfigError::MissingField("modules".to_string()));
    }
    for (name, compiler) in &config.compilers {
        if compiler.program.is_empty() {
            return Err(ConfigError::MissingField(format!(
                "compilers.{name}.program"
            )));
        }
        if compiler.extensions.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "compiler '{name}' declares no source extensions"
            )));
        }
    }
    for (name, module) in &config.modules {
        if module.compilers.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "module '{name}' has no compilers"
            )));
        }
        for compiler in &module.compilers {
            if !config.compilers.contains_key(compiler) {
                return Err(ConfigError::UnknownCompiler {
                    module: name.clone(),
                    compiler: compiler.clone(),
                });
            }
        }
    }
    if let Some(packager) = &config.packager {
        if packager.program.is_empty() {
            return Err(ConfigError::MissingField("packager.program".to_string()));
        }
    }
    Ok(())
}
