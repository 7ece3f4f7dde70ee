use super::types::*;
use crate::config::{env_var_pattern, expand_env_vars, expand_tilde};
use crate::source::timestamp::DateParser;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let (config, _) = load_config_with_yaml(path)?;
    Ok(config)
}

/// Load config and return both the parsed config and the expanded YAML string
pub fn load_config_with_yaml(path: &Path) -> Result<(Config, String), ConfigError> {
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    let config = parse_config_str(&yaml_string).map_err(|e| match e {
        ConfigError::YamlParse(e) => ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        )),
        other => other,
    })?;

    Ok((config, expand_env_vars(&yaml_string)))
}

/// Parse and validate a YAML config document.
pub fn parse_config_str(yaml: &str) -> Result<Config, ConfigError> {
    // Expand environment variables in the YAML string before parsing
    let yaml_string = expand_env_vars(yaml);

    check_unexpanded_vars(&yaml_string)?;

    // An empty document means "all defaults"
    let mut config: Config = if yaml_string.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&yaml_string)?
    };

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let mut unexpanded_vars: Vec<String> = env_var_pattern()
        .captures_iter(yaml_string)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let error_msg = if unexpanded_vars.len() == 1 {
        format!(
            "Environment variable $env{{{0}}} is not set.\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variable: export {0}=/path/to/directory\n\
             2. Replace $env{{{0}}} in the config file with an actual path",
            unexpanded_vars[0]
        )
    } else {
        format!(
            "Environment variables are not set: {}\n\
             \n\
             To fix this, either:\n\
             1. Set the environment variables (e.g., export LOG_ROOT=/var/log)\n\
             2. Replace the variables in the config file with actual paths",
            unexpanded_vars.join(", ")
        )
    };

    Err(ConfigError::Validation(error_msg))
}

/// Expands tilde (~) in all PathBuf fields in the config.
fn expand_paths(config: &mut Config) {
    if let Some(dir) = config.index.dir.as_mut() {
        *dir = expand_tilde(dir);
    }
    config.extract.output_dir = expand_tilde(&config.extract.output_dir);
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if let Err(e) = DateParser::from_config(&config.timestamp) {
        errors.push(format!("timestamp.format: {}", e));
    }

    let extract = &config.extract;
    if extract.workers == 0 {
        errors.push("extract.workers must be at least 1".to_string());
    }
    if extract.min_chunk_bytes == 0 {
        errors.push("extract.min_chunk_bytes must be greater than zero".to_string());
    }
    if extract.boundary_scan_limit == 0 {
        errors.push("extract.boundary_scan_limit must be greater than zero".to_string());
    }
    if extract.read_buffer_bytes == 0 {
        errors.push("extract.read_buffer_bytes must be greater than zero".to_string());
    }
    if usize::try_from(extract.read_buffer_bytes).is_err() {
        errors.push("extract.read_buffer_bytes does not fit in memory".to_string());
    }
    if extract.output_dir.as_os_str().is_empty() {
        errors.push("extract.output_dir must not be empty".to_string());
    }

    if let Some(dir) = &config.index.dir {
        if dir.as_os_str().is_empty() {
            errors.push("index.dir must not be empty when set".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}
