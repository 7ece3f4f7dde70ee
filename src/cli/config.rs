use crate::config::generate::generate_starter_config;
use crate::config::{load_config, resolve_config_path, user_config_path};
use std::fs;
use std::path::{Path, PathBuf};

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();

    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    let config_path = user_config_path()
        .ok_or("Cannot determine home directory. Use --stdout to print the config")?;
    write_config(&config_content, &config_path)?;

    println!("Config file written to {}", config_path.display());
    Ok(())
}

fn write_config(config_content: &str, config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if config_path.exists() {
        return Err(format!(
            "Config file already exists at {}. Remove it first or use --stdout to print the config",
            config_path.display()
        )
        .into());
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Could not create directory {}: {}", parent.display(), e))?;
    }

    fs::write(config_path, config_content)?;
    Ok(())
}

/// Returns whether the config is valid; problems are printed to stderr.
pub fn validate(config_path: Option<&Path>) -> Result<bool, Box<dyn std::error::Error>> {
    let path: PathBuf = resolve_config_path(config_path)
        .ok_or("No config file found. Use --config to specify a path.")?;

    println!("Validating config file: {}", path.display());

    match load_config(&path) {
        Ok(_) => {
            println!("✓ Config is valid");
            Ok(true)
        }
        Err(e) => {
            eprintln!("✗ Config validation failed:\n{}", e);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_config_creates_parent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/logslice/config.yml");

        write_config("extract:\n  workers: 2\n", &path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "extract:\n  workers: 2\n");
    }

    #[test]
    fn test_write_config_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "original").unwrap();

        let result = write_config("replacement", &path);

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn test_validate_reports_invalid_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "extract:\n  workers: 0\n").unwrap();

        assert!(!validate(Some(&path)).unwrap());
    }

    #[test]
    fn test_validate_accepts_starter_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, generate_starter_config()).unwrap();

        assert!(validate(Some(&path)).unwrap());
    }
}
