use logslice::config::{generate::generate_starter_config, load_config, load_or_default, ConfigError};
use logslice::pipeline::{parse_target_date, ExtractRequest};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_generated_config_is_valid() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");
    fs::write(&config_path, generate_starter_config()).unwrap();

    let config = load_config(&config_path).expect("Generated config should be valid");

    assert_eq!(config.timestamp.format, "%Y-%m-%d");
    assert_eq!(config.timestamp.offset, 0);
    assert!(config.index.dir.is_none());
    assert_eq!(config.extract.output_dir, PathBuf::from("./output"));
    assert_eq!(config.extract.boundary_scan_limit, 1 << 20);
}

#[test]
fn test_config_drives_extract_request() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");
    fs::write(
        &config_path,
        r#"
timestamp:
  format: "%Y%m%d"
  offset: 4
index:
  dir: /var/cache/logslice
extract:
  workers: 6
  output_dir: /srv/slices
  min_chunk_bytes: 8MiB
  read_buffer_bytes: 1MiB
"#,
    )
    .unwrap();

    let config = load_or_default(Some(&config_path)).unwrap();
    let request = ExtractRequest::from_config(
        &config,
        PathBuf::from("/var/log/app.log"),
        parse_target_date("2024-12-01").unwrap(),
    )
    .unwrap();

    assert_eq!(request.index_path, PathBuf::from("/var/cache/logslice/app.log.idx"));
    assert_eq!(request.output_dir, PathBuf::from("/srv/slices"));
    assert_eq!(request.workers, 6);
    assert_eq!(request.min_chunk_bytes, 8 << 20);
    assert_eq!(request.read_buffer_bytes, 1 << 20);
    assert_eq!(request.build.read_buffer_bytes, 1 << 20);
    assert_eq!(request.parser.signature(), "%Y%m%d@4");
}

#[test]
fn test_invalid_config_lists_every_problem() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.yml");
    fs::write(
        &config_path,
        "extract:\n  workers: 0\n  boundary_scan_limit: 0\n  read_buffer_bytes: 0\n",
    )
    .unwrap();

    match load_config(&config_path) {
        Err(ConfigError::ValidationList(errors)) => assert_eq!(errors.len(), 3),
        other => panic!("expected validation errors, got {:?}", other),
    }
}
