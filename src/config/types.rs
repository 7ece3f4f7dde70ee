use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timestamp: TimestampConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
}

/// Where the date sits in each line and how it is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampConfig {
    #[serde(default = "default_date_format")]
    pub format: String,
    /// Byte offset of the date prefix from the start of the line.
    #[serde(default)]
    pub offset: usize,
}

impl Default for TimestampConfig {
    fn default() -> Self {
        Self {
            format: default_date_format(),
            offset: 0,
        }
    }
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory holding index files; next to the log file when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_progress_interval", with = "byte_size")]
    pub progress_interval_bytes: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: None,
            progress_interval_bytes: default_progress_interval(),
        }
    }
}

fn default_progress_interval() -> u64 {
    1 << 30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_min_chunk_bytes", with = "byte_size")]
    pub min_chunk_bytes: u64,
    #[serde(default = "default_boundary_scan_limit", with = "byte_size")]
    pub boundary_scan_limit: u64,
    #[serde(default = "default_read_buffer_bytes", with = "byte_size")]
    pub read_buffer_bytes: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            output_dir: default_output_dir(),
            min_chunk_bytes: default_min_chunk_bytes(),
            boundary_scan_limit: default_boundary_scan_limit(),
            read_buffer_bytes: default_read_buffer_bytes(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_min_chunk_bytes() -> u64 {
    64 * 1024
}

fn default_boundary_scan_limit() -> u64 {
    1024 * 1024
}

fn default_read_buffer_bytes() -> u64 {
    256 * 1024
}

// Custom serde module for byte sizes: plain integers or "64KiB", "1MiB", ...
pub(crate) mod byte_size {
    use serde::{self, de, Deserialize, Deserializer, Serializer};

    const UNITS: [(&str, u64); 5] = [
        ("TiB", 1 << 40),
        ("GiB", 1 << 30),
        ("MiB", 1 << 20),
        ("KiB", 1 << 10),
        ("B", 1),
    ];

    pub fn serialize<S>(bytes: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_byte_size(*bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(n),
            Raw::Text(s) => parse_byte_size(&s).map_err(de::Error::custom),
        }
    }

    pub fn parse_byte_size(s: &str) -> Result<u64, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty byte size".to_string());
        }

        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (value_str, unit) = s.split_at(split);
        let unit = unit.trim();

        let value: u64 = value_str
            .parse()
            .map_err(|_| format!("invalid numeric value in byte size: {}", s))?;

        let multiplier = match unit {
            "" | "B" => 1,
            "K" | "KiB" => 1 << 10,
            "M" | "MiB" => 1 << 20,
            "G" | "GiB" => 1 << 30,
            "T" | "TiB" => 1 << 40,
            other => return Err(format!("unknown byte size unit: {}", other)),
        };

        value
            .checked_mul(multiplier)
            .ok_or_else(|| format!("byte size out of range: {}", s))
    }

    pub fn format_byte_size(bytes: u64) -> String {
        for (unit, size) in UNITS {
            if bytes >= size && bytes % size == 0 {
                return format!("{}{}", bytes / size, unit);
            }
        }
        format!("{}B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::byte_size::{format_byte_size, parse_byte_size};
    use super::*;

    #[test]
    fn test_parse_byte_size_units() {
        assert_eq!(parse_byte_size("512").unwrap(), 512);
        assert_eq!(parse_byte_size("512B").unwrap(), 512);
        assert_eq!(parse_byte_size("64KiB").unwrap(), 64 * 1024);
        assert_eq!(parse_byte_size("1 MiB").unwrap(), 1 << 20);
        assert_eq!(parse_byte_size("2G").unwrap(), 2 << 30);
        assert_eq!(parse_byte_size("1TiB").unwrap(), 1 << 40);
    }

    #[test]
    fn test_parse_byte_size_errors() {
        assert!(parse_byte_size("").is_err());
        assert!(parse_byte_size("KiB").is_err());
        assert!(parse_byte_size("10 parsecs").is_err());
        assert!(parse_byte_size("99999999999TiB").is_err());
    }

    #[test]
    fn test_format_byte_size() {
        assert_eq!(format_byte_size(0), "0B");
        assert_eq!(format_byte_size(1000), "1000B");
        assert_eq!(format_byte_size(64 * 1024), "64KiB");
        assert_eq!(format_byte_size(1 << 30), "1GiB");
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();

        assert_eq!(config.timestamp.format, "%Y-%m-%d");
        assert_eq!(config.timestamp.offset, 0);
        assert!(config.index.dir.is_none());
        assert_eq!(config.extract.min_chunk_bytes, 64 * 1024);
        assert_eq!(config.extract.output_dir, PathBuf::from("output"));
        assert!(config.extract.workers >= 1);
    }

    #[test]
    fn test_sizes_accept_numbers_and_strings() {
        let yaml = r#"
extract:
  min_chunk_bytes: 4096
  boundary_scan_limit: 2MiB
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.extract.min_chunk_bytes, 4096);
        assert_eq!(config.extract.boundary_scan_limit, 2 << 20);
    }

    #[test]
    fn test_sizes_serialize_readably() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        assert!(yaml.contains("min_chunk_bytes: 64KiB"));
        assert!(yaml.contains("progress_interval_bytes: 1GiB"));
    }
}
