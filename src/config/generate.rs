pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# LOGSLICE CONFIGURATION
# =============================================================================
# Every section and key is optional; anything left out keeps its default.
# Command-line flags override the values below.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/logslice/config.yml
#   3. /etc/logslice/config.yml
#
# Paths may use ~ and $env{VAR_NAME}.

# =============================================================================
# TIMESTAMP
# =============================================================================
# Where each line's date lives. The date must be a fixed-width prefix that
# starts 'offset' bytes into the line. Lines whose prefix does not parse are
# kept with the preceding date while indexing and never extracted.

timestamp:
  # Date-only strftime format. Variable-width fields (%B, %A, %-d) are rejected.
  format: '%Y-%m-%d'
  # Byte offset of the date prefix from the start of the line
  offset: 0

# =============================================================================
# INDEX
# =============================================================================
# Each log file gets a date -> byte offset index, built on first use and
# rebuilt automatically whenever the log file changes.

index:
  # Directory for index files. Unset keeps '<log file>.idx' next to the log.
  # dir: ~/.cache/logslice
  # Log indexing progress (at debug level) every this many bytes
  progress_interval_bytes: 1GiB

# =============================================================================
# EXTRACTION
# =============================================================================
# Sizes accept plain byte counts or B, KiB, MiB, GiB, TiB suffixes.

extract:
  # Parallel workers; defaults to the number of available CPUs
  # workers: 8
  # Results land in <output_dir>/output_<YYYY-MM-DD>.txt
  output_dir: ./output
  # Ranges are never split into chunks smaller than this
  min_chunk_bytes: 64KiB
  # How far past a chunk boundary to look for the next line start
  boundary_scan_limit: 1MiB
  # Read buffer per worker
  read_buffer_bytes: 256KiB
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config_str;

    #[test]
    fn test_starter_config_is_valid() {
        let config = parse_config_str(&generate_starter_config()).unwrap();

        assert_eq!(config.timestamp.format, "%Y-%m-%d");
        assert_eq!(config.index.progress_interval_bytes, 1 << 30);
        assert_eq!(config.extract.min_chunk_bytes, 64 * 1024);
        assert_eq!(config.extract.read_buffer_bytes, 256 * 1024);
        assert!(config.extract.workers >= 1);
    }
}
