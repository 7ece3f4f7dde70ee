pub mod reader;
pub mod timestamp;

pub use reader::{LineReader, LogLine, RawLine, ReaderError};
pub use timestamp::{parse_iso_date, DateParseError, DateParser, TimestampError};
