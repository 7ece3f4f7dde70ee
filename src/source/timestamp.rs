use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use std::fmt::Write;
use thiserror::Error;

use crate::config::types::TimestampConfig;

/// Date layout used by the index file and the CLI date argument.
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("date format '{0}' is not a valid date-only strftime format")]
    InvalidFormat(String),

    #[error("date format '{0}' does not render to a fixed width")]
    VariableWidth(String),

    #[error("date format '{0}' renders to an empty prefix")]
    EmptyFormat(String),
}

/// Why a line carries no usable date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DateParseError {
    #[error("line is shorter than the {needed}-byte date prefix")]
    TooShort { needed: usize },

    #[error("date prefix is not valid UTF-8")]
    NotUtf8,

    #[error("date prefix does not match the date format")]
    Malformed,
}

/// Reads the calendar date out of a fixed-position prefix of a raw log line.
///
/// The prefix starts `offset` bytes into the line and is exactly as wide as
/// the configured format renders, so parsing never looks further into the
/// line than `offset + width` bytes.
#[derive(Debug, Clone)]
pub struct DateParser {
    format: String,
    offset: usize,
    width: usize,
    iso: bool,
}

impl DateParser {
    /// Create a parser for a date-only strftime `format` found `offset` bytes
    /// into each line.
    ///
    /// Formats whose rendering width depends on the date (`%B`, `%A`, `%-d`,
    /// ...) are rejected, as are formats carrying time fields.
    pub fn new(format: &str, offset: usize) -> Result<Self, TimestampError> {
        if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(TimestampError::InvalidFormat(format.to_string()));
        }

        let mut width = None;
        for sample in width_samples() {
            let mut rendered = String::new();
            write!(rendered, "{}", sample.format(format))
                .map_err(|_| TimestampError::InvalidFormat(format.to_string()))?;

            match width {
                None => width = Some(rendered.len()),
                Some(w) if w != rendered.len() => {
                    return Err(TimestampError::VariableWidth(format.to_string()));
                }
                Some(_) => {}
            }
        }

        let width = width.unwrap_or(0);
        if width == 0 {
            return Err(TimestampError::EmptyFormat(format.to_string()));
        }

        Ok(Self {
            format: format.to_string(),
            offset,
            width,
            iso: format == ISO_DATE_FORMAT,
        })
    }

    /// Parser for `YYYY-MM-DD` at the very start of the line.
    pub fn iso() -> Self {
        Self {
            format: ISO_DATE_FORMAT.to_string(),
            offset: 0,
            width: 10,
            iso: true,
        }
    }

    pub fn from_config(config: &TimestampConfig) -> Result<Self, TimestampError> {
        Self::new(&config.format, config.offset)
    }

    /// Parse the date prefix of `line`.
    pub fn parse(&self, line: &[u8]) -> Result<NaiveDate, DateParseError> {
        let end = self.offset + self.width;
        let prefix = line
            .get(self.offset..end)
            .ok_or(DateParseError::TooShort { needed: end })?;

        if self.iso {
            return parse_iso_bytes(prefix);
        }

        let text = std::str::from_utf8(prefix).map_err(|_| DateParseError::NotUtf8)?;
        NaiveDate::parse_from_str(text, &self.format).map_err(|_| DateParseError::Malformed)
    }

    /// Number of bytes the parser inspects, counted from the start of the line.
    pub fn prefix_len(&self) -> usize {
        self.offset + self.width
    }

    /// Stable description of the parser, recorded with each index so an index
    /// built under a different format is never reused.
    pub fn signature(&self) -> String {
        format!("{}@{}", self.format, self.offset)
    }
}

impl Default for DateParser {
    fn default() -> Self {
        Self::iso()
    }
}

/// Strictly parse a `YYYY-MM-DD` date, e.g. a command-line argument.
pub fn parse_iso_date(text: &str) -> Result<NaiveDate, DateParseError> {
    parse_iso_bytes(text.as_bytes())
}

fn parse_iso_bytes(bytes: &[u8]) -> Result<NaiveDate, DateParseError> {
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return Err(DateParseError::Malformed);
    }

    let year = ascii_number(&bytes[0..4])?;
    let month = ascii_number(&bytes[5..7])?;
    let day = ascii_number(&bytes[8..10])?;

    NaiveDate::from_ymd_opt(year as i32, month, day).ok_or(DateParseError::Malformed)
}

fn ascii_number(bytes: &[u8]) -> Result<u32, DateParseError> {
    bytes.iter().try_fold(0u32, |acc, &b| {
        if b.is_ascii_digit() {
            Ok(acc * 10 + u32::from(b - b'0'))
        } else {
            Err(DateParseError::Malformed)
        }
    })
}

// Month names, weekday names and unpadded fields all change width across these.
fn width_samples() -> impl Iterator<Item = NaiveDate> {
    [(2001, 1, 1), (2000, 9, 27), (2000, 12, 31)]
        .into_iter()
        .filter_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
}
