use super::Index;
use chrono::NaiveDate;

/// Half-open byte range `[start, end)` whose bounds are line starts or EOF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Found(ByteRange),
    NotFound,
}

/// Locate the bytes holding `date`'s lines without touching the file.
///
/// The range runs from the date's first line to the first line of the next
/// indexed date, or to the indexed file size for the last date.
pub fn resolve(index: &Index, date: NaiveDate) -> Resolution {
    let Ok(position) = index.entries.binary_search_by_key(&date, |e| e.date) else {
        return Resolution::NotFound;
    };

    let start = index.entries[position].offset;
    let end = index
        .entries
        .get(position + 1)
        .map(|next| next.offset)
        .unwrap_or_else(|| index.file_size());

    Resolution::Found(ByteRange::new(start, end))
}
