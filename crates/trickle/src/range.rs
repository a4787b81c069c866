//! Byte ranges as requested from and reported by loaders.

use std::fmt;

/// A byte range of the remote stream.
///
/// `to` is inclusive. `None` leaves the range open-ended: up to the end of
/// the stream, or unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub from: u64,
    pub to: Option<u64>,
}

impl ByteRange {
    /// The whole stream, `bytes=0-`.
    pub const FULL: ByteRange = ByteRange { from: 0, to: None };

    pub fn open(from: u64) -> Self {
        Self { from, to: None }
    }

    /// Inclusive range `from..=to`. Panics in debug builds when `to < from`.
    pub fn bounded(from: u64, to: u64) -> Self {
        debug_assert!(to >= from, "range end {to} precedes start {from}");
        Self { from, to: Some(to) }
    }

    /// Whether this is a request for the entire resource.
    pub fn is_full(&self) -> bool {
        self.from == 0 && self.to.is_none()
    }

    /// Number of bytes covered, if bounded.
    pub fn len(&self) -> Option<u64> {
        self.to.map(|to| to - self.from + 1)
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.from && self.to.is_none_or(|to| offset <= to)
    }

    /// Value for the `Range` request header.
    pub fn header_value(&self) -> String {
        match self.to {
            Some(to) => format!("bytes={}-{}", self.from, to),
            None => format!("bytes={}-", self.from),
        }
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to {
            Some(to) => write!(f, "{}-{}", self.from, to),
            None => write!(f, "{}-", self.from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_value() {
        assert_eq!(ByteRange::FULL.header_value(), "bytes=0-");
        assert_eq!(ByteRange::open(500).header_value(), "bytes=500-");
        assert_eq!(ByteRange::bounded(10, 19).header_value(), "bytes=10-19");
    }

    #[test]
    fn test_len_and_contains() {
        let range = ByteRange::bounded(10, 19);
        assert_eq!(range.len(), Some(10));
        assert!(range.contains(10));
        assert!(range.contains(19));
        assert!(!range.contains(20));
        assert!(!range.contains(9));

        let open = ByteRange::open(100);
        assert_eq!(open.len(), None);
        assert!(open.contains(u64::MAX));
        assert!(!open.is_full());
        assert!(ByteRange::FULL.is_full());
    }
}
