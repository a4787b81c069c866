//! # Segment Tracking
//!
//! Ordered record of the byte ranges already retrieved for a stream. Seeks
//! consult it to avoid re-fetching buffered data, and loader completion
//! merges neighbouring segments and reveals the next gap to load.

use std::ops::RangeInclusive;

use rangemap::RangeInclusiveSet;

use crate::range::ByteRange;

/// Retrieved ranges of a stream plus the segment the active loader fills.
///
/// Resolved segments live in a [`RangeInclusiveSet`], which keeps them
/// sorted, disjoint and coalesced. The pending segment stays outside the set
/// until its loader completes, so it is never merged with a neighbour early.
#[derive(Debug, Clone, Default)]
pub struct SegmentTracker {
    resolved: RangeInclusiveSet<u64>,
    /// Segment the active loader writes into; `to` is the last byte delivered
    pending: Option<ByteRange>,
}

fn to_segment(range: &RangeInclusive<u64>) -> ByteRange {
    ByteRange::bounded(*range.start(), *range.end())
}

impl SegmentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start over with a single pending segment covering the whole stream.
    pub fn reset_open(&mut self) {
        self.reset_at(0);
    }

    /// Start over with a single pending segment from `offset` onwards.
    pub fn reset_at(&mut self, offset: u64) {
        self.resolved = RangeInclusiveSet::new();
        self.pending = Some(ByteRange::open(offset));
    }

    pub fn clear(&mut self) {
        self.resolved = RangeInclusiveSet::new();
        self.pending = None;
    }

    /// Every segment in stream order, the pending one included.
    pub fn segments(&self) -> Vec<ByteRange> {
        let mut segments: Vec<ByteRange> = self.resolved.iter().map(to_segment).collect();
        if let Some(pending) = self.pending {
            let index = segments.partition_point(|s| s.from < pending.from);
            segments.insert(index, pending);
        }
        segments
    }

    pub fn current(&self) -> Option<ByteRange> {
        self.pending
    }

    /// Segment holding `offset`, if that byte has been delivered.
    pub fn find_buffered(&self, offset: u64) -> Option<ByteRange> {
        self.resolved.get(&offset).map(to_segment).or_else(|| {
            self.pending
                .filter(|seg| seg.to.is_some() && seg.contains(offset))
        })
    }

    /// Record that bytes up to `to` (inclusive) of the current segment have
    /// been handed downstream.
    pub fn advance_current(&mut self, to: u64) {
        if let Some(seg) = self.pending.as_mut() {
            if to >= seg.from && seg.to.is_none_or(|prev| to > prev) {
                seg.to = Some(to);
            }
        }
    }

    /// Insert a pending segment at `from` and return the range a loader
    /// should request for it.
    ///
    /// The request is bounded by the start of the following segment, or
    /// open-ended when inserting at the tail. Fails with the containing
    /// segment, leaving the tracker untouched, when `from` is already
    /// buffered.
    pub fn begin_pending(&mut self, from: u64) -> Result<ByteRange, ByteRange> {
        if let Some(seg) = self.find_buffered(from) {
            return Err(seg);
        }

        // A pending segment that never got a byte holds nothing; one that did
        // is settled against its neighbours before the loader moves on.
        if let Some(ByteRange {
            from: start,
            to: Some(end),
        }) = self.pending.take()
        {
            self.resolved.insert(start..=end);
        }

        let end = self
            .resolved
            .gaps(&(from..=u64::MAX))
            .next()
            .map(|gap| *gap.end())
            .filter(|&end| end != u64::MAX);
        self.pending = Some(ByteRange::open(from));

        Ok(ByteRange { from, to: end })
    }

    /// Reconcile a finished load of `from..=to` and return the resulting
    /// segment, merged with whichever neighbours it touches.
    ///
    /// `to == None` means nothing arrived; the pending segment is dropped.
    pub fn complete(&mut self, from: u64, to: Option<u64>) -> Option<ByteRange> {
        let pending = self.pending.filter(|seg| seg.from == from);
        if pending.is_some() {
            self.pending = None;
        }

        let to = to?;
        let to = pending.and_then(|seg| seg.to).map_or(to, |prev| prev.max(to));
        if to < from {
            return None;
        }
        self.resolved.insert(from..=to);
        self.resolved.get(&from).map(to_segment)
    }

    /// Ranges not covered by any segment, in stream order.
    ///
    /// The gap holding the pending segment counts as covered. The tail after
    /// the last segment is open-ended and only reported when the stream's
    /// total length says bytes remain.
    pub fn gaps(&self, total_length: Option<u64>) -> Vec<ByteRange> {
        let mut claimed = self.resolved.clone();
        if let Some(pending) = self.pending {
            let end = self
                .resolved
                .gaps(&(pending.from..=u64::MAX))
                .next()
                .map_or(pending.from, |gap| *gap.end());
            claimed.insert(pending.from..=end);
        }

        let outer = 0..=u64::MAX;
        claimed
            .gaps(&outer)
            .filter_map(|gap| {
                let (start, end) = (*gap.start(), *gap.end());
                if end != u64::MAX {
                    return Some(ByteRange::bounded(start, end));
                }
                match total_length {
                    Some(total) if start < total => Some(ByteRange::open(start)),
                    _ => None,
                }
            })
            .collect()
    }

    /// Gap directly following `segment`, if it is not contiguous with the
    /// next one.
    pub fn gap_after(&self, segment: ByteRange, total_length: Option<u64>) -> Option<ByteRange> {
        let end = segment.to?.checked_add(1)?;
        self.gaps(total_length)
            .into_iter()
            .find(|gap| gap.from == end)
    }

    /// Earliest range not covered by any segment.
    pub fn first_gap(&self, total_length: Option<u64>) -> Option<ByteRange> {
        self.gaps(total_length).into_iter().next()
    }

    /// Whether `0..total_length` is fully retrieved.
    pub fn is_complete(&self, total_length: u64) -> bool {
        self.pending.is_none() && self.gaps(Some(total_length)).is_empty()
    }

    /// The pending segment is well formed and never overlaps a resolved one.
    pub fn is_consistent(&self) -> bool {
        let Some(pending) = self.pending else {
            return true;
        };
        let end = pending.to.unwrap_or(pending.from);
        end >= pending.from
            && self
                .resolved
                .overlapping(&(pending.from..=end))
                .next()
                .is_none()
    }
}
