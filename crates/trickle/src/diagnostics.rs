//! # Diagnostics
//!
//! Structured records of the controller's internal decisions. They are
//! informational only and never change control flow.

use tracing::{debug, info, warn};

use crate::ByteRange;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    LoaderCreated {
        loader: &'static str,
        range: ByteRange,
    },
    /// Stash target changed after a new speed class was measured
    StashResized { speed_kbps: u64, stash_size: usize },
    BufferExpanded { capacity: usize },
    /// Bytes the consumer left behind when the stash was force-flushed
    UnderConsumption { byte_start: u64, dropped: usize },
    /// Segment list after a loader completion was reconciled
    SegmentsAdjusted { segments: Vec<ByteRange> },
}

/// Sink for [`Diagnostic`] records.
pub trait Diagnostics: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::LoaderCreated { loader, range } => {
                debug!(loader, range = %range, "Created loader");
            }
            Diagnostic::StashResized {
                speed_kbps,
                stash_size,
            } => {
                debug!(speed_kbps, stash_size, "Adjusted stash size");
            }
            Diagnostic::BufferExpanded { capacity } => {
                debug!(capacity, "Expanded stash buffer");
            }
            Diagnostic::UnderConsumption {
                byte_start,
                dropped,
            } => {
                warn!(
                    byte_start,
                    dropped, "Consumer left unconsumed bytes when the loader completed"
                );
            }
            Diagnostic::SegmentsAdjusted { segments } => {
                let segments: Vec<String> = segments.iter().map(ToString::to_string).collect();
                info!(segments = ?segments, "Adjusted segments");
            }
        }
    }
}
