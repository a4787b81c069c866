//! # trickle-engine
//!
//! Incremental ingestion of a remote media byte-stream over ranged HTTP
//! requests.
//!
//! An [`IoController`] drives one [`Loader`](loader::Loader) at a time,
//! keeps a [`SegmentTracker`] of the byte ranges already retrieved so seeks
//! never fetch buffered data twice, and hands contiguous windows to a
//! [`Consumer`] through an adaptive stash whose size follows the measured
//! throughput.
//!
//! ```no_run
//! use trickle_engine::{IoConfig, IoController};
//!
//! # async fn example() -> Result<(), trickle_engine::IoError> {
//! let config = IoConfig::builder().with_stash_enabled(true).build();
//! let mut controller = IoController::http(
//!     "https://example.com/live/stream.flv",
//!     config,
//!     |chunk: &[u8], _byte_start: u64| chunk.len(),
//! )?;
//! controller.open()?;
//! controller.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod consumer;
pub mod controller;
pub mod diagnostics;
pub mod error;
pub mod loader;
pub mod proxy;
pub mod range;
pub mod segments;
pub mod speed;
pub mod stash;

#[cfg(test)]
mod testing;

pub use builder::IoConfigBuilder;
pub use client::create_client;
pub use config::{HttpConfig, IoConfig, LoaderPreference, RangeStrategy, SeekHandler};
pub use consumer::Consumer;
pub use controller::{IoController, IoEvent};
pub use diagnostics::{Diagnostic, Diagnostics, TracingDiagnostics};
pub use error::{IoError, LoaderError, LoaderErrorKind};
pub use loader::{HttpLoader, HttpLoaderFactory, LoaderKind, LoaderStatus};
pub use range::ByteRange;
pub use segments::SegmentTracker;
pub use speed::ThroughputEstimator;
pub use stash::StashBuffer;
