//! # Loaders
//!
//! A loader performs exactly one ranged network fetch and reports its
//! lifecycle through [`LoaderEvent`]s sent over a channel owned by the
//! controller. Variants differ only in how the response body is read.

pub mod http;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use crate::{ByteRange, IoError, LoaderError, config::LoaderPreference};

pub use http::{HttpLoader, HttpLoaderFactory};

/// Lifecycle of a loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoaderStatus {
    #[default]
    Idle,
    Connecting,
    Buffering,
    Error,
    Complete,
}

impl LoaderStatus {
    /// Whether a request is in flight.
    pub fn is_working(self) -> bool {
        matches!(self, LoaderStatus::Connecting | LoaderStatus::Buffering)
    }
}

/// Event emitted by a loader, in order, on its channel.
#[derive(Debug, Clone)]
pub enum LoaderEvent {
    /// Size of the full resource, reported once for full requests
    ContentLengthKnown(u64),
    /// The response came from a different URL than requested
    Redirected(Url),
    DataArrival {
        chunk: Bytes,
        /// Absolute stream offset of `chunk[0]`
        byte_start: u64,
        /// Cumulative bytes received by this loader
        received: u64,
    },
    /// Clean end of the body. `to` is inclusive, `None` for an empty body.
    Complete { from: u64, to: Option<u64> },
    Error(LoaderError),
}

pub type LoaderEventSender = mpsc::Sender<LoaderEvent>;

/// Status cell shared between a loader handle and its request task.
#[derive(Debug, Clone, Default)]
pub struct SharedStatus(Arc<Mutex<LoaderStatus>>);

impl SharedStatus {
    pub fn get(&self) -> LoaderStatus {
        *self.0.lock()
    }

    pub fn set(&self, status: LoaderStatus) {
        *self.0.lock() = status;
    }
}

/// One-shot ranged fetch.
pub trait Loader: Send {
    fn name(&self) -> &'static str;

    fn status(&self) -> LoaderStatus;

    fn is_working(&self) -> bool {
        self.status().is_working()
    }

    /// Start the request. Events for it are sent on `events`.
    /// A loader can be opened only once.
    fn open(
        &mut self,
        url: &Url,
        range: ByteRange,
        events: LoaderEventSender,
    ) -> Result<(), LoaderError>;

    /// Request cancellation. Observed at the next suspension point.
    fn abort(&mut self);

    /// Release the loader. Aborts first if still working.
    fn destroy(&mut self);
}

/// Produces a fresh loader for every request.
pub trait LoaderFactory: Send + Sync {
    fn create(&self) -> Box<dyn Loader>;
}

/// Transport variant backing a loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderKind {
    /// Reads `Response::bytes_stream`
    Stream,
    /// Reads `Response::chunk` progressively
    Chunked,
}

impl LoaderKind {
    pub fn name(self) -> &'static str {
        match self {
            LoaderKind::Stream => "http-stream",
            LoaderKind::Chunked => "http-chunked",
        }
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the HTTP transport can do in this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportCapabilities {
    pub streaming_body: bool,
    pub chunked_read: bool,
}

impl TransportCapabilities {
    /// Capabilities of the reqwest build this crate links against.
    pub const fn detect() -> Self {
        Self {
            // the workspace enables reqwest's `stream` feature
            streaming_body: true,
            chunked_read: true,
        }
    }
}

/// Choose the loader variant for a preference and transport.
pub fn select_loader(
    preference: LoaderPreference,
    caps: TransportCapabilities,
) -> Result<LoaderKind, IoError> {
    match preference {
        LoaderPreference::Stream if caps.streaming_body => Ok(LoaderKind::Stream),
        LoaderPreference::Chunked if caps.chunked_read => Ok(LoaderKind::Chunked),
        LoaderPreference::Auto if caps.streaming_body => Ok(LoaderKind::Stream),
        LoaderPreference::Auto if caps.chunked_read => Ok(LoaderKind::Chunked),
        other => Err(IoError::UnsupportedTransport(format!(
            "{other:?} loader is not available"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_loader() {
        let all = TransportCapabilities::detect();
        assert_eq!(
            select_loader(LoaderPreference::Auto, all).unwrap(),
            LoaderKind::Stream
        );
        assert_eq!(
            select_loader(LoaderPreference::Chunked, all).unwrap(),
            LoaderKind::Chunked
        );

        let chunked_only = TransportCapabilities {
            streaming_body: false,
            chunked_read: true,
        };
        assert_eq!(
            select_loader(LoaderPreference::Auto, chunked_only).unwrap(),
            LoaderKind::Chunked
        );
        assert!(matches!(
            select_loader(LoaderPreference::Stream, chunked_only),
            Err(IoError::UnsupportedTransport(_))
        ));

        let none = TransportCapabilities {
            streaming_body: false,
            chunked_read: false,
        };
        assert!(select_loader(LoaderPreference::Auto, none).is_err());
    }

    #[test]
    fn test_status_is_working() {
        assert!(LoaderStatus::Connecting.is_working());
        assert!(LoaderStatus::Buffering.is_working());
        assert!(!LoaderStatus::Idle.is_working());
        assert!(!LoaderStatus::Complete.is_working());
        assert!(!LoaderStatus::Error.is_working());
    }
}
