//! # Buffer Controller
//!
//! [`IoController`] owns the active loader, the stash buffer and the segment
//! tracker. It handles loader events one at a time, hands contiguous byte
//! windows to the [`Consumer`], resizes the stash from measured throughput
//! and, when a load completes, seeks to the next gap by itself.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::config::IoConfig;
use crate::consumer::Consumer;
use crate::diagnostics::{Diagnostic, Diagnostics, TracingDiagnostics};
use crate::loader::{HttpLoaderFactory, Loader, LoaderEvent, LoaderFactory, LoaderStatus};
use crate::segments::SegmentTracker;
use crate::speed::ThroughputEstimator;
use crate::stash::{BUFFER_HEADROOM, StashBuffer, expanded_capacity};
use crate::{ByteRange, IoError, LoaderError, LoaderErrorKind};

/// Events a loader may queue before the controller handles them.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Speed classes in KB/s.
const SPEED_CLASSES: [u64; 11] = [64, 128, 256, 384, 512, 768, 1024, 1536, 2048, 3072, 4096];

const MAX_STASH_SIZE_KB: u64 = 8192;

/// Largest speed class not above `kbps`, never below the slowest class.
pub fn normalize_speed(kbps: u64) -> u64 {
    let idx = SPEED_CLASSES.partition_point(|&class| class <= kbps);
    SPEED_CLASSES[idx.saturating_sub(1)]
}

/// Stash target in KB for a speed class.
pub fn stash_size_kb(speed_class: u64) -> u64 {
    let size = match speed_class {
        0..512 => speed_class,
        512..=1024 => speed_class * 3 / 2,
        _ => speed_class * 2,
    };
    size.min(MAX_STASH_SIZE_KB)
}

/// What handling one loader event produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoEvent {
    ContentLengthKnown(u64),
    Redirected(Url),
    DataArrival {
        byte_start: u64,
        length: usize,
    },
    /// A loader finished `from..=to`. `next` is the range the controller
    /// went on to load, if any.
    Complete {
        from: u64,
        to: Option<u64>,
        next: Option<ByteRange>,
    },
    Error(LoaderError),
}

pub struct IoController<C: Consumer> {
    url: Url,
    redirected_url: Option<Url>,
    config: IoConfig,
    factory: Arc<dyn LoaderFactory>,
    loader: Option<Box<dyn Loader>>,
    events: Option<mpsc::Receiver<LoaderEvent>>,
    /// Surfaced events not yet returned from `next_event`
    queued: VecDeque<IoEvent>,
    segments: SegmentTracker,
    stash: StashBuffer,
    stash_size: usize,
    speed: ThroughputEstimator,
    speed_class: u64,
    total_length: Option<u64>,
    full_request: bool,
    /// Stream position of the last early EOF
    early_eof_at: Option<u64>,
    consumer: C,
    diagnostics: Arc<dyn Diagnostics>,
    opened: bool,
    destroyed: bool,
}

impl<C: Consumer> IoController<C> {
    pub fn new(
        url: &str,
        config: IoConfig,
        factory: Arc<dyn LoaderFactory>,
        consumer: C,
    ) -> Result<Self, IoError> {
        let url = Url::parse(url).map_err(|e| IoError::InvalidUrl(format!("{url}: {e}")))?;
        let stash = StashBuffer::with_capacity(config.initial_buffer_capacity);
        let stash_size = config.initial_stash_size;

        Ok(Self {
            url,
            redirected_url: None,
            config,
            factory,
            loader: None,
            events: None,
            queued: VecDeque::new(),
            segments: SegmentTracker::new(),
            stash,
            stash_size,
            speed: ThroughputEstimator::new(),
            speed_class: 0,
            total_length: None,
            full_request: false,
            early_eof_at: None,
            consumer,
            diagnostics: Arc::new(TracingDiagnostics),
            opened: false,
            destroyed: false,
        })
    }

    /// Controller backed by [`HttpLoaderFactory`].
    pub fn http(url: &str, config: IoConfig, consumer: C) -> Result<Self, IoError> {
        let factory = HttpLoaderFactory::new(&config)?;
        Self::new(url, config, Arc::new(factory), consumer)
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Start loading the whole stream from offset 0.
    pub fn open(&mut self) -> Result<(), IoError> {
        self.open_at(0)
    }

    /// Start loading the stream at `offset`, leaving the bytes before it
    /// unrequested.
    ///
    /// The first request stands in for the whole stream: its reported length
    /// becomes the total, taken from `Content-Range` when `offset > 0`.
    pub fn open_at(&mut self, offset: u64) -> Result<(), IoError> {
        if self.destroyed {
            return Err(IoError::Destroyed);
        }
        self.teardown_loader();
        self.queued.clear();

        self.segments.reset_at(offset);
        self.stash.clear();
        self.speed.reset();
        self.total_length = None;
        self.full_request = true;
        self.early_eof_at = None;
        self.opened = true;

        info!(url = %self.url, offset, "Opening stream");
        self.start_loader(ByteRange::open(offset))
    }

    /// Abort the active loader. Its segment keeps what was dispatched.
    pub fn abort(&mut self) {
        if let Some(loader) = self.loader.as_mut() {
            loader.abort();
        }
    }

    /// Restart loading at `offset`.
    ///
    /// Fails with [`IoError::AlreadyBuffered`], leaving every piece of state
    /// untouched, when `offset` lies in a retrieved segment.
    pub fn seek(&mut self, offset: u64) -> Result<(), IoError> {
        if self.destroyed {
            return Err(IoError::Destroyed);
        }
        if !self.opened {
            return Err(IoError::NotOpened);
        }

        let range = self.segments.begin_pending(offset).map_err(|seg| {
            IoError::AlreadyBuffered {
                offset,
                from: seg.from,
                to: seg.to.unwrap_or(offset),
            }
        })?;

        self.teardown_loader();
        self.stash.clear();
        self.full_request = false;

        info!(offset, range = %range, "Seeking");
        self.start_loader(range)
    }

    /// Abort the loader and drop all state. Later calls fail with
    /// [`IoError::Destroyed`].
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.teardown_loader();
        self.queued.clear();
        self.segments.clear();
        self.stash.clear();
        self.speed.reset();
        self.opened = false;
        self.destroyed = true;
        debug!(url = %self.url, "Controller destroyed");
    }

    /// Handle the next loader event.
    ///
    /// Returns `None` once the active loader has finished and nothing is left
    /// to load.
    pub async fn next_event(&mut self) -> Option<IoEvent> {
        if let Some(event) = self.queued.pop_front() {
            return Some(event);
        }

        let events = self.events.as_mut()?;
        match events.recv().await {
            Some(event) => Some(self.handle_event(event)),
            None => {
                self.events = None;
                self.queued.pop_front()
            }
        }
    }

    /// Drive loading until no loader is left, failing on the first loader
    /// error.
    pub async fn run(&mut self) -> Result<(), IoError> {
        while let Some(event) = self.next_event().await {
            if let IoEvent::Error(err) = event {
                return Err(err.into());
            }
        }
        Ok(())
    }

    pub fn status(&self) -> LoaderStatus {
        self.loader
            .as_ref()
            .map_or(LoaderStatus::Idle, |loader| loader.status())
    }

    pub fn is_working(&self) -> bool {
        self.status().is_working()
    }

    pub fn loader_name(&self) -> Option<&'static str> {
        self.loader.as_ref().map(|loader| loader.name())
    }

    pub fn segments(&self) -> Vec<ByteRange> {
        self.segments.segments()
    }

    pub fn total_length(&self) -> Option<u64> {
        self.total_length
    }

    /// Current stash target in bytes.
    pub fn stash_size(&self) -> usize {
        self.stash_size
    }

    pub fn buffer_capacity(&self) -> usize {
        self.stash.capacity()
    }

    pub fn stash_used(&self) -> usize {
        self.stash.used()
    }

    /// URL used for the next range request.
    pub fn current_url(&self) -> &Url {
        match &self.redirected_url {
            Some(url) if self.config.reuse_redirected_url => url,
            _ => &self.url,
        }
    }

    pub fn current_speed_kbps(&mut self) -> u64 {
        self.speed.last_second_kbps()
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    fn start_loader(&mut self, range: ByteRange) -> Result<(), IoError> {
        let mut loader = self.factory.create();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let url = self.current_url().clone();

        self.diagnostics.report(Diagnostic::LoaderCreated {
            loader: loader.name(),
            range,
        });
        loader.open(&url, range, tx)?;

        self.loader = Some(loader);
        self.events = Some(rx);
        Ok(())
    }

    /// Abort and release the loader. Its receiver goes with it, so nothing
    /// it still sends can reach the controller.
    fn teardown_loader(&mut self) {
        if let Some(mut loader) = self.loader.take() {
            if loader.is_working() {
                loader.abort();
            }
            loader.destroy();
        }
        self.events = None;
    }

    fn handle_event(&mut self, event: LoaderEvent) -> IoEvent {
        match event {
            LoaderEvent::ContentLengthKnown(total) => {
                if self.full_request && self.total_length.is_none() && total > 0 {
                    self.total_length = Some(total);
                    self.full_request = false;
                    info!(total, "Content-Length");
                }
                IoEvent::ContentLengthKnown(total)
            }
            LoaderEvent::Redirected(url) => {
                if self.config.reuse_redirected_url {
                    info!(url = %url, "Following requests use the redirected URL");
                    self.redirected_url = Some(url.clone());
                }
                IoEvent::Redirected(url)
            }
            LoaderEvent::DataArrival {
                chunk, byte_start, ..
            } => {
                self.on_chunk(&chunk, byte_start);
                IoEvent::DataArrival {
                    byte_start,
                    length: chunk.len(),
                }
            }
            LoaderEvent::Complete { from, to } => {
                let next = self.on_complete(from, to);
                IoEvent::Complete { from, to, next }
            }
            LoaderEvent::Error(err) => IoEvent::Error(self.on_error(err)),
        }
    }

    fn on_chunk(&mut self, chunk: &[u8], byte_start: u64) {
        self.speed.add_bytes(chunk.len() as u64);
        let kbps = self.speed.last_second_kbps();
        if kbps != 0 {
            let class = normalize_speed(kbps);
            if class != self.speed_class {
                self.speed_class = class;
                self.adjust_stash_size(class);
            }
        }

        if !self.config.stash_enabled {
            if self.stash.is_empty() {
                self.dispatch_direct(chunk, byte_start);
            } else {
                self.reserve(self.stash.used() + chunk.len());
                self.stash.append(chunk);
                self.dispatch_stash();
            }
            return;
        }

        if self.stash.is_empty() {
            self.stash.set_byte_start(byte_start);
        }
        if self.stash.used() + chunk.len() <= self.stash_size {
            self.stash.append(chunk);
        } else if !self.stash.is_empty() {
            // flush what is stashed, then start accumulating again
            self.dispatch_stash();
            self.reserve(self.stash.used() + chunk.len());
            self.stash.append(chunk);
        } else {
            self.dispatch_direct(chunk, byte_start);
        }
    }

    /// Offer `chunk` as is and stash the unconsumed tail.
    fn dispatch_direct(&mut self, chunk: &[u8], byte_start: u64) {
        let consumed = deliver(
            &mut self.consumer,
            &mut self.segments,
            chunk,
            byte_start,
        );
        if consumed < chunk.len() {
            let remain = &chunk[consumed..];
            self.reserve(remain.len());
            self.stash.set_byte_start(byte_start + consumed as u64);
            self.stash.append(remain);
        }
    }

    /// Offer the whole stash and keep the unconsumed remainder.
    fn dispatch_stash(&mut self) -> usize {
        let byte_start = self.stash.byte_start();
        let consumed = deliver(
            &mut self.consumer,
            &mut self.segments,
            self.stash.as_slice(),
            byte_start,
        );
        self.stash.consume(consumed);
        consumed
    }

    /// Offer the stash one last time and drop whatever is left.
    fn flush_stash(&mut self) {
        if self.stash.is_empty() {
            return;
        }
        let offered = self.stash.used();
        let consumed = self.dispatch_stash();
        if consumed < offered {
            self.diagnostics.report(Diagnostic::UnderConsumption {
                byte_start: self.stash.byte_start(),
                dropped: offered - consumed,
            });
        }
        self.stash.clear();
    }

    fn adjust_stash_size(&mut self, speed_class: u64) {
        let stash_size = (stash_size_kb(speed_class) * 1024) as usize;
        let buffer_size = stash_size + BUFFER_HEADROOM;
        if self.stash.capacity() < buffer_size {
            self.expand_buffer(buffer_size);
        }
        self.stash_size = stash_size;
        self.diagnostics.report(Diagnostic::StashResized {
            speed_kbps: speed_class,
            stash_size,
        });
    }

    /// Grow the buffer when `needed` bytes would not fit.
    fn reserve(&mut self, needed: usize) {
        if needed > self.stash.capacity() {
            self.expand_buffer(needed);
        }
    }

    fn expand_buffer(&mut self, expected: usize) {
        let capacity = expanded_capacity(self.stash_size, expected);
        if self.stash.ensure_capacity(capacity) {
            self.diagnostics
                .report(Diagnostic::BufferExpanded { capacity });
        }
    }

    fn on_complete(&mut self, from: u64, to: Option<u64>) -> Option<ByteRange> {
        self.flush_stash();
        info!(from, to = ?to, "Loader complete");

        let merged = self.segments.complete(from, to);
        self.diagnostics.report(Diagnostic::SegmentsAdjusted {
            segments: self.segments.segments(),
        });
        if to.is_some() {
            self.early_eof_at = None;
        }

        let next = match merged {
            Some(segment) => self
                .segments
                .gap_after(segment, self.total_length)
                .or_else(|| self.segments.first_gap(self.total_length)),
            // an empty body at `from` would be requested again forever
            None => self
                .segments
                .gaps(self.total_length)
                .into_iter()
                .find(|gap| gap.from != from),
        }?;

        if let Err(e) = self.seek(next.from) {
            warn!(offset = next.from, error = %e, "Failed to continue loading");
            self.queued
                .push_back(IoEvent::Error(LoaderError::exception(e.to_string())));
        }
        Some(next)
    }

    fn on_error(&mut self, mut err: LoaderError) -> LoaderError {
        self.flush_stash();

        if err.kind == LoaderErrorKind::EarlyEof {
            let position = self
                .segments
                .current()
                .map(|seg| seg.to.map_or(seg.from, |to| to + 1));
            if self.total_length.is_none() || self.early_eof_at == position {
                err.kind = LoaderErrorKind::UnrecoverableEarlyEof;
            } else {
                self.early_eof_at = position;
            }
        }

        warn!(url = %self.url, error = %err, "Loader error");
        err
    }
}

impl<C: Consumer> Drop for IoController<C> {
    fn drop(&mut self) {
        self.teardown_loader();
    }
}

/// Offer `data` to the consumer, recording it as retrieved first.
fn deliver<C: Consumer>(
    consumer: &mut C,
    segments: &mut SegmentTracker,
    data: &[u8],
    byte_start: u64,
) -> usize {
    if data.is_empty() {
        return 0;
    }
    segments.advance_current(byte_start + data.len() as u64 - 1);
    let consumed = consumer.dispatch(data, byte_start).min(data.len());
    trace!(byte_start, offered = data.len(), consumed, "Dispatched");
    consumed
}
