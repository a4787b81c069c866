//! Test doubles for driving the controller without a network.

use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use crate::ByteRange;
use crate::consumer::Consumer;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::loader::{Loader, LoaderEvent, LoaderEventSender, LoaderFactory, LoaderStatus};
use crate::LoaderError;

#[derive(Debug, Default)]
struct ScriptedState {
    url: Option<Url>,
    range: Option<ByteRange>,
    events: Option<LoaderEventSender>,
    status: LoaderStatus,
    aborted: bool,
    destroyed: bool,
}

/// Test-side view of a loader created by [`ScriptedLoaderFactory`].
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedHandle(Arc<Mutex<ScriptedState>>);

impl ScriptedHandle {
    pub fn range(&self) -> Option<ByteRange> {
        self.0.lock().range
    }

    pub fn url(&self) -> Option<Url> {
        self.0.lock().url.clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.0.lock().aborted
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.lock().destroyed
    }

    /// Queue an event as the loader task would. `false` when the controller
    /// no longer listens to this loader.
    pub fn send(&self, event: LoaderEvent) -> bool {
        let mut state = self.0.lock();
        match &event {
            LoaderEvent::DataArrival { .. } => state.status = LoaderStatus::Buffering,
            LoaderEvent::Complete { .. } => state.status = LoaderStatus::Complete,
            LoaderEvent::Error(_) => state.status = LoaderStatus::Error,
            _ => {}
        }
        match &state.events {
            Some(events) => events.try_send(event).is_ok(),
            None => false,
        }
    }

    /// End the loader task, closing its channel.
    pub fn close(&self) {
        self.0.lock().events = None;
    }
}

struct ScriptedLoader(ScriptedHandle);

impl Loader for ScriptedLoader {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn status(&self) -> LoaderStatus {
        self.0.0.lock().status
    }

    fn open(
        &mut self,
        url: &Url,
        range: ByteRange,
        events: LoaderEventSender,
    ) -> Result<(), LoaderError> {
        let mut state = self.0.0.lock();
        if state.range.is_some() {
            return Err(LoaderError::exception("loader can only be opened once"));
        }
        state.url = Some(url.clone());
        state.range = Some(range);
        state.events = Some(events);
        state.status = LoaderStatus::Connecting;
        Ok(())
    }

    fn abort(&mut self) {
        let mut state = self.0.0.lock();
        state.aborted = true;
        state.status = match state.status {
            LoaderStatus::Connecting => LoaderStatus::Idle,
            _ => LoaderStatus::Complete,
        };
    }

    fn destroy(&mut self) {
        if self.is_working() {
            self.abort();
        }
        self.0.0.lock().destroyed = true;
    }
}

/// Hands out scripted loaders and keeps a handle to each.
#[derive(Default)]
pub(crate) struct ScriptedLoaderFactory {
    created: Mutex<Vec<ScriptedHandle>>,
}

impl ScriptedLoaderFactory {
    pub fn count(&self) -> usize {
        self.created.lock().len()
    }

    /// Most recently created loader.
    pub fn last(&self) -> ScriptedHandle {
        self.created
            .lock()
            .last()
            .cloned()
            .expect("no loader created yet")
    }
}

impl LoaderFactory for ScriptedLoaderFactory {
    fn create(&self) -> Box<dyn Loader> {
        let handle = ScriptedHandle::default();
        self.created.lock().push(handle.clone());
        Box::new(ScriptedLoader(handle))
    }
}

/// Consumer that records every offer and keeps what it consumed.
#[derive(Debug, Default)]
pub(crate) struct RecordingConsumer {
    /// `(byte_start, offered length)` per call
    pub calls: Vec<(u64, usize)>,
    consumed: Vec<usize>,
    /// Concatenation of every consumed prefix
    pub data: Vec<u8>,
    limit: Option<usize>,
}

impl RecordingConsumer {
    /// Consume at most `limit` bytes per call.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Whether every offer started right after the bytes consumed before it.
    pub fn offsets_are_contiguous(&self) -> bool {
        let Some(&(mut expected, _)) = self.calls.first() else {
            return true;
        };
        self.calls
            .iter()
            .zip(&self.consumed)
            .all(|(&(byte_start, _), &consumed)| {
                let ok = byte_start == expected;
                expected = byte_start + consumed as u64;
                ok
            })
    }
}

impl Consumer for RecordingConsumer {
    fn dispatch(&mut self, chunk: &[u8], byte_start: u64) -> usize {
        let take = self.limit.map_or(chunk.len(), |limit| limit.min(chunk.len()));
        self.calls.push((byte_start, chunk.len()));
        self.consumed.push(take);
        self.data.extend_from_slice(&chunk[..take]);
        take
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingDiagnostics(Mutex<Vec<Diagnostic>>);

impl RecordingDiagnostics {
    pub fn records(&self) -> Vec<Diagnostic> {
        self.0.lock().clone()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        self.0.lock().push(diagnostic);
    }
}
