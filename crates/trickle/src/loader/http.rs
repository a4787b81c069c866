//! # HTTP Loader
//!
//! Ranged GET requests through reqwest. Each loader spawns one task that
//! awaits the response headers, then each body chunk, and forwards them to
//! the controller as [`LoaderEvent`]s. Cancellation is observed only at
//! those two suspension points.

use std::time::Duration;

use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use reqwest::{
    Client, RequestBuilder, Response, StatusCode,
    header::{CONTENT_RANGE, RANGE},
};
use tokio::time::error::Elapsed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use super::{
    Loader, LoaderEvent, LoaderEventSender, LoaderFactory, LoaderKind, LoaderStatus,
    SharedStatus, TransportCapabilities, select_loader,
};
use crate::client::create_client;
use crate::config::{IoConfig, RangeStrategy};
use crate::{ByteRange, IoError, LoaderError, LoaderErrorKind};

#[derive(Debug, Clone)]
struct RequestOptions {
    range_strategy: RangeStrategy,
    range_load_zero_start: bool,
    connect_timeout: Duration,
}

impl RequestOptions {
    fn from_config(config: &IoConfig) -> Self {
        Self {
            range_strategy: config.range_strategy.clone(),
            range_load_zero_start: config.range_load_zero_start,
            connect_timeout: config.http.connect_timeout,
        }
    }
}

/// Creates [`HttpLoader`]s sharing one client and one selected variant.
#[derive(Debug, Clone)]
pub struct HttpLoaderFactory {
    client: Client,
    kind: LoaderKind,
    options: RequestOptions,
}

impl HttpLoaderFactory {
    /// Build the HTTP client and select the loader variant.
    pub fn new(config: &IoConfig) -> Result<Self, IoError> {
        let client = create_client(&config.http)?;
        Self::with_client(client, config)
    }

    pub fn with_client(client: Client, config: &IoConfig) -> Result<Self, IoError> {
        let kind = select_loader(config.loader, TransportCapabilities::detect())?;
        info!(loader = %kind, "Selected loader");
        Ok(Self {
            client,
            kind,
            options: RequestOptions::from_config(config),
        })
    }

    pub fn kind(&self) -> LoaderKind {
        self.kind
    }
}

impl LoaderFactory for HttpLoaderFactory {
    fn create(&self) -> Box<dyn Loader> {
        Box::new(HttpLoader {
            client: self.client.clone(),
            kind: self.kind,
            options: self.options.clone(),
            status: SharedStatus::default(),
            cancel: CancellationToken::new(),
            opened: false,
        })
    }
}

pub struct HttpLoader {
    client: Client,
    kind: LoaderKind,
    options: RequestOptions,
    status: SharedStatus,
    cancel: CancellationToken,
    opened: bool,
}

impl HttpLoader {
    fn build_request(&self, url: &Url, range: ByteRange) -> (Url, RequestBuilder) {
        let ranged = !range.is_full() || self.options.range_load_zero_start;
        let mut url = url.clone();

        match &self.options.range_strategy {
            RangeStrategy::Header => {
                let mut request = self.client.get(url.clone());
                if ranged {
                    request = request.header(RANGE, range.header_value());
                }
                (url, request)
            }
            RangeStrategy::QueryParam { start, end } => {
                if ranged {
                    let mut pairs = url.query_pairs_mut();
                    pairs.append_pair(start, &range.from.to_string());
                    if let Some(to) = range.to {
                        pairs.append_pair(end, &to.to_string());
                    }
                }
                let request = self.client.get(url.clone());
                (url, request)
            }
            RangeStrategy::Custom(handler) => {
                let (url, headers) = handler.request(&url, range);
                let request = self.client.get(url.clone()).headers(headers);
                (url, request)
            }
        }
    }
}

impl Loader for HttpLoader {
    fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn status(&self) -> LoaderStatus {
        self.status.get()
    }

    fn open(
        &mut self,
        url: &Url,
        range: ByteRange,
        events: LoaderEventSender,
    ) -> Result<(), LoaderError> {
        if self.opened {
            return Err(LoaderError::exception("loader can only be opened once"));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LoaderError::exception(format!("no async runtime available: {e}")))?;
        self.opened = true;

        let (request_url, request) = self.build_request(url, range);
        self.status.set(LoaderStatus::Connecting);

        let task = RequestTask {
            kind: self.kind,
            url: request_url,
            range,
            accept_plain_ok: self.options.range_strategy.accepts_plain_ok(),
            connect_timeout: self.options.connect_timeout,
            status: self.status.clone(),
            cancel: self.cancel.clone(),
            events,
        };
        runtime.spawn(task.run(request));
        Ok(())
    }

    fn abort(&mut self) {
        self.cancel.cancel();
    }

    fn destroy(&mut self) {
        if self.is_working() {
            self.abort();
        }
    }
}

impl Drop for HttpLoader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum BodyReader {
    Stream(BoxStream<'static, reqwest::Result<Bytes>>),
    Chunked(Response),
}

impl BodyReader {
    fn new(kind: LoaderKind, response: Response) -> Self {
        match kind {
            LoaderKind::Stream => BodyReader::Stream(response.bytes_stream().boxed()),
            LoaderKind::Chunked => BodyReader::Chunked(response),
        }
    }

    async fn next_chunk(&mut self) -> reqwest::Result<Option<Bytes>> {
        match self {
            BodyReader::Stream(stream) => stream.next().await.transpose(),
            BodyReader::Chunked(response) => response.chunk().await,
        }
    }
}

struct RequestTask {
    kind: LoaderKind,
    url: Url,
    range: ByteRange,
    /// 200 is a valid answer to a ranged request (query-parameter seeking)
    accept_plain_ok: bool,
    connect_timeout: Duration,
    status: SharedStatus,
    cancel: CancellationToken,
    events: LoaderEventSender,
}

impl RequestTask {
    #[instrument(skip_all, fields(loader = %self.kind, range = %self.range), level = "debug")]
    async fn run(self, request: RequestBuilder) {
        let Some(response) = self.connect(request).await else {
            return;
        };

        let status = response.status();
        if let Err(reason) = self.check_status(status) {
            self.fail(LoaderError::http_status(status, reason)).await;
            return;
        }

        if response.url() != &self.url {
            let redirected = response.url().clone();
            debug!(url = %redirected, "Response served from redirected URL");
            if !self.emit(LoaderEvent::Redirected(redirected)).await {
                return;
            }
        }

        let content_length = response.content_length();
        if let Some(total) = self.stream_length(&response) {
            info!(url = %self.url, total, "Content length known");
            if !self.emit(LoaderEvent::ContentLengthKnown(total)).await {
                return;
            }
        }

        self.status.set(LoaderStatus::Buffering);
        let body = BodyReader::new(self.kind, response);
        self.pump(body, content_length).await;
    }

    /// First suspension point: waiting for the response headers.
    async fn connect(&self, request: RequestBuilder) -> Option<Response> {
        let timeout = self.connect_timeout;
        let send = async {
            if timeout.is_zero() {
                Ok::<_, Elapsed>(request.send().await)
            } else {
                tokio::time::timeout(timeout, request.send()).await
            }
        };

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = send => Some(result),
        };

        if self.cancel.is_cancelled() {
            debug!("Aborted before the response arrived");
            self.status.set(LoaderStatus::Idle);
            return None;
        }

        match result? {
            Ok(Ok(response)) => Some(response),
            Ok(Err(e)) => {
                self.fail(LoaderError::from(e)).await;
                None
            }
            Err(_) => {
                let err = LoaderError::new(
                    LoaderErrorKind::ConnectingTimeout,
                    format!("no response within {timeout:?}"),
                );
                self.fail(err).await;
                None
            }
        }
    }

    /// Second suspension point: waiting for each body chunk.
    async fn pump(&self, mut body: BodyReader, content_length: Option<u64>) {
        let limit = self.range.len();
        let mut received: u64 = 0;

        while limit.is_none_or(|limit| received < limit) {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(received, "Aborted while streaming");
                    self.status.set(LoaderStatus::Complete);
                    return;
                }
                next = body.next_chunk() => next,
            };

            let mut chunk = match next {
                Ok(Some(chunk)) if chunk.is_empty() => continue,
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    let err = if content_length.is_some_and(|len| received < len) {
                        LoaderError::new(
                            LoaderErrorKind::EarlyEof,
                            format!("stream broke after {received} bytes: {e}"),
                        )
                    } else {
                        LoaderError::from(e)
                    };
                    self.fail(err).await;
                    return;
                }
            };

            // never deliver past a bounded range, the next segment owns those bytes
            if let Some(limit) = limit {
                let remaining = limit - received;
                if chunk.len() as u64 > remaining {
                    chunk.truncate(remaining as usize);
                }
            }

            let byte_start = self.range.from + received;
            received += chunk.len() as u64;
            trace!(size = chunk.len(), received, "Received chunk");

            let event = LoaderEvent::DataArrival {
                chunk,
                byte_start,
                received,
            };
            if !self.emit(event).await {
                return;
            }
        }

        let reached_limit = limit.is_some_and(|limit| received >= limit);
        if let Some(expected) = content_length {
            if received < expected && !reached_limit {
                let err = LoaderError::new(
                    LoaderErrorKind::EarlyEof,
                    format!("stream ended after {received} of {expected} bytes"),
                );
                self.fail(err).await;
                return;
            }
        }

        self.status.set(LoaderStatus::Complete);
        let to = (received > 0).then(|| self.range.from + received - 1);
        debug!(received, "Loader complete");
        self.emit(LoaderEvent::Complete {
            from: self.range.from,
            to,
        })
        .await;
    }

    /// Length of the whole resource, when this response reveals it.
    ///
    /// A full request reports it as `Content-Length`. An open-ended range
    /// answered with `206` reports it after the slash of `Content-Range`.
    fn stream_length(&self, response: &Response) -> Option<u64> {
        if self.range.is_full() {
            return response.content_length();
        }
        if self.range.to.is_some() || response.status() != StatusCode::PARTIAL_CONTENT {
            return None;
        }
        let value = response.headers().get(CONTENT_RANGE)?.to_str().ok()?;
        content_range_total(value)
    }

    fn check_status(&self, status: StatusCode) -> Result<(), &'static str> {
        match status {
            StatusCode::PARTIAL_CONTENT => Ok(()),
            StatusCode::OK if self.range.from == 0 || self.accept_plain_ok => Ok(()),
            StatusCode::OK => Err("server ignored the range request"),
            _ => Err(status.canonical_reason().unwrap_or("unexpected status")),
        }
    }

    async fn fail(&self, err: LoaderError) {
        self.status.set(LoaderStatus::Error);
        warn!(url = %self.url, error = %err, "Loader failed");
        self.emit(LoaderEvent::Error(err)).await;
    }

    /// Send an event. `false` once the controller has dropped this loader.
    async fn emit(&self, event: LoaderEvent) -> bool {
        self.events.send(event).await.is_ok()
    }
}

/// Total from a `Content-Range: bytes a-b/total` value. `None` for `*`.
fn content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.strip_prefix("bytes ")?.rsplit_once('/')?;
    total.trim().parse().ok()
}
