use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use url::Url;

use crate::proxy::ProxyConfig;
use crate::range::ByteRange;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Initial stash target: 256KB
pub const DEFAULT_STASH_SIZE: usize = 256 * 1024;
/// Initial backing buffer capacity: 3MB
pub const DEFAULT_BUFFER_CAPACITY: usize = 3 * 1024 * 1024;

/// HTTP transport options shared by every loader
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Overall timeout for a request, zero disables it.
    /// Media streams are long-lived, so this is off by default.
    pub timeout: Duration,

    /// Maximum time to wait for response headers
    pub connect_timeout: Duration,

    /// Maximum time between two body chunks
    pub read_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Custom HTTP headers sent with every request
    pub headers: HeaderMap,

    /// Proxy configuration (optional)
    pub proxy: Option<ProxyConfig>,

    /// Whether to use system proxy settings if available
    pub use_system_proxy: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: HttpConfig::default_headers(),
            proxy: None,
            use_system_proxy: true,
        }
    }
}

impl HttpConfig {
    pub fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();

        // Byte offsets must match the resource, so never ask for compression.
        headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("identity"),
        );
        headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );
        headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));
        headers
    }
}

/// Which loader variant to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum LoaderPreference {
    /// Pick the best variant the transport supports
    #[default]
    Auto,
    /// Streaming response reader
    Stream,
    /// Progressive chunk reads
    Chunked,
}

/// Builds the request for a byte range on servers with their own seek scheme.
pub trait SeekHandler: Send + Sync {
    /// URL and extra headers for loading `range` of `url`. Called for every
    /// request, the initial full one included.
    fn request(&self, url: &Url, range: ByteRange) -> (Url, HeaderMap);

    /// Whether ranged requests are answered with a plain `200 OK` whose body
    /// starts at the requested offset.
    fn accepts_plain_ok(&self) -> bool {
        false
    }
}

/// How a byte range is expressed in the request.
#[derive(Clone, Default)]
pub enum RangeStrategy {
    /// `Range: bytes=from-to` header
    #[default]
    Header,
    /// Query parameters, for servers that seek by URL (`?start=…&end=…`)
    QueryParam { start: String, end: String },
    Custom(Arc<dyn SeekHandler>),
}

impl RangeStrategy {
    /// Whether a `200 OK` answer to a ranged request carries the range.
    pub fn accepts_plain_ok(&self) -> bool {
        match self {
            RangeStrategy::Header => false,
            RangeStrategy::QueryParam { .. } => true,
            RangeStrategy::Custom(handler) => handler.accepts_plain_ok(),
        }
    }
}

impl fmt::Debug for RangeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeStrategy::Header => f.write_str("Header"),
            RangeStrategy::QueryParam { start, end } => f
                .debug_struct("QueryParam")
                .field("start", start)
                .field("end", end)
                .finish(),
            RangeStrategy::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl PartialEq for RangeStrategy {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RangeStrategy::Header, RangeStrategy::Header) => true,
            (
                RangeStrategy::QueryParam { start, end },
                RangeStrategy::QueryParam {
                    start: other_start,
                    end: other_end,
                },
            ) => start == other_start && end == other_end,
            (RangeStrategy::Custom(a), RangeStrategy::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone)]
pub struct IoConfig {
    pub http: HttpConfig,

    /// Accumulate chunks up to the stash target before dispatching
    pub stash_enabled: bool,

    /// Stash target until the first throughput measurement
    pub initial_stash_size: usize,

    /// Capacity of the backing buffer at construction
    pub initial_buffer_capacity: usize,

    pub loader: LoaderPreference,

    pub range_strategy: RangeStrategy,

    /// Send `bytes=0-` for the initial full request as well
    pub range_load_zero_start: bool,

    /// Issue follow-up range requests against the redirected URL
    pub reuse_redirected_url: bool,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            stash_enabled: false,
            initial_stash_size: DEFAULT_STASH_SIZE,
            initial_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            loader: LoaderPreference::default(),
            range_strategy: RangeStrategy::default(),
            range_load_zero_start: false,
            reuse_redirected_url: false,
        }
    }
}

impl IoConfig {
    pub fn builder() -> crate::builder::IoConfigBuilder {
        crate::builder::IoConfigBuilder::new()
    }
}
