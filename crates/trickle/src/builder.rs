//! # Builder for IoConfig
//!
//! Fluent construction of [`IoConfig`] values.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use trickle_engine::IoConfig;
//! use trickle_engine::proxy::{ProxyConfig, ProxyType};
//!
//! let config = IoConfig::builder()
//!     .with_stash_enabled(true)
//!     .with_initial_stash_size(512 * 1024)
//!     .with_connect_timeout(Duration::from_secs(5))
//!     .with_header("Referer", "https://example.com/")
//!     .build();
//! assert!(config.stash_enabled);
//!
//! let proxied = IoConfig::builder()
//!     .with_proxy(ProxyConfig {
//!         url: "http://proxy.example.com:8080".to_string(),
//!         proxy_type: ProxyType::Http,
//!         auth: None,
//!     })
//!     .build();
//! assert!(!proxied.http.use_system_proxy);
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::{IoConfig, LoaderPreference, RangeStrategy, SeekHandler};
use crate::proxy::ProxyConfig;

/// Builder for creating IoConfig instances with a fluent API
#[derive(Debug, Clone, Default)]
pub struct IoConfigBuilder {
    config: IoConfig,
}

impl IoConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: IoConfig::default(),
        }
    }

    pub fn with_stash_enabled(mut self, enabled: bool) -> Self {
        self.config.stash_enabled = enabled;
        self
    }

    pub fn with_initial_stash_size(mut self, bytes: usize) -> Self {
        self.config.initial_stash_size = bytes;
        self
    }

    pub fn with_initial_buffer_capacity(mut self, bytes: usize) -> Self {
        self.config.initial_buffer_capacity = bytes;
        self
    }

    pub fn with_loader(mut self, loader: LoaderPreference) -> Self {
        self.config.loader = loader;
        self
    }

    /// Seek by query parameters instead of a `Range` header
    pub fn with_query_param_ranges(
        mut self,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> Self {
        self.config.range_strategy = RangeStrategy::QueryParam {
            start: start.into(),
            end: end.into(),
        };
        self
    }

    /// Let `handler` build the URL and headers of every request
    pub fn with_seek_handler(mut self, handler: impl SeekHandler + 'static) -> Self {
        self.config.range_strategy = RangeStrategy::Custom(Arc::new(handler));
        self
    }

    pub fn with_range_load_zero_start(mut self, enabled: bool) -> Self {
        self.config.range_load_zero_start = enabled;
        self
    }

    pub fn with_reuse_redirected_url(mut self, enabled: bool) -> Self {
        self.config.reuse_redirected_url = enabled;
        self
    }

    /// Set the overall timeout for a request (zero disables it)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.http.timeout = timeout;
        self
    }

    /// Set the time allowed for response headers to arrive
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.http.connect_timeout = timeout;
        self
    }

    /// Set the maximum time between two body chunks
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.http.read_timeout = timeout;
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.http.follow_redirects = follow;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.http.user_agent = user_agent.into();
        self
    }

    /// Add a custom HTTP header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.as_ref().parse::<HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            self.config.http.headers.insert(name, value);
        }
        self
    }

    /// Add already validated headers, replacing earlier values of the same name
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.config.http.headers.extend(headers);
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.http.proxy = Some(proxy);
        self.config.http.use_system_proxy = false; // Explicit proxy overrides system proxy
        self
    }

    pub fn with_system_proxy(mut self, use_system_proxy: bool) -> Self {
        if self.config.http.proxy.is_none() {
            self.config.http.use_system_proxy = use_system_proxy;
        }
        self
    }

    pub fn build(self) -> IoConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_BUFFER_CAPACITY, DEFAULT_STASH_SIZE};
    use crate::proxy::{ProxyAuth, ProxyType};

    #[test]
    fn test_builder_defaults() {
        let config = IoConfigBuilder::new().build();
        assert!(!config.stash_enabled);
        assert_eq!(config.initial_stash_size, DEFAULT_STASH_SIZE);
        assert_eq!(config.initial_buffer_capacity, DEFAULT_BUFFER_CAPACITY);
        assert_eq!(config.loader, LoaderPreference::Auto);
        assert_eq!(config.range_strategy, RangeStrategy::Header);
        assert_eq!(config.http.connect_timeout, Duration::from_secs(10));
        assert!(config.http.timeout.is_zero());
        assert!(config.http.use_system_proxy);
    }

    #[test]
    fn test_builder_customization() {
        let config = IoConfigBuilder::new()
            .with_stash_enabled(true)
            .with_initial_stash_size(1024)
            .with_initial_buffer_capacity(4096)
            .with_loader(LoaderPreference::Chunked)
            .with_query_param_ranges("bstart", "bend")
            .with_range_load_zero_start(true)
            .with_reuse_redirected_url(true)
            .with_connect_timeout(Duration::from_secs(3))
            .with_user_agent("Trickle/1.0")
            .with_header("X-Custom-Header", "CustomValue")
            .with_header("bad header", "ignored")
            .with_system_proxy(false)
            .build();

        assert!(config.stash_enabled);
        assert_eq!(config.initial_stash_size, 1024);
        assert_eq!(config.initial_buffer_capacity, 4096);
        assert_eq!(config.loader, LoaderPreference::Chunked);
        assert_eq!(
            config.range_strategy,
            RangeStrategy::QueryParam {
                start: "bstart".to_string(),
                end: "bend".to_string()
            }
        );
        assert!(config.range_load_zero_start);
        assert!(config.reuse_redirected_url);
        assert_eq!(config.http.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.http.user_agent, "Trickle/1.0");
        assert!(!config.http.use_system_proxy);

        let header_value = config.http.headers.get("X-Custom-Header").unwrap();
        assert_eq!(header_value.to_str().unwrap(), "CustomValue");
        assert!(config.http.headers.get("bad header").is_none());
    }

    struct PathSeek;

    impl SeekHandler for PathSeek {
        fn request(&self, url: &url::Url, range: crate::ByteRange) -> (url::Url, HeaderMap) {
            let mut url = url.clone();
            url.set_path(&format!("/seek/{}", range.from));
            (url, HeaderMap::new())
        }
    }

    #[test]
    fn test_seek_handler_strategy() {
        let config = IoConfigBuilder::new().with_seek_handler(PathSeek).build();
        let RangeStrategy::Custom(handler) = &config.range_strategy else {
            panic!("expected a custom strategy, got {:?}", config.range_strategy);
        };
        assert!(!config.range_strategy.accepts_plain_ok());
        assert_eq!(config.range_strategy, config.clone().range_strategy);
        assert_ne!(config.range_strategy, RangeStrategy::Header);

        let base = url::Url::parse("https://example.com/live.flv").unwrap();
        let (url, headers) = handler.request(&base, crate::ByteRange::open(4096));
        assert_eq!(url.as_str(), "https://example.com/seek/4096");
        assert!(headers.is_empty());
    }

    #[test]
    fn test_explicit_proxy_disables_system_proxy() {
        let config = IoConfigBuilder::new()
            .with_proxy(ProxyConfig {
                url: "socks5://127.0.0.1:1080".to_string(),
                proxy_type: ProxyType::Socks5,
                auth: Some(ProxyAuth {
                    username: "user".to_string(),
                    password: "pass".to_string(),
                }),
            })
            .with_system_proxy(true)
            .build();

        assert!(!config.http.use_system_proxy);
        let proxy = config.http.proxy.unwrap();
        assert_eq!(proxy.proxy_type, ProxyType::Socks5);
        assert_eq!(proxy.auth.unwrap().username, "user");
    }
}
