use reqwest::Proxy;

use crate::IoError;

/// Proxy protocol
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum ProxyType {
    Http,
    Https,
    Socks5,
    /// Route every scheme through the proxy
    All,
}

#[derive(Debug, Clone)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy server URL (e.g., "http://proxy.example.com:8080")
    pub url: String,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

impl ProxyConfig {
    /// Build the reqwest proxy used by loaders.
    pub fn to_proxy(&self) -> Result<Proxy, IoError> {
        let invalid = |e: reqwest::Error| IoError::ProxyError(format!("{}: {e}", self.url));

        let proxy = match self.proxy_type {
            ProxyType::Http => Proxy::http(&self.url).map_err(invalid)?,
            ProxyType::Https => Proxy::https(&self.url).map_err(invalid)?,
            ProxyType::Socks5 if self.url.starts_with("socks5://") => {
                Proxy::all(&self.url).map_err(invalid)?
            }
            ProxyType::Socks5 => Proxy::all(format!("socks5://{}", self.url)).map_err(invalid)?,
            ProxyType::All => Proxy::all(&self.url).map_err(invalid)?,
        };

        Ok(match &self.auth {
            Some(auth) => proxy.basic_auth(&auth.username, &auth.password),
            None => proxy,
        })
    }
}
