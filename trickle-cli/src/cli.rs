use clap::Parser;
use std::path::PathBuf;
use trickle_engine::LoaderPreference;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    version,
    about = "Ranged-HTTP media stream downloader",
    long_about = "Downloads a remote media stream through ranged HTTP requests.\n\
                  \n\
                  Interrupted transfers can be resumed from any byte offset, already\n\
                  retrieved ranges are never fetched twice, and the local buffer adapts\n\
                  to the measured network throughput."
)]
pub struct CliArgs {
    /// URL of the stream to download
    #[arg(required = true, help = "URL of the media stream")]
    pub url: String,

    /// Output file
    #[arg(short, long, help = "File the stream is written to")]
    pub output: PathBuf,

    /// Byte offset to start downloading from
    #[arg(
        short,
        long,
        default_value = "0",
        help = "Start offset with optional unit (B, KB, MB, GB). Examples: \"0\", \"512KB\""
    )]
    pub start: String,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Accumulate data before writing
    #[arg(long, help = "Enable the adaptive stash buffer")]
    pub stash: bool,

    /// Initial stash size
    #[arg(
        long,
        default_value = "256KB",
        help = "Stash size used until throughput is measured, with optional unit"
    )]
    pub stash_size: String,

    /// Loader variant
    #[arg(long, value_enum, default_value = "auto", help = "Loader to use")]
    pub loader: LoaderPreference,

    /// Seek through query parameters instead of a Range header
    #[arg(
        long,
        num_args = 2,
        value_names = ["START", "END"],
        help = "Query parameter names carrying the range bounds (e.g., --range-params bstart bend)"
    )]
    pub range_params: Option<Vec<String>>,

    /// Send `bytes=0-` for the initial request
    #[arg(long, help = "Send a Range header for the initial full request as well")]
    pub range_zero_start: bool,

    /// Reuse the redirected URL for range requests
    #[arg(long, help = "Send follow-up range requests to the URL the server redirected to")]
    pub reuse_redirect: bool,

    /// Overall timeout in seconds
    #[arg(
        long,
        default_value = "0",
        help = "Overall timeout in seconds for HTTP requests (0 disables it)"
    )]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value = "10",
        help = "Time in seconds to wait for response headers"
    )]
    pub connect_timeout: u64,

    /// Read timeout in seconds
    #[arg(
        long,
        default_value = "30",
        help = "Read timeout in seconds (maximum time between receiving data chunks)"
    )]
    pub read_timeout: u64,

    /// Custom HTTP headers for download requests
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    /// Proxy URL (e.g., "http://proxy.example.com:8080")
    #[arg(long, help = "Proxy server URL (e.g., \"http://proxy.example.com:8080\")")]
    pub proxy: Option<String>,

    /// Proxy type (http, https, socks5, all)
    #[arg(
        long,
        default_value = "http",
        help = "Proxy type (http, https, socks5, all)",
        value_parser = ["http", "https", "socks5", "all"]
    )]
    pub proxy_type: String,

    /// Proxy username
    #[arg(long, help = "Username for proxy authentication")]
    pub proxy_user: Option<String>,

    /// Proxy password
    #[arg(long, help = "Password for proxy authentication")]
    pub proxy_pass: Option<String>,

    /// Disable all proxy settings
    #[arg(long, help = "Disable all proxy settings (including system proxy)")]
    pub no_proxy: bool,

    /// Show a progress bar
    #[arg(short = 'P', long = "progress", help = "Show a progress bar")]
    pub show_progress: bool,
}
