use std::time::{Duration, Instant};

use clap::Parser;
use error::AppError;
use indicatif::{ProgressBar, ProgressStyle};
use mimalloc::MiMalloc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use trickle_engine::proxy::{ProxyAuth, ProxyConfig, ProxyType};
use trickle_engine::{IoConfig, IoController, IoError, IoEvent};

mod cli;
mod error;
mod sink;
mod utils;

use cli::CliArgs;
use sink::FileSink;
use utils::{format_bytes, parse_headers, parse_size};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

fn progress_bar(enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.green/white}] {bytes}/{total_bytes} @ {bytes_per_sec}",
    ) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.enable_steady_tick(Duration::from_millis(500));
    bar
}

fn proxy_config(args: &CliArgs) -> Result<Option<ProxyConfig>, AppError> {
    let Some(proxy_url) = args.proxy.as_ref() else {
        return Ok(None);
    };
    let proxy_type = match args.proxy_type.as_str() {
        "http" => ProxyType::Http,
        "https" => ProxyType::Https,
        "socks5" => ProxyType::Socks5,
        "all" => ProxyType::All,
        other => {
            return Err(AppError::InvalidInput(format!(
                "Invalid proxy type: '{other}'"
            )));
        }
    };

    let auth = match (&args.proxy_user, &args.proxy_pass) {
        (Some(username), Some(password)) => Some(ProxyAuth {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    };

    info!(
        proxy_url = %proxy_url,
        proxy_type = ?proxy_type,
        has_auth = auth.is_some(),
        "Using explicit proxy configuration"
    );
    Ok(Some(ProxyConfig {
        url: proxy_url.clone(),
        proxy_type,
        auth,
    }))
}

fn io_config(args: &CliArgs) -> Result<IoConfig, AppError> {
    let stash_size = usize::try_from(parse_size(&args.stash_size)?)
        .map_err(|_| AppError::InvalidInput(format!("Stash size too large: {}", args.stash_size)))?;

    let mut builder = IoConfig::builder()
        .with_stash_enabled(args.stash)
        .with_initial_stash_size(stash_size)
        .with_loader(args.loader)
        .with_range_load_zero_start(args.range_zero_start)
        .with_reuse_redirected_url(args.reuse_redirect)
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .with_read_timeout(Duration::from_secs(args.read_timeout));

    if let Some([start, end]) = args.range_params.as_deref() {
        builder = builder.with_query_param_ranges(start, end);
    }

    builder = builder.with_headers(parse_headers(&args.headers));

    builder = if args.no_proxy {
        info!("All proxy settings disabled (--no-proxy flag)");
        builder.with_system_proxy(false)
    } else if let Some(proxy) = proxy_config(args)? {
        builder.with_proxy(proxy)
    } else {
        builder.with_system_proxy(true)
    };

    Ok(builder.build())
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    let start = parse_size(&args.start)?;
    let config = io_config(&args)?;
    info!(
        "HTTP timeout configuration: overall={}s, connect={}s, read={}s",
        args.timeout, args.connect_timeout, args.read_timeout
    );

    let progress = progress_bar(args.show_progress);
    let sink = FileSink::create(&args.output, start, progress.clone())?;
    let mut controller = IoController::http(&args.url, config, sink)?;

    info!(url = %args.url, output = %args.output.display(), start, "Starting download");
    let started = Instant::now();

    controller.open_at(start)?;

    while let Some(event) = controller.next_event().await {
        if let Some(e) = controller.consumer_mut().take_error() {
            controller.destroy();
            return Err(AppError::Io(e));
        }

        match event {
            IoEvent::ContentLengthKnown(total) => {
                info!(total = %format_bytes(total), "Stream size");
                progress.set_length(total.saturating_sub(start));
            }
            IoEvent::Redirected(url) => info!(url = %url, "Redirected"),
            IoEvent::DataArrival { .. } => {}
            IoEvent::Complete { from, to, next } => {
                debug!(from, to = ?to, next = ?next, "Range complete");
                // only the bytes before --start are left
                if next.is_some_and(|range| range.to.is_some_and(|to| to < start)) {
                    break;
                }
            }
            IoEvent::Error(err) => {
                warn!(
                    error = %err,
                    recoverable = err.is_recoverable(),
                    "Download failed"
                );
                controller.destroy();
                return Err(AppError::Download(IoError::Loader(err)));
            }
        }
    }

    if let Some(e) = controller.consumer_mut().take_error() {
        controller.destroy();
        return Err(AppError::Io(e));
    }

    let speed = controller.current_speed_kbps();
    let segments: Vec<String> = controller.segments().iter().map(ToString::to_string).collect();
    let written = controller.consumer_mut().finish()?;
    controller.destroy();

    info!(
        written = %format_bytes(written),
        elapsed = ?started.elapsed(),
        last_speed_kbps = speed,
        segments = ?segments,
        "Download finished"
    );
    Ok(())
}
