use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hls_proxy::config::Config;
use hls_proxy::proxy::fetcher::{RetryConfig, UpstreamFetcher};
use hls_proxy::registry::InMemoryChannelRegistry;
use hls_proxy::web::{self, AppState};

#[derive(Parser)]
#[command(name = "hls-proxy")]
#[command(version = "0.1.0")]
#[command(about = "A transparent HLS reverse proxy with playlist rewriting")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PROXY_CONFIG", default_value = "config.toml")]
    config: String,

    /// Listening IP address (overrides config file)
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port (overrides config file)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Channels file path (overrides config file)
    #[arg(long, value_name = "PATH")]
    channels_file: Option<std::path::PathBuf>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("hls_proxy={},tower_http=info", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting HLS proxy v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load(&cli.config).context("loading configuration")?;
    info!(path = %cli.config, "configuration loaded");

    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(channels_file) = cli.channels_file {
        config.proxy.channels_file = channels_file;
    }

    let registry = InMemoryChannelRegistry::load(&config.proxy.channels_file)
        .with_context(|| format!("loading channels from {}", config.proxy.channels_file.display()))?;
    info!(path = %config.proxy.channels_file.display(), "channel registry loaded");

    let retry = RetryConfig {
        max_attempts: config.fetch.max_attempts,
        per_attempt_timeout: Duration::from_secs(config.fetch.timeout_secs),
        ..RetryConfig::default()
    };
    let fetcher = UpstreamFetcher::with_default_client(retry).context("building upstream fetcher")?;

    let state = AppState::new(Arc::new(registry), Arc::new(fetcher), &config);
    let app = web::router(state);

    let addr = format!("{}:{}", config.web.host, config.web.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .await
        .context("serving HTTP")?;

    Ok(())
}
