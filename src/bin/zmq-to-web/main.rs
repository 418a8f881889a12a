mod args;

use std::{process::ExitCode, time::Duration};

use anyhow::{Context as _, Result, anyhow};
use args::Args;
use clap::Parser as _;
use home_sensors::{
    api::HttpStorageApi,
    bridge::{self, BridgeOptions},
    retry::RetryPolicy,
    source::ZmqSubscriber,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const CATALOG_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);
const CATALOG_MISS_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(args.debug) {
        eprintln!("{e:#}");
        return ExitCode::from(1);
    }

    if let Err(e) = run(args).await {
        error!("{e:#}");
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}

fn init_logging(debug: bool) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {e}"))
}

async fn run(args: Args) -> Result<()> {
    let api = HttpStorageApi::new(&args.api_url).context("failed to set up the API client")?;

    info!("working with the API on '{}'", api.base_url());

    let options = BridgeOptions {
        retry: RetryPolicy::default(),
        refresh_interval: Some(CATALOG_REFRESH_INTERVAL),
        min_refresh_interval: Some(CATALOG_MISS_REFRESH_INTERVAL),
    };

    let endpoint = args.endpoint;
    let idle_timeout = (args.idle_timeout > 0).then(|| Duration::from_secs(args.idle_timeout));
    let subscribe = move || async move {
        let subscriber = ZmqSubscriber::connect(&endpoint, idle_timeout).await?;
        info!(
            "receiving messages from the '{}' ZMQ endpoint",
            subscriber.endpoint()
        );
        Ok::<_, anyhow::Error>(subscriber)
    };

    bridge::start(api, options, subscribe, shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for the interrupt signal: {e}");
        std::future::pending::<()>().await;
    }
}
