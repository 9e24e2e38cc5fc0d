use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use url::Url;

use huewatch::bridge::HueBridge;
use huewatch::config::{self, AppConfig};
use huewatch::error::{ApiError, ApiResult};
use huewatch::metrics::PromSink;
use huewatch::scan::Poller;
use huewatch::server;

const DEVICE_TYPE: &str = "huewatch#exporter";

/*
 * Formatter function to output in syslog format. This makes sense when running
 * as a service (where output might go to a log file, or the system journal)
 */
#[allow(clippy::match_same_arms)]
fn syslog_format(
    buf: &mut pretty_env_logger::env_logger::fmt::Formatter,
    record: &log::Record,
) -> std::io::Result<()> {
    writeln!(
        buf,
        "<{}>{}: {}",
        match record.level() {
            log::Level::Error => 3,
            log::Level::Warn => 4,
            log::Level::Info => 6,
            log::Level::Debug => 7,
            log::Level::Trace => 7,
        },
        record.target(),
        record.args()
    )
}

fn init_logging() -> ApiResult<()> {
    /* Try to provide reasonable default filters, when RUST_LOG is not specified */
    const DEFAULT_LOG_FILTERS: &[&str] = &["info", "huewatch=debug"];

    let log_filters = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTERS.join(","));

    /* Detect if we need syslog or human-readable formatting */
    if std::env::var("SYSTEMD_EXEC_PID").is_ok_and(|pid| pid == std::process::id().to_string()) {
        Ok(pretty_env_logger::env_logger::builder()
            .format(syslog_format)
            .parse_filters(&log_filters)
            .try_init()?)
    } else {
        Ok(pretty_env_logger::formatted_timed_builder()
            .parse_filters(&log_filters)
            .try_init()?)
    }
}

#[derive(Parser)]
#[command(name = "huewatch", about = "Philips Hue to Prometheus exporter")]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "huewatch.yaml")]
    config: Utf8PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the Prometheus metrics exporter
    Serve,
    /// Dump the current bridge state as json
    Dump,
    /// Register a new application key on the bridge. Press the link button
    /// just before running this command.
    CreateUser,
}

/// Resolve the bridge base url: explicit config wins, discovery otherwise.
async fn bridge_url(conf: &AppConfig) -> ApiResult<Url> {
    if let Some(url) = &conf.bridge.url {
        return Ok(url.clone());
    }
    HueBridge::discover(Duration::from_secs(conf.bridge.timeout_secs)).await
}

async fn connect(conf: &AppConfig) -> ApiResult<HueBridge> {
    let url = bridge_url(conf).await?;
    HueBridge::new(
        url,
        conf.bridge.username.clone(),
        Duration::from_secs(conf.bridge.timeout_secs),
    )
}

fn install_signal_handlers(shutdown: watch::Sender<bool>) -> ApiResult<()> {
    let tx = shutdown.clone();
    tokio::spawn(async move {
        if matches!(signal::ctrl_c().await, Ok(())) {
            log::warn!("Ctrl-C pressed, exiting..");
            let _ = std::io::stderr().flush();
            let _ = tx.send(true);
        }
    });

    let mut sigterm = signal::unix::signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        if matches!(sigterm.recv().await, Some(())) {
            log::warn!("SIGTERM received, exiting..");
            let _ = std::io::stderr().flush();
            let _ = shutdown.send(true);
        }
    });

    Ok(())
}

/// The `serve` command: poll the bridge periodically and export the data as
/// Prometheus metrics.
async fn serve(conf: AppConfig) -> ApiResult<()> {
    if conf.bridge.username.is_empty() {
        return Err(ApiError::MissingUsername);
    }

    let bridge = connect(&conf).await?;
    let sink = Arc::new(PromSink::new()?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    install_signal_handlers(shutdown_tx)?;

    let poller = Poller::new(bridge, sink.clone(), conf.exporter.poll_interval());
    let poll_task = tokio::spawn(poller.run(shutdown_rx.clone()));

    let listener = TcpListener::bind((
        conf.exporter.listen_address.as_str(),
        conf.exporter.listen_port,
    ))
    .await?;
    server::serve(listener, sink, shutdown_rx).await?;

    if let Err(err) = poll_task.await {
        log::error!("Poll task failed: {err}");
    }

    Ok(())
}

/// The `dump` command: print raw bridge state for debugging.
async fn dump(conf: AppConfig) -> ApiResult<()> {
    let bridge = connect(&conf).await?;

    println!("# -------- Lights --------");
    println!(
        "{}",
        serde_json::to_string_pretty(&bridge.raw_category("lights").await?)?
    );

    println!();
    println!("# -------- Sensors --------");
    println!(
        "{}",
        serde_json::to_string_pretty(&bridge.raw_category("sensors").await?)?
    );

    Ok(())
}

/// The `create-user` command: register an application key on the bridge.
async fn create_user(conf: AppConfig) -> ApiResult<()> {
    let url = bridge_url(&conf).await?;
    let bridge = HueBridge::new(
        url,
        String::new(),
        Duration::from_secs(conf.bridge.timeout_secs),
    )?;

    let username = bridge.create_user(DEVICE_TYPE).await?;
    println!("user: {username}");
    println!("Add this as bridge.username to the configuration file.");

    Ok(())
}

async fn run() -> ApiResult<()> {
    let cli = Cli::parse();

    init_logging()?;

    let conf = config::parse(&cli.config)?;
    log::debug!("Configuration loaded successfully");

    match cli.command {
        Command::Serve => serve(conf).await,
        Command::Dump => dump(conf).await,
        Command::CreateUser => create_user(conf).await,
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        log::error!("huewatch error: {err}");
        log::error!("Fatal error encountered, cannot continue.");
    }
}
