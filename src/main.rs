use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sku_watcher::browser::{BrowserDriver, ChromeDriver, StaticPage};
use sku_watcher::config::{AppConfig, LoggingConfig, MetricsConfig};
use sku_watcher::extractor::FieldExtractor;
use sku_watcher::models::ItemTarget;
use sku_watcher::navigator::{Navigator, PageView};
use sku_watcher::session::{login_flow_for, SessionGuard, SessionStatus};
use sku_watcher::MonitorLoop;

/// Watches product pages and reports price and coupon changes.
#[derive(Parser)]
#[command(name = "sku-watcher")]
#[command(version)]
struct Cli {
    /// Configuration file to use instead of the layered config/ directory.
    #[arg(long, short, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the configured items until interrupted.
    Run,
    /// Log in interactively and save the session cookies.
    Login,
    /// Fetch one item once and print what was extracted.
    Check {
        /// Item id or item page address.
        locator: String,
    },
    /// Extract fields from a saved item page without a browser.
    Parse {
        file: PathBuf,
        /// Item id or address the page was saved from; defaults to the file name.
        #[arg(long)]
        locator: Option<String>,
    },
}

fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.filter))?;

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "sku-watcher.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}

fn setup_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.port))
        .install()
        .context("Failed to start the Prometheus exporter")?;
    info!(port = config.port, "Serving metrics");
    Ok(())
}

fn load_config(path: Option<&str>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::from_env(),
    };
    config.context("Failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let _log_guard = setup_logging(&config.logging)?;
    setup_metrics(&config.metrics)?;

    match cli.command {
        Commands::Run => run(&config).await,
        Commands::Login => login(&config).await,
        Commands::Check { locator } => check(&config, &locator).await,
        Commands::Parse { file, locator } => parse(&config, file, locator).await,
    }
}

async fn run(config: &AppConfig) -> Result<()> {
    if config.monitor.items.is_empty() {
        warn!("No items configured; set monitor.items");
    }

    info!("Starting SKU Watcher...");
    let driver = ChromeDriver::launch(&config.browser)?;
    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping after the current item");
            let _ = stop.send(true);
        }
    });

    let mut monitor = MonitorLoop::from_config(config, Box::new(driver))
        .await?
        .with_shutdown(shutdown);
    let summary = monitor.run().await?;

    info!(
        cycles = summary.cycles,
        events = summary.events,
        delivered = summary.delivered,
        "Shutting down..."
    );
    Ok(())
}

async fn login(config: &AppConfig) -> Result<()> {
    let driver = ChromeDriver::launch(&config.browser)?;
    let mut session = SessionGuard::new(config.site.clone(), &config.session, login_flow_for(&config.session));

    let outcome = async {
        if session.load(&driver).await? != SessionStatus::Valid {
            session.request_interactive_login(&driver).await?;
        }
        session.persist(&driver).await?;
        Ok::<_, sku_watcher::utils::SessionError>(())
    }
    .await;

    driver.close().await?;
    outcome?;
    println!(
        "Session saved to {}",
        config.session.cookie_path().display()
    );
    Ok(())
}

async fn check(config: &AppConfig, locator: &str) -> Result<()> {
    let target = ItemTarget::resolve(locator, &config.site)?;
    let driver = ChromeDriver::launch(&config.browser)?;
    let mut session = SessionGuard::new(config.site.clone(), &config.session, login_flow_for(&config.session));
    let navigator = Navigator::new(config.site.clone(), &config.navigator);

    let outcome = async {
        let status = session.load(&driver).await?;
        if status != SessionStatus::Valid {
            warn!(status = ?status, "Not signed in; some fields may be missing");
        }
        let page = navigator.fetch(&driver, &target.address).await?;
        Ok::<_, sku_watcher::AppError>(FieldExtractor::new().extract(&page).await)
    }
    .await;

    driver.close().await?;
    println!("{}", serde_json::to_string_pretty(&outcome?)?);
    Ok(())
}

async fn parse(config: &AppConfig, file: PathBuf, locator: Option<String>) -> Result<()> {
    let locator = locator
        .or_else(|| file.file_stem().and_then(|stem| stem.to_str()).map(str::to_string))
        .context("Cannot tell which item the page belongs to; pass --locator")?;
    let target = ItemTarget::resolve(&locator, &config.site)?;

    let driver = StaticPage::from_file(target.address.as_str(), &file)?;
    driver.navigate(&target.address).await?;
    let page = PageView::new(&driver, target.address.clone(), Some(target.id.clone()));

    let snapshot = FieldExtractor::new().extract(&page).await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
