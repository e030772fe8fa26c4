//! slotwatchd - reservation availability monitor daemon
//!
//! ## Commands
//!
//! - `run` (default): start monitoring, serve the health endpoint, stop on
//!   Ctrl+C / SIGTERM
//! - `check`: run one check cycle and print the outcome as JSON

mod health;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use slotwatch_core::{obs, MonitorConfig, MonitoringScheduler, Notifier};
use slotwatch_http::{standard_pipeline, TelegramConfig, TelegramNotifier};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn, Level};

use crate::health::HealthState;

#[derive(Parser)]
#[command(name = "slotwatchd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Watches a reservation site and notifies when new slots open", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Load environment variables from this file instead of `./.env`
    #[arg(long, global = true, value_name = "PATH")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor continuously (default)
    Run(RunArgs),

    /// Run a single check cycle and print the outcome
    Check,
}

#[derive(Args, Debug, Clone, PartialEq)]
struct RunArgs {
    /// Address for the health endpoint
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:3000")]
    health_addr: SocketAddr,

    /// Minutes between status reports in the log (0 disables, at most a day)
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(0..=1440))]
    status_every_mins: u64,
}

impl RunArgs {
    /// Arguments for a bare `slotwatchd`, resolved from defaults and the environment.
    fn from_defaults() -> Result<Self> {
        #[derive(Parser)]
        struct Bare {
            #[command(flatten)]
            args: RunArgs,
        }
        Bare::try_parse_from(["slotwatchd"])
            .map(|bare| bare.args)
            .context("Invalid run settings in the environment")
    }
}

fn load_env_file(path: Option<&PathBuf>) -> Result<()> {
    match path {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load env file: {:?}", path))?;
        }
        None => {
            // A missing ./.env is fine; the process environment may be complete.
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    load_env_file(cli.env_file.as_ref())?;

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    slotwatch_core::telemetry::init_tracing(cli.json, level);

    let config = MonitorConfig::from_env().context("Failed to read monitor configuration")?;
    config.validate().context("Invalid monitor configuration")?;
    info!(
        resource = %config.target.resource_id,
        zones = %config.target_zones.join(","),
        period = %config.search.period(),
        interval_mins = config.check_interval.as_secs() / 60,
        "configuration loaded"
    );

    let telegram = TelegramConfig::from_env().context("Failed to read Telegram configuration")?;
    let notifier: Arc<dyn Notifier> = Arc::new(
        TelegramNotifier::new(telegram, &config).context("Failed to build Telegram notifier")?,
    );
    let pipeline = standard_pipeline(&config).context("Failed to build acquisition pipeline")?;
    let scheduler = Arc::new(MonitoringScheduler::new(
        config,
        Arc::new(pipeline),
        Arc::clone(&notifier),
    ));

    let command = match cli.command {
        Some(command) => command,
        None => Commands::Run(RunArgs::from_defaults()?),
    };
    match command {
        Commands::Run(args) => run(scheduler, args).await,
        Commands::Check => check(scheduler).await,
    }
}

async fn check(scheduler: Arc<MonitoringScheduler>) -> Result<()> {
    let outcome = scheduler
        .run_once()
        .await
        .context("Check cycle could not run")?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn run(scheduler: Arc<MonitoringScheduler>, args: RunArgs) -> Result<()> {
    let RunArgs {
        health_addr,
        status_every_mins,
    } = args;
    let listener = TcpListener::bind(health_addr)
        .await
        .with_context(|| format!("Failed to bind health endpoint on {}", health_addr))?;
    info!(addr = %health_addr, "health endpoint listening");

    let (server_stop, server_stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(health::serve(
        listener,
        HealthState::new(Arc::clone(&scheduler)),
        async {
            server_stop_rx.await.ok();
        },
    ));

    if let Err(e) = scheduler.start().await {
        server_stop.send(()).ok();
        server.await.ok();
        return Err(e).context("Failed to start monitoring");
    }
    info!("monitoring started, press Ctrl+C to stop");

    let reporter = (status_every_mins > 0).then(|| {
        tokio::spawn(report_status(
            Arc::clone(&scheduler),
            Duration::from_secs(status_every_mins * 60),
        ))
    });

    let signal = shutdown_signal().await?;
    info!(signal, "shutdown signal received");

    if let Some(reporter) = reporter {
        reporter.abort();
    }
    scheduler.stop(&format!("signal: {}", signal)).await;

    server_stop.send(()).ok();
    match server.await {
        Ok(Ok(())) => info!("health endpoint stopped"),
        Ok(Err(e)) => error!(error = %e, "health endpoint failed"),
        Err(e) => error!(error = %e, "health endpoint task panicked"),
    }
    Ok(())
}

/// Log a status snapshot every `every`.
async fn report_status(scheduler: Arc<MonitoringScheduler>, every: Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let status = scheduler.status();
        obs::emit_status_report(&status);
        if status.is_escalated() {
            warn!(
                effective_interval_secs = status.effective_interval_secs,
                "checks are running at a widened interval"
            );
        }
    }
}

/// Resolve with the name of the first termination signal received.
#[cfg(unix)]
async fn shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
    let mut sigquit = signal(SignalKind::quit()).context("Failed to listen for SIGQUIT")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to listen for Ctrl+C")?;
            Ok("SIGINT")
        }
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigquit.recv() => Ok("SIGQUIT"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::try_parse_from(["slotwatchd"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn test_cli_run_flags() {
        let cli = Cli::try_parse_from([
            "slotwatchd",
            "--json",
            "run",
            "--health-addr",
            "127.0.0.1:8080",
            "--status-every-mins",
            "5",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Some(Commands::Run(args)) => {
                assert_eq!(args.health_addr, "127.0.0.1:8080".parse().unwrap());
                assert_eq!(args.status_every_mins, 5);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_bare_invocation_reads_health_addr_from_env() {
        std::env::set_var("HEALTH_ADDR", "127.0.0.1:9000");
        let args = RunArgs::from_defaults();
        std::env::remove_var("HEALTH_ADDR");

        let args = args.unwrap();
        assert_eq!(args.health_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(args.status_every_mins, 30);
    }

    #[test]
    fn test_status_interval_is_bounded() {
        let result = Cli::try_parse_from([
            "slotwatchd",
            "run",
            "--status-every-mins",
            "307445734561825861",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_check_with_env_file() {
        let cli = Cli::try_parse_from(["slotwatchd", "check", "--env-file", "prod.env"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Check)));
        assert_eq!(cli.env_file, Some(PathBuf::from("prod.env")));
    }

    #[test]
    fn test_missing_env_file_is_an_error() {
        let missing = PathBuf::from("/nonexistent/slotwatch.env");
        assert!(load_env_file(Some(&missing)).is_err());
    }
}
