//! `grid-worker` - run one work unit against a coordinator
//!
//! Exit codes: 0 complete, 2 usage or configuration, 10 handshake (trust,
//! TLS, connect, timeout), 11 protocol, 12 decode, 13 engine, 14 checkpoint
//! upload abandoned, 1 internal.

use clap::Parser;
use grid_worker_core::{
    create_backend, ErrorCategory, HttpCoordinator, SimulationDriver, SystemClock,
    WorkerConfig,
};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE_EXIT: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "grid-worker", version, about = "Distributed simulation grid worker")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Coordinator base URL (overrides the config file)
    #[arg(long)]
    coordinator: Option<String>,

    /// PEM bundle of trusted coordinator roots (overrides the config file)
    #[arg(long)]
    trust_bundle: Option<PathBuf>,

    /// Steps to run (overrides the config file)
    #[arg(long)]
    target_steps: Option<u64>,

    /// Debug logging unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(message) => {
            error!("{}", message);
            std::process::exit(USAGE_EXIT);
        }
    };

    std::process::exit(run(&config));
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(cli: &Cli) -> Result<WorkerConfig, String> {
    let mut config = match &cli.config {
        Some(path) => WorkerConfig::from_file(path).map_err(|e| e.to_string())?,
        None => WorkerConfig::default(),
    };

    if let Some(url) = &cli.coordinator {
        config.coordinator.url = url.clone();
    }
    if let Some(path) = &cli.trust_bundle {
        config.coordinator.trust_bundle = Some(path.clone());
    }
    if let Some(steps) = cli.target_steps {
        config.run.target_steps = steps;
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Run the work unit and return the process exit code
fn run(config: &WorkerConfig) -> i32 {
    let mut coordinator = match HttpCoordinator::new(
        config.coordinator.url.as_str(),
        config.coordinator.http_settings(),
    ) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            error!("cannot build coordinator client: {}", e);
            return ErrorCategory::Handshake.exit_code();
        }
    };

    let backend = create_backend(&config.engine);
    info!(
        coordinator = coordinator.base_url(),
        engine = backend.name(),
        engine_version = backend.version(),
        "starting worker"
    );

    let mut driver = SimulationDriver::new(
        config.run.driver_config(),
        backend,
        Box::new(SystemClock::new()),
    );

    match driver.run(&mut coordinator, config.coordinator.trust_bundle.as_deref()) {
        Ok(summary) => {
            info!(
                stream_id = %summary.stream_id,
                steps = summary.steps,
                frames = summary.frames_emitted,
                frames_failed = summary.frames_failed,
                checkpoints = summary.checkpoints_uploaded,
                ns_per_day = summary.throughput.ns_per_day,
                "work unit complete"
            );
            0
        }
        Err(e) => {
            let category = e.category();
            error!(%category, phase = %driver.phase(), "{}", e);
            category.exit_code()
        }
    }
}
