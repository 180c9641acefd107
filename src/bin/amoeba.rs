//! `amoeba` - run the learning loop until interrupted.
//!
//! Loads the snapshot from the data directory (seeding the vocabulary from
//! `PATH` when it is empty), runs workers until SIGINT/SIGTERM or the cycle
//! limit, then writes the snapshot back.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use amoeba::{
    install_signal_handlers, load_snapshot, search_path_or_default, seed_from_search_path,
    write_snapshot, AmoebaConfig, DataDirLock, Learner, Lexicon, ObservationStore,
    ProcessSandbox, Runtime, SharedState, Shutdown, SnapshotPaths,
};

/// Self-teaching shell command explorer
#[derive(Parser)]
#[command(name = "amoeba")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Number of worker threads, clamped to 1..=max_threads
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    threads: Option<i64>,

    /// Initial command length, clamped to cmd_min..=cmd_max
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    length: Option<i64>,

    /// Vocabulary sampling scope in percent, clamped to scope_min..=scope_max
    #[arg(long, value_name = "P", allow_negative_numbers = true)]
    scope: Option<i64>,

    /// Directory holding the snapshot files
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, env = "AMOEBA_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Stop after this many executed commands
    #[arg(long, value_name = "N")]
    cycles: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "AMOEBA_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = load_config(&cli)?;

    let shutdown = Shutdown::new();
    install_signal_handlers(&shutdown).context("Failed to install signal handlers")?;

    let data_dir = config.storage.data_dir.clone();
    let _lock = DataDirLock::acquire(&data_dir)
        .with_context(|| format!("Failed to lock data directory {}", data_dir.display()))?;
    let paths = SnapshotPaths::in_dir(&data_dir, &config.storage);

    let mut lexicon = Lexicon::new();
    let mut observations = ObservationStore::new();
    if let Err(e) = load_snapshot(&paths, &mut lexicon, &mut observations) {
        warn!(error = %e, "snapshot load failed, starting empty");
        lexicon = Lexicon::new();
        observations = ObservationStore::new();
    }

    if lexicon.vocabulary.is_empty() {
        let search_path = search_path_or_default(std::env::var_os("PATH"));
        let report = seed_from_search_path(&mut lexicon.vocabulary, &search_path, &config.seed);
        info!(added = report.added, "seeded vocabulary from PATH");
    }

    info!(
        workers = config.runtime.workers,
        length = config.runtime.default_length,
        scope = config.runtime.default_scope,
        vocabulary = lexicon.vocabulary.len(),
        "launching, press Ctrl-C to stop"
    );

    let state = SharedState::from_config(&config, lexicon, observations);
    let runtime = Runtime::new(
        state,
        ProcessSandbox::new(config.sandbox.clone()),
        Learner::new(config.learning, &config.limits),
        config.runtime.clone(),
        shutdown,
    );

    let outcome = runtime.run();

    let (lexicon, observations) = runtime
        .into_state()
        .and_then(SharedState::into_stores)
        .context("Failed to reclaim learned state")?;
    write_snapshot(&paths, &lexicon, &observations).context("Failed to write snapshot")?;

    let summary = outcome.context("Run aborted")?;
    info!(
        cycles = summary.cycles,
        successful = summary.successful,
        failed = summary.failed,
        "run finished"
    );
    println!(
        "Learning moving average: {:.2}  (trend: {})",
        summary.moving_average, summary.trend
    );
    Ok(())
}

/// Reads the optional config file and applies CLI overrides.
fn load_config(cli: &Cli) -> Result<AmoebaConfig> {
    let mut config = match &cli.config {
        Some(path) => AmoebaConfig::from_json_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AmoebaConfig::default(),
    };

    let limits = config.limits;
    if let Some(threads) = cli.threads {
        config.runtime.workers = limits.clamp_threads(threads);
    }
    if let Some(length) = cli.length {
        config.runtime.default_length = limits.clamp_length(length);
    }
    if let Some(scope) = cli.scope {
        config.runtime.default_scope = limits.clamp_scope(scope);
    }
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir.clone_from(dir);
    }
    if let Some(cycles) = cli.cycles {
        config.runtime.max_cycles = Some(cycles);
    }

    config.validate().context("Invalid configuration")
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();

    Ok(())
}
