//! Worker pool and tuner.
//!
//! Workers run the generate / execute / learn cycle on OS threads, gated by a
//! permit pool sized to the worker count. A separate tuner thread nudges the
//! desired command length toward the direction the reward trend suggests.
//! Everything stops cooperatively on the shared [`Shutdown`] token.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info, warn};

use crate::command::{construct_command, render_command};
use crate::config::RuntimeConfig;
use crate::engine::permits::Permits;
use crate::error::{AmoebaError, AmoebaResult};
use crate::learning::Learner;
use crate::sandbox::{output_preview, CommandExecutor};
use crate::shutdown::Shutdown;
use crate::state::SharedState;
use crate::trend::Trend;

/// Totals reported after every thread has been joined.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Commands handed to the executor.
    pub cycles: u64,
    /// Executions that returned output.
    pub successful: u64,
    /// Executions that failed or were interrupted.
    pub failed: u64,
    /// Iterations where no command could be built.
    pub idle: u64,
    /// Moving average of the trend window.
    pub moving_average: f64,
    /// Final trend direction.
    pub trend: Trend,
    /// Desired command length at the end of the run.
    pub length: usize,
}

#[derive(Debug, Default)]
struct Counters {
    cycles: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    idle: AtomicU64,
}

struct Context<E> {
    state: SharedState,
    executor: E,
    learner: Learner,
    config: RuntimeConfig,
    shutdown: Shutdown,
    permits: Permits,
    counters: Counters,
}

/// Owns the shared state for the duration of a run.
pub struct Runtime<E: CommandExecutor + 'static> {
    ctx: Arc<Context<E>>,
}

impl<E: CommandExecutor + 'static> Runtime<E> {
    /// Creates a runtime; `config.workers` is raised to at least one.
    #[must_use]
    pub fn new(
        state: SharedState,
        executor: E,
        learner: Learner,
        mut config: RuntimeConfig,
        shutdown: Shutdown,
    ) -> Self {
        config.workers = config.workers.max(1);
        let permits = Permits::new(config.workers);
        Self {
            ctx: Arc::new(Context {
                state,
                executor,
                learner,
                config,
                shutdown,
                permits,
                counters: Counters::default(),
            }),
        }
    }

    /// Shared state, readable between or after runs.
    #[must_use]
    pub fn state(&self) -> &SharedState {
        &self.ctx.state
    }

    /// Runs workers and the tuner until shutdown or `max_cycles`.
    ///
    /// Once the workers have returned the shutdown token is requested so the
    /// tuner stops as well.
    ///
    /// # Errors
    /// `AmoebaError::Internal` if no worker could be started, a worker
    /// panicked, or a lock was poisoned.
    pub fn run(&self) -> AmoebaResult<RunSummary> {
        let mut workers = Vec::with_capacity(self.ctx.config.workers);
        for idx in 0..self.ctx.config.workers {
            let ctx = Arc::clone(&self.ctx);
            let spawned = thread::Builder::new()
                .name(format!("amoeba-worker-{idx}"))
                .spawn(move || ctx.worker_loop(idx));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    warn!(worker = idx, error = %e, "failed to spawn worker");
                    break;
                }
            }
        }
        if workers.is_empty() {
            return Err(AmoebaError::internal("no worker thread could be started"));
        }
        info!(workers = workers.len(), "workers launched");

        let tuner = {
            let ctx = Arc::clone(&self.ctx);
            match thread::Builder::new()
                .name("amoeba-tuner".to_string())
                .spawn(move || ctx.tuner_loop())
            {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(error = %e, "failed to start tuner, continuing without tuning");
                    None
                }
            }
        };

        let mut failure = join_all("worker", workers);
        self.ctx.shutdown.request();
        if let Some(handle) = tuner {
            if let Some(e) = join_all("tuner", vec![handle]) {
                failure.get_or_insert(e);
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        self.summary()
    }

    /// Counters and trend as of now.
    pub fn summary(&self) -> AmoebaResult<RunSummary> {
        let counters = &self.ctx.counters;
        let (moving_average, trend) = {
            let tracker = self.ctx.state.trend()?;
            (tracker.moving_average(), tracker.trend())
        };
        let length = self.ctx.state.settings()?.length();
        Ok(RunSummary {
            cycles: counters.cycles.load(Ordering::SeqCst),
            successful: counters.successful.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
            idle: counters.idle.load(Ordering::SeqCst),
            moving_average,
            trend,
            length,
        })
    }

    /// Releases the shared state after `run` has returned.
    ///
    /// # Errors
    /// `AmoebaError::Internal` if a thread still holds the context.
    pub fn into_state(self) -> AmoebaResult<SharedState> {
        Arc::try_unwrap(self.ctx)
            .map(|ctx| ctx.state)
            .map_err(|_| AmoebaError::internal("runtime context still shared"))
    }
}

fn join_all(role: &'static str, handles: Vec<JoinHandle<AmoebaResult<()>>>) -> Option<AmoebaError> {
    let mut failure = None;
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failure.get_or_insert(e);
            }
            Err(_) => {
                error!(role, "thread panicked");
                failure.get_or_insert_with(|| AmoebaError::internal(format!("{role} thread panicked")));
            }
        }
    }
    failure
}

impl<E: CommandExecutor> Context<E> {
    fn worker_loop(&self, idx: usize) -> AmoebaResult<()> {
        let Some(_permit) = self.permits.acquire(&self.shutdown, self.config.permit_poll()) else {
            debug!(worker = idx, "shutdown before a permit was granted");
            return Ok(());
        };
        info!(worker = idx, "worker started");

        let mut rng = StdRng::from_os_rng();
        while !self.shutdown.is_requested() && !self.cycles_exhausted() {
            match self.cycle(idx, &mut rng) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    error!(worker = idx, error = %e, "worker stopping on internal error");
                    self.shutdown.request();
                    return Err(e);
                }
            }
        }

        info!(worker = idx, "worker stopping");
        Ok(())
    }

    /// One generate / execute / learn step. Returns `false` when the cycle
    /// budget is spent.
    fn cycle(&self, idx: usize, rng: &mut StdRng) -> AmoebaResult<bool> {
        let command = construct_command(&self.state, rng)?;
        let rendered = if command.is_empty() {
            None
        } else {
            render_command(&self.state.lexicon()?.vocabulary, &command)
        };
        let Some(line) = rendered else {
            self.counters.idle.fetch_add(1, Ordering::Relaxed);
            self.shutdown.sleep(self.config.idle_backoff());
            return Ok(true);
        };

        let Some(cycle) = self.claim_cycle() else {
            return Ok(false);
        };
        debug!(worker = idx, cycle, command = %line, "executing");

        match self.executor.execute(&line, &self.shutdown) {
            Ok(output) => {
                self.counters.successful.fetch_add(1, Ordering::Relaxed);
                let outcome = self.learner.update(&self.state, &output, &command)?;
                let average = {
                    let mut tracker = self.state.trend()?;
                    tracker.update(outcome.reward);
                    tracker.moving_average()
                };
                info!(
                    worker = idx,
                    command = %line,
                    reward = outcome.reward,
                    redundant = outcome.redundant,
                    average,
                    bytes = output.len(),
                    output = %output_preview(&output, self.config.output_preview_bytes),
                    "learned"
                );
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker = idx, command = %line, error = %e, "command failed");
            }
        }
        Ok(true)
    }

    fn cycles_exhausted(&self) -> bool {
        self.config
            .max_cycles
            .is_some_and(|max| self.counters.cycles.load(Ordering::SeqCst) >= max)
    }

    fn claim_cycle(&self) -> Option<u64> {
        let max = self.config.max_cycles;
        self.counters
            .cycles
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match max {
                Some(max) if n >= max => None,
                _ => Some(n + 1),
            })
            .ok()
            .map(|prev| prev + 1)
    }

    fn tuner_loop(&self) -> AmoebaResult<()> {
        debug!(interval_ms = self.config.tuner_interval_ms, "tuner started");
        while self.shutdown.sleep(self.config.tuner_interval()) {
            tune_once(&self.state)?;
        }
        debug!("tuner stopping");
        Ok(())
    }
}

/// Applies one tuner step: nudges the desired length by the trend's sign.
///
/// Returns the old and new length when the trend was not flat.
pub fn tune_once(state: &SharedState) -> AmoebaResult<Option<(usize, usize)>> {
    let trend = state.trend()?.trend();
    if trend == Trend::Flat {
        return Ok(None);
    }
    let (before, after) = {
        let mut settings = state.settings()?;
        let before = settings.length();
        (before, settings.nudge_length(trend.signum()))
    };
    if before != after {
        info!(%trend, from = before, to = after, "tuned command length");
    }
    Ok(Some((before, after)))
}
