//! End-to-end runs of the worker pool over the real sandbox.

use std::time::{Duration, Instant};

use amoeba::{
    AmoebaConfig, Learner, Lexicon, ObservationStore, ProcessSandbox, Runtime, RuntimeConfig,
    SandboxConfig, SharedState, Shutdown,
};

fn runtime(tokens: &[&str], cycles: u64, workers: usize) -> Runtime<ProcessSandbox> {
    let config = AmoebaConfig::default();
    let lexicon = Lexicon::with_tokens(tokens.iter().copied()).unwrap();
    let state = SharedState::from_config(&config, lexicon, ObservationStore::new());
    Runtime::new(
        state,
        ProcessSandbox::new(SandboxConfig {
            runtime_budget_ms: 2_000,
            poll_interval_ms: 20,
            ..SandboxConfig::default()
        }),
        Learner::new(config.learning, &config.limits),
        RuntimeConfig {
            workers,
            max_cycles: Some(cycles),
            tuner_interval_ms: 50,
            ..RuntimeConfig::default()
        },
        Shutdown::new(),
    )
}

#[test]
fn test_bounded_run_learns_from_echo() {
    let runtime = runtime(&["echo", "hello", "world", "true"], 40, 4);
    let summary = runtime.run().unwrap();

    assert_eq!(summary.cycles, 40);
    assert_eq!(summary.successful + summary.failed, 40);
    assert!(summary.successful > 0);

    let state = runtime.into_state().unwrap();
    let (lexicon, observations) = state.into_stores().unwrap();
    assert_eq!(lexicon.vocabulary.len(), 4);
    // Only the original vocabulary can appear in stored lines.
    assert!(observations.iter().all(|line| line.tokens().iter().all(|&id| id < 4)));
    assert!(lexicon.associations.iter().all(|(_, value)| value != 0));
}

#[test]
fn test_external_shutdown_stops_unbounded_run() {
    let config = AmoebaConfig::default();
    let lexicon = Lexicon::with_tokens(["true"]).unwrap();
    let state = SharedState::from_config(&config, lexicon, ObservationStore::new());
    let shutdown = Shutdown::new();
    let runtime = Runtime::new(
        state,
        ProcessSandbox::new(config.sandbox.clone()),
        Learner::new(config.learning, &config.limits),
        RuntimeConfig {
            workers: 2,
            ..RuntimeConfig::default()
        },
        shutdown.clone(),
    );

    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        shutdown.request();
    });
    let started = Instant::now();
    let summary = runtime.run().unwrap();
    stopper.join().unwrap();

    assert!(summary.cycles > 0);
    assert!(started.elapsed() < Duration::from_secs(10));
}
