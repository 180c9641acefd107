//! # Amoeba - a self-teaching command explorer
//!
//! Amoeba composes shell commands from a vocabulary of known words, runs them
//! in a supervised sandbox, and learns from the output. Word pairs that
//! produce novel output are reinforced; pairs that keep producing the same
//! output are penalized. A tuner watches the reward trend and lengthens or
//! shortens the commands it builds.
//!
//! ## Core Concepts
//!
//! - **Lexicon**: the vocabulary plus a sparse association store keyed on
//!   `(word, position, other word, other position)`
//! - **Observation store**: tokenized past outputs used to detect redundancy
//! - **Sandbox**: `/bin/sh -c` in its own process group with a runtime budget
//!   and SIGTERM/SIGKILL escalation
//! - **Runtime**: bounded worker pool plus a periodic tuner
//!
//! ## Usage
//!
//! ```rust,no_run
//! use amoeba::{
//!     AmoebaConfig, Learner, Lexicon, ObservationStore, ProcessSandbox, Runtime, SharedState,
//!     Shutdown,
//! };
//!
//! let config = AmoebaConfig::default();
//! let lexicon = Lexicon::with_tokens(["echo", "hello", "ls"])?;
//! let state = SharedState::from_config(&config, lexicon, ObservationStore::new());
//! let runtime = Runtime::new(
//!     state,
//!     ProcessSandbox::new(config.sandbox.clone()),
//!     Learner::new(config.learning, &config.limits),
//!     config.runtime.clone(),
//!     Shutdown::new(),
//! );
//! let summary = runtime.run()?;
//! println!("{} cycles, trend {}", summary.cycles, summary.trend);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(not(unix))]
compile_error!("amoeba supervises POSIX process groups and needs a Unix-like platform");

// Learned state
pub mod assoc;
pub mod observation;
pub mod settings;
pub mod trend;
pub mod vocabulary;

// Ambient
pub mod config;
pub mod error;
pub mod shutdown;

// Behaviour
pub mod command;
pub mod learning;
pub mod sandbox;
pub mod state;

// Orchestration and I/O
pub mod engine;
pub mod seed;
pub mod storage;

pub use assoc::{AssocKey, AssocStore};
pub use command::{build_command, construct_command, render_command};
pub use config::{
    AmoebaConfig, LearningConfig, Limits, RuntimeConfig, SandboxConfig, SeedConfig, StorageConfig,
};
pub use engine::{RunSummary, Runtime};
pub use error::{AmoebaError, AmoebaResult, ExecError, StorageError, ValidationError};
pub use learning::{Learner, LearningOutcome};
pub use observation::{ObservationLine, ObservationStore, SimilarityMatch};
pub use sandbox::{CommandExecutor, ProcessSandbox};
pub use seed::{search_path_or_default, seed_from_search_path, SeedReport};
pub use settings::CommandSettings;
pub use shutdown::{install_signal_handlers, Shutdown};
pub use state::SharedState;
pub use storage::{load_snapshot, write_snapshot, DataDirLock, SnapshotPaths};
pub use trend::{Trend, TrendTracker};
pub use vocabulary::{Lexicon, TokenId, Vocabulary};
