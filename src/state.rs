//! Shared learned state.
//!
//! Four independent locks guard the lexicon (vocabulary + associations), the
//! observation store, the command settings, and the trend tracker. When two
//! are needed together the lexicon is always taken before the settings; no
//! other pair is ever held at once.

use std::sync::{Mutex, MutexGuard};

use crate::config::AmoebaConfig;
use crate::error::{AmoebaError, AmoebaResult};
use crate::observation::ObservationStore;
use crate::settings::CommandSettings;
use crate::trend::TrendTracker;
use crate::vocabulary::Lexicon;

fn lock_err(context: &'static str) -> AmoebaError {
    AmoebaError::internal(format!("poisoned lock: {context}"))
}

/// State owned by the orchestrator and borrowed by workers and the tuner.
#[derive(Debug)]
pub struct SharedState {
    lexicon: Mutex<Lexicon>,
    observations: Mutex<ObservationStore>,
    settings: Mutex<CommandSettings>,
    trend: Mutex<TrendTracker>,
}

impl SharedState {
    /// Bundles already-built components.
    #[must_use]
    pub fn new(
        lexicon: Lexicon,
        observations: ObservationStore,
        settings: CommandSettings,
        trend: TrendTracker,
    ) -> Self {
        Self {
            lexicon: Mutex::new(lexicon),
            observations: Mutex::new(observations),
            settings: Mutex::new(settings),
            trend: Mutex::new(trend),
        }
    }

    /// Builds settings and tracker from `config` around loaded stores.
    #[must_use]
    pub fn from_config(config: &AmoebaConfig, lexicon: Lexicon, observations: ObservationStore) -> Self {
        let limits = config.limits;
        let scope = limits.clamp_scope(i64::from(config.runtime.default_scope));
        let settings = CommandSettings::new(config.runtime.default_length, scope, limits);
        let trend = TrendTracker::new(config.learning.trend_window, config.learning.trend_epsilon);
        Self::new(lexicon, observations, settings, trend)
    }

    /// Locks the lexicon.
    pub fn lexicon(&self) -> AmoebaResult<MutexGuard<'_, Lexicon>> {
        self.lexicon.lock().map_err(|_| lock_err("lexicon"))
    }

    /// Locks the observation store.
    pub fn observations(&self) -> AmoebaResult<MutexGuard<'_, ObservationStore>> {
        self.observations.lock().map_err(|_| lock_err("observations"))
    }

    /// Locks the command settings.
    pub fn settings(&self) -> AmoebaResult<MutexGuard<'_, CommandSettings>> {
        self.settings.lock().map_err(|_| lock_err("settings"))
    }

    /// Locks the trend tracker.
    pub fn trend(&self) -> AmoebaResult<MutexGuard<'_, TrendTracker>> {
        self.trend.lock().map_err(|_| lock_err("trend"))
    }

    /// Takes the lexicon and observations back once no thread uses the state.
    pub fn into_stores(self) -> AmoebaResult<(Lexicon, ObservationStore)> {
        let lexicon = self.lexicon.into_inner().map_err(|_| lock_err("lexicon"))?;
        let observations = self
            .observations
            .into_inner()
            .map_err(|_| lock_err("observations"))?;
        Ok((lexicon, observations))
    }
}
