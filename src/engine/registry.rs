//! Experiment Registry - in-memory map of running experiments
//!
//! Entries are sharded by `DashMap`, so operations on different experiment
//! ids do not contend, while every operation on one id (start, record,
//! stop) holds that entry's shard lock for its whole read-modify-write.
//!
//! Taking an experiment out to stop it leaves a `Stopping` slot behind until
//! [`release`](ExperimentRegistry::release) is called once its results are
//! stored. A stopping id is invisible to lookups but still blocks `start`.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::experiment::RunningExperiment;
use crate::{Error, Result};

#[derive(Debug)]
enum Slot {
    Running(RunningExperiment),
    Stopping,
}

impl Slot {
    const fn running(&self) -> Option<&RunningExperiment> {
        match self {
            Self::Running(run) => Some(run),
            Self::Stopping => None,
        }
    }
}

/// Running experiments keyed by experiment id.
#[derive(Debug, Default)]
pub struct ExperimentRegistry {
    slots: DashMap<String, Slot>,
}

impl ExperimentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of running experiments (stopping ones excluded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| entry.value().running().is_some())
            .count()
    }

    /// Whether nothing is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots
            .iter()
            .all(|entry| entry.value().running().is_none())
    }

    /// Whether `experiment_id` is running.
    #[must_use]
    pub fn contains(&self, experiment_id: &str) -> bool {
        self.slots
            .get(experiment_id)
            .is_some_and(|entry| entry.value().running().is_some())
    }

    /// Register a freshly started experiment.
    ///
    /// `admit` runs under the entry lock, after the id is known to be free,
    /// and may veto the start.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if the id is registered,
    /// [`Error::Validation`] if it is being stopped, or whatever `admit` returns.
    pub fn insert_new(
        &self,
        run: RunningExperiment,
        admit: impl FnOnce() -> Result<()>,
    ) -> Result<()> {
        match self.slots.entry(run.experiment_id().to_string()) {
            Entry::Occupied(entry) => match entry.get() {
                Slot::Running(_) => Err(Error::AlreadyRunning(entry.key().clone())),
                Slot::Stopping => Err(Error::Validation(format!(
                    "experiment {} is being stopped; its results are immutable",
                    entry.key()
                ))),
            },
            Entry::Vacant(entry) => {
                admit()?;
                entry.insert(Slot::Running(run));
                Ok(())
            }
        }
    }

    /// Run `f` with shared access to one running entry.
    pub fn with_entry<R>(
        &self,
        experiment_id: &str,
        f: impl FnOnce(&RunningExperiment) -> R,
    ) -> Option<R> {
        self.slots
            .get(experiment_id)
            .and_then(|entry| entry.value().running().map(f))
    }

    /// Run `f` with exclusive access to one running entry.
    ///
    /// `f` must not call back into the registry: the shard lock is held.
    pub fn with_entry_mut<R>(
        &self,
        experiment_id: &str,
        f: impl FnOnce(&mut RunningExperiment) -> R,
    ) -> Option<R> {
        let mut entry = self.slots.get_mut(experiment_id)?;
        match entry.value_mut() {
            Slot::Running(run) => Some(f(run)),
            Slot::Stopping => None,
        }
    }

    /// Take a running entry out, leaving the id in the stopping state.
    pub fn take(&self, experiment_id: &str) -> Option<RunningExperiment> {
        self.take_if(experiment_id, |_| Ok::<(), ()>(()))
            .and_then(std::result::Result::ok)
    }

    /// Take a running entry out only if `check` accepts it, atomically with
    /// the check. On success the id stays in the stopping state.
    ///
    /// Returns `None` if the id is not running.
    pub fn take_if<E>(
        &self,
        experiment_id: &str,
        check: impl FnOnce(&RunningExperiment) -> std::result::Result<(), E>,
    ) -> Option<std::result::Result<RunningExperiment, E>> {
        let mut entry = self.slots.get_mut(experiment_id)?;
        let Slot::Running(run) = entry.value() else {
            return None;
        };
        if let Err(e) = check(run) {
            return Some(Err(e));
        }
        match std::mem::replace(entry.value_mut(), Slot::Stopping) {
            Slot::Running(run) => Some(Ok(run)),
            Slot::Stopping => None,
        }
    }

    /// Drop the stopping state of an id whose results are stored.
    pub fn release(&self, experiment_id: &str) {
        self.slots
            .remove_if(experiment_id, |_, slot| matches!(slot, Slot::Stopping));
    }

    /// Map every running entry through `f`; shard locks are released before returning.
    pub fn snapshot<R>(&self, f: impl Fn(&RunningExperiment) -> R) -> Vec<R> {
        self.slots
            .iter()
            .filter_map(|entry| entry.value().running().map(&f))
            .collect()
    }
}
