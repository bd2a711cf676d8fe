//! Experiment Store - durable designs and results
//!
//! Both collections are held in memory and rewritten in full on every
//! mutation. Writes go to a temporary file that is renamed over the target,
//! so a crash mid-write leaves the previous snapshot intact.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{ExperimentDesign, ExperimentDesignBuilder, ExperimentResults};
use crate::config::EngineConfig;
use crate::{Error, Result};

/// Attempts at drawing an unused experiment id before giving up
const MAX_ID_ATTEMPTS: usize = 8;

#[derive(Debug, Clone)]
struct StoreLocation {
    designs_path: PathBuf,
    results_path: PathBuf,
}

/// Designs and results keyed by experiment id.
///
/// ## Design
///
/// The store uses hash maps for O(1) lookups by ID. When opened on a data
/// directory it persists `designs.json` and `results.json`; a store created
/// with [`ExperimentStore::new`] never touches the filesystem.
///
/// A failed write keeps the in-memory mutation and reports
/// [`Error::Persistence`]; the next successful write (or [`flush`](Self::flush))
/// brings the files up to date.
#[derive(Debug, Default)]
pub struct ExperimentStore {
    designs: HashMap<String, ExperimentDesign>,
    results: HashMap<String, ExperimentResults>,
    location: Option<StoreLocation>,
}

impl ExperimentStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the store rooted at `data_dir`, loading whatever it already holds.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing collection cannot be read or decoded.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let location = StoreLocation {
            designs_path: data_dir.join("designs.json"),
            results_path: data_dir.join("results.json"),
        };
        let (designs, results) = Self::load_all(&location.designs_path, &location.results_path)?;
        info!(
            data_dir = %data_dir.display(),
            designs = designs.len(),
            results = results.len(),
            "experiment store opened"
        );
        Ok(Self {
            designs,
            results,
            location: Some(location),
        })
    }

    /// Open the store described by `config` (in-memory when persistence is off).
    ///
    /// # Errors
    ///
    /// Returns an error if an existing collection cannot be read or decoded.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        if config.persist {
            Self::open(&config.data_dir)
        } else {
            Ok(Self::new())
        }
    }

    /// Read both durable collections. Missing files count as empty.
    ///
    /// Results without a matching design are dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if a file exists but cannot be read or decoded.
    pub fn load_all(
        designs_path: &Path,
        results_path: &Path,
    ) -> Result<(
        HashMap<String, ExperimentDesign>,
        HashMap<String, ExperimentResults>,
    )> {
        let designs: HashMap<String, ExperimentDesign> = read_collection(designs_path)?;
        let mut results: HashMap<String, ExperimentResults> = read_collection(results_path)?;
        results.retain(|id, _| {
            let known = designs.contains_key(id);
            if !known {
                warn!(experiment_id = %id, "dropping stored result without a design");
            }
            known
        });
        Ok((designs, results))
    }

    /// Whether designs and results are written to disk.
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        self.location.is_some()
    }

    /// Check if the store is empty (no designs or results).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.designs.is_empty() && self.results.is_empty()
    }

    /// Get the number of designs in the store.
    #[must_use]
    pub fn design_count(&self) -> usize {
        self.designs.len()
    }

    /// Get the number of results in the store.
    #[must_use]
    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    /// Validate a design, assign it a fresh id and persist it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a malformed design, or
    /// [`Error::Persistence`] if the design was stored in memory but could not
    /// be written.
    pub fn create_design(&mut self, builder: ExperimentDesignBuilder) -> Result<ExperimentDesign> {
        let id = std::iter::repeat_with(super::design::generate_experiment_id)
            .take(MAX_ID_ATTEMPTS)
            .find(|id| !self.designs.contains_key(id))
            .ok_or_else(|| {
                Error::Validation("could not allocate a unique experiment id".to_string())
            })?;
        let design = builder.build_with_id(id)?;

        let id = design.experiment_id().to_string();
        self.designs.insert(id.clone(), design.clone());
        info!(experiment_id = %id, name = design.name(), kind = %design.kind(), "design created");

        self.persist_designs().map_err(|source| Error::Persistence {
            experiment_id: id,
            source,
        })?;
        Ok(design)
    }

    /// Get a design by ID.
    #[must_use]
    pub fn get_design(&self, experiment_id: &str) -> Option<&ExperimentDesign> {
        self.designs.get(experiment_id)
    }

    /// All designs, oldest first.
    #[must_use]
    pub fn list_designs(&self) -> Vec<&ExperimentDesign> {
        let mut designs: Vec<&ExperimentDesign> = self.designs.values().collect();
        designs.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.experiment_id().cmp(b.experiment_id()))
        });
        designs
    }

    /// Record finalized results.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no design exists for the id,
    /// [`Error::Validation`] if results were already recorded, or
    /// [`Error::Persistence`] if the results were kept in memory but could not
    /// be written.
    pub fn save_result(&mut self, result: ExperimentResults) -> Result<()> {
        let id = result.experiment_id.clone();
        if !self.designs.contains_key(&id) {
            return Err(Error::NotFound(id));
        }
        if self.results.contains_key(&id) {
            return Err(Error::Validation(format!(
                "results for experiment {id} are already recorded and immutable"
            )));
        }

        debug!(experiment_id = %id, outcome = %result.outcome, "saving result");
        self.results.insert(id.clone(), result);
        self.persist_results().map_err(|source| Error::Persistence {
            experiment_id: id,
            source,
        })
    }

    /// Get results by experiment ID.
    #[must_use]
    pub fn get_result(&self, experiment_id: &str) -> Option<&ExperimentResults> {
        self.results.get(experiment_id)
    }

    /// All results, most recently completed first.
    #[must_use]
    pub fn list_results(&self) -> Vec<&ExperimentResults> {
        let mut results: Vec<&ExperimentResults> = self.results.values().collect();
        results.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        results
    }

    /// Rewrite both collections.
    ///
    /// # Errors
    ///
    /// Returns an IO error if either collection cannot be written.
    pub fn flush(&self) -> Result<()> {
        self.persist_designs()?;
        self.persist_results()?;
        Ok(())
    }

    fn persist_designs(&self) -> io::Result<()> {
        match &self.location {
            Some(location) => write_collection(&location.designs_path, &self.designs),
            None => Ok(()),
        }
    }

    fn persist_results(&self) -> io::Result<()> {
        match &self.location {
            Some(location) => write_collection(&location.results_path, &self.results),
            None => Ok(()),
        }
    }
}

fn read_collection<T: DeserializeOwned>(path: &Path) -> Result<HashMap<String, T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_collection<T: Serialize>(path: &Path, collection: &HashMap<String, T>) -> io::Result<()> {
    // Sorted keys keep the files diffable.
    let sorted: BTreeMap<&String, &T> = collection.iter().collect();
    let bytes = serde_json::to_vec_pretty(&sorted)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_atomic(path, &bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}
