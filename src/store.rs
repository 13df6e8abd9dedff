//! Persistence of the ledger and the survey configuration.
//!
//! Storage is a flat key-value space of JSON documents. Both documents are read
//! once at startup and written back after every mutation. A document that
//! cannot be read or decoded is replaced by its default and a warning is logged.

use crate::ledger::Ledger;
use crate::reading::Measurement;
use crate::survey::{DEFAULT_ELECTRODE_SPACING, SurveyConfig, validate_spacing};
use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Key of the persisted measurement list.
pub const MEASUREMENTS_KEY: &str = "ert-measurements";

/// Key of the persisted survey configuration.
pub const CONFIG_KEY: &str = "ert-config";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid stored document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Key-value storage of serialized documents.
pub trait Store: Send {
    /// Read the document stored under `key`, `None` if there is none.
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the document stored under `key`.
    fn save(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Store for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        // Write then rename so a crash never leaves a truncated document.
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Volatile store, used in tests and when persistence is not wanted.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

fn load_json<T: DeserializeOwned>(store: &dyn Store, key: &str) -> Result<Option<T>, StoreError> {
    match store.load(key)? {
        Some(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        None => Ok(None),
    }
}

fn save_json<T: Serialize + ?Sized>(
    store: &mut dyn Store,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let contents = serde_json::to_string_pretty(value)?;
    store.save(key, &contents)
}

/// Restore the ledger, or an empty one if nothing usable is stored.
pub fn load_ledger(store: &dyn Store) -> Ledger {
    match load_json::<Vec<Measurement>>(store, MEASUREMENTS_KEY) {
        Ok(Some(measurements)) => Ledger::from_measurements(measurements),
        Ok(None) => Ledger::new(),
        Err(e) => {
            warn!("Could not restore measurements, starting empty: {}", e);
            Ledger::new()
        }
    }
}

pub fn save_ledger(store: &mut dyn Store, ledger: &Ledger) -> Result<(), StoreError> {
    save_json(store, MEASUREMENTS_KEY, ledger.measurements())
}

/// Restore the survey configuration, or the defaults if nothing usable is stored.
pub fn load_config(store: &dyn Store) -> SurveyConfig {
    match load_json::<SurveyConfig>(store, CONFIG_KEY) {
        Ok(Some(mut config)) => {
            if let Err(e) = validate_spacing(config.electrode_spacing) {
                warn!("{}, using {} m", e, DEFAULT_ELECTRODE_SPACING);
                config.electrode_spacing = DEFAULT_ELECTRODE_SPACING;
            }
            config
        }
        Ok(None) => SurveyConfig::default(),
        Err(e) => {
            warn!("Could not restore survey configuration, using defaults: {}", e);
            SurveyConfig::default()
        }
    }
}

pub fn save_config(store: &mut dyn Store, config: &SurveyConfig) -> Result<(), StoreError> {
    save_json(store, CONFIG_KEY, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::ArrayType;
    use crate::test_utils::sample_measurements;

    #[test]
    fn test_ledger_round_trip() {
        let mut store = MemoryStore::new();
        let ledger = Ledger::from_measurements(sample_measurements(3));

        save_ledger(&mut store, &ledger).unwrap();
        let restored = load_ledger(&store);

        assert_eq!(restored.measurements(), ledger.measurements());
    }

    #[test]
    fn test_ledger_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("data"));
        let ledger = Ledger::from_measurements(sample_measurements(5));

        save_ledger(&mut store, &ledger).unwrap();
        assert!(dir.path().join("data/ert-measurements.json").exists());

        let reopened = JsonFileStore::new(dir.path().join("data"));
        assert_eq!(load_ledger(&reopened).measurements(), ledger.measurements());
    }

    #[test]
    fn test_missing_documents_give_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(load_ledger(&store).is_empty());
        assert_eq!(load_config(&store), SurveyConfig::default());
    }

    #[test]
    fn test_corrupt_document_falls_back() {
        let mut store = MemoryStore::new();
        store.save(MEASUREMENTS_KEY, "{not json").unwrap();
        store.save(CONFIG_KEY, "[1, 2]").unwrap();

        assert!(load_ledger(&store).is_empty());
        assert_eq!(load_config(&store), SurveyConfig::default());
    }

    #[test]
    fn test_config_round_trip() {
        let mut store = MemoryStore::new();
        let config = SurveyConfig {
            array_type: ArrayType::Wenner,
            electrode_spacing: 2.5,
            project_name: "Quarry".to_string(),
            operator: "Sam".to_string(),
        };

        save_config(&mut store, &config).unwrap();
        assert_eq!(load_config(&store), config);
    }

    #[test]
    fn test_config_document_shape() {
        let mut store = MemoryStore::new();
        save_config(&mut store, &SurveyConfig::default()).unwrap();
        let raw = store.load(CONFIG_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(value["electrodeSpacing"], 1.0);
        assert_eq!(value["projectName"], "ERT Survey");
    }

    #[test]
    fn test_unknown_array_type_falls_back_to_dipole_dipole() {
        let mut store = MemoryStore::new();
        store
            .save(
                CONFIG_KEY,
                r#"{"arrayType":"pole-pole","electrodeSpacing":3.0,"projectName":"P","operator":"O"}"#,
            )
            .unwrap();

        let config = load_config(&store);
        assert_eq!(config.array_type, ArrayType::DipoleDipole);
        assert_eq!(config.electrode_spacing, 3.0);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let mut store = MemoryStore::new();
        store.save(CONFIG_KEY, r#"{"projectName":"Ridge"}"#).unwrap();

        let config = load_config(&store);
        assert_eq!(config.project_name, "Ridge");
        assert_eq!(config.operator, "Operator");
    }

    #[test]
    fn test_invalid_spacing_falls_back_to_default() {
        let mut store = MemoryStore::new();
        for spacing in ["0", "-2.5"] {
            let doc = format!(r#"{{"electrodeSpacing":{},"projectName":"Ridge"}}"#, spacing);
            store.save(CONFIG_KEY, &doc).unwrap();

            let config = load_config(&store);
            assert_eq!(config.electrode_spacing, DEFAULT_ELECTRODE_SPACING);
            assert_eq!(config.project_name, "Ridge");
        }
    }
}
