pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub study_sets: sled::Tree,
    pub terms: sled::Tree,
    pub studiable_terms: sled::Tree,
    pub containers: sled::Tree,
    pub config_versions: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("CAS retry exhausted after {attempts} attempts: entity={entity}, key={key}")]
    CasRetryExhausted {
        entity: String,
        key: String,
        attempts: u32,
    },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let study_sets = db.open_tree(trees::STUDY_SETS)?;
        let terms = db.open_tree(trees::TERMS)?;
        let studiable_terms = db.open_tree(trees::STUDIABLE_TERMS)?;
        let containers = db.open_tree(trees::CONTAINERS)?;
        let config_versions = db.open_tree(trees::CONFIG_VERSIONS)?;

        Ok(Self {
            db,
            study_sets,
            terms,
            studiable_terms,
            containers,
            config_versions,
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        let applied = migrate::run(self)?;
        tracing::debug!(applied, "Migrations checked");
        Ok(())
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn raw_db(&self) -> &Db {
        &self.db
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

pub(crate) fn map_tx_error(error: sled::transaction::TransactionError<StoreError>) -> StoreError {
    match error {
        sled::transaction::TransactionError::Abort(store_error) => store_error,
        sled::transaction::TransactionError::Storage(storage_error) => {
            StoreError::Sled(storage_error)
        }
    }
}
