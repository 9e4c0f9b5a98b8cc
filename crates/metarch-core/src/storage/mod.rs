//! Registry persistence
//!
//! The registry itself lives in memory; a [`RegistryStore`] loads a snapshot
//! at startup and saves one back after mutating actions.
//!
//! # Backends
//!
//! - `sqlite`: one row per worker, upserted in a single transaction
//! - `json`: one document keyed by worker id, replaced atomically
//!
//! # Usage
//!
//! ```ignore
//! use metarch_core::storage::{open_store, RegistryStore};
//!
//! let store = open_store(config.storage.backend, &config.data_dir()?).await?;
//! let registry = WorkerRegistry::from_records(store.load_all().await?)?;
//! // ...
//! store.save_all(&registry.snapshot().await).await?;
//! ```

mod json;
mod sqlite;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::routing::WorkerRecord;

pub use json::JsonRegistryStore;
pub use sqlite::{SqliteRegistryStore, CREATE_WORKERS_TABLE_SQL};

/// File name of the SQLite database inside the data directory
pub const SQLITE_FILE: &str = "registry.db";
/// File name of the JSON document inside the data directory
pub const JSON_FILE: &str = "agent_registry.json";

/// Persistence collaborator for registry snapshots
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Load every persisted worker record
    async fn load_all(&self) -> Result<Vec<WorkerRecord>>;

    /// Persist the given records
    async fn save_all(&self, records: &[WorkerRecord]) -> Result<()>;
}

/// Which store backs the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Json,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown storage backend: {} (expected sqlite or json)", s)),
        }
    }
}

/// Open the store for `backend` inside `data_dir`
pub async fn open_store(backend: StorageBackend, data_dir: &Path) -> Result<Box<dyn RegistryStore>> {
    match backend {
        StorageBackend::Sqlite => {
            let store = SqliteRegistryStore::connect(&data_dir.join(SQLITE_FILE)).await?;
            Ok(Box::new(store))
        }
        StorageBackend::Json => Ok(Box::new(JsonRegistryStore::new(data_dir.join(JSON_FILE)))),
    }
}
