//! SQLite-backed registry store

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::RegistryStore;
use crate::error::{Error, Result};
use crate::routing::{
    CapabilityDescriptor, ComplexityRange, PerformanceStats, WorkerRecord,
};

/// Schema for the worker table
pub const CREATE_WORKERS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS workers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    prompt_template TEXT,
    domain_tags TEXT NOT NULL,
    complexity_min REAL NOT NULL,
    complexity_max REAL NOT NULL,
    operations TEXT NOT NULL,
    origin TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    status TEXT NOT NULL,
    invocation_count INTEGER NOT NULL DEFAULT 0,
    success_count INTEGER NOT NULL DEFAULT 0,
    cumulative_latency_ms INTEGER NOT NULL DEFAULT 0,
    rolling_quality REAL,
    last_used DATETIME,
    created_at DATETIME NOT NULL,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_workers_status ON workers(status);
"#;

const UPSERT_WORKER_SQL: &str = r#"
INSERT INTO workers (
    id, name, description, prompt_template, domain_tags, complexity_min, complexity_max,
    operations, origin, version, status, invocation_count, success_count,
    cumulative_latency_ms, rolling_quality, last_used, created_at, updated_at
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
ON CONFLICT(id) DO UPDATE SET
    name = excluded.name,
    description = excluded.description,
    prompt_template = excluded.prompt_template,
    domain_tags = excluded.domain_tags,
    complexity_min = excluded.complexity_min,
    complexity_max = excluded.complexity_max,
    operations = excluded.operations,
    origin = excluded.origin,
    version = excluded.version,
    status = excluded.status,
    invocation_count = excluded.invocation_count,
    success_count = excluded.success_count,
    cumulative_latency_ms = excluded.cumulative_latency_ms,
    rolling_quality = excluded.rolling_quality,
    last_used = excluded.last_used,
    updated_at = CURRENT_TIMESTAMP
"#;

/// Store for persisting the worker registry in SQLite
#[derive(Debug, Clone)]
pub struct SqliteRegistryStore {
    pool: SqlitePool,
}

impl SqliteRegistryStore {
    /// Create a store from an existing connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to (creating if needed) the database file and initialize the schema
    pub async fn connect(database_path: &Path) -> Result<Self> {
        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(Error::DatabaseError)?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// In-memory store, for tests
    pub async fn in_memory() -> Result<Self> {
        // Each connection to :memory: is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(Error::DatabaseError)?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Initialize the database schema
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_WORKERS_TABLE_SQL)
            .execute(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        debug!("Worker table initialized");
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for SqliteRegistryStore {
    async fn load_all(&self) -> Result<Vec<WorkerRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, prompt_template, domain_tags, complexity_min, complexity_max,
                   operations, origin, version, status, invocation_count, success_count,
                   cumulative_latency_ms, rolling_quality, last_used, created_at
            FROM workers
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        let records = rows.iter().map(record_from_row).collect::<Result<Vec<_>>>()?;

        info!(count = records.len(), "Loaded workers from database");
        Ok(records)
    }

    async fn save_all(&self, records: &[WorkerRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(Error::DatabaseError)?;

        for record in records {
            let descriptor = &record.descriptor;
            sqlx::query(UPSERT_WORKER_SQL)
                .bind(&descriptor.id)
                .bind(&descriptor.name)
                .bind(&descriptor.description)
                .bind(&descriptor.prompt_template)
                .bind(serde_json::to_string(&descriptor.domain_tags)?)
                .bind(descriptor.complexity.min)
                .bind(descriptor.complexity.max)
                .bind(serde_json::to_string(&descriptor.operations)?)
                .bind(descriptor.origin.to_string())
                .bind(i64::from(descriptor.version))
                .bind(record.status.to_string())
                .bind(to_i64(record.stats.invocation_count))
                .bind(to_i64(record.stats.success_count))
                .bind(to_i64(record.stats.cumulative_latency_ms))
                .bind(record.stats.rolling_quality)
                .bind(record.stats.last_used)
                .bind(descriptor.created_at)
                .execute(&mut *tx)
                .await
                .map_err(Error::DatabaseError)?;
        }

        tx.commit().await.map_err(Error::DatabaseError)?;

        info!(count = records.len(), "Saved workers to database");
        Ok(())
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(id: &str, column: &str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| {
        Error::RegistryCorrupted(format!("worker '{}' has negative {} ({})", id, column, value))
    })
}

fn record_from_row(row: &SqliteRow) -> Result<WorkerRecord> {
    let id: String = row.try_get("id")?;
    let corrupted = |field: &str, e: String| {
        Error::RegistryCorrupted(format!("worker '{}' has invalid {}: {}", id, field, e))
    };

    let domain_tags: String = row.try_get("domain_tags")?;
    let operations: String = row.try_get("operations")?;
    let origin: String = row.try_get("origin")?;
    let status: String = row.try_get("status")?;
    let version: i64 = row.try_get("version")?;

    let complexity = ComplexityRange::new(row.try_get("complexity_min")?, row.try_get("complexity_max")?)
        .map_err(|e| corrupted("complexity range", e.to_string()))?;

    let descriptor = CapabilityDescriptor {
        id: id.clone(),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        prompt_template: row.try_get("prompt_template")?,
        domain_tags: serde_json::from_str(&domain_tags)
            .map_err(|e| corrupted("domain_tags", e.to_string()))?,
        complexity,
        operations: serde_json::from_str(&operations)
            .map_err(|e| corrupted("operations", e.to_string()))?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        version: u32::try_from(version).map_err(|e| corrupted("version", e.to_string()))?,
        origin: origin.parse().map_err(|e: String| corrupted("origin", e))?,
    };

    let stats = PerformanceStats {
        invocation_count: to_u64(&id, "invocation_count", row.try_get("invocation_count")?)?,
        success_count: to_u64(&id, "success_count", row.try_get("success_count")?)?,
        cumulative_latency_ms: to_u64(&id, "cumulative_latency_ms", row.try_get("cumulative_latency_ms")?)?,
        rolling_quality: row.try_get("rolling_quality")?,
        last_used: row.try_get::<Option<DateTime<Utc>>, _>("last_used")?,
    };

    Ok(WorkerRecord {
        descriptor,
        stats,
        status: status.parse().map_err(|e: String| corrupted("status", e))?,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::routing::{DescriptorOrigin, Outcome, WorkerStatus};
    use tempfile::tempdir;

    fn sample_records() -> Vec<WorkerRecord> {
        let mut finance = WorkerRecord::new(
            CapabilityDescriptor::new("Finance", ["finance", "data"], ComplexityRange::new(2.0, 8.0).unwrap())
                .with_id("finance-desk")
                .with_operations(["forecast"])
                .with_description("Budgets and forecasts")
                .with_prompt_template("You are a budgeting specialist."),
        );
        finance
            .stats
            .apply(&Outcome::success(Duration::from_millis(120)).with_quality(0.9), 0.2);
        finance.stats.apply(&Outcome::failure(Duration::from_millis(80)), 0.2);

        let mut novel = WorkerRecord::new(
            CapabilityDescriptor::new("Birds", ["quantum-biology"], ComplexityRange::centered(7.0, 2.0))
                .with_id("birds")
                .with_origin(DescriptorOrigin::Synthesized),
        );
        novel.status = WorkerStatus::Deprecated;

        vec![finance, novel]
    }

    #[tokio::test]
    async fn test_save_and_load_preserves_records() {
        let store = SqliteRegistryStore::in_memory().await.unwrap();
        let records = sample_records();

        store.save_all(&records).await.unwrap();
        let loaded = store.load_all().await.unwrap();

        assert_eq!(loaded.len(), 2);
        let birds = &loaded[0];
        assert_eq!(birds.descriptor.id, "birds");
        assert_eq!(birds.status, WorkerStatus::Deprecated);
        assert_eq!(birds.descriptor.origin, DescriptorOrigin::Synthesized);

        let finance = &loaded[1];
        assert_eq!(finance.descriptor.domain_tags, records[0].descriptor.domain_tags);
        assert_eq!(finance.descriptor.description.as_deref(), Some("Budgets and forecasts"));
        assert_eq!(
            finance.descriptor.prompt_template.as_deref(),
            Some("You are a budgeting specialist.")
        );
        assert_eq!(birds.descriptor.prompt_template, None);
        assert_eq!(finance.stats.invocation_count, 2);
        assert_eq!(finance.stats.success_count, 1);
        assert_eq!(finance.stats.cumulative_latency_ms, 200);
        assert_eq!(finance.stats.rolling_quality, Some(0.9));
        assert!(finance.stats.last_used.is_some());
    }

    #[tokio::test]
    async fn test_save_updates_existing_rows() {
        let store = SqliteRegistryStore::in_memory().await.unwrap();
        let mut records = sample_records();
        store.save_all(&records).await.unwrap();

        records[0].stats.apply(&Outcome::success(Duration::from_millis(10)), 0.2);
        store.save_all(&records).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].stats.invocation_count, 3);
    }

    #[tokio::test]
    async fn test_file_store_survives_reconnect() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("registry.db");

        let store = SqliteRegistryStore::connect(&path).await.unwrap();
        store.save_all(&sample_records()).await.unwrap();
        drop(store);

        let reopened = SqliteRegistryStore::connect(&path).await.unwrap();
        assert_eq!(reopened.load_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_database_loads_nothing() {
        let store = SqliteRegistryStore::in_memory().await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }
}
