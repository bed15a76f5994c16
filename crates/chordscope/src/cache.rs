use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::types::AnalysisResult;

/// SQLite-backed cache of analysis results.
///
/// Rows are keyed by `(content_hash, version)`, so bumping the engine version
/// turns every older row into a miss.
pub struct AnalysisCache {
    connection: Mutex<Connection>,
}

impl AnalysisCache {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating cache directory {}", parent.display()))?;
        }
        let connection = Connection::open(db_path).context("opening analysis cache db")?;

        connection
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS analysis (
                    content_hash TEXT NOT NULL,
                    version      INTEGER NOT NULL,
                    created_at   TEXT NOT NULL,
                    result_json  TEXT NOT NULL,
                    PRIMARY KEY (content_hash, version)
                );",
            )
            .context("creating cache table")?;

        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    pub fn get(&self, content_hash: &str, version: u32) -> Result<Option<AnalysisResult>> {
        let conn = self
            .connection
            .lock()
            .map_err(|_| anyhow::anyhow!("cache mutex poisoned"))?;

        let mut stmt = conn.prepare_cached(
            "SELECT result_json FROM analysis WHERE content_hash = ?1 AND version = ?2",
        )?;

        let row = stmt.query_row(rusqlite::params![content_hash, version], |row| {
            row.get::<_, String>(0)
        });

        match row {
            Ok(json) => {
                let result = serde_json::from_str(&json).context("deserializing cached analysis")?;
                Ok(Some(result))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e).context("querying analysis cache"),
        }
    }

    pub fn put(&self, content_hash: &str, version: u32, result: &AnalysisResult) -> Result<()> {
        let json = serde_json::to_string(result).context("serializing analysis for cache")?;
        let now = chrono::Utc::now().to_rfc3339();

        let conn = self
            .connection
            .lock()
            .map_err(|_| anyhow::anyhow!("cache mutex poisoned"))?;

        conn.execute(
            "INSERT OR REPLACE INTO analysis (content_hash, version, created_at, result_json)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![content_hash, version, now, json],
        )
        .context("writing analysis cache")?;

        Ok(())
    }

    /// Drop rows written by other engine versions. Returns the number removed.
    pub fn prune(&self, keep_version: u32) -> Result<usize> {
        let conn = self
            .connection
            .lock()
            .map_err(|_| anyhow::anyhow!("cache mutex poisoned"))?;

        let removed = conn
            .execute("DELETE FROM analysis WHERE version != ?1", rusqlite::params![keep_version])
            .context("pruning analysis cache")?;
        Ok(removed)
    }
}
