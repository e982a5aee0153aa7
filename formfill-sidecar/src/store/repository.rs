use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::models::MappingSet;

/// Default database location under the platform data directory
pub fn default_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| anyhow!("Could not find data directory"))?;
    Ok(data_dir.join("formfill").join("mappings.db"))
}

/// SQLite persistence for mapping sets, one row per origin
#[derive(Clone)]
pub struct MappingRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MappingRepository {
    /// Open (or create) the database at `path` and initialize the schema
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open mapping database at {}", path.display()))?;

        let repo = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS mapping_sets (
                origin TEXT PRIMARY KEY,
                source_url TEXT NOT NULL,
                trained_at TEXT NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_mapping_sets_trained_at ON mapping_sets(trained_at DESC);
            "#,
        )?;

        Ok(())
    }

    /// Insert or replace the set stored for its origin
    pub fn save(&self, set: &MappingSet) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;

        conn.execute(
            r#"
            INSERT INTO mapping_sets (origin, source_url, trained_at, payload)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(origin) DO UPDATE SET
                source_url = excluded.source_url,
                trained_at = excluded.trained_at,
                payload = excluded.payload
            "#,
            params![
                set.origin,
                set.source_url,
                set.trained_at.to_rfc3339(),
                serde_json::to_string(set)?,
            ],
        )?;

        Ok(())
    }

    pub fn load(&self, origin: &str) -> Result<Option<MappingSet>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;

        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM mapping_sets WHERE origin = ?1",
                params![origin],
                |row| row.get(0),
            )
            .optional()?;

        payload
            .map(|p| serde_json::from_str(&p).context("Corrupt mapping set payload"))
            .transpose()
    }

    /// Every stored set. Rows whose payload no longer parses are skipped.
    pub fn load_all(&self) -> Result<Vec<MappingSet>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare("SELECT origin, payload FROM mapping_sets ORDER BY origin ASC")?;
        let rows: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();

        let sets = rows
            .into_iter()
            .filter_map(|(origin, payload)| match serde_json::from_str::<MappingSet>(&payload) {
                Ok(set) => Some(set),
                Err(e) => {
                    tracing::warn!("Skipping unreadable mapping set for {}: {}", origin, e);
                    None
                }
            })
            .collect();

        Ok(sets)
    }

    pub fn delete(&self, origin: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock error: {}", e))?;
        let deleted = conn.execute("DELETE FROM mapping_sets WHERE origin = ?1", params![origin])?;
        Ok(deleted > 0)
    }
}
