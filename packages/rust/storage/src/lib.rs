//! libSQL storage layer (local file, offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding generated project
//! records and the generator output cache. It is the concrete
//! [`ContentStore`] the CLI hands to the generation pipeline.
//!
//! **Access rules:**
//! - `generate` / `batch`: read-write via [`Storage::open`]
//! - `list` / `show`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};
use paperpage_shared::{ContentStore, PaperpageError, ProjectRecord, Result};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// One row of the project listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSummary {
    pub id: String,
    pub title: String,
    pub source_kind: String,
    pub source_locator: String,
    pub created_at: String,
    pub updated_at: String,
}

fn storage_err(e: impl std::fmt::Display) -> PaperpageError {
    PaperpageError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PaperpageError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for reading only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PaperpageError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    PaperpageError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(PaperpageError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    /// Insert or overwrite a project record. `created_at` survives overwrites.
    pub async fn upsert_project(&self, id: &str, record: &ProjectRecord) -> Result<()> {
        self.check_writable()?;
        let record_json = serde_json::to_string(record).map_err(storage_err)?;
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO projects (id, title, source_kind, source_locator, record_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                     title = excluded.title,
                     source_kind = excluded.source_kind,
                     source_locator = excluded.source_locator,
                     record_json = excluded.record_json,
                     updated_at = excluded.updated_at",
                params![
                    id,
                    record.title.as_str(),
                    record.source.kind.as_str(),
                    record.source.locator.as_str(),
                    record_json.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;

        tracing::debug!(id, "project upserted");
        Ok(())
    }

    pub async fn get_project(&self, id: &str) -> Result<Option<ProjectRecord>> {
        let mut rows = self
            .conn
            .query("SELECT record_json FROM projects WHERE id = ?1", params![id])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => {
                let json = row.get::<String>(0).map_err(storage_err)?;
                let record = serde_json::from_str(&json).map_err(|e| {
                    PaperpageError::Storage(format!("corrupt record for project '{id}': {e}"))
                })?;
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// All projects, most recently updated first.
    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, source_kind, source_locator, created_at, updated_at
                 FROM projects ORDER BY updated_at DESC, id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(ProjectSummary {
                id: row.get::<String>(0).map_err(storage_err)?,
                title: row.get::<String>(1).map_err(storage_err)?,
                source_kind: row.get::<String>(2).map_err(storage_err)?,
                source_locator: row.get::<String>(3).map_err(storage_err)?,
                created_at: row.get::<String>(4).map_err(storage_err)?,
                updated_at: row.get::<String>(5).map_err(storage_err)?,
            });
        }
        Ok(results)
    }

    /// Delete a project. Returns whether a row existed.
    pub async fn delete_project(&self, id: &str) -> Result<bool> {
        self.check_writable()?;
        let affected = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?1", params![id])
            .await
            .map_err(storage_err)?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Generation cache
    // -----------------------------------------------------------------------

    pub async fn get_generation_cache(
        &self,
        prompt_hash: &str,
        model_id: &str,
    ) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT result_text FROM generation_cache
                 WHERE prompt_hash = ?1 AND model_id = ?2",
                params![prompt_hash, model_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row.get::<String>(0).map_err(storage_err)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    pub async fn set_generation_cache(
        &self,
        prompt_hash: &str,
        model_id: &str,
        result_text: &str,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT OR REPLACE INTO generation_cache (prompt_hash, model_id, result_text, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![prompt_hash, model_id, result_text, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl ContentStore for Storage {
    async fn persist(&self, record_id: &str, record: &ProjectRecord) -> Result<()> {
        self.upsert_project(record_id, record)
            .await
            .map_err(|e| match e {
                PaperpageError::Storage(msg) => PaperpageError::PersistFailed(msg),
                other => PaperpageError::PersistFailed(other.to_string()),
            })
    }

    async fn cached_generation(&self, prompt_hash: &str, model_id: &str) -> Result<Option<String>> {
        self.get_generation_cache(prompt_hash, model_id).await
    }

    async fn cache_generation(&self, prompt_hash: &str, model_id: &str, text: &str) -> Result<()> {
        self.set_generation_cache(prompt_hash, model_id, text).await
    }
}
