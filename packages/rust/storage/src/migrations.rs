//! SQL migration definitions for the paperpage database.
//!
//! Migrations are applied in order on database open, each as one batch.

pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: projects, generation_cache",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per generated project page; record_json is the full ProjectRecord
CREATE TABLE IF NOT EXISTS projects (
    id             TEXT PRIMARY KEY,
    title          TEXT NOT NULL,
    source_kind    TEXT NOT NULL,
    source_locator TEXT NOT NULL,
    record_json    TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_projects_updated ON projects(updated_at);

-- Parseable generator outputs keyed by prompt digest and model
CREATE TABLE IF NOT EXISTS generation_cache (
    prompt_hash TEXT NOT NULL,
    model_id    TEXT NOT NULL,
    result_text TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    PRIMARY KEY (prompt_hash, model_id)
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
