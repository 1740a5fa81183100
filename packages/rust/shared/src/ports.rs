//! Collaborator seams implemented outside the pipeline crates.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ProjectRecord;

/// Persists generated project records. At-least-once, idempotent per record id.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert or overwrite the record stored under `record_id`.
    async fn persist(&self, record_id: &str, record: &ProjectRecord) -> Result<()>;

    /// Previously cached generator output for `(prompt_hash, model_id)`.
    async fn cached_generation(&self, _prompt_hash: &str, _model_id: &str) -> Result<Option<String>> {
        Ok(None)
    }

    /// Remember a parseable generator output.
    async fn cache_generation(&self, _prompt_hash: &str, _model_id: &str, _text: &str) -> Result<()> {
        Ok(())
    }
}
