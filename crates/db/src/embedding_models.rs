use rusqlite::params;

use crate::connection::{ProjectDb, Result};
use crate::memories::vector_to_blob;

impl ProjectDb {
  /// Register `model_id` in `embedding_models` if it isn't already known.
  ///
  /// `memory_vectors` and `document_vectors` carry a foreign key onto this
  /// table, so every vector insert needs a matching row here first.
  pub fn ensure_embedding_model(&self, model_id: &str, provider: &str, model: &str, dimensions: usize) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute(
        "INSERT OR IGNORE INTO embedding_models (id, provider, model, dimensions, is_active) VALUES (?1, ?2, ?3, ?4, 0)",
        params![model_id, provider, model, dimensions as i64],
      )?;
      Ok(())
    })
  }

  /// Replace (or insert) the stored vector for `memory_id` under `model_id`.
  pub fn upsert_memory_vector(&self, memory_id: &str, model_id: &str, vector: &[f32]) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute(
        "INSERT INTO memory_vectors (memory_id, model_id, vector, dim) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (memory_id, model_id) DO UPDATE SET vector = excluded.vector, dim = excluded.dim",
        params![memory_id, model_id, vector_to_blob(vector), vector.len()],
      )?;
      Ok(())
    })
  }

  /// Replace (or insert) the stored vector for a document chunk under `model_id`.
  pub fn upsert_document_chunk_vector(&self, chunk_id: &str, model_id: &str, vector: &[f32]) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute(
        "INSERT INTO document_vectors (chunk_id, model_id, vector, dim) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (chunk_id, model_id) DO UPDATE SET vector = excluded.vector, dim = excluded.dim",
        params![chunk_id, model_id, vector_to_blob(vector), vector.len()],
      )?;
      Ok(())
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use engram_core::{Memory, ProjectId, Sector};
  use std::path::Path;
  use tempfile::TempDir;
  use uuid::Uuid;

  async fn test_db() -> (TempDir, ProjectDb) {
    let temp_dir = TempDir::new().unwrap();
    let project_id = ProjectId::from_path(Path::new("/test"));
    let db = ProjectDb::open_at_path(project_id, temp_dir.path().join("test.db")).await.unwrap();
    (temp_dir, db)
  }

  #[tokio::test]
  async fn test_ensure_embedding_model_idempotent() {
    let (_temp, db) = test_db().await;
    db.ensure_embedding_model("ollama:nomic-embed-text", "ollama", "nomic-embed-text", 768)
      .unwrap();
    db.ensure_embedding_model("ollama:nomic-embed-text", "ollama", "nomic-embed-text", 768)
      .unwrap();
  }

  #[tokio::test]
  async fn test_upsert_memory_vector_replaces() {
    let (_temp, db) = test_db().await;
    db.ensure_embedding_model("test:model", "test", "model", 3).unwrap();

    let memory = Memory::new(Uuid::new_v4(), "content".to_string(), Sector::Episodic);
    db.add_memory(&memory, Some(("test:model", &[1.0, 2.0, 3.0]))).unwrap();

    db.upsert_memory_vector(&memory.id.to_string(), "test:model", &[4.0, 5.0, 6.0])
      .unwrap();

    let vectors = db.memory_vectors_for_model("test:model").unwrap();
    assert_eq!(vectors.len(), 1);
    assert_eq!(vectors[0].1, vec![4.0, 5.0, 6.0]);
  }
}
