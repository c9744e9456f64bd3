use chrono::{DateTime, Utc};
use engram_core::{Memory, MemoryId, MemoryType, Sector, Tier};
use rusqlite::{OptionalExtension, Row, params};
use uuid::Uuid;

use crate::connection::{DbError, ProjectDb, Result};

const MEMORY_COLUMNS: &str = "id, project_id, session_id, segment_id, content, summary, context, content_hash,
   sector, tier, memory_type, simhash, importance, salience, access_count, confidence,
   created_at, updated_at, last_accessed, valid_from, valid_until, deleted_at, is_deleted,
   tags, concepts, files, categories, scope_path, scope_module, decay_rate, next_decay_at,
   embedding_model_id, superseded_by";

impl ProjectDb {
  /// Insert a new memory, optionally attaching an embedding vector for `model_id`.
  pub fn add_memory(&self, memory: &Memory, vector: Option<(&str, &[f32])>) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute(
        &format!(
          "INSERT INTO memories ({MEMORY_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25,?26,?27,?28,?29,?30,?31,?32,?33)"
        ),
        params![
          memory.id.to_string(),
          memory.project_id.to_string(),
          memory.session_id.map(|id| id.to_string()),
          memory.segment_id.map(|id| id.to_string()),
          memory.content,
          memory.summary,
          memory.context,
          memory.content_hash,
          memory.sector.as_str(),
          memory.tier.as_str(),
          memory.memory_type.map(|t| t.as_str()),
          memory.simhash as i64,
          memory.importance,
          memory.salience,
          memory.access_count,
          memory.confidence,
          memory.created_at,
          memory.updated_at,
          memory.last_accessed,
          memory.valid_from,
          memory.valid_until,
          memory.deleted_at,
          memory.is_deleted,
          serde_json::to_string(&memory.tags)?,
          serde_json::to_string(&memory.concepts)?,
          serde_json::to_string(&memory.files)?,
          serde_json::to_string(&memory.categories)?,
          memory.scope_path,
          memory.scope_module,
          memory.decay_rate,
          memory.next_decay_at,
          memory.embedding_model_id,
          memory.superseded_by.map(|id| id.to_string()),
        ],
      )?;

      if let Some((model_id, vec)) = vector {
        conn.execute(
          "INSERT INTO memory_vectors (memory_id, model_id, vector, dim) VALUES (?1, ?2, ?3, ?4)",
          params![memory.id.to_string(), model_id, vector_to_blob(vec), vec.len()],
        )?;
      }

      Ok(())
    })
  }

  /// Fetch a memory by ID. Returns `Ok(None)` when not found.
  pub fn get_memory(&self, id: &MemoryId) -> Result<Option<Memory>> {
    self.with_reader(|conn| {
      conn
        .query_row(
          &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"),
          params![id.to_string()],
          row_to_memory,
        )
        .optional()
    })
  }

  /// Overwrite an existing memory's mutable fields (content, salience, tags, etc).
  pub fn update_memory(&self, memory: &Memory) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute(
        "UPDATE memories SET
           content = ?2, summary = ?3, context = ?4, content_hash = ?5, sector = ?6, tier = ?7,
           memory_type = ?8, simhash = ?9, importance = ?10, salience = ?11, access_count = ?12,
           confidence = ?13, updated_at = ?14, last_accessed = ?15, valid_until = ?16,
           deleted_at = ?17, is_deleted = ?18, tags = ?19, concepts = ?20, files = ?21,
           categories = ?22, scope_path = ?23, scope_module = ?24, decay_rate = ?25,
           next_decay_at = ?26, embedding_model_id = ?27, superseded_by = ?28
         WHERE id = ?1",
        params![
          memory.id.to_string(),
          memory.content,
          memory.summary,
          memory.context,
          memory.content_hash,
          memory.sector.as_str(),
          memory.tier.as_str(),
          memory.memory_type.map(|t| t.as_str()),
          memory.simhash as i64,
          memory.importance,
          memory.salience,
          memory.access_count,
          memory.confidence,
          memory.updated_at,
          memory.last_accessed,
          memory.valid_until,
          memory.deleted_at,
          memory.is_deleted,
          serde_json::to_string(&memory.tags)?,
          serde_json::to_string(&memory.concepts)?,
          serde_json::to_string(&memory.files)?,
          serde_json::to_string(&memory.categories)?,
          memory.scope_path,
          memory.scope_module,
          memory.decay_rate,
          memory.next_decay_at,
          memory.embedding_model_id,
          memory.superseded_by.map(|id| id.to_string()),
        ],
      )?;
      Ok(())
    })
  }

  /// Update salience/access bookkeeping for many memories inside one transaction.
  /// Used by the decay sweep and by batch recall touches.
  pub fn batch_update_memories(&self, memories: &[Memory]) -> Result<usize> {
    if memories.is_empty() {
      return Ok(0);
    }

    self.with_writer(|conn| {
      for memory in memories {
        conn.execute(
          "UPDATE memories SET salience = ?2, access_count = ?3, last_accessed = ?4, updated_at = ?5
           WHERE id = ?1",
          params![
            memory.id.to_string(),
            memory.salience,
            memory.access_count,
            memory.last_accessed,
            memory.updated_at,
          ],
        )?;
      }
      Ok(memories.len())
    })
  }

  /// Hard delete a memory and its vectors/relationships (cascades via foreign keys).
  pub fn delete_memory(&self, id: &MemoryId) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute("DELETE FROM memories WHERE id = ?1", params![id.to_string()])?;
      Ok(())
    })
  }

  /// Soft delete: mark as deleted without removing the row, preserving history.
  pub fn soft_delete_memory(&self, id: &MemoryId, now: DateTime<Utc>) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute(
        "UPDATE memories SET is_deleted = 1, deleted_at = ?2, updated_at = ?2 WHERE id = ?1",
        params![id.to_string(), now],
      )?;
      Ok(())
    })
  }

  /// List memories, optionally scoped to a tier/sector and excluding soft-deleted rows.
  pub fn list_memories(&self, tier: Option<Tier>, sector: Option<Sector>, limit: Option<usize>) -> Result<Vec<Memory>> {
    self.with_reader(|conn| {
      let mut sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE is_deleted = 0");
      if tier.is_some() {
        sql.push_str(" AND tier = ?1");
      }
      if sector.is_some() {
        sql.push_str(if tier.is_some() { " AND sector = ?2" } else { " AND sector = ?1" });
      }
      sql.push_str(" ORDER BY created_at DESC");
      if let Some(l) = limit {
        sql.push_str(&format!(" LIMIT {l}"));
      }

      let mut stmt = conn.prepare(&sql)?;
      let rows = match (tier, sector) {
        (Some(t), Some(s)) => stmt.query_map(params![t.as_str(), s.as_str()], row_to_memory)?,
        (Some(t), None) => stmt.query_map(params![t.as_str()], row_to_memory)?,
        (None, Some(s)) => stmt.query_map(params![s.as_str()], row_to_memory)?,
        (None, None) => stmt.query_map([], row_to_memory)?,
      };
      rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    })
  }

  /// Candidate rows for near-duplicate detection: same project, not deleted,
  /// limited to a recent window so the simhash probe stays cheap.
  pub fn recent_memories_for_dedup(&self, limit: usize) -> Result<Vec<Memory>> {
    self.with_reader(|conn| {
      let mut stmt = conn.prepare(&format!(
        "SELECT {MEMORY_COLUMNS} FROM memories WHERE is_deleted = 0 ORDER BY created_at DESC LIMIT ?1"
      ))?;
      let rows = stmt.query_map(params![limit], row_to_memory)?;
      rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    })
  }

  /// Full-text search over memory content via the `memories_fts` shadow table.
  pub fn search_memories_fts(&self, query: &str, limit: usize) -> Result<Vec<(Memory, f32)>> {
    self.with_reader(|conn| {
      let mut stmt = conn.prepare(&format!(
        "SELECT {cols}, bm25(memories_fts) as rank
         FROM memories JOIN memories_fts ON memories.rowid = memories_fts.rowid
         WHERE memories_fts MATCH ?1 AND memories.is_deleted = 0
         ORDER BY rank LIMIT ?2",
        cols = MEMORY_COLUMNS,
      ))?;
      let rows = stmt.query_map(params![query, limit], |row| {
        let memory = row_to_memory(row)?;
        let rank: f64 = row.get("rank")?;
        Ok((memory, -rank as f32))
      })?;
      rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    })
  }

  /// Fetch embedding vectors for a model, to score against a query vector in-process.
  pub fn memory_vectors_for_model(&self, model_id: &str) -> Result<Vec<(MemoryId, Vec<f32>)>> {
    self.with_reader(|conn| {
      let mut stmt = conn.prepare("SELECT memory_id, vector FROM memory_vectors WHERE model_id = ?1")?;
      let rows = stmt.query_map(params![model_id], |row| {
        let id_str: String = row.get(0)?;
        let blob: Vec<u8> = row.get(1)?;
        Ok((id_str, blob_to_vector(&blob)))
      })?;
      rows
        .collect::<rusqlite::Result<Vec<_>>>()?
        .into_iter()
        .map(|(id_str, v)| {
          id_str
            .parse::<MemoryId>()
            .map(|id| (id, v))
            .map_err(|_| DbError::NotFound("invalid memory_id in memory_vectors".into()))
        })
        .collect()
    })
  }

  /// Count memories, optionally scoped to a tier, excluding soft-deleted rows.
  pub fn count_memories(&self, tier: Option<Tier>) -> Result<usize> {
    self.with_reader(|conn| {
      let count: i64 = match tier {
        Some(t) => conn.query_row(
          "SELECT COUNT(*) FROM memories WHERE is_deleted = 0 AND tier = ?1",
          params![t.as_str()],
          |r| r.get(0),
        )?,
        None => conn.query_row("SELECT COUNT(*) FROM memories WHERE is_deleted = 0", [], |r| r.get(0))?,
      };
      Ok(count as usize)
    })
  }
}

pub fn vector_to_blob(v: &[f32]) -> Vec<u8> {
  v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn blob_to_vector(b: &[u8]) -> Vec<f32> {
  b.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

fn row_to_memory(row: &Row) -> rusqlite::Result<Memory> {
  let id: String = row.get("id")?;
  let project_id: String = row.get("project_id")?;
  let session_id: Option<String> = row.get("session_id")?;
  let segment_id: Option<String> = row.get("segment_id")?;
  let sector: String = row.get("sector")?;
  let tier: String = row.get("tier")?;
  let memory_type: Option<String> = row.get("memory_type")?;
  let tags: String = row.get("tags")?;
  let concepts: String = row.get("concepts")?;
  let files: String = row.get("files")?;
  let categories: String = row.get("categories")?;
  let superseded_by: Option<String> = row.get("superseded_by")?;

  Ok(Memory {
    id: id.parse().map_err(|_| rusqlite::Error::InvalidColumnType(0, "id".into(), rusqlite::types::Type::Text))?,
    project_id: Uuid::parse_str(&project_id)
      .map_err(|_| rusqlite::Error::InvalidColumnType(0, "project_id".into(), rusqlite::types::Type::Text))?,
    session_id: session_id.and_then(|s| Uuid::parse_str(&s).ok()),
    segment_id: segment_id.and_then(|s| Uuid::parse_str(&s).ok()),
    content: row.get("content")?,
    summary: row.get("summary")?,
    context: row.get("context")?,
    content_hash: row.get("content_hash")?,
    sector: sector.parse().unwrap_or(Sector::Semantic),
    tier: if tier == "session" { Tier::Session } else { Tier::Project },
    memory_type: memory_type.and_then(|s| s.parse::<MemoryType>().ok()),
    simhash: row.get::<_, i64>("simhash")? as u64,
    importance: row.get("importance")?,
    salience: row.get("salience")?,
    access_count: row.get("access_count")?,
    confidence: row.get("confidence")?,
    created_at: row.get("created_at")?,
    updated_at: row.get("updated_at")?,
    last_accessed: row.get("last_accessed")?,
    valid_from: row.get("valid_from")?,
    valid_until: row.get("valid_until")?,
    deleted_at: row.get("deleted_at")?,
    is_deleted: row.get("is_deleted")?,
    tags: serde_json::from_str(&tags).unwrap_or_default(),
    concepts: serde_json::from_str(&concepts).unwrap_or_default(),
    files: serde_json::from_str(&files).unwrap_or_default(),
    categories: serde_json::from_str(&categories).unwrap_or_default(),
    scope_path: row.get("scope_path")?,
    scope_module: row.get("scope_module")?,
    decay_rate: row.get("decay_rate")?,
    next_decay_at: row.get("next_decay_at")?,
    embedding_model_id: row.get("embedding_model_id")?,
    superseded_by: superseded_by.and_then(|s| s.parse().ok()),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use engram_core::ProjectId;
  use std::path::Path;
  use tempfile::TempDir;

  async fn create_test_db() -> (TempDir, ProjectDb) {
    let temp_dir = TempDir::new().unwrap();
    let project_id = ProjectId::from_path(Path::new("/test"));
    let db = ProjectDb::open_at_path(project_id, temp_dir.path().join("test.db")).await.unwrap();
    (temp_dir, db)
  }

  fn create_test_memory(project_id: Uuid) -> Memory {
    Memory::new(project_id, "Test memory content".to_string(), Sector::Semantic)
  }

  #[tokio::test]
  async fn test_add_and_get_memory() {
    let (_temp, db) = create_test_db().await;
    let memory = create_test_memory(Uuid::new_v4());

    db.add_memory(&memory, None).unwrap();

    let retrieved = db.get_memory(&memory.id).unwrap();
    assert!(retrieved.is_some());
    assert_eq!(retrieved.unwrap().content, memory.content);
  }

  #[tokio::test]
  async fn test_add_memory_with_vector() {
    let (_temp, db) = create_test_db().await;
    let memory = create_test_memory(Uuid::new_v4());
    let vector = vec![0.1f32, 0.2, 0.3];

    db.with_writer(|conn| {
      conn.execute(
        "INSERT INTO embedding_models (id, provider, model, dimensions, is_active) VALUES ('test:model', 'test', 'model', 3, 1)",
        [],
      )
    })
    .unwrap();
    db.add_memory(&memory, Some(("test:model", &vector))).unwrap();

    let vectors = db.memory_vectors_for_model("test:model").unwrap();
    assert_eq!(vectors.len(), 1);
    assert_eq!(vectors[0].1, vector);
  }

  #[tokio::test]
  async fn test_list_memories() {
    let (_temp, db) = create_test_db().await;
    let project_id = Uuid::new_v4();

    db.add_memory(&create_test_memory(project_id), None).unwrap();
    db.add_memory(&create_test_memory(project_id), None).unwrap();

    let memories = db.list_memories(None, None, None).unwrap();
    assert_eq!(memories.len(), 2);
  }

  #[tokio::test]
  async fn test_delete_memory() {
    let (_temp, db) = create_test_db().await;
    let memory = create_test_memory(Uuid::new_v4());

    db.add_memory(&memory, None).unwrap();
    assert!(db.get_memory(&memory.id).unwrap().is_some());

    db.delete_memory(&memory.id).unwrap();
    assert!(db.get_memory(&memory.id).unwrap().is_none());
  }

  #[tokio::test]
  async fn test_soft_delete_memory() {
    let (_temp, db) = create_test_db().await;
    let memory = create_test_memory(Uuid::new_v4());
    db.add_memory(&memory, None).unwrap();

    db.soft_delete_memory(&memory.id, Utc::now()).unwrap();

    let retrieved = db.get_memory(&memory.id).unwrap().unwrap();
    assert!(retrieved.is_deleted);
    assert!(db.list_memories(None, None, None).unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_search_memories_fts() {
    let (_temp, db) = create_test_db().await;
    let mut memory = create_test_memory(Uuid::new_v4());
    memory.content = "the quick brown fox jumps".to_string();
    db.add_memory(&memory, None).unwrap();

    let results = db.search_memories_fts("fox", 10).unwrap();
    assert_eq!(results.len(), 1);
  }

  #[test]
  fn test_vector_blob_roundtrip() {
    let v = vec![0.5f32, -1.25, 3.0];
    let blob = vector_to_blob(&v);
    assert_eq!(blob_to_vector(&blob), v);
  }
}
