// Code indexing bookkeeping: per-file checksums and a per-project roll-up.
//
// Indexed code is stored as Documents with `is_code = true` (see
// `documents.rs`); this module only tracks which files have been scanned and
// with what checksum, so re-indexing can skip unchanged files.

use chrono::{DateTime, Utc};
use engram_core::DocumentId;
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::connection::{DbError, ProjectDb, Result};

/// Per-project record of a scanned file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedFile {
  pub project_id: Uuid,
  pub path: String,
  pub checksum: String,
  pub last_indexed_at: DateTime<Utc>,
  pub language: Option<String>,
  pub document_id: Option<DocumentId>,
  pub gitignore_hash: Option<String>,
}

/// Per-project roll-up of the last indexing pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeIndexState {
  pub project_id: Uuid,
  pub last_indexed_at: Option<DateTime<Utc>>,
  pub indexed_files: u32,
  pub errors: Vec<String>,
}

impl CodeIndexState {
  pub fn new(project_id: Uuid) -> Self {
    Self {
      project_id,
      last_indexed_at: None,
      indexed_files: 0,
      errors: Vec::new(),
    }
  }
}

impl ProjectDb {
  /// Record (or update) that `path` was indexed with `checksum`, skipping it
  /// on the next scan unless the content or gitignore rules change.
  pub fn upsert_indexed_file(&self, file: &IndexedFile) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute(
        "INSERT INTO indexed_files (project_id, path, checksum, last_indexed_at, language, document_id, gitignore_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(project_id, path) DO UPDATE SET
           checksum = excluded.checksum, last_indexed_at = excluded.last_indexed_at,
           language = excluded.language, document_id = excluded.document_id,
           gitignore_hash = excluded.gitignore_hash",
        params![
          file.project_id.to_string(),
          file.path,
          file.checksum,
          file.last_indexed_at,
          file.language,
          file.document_id.map(|id| id.to_string()),
          file.gitignore_hash,
        ],
      )?;
      Ok(())
    })
  }

  pub fn get_indexed_file(&self, project_id: Uuid, path: &str) -> Result<Option<IndexedFile>> {
    self.with_reader(|conn| {
      conn
        .query_row(
          "SELECT project_id, path, checksum, last_indexed_at, language, document_id, gitignore_hash
           FROM indexed_files WHERE project_id = ?1 AND path = ?2",
          params![project_id.to_string(), path],
          row_to_indexed_file,
        )
        .optional()
    })
  }

  pub fn list_indexed_files(&self, project_id: Uuid) -> Result<Vec<IndexedFile>> {
    self.with_reader(|conn| {
      let mut stmt = conn.prepare(
        "SELECT project_id, path, checksum, last_indexed_at, language, document_id, gitignore_hash
         FROM indexed_files WHERE project_id = ?1",
      )?;
      let rows = stmt.query_map(params![project_id.to_string()], row_to_indexed_file)?;
      rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    })
  }

  /// Remove bookkeeping (and the backing document, via foreign key) for a
  /// file that no longer exists on disk.
  pub fn delete_indexed_file(&self, project_id: Uuid, path: &str) -> Result<Option<DocumentId>> {
    let existing = self.get_indexed_file(project_id, path)?;
    self.with_writer(|conn| {
      conn.execute(
        "DELETE FROM indexed_files WHERE project_id = ?1 AND path = ?2",
        params![project_id.to_string(), path],
      )?;
      Ok(())
    })?;
    Ok(existing.and_then(|f| f.document_id))
  }

  pub fn get_code_index_state(&self, project_id: Uuid) -> Result<CodeIndexState> {
    self.with_reader(|conn| {
      conn
        .query_row(
          "SELECT project_id, last_indexed_at, indexed_files, errors FROM code_index_state WHERE project_id = ?1",
          params![project_id.to_string()],
          row_to_state,
        )
        .optional()
    })
    .map(|opt| opt.unwrap_or_else(|| CodeIndexState::new(project_id)))
  }

  pub fn upsert_code_index_state(&self, state: &CodeIndexState) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute(
        "INSERT INTO code_index_state (project_id, last_indexed_at, indexed_files, errors)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(project_id) DO UPDATE SET
           last_indexed_at = excluded.last_indexed_at, indexed_files = excluded.indexed_files,
           errors = excluded.errors",
        params![
          state.project_id.to_string(),
          state.last_indexed_at,
          state.indexed_files,
          serde_json::to_string(&state.errors)?,
        ],
      )?;
      Ok(())
    })
  }
}

fn row_to_indexed_file(row: &Row) -> rusqlite::Result<IndexedFile> {
  let project_id: String = row.get(0)?;
  let document_id: Option<String> = row.get(5)?;

  Ok(IndexedFile {
    project_id: Uuid::parse_str(&project_id)
      .map_err(|_| rusqlite::Error::InvalidColumnType(0, "project_id".into(), rusqlite::types::Type::Text))?,
    path: row.get(1)?,
    checksum: row.get(2)?,
    last_indexed_at: row.get(3)?,
    language: row.get(4)?,
    document_id: document_id.and_then(|s| s.parse().ok()),
    gitignore_hash: row.get(6)?,
  })
}

fn row_to_state(row: &Row) -> rusqlite::Result<CodeIndexState> {
  let project_id: String = row.get(0)?;
  let errors: String = row.get(3)?;

  Ok(CodeIndexState {
    project_id: Uuid::parse_str(&project_id)
      .map_err(|_| rusqlite::Error::InvalidColumnType(0, "project_id".into(), rusqlite::types::Type::Text))?,
    last_indexed_at: row.get(1)?,
    indexed_files: row.get(2)?,
    errors: serde_json::from_str(&errors).unwrap_or_default(),
  })
}
