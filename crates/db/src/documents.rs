use engram_core::{Document, DocumentChunk, DocumentId, DocumentSource};
use rusqlite::{OptionalExtension, Row, params};
use uuid::Uuid;

use crate::connection::{DbError, ProjectDb, Result};
use crate::memories::{blob_to_vector, vector_to_blob};

const DOCUMENT_COLUMNS: &str =
  "id, project_id, source_path, source_url, source_type, title, full_content, checksum, is_code, language, created_at, updated_at";

const CHUNK_COLUMNS: &str =
  "id, document_id, project_id, chunk_index, content, start_offset, end_offset, tokens_estimate, created_at, updated_at";

/// Result of checking a set of on-disk sources against stored checksums.
#[derive(Debug, Clone, Default)]
pub struct DocumentUpdateCheck {
  /// Documents whose content changed (checksum mismatch).
  pub modified: Vec<DocumentId>,
  /// Documents whose source is no longer present (file deleted, URL gone).
  pub missing: Vec<DocumentId>,
}

impl ProjectDb {
  /// Insert a document, replacing any prior row with the same id.
  pub fn upsert_document(&self, doc: &Document) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute(
        &format!(
          "INSERT INTO documents ({DOCUMENT_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)
           ON CONFLICT(id) DO UPDATE SET
             source_path = excluded.source_path, source_url = excluded.source_url,
             source_type = excluded.source_type, title = excluded.title,
             full_content = excluded.full_content, checksum = excluded.checksum,
             is_code = excluded.is_code, language = excluded.language, updated_at = excluded.updated_at"
        ),
        params![
          doc.id.to_string(),
          doc.project_id.to_string(),
          doc.source_path,
          doc.source_url,
          doc.source_type.as_str(),
          doc.title,
          doc.full_content,
          doc.checksum,
          doc.is_code,
          doc.language,
          doc.created_at,
          doc.updated_at,
        ],
      )?;
      Ok(())
    })
  }

  pub fn get_document(&self, id: &DocumentId) -> Result<Option<Document>> {
    self.with_reader(|conn| {
      conn
        .query_row(
          &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
          params![id.to_string()],
          row_to_document,
        )
        .optional()
    })
  }

  /// Look up a document by its source path or URL, used to detect re-ingestion
  /// of the same file.
  pub fn get_document_by_source(&self, project_id: Uuid, source: &str) -> Result<Option<Document>> {
    self.with_reader(|conn| {
      conn
        .query_row(
          &format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents
             WHERE project_id = ?1 AND (source_path = ?2 OR source_url = ?2)"
          ),
          params![project_id.to_string(), source],
          row_to_document,
        )
        .optional()
    })
  }

  pub fn list_documents(&self, project_id: Uuid) -> Result<Vec<Document>> {
    self.with_reader(|conn| {
      let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE project_id = ?1 ORDER BY created_at DESC"
      ))?;
      let rows = stmt.query_map(params![project_id.to_string()], row_to_document)?;
      rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    })
  }

  pub fn delete_document(&self, id: &DocumentId) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])?;
      Ok(())
    })
  }

  /// Compare stored checksums for `sources` (source_path/url -> current checksum)
  /// against the database and report what has changed or disappeared.
  pub fn check_document_updates(&self, project_id: Uuid, sources: &[(String, String)]) -> Result<DocumentUpdateCheck> {
    let existing = self.list_documents(project_id)?;
    let mut check = DocumentUpdateCheck::default();
    let mut seen = std::collections::HashSet::new();

    for (source, checksum) in sources {
      seen.insert(source.clone());
      if let Some(doc) = existing
        .iter()
        .find(|d| d.source_path.as_deref() == Some(source) || d.source_url.as_deref() == Some(source))
      {
        if &doc.checksum != checksum {
          check.modified.push(doc.id);
        }
      }
    }

    for doc in &existing {
      let source = doc.source_path.as_ref().or(doc.source_url.as_ref());
      if let Some(source) = source {
        if !seen.contains(source) {
          check.missing.push(doc.id);
        }
      }
    }

    Ok(check)
  }

  /// Insert a chunk and optionally its embedding vector for `model_id`.
  pub fn add_document_chunk(&self, chunk: &DocumentChunk, vector: Option<(&str, &[f32])>) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute(
        &format!("INSERT INTO document_chunks ({CHUNK_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)"),
        params![
          chunk.id.to_string(),
          chunk.document_id.to_string(),
          chunk.project_id.to_string(),
          chunk.chunk_index,
          chunk.content,
          chunk.start_offset,
          chunk.end_offset,
          chunk.tokens_estimate,
          chunk.created_at,
          chunk.updated_at,
        ],
      )?;

      if let Some((model_id, vec)) = vector {
        conn.execute(
          "INSERT INTO document_vectors (chunk_id, model_id, vector, dim) VALUES (?1, ?2, ?3, ?4)",
          params![chunk.id.to_string(), model_id, vector_to_blob(vec), vec.len()],
        )?;
      }
      Ok(())
    })
  }

  pub fn add_document_chunks(&self, chunks: &[DocumentChunk], vectors: &[Option<(String, Vec<f32>)>]) -> Result<usize> {
    if chunks.is_empty() {
      return Ok(0);
    }
    for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
      let vref = vector.as_ref().map(|(m, v)| (m.as_str(), v.as_slice()));
      self.add_document_chunk(chunk, vref)?;
    }
    Ok(chunks.len())
  }

  pub fn list_document_chunks(&self, document_id: &DocumentId) -> Result<Vec<DocumentChunk>> {
    self.with_reader(|conn| {
      let mut stmt = conn.prepare(&format!(
        "SELECT {CHUNK_COLUMNS} FROM document_chunks WHERE document_id = ?1 ORDER BY chunk_index ASC"
      ))?;
      let rows = stmt.query_map(params![document_id.to_string()], row_to_chunk)?;
      rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    })
  }

  pub fn delete_document_chunks(&self, document_id: &DocumentId) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute("DELETE FROM document_chunks WHERE document_id = ?1", params![document_id.to_string()])?;
      Ok(())
    })
  }

  /// Full-text search over document chunk content.
  pub fn search_document_chunks_fts(&self, project_id: Uuid, query: &str, limit: usize) -> Result<Vec<(DocumentChunk, f32)>> {
    self.with_reader(|conn| {
      let mut stmt = conn.prepare(&format!(
        "SELECT {cols}, bm25(document_chunks_fts) as rank
         FROM document_chunks JOIN document_chunks_fts ON document_chunks.rowid = document_chunks_fts.rowid
         WHERE document_chunks_fts MATCH ?1 AND document_chunks.project_id = ?2
         ORDER BY rank LIMIT ?3",
        cols = CHUNK_COLUMNS,
      ))?;
      let rows = stmt.query_map(params![query, project_id.to_string(), limit], |row| {
        let chunk = row_to_chunk(row)?;
        let rank: f64 = row.get("rank")?;
        Ok((chunk, -rank as f32))
      })?;
      rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    })
  }

  pub fn document_chunk_vectors_for_model(&self, model_id: &str) -> Result<Vec<(DocumentId, Vec<f32>)>> {
    self.with_reader(|conn| {
      let mut stmt = conn.prepare(
        "SELECT dc.id, dv.vector FROM document_vectors dv
         JOIN document_chunks dc ON dc.id = dv.chunk_id
         WHERE dv.model_id = ?1",
      )?;
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
            .parse::<DocumentId>()
            .map(|id| (id, v))
            .map_err(|_| DbError::NotFound("invalid document id in document_vectors".into()))
        })
        .collect()
    })
  }
}

fn row_to_document(row: &Row) -> rusqlite::Result<Document> {
  let id: String = row.get("id")?;
  let project_id: String = row.get("project_id")?;
  let source_type: String = row.get("source_type")?;

  Ok(Document {
    id: id.parse().map_err(|_| rusqlite::Error::InvalidColumnType(0, "id".into(), rusqlite::types::Type::Text))?,
    project_id: Uuid::parse_str(&project_id)
      .map_err(|_| rusqlite::Error::InvalidColumnType(0, "project_id".into(), rusqlite::types::Type::Text))?,
    source_path: row.get("source_path")?,
    source_url: row.get("source_url")?,
    source_type: source_type.parse().unwrap_or(DocumentSource::Txt),
    title: row.get("title")?,
    full_content: row.get("full_content")?,
    checksum: row.get("checksum")?,
    is_code: row.get("is_code")?,
    language: row.get("language")?,
    created_at: row.get("created_at")?,
    updated_at: row.get("updated_at")?,
  })
}

fn row_to_chunk(row: &Row) -> rusqlite::Result<DocumentChunk> {
  let id: String = row.get("id")?;
  let document_id: String = row.get("document_id")?;
  let project_id: String = row.get("project_id")?;

  Ok(DocumentChunk {
    id: id.parse().map_err(|_| rusqlite::Error::InvalidColumnType(0, "id".into(), rusqlite::types::Type::Text))?,
    document_id: document_id
      .parse()
      .map_err(|_| rusqlite::Error::InvalidColumnType(0, "document_id".into(), rusqlite::types::Type::Text))?,
    project_id: Uuid::parse_str(&project_id)
      .map_err(|_| rusqlite::Error::InvalidColumnType(0, "project_id".into(), rusqlite::types::Type::Text))?,
    chunk_index: row.get("chunk_index")?,
    content: row.get("content")?,
    start_offset: row.get("start_offset")?,
    end_offset: row.get("end_offset")?,
    tokens_estimate: row.get("tokens_estimate")?,
    created_at: row.get("created_at")?,
    updated_at: row.get("updated_at")?,
  })
}
