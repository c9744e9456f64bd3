//! Database schema migration system
//!
//! Forward-only schema evolution with version tracking. A `_migrations`
//! table records applied versions; `run_migrations` applies every pending
//! version in its own transaction, in order.

use rusqlite::{Connection, params};
use tracing::info;

/// A migration definition: a version number and the DDL to reach it.
#[derive(Debug, Clone)]
pub struct Migration {
  pub version: i64,
  pub name: &'static str,
  pub sql: &'static str,
}

/// Current schema version. Bump and add a `Migration` entry when the
/// schema changes.
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

pub const MIGRATIONS: &[Migration] = &[Migration {
  version: 1,
  name: "initial_schema",
  sql: MIGRATION_V1,
}];

const MIGRATION_V1: &str = r#"
CREATE TABLE projects (
  id TEXT PRIMARY KEY,
  path TEXT NOT NULL UNIQUE,
  name TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE sessions (
  id TEXT PRIMARY KEY,
  project_id TEXT NOT NULL,
  started_at TEXT NOT NULL,
  ended_at TEXT,
  summary TEXT,
  context TEXT
);
CREATE INDEX idx_sessions_project ON sessions(project_id);
CREATE INDEX idx_sessions_ended_at ON sessions(ended_at);

CREATE TABLE embedding_models (
  id TEXT PRIMARY KEY, -- "provider:model"
  provider TEXT NOT NULL,
  model TEXT NOT NULL,
  dimensions INTEGER NOT NULL,
  is_active INTEGER NOT NULL DEFAULT 0
);
CREATE UNIQUE INDEX idx_embedding_models_active ON embedding_models(is_active) WHERE is_active = 1;

CREATE TABLE memories (
  id TEXT PRIMARY KEY,
  project_id TEXT NOT NULL,
  session_id TEXT REFERENCES sessions(id) ON DELETE SET NULL,
  segment_id TEXT,
  content TEXT NOT NULL,
  summary TEXT,
  context TEXT,
  content_hash TEXT NOT NULL,
  sector TEXT NOT NULL,
  tier TEXT NOT NULL,
  memory_type TEXT,
  simhash INTEGER NOT NULL,
  importance REAL NOT NULL DEFAULT 0.5,
  salience REAL NOT NULL DEFAULT 1.0,
  access_count INTEGER NOT NULL DEFAULT 0,
  confidence REAL NOT NULL DEFAULT 1.0,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  last_accessed TEXT NOT NULL,
  valid_from TEXT NOT NULL,
  valid_until TEXT,
  deleted_at TEXT,
  is_deleted INTEGER NOT NULL DEFAULT 0,
  tags TEXT NOT NULL DEFAULT '[]',
  concepts TEXT NOT NULL DEFAULT '[]',
  files TEXT NOT NULL DEFAULT '[]',
  categories TEXT NOT NULL DEFAULT '[]',
  scope_path TEXT,
  scope_module TEXT,
  decay_rate REAL,
  next_decay_at TEXT,
  embedding_model_id TEXT,
  superseded_by TEXT REFERENCES memories(id) ON DELETE SET NULL
);
CREATE INDEX idx_memories_project ON memories(project_id);
CREATE INDEX idx_memories_session ON memories(session_id);
CREATE INDEX idx_memories_sector ON memories(project_id, sector);
CREATE INDEX idx_memories_tier ON memories(project_id, tier);
CREATE INDEX idx_memories_simhash ON memories(project_id, simhash);
CREATE INDEX idx_memories_valid_until ON memories(valid_until);
CREATE INDEX idx_memories_is_deleted ON memories(is_deleted);
CREATE INDEX idx_memories_created_at ON memories(project_id, created_at);

CREATE VIRTUAL TABLE memories_fts USING fts5(
  content,
  content='memories',
  content_rowid='rowid'
);

CREATE TRIGGER memories_fts_ai AFTER INSERT ON memories BEGIN
  INSERT INTO memories_fts(rowid, content) VALUES (new.rowid, new.content);
END;
CREATE TRIGGER memories_fts_ad AFTER DELETE ON memories BEGIN
  INSERT INTO memories_fts(memories_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
END;
CREATE TRIGGER memories_fts_au AFTER UPDATE ON memories BEGIN
  INSERT INTO memories_fts(memories_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
  INSERT INTO memories_fts(rowid, content) VALUES (new.rowid, new.content);
END;

CREATE TABLE memory_vectors (
  memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
  model_id TEXT NOT NULL REFERENCES embedding_models(id) ON DELETE CASCADE,
  vector BLOB NOT NULL,
  dim INTEGER NOT NULL,
  PRIMARY KEY (memory_id, model_id)
);
CREATE INDEX idx_memory_vectors_model ON memory_vectors(model_id);

CREATE TABLE memory_relationships (
  id TEXT PRIMARY KEY,
  from_memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
  to_memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
  relationship_type TEXT NOT NULL,
  confidence REAL NOT NULL DEFAULT 1.0,
  valid_from TEXT NOT NULL,
  valid_until TEXT,
  extracted_by TEXT NOT NULL,
  created_at TEXT NOT NULL
);
CREATE INDEX idx_relationships_from ON memory_relationships(from_memory_id);
CREATE INDEX idx_relationships_to ON memory_relationships(to_memory_id);

CREATE TABLE session_memories (
  id TEXT PRIMARY KEY,
  session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
  memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
  usage_type TEXT NOT NULL,
  linked_at TEXT NOT NULL
);
CREATE INDEX idx_session_memories_session ON session_memories(session_id);
CREATE INDEX idx_session_memories_memory ON session_memories(memory_id);

CREATE TABLE documents (
  id TEXT PRIMARY KEY,
  project_id TEXT NOT NULL,
  source_path TEXT,
  source_url TEXT,
  source_type TEXT NOT NULL,
  title TEXT,
  full_content TEXT,
  checksum TEXT NOT NULL,
  is_code INTEGER NOT NULL DEFAULT 0,
  language TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
CREATE INDEX idx_documents_project ON documents(project_id);
CREATE UNIQUE INDEX idx_documents_project_path ON documents(project_id, source_path) WHERE source_path IS NOT NULL;
CREATE INDEX idx_documents_checksum ON documents(checksum);

CREATE TABLE document_chunks (
  id TEXT PRIMARY KEY,
  document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
  project_id TEXT NOT NULL,
  chunk_index INTEGER NOT NULL,
  content TEXT NOT NULL,
  start_offset INTEGER NOT NULL,
  end_offset INTEGER NOT NULL,
  tokens_estimate INTEGER NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
CREATE INDEX idx_document_chunks_document ON document_chunks(document_id);
CREATE INDEX idx_document_chunks_project ON document_chunks(project_id);

CREATE VIRTUAL TABLE document_chunks_fts USING fts5(
  content,
  content='document_chunks',
  content_rowid='rowid'
);

CREATE TRIGGER document_chunks_fts_ai AFTER INSERT ON document_chunks BEGIN
  INSERT INTO document_chunks_fts(rowid, content) VALUES (new.rowid, new.content);
END;
CREATE TRIGGER document_chunks_fts_ad AFTER DELETE ON document_chunks BEGIN
  INSERT INTO document_chunks_fts(document_chunks_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
END;
CREATE TRIGGER document_chunks_fts_au AFTER UPDATE ON document_chunks BEGIN
  INSERT INTO document_chunks_fts(document_chunks_fts, rowid, content) VALUES ('delete', old.rowid, old.content);
  INSERT INTO document_chunks_fts(rowid, content) VALUES (new.rowid, new.content);
END;

CREATE TABLE document_vectors (
  chunk_id TEXT NOT NULL REFERENCES document_chunks(id) ON DELETE CASCADE,
  model_id TEXT NOT NULL REFERENCES embedding_models(id) ON DELETE CASCADE,
  vector BLOB NOT NULL,
  dim INTEGER NOT NULL,
  PRIMARY KEY (chunk_id, model_id)
);
CREATE INDEX idx_document_vectors_model ON document_vectors(model_id);

CREATE TABLE indexed_files (
  project_id TEXT NOT NULL,
  path TEXT NOT NULL,
  checksum TEXT NOT NULL,
  last_indexed_at TEXT NOT NULL,
  language TEXT,
  document_id TEXT REFERENCES documents(id) ON DELETE SET NULL,
  gitignore_hash TEXT,
  PRIMARY KEY (project_id, path)
);

CREATE TABLE code_index_state (
  project_id TEXT PRIMARY KEY,
  last_indexed_at TEXT,
  indexed_files INTEGER NOT NULL DEFAULT 0,
  errors TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE segment_accumulators (
  id TEXT PRIMARY KEY,
  session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
  project_id TEXT NOT NULL,
  segment_start TEXT NOT NULL,
  user_prompts TEXT NOT NULL DEFAULT '[]',
  files_read TEXT NOT NULL DEFAULT '[]',
  files_modified TEXT NOT NULL DEFAULT '[]',
  commands_run TEXT NOT NULL DEFAULT '[]',
  errors_encountered TEXT NOT NULL DEFAULT '[]',
  searches_performed TEXT NOT NULL DEFAULT '[]',
  completed_tasks TEXT NOT NULL DEFAULT '[]',
  tool_call_count INTEGER NOT NULL DEFAULT 0,
  last_assistant_message TEXT,
  updated_at TEXT NOT NULL
);
CREATE UNIQUE INDEX idx_accumulators_session ON segment_accumulators(session_id);

CREATE TABLE extraction_segments (
  id TEXT PRIMARY KEY,
  session_id TEXT NOT NULL,
  project_id TEXT NOT NULL,
  trigger TEXT NOT NULL,
  user_prompts_json TEXT NOT NULL DEFAULT '[]',
  files_read_count INTEGER NOT NULL DEFAULT 0,
  files_modified_count INTEGER NOT NULL DEFAULT 0,
  tool_call_count INTEGER NOT NULL DEFAULT 0,
  memories_extracted INTEGER NOT NULL DEFAULT 0,
  extraction_duration_ms INTEGER NOT NULL DEFAULT 0,
  input_tokens INTEGER,
  output_tokens INTEGER,
  model_used TEXT,
  error TEXT,
  created_at TEXT NOT NULL
);
CREATE INDEX idx_extraction_segments_project ON extraction_segments(project_id);
CREATE INDEX idx_extraction_segments_session ON extraction_segments(session_id);

CREATE TABLE config (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
"#;

/// Get the current applied schema version from `_migrations`.
pub fn get_current_version(conn: &Connection) -> rusqlite::Result<i64> {
  conn
    .query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))
    .or(Ok(0))
}

/// Ensure the `_migrations` bookkeeping table exists.
fn ensure_migrations_table(conn: &Connection) -> rusqlite::Result<()> {
  conn.execute_batch(
    "CREATE TABLE IF NOT EXISTS _migrations (
       version INTEGER PRIMARY KEY,
       name TEXT NOT NULL,
       applied_at TEXT NOT NULL
     );",
  )
}

/// Apply every migration with `version > current_version`, each inside its
/// own transaction. Returns the number of migrations applied.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<usize> {
  ensure_migrations_table(conn)?;
  let current_version = get_current_version(conn)?;
  let mut applied = 0;

  for migration in MIGRATIONS {
    if migration.version <= current_version {
      continue;
    }

    info!(version = migration.version, name = migration.name, "applying migration");
    let tx = conn.transaction()?;
    tx.execute_batch(migration.sql)?;
    tx.execute(
      "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
      params![migration.version, migration.name, chrono::Utc::now().to_rfc3339()],
    )?;
    tx.commit()?;
    applied += 1;
  }

  Ok(applied)
}
