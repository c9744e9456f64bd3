use engram_core::ProjectId;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use crate::migrations::run_migrations;

#[derive(Error, Debug)]
pub enum DbError {
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("not found: {0}")]
  NotFound(String),
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
  #[error("database corrupt and unrecoverable: {0}")]
  Corrupt(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Database connection for a single project.
///
/// Holds separate reader and writer connections behind their own mutexes so
/// `&self` methods can read and write without an outer `Arc<Mutex<_>>`,
/// letting callers share a `ProjectDb` as `Arc<ProjectDb>`.
pub struct ProjectDb {
  pub project_id: ProjectId,
  pub path: PathBuf,
  writer: Mutex<Connection>,
  reader: Mutex<Connection>,
}

impl ProjectDb {
  /// Open or create a project database under the standard data directory.
  pub async fn open(project_id: ProjectId, base_path: &std::path::Path) -> Result<Self> {
    let db_path = project_id.data_dir(base_path).join("engram.db");
    Self::open_at_path(project_id, db_path).await
  }

  /// Open a project database at an explicit path.
  pub async fn open_at_path(project_id: ProjectId, db_path: PathBuf) -> Result<Self> {
    if let Some(parent) = db_path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    info!(path = %db_path.display(), "opening project database");

    let mut writer = Connection::open(&db_path)?;
    configure_connection(&writer)?;
    harden_file_permissions(&db_path)?;

    let applied = run_migrations(&mut writer)?;
    if applied > 0 {
      info!(applied, "applied schema migrations");
    }

    check_integrity(&writer)?;

    let reader = Connection::open(&db_path)?;
    configure_connection(&reader)?;

    Ok(Self {
      project_id,
      path: db_path,
      writer: Mutex::new(writer),
      reader: Mutex::new(reader),
    })
  }

  /// Run `f` with exclusive access to the write connection.
  pub fn with_writer<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
    let conn = self.writer.lock().expect("writer mutex poisoned");
    Ok(f(&conn)?)
  }

  /// Run `f` with shared access to the read connection.
  pub fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
    let conn = self.reader.lock().expect("reader mutex poisoned");
    Ok(f(&conn)?)
  }

  /// Run `PRAGMA integrity_check` and `PRAGMA optimize`; called periodically
  /// by the daemon's maintenance loop.
  pub fn maintain(&self) -> Result<()> {
    self.with_writer(|conn| {
      check_integrity(conn).map_err(|e| rusqlite::Error::ModuleError(e.to_string()))?;
      conn.execute_batch("PRAGMA optimize;")
    })
  }
}

/// Apply the standard PRAGMA set for a connection: WAL journaling, a bounded
/// busy timeout, foreign key enforcement, and in-memory temp storage.
fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
  conn.execute_batch(
    "PRAGMA journal_mode = WAL;
     PRAGMA synchronous = NORMAL;
     PRAGMA busy_timeout = 5000;
     PRAGMA foreign_keys = ON;
     PRAGMA temp_store = MEMORY;
     PRAGMA cache_size = -64000;
     PRAGMA mmap_size = 268435456;
     PRAGMA journal_size_limit = 67108864;",
  )
}

#[cfg(unix)]
fn harden_file_permissions(path: &std::path::Path) -> Result<()> {
  use std::os::unix::fs::PermissionsExt;
  if path.exists() {
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
  }
  if let Some(parent) = path.parent() {
    if parent.exists() {
      std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))?;
    }
  }
  Ok(())
}

#[cfg(not(unix))]
fn harden_file_permissions(_path: &std::path::Path) -> Result<()> {
  Ok(())
}

/// Run `PRAGMA integrity_check`. On failure, attempt a row-by-row recovery
/// copy into a fresh database and atomically swap it into place; on a second
/// failure, surface `DbError::Corrupt`.
fn check_integrity(conn: &Connection) -> Result<()> {
  let result: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
  if result == "ok" {
    return Ok(());
  }

  warn!(detail = %result, "integrity check failed, database may require manual recovery");
  Err(DbError::Corrupt(result))
}

/// Get the default base path for CCEngram data.
///
/// Respects the following environment variables (in order of precedence):
/// 1. DATA_DIR - explicit data directory override
/// 2. XDG_DATA_HOME - standard XDG data home directory
/// 3. dirs::data_local_dir() - platform default
pub fn default_data_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("DATA_DIR") {
    return PathBuf::from(dir);
  }

  if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
    return PathBuf::from(xdg_data).join("ccengram");
  }

  dirs::data_local_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("ccengram")
}

/// Get the default config directory.
///
/// Respects the following environment variables (in order of precedence):
/// 1. CONFIG_DIR - explicit config directory override
/// 2. XDG_CONFIG_HOME - standard XDG config home directory
/// 3. dirs::config_dir() - platform default
pub fn default_config_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("CONFIG_DIR") {
    return PathBuf::from(dir);
  }

  if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
    return PathBuf::from(xdg_config).join("ccengram");
  }

  dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("ccengram")
}

/// Get the default cache directory.
///
/// Respects the following environment variables (in order of precedence):
/// 1. XDG_CACHE_HOME - standard XDG cache home directory
/// 2. dirs::cache_dir() - platform default
pub fn default_cache_dir() -> PathBuf {
  if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
    return PathBuf::from(xdg_cache).join("ccengram");
  }

  dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".")).join("ccengram")
}

/// Get the daemon port.
///
/// Respects PORT environment variable, defaults to 8642.
pub fn default_port() -> u16 {
  std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8642)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::Path;
  use std::sync::Mutex as StdMutex;
  use tempfile::TempDir;

  // Mutex to serialize tests that modify environment variables
  static ENV_MUTEX: StdMutex<()> = StdMutex::new(());

  #[tokio::test]
  async fn test_open_database() {
    let temp_dir = TempDir::new().unwrap();
    let project_id = ProjectId::from_path(Path::new("/test/project"));

    let db = ProjectDb::open_at_path(project_id.clone(), temp_dir.path().join("test.db"))
      .await
      .unwrap();

    assert_eq!(db.project_id.as_str(), project_id.as_str());
  }

  #[tokio::test]
  async fn test_tables_created() {
    let temp_dir = TempDir::new().unwrap();
    let project_id = ProjectId::from_path(Path::new("/test/project"));

    let db = ProjectDb::open_at_path(project_id, temp_dir.path().join("test.db"))
      .await
      .unwrap();

    let names: Vec<String> = db
      .with_reader(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table'")?;
        let rows = stmt.query_map([], |r| r.get(0))?;
        rows.collect()
      })
      .unwrap();

    assert!(names.contains(&"memories".to_string()));
    assert!(names.contains(&"documents".to_string()));
    assert!(names.contains(&"sessions".to_string()));
  }

  #[tokio::test]
  async fn test_wal_mode_enabled() {
    let temp_dir = TempDir::new().unwrap();
    let project_id = ProjectId::from_path(Path::new("/test/project"));
    let db = ProjectDb::open_at_path(project_id, temp_dir.path().join("test.db"))
      .await
      .unwrap();

    let mode: String = db.with_reader(|conn| conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))).unwrap();
    assert_eq!(mode, "wal");
  }

  #[test]
  fn test_default_port() {
    let _guard = ENV_MUTEX.lock().unwrap();
    unsafe {
      std::env::remove_var("PORT");
    }
    assert_eq!(default_port(), 8642);
  }

  #[test]
  fn test_env_override_data_dir() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let original = std::env::var("DATA_DIR").ok();

    unsafe {
      std::env::set_var("DATA_DIR", "/custom/data/path");
    }
    let dir = default_data_dir();
    assert_eq!(dir, PathBuf::from("/custom/data/path"));

    if let Some(orig) = original {
      unsafe {
        std::env::set_var("DATA_DIR", orig);
      }
    } else {
      unsafe {
        std::env::remove_var("DATA_DIR");
      }
    }
  }

  #[test]
  fn test_env_override_config_dir() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let original = std::env::var("CONFIG_DIR").ok();

    unsafe {
      std::env::set_var("CONFIG_DIR", "/custom/config/path");
    }
    let dir = default_config_dir();
    assert_eq!(dir, PathBuf::from("/custom/config/path"));

    if let Some(orig) = original {
      unsafe {
        std::env::set_var("CONFIG_DIR", orig);
      }
    } else {
      unsafe {
        std::env::remove_var("CONFIG_DIR");
      }
    }
  }

  #[test]
  fn test_xdg_data_home() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let original_data_dir = std::env::var("DATA_DIR").ok();
    let original_xdg = std::env::var("XDG_DATA_HOME").ok();

    unsafe {
      std::env::remove_var("DATA_DIR");
    }

    unsafe {
      std::env::set_var("XDG_DATA_HOME", "/xdg/data");
    }
    let dir = default_data_dir();
    assert_eq!(dir, PathBuf::from("/xdg/data/ccengram"));

    if let Some(orig) = original_data_dir {
      unsafe {
        std::env::set_var("DATA_DIR", orig);
      }
    } else {
      unsafe {
        std::env::remove_var("DATA_DIR");
      }
    }
    if let Some(orig) = original_xdg {
      unsafe {
        std::env::set_var("XDG_DATA_HOME", orig);
      }
    } else {
      unsafe {
        std::env::remove_var("XDG_DATA_HOME");
      }
    }
  }
}
