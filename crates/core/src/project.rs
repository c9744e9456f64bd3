use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Find the git root directory by walking upward from the given path
pub fn find_git_root(path: &Path) -> Option<PathBuf> {
  let mut current = path.to_path_buf();

  loop {
    let git_dir = current.join(".git");
    if git_dir.exists() {
      return Some(current);
    }

    if !current.pop() {
      return None;
    }
  }
}

/// Get the project root path, preferring git root over the given path
pub fn resolve_project_path(path: &Path) -> PathBuf {
  let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
  find_git_root(&canonical).unwrap_or(canonical)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
  /// Create a ProjectId from a path, using git root detection if available
  pub fn from_path(path: &Path) -> Self {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

    // Try to find git root first for more stable project identity
    let project_path = find_git_root(&canonical).unwrap_or(canonical);

    let hash = Self::hash_path(&project_path);
    ProjectId(hash)
  }

  /// Create a ProjectId from a path without git root detection
  pub fn from_path_exact(path: &Path) -> Self {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let hash = Self::hash_path(&canonical);
    ProjectId(hash)
  }

  fn hash_path(path: &Path) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    path.to_string_lossy().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn data_dir(&self, base: &Path) -> PathBuf {
    base.join("projects").join(&self.0)
  }

  /// Deterministic UUID derived from this project's path hash.
  ///
  /// `ProjectId` itself is a path hash, not a UUID; domain records key their
  /// `project_id` column on a UUID, so every caller needs a stable mapping
  /// from one identity space to the other.
  pub fn uuid(&self) -> uuid::Uuid {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, self.0.as_bytes())
  }
}

impl std::fmt::Display for ProjectId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetadata {
  pub id: ProjectId,
  pub path: PathBuf,
  pub name: String,
  pub created_at: chrono::DateTime<chrono::Utc>,
}
