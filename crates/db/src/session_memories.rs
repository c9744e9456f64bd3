// Session-Memory linkage table operations
//
// Tracks how memories are used across sessions:
// - Created: memory was created in this session
// - Recalled: memory was retrieved/accessed in this session
// - Updated: memory was modified in this session
// - Reinforced: memory was confirmed/used repeatedly

use chrono::{DateTime, Utc};
use engram_core::{MemoryId, Tier};
use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use tracing::warn;

use crate::connection::{DbError, ProjectDb, Result};

/// Usage type for session-memory linkage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
  Created,
  Recalled,
  Updated,
  Reinforced,
}

impl UsageType {
  pub fn as_str(&self) -> &'static str {
    match self {
      UsageType::Created => "created",
      UsageType::Recalled => "recalled",
      UsageType::Updated => "updated",
      UsageType::Reinforced => "reinforced",
    }
  }
}

impl std::str::FromStr for UsageType {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "created" => Ok(UsageType::Created),
      "recalled" => Ok(UsageType::Recalled),
      "updated" => Ok(UsageType::Updated),
      "reinforced" => Ok(UsageType::Reinforced),
      _ => Err(format!("unknown usage type: {s}")),
    }
  }
}

/// A session-memory linkage record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMemoryLink {
  pub id: Uuid,
  pub session_id: Uuid,
  pub memory_id: String,
  pub usage_type: UsageType,
  pub linked_at: DateTime<Utc>,
}

impl SessionMemoryLink {
  pub fn new(session_id: Uuid, memory_id: String, usage_type: UsageType) -> Self {
    Self {
      id: Uuid::now_v7(),
      session_id,
      memory_id,
      usage_type,
      linked_at: Utc::now(),
    }
  }
}

/// Aggregate statistics about memory usage in a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
  pub total_memories: usize,
  pub created: usize,
  pub recalled: usize,
  pub updated: usize,
  pub reinforced: usize,
  pub by_sector: HashMap<String, usize>,
  pub average_salience: f32,
}

impl ProjectDb {
  pub fn link_memory(&self, session_id: Uuid, memory_id: &str, usage_type: UsageType) -> Result<()> {
    let link = SessionMemoryLink::new(session_id, memory_id.to_string(), usage_type);
    self.add_session_memory_link(&link)
  }

  pub fn add_session_memory_link(&self, link: &SessionMemoryLink) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute(
        "INSERT INTO session_memories (id, session_id, memory_id, usage_type, linked_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
          link.id.to_string(),
          link.session_id.to_string(),
          link.memory_id,
          link.usage_type.as_str(),
          link.linked_at,
        ],
      )?;
      Ok(())
    })
  }

  pub fn get_session_memory_links(&self, session_id: &Uuid) -> Result<Vec<SessionMemoryLink>> {
    self.with_reader(|conn| {
      let mut stmt = conn.prepare(
        "SELECT id, session_id, memory_id, usage_type, linked_at FROM session_memories WHERE session_id = ?1",
      )?;
      let rows = stmt.query_map(params![session_id.to_string()], row_to_link)?;
      rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    })
  }

  pub fn get_memory_session_links(&self, memory_id: &str) -> Result<Vec<SessionMemoryLink>> {
    self.with_reader(|conn| {
      let mut stmt = conn.prepare(
        "SELECT id, session_id, memory_id, usage_type, linked_at FROM session_memories WHERE memory_id = ?1",
      )?;
      let rows = stmt.query_map(params![memory_id], row_to_link)?;
      rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    })
  }

  pub fn get_session_stats(&self, session_id: &Uuid) -> Result<SessionStats> {
    let links = self.get_session_memory_links(session_id)?;

    let mut stats = SessionStats {
      total_memories: links.len(),
      ..Default::default()
    };

    for link in &links {
      match link.usage_type {
        UsageType::Created => stats.created += 1,
        UsageType::Recalled => stats.recalled += 1,
        UsageType::Updated => stats.updated += 1,
        UsageType::Reinforced => stats.reinforced += 1,
      }
    }

    let mut total_salience = 0.0f32;
    let mut memory_count = 0usize;

    for link in &links {
      let Ok(memory_id) = link.memory_id.parse::<MemoryId>() else {
        warn!(memory_id = %link.memory_id, "invalid memory id in session link");
        continue;
      };
      if let Ok(Some(memory)) = self.get_memory(&memory_id) {
        *stats.by_sector.entry(memory.sector.as_str().to_string()).or_insert(0) += 1;
        total_salience += memory.salience;
        memory_count += 1;
      }
    }

    if memory_count > 0 {
      stats.average_salience = total_salience / memory_count as f32;
    }

    Ok(stats)
  }

  /// Promote session-tier memories created in `session_id` to project tier
  /// once they've been used across at least `threshold` sessions.
  pub fn promote_session_memories(&self, session_id: &Uuid, threshold: usize) -> Result<usize> {
    let links = self.get_session_memory_links(session_id)?;
    let mut promoted = 0;

    for link in links {
      if link.usage_type != UsageType::Created {
        continue;
      }

      let usage_count = self.get_memory_usage_count(&link.memory_id)?;
      if usage_count < threshold {
        continue;
      }

      let Ok(memory_id) = link.memory_id.parse::<MemoryId>() else {
        warn!(memory_id = %link.memory_id, "invalid memory id in session link");
        continue;
      };
      if let Ok(Some(mut memory)) = self.get_memory(&memory_id) {
        if memory.tier == Tier::Session {
          memory.tier = Tier::Project;
          memory.updated_at = Utc::now();
          self.update_memory(&memory)?;
          promoted += 1;
        }
      }
    }

    Ok(promoted)
  }

  pub fn get_memory_usage_count(&self, memory_id: &str) -> Result<usize> {
    Ok(self.get_memory_session_links(memory_id)?.len())
  }

  /// Promote session-tier memories created in `session_id` whose salience
  /// already meets `salience_threshold`, independent of cross-session usage.
  pub fn promote_high_salience_memories(&self, session_id: &Uuid, salience_threshold: f32) -> Result<usize> {
    let links = self.get_session_memory_links(session_id)?;
    let mut promoted = 0;

    for link in links {
      if link.usage_type != UsageType::Created {
        continue;
      }

      let Ok(memory_id) = link.memory_id.parse::<MemoryId>() else {
        warn!(memory_id = %link.memory_id, "invalid memory id in session link");
        continue;
      };
      if let Ok(Some(mut memory)) = self.get_memory(&memory_id) {
        if memory.tier == Tier::Session && memory.salience >= salience_threshold {
          memory.tier = Tier::Project;
          memory.updated_at = Utc::now();
          self.update_memory(&memory)?;
          promoted += 1;
        }
      }
    }

    Ok(promoted)
  }

  pub fn delete_session_links(&self, session_id: &Uuid) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute("DELETE FROM session_memories WHERE session_id = ?1", params![session_id.to_string()])?;
      Ok(())
    })
  }

  pub fn delete_memory_links(&self, memory_id: &str) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute("DELETE FROM session_memories WHERE memory_id = ?1", params![memory_id])?;
      Ok(())
    })
  }

  pub fn delete_session_memory_link(&self, id: &Uuid) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute("DELETE FROM session_memories WHERE id = ?1", params![id.to_string()])?;
      Ok(())
    })
  }
}

fn row_to_link(row: &Row) -> rusqlite::Result<SessionMemoryLink> {
  let id: String = row.get(0)?;
  let session_id: String = row.get(1)?;
  let usage_type: String = row.get(3)?;

  Ok(SessionMemoryLink {
    id: Uuid::parse_str(&id).map_err(|_| rusqlite::Error::InvalidColumnType(0, "id".into(), rusqlite::types::Type::Text))?,
    session_id: Uuid::parse_str(&session_id)
      .map_err(|_| rusqlite::Error::InvalidColumnType(1, "session_id".into(), rusqlite::types::Type::Text))?,
    memory_id: row.get(2)?,
    usage_type: usage_type.parse().unwrap_or(UsageType::Recalled),
    linked_at: row.get(4)?,
  })
}
