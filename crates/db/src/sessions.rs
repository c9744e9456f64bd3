// Sessions table operations

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::connection::{DbError, ProjectDb, Result};

/// A session record: one continuous coding-assistant conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
  pub id: Uuid,
  pub project_id: Uuid,
  pub started_at: DateTime<Utc>,
  pub ended_at: Option<DateTime<Utc>>,
  pub summary: Option<String>,
  pub context: Option<serde_json::Value>,
}

impl Session {
  pub fn new(project_id: Uuid) -> Self {
    Self {
      id: Uuid::now_v7(),
      project_id,
      started_at: Utc::now(),
      ended_at: None,
      summary: None,
      context: None,
    }
  }
}

impl ProjectDb {
  pub fn add_session(&self, session: &Session) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute(
        "INSERT INTO sessions (id, project_id, started_at, ended_at, summary, context)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
          session.id.to_string(),
          session.project_id.to_string(),
          session.started_at,
          session.ended_at,
          session.summary,
          session.context.as_ref().map(serde_json::to_string).transpose()?,
        ],
      )?;
      Ok(())
    })
  }

  pub fn get_session(&self, id: &Uuid) -> Result<Option<Session>> {
    self.with_reader(|conn| {
      conn
        .query_row(
          "SELECT id, project_id, started_at, ended_at, summary, context FROM sessions WHERE id = ?1",
          params![id.to_string()],
          row_to_session,
        )
        .optional()
    })
  }

  pub fn update_session(&self, session: &Session) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute(
        "UPDATE sessions SET ended_at = ?2, summary = ?3, context = ?4 WHERE id = ?1",
        params![
          session.id.to_string(),
          session.ended_at,
          session.summary,
          session.context.as_ref().map(serde_json::to_string).transpose()?,
        ],
      )?;
      Ok(())
    })
  }

  pub fn end_session(&self, id: &Uuid, summary: Option<String>) -> Result<()> {
    if let Some(mut session) = self.get_session(id)? {
      session.ended_at = Some(Utc::now());
      session.summary = summary;
      self.update_session(&session)?;
    }
    Ok(())
  }

  pub fn list_sessions(&self, project_id: Option<&Uuid>, limit: Option<usize>) -> Result<Vec<Session>> {
    self.with_reader(|conn| {
      let mut sql =
        "SELECT id, project_id, started_at, ended_at, summary, context FROM sessions".to_string();
      if project_id.is_some() {
        sql.push_str(" WHERE project_id = ?1");
      }
      sql.push_str(" ORDER BY started_at DESC");
      if let Some(l) = limit {
        sql.push_str(&format!(" LIMIT {l}"));
      }

      let mut stmt = conn.prepare(&sql)?;
      let rows = match project_id {
        Some(pid) => stmt.query_map(params![pid.to_string()], row_to_session)?,
        None => stmt.query_map([], row_to_session)?,
      };
      rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    })
  }

  pub fn recent_sessions(&self, project_id: &Uuid, limit: usize) -> Result<Vec<Session>> {
    self.list_sessions(Some(project_id), Some(limit))
  }

  /// Most recent session for a project that hasn't ended yet, ending any
  /// session older than `max_age_hours` along the way.
  pub fn get_or_end_active_session(&self, project_id: &Uuid, max_age_hours: u64) -> Result<Option<Session>> {
    let sessions: Vec<Session> = self
      .with_reader(|conn| {
        let mut stmt = conn.prepare(
          "SELECT id, project_id, started_at, ended_at, summary, context FROM sessions
           WHERE project_id = ?1 AND ended_at IS NULL ORDER BY started_at DESC",
        )?;
        let rows = stmt.query_map(params![project_id.to_string()], row_to_session)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
      })?;

    if sessions.is_empty() {
      return Ok(None);
    }

    let now = Utc::now();
    let max_age = chrono::Duration::hours(max_age_hours as i64);
    let mut active: Option<Session> = None;

    for session in sessions {
      if now.signed_duration_since(session.started_at) > max_age {
        self.end_session(&session.id, Some("Session timed out".to_string()))?;
      } else if active.is_none() {
        active = Some(session);
      }
    }

    Ok(active)
  }

  /// End any session still open past `max_age_hours`, regardless of project.
  pub fn cleanup_stale_sessions(&self, max_age_hours: u64) -> Result<usize> {
    let sessions: Vec<Session> = self
      .with_reader(|conn| {
        let mut stmt = conn.prepare(
          "SELECT id, project_id, started_at, ended_at, summary, context FROM sessions WHERE ended_at IS NULL",
        )?;
        let rows = stmt.query_map([], row_to_session)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
      })?;

    let now = Utc::now();
    let max_age = chrono::Duration::hours(max_age_hours as i64);
    let mut cleaned = 0;

    for session in sessions {
      if now.signed_duration_since(session.started_at) > max_age {
        self.end_session(&session.id, Some("Session timed out (cleanup)".to_string()))?;
        cleaned += 1;
      }
    }

    Ok(cleaned)
  }

  pub fn delete_session(&self, id: &Uuid) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute("DELETE FROM sessions WHERE id = ?1", params![id.to_string()])?;
      Ok(())
    })
  }

  pub fn count_sessions(&self, project_id: &Uuid) -> Result<usize> {
    self.with_reader(|conn| {
      let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sessions WHERE project_id = ?1",
        params![project_id.to_string()],
        |r| r.get(0),
      )?;
      Ok(count as usize)
    })
  }
}

fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
  let id: String = row.get(0)?;
  let project_id: String = row.get(1)?;
  let context: Option<String> = row.get(5)?;

  Ok(Session {
    id: Uuid::parse_str(&id).map_err(|_| rusqlite::Error::InvalidColumnType(0, "id".into(), rusqlite::types::Type::Text))?,
    project_id: Uuid::parse_str(&project_id)
      .map_err(|_| rusqlite::Error::InvalidColumnType(1, "project_id".into(), rusqlite::types::Type::Text))?,
    started_at: row.get(2)?,
    ended_at: row.get(3)?,
    summary: row.get(4)?,
    context: context.and_then(|c| serde_json::from_str(&c).ok()),
  })
}
