// Segment accumulator table operations
//
// Tracks work context during a session segment between extraction runs:
// user prompts, files read/modified, commands run, errors, searches and
// completed tasks. One accumulator is live per session at a time; it is
// cleared once the extraction pipeline consumes it.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::connection::{DbError, ProjectDb, Result};

const ACCUMULATOR_COLUMNS: &str = "id, session_id, project_id, segment_start, user_prompts, files_read, \
  files_modified, commands_run, errors_encountered, searches_performed, completed_tasks, tool_call_count, \
  last_assistant_message, updated_at";

/// A user prompt captured during a segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPrompt {
  pub prompt: String,
  pub category: Option<String>,
  pub is_extractable: bool,
  pub timestamp: i64,
}

/// A shell command captured during a segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
  pub command: String,
  pub exit_code: i32,
}

/// Accumulates work context for a session between extraction runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentAccumulator {
  pub id: Uuid,
  pub session_id: Uuid,
  pub project_id: Uuid,
  pub segment_start: DateTime<Utc>,
  pub user_prompts: Vec<UserPrompt>,
  pub files_read: Vec<String>,
  pub files_modified: Vec<String>,
  pub commands_run: Vec<CommandRecord>,
  pub errors_encountered: Vec<String>,
  pub searches_performed: Vec<String>,
  pub completed_tasks: Vec<String>,
  pub last_assistant_message: Option<String>,
  pub tool_call_count: u32,
  pub updated_at: DateTime<Utc>,
}

impl SegmentAccumulator {
  pub fn new(session_id: Uuid, project_id: Uuid) -> Self {
    let now = Utc::now();
    Self {
      id: Uuid::now_v7(),
      session_id,
      project_id,
      segment_start: now,
      user_prompts: Vec::new(),
      files_read: Vec::new(),
      files_modified: Vec::new(),
      commands_run: Vec::new(),
      errors_encountered: Vec::new(),
      searches_performed: Vec::new(),
      completed_tasks: Vec::new(),
      last_assistant_message: None,
      tool_call_count: 0,
      updated_at: now,
    }
  }

  pub fn add_user_prompt(&mut self, prompt: &str, category: Option<String>, is_extractable: bool) {
    self.user_prompts.push(UserPrompt {
      prompt: prompt.to_string(),
      category,
      is_extractable,
      timestamp: Utc::now().timestamp_millis(),
    });
    self.updated_at = Utc::now();
  }

  /// Record a file read, deduplicated and capped at 100 entries.
  pub fn add_file_read(&mut self, path: &str) {
    if !self.files_read.iter().any(|p| p == path) && self.files_read.len() < 100 {
      self.files_read.push(path.to_string());
      self.updated_at = Utc::now();
    }
  }

  /// Record a file modification, deduplicated and capped at 100 entries.
  pub fn add_file_modified(&mut self, path: &str) {
    if !self.files_modified.iter().any(|p| p == path) && self.files_modified.len() < 100 {
      self.files_modified.push(path.to_string());
      self.updated_at = Utc::now();
    }
  }

  /// Record a command run, capped at 50 entries with the command truncated to 200 chars.
  pub fn add_command(&mut self, command: &str, exit_code: i32) {
    if self.commands_run.len() >= 50 {
      return;
    }
    let command = if command.len() > 200 {
      format!("{}...", &command[..200])
    } else {
      command.to_string()
    };
    self.commands_run.push(CommandRecord { command, exit_code });
    self.updated_at = Utc::now();
  }

  /// Record an error, capped at 20 entries.
  pub fn add_error(&mut self, error: &str) {
    if self.errors_encountered.len() < 20 {
      self.errors_encountered.push(error.to_string());
      self.updated_at = Utc::now();
    }
  }

  /// Add a search pattern (deduplicated)
  pub fn add_search(&mut self, pattern: &str) {
    if !self.searches_performed.contains(&pattern.to_string()) && self.searches_performed.len() < 50 {
      self.searches_performed.push(pattern.to_string());
      self.updated_at = Utc::now();
    }
  }

  /// Add a completed task (deduplicated)
  pub fn add_completed_task(&mut self, task: &str) {
    if !self.completed_tasks.contains(&task.to_string()) && self.completed_tasks.len() < 50 {
      self.completed_tasks.push(task.to_string());
      self.updated_at = Utc::now();
    }
  }

  /// Set the last assistant message (truncated to 10KB)
  pub fn set_last_assistant_message(&mut self, message: &str) {
    self.last_assistant_message = Some(if message.len() > 10240 {
      format!("{}...", &message[..10240])
    } else {
      message.to_string()
    });
    self.updated_at = Utc::now();
  }

  /// Increment tool call count
  pub fn increment_tool_calls(&mut self) {
    self.tool_call_count += 1;
    self.updated_at = Utc::now();
  }

  /// Check if this segment has meaningful work to extract
  pub fn has_meaningful_work(&self) -> bool {
    self.tool_call_count >= 3
      || !self.files_modified.is_empty()
      || !self.completed_tasks.is_empty()
      || !self.errors_encountered.is_empty()
  }

  /// Check for todo_completion trigger: ≥3 tasks AND ≥5 tool calls
  pub fn should_trigger_todo_extraction(&self) -> bool {
    self.completed_tasks.len() >= 3 && self.tool_call_count >= 5
  }

  /// Reset for a new segment while preserving IDs
  pub fn reset(&mut self) {
    let now = Utc::now();
    self.id = Uuid::now_v7();
    self.segment_start = now;
    self.user_prompts.clear();
    self.files_read.clear();
    self.files_modified.clear();
    self.commands_run.clear();
    self.errors_encountered.clear();
    self.searches_performed.clear();
    self.completed_tasks.clear();
    self.last_assistant_message = None;
    self.tool_call_count = 0;
    self.updated_at = now;
  }
}

impl ProjectDb {
  /// Save or update the accumulator for a session (only one active per session).
  pub fn save_accumulator(&self, accumulator: &SegmentAccumulator) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute(
        &format!(
          "INSERT INTO segment_accumulators ({ACCUMULATOR_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)
           ON CONFLICT(session_id) DO UPDATE SET
             segment_start = excluded.segment_start, user_prompts = excluded.user_prompts,
             files_read = excluded.files_read, files_modified = excluded.files_modified,
             commands_run = excluded.commands_run, errors_encountered = excluded.errors_encountered,
             searches_performed = excluded.searches_performed, completed_tasks = excluded.completed_tasks,
             tool_call_count = excluded.tool_call_count, last_assistant_message = excluded.last_assistant_message,
             updated_at = excluded.updated_at"
        ),
        params![
          accumulator.id.to_string(),
          accumulator.session_id.to_string(),
          accumulator.project_id.to_string(),
          accumulator.segment_start,
          serde_json::to_string(&accumulator.user_prompts)?,
          serde_json::to_string(&accumulator.files_read)?,
          serde_json::to_string(&accumulator.files_modified)?,
          serde_json::to_string(&accumulator.commands_run)?,
          serde_json::to_string(&accumulator.errors_encountered)?,
          serde_json::to_string(&accumulator.searches_performed)?,
          serde_json::to_string(&accumulator.completed_tasks)?,
          accumulator.tool_call_count,
          accumulator.last_assistant_message,
          accumulator.updated_at,
        ],
      )?;
      Ok(())
    })
  }

  /// Get the accumulator for a session
  pub fn get_accumulator(&self, session_id: &Uuid) -> Result<Option<SegmentAccumulator>> {
    self.with_reader(|conn| {
      conn
        .query_row(
          &format!("SELECT {ACCUMULATOR_COLUMNS} FROM segment_accumulators WHERE session_id = ?1"),
          params![session_id.to_string()],
          row_to_accumulator,
        )
        .optional()
    })
  }

  /// Delete a segment accumulator (called after extraction completes)
  pub fn clear_accumulator(&self, session_id: &Uuid) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute("DELETE FROM segment_accumulators WHERE session_id = ?1", params![session_id.to_string()])?;
      Ok(())
    })
  }

  /// List all active accumulators (for cleanup/resume)
  pub fn list_accumulators(&self) -> Result<Vec<SegmentAccumulator>> {
    self.with_reader(|conn| {
      let mut stmt = conn.prepare(&format!("SELECT {ACCUMULATOR_COLUMNS} FROM segment_accumulators"))?;
      let rows = stmt.query_map([], row_to_accumulator)?;
      rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    })
  }
}

fn row_to_accumulator(row: &Row) -> rusqlite::Result<SegmentAccumulator> {
  let id: String = row.get(0)?;
  let session_id: String = row.get(1)?;
  let project_id: String = row.get(2)?;
  let user_prompts: String = row.get(4)?;
  let files_read: String = row.get(5)?;
  let files_modified: String = row.get(6)?;
  let commands_run: String = row.get(7)?;
  let errors_encountered: String = row.get(8)?;
  let searches_performed: String = row.get(9)?;
  let completed_tasks: String = row.get(10)?;

  let invalid = |col: &'static str| rusqlite::Error::InvalidColumnType(0, col.into(), rusqlite::types::Type::Text);

  Ok(SegmentAccumulator {
    id: Uuid::parse_str(&id).map_err(|_| invalid("id"))?,
    session_id: Uuid::parse_str(&session_id).map_err(|_| invalid("session_id"))?,
    project_id: Uuid::parse_str(&project_id).map_err(|_| invalid("project_id"))?,
    segment_start: row.get(3)?,
    user_prompts: serde_json::from_str(&user_prompts).unwrap_or_default(),
    files_read: serde_json::from_str(&files_read).unwrap_or_default(),
    files_modified: serde_json::from_str(&files_modified).unwrap_or_default(),
    commands_run: serde_json::from_str(&commands_run).unwrap_or_default(),
    errors_encountered: serde_json::from_str(&errors_encountered).unwrap_or_default(),
    searches_performed: serde_json::from_str(&searches_performed).unwrap_or_default(),
    completed_tasks: serde_json::from_str(&completed_tasks).unwrap_or_default(),
    last_assistant_message: row.get(11)?,
    tool_call_count: row.get(12)?,
    updated_at: row.get(13)?,
  })
}
