// Extraction segment persistence - records extraction runs for auditing and debugging
//
// Each extraction run (triggered by user_prompt, pre_compact, stop, or todo_completion)
// is recorded with metadata about what was extracted and how long it took.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::connection::{DbError, ProjectDb, Result};

const SEGMENT_COLUMNS: &str = "id, session_id, project_id, trigger, user_prompts_json, files_read_count, \
  files_modified_count, tool_call_count, memories_extracted, extraction_duration_ms, input_tokens, output_tokens, \
  model_used, error, created_at";

/// Extraction trigger type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionTrigger {
  /// New user prompt submitted (segment boundary)
  UserPrompt,
  /// Before LLM context compaction
  PreCompact,
  /// End of session/conversation
  Stop,
  /// 3+ tasks completed AND 5+ tool calls
  TodoCompletion,
}

impl ExtractionTrigger {
  pub fn as_str(&self) -> &'static str {
    match self {
      ExtractionTrigger::UserPrompt => "user_prompt",
      ExtractionTrigger::PreCompact => "pre_compact",
      ExtractionTrigger::Stop => "stop",
      ExtractionTrigger::TodoCompletion => "todo_completion",
    }
  }
}

impl std::str::FromStr for ExtractionTrigger {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "user_prompt" => Ok(ExtractionTrigger::UserPrompt),
      "pre_compact" => Ok(ExtractionTrigger::PreCompact),
      "stop" => Ok(ExtractionTrigger::Stop),
      "todo_completion" => Ok(ExtractionTrigger::TodoCompletion),
      _ => Err(format!("Unknown extraction trigger: {}", s)),
    }
  }
}

/// Record of an extraction run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSegment {
  pub id: Uuid,
  pub session_id: Uuid,
  pub project_id: Uuid,
  pub trigger: ExtractionTrigger,
  pub user_prompts_json: String,
  pub files_read_count: u32,
  pub files_modified_count: u32,
  pub tool_call_count: u32,
  pub memories_extracted: u32,
  pub extraction_duration_ms: u32,
  pub input_tokens: Option<u32>,
  pub output_tokens: Option<u32>,
  pub model_used: Option<String>,
  pub error: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl ExtractionSegment {
  /// Create a new extraction segment record
  pub fn new(
    session_id: Uuid,
    project_id: Uuid,
    trigger: ExtractionTrigger,
    user_prompts: &[String],
    files_read_count: u32,
    files_modified_count: u32,
    tool_call_count: u32,
  ) -> Self {
    Self {
      id: Uuid::now_v7(),
      session_id,
      project_id,
      trigger,
      user_prompts_json: serde_json::to_string(user_prompts).unwrap_or_else(|_| "[]".to_string()),
      files_read_count,
      files_modified_count,
      tool_call_count,
      memories_extracted: 0,
      extraction_duration_ms: 0,
      input_tokens: None,
      output_tokens: None,
      model_used: None,
      error: None,
      created_at: Utc::now(),
    }
  }

  /// Record successful extraction results
  pub fn record_success(
    &mut self,
    memories_extracted: u32,
    duration_ms: u32,
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
    model: Option<&str>,
  ) {
    self.memories_extracted = memories_extracted;
    self.extraction_duration_ms = duration_ms;
    self.input_tokens = input_tokens;
    self.output_tokens = output_tokens;
    self.model_used = model.map(|s| s.to_string());
  }

  /// Record extraction failure
  pub fn record_failure(&mut self, error: &str, duration_ms: u32) {
    self.error = Some(error.to_string());
    self.extraction_duration_ms = duration_ms;
  }
}

impl ProjectDb {
  /// Save an extraction segment record
  pub fn save_extraction_segment(&self, segment: &ExtractionSegment) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute(
        &format!(
          "INSERT INTO extraction_segments ({SEGMENT_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)"
        ),
        params![
          segment.id.to_string(),
          segment.session_id.to_string(),
          segment.project_id.to_string(),
          segment.trigger.as_str(),
          segment.user_prompts_json,
          segment.files_read_count,
          segment.files_modified_count,
          segment.tool_call_count,
          segment.memories_extracted,
          segment.extraction_duration_ms,
          segment.input_tokens,
          segment.output_tokens,
          segment.model_used,
          segment.error,
          segment.created_at,
        ],
      )?;
      Ok(())
    })
  }

  /// Get an extraction segment by ID
  pub fn get_extraction_segment(&self, id: &Uuid) -> Result<Option<ExtractionSegment>> {
    self.with_reader(|conn| {
      conn
        .query_row(
          &format!("SELECT {SEGMENT_COLUMNS} FROM extraction_segments WHERE id = ?1"),
          params![id.to_string()],
          row_to_segment,
        )
        .optional()
    })
  }

  /// List extraction segments for a session, most recent first
  pub fn list_extraction_segments(&self, session_id: &Uuid, limit: Option<usize>) -> Result<Vec<ExtractionSegment>> {
    self.with_reader(|conn| {
      let mut sql =
        format!("SELECT {SEGMENT_COLUMNS} FROM extraction_segments WHERE session_id = ?1 ORDER BY created_at DESC");
      if let Some(l) = limit {
        sql.push_str(&format!(" LIMIT {l}"));
      }
      let mut stmt = conn.prepare(&sql)?;
      let rows = stmt.query_map(params![session_id.to_string()], row_to_segment)?;
      rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    })
  }

  /// Get extraction statistics for a project
  pub fn extraction_stats(&self, project_id: &Uuid) -> Result<ExtractionStats> {
    let segments = self.with_reader(|conn| {
      let mut stmt = conn.prepare(&format!("SELECT {SEGMENT_COLUMNS} FROM extraction_segments WHERE project_id = ?1"))?;
      let rows = stmt.query_map(params![project_id.to_string()], row_to_segment)?;
      rows.collect::<rusqlite::Result<Vec<_>>>()
    })?;

    let mut stats = ExtractionStats::default();
    for segment in segments {
      stats.total_extractions += 1;
      stats.total_memories_extracted += segment.memories_extracted as u64;

      if segment.error.is_some() {
        stats.failed_extractions += 1;
      }

      match segment.trigger {
        ExtractionTrigger::UserPrompt => stats.user_prompt_triggers += 1,
        ExtractionTrigger::PreCompact => stats.pre_compact_triggers += 1,
        ExtractionTrigger::Stop => stats.stop_triggers += 1,
        ExtractionTrigger::TodoCompletion => stats.todo_completion_triggers += 1,
      }
    }

    Ok(stats)
  }
}

/// Statistics about extraction runs
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ExtractionStats {
  pub total_extractions: u64,
  pub failed_extractions: u64,
  pub total_memories_extracted: u64,
  pub user_prompt_triggers: u64,
  pub pre_compact_triggers: u64,
  pub stop_triggers: u64,
  pub todo_completion_triggers: u64,
}

fn row_to_segment(row: &Row) -> rusqlite::Result<ExtractionSegment> {
  let id: String = row.get(0)?;
  let session_id: String = row.get(1)?;
  let project_id: String = row.get(2)?;
  let trigger: String = row.get(3)?;

  let invalid = |col: &'static str| rusqlite::Error::InvalidColumnType(0, col.into(), rusqlite::types::Type::Text);

  Ok(ExtractionSegment {
    id: Uuid::parse_str(&id).map_err(|_| invalid("id"))?,
    session_id: Uuid::parse_str(&session_id).map_err(|_| invalid("session_id"))?,
    project_id: Uuid::parse_str(&project_id).map_err(|_| invalid("project_id"))?,
    trigger: trigger.parse().unwrap_or(ExtractionTrigger::Stop),
    user_prompts_json: row.get(4)?,
    files_read_count: row.get(5)?,
    files_modified_count: row.get(6)?,
    tool_call_count: row.get(7)?,
    memories_extracted: row.get(8)?,
    extraction_duration_ms: row.get(9)?,
    input_tokens: row.get(10)?,
    output_tokens: row.get(11)?,
    model_used: row.get(12)?,
    error: row.get(13)?,
    created_at: row.get(14)?,
  })
}
