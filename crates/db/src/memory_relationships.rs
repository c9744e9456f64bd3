// Memory Relationships table operations
//
// Tracks relationships between memories beyond simple supersession:
// Supersedes, Contradicts, RelatedTo, BuildsOn, Confirms, AppliesTo,
// DependsOn, AlternativeTo.

use engram_core::{MemoryId, MemoryRelationship, RelationshipType};
use rusqlite::{Row, params};
use uuid::Uuid;

use crate::connection::{DbError, ProjectDb, Result};

const RELATIONSHIP_COLUMNS: &str =
  "id, from_memory_id, to_memory_id, relationship_type, confidence, valid_from, valid_until, extracted_by, created_at";

impl ProjectDb {
  pub fn add_relationship(&self, relationship: &MemoryRelationship) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute(
        &format!("INSERT INTO memory_relationships ({RELATIONSHIP_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)"),
        params![
          relationship.id.to_string(),
          relationship.from_memory_id.to_string(),
          relationship.to_memory_id.to_string(),
          relationship.relationship_type.as_str(),
          relationship.confidence,
          relationship.valid_from,
          relationship.valid_until,
          relationship.extracted_by,
          relationship.created_at,
        ],
      )?;
      Ok(())
    })
  }

  pub fn create_relationship(
    &self,
    from: &MemoryId,
    to: &MemoryId,
    rel_type: RelationshipType,
    confidence: f32,
    extracted_by: &str,
  ) -> Result<MemoryRelationship> {
    let relationship = MemoryRelationship::new(*from, *to, rel_type, confidence, extracted_by);
    self.add_relationship(&relationship)?;
    Ok(relationship)
  }

  pub fn get_relationships_from(&self, memory_id: &MemoryId) -> Result<Vec<MemoryRelationship>> {
    self.with_reader(|conn| {
      let mut stmt = conn.prepare(&format!(
        "SELECT {RELATIONSHIP_COLUMNS} FROM memory_relationships WHERE from_memory_id = ?1"
      ))?;
      let rows = stmt.query_map(params![memory_id.to_string()], row_to_relationship)?;
      rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    })
  }

  pub fn get_relationships_to(&self, memory_id: &MemoryId) -> Result<Vec<MemoryRelationship>> {
    self.with_reader(|conn| {
      let mut stmt = conn.prepare(&format!(
        "SELECT {RELATIONSHIP_COLUMNS} FROM memory_relationships WHERE to_memory_id = ?1"
      ))?;
      let rows = stmt.query_map(params![memory_id.to_string()], row_to_relationship)?;
      rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    })
  }

  pub fn get_all_relationships(&self, memory_id: &MemoryId) -> Result<Vec<MemoryRelationship>> {
    self.with_reader(|conn| {
      let mut stmt = conn.prepare(&format!(
        "SELECT {RELATIONSHIP_COLUMNS} FROM memory_relationships WHERE from_memory_id = ?1 OR to_memory_id = ?1"
      ))?;
      let rows = stmt.query_map(params![memory_id.to_string()], row_to_relationship)?;
      rows.collect::<rusqlite::Result<Vec<_>>>().map_err(DbError::from)
    })
  }

  /// Relationships of a given type whose validity window currently holds.
  pub fn get_active_relationships_by_type(
    &self,
    memory_id: &MemoryId,
    rel_type: RelationshipType,
  ) -> Result<Vec<MemoryRelationship>> {
    let all = self.get_all_relationships(memory_id)?;
    Ok(
      all
        .into_iter()
        .filter(|r| r.relationship_type == rel_type && r.is_valid())
        .collect(),
    )
  }

  pub fn delete_relationship(&self, id: &Uuid) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute("DELETE FROM memory_relationships WHERE id = ?1", params![id.to_string()])?;
      Ok(())
    })
  }

  pub fn delete_relationships_for_memory(&self, memory_id: &MemoryId) -> Result<()> {
    self.with_writer(|conn| {
      conn.execute(
        "DELETE FROM memory_relationships WHERE from_memory_id = ?1 OR to_memory_id = ?1",
        params![memory_id.to_string()],
      )?;
      Ok(())
    })
  }
}

fn row_to_relationship(row: &Row) -> rusqlite::Result<MemoryRelationship> {
  let id: String = row.get(0)?;
  let from: String = row.get(1)?;
  let to: String = row.get(2)?;
  let relationship_type: String = row.get(3)?;

  Ok(MemoryRelationship {
    id: Uuid::parse_str(&id).map_err(|_| rusqlite::Error::InvalidColumnType(0, "id".into(), rusqlite::types::Type::Text))?,
    from_memory_id: from
      .parse()
      .map_err(|_| rusqlite::Error::InvalidColumnType(1, "from_memory_id".into(), rusqlite::types::Type::Text))?,
    to_memory_id: to
      .parse()
      .map_err(|_| rusqlite::Error::InvalidColumnType(2, "to_memory_id".into(), rusqlite::types::Type::Text))?,
    relationship_type: relationship_type.parse().unwrap_or(RelationshipType::RelatedTo),
    confidence: row.get(4)?,
    valid_from: row.get(5)?,
    valid_until: row.get(6)?,
    extracted_by: row.get(7)?,
    created_at: row.get(8)?,
  })
}
