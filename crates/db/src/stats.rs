// Comprehensive statistics for the database

use crate::connection::{ProjectDb, Result};
use engram_core::{Sector, Tier};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Statistics for a project's memories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
  pub total: usize,
  pub by_sector: HashMap<String, usize>,
  pub by_tier: HashMap<String, usize>,
  pub by_salience: SalienceDistribution,
  pub superseded_count: usize,
}

/// Distribution of salience scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalienceDistribution {
  pub high: usize,     // >= 0.7
  pub medium: usize,   // >= 0.4 and < 0.7
  pub low: usize,      // >= 0.2 and < 0.4
  pub very_low: usize, // < 0.2
}

/// Statistics for code indexing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeStats {
  pub total_files: usize,
  pub by_language: HashMap<String, usize>,
  pub recent_indexed: Vec<RecentIndexActivity>,
}

/// Recent index activity record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentIndexActivity {
  pub file_path: String,
  pub language: String,
  pub indexed_at: String,
}

/// Combined project statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectStats {
  pub memories: MemoryStats,
  pub code: CodeStats,
  pub documents: DocumentStats,
}

/// Document statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentStats {
  pub total: usize,
  pub total_chunks: usize,
}

impl ProjectDb {
  /// Get comprehensive memory statistics
  pub fn get_memory_stats(&self) -> Result<MemoryStats> {
    let memories = self.list_memories(None, None, None)?;

    let mut by_sector: HashMap<String, usize> = HashMap::new();
    let mut by_tier: HashMap<String, usize> = HashMap::new();
    let mut high = 0;
    let mut medium = 0;
    let mut low = 0;
    let mut very_low = 0;
    let mut superseded_count = 0;

    for m in &memories {
      *by_sector.entry(m.sector.as_str().to_string()).or_insert(0) += 1;
      *by_tier.entry(m.tier.as_str().to_string()).or_insert(0) += 1;

      if m.salience >= 0.7 {
        high += 1;
      } else if m.salience >= 0.4 {
        medium += 1;
      } else if m.salience >= 0.2 {
        low += 1;
      } else {
        very_low += 1;
      }

      if m.superseded_by.is_some() {
        superseded_count += 1;
      }
    }

    // Ensure all sectors and tiers appear in the stats
    for sector in [
      Sector::Semantic,
      Sector::Episodic,
      Sector::Procedural,
      Sector::Emotional,
      Sector::Reflective,
    ] {
      by_sector.entry(sector.as_str().to_string()).or_insert(0);
    }
    for tier in [Tier::Session, Tier::Project] {
      by_tier.entry(tier.as_str().to_string()).or_insert(0);
    }

    Ok(MemoryStats {
      total: memories.len(),
      by_sector,
      by_tier,
      by_salience: SalienceDistribution {
        high,
        medium,
        low,
        very_low,
      },
      superseded_count,
    })
  }

  /// Get comprehensive code-indexing statistics for a project
  pub fn get_code_stats(&self, project_id: Uuid) -> Result<CodeStats> {
    let files = self.list_indexed_files(project_id)?;

    let mut by_language: HashMap<String, usize> = HashMap::new();
    let mut seen: HashSet<String> = HashSet::new();

    for file in &files {
      if let Some(lang) = &file.language {
        *by_language.entry(lang.clone()).or_insert(0) += 1;
      }
      seen.insert(file.path.clone());
    }

    let mut recent = files.clone();
    recent.sort_by(|a, b| b.last_indexed_at.cmp(&a.last_indexed_at));

    let recent_indexed: Vec<RecentIndexActivity> = recent
      .into_iter()
      .take(10)
      .map(|f| RecentIndexActivity {
        file_path: f.path,
        language: f.language.unwrap_or_else(|| "unknown".to_string()),
        indexed_at: f.last_indexed_at.to_rfc3339(),
      })
      .collect();

    Ok(CodeStats {
      total_files: seen.len(),
      by_language,
      recent_indexed,
    })
  }

  /// Get document statistics for a project
  pub fn get_document_stats(&self, project_id: Uuid) -> Result<DocumentStats> {
    let docs = self.list_documents(project_id)?;
    let total_chunks = docs
      .iter()
      .map(|d| self.list_document_chunks(&d.id).map(|c| c.len()))
      .collect::<Result<Vec<_>>>()?
      .into_iter()
      .sum();

    Ok(DocumentStats {
      total: docs.len(),
      total_chunks,
    })
  }

  /// Get all project statistics
  pub fn get_project_stats(&self, project_id: Uuid) -> Result<ProjectStats> {
    Ok(ProjectStats {
      memories: self.get_memory_stats()?,
      code: self.get_code_stats(project_id)?,
      documents: self.get_document_stats(project_id)?,
    })
  }
}
