use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a document (newtype for type safety)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
  pub fn new() -> Self {
    Self(Uuid::now_v7()) // Time-ordered UUIDs
  }

  pub fn from_uuid(id: Uuid) -> Self {
    Self(id)
  }

  pub fn as_uuid(&self) -> Uuid {
    self.0
  }
}

impl Default for DocumentId {
  fn default() -> Self {
    Self::new()
  }
}

impl std::fmt::Display for DocumentId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl std::str::FromStr for DocumentId {
  type Err = uuid::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(Self(Uuid::parse_str(s)?))
  }
}

/// Source type for ingested documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
  /// Plain text
  Txt,
  /// Markdown
  Md,
  /// Fetched from a URL
  Url,
  /// Source code file
  Code,
}

impl DocumentSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      DocumentSource::Txt => "txt",
      DocumentSource::Md => "md",
      DocumentSource::Url => "url",
      DocumentSource::Code => "code",
    }
  }
}

impl std::str::FromStr for DocumentSource {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "txt" => Ok(DocumentSource::Txt),
      "md" => Ok(DocumentSource::Md),
      "url" => Ok(DocumentSource::Url),
      "code" => Ok(DocumentSource::Code),
      _ => Err(format!("Unknown document source: {}", s)),
    }
  }
}

/// A contiguous slice of a document, the unit of vector search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
  pub id: DocumentId,
  pub document_id: DocumentId,
  pub project_id: Uuid,

  /// The text content of this chunk
  pub content: String,

  /// Chunk index within the document
  pub chunk_index: usize,

  /// Byte offset of the chunk start in the original document
  pub start_offset: usize,

  /// Byte offset of the chunk end in the original document
  pub end_offset: usize,

  /// Estimated token count (chars / CHARS_PER_TOKEN)
  pub tokens_estimate: u32,

  /// Timestamps
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl DocumentChunk {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    document_id: DocumentId,
    project_id: Uuid,
    content: String,
    chunk_index: usize,
    start_offset: usize,
    end_offset: usize,
  ) -> Self {
    let now = Utc::now();
    let tokens_estimate = (content.len() / crate::code::CHARS_PER_TOKEN).max(1) as u32;
    Self {
      id: DocumentId::new(),
      document_id,
      project_id,
      content,
      chunk_index,
      start_offset,
      end_offset,
      tokens_estimate,
      created_at: now,
      updated_at: now,
    }
  }
}

/// Metadata about an ingested document: text file, web page, or code file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
  pub id: DocumentId,
  pub project_id: Uuid,

  /// Local filesystem path, when ingested from a file
  pub source_path: Option<String>,

  /// Origin URL, when ingested from the web
  pub source_url: Option<String>,

  /// Source type
  pub source_type: DocumentSource,

  /// Title: markdown H1 if present, else first line trimmed to 100 chars
  pub title: Option<String>,

  /// Full document content, kept to allow re-chunking without refetch
  pub full_content: Option<String>,

  /// SHA-256 over the full content, used for unchanged-content no-ops
  pub checksum: String,

  /// Whether this document is a source code file
  pub is_code: bool,

  /// Detected language, set when `is_code` is true
  pub language: Option<String>,

  /// Timestamps
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Document {
  #[allow(clippy::too_many_arguments)]
  pub fn with_content(
    project_id: Uuid,
    source_path: Option<String>,
    source_url: Option<String>,
    source_type: DocumentSource,
    content: String,
    is_code: bool,
    language: Option<String>,
  ) -> Self {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let checksum = format!("{:x}", hasher.finalize());
    let title = extract_title(&content);

    let now = Utc::now();
    Self {
      id: DocumentId::new(),
      project_id,
      source_path,
      source_url,
      source_type,
      title,
      full_content: Some(content),
      checksum,
      is_code,
      language,
      created_at: now,
      updated_at: now,
    }
  }
}

/// Extract a document title: the first markdown H1, else the first line
/// trimmed to 100 chars.
pub fn extract_title(content: &str) -> Option<String> {
  for line in content.lines() {
    let trimmed = line.trim();
    if let Some(h1) = trimmed.strip_prefix("# ") {
      let h1 = h1.trim();
      if !h1.is_empty() {
        return Some(h1.to_string());
      }
    }
  }
  content.lines().find(|l| !l.trim().is_empty()).map(|l| {
    let l = l.trim();
    if l.chars().count() > 100 {
      l.chars().take(100).collect()
    } else {
      l.to_string()
    }
  })
}

/// Parameters for chunking documents
#[derive(Debug, Clone)]
pub struct ChunkParams {
  /// Target chunk size in characters
  pub chunk_size: usize,
  /// Overlap between chunks in characters
  pub overlap: usize,
}

impl Default for ChunkParams {
  fn default() -> Self {
    Self {
      chunk_size: 1000,
      overlap: 200,
    }
  }
}

/// Split text into sentences using regex-like patterns
fn split_sentences(text: &str) -> Vec<&str> {
  let mut sentences = Vec::new();
  let mut current_start = 0;
  let chars: Vec<char> = text.chars().collect();

  let mut i = 0;
  while i < chars.len() {
    // Check for sentence-ending punctuation followed by whitespace or end
    if matches!(chars[i], '.' | '!' | '?') {
      // Look ahead to see if this is a sentence boundary
      let next_idx = i + 1;
      if next_idx >= chars.len() || chars[next_idx].is_whitespace() {
        // Check for abbreviations (single capital letter before period)
        let is_abbreviation = i > 0 && i < chars.len() - 1 && chars[i] == '.' && {
          let prev = chars[i - 1];
          let next_after_space = chars.get(i + 2);
          // Single letter abbreviation like "A." or "U.S."
          (prev.is_uppercase() && (i < 2 || !chars[i - 2].is_alphabetic()))
            || (next_after_space.is_some_and(|&c| c.is_lowercase()))
        };

        if !is_abbreviation {
          // Find the byte position for slicing
          let byte_pos = text.char_indices().nth(next_idx).map(|(b, _)| b).unwrap_or(text.len());
          let start_byte = text.char_indices().nth(current_start).map(|(b, _)| b).unwrap_or(0);

          let sentence = &text[start_byte..byte_pos];
          if !sentence.trim().is_empty() {
            sentences.push(sentence.trim());
          }
          current_start = next_idx;
          while current_start < chars.len() && chars[current_start].is_whitespace() {
            current_start += 1;
          }
        }
      }
    }
    i += 1;
  }

  // Add remaining text as final sentence
  if current_start < chars.len() {
    let start_byte = text.char_indices().nth(current_start).map(|(b, _)| b).unwrap_or(0);
    let remainder = &text[start_byte..];
    if !remainder.trim().is_empty() {
      sentences.push(remainder.trim());
    }
  }

  sentences
}

/// Split text into paragraphs (separated by double newlines)
fn split_paragraphs(text: &str) -> Vec<&str> {
  text
    .split("\n\n")
    .flat_map(|p| p.split("\r\n\r\n"))
    .map(|p| p.trim())
    .filter(|p| !p.is_empty())
    .collect()
}

/// Chunk text content into overlapping segments with sentence-aware splitting
///
/// This function chunks text by:
/// 1. First splitting into paragraphs (double newlines)
/// 2. If paragraphs are too large, splitting into sentences
/// 3. Combining sentences/paragraphs until chunk_size is reached
/// 4. Using overlap to maintain context between chunks
pub fn chunk_text(content: &str, params: &ChunkParams) -> Vec<(String, usize)> {
  let mut chunks = Vec::new();

  if content.is_empty() {
    return chunks;
  }

  if content.len() <= params.chunk_size {
    chunks.push((content.to_string(), 0));
    return chunks;
  }

  // Split into paragraphs first
  let paragraphs = split_paragraphs(content);

  let mut current_chunk = String::new();
  let mut current_offset: usize = 0;
  let mut chunk_start_offset: usize = 0;

  for paragraph in paragraphs {
    // If this paragraph alone is larger than chunk_size, split by sentences
    if paragraph.len() > params.chunk_size {
      // Flush current chunk first
      if !current_chunk.is_empty() {
        chunks.push((current_chunk.trim().to_string(), chunk_start_offset));
        // Calculate overlap start
        let overlap_start = current_chunk.len().saturating_sub(params.overlap);
        current_chunk = current_chunk[overlap_start..].to_string();
        chunk_start_offset = current_offset.saturating_sub(params.overlap);
      }

      // Split paragraph into sentences
      let sentences = split_sentences(paragraph);
      for sentence in sentences {
        if current_chunk.len() + sentence.len() + 1 > params.chunk_size && !current_chunk.is_empty() {
          chunks.push((current_chunk.trim().to_string(), chunk_start_offset));
          // Keep overlap
          let overlap_start = current_chunk.len().saturating_sub(params.overlap);
          current_chunk = current_chunk[overlap_start..].to_string();
          chunk_start_offset = current_offset.saturating_sub(params.overlap);
        }

        if !current_chunk.is_empty() && !current_chunk.ends_with(' ') && !current_chunk.ends_with('\n') {
          current_chunk.push(' ');
        }
        current_chunk.push_str(sentence);
        current_offset += sentence.len() + 1; // +1 for space
      }
    } else {
      // Add whole paragraph
      if current_chunk.len() + paragraph.len() + 2 > params.chunk_size && !current_chunk.is_empty() {
        chunks.push((current_chunk.trim().to_string(), chunk_start_offset));
        // Keep overlap
        let overlap_start = current_chunk.len().saturating_sub(params.overlap);
        current_chunk = current_chunk[overlap_start..].to_string();
        chunk_start_offset = current_offset.saturating_sub(params.overlap);
      }

      if !current_chunk.is_empty() {
        current_chunk.push_str("\n\n");
      }
      current_chunk.push_str(paragraph);
      current_offset += paragraph.len() + 2; // +2 for paragraph separator
    }
  }

  // Flush remaining content
  if !current_chunk.trim().is_empty() {
    chunks.push((current_chunk.trim().to_string(), chunk_start_offset));
  }

  // Ensure we don't return empty chunks
  chunks.retain(|(s, _)| !s.is_empty());

  chunks
}
