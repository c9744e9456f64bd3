pub mod code;
pub mod config;
pub mod document;
pub mod error;
pub mod memory;
pub mod project;
pub mod validation;

pub use code::{CHARS_PER_TOKEN, Language};
pub use config::{
  ALL_TOOLS, Config, DecayConfig as ConfigDecay, EmbeddingConfig, EmbeddingProvider as ConfigEmbeddingProvider,
  INTERNAL_TOOLS, IndexConfig, PRESET_MINIMAL, PRESET_STANDARD, SearchConfig, ToolConfig, ToolPreset,
};
pub use document::{ChunkParams, Document, DocumentChunk, DocumentId, DocumentSource, chunk_text, extract_title};
pub use error::{CcEngramError, Error, Result};
pub use memory::{
  CreateMemoryRequest, Memory, MemoryId, MemoryRelationship, MemoryType, RelationshipType, Sector, Tier,
};
pub use project::{ProjectId, ProjectMetadata, find_git_root, resolve_project_path};
pub use validation::{
  HookInput, ValidationError, ValidationResult, optional_array, optional_bool, optional_enum, optional_f64,
  optional_f64_range, optional_i64, optional_i64_range, optional_string, optional_string_array, optional_string_min,
  optional_u64, require_array, require_bool, require_enum, require_f64, require_f64_range, require_i64,
  require_i64_range, require_string, require_string_array, require_string_min, require_string_range, require_u64,
};
