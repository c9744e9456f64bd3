pub mod accumulators;
pub mod code_index;
pub mod connection;
pub mod documents;
pub mod embedding_models;
pub mod extraction_segments;
pub mod memories;
pub mod memory_relationships;
pub mod migrations;
pub mod session_memories;
pub mod sessions;
pub mod stats;

pub use accumulators::{CommandRecord, SegmentAccumulator, UserPrompt};
pub use code_index::{CodeIndexState, IndexedFile};
pub use connection::{
  DbError, ProjectDb, Result, default_cache_dir, default_config_dir, default_data_dir, default_port,
};
pub use documents::DocumentUpdateCheck;
pub use extraction_segments::{ExtractionSegment, ExtractionStats, ExtractionTrigger};
pub use migrations::{CURRENT_SCHEMA_VERSION, MIGRATIONS, Migration};
pub use session_memories::{SessionMemoryLink, SessionStats, UsageType};
pub use sessions::Session;
pub use stats::{CodeStats, DocumentStats, MemoryStats, ProjectStats, RecentIndexActivity, SalienceDistribution};
