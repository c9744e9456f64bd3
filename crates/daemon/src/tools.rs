use crate::projects::ProjectRegistry;
use crate::router::{Request, Response};
use chrono::Utc;
use embedding::EmbeddingProvider;
use engram_core::{
  ChunkParams, Document, DocumentChunk, DocumentId, DocumentSource, Memory, MemoryId, MemoryType, RelationshipType,
  Sector, Tier, chunk_text,
};
use extract::{DuplicateMatch, content_hash, extract_concepts, extract_files, simhash};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cosine similarity between two equal-length vectors, clamped to [0, 1].
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() || a.is_empty() {
    return 0.0;
  }
  let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
  let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
  let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
  if norm_a == 0.0 || norm_b == 0.0 {
    return 0.0;
  }
  (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

fn parse_tier(s: &str) -> Option<Tier> {
  match s.to_lowercase().as_str() {
    "session" => Some(Tier::Session),
    "project" => Some(Tier::Project),
    _ => None,
  }
}

/// Fixed hybrid-fusion bonus per sector: emotional/reflective content ranks
/// slightly higher than the rest.
fn sector_bonus(sector: Sector) -> f32 {
  match sector {
    Sector::Emotional | Sector::Reflective => 0.05,
    Sector::Episodic | Sector::Semantic | Sector::Procedural => 0.0,
  }
}

/// Handler for MCP tool calls
pub struct ToolHandler {
  registry: Arc<ProjectRegistry>,
  embedding: Option<Arc<dyn EmbeddingProvider>>,
}

impl ToolHandler {
  pub fn new(registry: Arc<ProjectRegistry>) -> Self {
    Self {
      registry,
      embedding: None,
    }
  }

  pub fn with_embedding(registry: Arc<ProjectRegistry>, embedding: Arc<dyn EmbeddingProvider>) -> Self {
    Self {
      registry,
      embedding: Some(embedding),
    }
  }

  /// Get embedding for a query, with fallback to None if provider unavailable
  async fn get_embedding(&self, text: &str) -> Option<Vec<f32>> {
    if let Some(ref provider) = self.embedding {
      match provider.embed(text).await {
        Ok(vec) => Some(vec),
        Err(e) => {
          warn!("Embedding failed: {}", e);
          None
        }
      }
    } else {
      None
    }
  }

  /// Get embeddings for multiple texts in a batch (more efficient for bulk operations)
  async fn get_embeddings_batch(&self, texts: &[&str]) -> Vec<Option<Vec<f32>>> {
    if texts.is_empty() {
      return vec![];
    }
    if let Some(ref provider) = self.embedding {
      match provider.embed_batch(texts).await {
        Ok(vecs) => vecs.into_iter().map(Some).collect(),
        Err(e) => {
          warn!("Batch embedding failed: {}", e);
          vec![None; texts.len()]
        }
      }
    } else {
      vec![None; texts.len()]
    }
  }

  /// Register the currently configured embedding model with the database, if any.
  /// `memory_vectors`/`document_vectors` carry a foreign key onto `embedding_models`,
  /// so this must happen before the first vector insert for a model.
  fn ensure_embedding_model(&self, db: &db::ProjectDb) -> Option<String> {
    let provider = self.embedding.as_ref()?;
    let model_id = provider.model_id().to_string();
    if let Err(e) = db.ensure_embedding_model(&model_id, provider.name(), &model_id, provider.dimensions()) {
      warn!("Failed to register embedding model {}: {}", model_id, e);
    }
    Some(model_id)
  }

  // Memory tools

  pub async fn memory_search(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      query: String,
      #[serde(default)]
      cwd: Option<String>,
      #[serde(default)]
      sector: Option<String>,
      #[serde(default)]
      tier: Option<String>,
      #[serde(rename = "type")]
      #[serde(default)]
      memory_type: Option<String>,
      #[serde(default)]
      min_salience: Option<f32>,
      #[serde(default)]
      scope_path: Option<String>,
      #[serde(default)]
      scope_module: Option<String>,
      #[serde(default)]
      session_id: Option<String>,
      #[serde(default)]
      limit: Option<usize>,
      #[serde(default)]
      include_superseded: Option<bool>,
      #[serde(default)]
      mode: Option<String>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let mode = args.mode.as_deref().unwrap_or("hybrid");
    if !matches!(mode, "keyword" | "semantic" | "hybrid") {
      return Response::error(request.id, -32602, "mode must be one of: keyword, semantic, hybrid");
    }

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (_, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    // Load project config for search defaults
    let config = engram_core::Config::load_for_project(&project_path);

    let tier = args.tier.as_deref().and_then(parse_tier);
    let sector = args.sector.as_deref().and_then(|s| s.parse::<Sector>().ok());
    let memory_type = args.memory_type.as_deref().and_then(|t| t.parse::<MemoryType>().ok());
    let include_superseded = args.include_superseded.unwrap_or(config.search.include_superseded);

    let limit = args.limit.unwrap_or(config.search.default_limit);
    let fetch_n = limit * 3;

    let passes_filters = |m: &Memory| -> bool {
      if !include_superseded && m.superseded_by.is_some() {
        return false;
      }
      if let Some(t) = tier {
        if m.tier != t {
          return false;
        }
      }
      if let Some(s) = sector {
        if m.sector != s {
          return false;
        }
      }
      if let Some(mt) = memory_type {
        if m.memory_type != Some(mt) {
          return false;
        }
      }
      if let Some(min_sal) = args.min_salience {
        if m.salience < min_sal {
          return false;
        }
      }
      if let Some(ref scope_path) = args.scope_path {
        if m.scope_path.as_deref().map(|p| p.starts_with(scope_path.as_str())) != Some(true) {
          return false;
        }
      }
      if let Some(ref scope_module) = args.scope_module {
        if m.scope_module.as_deref() != Some(scope_module.as_str()) {
          return false;
        }
      }
      if let Some(ref session_id) = args.session_id {
        if m.session_id.map(|s| s.to_string()) != Some(session_id.clone()) {
          return false;
        }
      }
      true
    };

    // Keyword retriever: top-N via FTS, normalized into [0, 1] against the
    // best match in this batch.
    let keyword_hits: Vec<(Memory, f32)> = if mode != "semantic" {
      debug!("Running keyword retrieval for query: {}", args.query);
      db.search_memories_fts(&args.query, fetch_n).unwrap_or_default()
    } else {
      Vec::new()
    };
    let max_keyword_score = keyword_hits.iter().map(|(_, s)| *s).fold(0.0_f32, f32::max).max(1.0);
    let keyword_scores: std::collections::HashMap<_, _> = keyword_hits
      .iter()
      .map(|(m, s)| (m.id, (s / max_keyword_score).clamp(0.0, 1.0)))
      .collect();

    // Vector retriever: top-N by cosine similarity against the active model's
    // stored vectors.
    let query_vec = if mode != "keyword" { self.get_embedding(&args.query).await } else { None };
    let mut vector_hits: Vec<(Memory, f32)> = Vec::new();
    if let Some(ref query_vec) = query_vec {
      let model_id = self.embedding.as_ref().map(|p| p.model_id().to_string());
      if let Some(vectors) = model_id.as_deref().and_then(|id| db.memory_vectors_for_model(id).ok()) {
        debug!("Running vector retrieval for query: {}", args.query);
        let mut scored: Vec<(MemoryId, f32)> =
          vectors.into_iter().map(|(id, vec)| (id, cosine_similarity(query_vec, &vec))).collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(fetch_n);
        for (id, score) in scored {
          if let Ok(Some(m)) = db.get_memory(&id) {
            vector_hits.push((m, score));
          }
        }
      }
    }
    let vector_scores: std::collections::HashMap<_, _> =
      vector_hits.iter().map(|(m, s)| (m.id, *s)).collect();

    // Union of both retrievers' candidates, filters applied post-fusion.
    let mut union: std::collections::HashMap<MemoryId, Memory> = std::collections::HashMap::new();
    for (m, _) in keyword_hits.into_iter().chain(vector_hits) {
      union.entry(m.id).or_insert(m);
    }

    let mut scored: Vec<(Memory, f32)> = union
      .into_values()
      .filter(passes_filters)
      .map(|m| {
        let keyword_score = keyword_scores.get(&m.id).copied().unwrap_or(0.0);
        let vector_score = vector_scores.get(&m.id).copied().unwrap_or(0.0);
        let score = match mode {
          "keyword" => keyword_score,
          "semantic" => vector_score,
          _ => 0.4 * keyword_score + 0.6 * vector_score + sector_bonus(m.sector) + 0.1 * m.salience,
        };
        (m, score)
      })
      .collect();

    // Highest score first, ties broken by recency.
    scored.sort_by(|a, b| {
      b.1.partial_cmp(&a.1)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| b.0.created_at.cmp(&a.0.created_at))
    });
    scored.truncate(limit);

    let results: Vec<_> = scored
      .into_iter()
      .map(|(m, score)| {
        let is_superseded = m.superseded_by.is_some();
        serde_json::json!({
            "id": m.id.to_string(),
            "content": m.content,
            "summary": m.summary,
            "sector": m.sector.as_str(),
            "tier": m.tier.as_str(),
            "memory_type": m.memory_type.map(|t| t.as_str()),
            "salience": m.salience,
            "importance": m.importance,
            "score": score,
            "is_superseded": is_superseded,
            "superseded_by": m.superseded_by.map(|id| id.to_string()),
            "tags": m.tags,
            "categories": m.categories,
            "scope_path": m.scope_path,
            "scope_module": m.scope_module,
            "created_at": m.created_at.to_rfc3339(),
            "last_accessed": m.last_accessed.to_rfc3339(),
        })
      })
      .collect();

    Response::success(request.id, serde_json::json!(results))
  }

  pub async fn memory_add(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      content: String,
      #[serde(default)]
      cwd: Option<String>,
      #[serde(default)]
      sector: Option<String>,
      #[serde(rename = "type")]
      #[serde(default)]
      memory_type: Option<String>,
      #[serde(default)]
      context: Option<String>,
      #[serde(default)]
      tags: Option<Vec<String>>,
      #[serde(default)]
      categories: Option<Vec<String>>,
      #[serde(default)]
      scope_path: Option<String>,
      #[serde(default)]
      scope_module: Option<String>,
      #[serde(default)]
      importance: Option<f32>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    // Validate content
    if args.content.len() < 5 {
      return Response::error(request.id, -32602, "Content too short (min 5 chars)");
    }
    if args.content.len() > 32000 {
      return Response::error(request.id, -32602, "Content too long (max 32000 chars)");
    }

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (info, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    let sector = args
      .sector
      .as_deref()
      .and_then(|s| s.parse::<Sector>().ok())
      .unwrap_or(Sector::Semantic);
    let memory_type = args.memory_type.as_deref().and_then(|t| t.parse::<MemoryType>().ok());

    // Compute content hash and simhash for deduplication
    let new_content_hash = content_hash(&args.content);
    let new_simhash = simhash(&args.content);

    // Check for duplicates against recently created memories
    let checker = extract::DuplicateChecker::new();
    let recent = db.recent_memories_for_dedup(200).unwrap_or_default();
    if let Some((existing, result)) = checker.find_duplicate(&args.content, &recent) {
      let reason = match result {
        DuplicateMatch::Exact => "Exact content match",
        DuplicateMatch::Simhash { .. } => "Highly similar content",
        DuplicateMatch::None => unreachable!("find_duplicate only returns a match"),
      };
      debug!("Duplicate memory detected: {} ({})", existing.id, reason);
      return Response::success(
        request.id,
        serde_json::json!({
            "id": existing.id.to_string(),
            "message": format!("Duplicate detected: {}", reason),
            "is_duplicate": true
        }),
      );
    }

    let mut memory = Memory::new(info.id.uuid(), args.content.clone(), sector);

    // Set deduplication fields
    memory.content_hash = new_content_hash;
    memory.simhash = new_simhash;

    // Auto-extract concepts and files from content
    memory.concepts = extract_concepts(&args.content);
    memory.files = extract_files(&args.content);

    // Apply optional fields
    memory.memory_type = memory_type;
    if let Some(ctx) = args.context {
      memory.context = Some(ctx);
    }
    if let Some(tags) = args.tags {
      memory.tags = tags;
    }
    if let Some(categories) = args.categories {
      memory.categories = categories;
    }
    if let Some(scope_path) = args.scope_path {
      memory.scope_path = Some(scope_path);
    }
    if let Some(scope_module) = args.scope_module {
      memory.scope_module = Some(scope_module);
    }
    if let Some(imp) = args.importance {
      memory.importance = imp.clamp(0.0, 1.0);
    }

    // Generate an embedding for the content; no provider means no vector is stored.
    let embedded = self.get_embedding(&args.content).await;
    let model_id = embedded.as_ref().and_then(|_| self.ensure_embedding_model(&db));
    if embedded.is_some() {
      memory.embedding_model_id = model_id.clone();
    }
    let vector_arg = model_id.as_deref().zip(embedded.as_deref());

    match db.add_memory(&memory, vector_arg) {
      Ok(_) => Response::success(
        request.id,
        serde_json::json!({
            "id": memory.id.to_string(),
            "message": "Memory created successfully"
        }),
      ),
      Err(e) => Response::error(request.id, -32000, &format!("Failed to add memory: {}", e)),
    }
  }

  pub async fn memory_reinforce(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      memory_id: String,
      #[serde(default)]
      cwd: Option<String>,
      #[serde(default)]
      amount: Option<f32>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (_, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    let memory_id: MemoryId = match args.memory_id.parse() {
      Ok(id) => id,
      Err(_) => return Response::error(request.id, -32602, "Invalid memory_id format"),
    };

    let mut memory: Memory = match db.get_memory(&memory_id) {
      Ok(Some(m)) => m,
      Ok(None) => return Response::error(request.id, -32000, "Memory not found"),
      Err(e) => return Response::error(request.id, -32000, &format!("Database error: {}", e)),
    };

    let amount = args.amount.unwrap_or(0.1);
    memory.reinforce(amount, Utc::now());

    match db.update_memory(&memory) {
      Ok(_) => Response::success(
        request.id,
        serde_json::json!({
            "id": memory.id.to_string(),
            "new_salience": memory.salience,
            "message": "Memory reinforced"
        }),
      ),
      Err(e) => Response::error(request.id, -32000, &format!("Update failed: {}", e)),
    }
  }

  pub async fn memory_deemphasize(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      memory_id: String,
      #[serde(default)]
      cwd: Option<String>,
      #[serde(default)]
      amount: Option<f32>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (_, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    let memory_id: MemoryId = match args.memory_id.parse() {
      Ok(id) => id,
      Err(_) => return Response::error(request.id, -32602, "Invalid memory_id format"),
    };

    let mut memory: Memory = match db.get_memory(&memory_id) {
      Ok(Some(m)) => m,
      Ok(None) => return Response::error(request.id, -32000, "Memory not found"),
      Err(e) => return Response::error(request.id, -32000, &format!("Database error: {}", e)),
    };

    let amount = args.amount.unwrap_or(0.2);
    memory.deemphasize(amount, Utc::now());

    match db.update_memory(&memory) {
      Ok(_) => Response::success(
        request.id,
        serde_json::json!({
            "id": memory.id.to_string(),
            "new_salience": memory.salience,
            "message": "Memory de-emphasized"
        }),
      ),
      Err(e) => Response::error(request.id, -32000, &format!("Update failed: {}", e)),
    }
  }

  pub async fn memory_delete(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      memory_id: String,
      #[serde(default)]
      cwd: Option<String>,
      #[serde(default)]
      hard: Option<bool>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (_, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    let memory_id: MemoryId = match args.memory_id.parse() {
      Ok(id) => id,
      Err(_) => return Response::error(request.id, -32602, "Invalid memory_id format"),
    };

    let hard = args.hard.unwrap_or(false);

    if hard {
      match db.delete_memory(&memory_id) {
        Ok(_) => Response::success(
          request.id,
          serde_json::json!({
              "id": args.memory_id,
              "hard_delete": true,
              "message": "Memory permanently deleted"
          }),
        ),
        Err(e) => Response::error(request.id, -32000, &format!("Delete failed: {}", e)),
      }
    } else {
      match db.get_memory(&memory_id) {
        Ok(Some(mut memory)) => {
          memory.delete(Utc::now());
          match db.update_memory(&memory) {
            Ok(_) => Response::success(
              request.id,
              serde_json::json!({
                  "id": args.memory_id,
                  "hard_delete": false,
                  "message": "Memory soft deleted"
              }),
            ),
            Err(e) => Response::error(request.id, -32000, &format!("Update failed: {}", e)),
          }
        }
        Ok(None) => Response::error(request.id, -32000, "Memory not found"),
        Err(e) => Response::error(request.id, -32000, &format!("Database error: {}", e)),
      }
    }
  }

  pub async fn memory_supersede(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      old_memory_id: String,
      new_memory_id: String,
      #[serde(default)]
      cwd: Option<String>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (_, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    let old_memory_id: MemoryId = match args.old_memory_id.parse() {
      Ok(id) => id,
      Err(_) => return Response::error(request.id, -32602, "Invalid old_memory_id format"),
    };

    let new_memory_id: MemoryId = match args.new_memory_id.parse() {
      Ok(id) => id,
      Err(_) => return Response::error(request.id, -32602, "Invalid new_memory_id format"),
    };

    let mut old_memory: Memory = match db.get_memory(&old_memory_id) {
      Ok(Some(m)) => m,
      Ok(None) => return Response::error(request.id, -32000, "Old memory not found"),
      Err(e) => return Response::error(request.id, -32000, &format!("Database error: {}", e)),
    };

    match db.get_memory(&new_memory_id) {
      Ok(Some(_)) => {}
      Ok(None) => return Response::error(request.id, -32000, "New memory not found"),
      Err(e) => return Response::error(request.id, -32000, &format!("Database error: {}", e)),
    };

    old_memory.supersede(new_memory_id, Utc::now());

    match db.update_memory(&old_memory) {
      Ok(_) => Response::success(
        request.id,
        serde_json::json!({
            "old_memory_id": args.old_memory_id,
            "new_memory_id": args.new_memory_id,
            "message": "Memory superseded"
        }),
      ),
      Err(e) => Response::error(request.id, -32000, &format!("Update failed: {}", e)),
    }
  }

  pub async fn memory_timeline(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      anchor_id: String,
      #[serde(default)]
      cwd: Option<String>,
      #[serde(default)]
      depth_before: Option<usize>,
      #[serde(default)]
      depth_after: Option<usize>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (_, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    let anchor_id: MemoryId = match args.anchor_id.parse() {
      Ok(id) => id,
      Err(_) => return Response::error(request.id, -32602, "Invalid anchor_id format"),
    };

    let anchor: Memory = match db.get_memory(&anchor_id) {
      Ok(Some(m)) => m,
      Ok(None) => return Response::error(request.id, -32000, "Anchor memory not found"),
      Err(e) => return Response::error(request.id, -32000, &format!("Database error: {}", e)),
    };

    let depth_before = args.depth_before.unwrap_or(5);
    let depth_after = args.depth_after.unwrap_or(5);

    let all_memories = match db.list_memories(None, None, None) {
      Ok(m) => m,
      Err(e) => return Response::error(request.id, -32000, &format!("Database error: {}", e)),
    };

    let mut sorted: Vec<_> = all_memories.into_iter().collect();
    sorted.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let anchor_pos = sorted.iter().position(|m| m.id == anchor.id);

    fn build_memory_with_session(m: &Memory, db: &db::ProjectDb) -> serde_json::Value {
      let mut json = serde_json::json!({
          "id": m.id.to_string(),
          "content": m.content,
          "sector": format!("{:?}", m.sector),
          "salience": m.salience,
          "created_at": m.created_at.to_rfc3339(),
      });

      if let Some(session_id) = m.session_id {
        json["session_id"] = serde_json::json!(session_id.to_string());

        if let Ok(Some(session)) = db.get_session(&session_id) {
          json["session"] = serde_json::json!({
              "id": session.id.to_string(),
              "started_at": session.started_at.to_rfc3339(),
              "ended_at": session.ended_at.map(|t| t.to_rfc3339()),
              "summary": session.summary,
          });
        }
      }

      json
    }

    let (before, after) = match anchor_pos {
      Some(pos) => {
        let start = pos.saturating_sub(depth_before);
        let end = (pos + 1 + depth_after).min(sorted.len());

        let before: Vec<_> = sorted[start..pos].iter().map(|m| build_memory_with_session(m, &db)).collect();
        let after: Vec<_> = sorted[pos + 1..end]
          .iter()
          .map(|m| build_memory_with_session(m, &db))
          .collect();

        (before, after)
      }
      None => (vec![], vec![]),
    };

    let anchor_json = build_memory_with_session(&anchor, &db);

    Response::success(
      request.id,
      serde_json::json!({
          "anchor": anchor_json,
          "before": before,
          "after": after,
      }),
    )
  }

  /// Get a single memory by ID with full details
  pub async fn memory_get(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      memory_id: String,
      #[serde(default)]
      cwd: Option<String>,
      #[serde(default)]
      include_related: Option<bool>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (_, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    let memory_id: MemoryId = match args.memory_id.parse() {
      Ok(id) => id,
      Err(_) => return Response::error(request.id, -32602, "Invalid memory_id format"),
    };

    let mut memory: Memory = match db.get_memory(&memory_id) {
      Ok(Some(m)) => m,
      Ok(None) => return Response::error(request.id, -32000, "Memory not found"),
      Err(e) => return Response::error(request.id, -32000, &format!("Database error: {}", e)),
    };

    memory.touch(Utc::now());
    if let Err(e) = db.update_memory(&memory) {
      warn!("Failed to record retrieval touch for {}: {}", memory.id, e);
    }

    let mut result = serde_json::json!({
        "id": memory.id.to_string(),
        "content": memory.content,
        "summary": memory.summary,
        "sector": memory.sector.as_str(),
        "tier": memory.tier.as_str(),
        "memory_type": memory.memory_type.map(|t| t.as_str()),
        "salience": memory.salience,
        "importance": memory.importance,
        "confidence": memory.confidence,
        "access_count": memory.access_count,
        "is_deleted": memory.is_deleted,
        "superseded_by": memory.superseded_by.map(|id| id.to_string()),
        "tags": memory.tags,
        "categories": memory.categories,
        "concepts": memory.concepts,
        "files": memory.files,
        "context": memory.context,
        "scope_path": memory.scope_path,
        "scope_module": memory.scope_module,
        "created_at": memory.created_at.to_rfc3339(),
        "updated_at": memory.updated_at.to_rfc3339(),
        "last_accessed": memory.last_accessed.to_rfc3339(),
        "valid_from": memory.valid_from.to_rfc3339(),
        "valid_until": memory.valid_until.map(|t| t.to_rfc3339()),
    });

    if args.include_related.unwrap_or(false) {
      match db.get_all_relationships(&memory_id) {
        Ok(relationships) => {
          let rels: Vec<_> = relationships
            .iter()
            .map(|r| {
              serde_json::json!({
                  "type": r.relationship_type.as_str(),
                  "from_id": r.from_memory_id.to_string(),
                  "to_id": r.to_memory_id.to_string(),
                  "target_id": if r.from_memory_id == memory_id {
                      r.to_memory_id.to_string()
                  } else {
                      r.from_memory_id.to_string()
                  },
                  "confidence": r.confidence,
              })
            })
            .collect();
          result["relationships"] = serde_json::json!(rels);
        }
        Err(e) => {
          warn!("Failed to get relationships: {}", e);
          result["relationships"] = serde_json::json!([]);
        }
      }
    }

    Response::success(request.id, result)
  }

  /// List all memories for a project (for export)
  pub async fn memory_list(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      #[serde(default)]
      cwd: Option<String>,
      #[serde(default)]
      limit: Option<usize>,
      #[serde(default)]
      include_deleted: Option<bool>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (_, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    // list_memories already excludes is_deleted rows; include_deleted has no
    // equivalent in the typed filter, so it is accepted but not honored beyond that.
    let _ = args.include_deleted;

    match db.list_memories(None, None, args.limit) {
      Ok(memories) => {
        let results: Vec<_> = memories
          .into_iter()
          .map(|m| {
            serde_json::json!({
                "id": m.id.to_string(),
                "content": m.content,
                "summary": m.summary,
                "sector": m.sector.as_str(),
                "tier": m.tier.as_str(),
                "memory_type": m.memory_type.map(|t| t.as_str()),
                "salience": m.salience,
                "importance": m.importance,
                "is_deleted": m.is_deleted,
                "superseded_by": m.superseded_by.map(|id| id.to_string()),
                "tags": m.tags,
                "categories": m.categories,
                "scope_path": m.scope_path,
                "scope_module": m.scope_module,
                "created_at": m.created_at.to_rfc3339(),
            })
          })
          .collect();

        Response::success(request.id, serde_json::json!(results))
      }
      Err(e) => Response::error(request.id, -32000, &format!("Database error: {}", e)),
    }
  }

  // Code tools

  pub async fn code_search(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      query: String,
      #[serde(default)]
      cwd: Option<String>,
      #[serde(default)]
      language: Option<String>,
      #[serde(default)]
      limit: Option<usize>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (info, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    let limit = args.limit.unwrap_or(10);
    let language = args.language.map(|l| l.to_lowercase());

    let chunks = match db.search_document_chunks_fts(info.id.uuid(), &args.query, limit * 10) {
      Ok(c) => c,
      Err(e) => return Response::error(request.id, -32000, &format!("Code search error: {}", e)),
    };

    let mut results = Vec::new();
    for (chunk, score) in chunks {
      let doc = match db.get_document(&chunk.document_id) {
        Ok(Some(d)) if d.is_code => d,
        _ => continue,
      };
      if let Some(ref lang) = language {
        if doc.language.as_deref() != Some(lang.as_str()) {
          continue;
        }
      }
      results.push(serde_json::json!({
          "id": chunk.id.to_string(),
          "document_id": chunk.document_id.to_string(),
          "file_path": doc.source_path,
          "content": chunk.content,
          "language": doc.language,
          "start_offset": chunk.start_offset,
          "end_offset": chunk.end_offset,
          "relevance": score,
      }));
      if results.len() >= limit {
        break;
      }
    }

    Response::success(request.id, serde_json::json!(results))
  }

  pub async fn code_index(&self, request: Request) -> Response {
    use index::{Scanner, compute_gitignore_hash};

    #[derive(Deserialize)]
    struct Args {
      #[serde(default)]
      cwd: Option<String>,
      #[serde(default)]
      force: Option<bool>,
      #[serde(default)]
      dry_run: Option<bool>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let force = args.force.unwrap_or(false);
    let dry_run = args.dry_run.unwrap_or(false);

    let (info, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    let project_uuid = info.id.uuid();
    let config = engram_core::Config::load_for_project(&project_path);

    let scanner = Scanner::new().with_max_file_size(config.index.max_file_size as u64);
    let scan_result = scanner.scan(&project_path, |progress| {
      debug!("Scanning: {} files, current: {:?}", progress.scanned, progress.path);
    });

    let gitignore_hash = Some(compute_gitignore_hash(&project_path));

    if dry_run {
      return Response::success(
        request.id,
        serde_json::json!({
            "status": "dry_run",
            "files_found": scan_result.files.len(),
            "skipped": scan_result.skipped_count,
            "total_bytes": scan_result.total_bytes,
            "scan_duration_ms": scan_result.scan_duration.as_millis(),
        }),
      );
    }

    let index_start = std::time::Instant::now();
    let mut indexed_files = 0u64;
    let mut skipped_files = 0u64;
    let mut chunks_created = 0u64;
    let mut failed_files = Vec::new();
    let mut seen_paths = std::collections::HashSet::new();

    for file in &scan_result.files {
      seen_paths.insert(file.relative_path.clone());

      if !force {
        if let Ok(Some(existing)) = db.get_indexed_file(project_uuid, &file.relative_path) {
          if existing.checksum == file.checksum && existing.gitignore_hash == gitignore_hash {
            skipped_files += 1;
            continue;
          }
        }
      }

      let content = match std::fs::read_to_string(&file.path) {
        Ok(c) => c,
        Err(e) => {
          warn!("Failed to read {}: {}", file.relative_path, e);
          failed_files.push(file.relative_path.clone());
          continue;
        }
      };

      let language = Some(format!("{:?}", file.language).to_lowercase());

      let document = Document::with_content(
        project_uuid,
        Some(file.relative_path.clone()),
        None,
        DocumentSource::Code,
        content.clone(),
        true,
        language.clone(),
      );
      let document_id = document.id;

      if let Err(e) = db.upsert_document(&document) {
        warn!("Failed to store document for {}: {}", file.relative_path, e);
        failed_files.push(file.relative_path.clone());
        continue;
      }

      let text_chunks = chunk_text(&content, &ChunkParams::default());
      let texts: Vec<&str> = text_chunks.iter().map(|(c, _)| c.as_str()).collect();
      let embeddings = self.get_embeddings_batch(&texts).await;
      let model_id = if embeddings.iter().any(Option::is_some) {
        self.ensure_embedding_model(&db)
      } else {
        None
      };

      let mut file_chunks = 0u64;
      for (i, ((chunk_content, start_offset), embedding)) in
        text_chunks.into_iter().zip(embeddings.into_iter()).enumerate()
      {
        let end_offset = start_offset + chunk_content.len();
        let chunk = DocumentChunk::new(document_id, project_uuid, chunk_content, i, start_offset, end_offset);

        let vector_arg = model_id.as_deref().zip(embedding.as_deref());
        if let Err(e) = db.add_document_chunk(&chunk, vector_arg) {
          warn!("Failed to store chunk for {}: {}", file.relative_path, e);
          continue;
        }
        file_chunks += 1;
      }
      chunks_created += file_chunks;

      let indexed = db::IndexedFile {
        project_id: project_uuid,
        path: file.relative_path.clone(),
        checksum: file.checksum.clone(),
        last_indexed_at: Utc::now(),
        language,
        document_id: Some(document_id),
        gitignore_hash: gitignore_hash.clone(),
      };
      if let Err(e) = db.upsert_indexed_file(&indexed) {
        warn!("Failed to record indexed file {}: {}", file.relative_path, e);
      }

      indexed_files += 1;
    }

    // Clean up files that were indexed before but no longer exist on disk.
    let mut removed_files = 0u64;
    if let Ok(previously_indexed) = db.list_indexed_files(project_uuid) {
      for prior in previously_indexed {
        if seen_paths.contains(&prior.path) {
          continue;
        }
        match db.delete_indexed_file(project_uuid, &prior.path) {
          Ok(Some(doc_id)) => {
            if let Err(e) = db.delete_document(&doc_id) {
              warn!("Failed to delete orphaned document for {}: {}", prior.path, e);
            }
            removed_files += 1;
          }
          Ok(None) => {}
          Err(e) => warn!("Failed to delete indexed file record {}: {}", prior.path, e),
        }
      }
    }

    let index_duration_ms = index_start.elapsed().as_millis() as u64;

    Response::success(
      request.id,
      serde_json::json!({
          "status": "complete",
          "files_scanned": scan_result.files.len(),
          "files_indexed": indexed_files,
          "files_skipped": skipped_files,
          "files_removed": removed_files,
          "chunks_created": chunks_created,
          "failed_files": failed_files,
          "scan_duration_ms": scan_result.scan_duration.as_millis(),
          "index_duration_ms": index_duration_ms,
          "total_bytes": scan_result.total_bytes,
      }),
    )
  }

  /// List all indexed code documents for export
  pub async fn code_list(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      #[serde(default)]
      cwd: Option<String>,
      #[serde(default)]
      limit: Option<usize>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (info, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    match db.list_documents(info.id.uuid()) {
      Ok(docs) => {
        let results: Vec<_> = docs
          .into_iter()
          .filter(|d| d.is_code)
          .take(args.limit.unwrap_or(usize::MAX))
          .map(|doc| {
            serde_json::json!({
                "id": doc.id.to_string(),
                "file_path": doc.source_path,
                "language": doc.language,
                "checksum": doc.checksum,
                "updated_at": doc.updated_at.to_rfc3339(),
            })
          })
          .collect();

        Response::success(request.id, serde_json::json!(results))
      }
      Err(e) => Response::error(request.id, -32000, &format!("List error: {}", e)),
    }
  }

  // Watch tools

  /// Start file watcher for a project
  pub async fn watch_start(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      #[serde(default)]
      cwd: Option<String>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (info, _db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    if let Err(e) = self
      .registry
      .start_watcher(info.id.as_str(), &project_path, self.embedding.clone())
      .await
    {
      return Response::error(request.id, -32000, &format!("Failed to start watcher: {}", e));
    }

    Response::success(
      request.id,
      serde_json::json!({
          "status": "started",
          "path": project_path.to_string_lossy(),
          "project_id": info.id.as_str(),
      }),
    )
  }

  /// Stop file watcher for a project
  pub async fn watch_stop(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      #[serde(default)]
      cwd: Option<String>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (info, _db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    if let Err(e) = self.registry.stop_watcher(info.id.as_str()).await {
      return Response::error(request.id, -32000, &format!("Failed to stop watcher: {}", e));
    }

    Response::success(
      request.id,
      serde_json::json!({
          "status": "stopped",
          "path": project_path.to_string_lossy(),
          "project_id": info.id.as_str(),
      }),
    )
  }

  /// Get file watcher status
  pub async fn watch_status(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      #[serde(default)]
      cwd: Option<String>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (info, _db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    let status = self.registry.watcher_status(info.id.as_str()).await;

    Response::success(
      request.id,
      serde_json::json!({
          "running": status.running,
          "root": status.root.map(|p| p.to_string_lossy().to_string()),
          "pending_changes": status.pending_changes,
          "project_id": info.id.as_str(),
      }),
    )
  }

  /// Get code index statistics
  pub async fn code_stats(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      #[serde(default)]
      cwd: Option<String>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (info, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    match db.get_code_stats(info.id.uuid()) {
      Ok(stats) => Response::success(request.id, serde_json::to_value(&stats).unwrap_or_default()),
      Err(e) => Response::error(request.id, -32000, &format!("Stats error: {}", e)),
    }
  }

  // Document tools

  pub async fn docs_search(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      query: String,
      #[serde(default)]
      cwd: Option<String>,
      #[serde(default)]
      limit: Option<usize>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (info, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    let limit = args.limit.unwrap_or(5);

    let chunks = match db.search_document_chunks_fts(info.id.uuid(), &args.query, limit * 10) {
      Ok(c) => c,
      Err(e) => return Response::error(request.id, -32000, &format!("Docs search error: {}", e)),
    };

    let mut results = Vec::new();
    for (chunk, score) in chunks {
      let doc = match db.get_document(&chunk.document_id) {
        Ok(Some(d)) if !d.is_code => d,
        _ => continue,
      };
      results.push(serde_json::json!({
          "id": chunk.id.to_string(),
          "document_id": chunk.document_id.to_string(),
          "title": doc.title,
          "source": doc.source_path.or(doc.source_url),
          "content": chunk.content,
          "chunk_index": chunk.chunk_index,
          "relevance": score,
      }));
      if results.len() >= limit {
        break;
      }
    }

    Response::success(request.id, serde_json::json!(results))
  }

  pub async fn docs_ingest(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      #[serde(default)]
      path: Option<String>,
      #[serde(default)]
      url: Option<String>,
      #[serde(default)]
      content: Option<String>,
      #[serde(default)]
      title: Option<String>,
      #[serde(default)]
      cwd: Option<String>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    if args.path.is_none() && args.url.is_none() && args.content.is_none() {
      return Response::error(request.id, -32602, "Must provide path, url, or content");
    }

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (info, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    let (content, source, source_type, title) = if let Some(path) = args.path {
      let full_path = if path.starts_with('/') {
        PathBuf::from(&path)
      } else {
        project_path.join(&path)
      };

      match std::fs::read_to_string(&full_path) {
        Ok(content) => {
          let title = args.title.unwrap_or_else(|| {
            full_path
              .file_name()
              .map(|s| s.to_string_lossy().to_string())
              .unwrap_or_else(|| path.clone())
          });
          let source_type = if path.ends_with(".md") || path.ends_with(".markdown") {
            DocumentSource::Md
          } else {
            DocumentSource::Txt
          };
          (content, path, source_type, title)
        }
        Err(e) => return Response::error(request.id, -32000, &format!("Failed to read file: {}", e)),
      }
    } else if let Some(url) = args.url {
      match reqwest::get(&url).await {
        Ok(resp) => match resp.text().await {
          Ok(content) => {
            let title = args.title.unwrap_or_else(|| url.clone());
            (content, url, DocumentSource::Url, title)
          }
          Err(e) => return Response::error(request.id, -32000, &format!("Failed to read response: {}", e)),
        },
        Err(e) => return Response::error(request.id, -32000, &format!("Failed to fetch URL: {}", e)),
      }
    } else if let Some(content) = args.content {
      let title = args.title.unwrap_or_else(|| "Untitled Document".to_string());
      (content, "content".to_string(), DocumentSource::Txt, title)
    } else {
      return Response::error(request.id, -32602, "Must provide path, url, or content");
    };

    if content.is_empty() {
      return Response::error(request.id, -32602, "Document content is empty");
    }
    if content.len() > 1_000_000 {
      return Response::error(request.id, -32602, "Document too large (max 1MB)");
    }

    let project_uuid = info.id.uuid();

    // Re-ingesting the same source replaces the previous document and its chunks.
    if let Ok(Some(existing)) = db.get_document_by_source(project_uuid, &source) {
      if let Err(e) = db.delete_document(&existing.id) {
        warn!("Failed to delete existing document: {}", e);
      }
    }

    let (source_path, source_url) = match source_type {
      DocumentSource::Url => (None, Some(source.clone())),
      _ => (Some(source.clone()), None),
    };
    let mut document = Document::with_content(
      project_uuid,
      source_path,
      source_url,
      source_type,
      content.clone(),
      false,
      None,
    );
    document.title = Some(title.clone());
    let document_id = document.id;
    let content_hash = document.checksum.clone();

    if let Err(e) = db.upsert_document(&document) {
      return Response::error(request.id, -32000, &format!("Failed to store document: {}", e));
    }

    let params = ChunkParams::default();
    let text_chunks = chunk_text(&content, &params);
    let total_chunks = text_chunks.len();

    let texts: Vec<&str> = text_chunks.iter().map(|(c, _)| c.as_str()).collect();
    let embeddings = self.get_embeddings_batch(&texts).await;
    let model_id = if embeddings.iter().any(Option::is_some) {
      self.ensure_embedding_model(&db)
    } else {
      None
    };

    let mut stored_chunks = 0;
    for (i, ((chunk_content, start_offset), embedding)) in
      text_chunks.into_iter().zip(embeddings.into_iter()).enumerate()
    {
      let end_offset = start_offset + chunk_content.len();
      let chunk = DocumentChunk::new(document_id, project_uuid, chunk_content, i, start_offset, end_offset);

      let vector_arg = model_id.as_deref().zip(embedding.as_deref());
      if let Err(e) = db.add_document_chunk(&chunk, vector_arg) {
        warn!("Failed to store chunk {}: {}", i, e);
        continue;
      }
      stored_chunks += 1;
    }

    Response::success(
      request.id,
      serde_json::json!({
          "document_id": document_id.to_string(),
          "title": title,
          "source": source,
          "source_type": source_type.as_str(),
          "content_hash": content_hash,
          "char_count": content.len(),
          "chunks_created": stored_chunks,
          "total_chunks": total_chunks,
      }),
    )
  }

  // Relationship tools

  /// Create a relationship between two memories
  ///
  /// Relationship types: supersedes, contradicts, related_to, builds_on,
  /// confirms, applies_to, depends_on, alternative_to
  pub async fn relationship_add(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      from_memory_id: String,
      to_memory_id: String,
      relationship_type: String,
      #[serde(default)]
      confidence: Option<f32>,
      #[serde(default)]
      cwd: Option<String>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let from_id: MemoryId = match args.from_memory_id.parse() {
      Ok(id) => id,
      Err(_) => return Response::error(request.id, -32602, "Invalid from_memory_id format"),
    };

    let to_id: MemoryId = match args.to_memory_id.parse() {
      Ok(id) => id,
      Err(_) => return Response::error(request.id, -32602, "Invalid to_memory_id format"),
    };

    let rel_type: RelationshipType = match args.relationship_type.parse() {
      Ok(t) => t,
      Err(_) => {
        return Response::error(
          request.id,
          -32602,
          "Invalid relationship_type. Valid: supersedes, contradicts, related_to, builds_on, confirms, applies_to, depends_on, alternative_to",
        );
      }
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (_, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    match db.create_relationship(&from_id, &to_id, rel_type, args.confidence.unwrap_or(1.0), "user") {
      Ok(rel) => Response::success(
        request.id,
        serde_json::json!({
            "id": rel.id.to_string(),
            "from_memory_id": rel.from_memory_id.to_string(),
            "to_memory_id": rel.to_memory_id.to_string(),
            "relationship_type": rel.relationship_type.as_str(),
            "confidence": rel.confidence,
        }),
      ),
      Err(e) => Response::error(request.id, -32000, &format!("Database error: {}", e)),
    }
  }

  /// Get all relationships for a memory
  pub async fn relationship_list(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      memory_id: String,
      #[serde(default)]
      direction: Option<String>, // "from", "to", or "all" (default)
      #[serde(default)]
      relationship_type: Option<String>,
      #[serde(default)]
      cwd: Option<String>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let memory_id: MemoryId = match args.memory_id.parse() {
      Ok(id) => id,
      Err(_) => return Response::error(request.id, -32602, "Invalid memory_id format"),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (_, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    let relationships = match args.direction.as_deref() {
      Some("from") => db.get_relationships_from(&memory_id),
      Some("to") => db.get_relationships_to(&memory_id),
      _ => db.get_all_relationships(&memory_id),
    };

    match relationships {
      Ok(rels) => {
        let rels: Vec<_> = if let Some(ref type_filter) = args.relationship_type {
          if let Ok(rel_type) = type_filter.parse::<RelationshipType>() {
            rels.into_iter().filter(|r| r.relationship_type == rel_type).collect()
          } else {
            rels
          }
        } else {
          rels
        };

        let results: Vec<_> = rels
          .into_iter()
          .map(|r| {
            serde_json::json!({
                "id": r.id.to_string(),
                "from_memory_id": r.from_memory_id.to_string(),
                "to_memory_id": r.to_memory_id.to_string(),
                "relationship_type": r.relationship_type.as_str(),
                "confidence": r.confidence,
                "created_at": r.created_at.to_rfc3339(),
                "valid_until": r.valid_until.map(|t| t.to_rfc3339()),
            })
          })
          .collect();
        Response::success(request.id, serde_json::json!(results))
      }
      Err(e) => Response::error(request.id, -32000, &format!("Database error: {}", e)),
    }
  }

  /// Delete a relationship by ID
  pub async fn relationship_delete(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      relationship_id: String,
      #[serde(default)]
      cwd: Option<String>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let rel_id: uuid::Uuid = match uuid::Uuid::parse_str(&args.relationship_id) {
      Ok(id) => id,
      Err(_) => return Response::error(request.id, -32602, "Invalid relationship_id format"),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (_, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    match db.delete_relationship(&rel_id) {
      Ok(()) => Response::success(request.id, serde_json::json!({"deleted": true})),
      Err(e) => Response::error(request.id, -32000, &format!("Database error: {}", e)),
    }
  }

  /// Get related memories (memories connected via relationships)
  pub async fn relationship_related(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      memory_id: String,
      #[serde(default)]
      relationship_type: Option<String>,
      #[serde(default)]
      cwd: Option<String>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let memory_id: MemoryId = match args.memory_id.parse() {
      Ok(id) => id,
      Err(_) => return Response::error(request.id, -32602, "Invalid memory_id format"),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (_, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    let relationships = match args.relationship_type {
      Some(ref type_str) => match type_str.parse::<RelationshipType>() {
        Ok(rel_type) => db.get_active_relationships_by_type(&memory_id, rel_type),
        Err(_) => db.get_all_relationships(&memory_id),
      },
      None => db.get_all_relationships(&memory_id),
    };

    match relationships {
      Ok(rels) => {
        let mut related_ids: Vec<MemoryId> = Vec::new();
        for rel in &rels {
          if rel.from_memory_id == memory_id {
            related_ids.push(rel.to_memory_id);
          } else {
            related_ids.push(rel.from_memory_id);
          }
        }

        let mut results = Vec::new();
        for (rel, related_id) in rels.into_iter().zip(related_ids) {
          if let Ok(Some(memory)) = db.get_memory(&related_id) {
            results.push(serde_json::json!({
                "memory": {
                    "id": memory.id.to_string(),
                    "content": memory.content,
                    "summary": memory.summary,
                    "sector": format!("{:?}", memory.sector).to_lowercase(),
                    "salience": memory.salience,
                },
                "relationship": {
                    "type": rel.relationship_type.as_str(),
                    "confidence": rel.confidence,
                    "direction": if rel.from_memory_id == memory_id { "outgoing" } else { "incoming" },
                }
            }));
          }
        }

        Response::success(request.id, serde_json::json!(results))
      }
      Err(e) => Response::error(request.id, -32000, &format!("Database error: {}", e)),
    }
  }

  /// Get comprehensive project statistics
  pub async fn project_stats(&self, request: Request) -> Response {
    #[derive(Deserialize)]
    struct Args {
      #[serde(default)]
      cwd: Option<String>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (info, db) = match self.registry.get_or_create(&project_path).await {
      Ok(p) => p,
      Err(e) => return Response::error(request.id, -32000, &format!("Project error: {}", e)),
    };

    match db.get_project_stats(info.id.uuid()) {
      Ok(stats) => Response::success(request.id, serde_json::to_value(&stats).unwrap_or_default()),
      Err(e) => Response::error(request.id, -32000, &format!("Database error: {}", e)),
    }
  }

  /// Get comprehensive health status
  pub async fn health_check(&self, request: Request) -> Response {
    use embedding::OllamaProvider;

    #[derive(Deserialize)]
    struct Args {
      #[serde(default)]
      cwd: Option<String>,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let db_status = match self.registry.get_or_create(&project_path).await {
      Ok((_, db)) => match db.count_memories(None) {
        Ok(_) => serde_json::json!({
            "status": "healthy",
            "wal_mode": true,
        }),
        Err(e) => serde_json::json!({
            "status": "error",
            "error": e.to_string(),
        }),
      },
      Err(e) => {
        serde_json::json!({
            "status": "error",
            "error": e.to_string(),
        })
      }
    };

    let ollama = OllamaProvider::new();
    let ollama_status = ollama.check_health().await;

    let embedding_status = match &self.embedding {
      Some(provider) => {
        serde_json::json!({
            "configured": true,
            "provider": provider.name(),
            "model": provider.model_id(),
            "dimensions": provider.dimensions(),
            "available": provider.is_available().await,
        })
      }
      None => {
        serde_json::json!({
            "configured": false,
            "provider": "none",
        })
      }
    };

    let health = serde_json::json!({
        "database": db_status,
        "ollama": {
            "available": ollama_status.available,
            "models_count": ollama_status.models.len(),
            "configured_model": ollama_status.configured_model,
            "configured_model_available": ollama_status.configured_model_available,
        },
        "embedding": embedding_status,
    });

    Response::success(request.id, health)
  }

  /// Re-embed stored memories and document chunks against the currently
  /// configured embedding model, replacing whatever vector (if any) was
  /// stored for them previously.
  pub async fn migrate_embedding(&self, request: Request) -> Response {
    use std::time::Instant;

    #[derive(Deserialize)]
    struct Args {
      #[serde(default)]
      cwd: Option<String>,
      #[serde(default)]
      force: bool,
    }

    let args: Args = match serde_json::from_value(request.params.clone()) {
      Ok(a) => a,
      Err(e) => return Response::error(request.id, -32602, &format!("Invalid params: {}", e)),
    };

    let embedding = match &self.embedding {
      Some(e) => e,
      None => return Response::error(request.id, -32000, "Embedding provider not configured. Cannot migrate."),
    };

    if !embedding.is_available().await {
      return Response::error(
        request.id,
        -32000,
        "Embedding provider not available. Please ensure Ollama is running.",
      );
    }

    if !args.force {
      return Response::error(
        request.id,
        -32602,
        "Pass force=true to re-embed stored memories and document chunks against the current model",
      );
    }

    let project_path = args
      .cwd
      .map(PathBuf::from)
      .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let (info, db) = match self.registry.get_or_create(&project_path).await {
      Ok(r) => r,
      Err(e) => return Response::error(request.id, -32000, &format!("Database error: {}", e)),
    };

    let model_id = match self.ensure_embedding_model(&db) {
      Some(id) => id,
      None => return Response::error(request.id, -32000, "No embedding model configured"),
    };

    let start = Instant::now();
    let mut migrated_count = 0u64;
    let mut error_count = 0u64;
    let target_dimensions = embedding.dimensions();

    match db.list_memories(None, None, None) {
      Ok(memories) => {
        for memory in memories {
          match embedding.embed(&memory.content).await {
            Ok(new_vec) => {
              if let Err(e) = db.upsert_memory_vector(&memory.id.to_string(), &model_id, &new_vec) {
                warn!("Failed to update memory {} embedding: {}", memory.id, e);
                error_count += 1;
              } else {
                migrated_count += 1;
              }
            }
            Err(e) => {
              warn!("Failed to re-embed memory {}: {}", memory.id, e);
              error_count += 1;
            }
          }
        }
      }
      Err(e) => warn!("Failed to list memories for migration: {}", e),
    }

    match db.list_documents(info.id.uuid()) {
      Ok(documents) => {
        for document in documents {
          let chunks = db.list_document_chunks(&document.id).unwrap_or_default();
          for chunk in chunks {
            match embedding.embed(&chunk.content).await {
              Ok(new_vec) => {
                if let Err(e) = db.upsert_document_chunk_vector(&chunk.id.to_string(), &model_id, &new_vec) {
                  warn!("Failed to update chunk {} embedding: {}", chunk.id, e);
                  error_count += 1;
                } else {
                  migrated_count += 1;
                }
              }
              Err(e) => {
                warn!("Failed to re-embed chunk {}: {}", chunk.id, e);
                error_count += 1;
              }
            }
          }
        }
      }
      Err(e) => warn!("Failed to list documents for migration: {}", e),
    }

    let duration = start.elapsed();

    Response::success(
      request.id,
      serde_json::json!({
          "migrated_count": migrated_count,
          "error_count": error_count,
          "duration_ms": duration.as_millis() as u64,
          "target_dimensions": target_dimensions,
      }),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn create_test_handler() -> (TempDir, ToolHandler) {
    let data_dir = TempDir::new().expect("Failed to create temp dir");
    let registry = Arc::new(ProjectRegistry::with_data_dir(data_dir.path().to_path_buf()));
    let handler = ToolHandler::new(registry);
    (data_dir, handler)
  }

  #[tokio::test]
  async fn test_memory_add_validation_too_short() {
    let (_dir, handler) = create_test_handler();

    let request = Request {
      id: Some(serde_json::json!(1)),
      method: "memory_add".to_string(),
      params: serde_json::json!({
          "content": "hi"
      }),
    };

    let response = handler.memory_add(request).await;
    assert!(response.error.is_some());
    assert!(response.error.unwrap().message.contains("too short"));
  }

  #[tokio::test]
  async fn test_memory_add_validation_too_long() {
    let (_dir, handler) = create_test_handler();

    let long_content = "x".repeat(33000);
    let request = Request {
      id: Some(serde_json::json!(1)),
      method: "memory_add".to_string(),
      params: serde_json::json!({
          "content": long_content
      }),
    };

    let response = handler.memory_add(request).await;
    assert!(response.error.is_some());
    assert!(response.error.unwrap().message.contains("too long"));
  }

  #[tokio::test]
  async fn test_memory_search_invalid_params() {
    let (_dir, handler) = create_test_handler();

    let request = Request {
      id: Some(serde_json::json!(1)),
      method: "memory_search".to_string(),
      params: serde_json::json!({
          "limit": 10
      }),
    };

    let response = handler.memory_search(request).await;
    assert!(response.error.is_some());
    assert!(response.error.unwrap().message.contains("Invalid params"));
  }

  #[tokio::test]
  async fn test_memory_reinforce_invalid_id() {
    let (_dir, handler) = create_test_handler();

    let request = Request {
      id: Some(serde_json::json!(1)),
      method: "memory_reinforce".to_string(),
      params: serde_json::json!({
          "memory_id": "invalid-uuid-format"
      }),
    };

    let response = handler.memory_reinforce(request).await;
    assert!(response.error.is_some());
    assert!(response.error.unwrap().message.contains("Invalid memory_id"));
  }

  #[tokio::test]
  async fn test_memory_deemphasize_not_found() {
    let (data_dir, handler) = create_test_handler();
    let project_dir = TempDir::new().expect("Failed to create project dir");

    let request = Request {
      id: Some(serde_json::json!(1)),
      method: "memory_deemphasize".to_string(),
      params: serde_json::json!({
          "memory_id": "01936c4f-4d77-7ba5-9f8a-123456789abc",
          "cwd": project_dir.path().to_string_lossy()
      }),
    };

    let response = handler.memory_deemphasize(request).await;
    assert!(response.error.is_some());
    let _ = data_dir; // Keep alive
  }

  #[tokio::test]
  async fn test_docs_ingest_missing_source() {
    let (_dir, handler) = create_test_handler();

    let request = Request {
      id: Some(serde_json::json!(1)),
      method: "docs_ingest".to_string(),
      params: serde_json::json!({
          "title": "Test Doc"
      }),
    };

    let response = handler.docs_ingest(request).await;
    assert!(response.error.is_some());
    assert!(response.error.unwrap().message.contains("Must provide"));
  }

  #[tokio::test]
  async fn test_docs_ingest_empty_content() {
    let (_dir, handler) = create_test_handler();

    let request = Request {
      id: Some(serde_json::json!(1)),
      method: "docs_ingest".to_string(),
      params: serde_json::json!({
          "content": "",
          "title": "Empty Doc"
      }),
    };

    let response = handler.docs_ingest(request).await;
    assert!(response.error.is_some());
    assert!(response.error.unwrap().message.contains("empty"));
  }

  #[tokio::test]
  async fn test_code_search_invalid_params() {
    let (_dir, handler) = create_test_handler();

    let request = Request {
      id: Some(serde_json::json!(1)),
      method: "code_search".to_string(),
      params: serde_json::json!({
          "language": "rust"
      }),
    };

    let response = handler.code_search(request).await;
    assert!(response.error.is_some());
  }

  #[tokio::test]
  async fn test_memory_timeline_invalid_anchor() {
    let (data_dir, handler) = create_test_handler();
    let project_dir = TempDir::new().expect("Failed to create project dir");

    let request = Request {
      id: Some(serde_json::json!(1)),
      method: "memory_timeline".to_string(),
      params: serde_json::json!({
          "anchor_id": "01936c4f-4d77-7ba5-9f8a-123456789abc",
          "cwd": project_dir.path().to_string_lossy()
      }),
    };

    let response = handler.memory_timeline(request).await;
    assert!(response.error.is_some());
    assert!(response.error.unwrap().message.contains("not found"));
    let _ = data_dir; // Keep alive
  }

  #[tokio::test]
  async fn test_memory_supersede_missing_old() {
    let (data_dir, handler) = create_test_handler();
    let project_dir = TempDir::new().expect("Failed to create project dir");

    let request = Request {
      id: Some(serde_json::json!(1)),
      method: "memory_supersede".to_string(),
      params: serde_json::json!({
          "old_memory_id": "01936c4f-4d77-7ba5-9f8a-111111111111",
          "new_memory_id": "01936c4f-4d77-7ba5-9f8a-222222222222",
          "cwd": project_dir.path().to_string_lossy()
      }),
    };

    let response = handler.memory_supersede(request).await;
    assert!(response.error.is_some());
    assert!(response.error.unwrap().message.contains("not found"));
    let _ = data_dir; // Keep alive
  }

  #[tokio::test]
  async fn test_sector_parsing() {
    let valid_sectors = vec![
      "episodic",
      "semantic",
      "procedural",
      "emotional",
      "reflective",
      "EPISODIC",
      "Semantic",
    ];

    for sector in valid_sectors {
      let params = serde_json::json!({
          "content": "Test content for sector parsing",
          "sector": sector
      });
      assert!(params.get("sector").is_some());
    }
  }

  #[tokio::test]
  async fn test_memory_type_parsing() {
    let valid_types = vec![
      "preference",
      "codebase",
      "decision",
      "gotcha",
      "pattern",
      "turn_summary",
      "task_completion",
    ];

    for mtype in valid_types {
      let params = serde_json::json!({
          "content": "Test content for type parsing",
          "type": mtype
      });
      assert!(params.get("type").is_some());
    }
  }
}
