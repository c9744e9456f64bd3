//! Benchmarks for code-as-document indexing operations
//!
//! Indexed source files are stored as Documents with `is_code = true`; these
//! benchmarks exercise that path plus the per-file indexing bookkeeping.
//!
//! Run with: cargo bench -p db --bench code_bench

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use db::{IndexedFile, ProjectDb};
use engram_core::{Document, DocumentChunk, DocumentSource};
use std::path::Path;
use tempfile::TempDir;
use uuid::Uuid;

fn create_test_document(idx: usize, project_id: Uuid, rust: bool) -> Document {
  let (content, path, lang) = if rust {
    (
      format!(
        r#"/// Function {} documentation
pub fn function_{}(arg: i32) -> Result<i32, Error> {{
    let result = arg * 2;
    if result > 100 {{
        return Err(Error::TooLarge);
    }}
    Ok(result)
}}"#,
        idx, idx
      ),
      format!("src/module_{}.rs", idx),
      "rust",
    )
  } else {
    (
      format!(
        r#"/**
 * Function {} documentation
 */
export function function_{}(arg: number): number {{
    const result = arg * 2;
    if (result > 100) {{
        throw new Error('Too large');
    }}
    return result;
}}"#,
        idx, idx
      ),
      format!("src/module_{}.ts", idx),
      "typescript",
    )
  };

  Document::with_content(project_id, Some(path), None, DocumentSource::Code, content, true, Some(lang.to_string()))
}

fn open_bench_db(dir: &TempDir) -> ProjectDb {
  let rt = tokio::runtime::Runtime::new().unwrap();
  let project_id = engram_core::ProjectId::from_path(Path::new("/bench"));
  rt.block_on(ProjectDb::open_at_path(project_id, dir.path().join("test.db"))).unwrap()
}

fn bench_document_add(c: &mut Criterion) {
  let mut group = c.benchmark_group("code_document_add");
  group.throughput(Throughput::Elements(1));

  group.bench_function("single", |b| {
    b.iter(|| {
      let temp_dir = TempDir::new().unwrap();
      let db = open_bench_db(&temp_dir);

      let doc = create_test_document(0, Uuid::new_v4(), true);
      db.upsert_document(black_box(&doc)).unwrap();

      let chunk = DocumentChunk::new(doc.id, doc.project_id, doc.full_content.clone().unwrap_or_default(), 0, 0, 100);
      let vector: Vec<f32> = (0..768).map(|i| (i as f32 * 0.001).sin()).collect();
      db.add_document_chunk(&chunk, Some(("test:embed", &vector))).unwrap();
    });
  });

  group.finish();
}

fn bench_document_batch_add(c: &mut Criterion) {
  let mut group = c.benchmark_group("code_document_batch_add");

  for size in [10, 50, 100, 200].iter() {
    group.throughput(Throughput::Elements(*size as u64));
    group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
      b.iter(|| {
        let temp_dir = TempDir::new().unwrap();
        let db = open_bench_db(&temp_dir);
        let project_id = Uuid::new_v4();

        for i in 0..size {
          let doc = create_test_document(i, project_id, i % 2 == 0);
          db.upsert_document(&doc).unwrap();
          let chunk = DocumentChunk::new(doc.id, doc.project_id, doc.full_content.clone().unwrap_or_default(), 0, 0, 100);
          let vector: Vec<f32> = (0..768).map(|j| ((i + j) as f32 * 0.001).sin()).collect();
          db.add_document_chunk(&chunk, Some(("test:embed", &vector))).unwrap();
        }
      });
    });
  }

  group.finish();
}

fn bench_document_chunks_fts_search(c: &mut Criterion) {
  let temp_dir = TempDir::new().unwrap();
  let db = open_bench_db(&temp_dir);
  let project_id = Uuid::new_v4();

  for i in 0..200 {
    let doc = create_test_document(i, project_id, i % 3 == 0);
    db.upsert_document(&doc).unwrap();
    let chunk = DocumentChunk::new(doc.id, doc.project_id, doc.full_content.clone().unwrap_or_default(), 0, 0, 100);
    db.add_document_chunk(&chunk, None).unwrap();
  }

  let mut group = c.benchmark_group("code_document_chunks_fts_search");

  for limit in [5, 10, 20].iter() {
    group.bench_with_input(BenchmarkId::from_parameter(limit), limit, |b, &limit| {
      b.iter(|| db.search_document_chunks_fts(black_box(project_id), black_box("function"), black_box(limit)).unwrap());
    });
  }

  group.finish();
}

fn bench_indexed_file_upsert(c: &mut Criterion) {
  let temp_dir = TempDir::new().unwrap();
  let db = open_bench_db(&temp_dir);
  let project_id = Uuid::new_v4();

  let mut group = c.benchmark_group("indexed_file_upsert");

  group.bench_function("single", |b| {
    let mut i = 0usize;
    b.iter(|| {
      i += 1;
      db.upsert_indexed_file(black_box(&IndexedFile {
        project_id,
        path: format!("src/module_{}.rs", i),
        checksum: format!("hash_{}", i),
        last_indexed_at: chrono::Utc::now(),
        language: Some("rust".to_string()),
        document_id: None,
        gitignore_hash: None,
      }))
      .unwrap();
    });
  });

  group.finish();
}

criterion_group!(
  benches,
  bench_document_add,
  bench_document_batch_add,
  bench_document_chunks_fts_search,
  bench_indexed_file_upsert
);
criterion_main!(benches);
