use engram_core::Memory;
use std::collections::HashSet;

const FNV_PRIME: u64 = 0x100000001b3;
const FNV_OFFSET: u64 = 0xcbf29ce484222325;

/// Compute 64-bit SimHash for locality-sensitive hashing
pub fn simhash(text: &str) -> u64 {
  let tokens = tokenize(text);
  let mut vector = [0i32; 64];

  for token in tokens {
    let hash = fnv1a_hash(token);
    for (i, v) in vector.iter_mut().enumerate() {
      if (hash >> i) & 1 == 1 {
        *v += 1;
      } else {
        *v -= 1;
      }
    }
  }

  let mut result = 0u64;
  for (i, &v) in vector.iter().enumerate() {
    if v > 0 {
      result |= 1 << i;
    }
  }
  result
}

/// Compute Hamming distance between two SimHashes
pub fn hamming_distance(a: u64, b: u64) -> u32 {
  (a ^ b).count_ones()
}

/// FNV-1a hash for individual tokens
fn fnv1a_hash(s: &str) -> u64 {
  let mut hash = FNV_OFFSET;
  for byte in s.bytes() {
    hash ^= byte as u64;
    hash = hash.wrapping_mul(FNV_PRIME);
  }
  hash
}

/// Tokenize text for SimHash
fn tokenize(text: &str) -> Vec<&str> {
  text
    .split(|c: char| !c.is_alphanumeric() && c != '_')
    .filter(|s| s.len() >= 3)
    .collect()
}

/// Compute Jaccard similarity between two texts
pub fn jaccard_similarity(a: &str, b: &str) -> f32 {
  let tokens_a: HashSet<&str> = tokenize(a).into_iter().collect();
  let tokens_b: HashSet<&str> = tokenize(b).into_iter().collect();

  if tokens_a.is_empty() && tokens_b.is_empty() {
    return 1.0;
  }

  let intersection = tokens_a.intersection(&tokens_b).count();
  let union = tokens_a.union(&tokens_b).count();

  if union == 0 {
    return 1.0;
  }

  intersection as f32 / union as f32
}

/// Fixed Hamming-distance threshold for the simhash duplicate probe.
/// Inclusive: distance 3 is a duplicate, 4 is not.
pub const DUPLICATE_HAMMING_THRESHOLD: u32 = 3;

/// Compute the MD5 digest of content, over its UTF-8 bytes, as a 32-hex string.
pub fn content_hash(content: &str) -> String {
  use md5::{Digest, Md5};

  let mut hasher = Md5::new();
  hasher.update(content.as_bytes());
  format!("{:x}", hasher.finalize())
}

/// Result of duplicate check
#[derive(Debug, Clone)]
pub enum DuplicateMatch {
  /// Exact content hash match
  Exact,
  /// SimHash similarity (with distance and Jaccard confirmation)
  Simhash { distance: u32, jaccard: f32 },
  /// No match
  None,
}

impl DuplicateMatch {
  pub fn is_duplicate(&self) -> bool {
    !matches!(self, DuplicateMatch::None)
  }
}

/// Check if two memories are duplicates
pub struct DuplicateChecker;

impl Default for DuplicateChecker {
  fn default() -> Self {
    Self::new()
  }
}

impl DuplicateChecker {
  pub fn new() -> Self {
    Self
  }

  /// Check for duplicate: exact content hash, or simhash Hamming distance
  /// within the fixed inclusive threshold.
  pub fn is_duplicate(&self, new_content: &str, new_hash: &str, new_simhash: u64, existing: &Memory) -> DuplicateMatch {
    // Level 1: Exact content hash match
    if new_hash == existing.content_hash {
      return DuplicateMatch::Exact;
    }

    // Level 2: SimHash Hamming distance, fixed inclusive threshold
    let distance = hamming_distance(new_simhash, existing.simhash);
    if distance <= DUPLICATE_HAMMING_THRESHOLD {
      let jaccard = jaccard_similarity(new_content, &existing.content);
      return DuplicateMatch::Simhash { distance, jaccard };
    }

    DuplicateMatch::None
  }

  /// Check a new content against a list of existing memories
  pub fn find_duplicate<'a>(&self, new_content: &str, existing: &'a [Memory]) -> Option<(&'a Memory, DuplicateMatch)> {
    let new_hash = content_hash(new_content);
    let new_simhash = simhash(new_content);

    for memory in existing {
      let result = self.is_duplicate(new_content, &new_hash, new_simhash, memory);
      if result.is_duplicate() {
        return Some((memory, result));
      }
    }

    None
  }
}

/// Compute both hashes for a piece of content
pub fn compute_hashes(content: &str) -> (String, u64) {
  (content_hash(content), simhash(content))
}
