use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};

use thiserror::Error;
use tracing::{debug, info};

use redress_core::config::RetrieverConfig;

/// Embedding dimension for the hashed bag-of-words vectors. Small enough to
/// keep the index cheap, large enough that policy-sized corpora rarely
/// collide.
const EMBEDDING_DIM: usize = 256;

#[derive(Debug, Error)]
pub enum RetrieverError {
    #[error("failed to read policy directory {path}: {source}")]
    ReadDir { path: String, source: std::io::Error },
    #[error("failed to read policy document {path}: {source}")]
    ReadDocument { path: String, source: std::io::Error },
}

#[derive(Clone, Debug, PartialEq)]
pub struct PolicySnippet {
    pub source: String,
    pub text: String,
    pub score: f32,
}

struct Chunk {
    source: String,
    text: String,
    embedding: Vec<f32>,
}

/// Read-only similarity index over a directory of policy documents. Built
/// once at startup and shared across concurrent requests; queries never
/// mutate it.
pub struct PolicyIndex {
    chunks: Vec<Chunk>,
    top_k: usize,
}

impl PolicyIndex {
    /// Build the index from every `.md` and `.txt` file under
    /// `config.policy_dir`. A missing or empty directory yields an empty,
    /// queryable index.
    pub fn build(config: &RetrieverConfig) -> Result<Self, RetrieverError> {
        let dir = config.policy_dir.as_path();
        if !dir.is_dir() {
            info!(policy_dir = %dir.display(), "policy directory not found; starting with an empty index");
            return Ok(Self { chunks: Vec::new(), top_k: config.top_k });
        }

        let mut chunks = Vec::new();
        let entries = fs::read_dir(dir).map_err(|source| RetrieverError::ReadDir {
            path: dir.display().to_string(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| RetrieverError::ReadDir {
                path: dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            let is_text = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| ext == "md" || ext == "txt");
            if !is_text {
                continue;
            }

            let content =
                fs::read_to_string(&path).map_err(|source| RetrieverError::ReadDocument {
                    path: path.display().to_string(),
                    source,
                })?;
            let source = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("unknown")
                .to_string();
            for text in chunk_text(&content, config.chunk_size, config.chunk_overlap) {
                let embedding = embed(&text);
                chunks.push(Chunk { source: source.clone(), text, embedding });
            }
        }

        debug!(chunk_count = chunks.len(), "policy index built");
        Ok(Self { chunks, top_k: config.top_k })
    }

    #[cfg(test)]
    fn from_texts(texts: &[(&str, &str)], top_k: usize) -> Self {
        let chunks = texts
            .iter()
            .map(|(source, text)| Chunk {
                source: source.to_string(),
                text: text.to_string(),
                embedding: embed(text),
            })
            .collect();
        Self { chunks, top_k }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Top-k chunks by cosine similarity, most similar first. Both sides are
    /// unit vectors so cosine reduces to a dot product.
    pub fn retrieve(&self, query: &str, k: usize) -> Vec<PolicySnippet> {
        let query_embedding = embed(query);
        let mut scored: Vec<PolicySnippet> = self
            .chunks
            .iter()
            .map(|chunk| PolicySnippet {
                source: chunk.source.clone(),
                text: chunk.text.clone(),
                score: dot(&chunk.embedding, &query_embedding),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
    }

    /// Convenience used by the runtime: retrieved snippets joined into a
    /// single prompt-ready context block.
    pub fn context_for(&self, query: &str) -> String {
        self.retrieve(query, self.top_k)
            .iter()
            .map(|snippet| snippet.text.trim())
            .collect::<Vec<_>>()
            .join("\n---\n")
    }
}

/// Fixed-size character chunks with overlap, split on char boundaries.
fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Deterministic hashed bag-of-words embedding, L2-normalized. Tokens are
/// lowercased alphanumeric runs; each token increments one hashed dimension.
fn embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIM];
    for token in tokens(text) {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        let dimension = (hasher.finish() as usize) % EMBEDDING_DIM;
        vector[dimension] += 1.0;
    }
    normalize(vector)
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn normalize(vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.into_iter().map(|x| x / norm).collect()
    } else {
        vector
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use redress_core::config::RetrieverConfig;

    use super::{chunk_text, embed, PolicyIndex};

    fn config_for(dir: impl Into<std::path::PathBuf>) -> RetrieverConfig {
        RetrieverConfig { policy_dir: dir.into(), chunk_size: 500, chunk_overlap: 50, top_k: 2 }
    }

    #[test]
    fn ranks_the_on_topic_document_first() {
        let index = PolicyIndex::from_texts(
            &[
                ("refund_policy.md", "Refunds are issued within 30 days of purchase."),
                ("shipping_policy.md", "Standard shipping takes 5 business days."),
            ],
            2,
        );
        let results = index.retrieve("how do refunds work", 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, "refund_policy.md");
        assert!(results[0].score > 0.0);
    }

    #[test]
    fn empty_corpus_returns_empty_results() {
        let index = PolicyIndex::from_texts(&[], 2);
        assert!(index.is_empty());
        assert!(index.retrieve("anything", 3).is_empty());
        assert_eq!(index.context_for("anything"), "");
    }

    #[test]
    fn builds_from_a_directory_of_markdown_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("refunds.md"), "Refund requests need an order number.")
            .expect("write");
        fs::write(dir.path().join("ignored.bin"), "binary").expect("write");

        let index = PolicyIndex::build(&config_for(dir.path())).expect("build");
        assert!(!index.is_empty());
        let context = index.context_for("refund");
        assert!(context.contains("order number"));
    }

    #[test]
    fn missing_directory_yields_empty_index() {
        let index = PolicyIndex::build(&config_for("/nonexistent/policies")).expect("build");
        assert!(index.is_empty());
    }

    #[test]
    fn chunks_overlap_and_cover_the_document() {
        let text = "a".repeat(10);
        let chunks = chunk_text(&text, 4, 2);
        assert_eq!(chunks[0].len(), 4);
        assert!(chunks.len() >= 4);
        let rebuilt: usize = chunks.iter().map(String::len).sum();
        assert!(rebuilt >= text.len());
    }

    #[test]
    fn embeddings_are_unit_length_and_deterministic() {
        let a = embed("refund broken bottle");
        let b = embed("refund broken bottle");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
