//! Embeddings capability interface.
//!
//! The real provider is an external service; [`HashingEmbedder`] is a
//! deterministic in-process stand-in. Each token seeds an RNG and contributes
//! a random ±1 vector, so texts sharing tokens land close together.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::{Rng, SeedableRng};

use crate::error::EmbedError;

/// Result type for embedding calls.
pub type EmbedResult<T> = std::result::Result<T, EmbedError>;

/// Something that turns text into a dense vector.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> EmbedResult<Vec<f32>>;
}

/// Deterministic bag-of-tokens embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub const DEFAULT_DIMENSION: usize = 256;

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn token_seed(token: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        hasher.finish()
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSION)
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed(&self, text: &str) -> EmbedResult<Vec<f32>> {
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();
        if tokens.is_empty() {
            return Err(EmbedError::EmptyText);
        }

        let mut out = vec![0.0f32; self.dimension];
        for token in &tokens {
            let mut rng = rand::rngs::StdRng::seed_from_u64(Self::token_seed(token));
            for slot in out.iter_mut() {
                *slot += if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            }
        }
        let norm = out.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for slot in out.iter_mut() {
                *slot /= norm;
            }
        }
        Ok(out)
    }
}

/// Cosine similarity of two vectors; 0 when either is zero or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}
