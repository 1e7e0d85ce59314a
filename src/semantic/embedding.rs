//! Local deterministic embeddings
//!
//! Feature hashing over identifier tokens: each token is hashed with blake3
//! into one of [`EMBEDDING_DIMENSION`] buckets with a hash-derived sign, then
//! the vector is L2-normalized. Identical input always gives the identical
//! vector, and nothing leaves the process.

use super::context::SymbolContext;
use super::types::EMBEDDING_DIMENSION;

const NAME_WEIGHT: f32 = 3.0;
const SIGNATURE_WEIGHT: f32 = 1.5;
const BODY_WEIGHT: f32 = 1.0;

/// Embedding for one symbol context.
pub fn embed(context: &SymbolContext) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIMENSION];
    for token in &context.name_tokens {
        add_feature(&mut vector, token, NAME_WEIGHT);
    }
    // Name bigrams keep `get_user` and `user_get` apart.
    for pair in context.name_tokens.windows(2) {
        add_feature(&mut vector, &format!("{}_{}", pair[0], pair[1]), NAME_WEIGHT);
    }
    for token in &context.signature_tokens {
        add_feature(&mut vector, token, SIGNATURE_WEIGHT);
    }
    for token in &context.body_tokens {
        add_feature(&mut vector, token, BODY_WEIGHT);
    }
    normalize(&mut vector);
    vector
}

fn add_feature(vector: &mut [f32], token: &str, weight: f32) {
    let hash = blake3::hash(token.as_bytes());
    let bytes = hash.as_bytes();
    let mut bucket = [0u8; 8];
    bucket.copy_from_slice(&bytes[..8]);
    let index = (u64::from_le_bytes(bucket) % vector.len() as u64) as usize;
    let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
    vector[index] += sign * weight;
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity; 0.0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-12 {
        return 0.0;
    }
    (dot / denom) as f32
}
