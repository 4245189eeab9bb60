//! BM25 sparse encoder - keyword vectors computed locally
//!
//! Term indices are hashed so they stay stable across restarts and between
//! processes writing to the same collection. Document weights carry the BM25
//! term-frequency saturation; the IDF factor is applied by the store at query
//! time (Qdrant `modifier: idf`, or the local store's own IDF pass).

use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::{SparseEncoder, SparseVector};

/// Named sparse vector used by every collection this server creates
pub const SPARSE_VECTOR_NAME: &str = "sparse";

/// Word tokens (`\w+`)
fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+").expect("Invalid token regex"))
}

#[derive(Debug, Clone)]
pub struct Bm25Encoder {
    k1: f32,
    b: f32,
    /// Assumed average note length in tokens
    avg_doc_len: f32,
}

impl Bm25Encoder {
    pub fn new() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            avg_doc_len: 40.0,
        }
    }

    fn tokenize(text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        token_regex()
            .find_iter(&lower)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    /// Stable 32-bit term index
    fn term_index(term: &str) -> u32 {
        let digest = Sha256::digest(term.as_bytes());
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    /// Term frequencies keyed by hashed index (colliding terms share a slot)
    fn term_counts(text: &str) -> (BTreeMap<u32, u32>, usize) {
        let tokens = Self::tokenize(text);
        let len = tokens.len();
        let mut counts = BTreeMap::new();
        for token in tokens {
            *counts.entry(Self::term_index(&token)).or_insert(0) += 1;
        }
        (counts, len)
    }
}

impl Default for Bm25Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseEncoder for Bm25Encoder {
    fn vector_name(&self) -> &str {
        SPARSE_VECTOR_NAME
    }

    fn encode_query(&self, text: &str) -> SparseVector {
        let (counts, _) = Self::term_counts(text);
        SparseVector {
            values: vec![1.0; counts.len()],
            indices: counts.into_keys().collect(),
        }
    }

    fn encode_document(&self, text: &str) -> SparseVector {
        let (counts, doc_len) = Self::term_counts(text);
        let norm = 1.0 - self.b + self.b * (doc_len as f32 / self.avg_doc_len);

        let mut vector = SparseVector::default();
        for (index, tf) in counts {
            let tf = tf as f32;
            vector.indices.push(index);
            vector.values.push(tf * (self.k1 + 1.0) / (tf + self.k1 * norm));
        }
        vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_words() {
        let tokens = Bm25Encoder::tokenize("Git REBASE -i, HEAD~3!");
        assert_eq!(tokens, vec!["git", "rebase", "i", "head", "3"]);
    }

    #[test]
    fn test_indices_sorted_and_stable() {
        let enc = Bm25Encoder::new();
        let a = enc.encode_document("docker compose up --build");
        let b = enc.encode_document("docker compose up --build");
        assert_eq!(a, b);
        assert!(a.indices.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_query_and_document_share_indices() {
        let enc = Bm25Encoder::new();
        let q = enc.encode_query("compose");
        let d = enc.encode_document("docker compose up");
        assert_eq!(q.len(), 1);
        assert!(d.indices.contains(&q.indices[0]));
        assert_eq!(q.values, vec![1.0]);
    }

    #[test]
    fn test_repeated_terms_saturate() {
        let enc = Bm25Encoder::new();
        let once = enc.encode_document("cargo");
        let many = enc.encode_document("cargo cargo cargo cargo");
        assert!(many.values[0] > once.values[0]);
        assert!(many.values[0] < 4.0 * once.values[0]);
        assert!(many.values[0] < enc.k1 + 1.0);
    }

    #[test]
    fn test_empty_text_yields_empty_vector() {
        let enc = Bm25Encoder::new();
        assert!(enc.encode_query("  --- ").is_empty());
        assert!(enc.encode_document("").is_empty());
    }
}
