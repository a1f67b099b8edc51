use std::collections::BTreeMap;

/// Sparse vector in Qdrant's `{indices, values}` shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

/// Produces the dense and sparse vector for one text.
pub trait Embedder: Send + Sync {
    fn dense(&self, text: &str) -> Vec<f32>;
    fn sparse(&self, text: &str) -> SparseVector;
}

/// Feature-hashing embedder over lowercased alphanumeric tokens.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

fn fnv1a(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

impl Embedder for HashingEmbedder {
    fn dense(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];
        if self.dimension == 0 {
            return embedding;
        }
        for token in tokens(text) {
            let hash = fnv1a(&token);
            let slot = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[slot] += sign;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }
        embedding
    }

    fn sparse(&self, text: &str) -> SparseVector {
        let mut counts: BTreeMap<u32, f32> = BTreeMap::new();
        for token in tokens(text) {
            *counts.entry(fnv1a(&token) as u32).or_default() += 1.0;
        }
        let (indices, values) = counts.into_iter().unzip();
        SparseVector { indices, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_vectors_are_normalised_and_stable() {
        let embedder = HashingEmbedder::new(32);
        let a = embedder.dense("Hello, hello world");
        let b = embedder.dense("hello HELLO world!");
        assert_eq!(a.len(), 32);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_gives_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.dense("  ...  ").iter().all(|v| *v == 0.0));
        assert_eq!(embedder.sparse(""), SparseVector::default());
    }

    #[test]
    fn sparse_counts_term_frequency() {
        let embedder = HashingEmbedder::new(8);
        let sparse = embedder.sparse("a b a");
        assert_eq!(sparse.indices.len(), 2);
        let mut values = sparse.values.clone();
        values.sort_by(|x, y| x.total_cmp(y));
        assert_eq!(values, vec![1.0, 2.0]);
        let mut sorted = sparse.indices.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, sparse.indices);
    }
}
