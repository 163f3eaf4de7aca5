// kb-retriever-rs/src/text.rs
// Tokenization, stopword removal and stemming into sparse term vectors

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_segmentation::UnicodeSegmentation;

const MAX_TOKENS: usize = 10_000;
const MAX_TOKEN_LEN: usize = 100;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "from", "as", "is", "was", "are", "were", "been", "be", "have", "has", "had", "do", "does",
        "did", "will", "would", "could", "should", "may", "might", "must", "shall", "can", "it",
        "its", "this", "that", "these", "those", "we", "you", "i", "my", "your", "their", "our",
        "what", "which", "who", "when", "where", "why", "how", "not", "no", "so", "if", "then",
        "than", "too", "very", "just", "about", "into", "through", "during", "before", "after",
        "all", "each", "more", "most", "other", "some", "such", "only", "same", "also", "both",
        "any", "below", "give", "me",
    ]
    .iter()
    .cloned()
    .collect()
});

/// Sparse term-frequency vector with its Euclidean norm
#[derive(Debug, Clone, Default)]
pub(crate) struct TermVector {
    weights: HashMap<String, f32>,
    norm: f32,
}

impl TermVector {
    pub(crate) fn from_text(text: &str) -> Self {
        let stemmer = Stemmer::create(Algorithm::English);
        let mut weights: HashMap<String, f32> = HashMap::new();

        for word in text.unicode_words().take(MAX_TOKENS) {
            let lowered = word.to_lowercase();
            if lowered.chars().count() < 2 || STOPWORDS.contains(lowered.as_str()) {
                continue;
            }
            let term = if lowered.len() > MAX_TOKEN_LEN {
                lowered.chars().take(MAX_TOKEN_LEN).collect()
            } else {
                stemmer.stem(&lowered).to_string()
            };
            *weights.entry(term).or_insert(0.0) += 1.0;
        }

        let norm = weights.values().map(|w| w * w).sum::<f32>().sqrt();
        Self { weights, norm }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Cosine similarity; term weights are non-negative so the result is in [0, 1]
    pub(crate) fn cosine(&self, other: &TermVector) -> f32 {
        if self.norm == 0.0 || other.norm == 0.0 {
            return 0.0;
        }

        let (small, large) = if self.weights.len() <= other.weights.len() {
            (&self.weights, &other.weights)
        } else {
            (&other.weights, &self.weights)
        };

        let dot: f32 = small
            .iter()
            .filter_map(|(term, w)| large.get(term).map(|v| w * v))
            .sum();

        (dot / (self.norm * other.norm)).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stemming_and_stopwords() {
        let v = TermVector::from_text("Restarting the servers and restart server");
        assert_eq!(v.weights.get("restart"), Some(&2.0));
        assert_eq!(v.weights.get("server"), Some(&2.0));
        assert!(!v.weights.contains_key("the"));
    }

    #[test]
    fn test_cosine_bounds() {
        let a = TermVector::from_text("patch linux kernel");
        let b = TermVector::from_text("patch linux kernel");
        let c = TermVector::from_text("rotate firewall certificates");

        assert!((a.cosine(&b) - 1.0).abs() < 1e-6);
        assert_eq!(a.cosine(&c), 0.0);
        assert_eq!(a.cosine(&TermVector::default()), 0.0);
    }
}
