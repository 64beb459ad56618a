//! TF-IDF feature extraction over a batch of messages

use crate::error::DetectError;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Dense row-major matrix of feature weights, one row per message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    pub fn empty() -> Self {
        Self::default()
    }

    // build from explicit rows, all rows must share one width
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, DetectError> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != cols) {
            return Err(DetectError::InvalidModelParameter(
                "feature rows must all have the same width".to_string(),
            ));
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }
}

/// Term-frequency × inverse-document-frequency vectorizer.
///
/// The vocabulary is learned from the messages given to [`fit_transform`]
/// and thrown away afterwards; nothing is shared between calls.
///
/// [`fit_transform`]: TfidfVectorizer::fit_transform
#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    max_features: usize,
    token_pattern: Regex,
}

// (fitted vocabulary) term -> column
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    pub terms: Vec<String>,
    pub idf: Vec<f64>,
}

impl TfidfVectorizer {
    pub fn new(max_features: usize) -> Self {
        Self {
            max_features: max_features.max(1),
            // two or more word characters
            token_pattern: Regex::new(r"\b\w\w+\b").unwrap(),
        }
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.token_pattern
            .find_iter(&lowered)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    pub fn fit_transform(&self, messages: &[&str]) -> Result<FeatureMatrix, DetectError> {
        self.fit_transform_with_vocabulary(messages).map(|(m, _)| m)
    }

    /// Fit the vocabulary on `messages` and return their weight rows together
    /// with the vocabulary. Zero messages give an empty matrix; messages without
    /// a single usable token give [`DetectError::EmptyVocabulary`].
    pub fn fit_transform_with_vocabulary(
        &self,
        messages: &[&str],
    ) -> Result<(FeatureMatrix, Vocabulary), DetectError> {
        if messages.is_empty() {
            return Ok((FeatureMatrix::empty(), Vocabulary { terms: vec![], idf: vec![] }));
        }

        let docs: Vec<Vec<String>> = messages.iter().map(|m| self.tokenize(m)).collect();

        // term -> (total count, document frequency)
        let mut stats: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for doc in &docs {
            let mut seen: HashSet<&str> = HashSet::with_capacity(doc.len());
            for token in doc {
                let entry = stats.entry(token.as_str()).or_insert((0, 0));
                entry.0 += 1;
                if seen.insert(token.as_str()) {
                    entry.1 += 1;
                }
            }
        }

        if stats.is_empty() {
            return Err(DetectError::EmptyVocabulary);
        }

        let mut kept: Vec<(&str, usize, usize)> = stats.into_iter().map(|(t, (c, df))| (t, c, df)).collect();
        if kept.len() > self.max_features {
            // most frequent first, alphabetical among equals
            kept.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            kept.truncate(self.max_features);
            kept.sort_by(|a, b| a.0.cmp(b.0));
        }

        let n = docs.len() as f64;
        let columns: HashMap<&str, usize> = kept.iter().enumerate().map(|(col, (t, _, _))| (*t, col)).collect();
        let idf: Vec<f64> = kept
            .iter()
            .map(|(_, _, df)| ((1.0 + n) / (1.0 + *df as f64)).ln() + 1.0)
            .collect();

        let cols = kept.len();
        let mut data = vec![0.0; docs.len() * cols];
        for (row, doc) in docs.iter().enumerate() {
            let weights = &mut data[row * cols..(row + 1) * cols];
            for token in doc {
                if let Some(&col) = columns.get(token.as_str()) {
                    weights[col] += 1.0;
                }
            }
            for (w, idf) in weights.iter_mut().zip(&idf) {
                *w *= idf;
            }
            let norm = weights.iter().map(|w| w * w).sum::<f64>().sqrt();
            if norm > 0.0 {
                weights.iter_mut().for_each(|w| *w /= norm);
            }
        }

        let vocabulary = Vocabulary {
            terms: kept.iter().map(|(t, _, _)| t.to_string()).collect(),
            idf,
        };

        Ok((
            FeatureMatrix {
                rows: docs.len(),
                cols,
                data,
            },
            vocabulary,
        ))
    }
}
