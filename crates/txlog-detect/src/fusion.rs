//! Result fusion and severity classification

use crate::config::SeverityConfig;
use crate::error::DetectError;
use crate::rules::KeywordSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use txlog_core::{LogBatch, LogRecord};
use uuid::Uuid;

// Severity tiers, ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        };
        f.write_str(name)
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            other => Err(format!("unknown severity {:?}", other)),
        }
    }
}

// which detector flagged a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Rule,
    Model,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::Rule => "rule",
            Source::Model => "model",
        })
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "rule" => Ok(Source::Rule),
            "model" => Ok(Source::Model),
            other => Err(format!("unknown detector {:?}", other)),
        }
    }
}

// "rule", "model" or "rule,model"
pub fn format_sources(sources: &BTreeSet<Source>) -> String {
    sources.iter().map(Source::to_string).collect::<Vec<_>>().join(",")
}

// What happened to the anomaly model stage of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelStage {
    NotRun,
    // no record carried the error level
    NoErrorRecords,
    // error-level messages had no usable term
    EmptyVocabulary,
    Ran { scored: usize, outliers: usize },
}

/// One flagged record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub index: usize, // position in the originating batch
    pub record: LogRecord,
    pub flagged_by: BTreeSet<Source>,
    pub severity: Severity,
}

/// Flagged subset of one batch, in batch order, with no repeated index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub batch_id: Uuid,
    pub detections: Vec<Detection>,
    pub model_stage: ModelStage,
}

impl DetectionResult {
    // explicit "no failures" result
    pub fn empty(batch: &LogBatch) -> Self {
        Self {
            batch_id: batch.id(),
            detections: Vec::new(),
            model_stage: ModelStage::NotRun,
        }
    }

    pub fn with_model_stage(mut self, stage: ModelStage) -> Self {
        self.model_stage = stage;
        self
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.detections.iter().map(|d| d.index).collect()
    }

    pub fn count_by_severity(&self, severity: Severity) -> usize {
        self.detections.iter().filter(|d| d.severity == severity).count()
    }

    // refuse to pair this result with a different load
    pub fn ensure_batch(&self, batch: &LogBatch) -> Result<(), DetectError> {
        if self.batch_id != batch.id() {
            return Err(DetectError::BatchMismatch {
                batch: batch.id(),
                result: self.batch_id,
            });
        }
        Ok(())
    }
}

// keyword precedence: high words win over medium words, neither means low
#[derive(Debug, Clone)]
pub struct SeverityClassifier {
    high: KeywordSet,
    medium: KeywordSet,
}

impl SeverityClassifier {
    pub fn new(config: &SeverityConfig) -> Result<Self, DetectError> {
        Ok(Self {
            high: KeywordSet::whole_word(&config.high)?,
            medium: KeywordSet::whole_word(&config.medium)?,
        })
    }

    pub fn classify(&self, message: &str) -> Severity {
        if self.high.is_match(message) {
            Severity::High
        } else if self.medium.is_match(message) {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

// Fusion - unions rule and model hits into one DetectionResult
#[derive(Debug, Clone)]
pub struct Fusion {
    classifier: SeverityClassifier,
}

impl Fusion {
    pub fn new(classifier: SeverityClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &SeverityClassifier {
        &self.classifier
    }

    pub fn fuse(
        &self,
        batch: &LogBatch,
        rule_indices: &BTreeSet<usize>,
        model_indices: &BTreeSet<usize>,
    ) -> DetectionResult {
        let mut flagged: BTreeMap<usize, BTreeSet<Source>> = BTreeMap::new();
        for &i in rule_indices {
            flagged.entry(i).or_default().insert(Source::Rule);
        }
        for &i in model_indices {
            flagged.entry(i).or_default().insert(Source::Model);
        }

        let mut detections = Vec::with_capacity(flagged.len());
        for (index, flagged_by) in flagged {
            let Some(record) = batch.get(index) else {
                warn!(index, batch_len = batch.len(), "Ignoring flagged index outside the batch");
                continue;
            };
            detections.push(Detection {
                index,
                record: record.clone(),
                flagged_by,
                severity: self.classifier.classify(&record.message),
            });
        }

        DetectionResult {
            batch_id: batch.id(),
            detections,
            model_stage: ModelStage::NotRun,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn classifier() -> SeverityClassifier {
        SeverityClassifier::new(&SeverityConfig::default()).unwrap()
    }

    fn batch(messages: &[&str]) -> LogBatch {
        let now = Utc::now();
        LogBatch::new(messages.iter().map(|m| LogRecord::new(now, "ERROR", *m)).collect())
    }

    #[test]
    fn test_severity_precedence() {
        let c = classifier();
        assert_eq!(c.classify("FATAL error in ledger"), Severity::High);
        assert_eq!(c.classify("critical: disk full"), Severity::High);
        assert_eq!(c.classify("Error while charging card"), Severity::Medium);
        assert_eq!(c.classify("payment failure"), Severity::Medium);
        assert_eq!(c.classify("Timeout on gateway"), Severity::Low);
        assert_eq!(c.classify("criticality review"), Severity::Low);
    }

    #[test]
    fn test_severity_ignores_case() {
        let c = classifier();
        assert_eq!(c.classify("ERROR x"), c.classify("error x"));
        assert_eq!(c.classify("Fatal"), c.classify("fAtAl"));
    }

    #[test]
    fn test_union_deduplicates_and_keeps_provenance() {
        let b = batch(&["error a", "b", "timeout c", "d"]);
        let rules = BTreeSet::from([0, 2]);
        let model = BTreeSet::from([2, 3]);

        let result = Fusion::new(classifier()).fuse(&b, &rules, &model);

        assert_eq!(result.indices(), vec![0, 2, 3]);
        assert_eq!(result.detections[0].flagged_by, BTreeSet::from([Source::Rule]));
        assert_eq!(result.detections[1].flagged_by, BTreeSet::from([Source::Rule, Source::Model]));
        assert_eq!(result.detections[2].flagged_by, BTreeSet::from([Source::Model]));
        assert_eq!(result.detections[0].severity, Severity::Medium);
        assert_eq!(result.detections[1].record, b.records()[2]);
    }

    #[test]
    fn test_empty_union_is_explicit_empty_result() {
        let b = batch(&["fine"]);
        let result = Fusion::new(classifier()).fuse(&b, &BTreeSet::new(), &BTreeSet::new());
        assert!(result.is_empty());
        assert_eq!(result.batch_id, b.id());
    }

    #[test]
    fn test_out_of_range_indices_ignored() {
        let b = batch(&["error"]);
        let result = Fusion::new(classifier()).fuse(&b, &BTreeSet::from([0, 7]), &BTreeSet::new());
        assert_eq!(result.indices(), vec![0]);
    }

    #[test]
    fn test_batch_mismatch_detected() {
        let b = batch(&["error"]);
        let other = batch(&["error"]);
        let result = Fusion::new(classifier()).fuse(&b, &BTreeSet::from([0]), &BTreeSet::new());
        assert!(result.ensure_batch(&b).is_ok());
        assert!(matches!(result.ensure_batch(&other), Err(DetectError::BatchMismatch { .. })));
    }

    #[test]
    fn test_labels_parse_back() {
        for s in [Severity::Low, Severity::Medium, Severity::High] {
            assert_eq!(s.to_string().parse::<Severity>().unwrap(), s);
        }
        assert_eq!(format_sources(&BTreeSet::from([Source::Model, Source::Rule])), "rule,model");
        assert!("nobody".parse::<Source>().is_err());
    }
}
