//! Detection pipeline: rules, anomaly model and fusion over one batch

use crate::aggregate::{Aggregator, SummaryStats};
use crate::config::{load_config, DetectionConfig};
use crate::error::DetectError;
use crate::features::TfidfVectorizer;
use crate::fusion::{DetectionResult, Fusion, ModelStage, SeverityClassifier};
use crate::rules::RuleMatcher;
use crate::svm::AnomalyScorer;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};
use txlog_core::LogBatch;

// main detector that runs rules + model + fusion over one batch
// holds only compiled configuration, never a batch or a result
#[derive(Debug, Clone)]
pub struct Detector {
    config: DetectionConfig,
    rules: RuleMatcher,
    vectorizer: TfidfVectorizer,
    scorer: AnomalyScorer,
    fusion: Fusion,
    aggregator: Aggregator,
}

impl Detector {
    pub fn new(config: DetectionConfig) -> Result<Self, DetectError> {
        config.validate()?;

        let rules = RuleMatcher::new(&config.rule_keywords)?;
        let vectorizer = TfidfVectorizer::new(config.features.max_features);
        let scorer = AnomalyScorer::new(config.model.clone())?;
        let fusion = Fusion::new(SeverityClassifier::new(&config.severity)?);
        let aggregator = Aggregator::new(&config.categories, &config.summary)?;

        Ok(Self {
            config,
            rules,
            vectorizer,
            scorer,
            fusion,
            aggregator,
        })
    }

    // create a detector from a config file
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> Result<Self, DetectError> {
        Self::new(load_config(path)?)
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleMatcher {
        &self.rules
    }

    pub fn fusion(&self) -> &Fusion {
        &self.fusion
    }

    /// One full detection run over `batch`.
    pub fn analyze(&self, batch: &LogBatch) -> Result<DetectionResult, DetectError> {
        info!(batch = %batch.id(), records = batch.len(), "Starting detection run");

        let rule_hits = self.rules.match_rules(batch);
        info!(flagged = rule_hits.len(), "Rule matching done");

        let (model_hits, stage) = self.model_outliers(batch)?;

        let result = self.fusion.fuse(batch, &rule_hits, &model_hits).with_model_stage(stage);
        info!(
            flagged = result.len(),
            rule = rule_hits.len(),
            model = model_hits.len(),
            "Detection run finished"
        );
        Ok(result)
    }

    // indices of error-level records the boundary model puts outside
    pub fn model_outliers(&self, batch: &LogBatch) -> Result<(BTreeSet<usize>, ModelStage), DetectError> {
        let error_records: Vec<(usize, &str)> = batch
            .with_level(&self.config.error_level)
            .map(|(i, r)| (i, r.message.as_str()))
            .collect();

        if error_records.is_empty() {
            info!(level = %self.config.error_level, "No error-level records, skipping anomaly model");
            return Ok((BTreeSet::new(), ModelStage::NoErrorRecords));
        }

        let messages: Vec<&str> = error_records.iter().map(|(_, m)| *m).collect();
        let matrix = match self.vectorizer.fit_transform(&messages) {
            Ok(matrix) => matrix,
            Err(DetectError::EmptyVocabulary) => {
                warn!(records = messages.len(), "Error-level messages have no usable terms, skipping anomaly model");
                return Ok((BTreeSet::new(), ModelStage::EmptyVocabulary));
            }
            Err(e) => return Err(e),
        };

        let labels = self.scorer.score(&matrix)?;
        let outliers: BTreeSet<usize> = error_records
            .iter()
            .zip(&labels)
            .filter(|(_, label)| label.is_outlier())
            .map(|((i, _), _)| *i)
            .collect();

        info!(
            scored = labels.len(),
            features = matrix.cols(),
            outliers = outliers.len(),
            "Anomaly model scored error-level records"
        );

        let stage = ModelStage::Ran {
            scored: labels.len(),
            outliers: outliers.len(),
        };
        Ok((outliers, stage))
    }

    pub fn summarize(&self, batch: &LogBatch, result: &DetectionResult) -> Result<SummaryStats, DetectError> {
        self.aggregator.summarize(batch, result)
    }
}
