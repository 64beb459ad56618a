//! Failure detection over transactional logs: keyword rules, TF-IDF + one-class SVM, fusion and summaries

pub mod aggregate;
pub mod config;
pub mod error;
pub mod features;
pub mod fusion;
pub mod pipeline;
pub mod report;
pub mod rules;
pub mod svm;

pub use aggregate::{Aggregator, SummaryStats};
pub use config::{load_config, DetectionConfig};
pub use error::DetectError;
pub use features::{FeatureMatrix, TfidfVectorizer};
pub use fusion::{Detection, DetectionResult, Fusion, ModelStage, Severity, SeverityClassifier, Source};
pub use pipeline::Detector;
pub use report::{parse_report, write_report, ReportEntry, ReportFormat};
pub use rules::RuleMatcher;
pub use svm::{AnomalyScorer, Label};
