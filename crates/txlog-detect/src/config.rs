//! Configuration parsing for the detection pipeline

use crate::error::DetectError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

// Main config structure, every field has a default so an empty file is valid
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    // level label that selects the records fed to the anomaly model
    pub error_level: String,

    // whole-word keywords of the rule matcher
    pub rule_keywords: Vec<String>,

    pub severity: SeverityConfig,

    pub features: FeatureConfig,

    pub model: ModelConfig,

    pub summary: SummaryConfig,

    // keyword groups of the category breakdown
    pub categories: Vec<CategoryConfig>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            error_level: txlog_core::ERROR_LEVEL.to_string(),
            rule_keywords: words(&[
                "error",
                "failure",
                "timeout",
                "duplicate",
                "invalid",
                "discrepancy",
                "exception",
            ]),
            severity: SeverityConfig::default(),
            features: FeatureConfig::default(),
            model: ModelConfig::default(),
            summary: SummaryConfig::default(),
            categories: vec![
                CategoryConfig::new("Payment", &["payment", "card", "bank"]),
                CategoryConfig::new("Timeout", &["timeout"]),
                CategoryConfig::new("Values", &["value", "discount", "total"]),
                CategoryConfig::new("Duplicate", &["duplicate"]),
                CategoryConfig::new("Connection", &["connection", "connect"]),
            ],
        }
    }
}

impl DetectionConfig {
    // reject values the solver or vectorizer cannot work with
    pub fn validate(&self) -> Result<(), DetectError> {
        if self.features.max_features == 0 {
            return Err(DetectError::InvalidModelParameter(
                "features.max_features must be at least 1".to_string(),
            ));
        }
        self.model.validate()
    }
}

// Keyword precedence for severity tiers, high is checked first
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SeverityConfig {
    pub high: Vec<String>,
    pub medium: Vec<String>,
}

impl Default for SeverityConfig {
    fn default() -> Self {
        Self {
            high: words(&["critical", "fatal"]),
            medium: words(&["error", "failure"]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    // upper bound on the vocabulary size
    pub max_features: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self { max_features: 1000 }
    }
}

// One-class boundary model parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    // expected outlier fraction, (0, 1]
    pub nu: f64,

    pub gamma: Gamma,

    // stopping tolerance of the solver
    pub tolerance: f64,

    // hard cap on solver iterations
    pub max_iterations: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            nu: 0.1,
            gamma: Gamma::Mode(GammaMode::Auto),
            tolerance: 1e-3,
            max_iterations: 10_000_000,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), DetectError> {
        if !(self.nu > 0.0 && self.nu <= 1.0) {
            return Err(DetectError::InvalidModelParameter(format!(
                "model.nu must be in (0, 1], got {}",
                self.nu
            )));
        }
        if let Gamma::Fixed(value) = self.gamma {
            if !(value > 0.0 && value.is_finite()) {
                return Err(DetectError::InvalidModelParameter(format!(
                    "model.gamma must be positive, got {}",
                    value
                )));
            }
        }
        if !(self.tolerance > 0.0) {
            return Err(DetectError::InvalidModelParameter(format!(
                "model.tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(DetectError::InvalidModelParameter(
                "model.max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// RBF kernel width: "auto", "scale" or a fixed number
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Gamma {
    Mode(GammaMode),
    Fixed(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GammaMode {
    Auto,  // 1 / n_features
    Scale, // 1 / (n_features * variance)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    // how many frequent messages to report
    pub top_messages: usize,

    // trailing window (days) of the moving average
    pub moving_average_window: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            top_messages: 5,
            moving_average_window: 7,
        }
    }
}

// a named keyword group, matched as case-insensitive substrings
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    pub keywords: Vec<String>,
}

impl CategoryConfig {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: words(keywords),
        }
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<DetectionConfig, DetectError> {
    let content = fs::read_to_string(path)?;
    let config: DetectionConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config() {
        let toml_content = r#"
error_level = "ERRO"
rule_keywords = ["erro", "falha", "timeout"]

[severity]
high = ["critico", "fatal"]
medium = ["erro", "falha"]

[features]
max_features = 200

[model]
nu = 0.2
gamma = "scale"

[summary]
top_messages = 3

[[categories]]
name = "Pagamento"
keywords = ["pagamento", "cartão"]
"#;
        let config: DetectionConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.error_level, "ERRO");
        assert_eq!(config.rule_keywords.len(), 3);
        assert_eq!(config.features.max_features, 200);
        assert_eq!(config.model.gamma, Gamma::Mode(GammaMode::Scale));
        assert_eq!(config.model.tolerance, 1e-3);
        assert_eq!(config.summary.top_messages, 3);
        assert_eq!(config.summary.moving_average_window, 7);
        assert_eq!(config.categories.len(), 1);
        assert_eq!(config.categories[0].name, "Pagamento");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: DetectionConfig = toml::from_str("").unwrap();
        assert_eq!(config.error_level, "ERROR");
        assert_eq!(config.rule_keywords.len(), 7);
        assert_eq!(config.severity.high, vec!["critical", "fatal"]);
        assert_eq!(config.model.nu, 0.1);
        assert_eq!(config.model.gamma, Gamma::Mode(GammaMode::Auto));
        assert_eq!(config.categories.len(), 5);
    }

    #[test]
    fn test_fixed_gamma() {
        let config: DetectionConfig = toml::from_str("[model]\ngamma = 0.5\n").unwrap();
        assert_eq!(config.model.gamma, Gamma::Fixed(0.5));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let config: DetectionConfig = toml::from_str("[model]\nnu = 0.0\n").unwrap();
        assert!(matches!(config.validate(), Err(DetectError::InvalidModelParameter(_))));

        let config: DetectionConfig = toml::from_str("[model]\nnu = 1.5\n").unwrap();
        assert!(config.validate().is_err());

        let config: DetectionConfig = toml::from_str("[model]\ngamma = -1.0\n").unwrap();
        assert!(config.validate().is_err());

        let config: DetectionConfig = toml::from_str("[features]\nmax_features = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detection.toml");
        fs::write(&path, "error_level = \"FATAL\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.error_level, "FATAL");

        assert!(matches!(load_config(dir.path().join("missing.toml")), Err(DetectError::Io(_))));
    }
}
