//! Keyword rule matching over message text

use crate::error::DetectError;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;
use txlog_core::LogBatch;

/// A compiled, case-insensitive union of keywords.
///
/// `whole_word` sets use word boundaries (so "error" matches "Error" but not
/// "errors"), substring sets match anywhere in the text. An empty keyword list
/// never matches.
#[derive(Debug, Clone)]
pub struct KeywordSet {
    pattern: Option<Regex>,
}

impl KeywordSet {
    pub fn whole_word(keywords: &[String]) -> Result<Self, DetectError> {
        Self::build(keywords, true)
    }

    pub fn substring(keywords: &[String]) -> Result<Self, DetectError> {
        Self::build(keywords, false)
    }

    fn build(keywords: &[String], whole_word: bool) -> Result<Self, DetectError> {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();

        if alternatives.is_empty() {
            return Ok(Self { pattern: None });
        }

        let union = alternatives.join("|");
        let source = if whole_word {
            format!(r"\b(?:{})\b", union)
        } else {
            format!("(?:{})", union)
        };

        let pattern = RegexBuilder::new(&source).case_insensitive(true).build()?;
        Ok(Self { pattern: Some(pattern) })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.as_ref().is_some_and(|p| p.is_match(text))
    }
}

// Rule engine - flags every record whose message carries a failure keyword
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    keywords: KeywordSet,
}

impl RuleMatcher {
    pub fn new(keywords: &[String]) -> Result<Self, DetectError> {
        Ok(Self {
            keywords: KeywordSet::whole_word(keywords)?,
        })
    }

    pub fn matches(&self, message: &str) -> bool {
        self.keywords.is_match(message)
    }

    // indices of matching records, the level field is not consulted
    pub fn match_rules(&self, batch: &LogBatch) -> BTreeSet<usize> {
        batch
            .iter()
            .enumerate()
            .filter(|(_, record)| self.matches(&record.message))
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectionConfig;
    use chrono::Utc;
    use txlog_core::LogRecord;

    fn matcher() -> RuleMatcher {
        RuleMatcher::new(&DetectionConfig::default().rule_keywords).unwrap()
    }

    #[test]
    fn test_case_insensitive_whole_words() {
        let m = matcher();
        assert!(m.matches("Error while charging card"));
        assert!(m.matches("gateway TIMEOUT"));
        assert!(m.matches("NullPointer exception raised"));
        assert!(m.matches("Discrepancy in transaction values detected."));
        assert!(m.matches("invalid: card number"));
    }

    #[test]
    fn test_plural_and_embedded_forms_do_not_match() {
        let m = matcher();
        assert!(!m.matches("3 errors reported"));
        assert!(!m.matches("timeouts are configured"));
        assert!(!m.matches("NullPointerException"));
        assert!(!m.matches("Payment processed successfully."));
    }

    #[test]
    fn test_match_ignores_level() {
        let now = Utc::now();
        let batch = LogBatch::new(vec![
            LogRecord::new(now, "INFO", "Retry after timeout"),
            LogRecord::new(now, "ERROR", "All good"),
            LogRecord::new(now, "DEBUG", "duplicate order"),
        ]);
        let hits = matcher().match_rules(&batch);
        assert_eq!(hits.into_iter().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_match_rules_is_deterministic() {
        let now = Utc::now();
        let batch = LogBatch::new(
            (0..50)
                .map(|i| LogRecord::new(now, "INFO", if i % 7 == 0 { "failure" } else { "ok" }))
                .collect(),
        );
        let m = matcher();
        assert_eq!(m.match_rules(&batch), m.match_rules(&batch));
    }

    #[test]
    fn test_keywords_are_escaped() {
        let set = KeywordSet::whole_word(&["c++".to_string(), "".to_string()]).unwrap();
        assert!(!set.is_match("c"));
        let set = KeywordSet::substring(&["a.b".to_string()]).unwrap();
        assert!(set.is_match("xa.by"));
        assert!(!set.is_match("axb"));
    }

    #[test]
    fn test_unicode_keywords() {
        let set = KeywordSet::whole_word(&["discrepância".to_string(), "inválido".to_string()]).unwrap();
        assert!(set.is_match("Discrepância nos valores"));
        assert!(set.is_match("cartão INVÁLIDO"));
        assert!(!set.is_match("discrepâncias"));
    }

    #[test]
    fn test_empty_set_never_matches() {
        let set = KeywordSet::whole_word(&[]).unwrap();
        assert!(!set.is_match("error"));
        assert!(!set.is_match(""));
    }
}
