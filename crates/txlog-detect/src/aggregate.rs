//! Summary statistics over a batch and its detection result

use crate::config::{CategoryConfig, SummaryConfig};
use crate::error::DetectError;
use crate::fusion::DetectionResult;
use crate::rules::KeywordSet;
use chrono::{DateTime, Days, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use txlog_core::LogBatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCount {
    pub level: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
    // trailing mean, None until the window is full or when the series is too short
    pub moving_average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCount {
    pub message: String,
    pub count: usize,
}

/// Everything the report and dashboard render. Recomputed per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_records: usize,
    pub error_count: usize,
    pub error_percentage: f64,

    pub period: Option<TimeSpan>,         // whole batch
    pub flagged_period: Option<TimeSpan>, // flagged records only

    pub level_counts: Vec<LevelCount>,
    pub most_frequent_level: Option<String>,

    /// Overlapping keyword groups over the flagged messages. The population is
    /// the detection result, not every record whose level is `ERROR`: an
    /// error-level record neither detector flagged is not counted, and a
    /// flagged record of any level is.
    pub categories: Vec<CategoryCount>,
    /// Flagged count minus the category sum, over the same flagged population.
    /// Negative when groups overlap.
    pub other: i64,

    pub hourly: [usize; 24],
    pub daily_trend: Vec<DailyCount>,
    pub top_messages: Vec<MessageCount>,
}

impl SummaryStats {
    pub fn category(&self, name: &str) -> Option<usize> {
        self.categories.iter().find(|c| c.name == name).map(|c| c.count)
    }
}

#[derive(Debug, Clone)]
struct Category {
    name: String,
    keywords: KeywordSet,
}

// Aggregator - builds SummaryStats
#[derive(Debug, Clone)]
pub struct Aggregator {
    categories: Vec<Category>,
    top_messages: usize,
    window: usize,
}

impl Aggregator {
    pub fn new(categories: &[CategoryConfig], summary: &SummaryConfig) -> Result<Self, DetectError> {
        let categories = categories
            .iter()
            .map(|c| {
                Ok(Category {
                    name: c.name.clone(),
                    keywords: KeywordSet::substring(&c.keywords)?,
                })
            })
            .collect::<Result<Vec<_>, DetectError>>()?;

        Ok(Self {
            categories,
            top_messages: summary.top_messages,
            window: summary.moving_average_window.max(1),
        })
    }

    pub fn summarize(&self, batch: &LogBatch, result: &DetectionResult) -> Result<SummaryStats, DetectError> {
        result.ensure_batch(batch)?;

        let total_records = batch.len();
        let error_count = result.len();
        let error_percentage = if total_records > 0 {
            error_count as f64 / total_records as f64 * 100.0
        } else {
            0.0
        };

        let period = batch.time_bounds().map(|(start, end)| TimeSpan { start, end });
        let flagged_period = span(result.iter().map(|d| d.record.timestamp));

        let level_counts = count_in_order(batch.iter().map(|r| r.level.as_str()))
            .into_iter()
            .map(|(level, count)| LevelCount { level, count })
            .collect::<Vec<_>>();
        let most_frequent_level = level_counts.first().map(|l| l.level.clone());

        let categories: Vec<CategoryCount> = self
            .categories
            .iter()
            .map(|c| CategoryCount {
                name: c.name.clone(),
                count: result.iter().filter(|d| c.keywords.is_match(&d.record.message)).count(),
            })
            .collect();
        let categorized: usize = categories.iter().map(|c| c.count).sum();
        let other = error_count as i64 - categorized as i64;

        let mut hourly = [0usize; 24];
        for record in batch.iter() {
            hourly[record.timestamp.hour() as usize] += 1;
        }

        let top_messages = count_in_order(result.iter().map(|d| d.record.message.as_str()))
            .into_iter()
            .take(self.top_messages)
            .map(|(message, count)| MessageCount { message, count })
            .collect();

        Ok(SummaryStats {
            total_records,
            error_count,
            error_percentage,
            period,
            flagged_period,
            level_counts,
            most_frequent_level,
            categories,
            other,
            hourly,
            daily_trend: self.daily_trend(result),
            top_messages,
        })
    }

    // flagged records per calendar day (UTC), gap days included as zero
    fn daily_trend(&self, result: &DetectionResult) -> Vec<DailyCount> {
        let Some(flagged) = span(result.iter().map(|d| d.record.timestamp)) else {
            return Vec::new();
        };

        let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
        for d in result.iter() {
            *per_day.entry(d.record.timestamp.date_naive()).or_insert(0) += 1;
        }

        let mut series = Vec::new();
        let mut day = flagged.start.date_naive();
        let last = flagged.end.date_naive();
        while day <= last {
            series.push(DailyCount {
                date: day,
                count: per_day.get(&day).copied().unwrap_or(0),
                moving_average: None,
            });
            match day.checked_add_days(Days::new(1)) {
                Some(next) => day = next,
                None => break,
            }
        }

        if series.len() > self.window {
            for i in (self.window - 1)..series.len() {
                let sum: usize = series[i + 1 - self.window..=i].iter().map(|d| d.count).sum();
                series[i].moving_average = Some(sum as f64 / self.window as f64);
            }
        }

        series
    }
}

fn span(timestamps: impl Iterator<Item = DateTime<Utc>>) -> Option<TimeSpan> {
    timestamps.fold(None, |acc, ts| match acc {
        None => Some(TimeSpan { start: ts, end: ts }),
        Some(s) => Some(TimeSpan {
            start: s.start.min(ts),
            end: s.end.max(ts),
        }),
    })
}

// value counts, most frequent first, ties in order of first appearance
fn count_in_order<'a>(values: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut position: HashMap<&'a str, usize> = HashMap::new();
    for value in values {
        match position.get(value) {
            Some(&i) => counts[i].1 += 1,
            None => {
                position.insert(value, counts.len());
                counts.push((value.to_string(), 1));
            }
        }
    }
    // stable sort keeps first-appearance order among equal counts
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}
