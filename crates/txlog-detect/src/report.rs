//! Report export and re-parsing
//!
//! Text reports list every flagged record on one line, in batch order:
//!
//! ```text
//! [2024-02-08T10:31:00Z] ERROR: Timeout on the payment gateway API. {severity=Low; flagged_by=rule,model}
//! ```
//!
//! Backslashes and line breaks inside the message are escaped, and `:` inside
//! the level, so every line parses back to the same tuple.

use crate::aggregate::SummaryStats;
use crate::error::DetectError;
use crate::fusion::{format_sources, DetectionResult, Severity, Source};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::str::FromStr;
use txlog_core::LogBatch;
use uuid::Uuid;

const RULE: &str = "========================================";
const TAG_OPEN: &str = " {severity=";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("unknown report format {:?}", other)),
        }
    }
}

/// One flagged record as it appears in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    pub severity: Severity,
    pub flagged_by: BTreeSet<Source>,
}

impl ReportEntry {
    pub fn from_result(result: &DetectionResult) -> Vec<Self> {
        result
            .iter()
            .map(|d| ReportEntry {
                timestamp: d.record.timestamp,
                level: d.record.level.clone(),
                message: d.record.message.clone(),
                severity: d.severity,
                flagged_by: d.flagged_by.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonReport {
    generated_at: DateTime<Utc>,
    batch_id: Uuid,
    summary: SummaryStats,
    detections: Vec<ReportEntry>,
}

/// Write a report for `result` to `out`.
pub fn write_report<W: Write>(
    out: &mut W,
    batch: &LogBatch,
    result: &DetectionResult,
    stats: &SummaryStats,
    format: ReportFormat,
) -> Result<(), DetectError> {
    result.ensure_batch(batch)?;
    let generated_at = Utc::now();

    match format {
        ReportFormat::Json => {
            let report = JsonReport {
                generated_at,
                batch_id: batch.id(),
                summary: stats.clone(),
                detections: ReportEntry::from_result(result),
            };
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        }
        ReportFormat::Text => write_text(out, result, stats, generated_at)?,
    }
    Ok(())
}

fn write_text<W: Write>(
    out: &mut W,
    result: &DetectionResult,
    stats: &SummaryStats,
    generated_at: DateTime<Utc>,
) -> Result<(), DetectError> {
    writeln!(out, "LOG ANALYSIS REPORT")?;
    writeln!(out, "{}", RULE)?;
    writeln!(out)?;
    writeln!(out, "Analysis date: {}", generated_at.format("%d/%m/%Y %H:%M:%S"))?;
    writeln!(out, "Total records analysed: {}", stats.total_records)?;
    match stats.period {
        Some(p) => writeln!(out, "Period covered: {} to {}", p.start, p.end)?,
        None => writeln!(out, "Period covered: -")?,
    }
    writeln!(
        out,
        "Flagged: {} ({:.2}% of total)",
        stats.error_count, stats.error_percentage
    )?;
    match stats.flagged_period {
        Some(p) => writeln!(out, "Flagged period: {} to {}", p.start, p.end)?,
        None => writeln!(out, "Flagged period: -")?,
    }
    writeln!(out)?;

    writeln!(out, "Level distribution:")?;
    for l in &stats.level_counts {
        writeln!(out, "  {}: {}", escape(&l.level, true), l.count)?;
    }
    writeln!(
        out,
        "Most frequent level: {}",
        stats.most_frequent_level.as_deref().map(|l| escape(l, false)).unwrap_or_else(|| "-".to_string())
    )?;
    writeln!(out)?;

    writeln!(out, "Records by hour:")?;
    for (hour, count) in stats.hourly.iter().enumerate() {
        writeln!(out, "  {:02}h: {}", hour, count)?;
    }
    writeln!(out)?;

    if result.is_empty() {
        writeln!(out, "NO FAILURES DETECTED")?;
        return Ok(());
    }

    writeln!(out, "Daily flagged records (moving average):")?;
    for day in &stats.daily_trend {
        match day.moving_average {
            Some(avg) => writeln!(out, "  {}: {} ({:.2})", day.date, day.count, avg)?,
            None => writeln!(out, "  {}: {} (-)", day.date, day.count)?,
        }
    }
    writeln!(out)?;

    writeln!(out, "Breakdown by type:")?;
    for category in &stats.categories {
        writeln!(out, "  {}: {}", category.name, category.count)?;
    }
    writeln!(out, "  Other: {}", stats.other)?;
    writeln!(out)?;

    writeln!(out, "Most frequent:")?;
    for (rank, m) in stats.top_messages.iter().enumerate() {
        writeln!(out, "  {}. ({}x) {}", rank + 1, m.count, escape(&m.message, false))?;
    }
    writeln!(out)?;

    writeln!(out, "FLAGGED RECORDS: {}", result.len())?;
    writeln!(out, "{}", RULE)?;
    writeln!(out)?;
    for d in result.iter() {
        writeln!(
            out,
            "[{}] {}: {}{}{}; flagged_by={}}}",
            d.record.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            escape(&d.record.level, true),
            escape(&d.record.message, false),
            TAG_OPEN,
            d.severity,
            format_sources(&d.flagged_by),
        )?;
    }
    Ok(())
}

/// Parse the flagged records back out of a report written by [`write_report`].
pub fn parse_report<R: BufRead>(input: R, format: ReportFormat) -> Result<Vec<ReportEntry>, DetectError> {
    match format {
        ReportFormat::Json => {
            let report: JsonReport = serde_json::from_reader(input)?;
            Ok(report.detections)
        }
        ReportFormat::Text => {
            let mut entries = Vec::new();
            for (n, line) in input.lines().enumerate() {
                let line = line?;
                // only record lines start with a bracket
                if line.starts_with('[') {
                    entries.push(parse_line(&line).map_err(|reason| DetectError::MalformedReport {
                        line: n + 1,
                        reason,
                    })?);
                }
            }
            Ok(entries)
        }
    }
}

fn parse_line(line: &str) -> Result<ReportEntry, String> {
    let rest = &line[1..];
    let (ts, rest) = rest.split_once("] ").ok_or("missing timestamp bracket")?;
    let timestamp = DateTime::parse_from_rfc3339(ts)
        .map_err(|e| format!("bad timestamp {:?}: {}", ts, e))?
        .with_timezone(&Utc);

    let tag_at = rest.rfind(TAG_OPEN).ok_or("missing severity tag")?;
    let (body, tag) = rest.split_at(tag_at);
    let tag = tag[TAG_OPEN.len()..]
        .strip_suffix('}')
        .ok_or("unterminated severity tag")?;
    let (severity, sources) = tag.split_once("; flagged_by=").ok_or("missing flagged_by")?;
    let severity = severity.parse::<Severity>()?;
    let flagged_by = sources
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::parse::<Source>)
        .collect::<Result<BTreeSet<_>, _>>()?;

    let split = find_level_end(body).ok_or("missing level separator")?;
    let level = unescape(&body[..split])?;
    let message = unescape(&body[split + 2..])?;

    Ok(ReportEntry {
        timestamp,
        level,
        message,
        severity,
        flagged_by,
    })
}

// byte offset of the first unescaped ": "
fn find_level_end(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b':' if bytes[i + 1] == b' ' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn escape(text: &str, colon: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' if colon => out.push_str("\\:"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> Result<String, String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(':') => out.push(':'),
            other => return Err(format!("bad escape sequence \\{}", other.map(String::from).unwrap_or_default())),
        }
    }
    Ok(out)
}
