// txlog Log Simulator - writes synthetic transaction logs for testing
// fixture generator only, the detector never calls into this

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use clap::Parser;
use colored::Colorize;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ERROR_MESSAGES: [&str; 7] = [
    "Error processing credit card payment.",
    "Timeout on the payment gateway API.",
    "Discrepancy in transaction values detected.",
    "Failure validating customer bank details.",
    "Internal error in the payment system.",
    "Duplicate transaction identified in the system.",
    "Error calculating purchase total with discount applied.",
];

const INFO_MESSAGES: [&str; 4] = [
    "Payment processed successfully.",
    "Transaction completed without issues.",
    "Payment confirmation received.",
    "Order finalized successfully.",
];

#[derive(Parser)]
#[command(name = "txlog-simulate")]
#[command(about = "Generate a synthetic transaction log CSV for txlog testing")]
struct Args {
    /// Output CSV file
    #[arg(short, long, default_value = "logs.csv")]
    output: PathBuf,

    /// Number of log rows to generate
    #[arg(short = 'n', long, default_value = "30")]
    count: usize,

    /// Events CSV to take transaction timestamps from (event, timestamp in ms)
    #[arg(short, long)]
    events: Option<PathBuf>,

    /// First timestamp when no events file is given (YYYY-MM-DD HH:MM:SS, default now)
    #[arg(short, long)]
    start: Option<String>,

    /// Error rate percentage (0-100)
    #[arg(long, default_value = "30")]
    error_rate: u8,
}

#[derive(Debug, Deserialize)]
struct EventRow {
    timestamp: i64,
    event: String,
}

#[derive(Debug, Serialize)]
struct LogRow {
    timestamp: String,
    level: &'static str,
    message: &'static str,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    if args.error_rate > 100 {
        return Err(format!("error rate must be 0-100, got {}", args.error_rate).into());
    }

    let mut rng = rand::rng();

    let timestamps = match &args.events {
        Some(path) => transaction_times(path, args.count)?,
        None => {
            let start = match &args.start {
                Some(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")?.and_utc(),
                None => Utc::now(),
            };
            generated_times(start, args.count, &mut rng)
        }
    };

    let rows = generate_rows(&timestamps, args.error_rate, &mut rng);

    let mut writer = csv::Writer::from_path(&args.output)?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    let errors = rows.iter().filter(|r| r.level == "ERROR").count();
    println!(
        "{} {} rows ({} errors) written to {}",
        "✓".green().bold(),
        rows.len().to_string().cyan(),
        errors.to_string().red(),
        args.output.display()
    );
    for row in rows.iter().take(5) {
        println!("  {} - {} - {}", row.timestamp.dimmed(), row.level, row.message);
    }

    Ok(())
}

// first `limit` transaction events, in file order
fn transaction_times(path: &Path, limit: usize) -> Result<Vec<DateTime<Utc>>, Box<dyn std::error::Error>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut times = Vec::new();

    for row in reader.deserialize::<EventRow>() {
        if times.len() == limit {
            break;
        }
        let row = row?;
        if row.event != "transaction" {
            continue;
        }
        let ts = DateTime::from_timestamp_millis(row.timestamp)
            .ok_or_else(|| format!("timestamp out of range: {}", row.timestamp))?;
        times.push(ts);
    }

    tracing::info!(path = %path.display(), transactions = times.len(), "Read transaction events");
    Ok(times)
}

fn generated_times(start: DateTime<Utc>, count: usize, rng: &mut impl Rng) -> Vec<DateTime<Utc>> {
    let mut current = start;
    (0..count)
        .map(|_| {
            let ts = current;
            current += Duration::seconds(rng.random_range(5..900));
            ts
        })
        .collect()
}

fn generate_rows(timestamps: &[DateTime<Utc>], error_rate: u8, rng: &mut impl Rng) -> Vec<LogRow> {
    timestamps
        .iter()
        .map(|ts| {
            let (level, messages) = if rng.random_ratio(error_rate as u32, 100) {
                ("ERROR", &ERROR_MESSAGES[..])
            } else {
                ("INFO", &INFO_MESSAGES[..])
            };
            LogRow {
                timestamp: ts.format("%Y-%m-%d %H:%M:%S").to_string(),
                level,
                message: messages[rng.random_range(0..messages.len())],
            }
        })
        .collect()
}
