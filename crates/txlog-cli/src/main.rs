// txlog CLI - failure detection over transactional log files

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::Level;
use txlog_core::{load_with, ColumnMapping, LogBatch, RawTable};
use txlog_detect::{write_report, DetectionConfig, DetectionResult, Detector, ModelStage, ReportFormat, Severity};

#[derive(Parser)]
#[command(name = "txlog")]
#[command(version = "0.1.0")]
#[command(about = "Detect failures in transactional log files", long_about = None)]
struct Cli {
    /// Detection config file (TOML)
    #[arg(short, long, global = true, env = "TXLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Input {
    /// CSV file with timestamp, level and message columns
    csv: PathBuf,

    #[arg(long, default_value = "timestamp")]
    timestamp_column: String,

    #[arg(long, default_value = "level")]
    level_column: String,

    #[arg(long, default_value = "message")]
    message_column: String,
}

impl Input {
    fn columns(&self) -> ColumnMapping {
        ColumnMapping {
            timestamp: self.timestamp_column.clone(),
            level: self.level_column.clone(),
            message: self.message_column.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run detection and list flagged records
    Analyze {
        #[command(flatten)]
        input: Input,

        /// Maximum flagged records to print
        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Also write a report to this file
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Report format (text, json)
        #[arg(short, long, default_value = "text")]
        format: ReportFormat,
    },

    /// Show summary statistics for a log file
    Dashboard {
        #[command(flatten)]
        input: Input,
    },

    /// Print a random sample of loaded records
    Sample {
        #[command(flatten)]
        input: Input,

        /// Number of records to sample
        #[arg(short = 'n', long, default_value = "100")]
        count: usize,
    },

    /// Write a failure report
    Export {
        #[command(flatten)]
        input: Input,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Report format (text, json)
        #[arg(short, long, default_value = "text")]
        format: ReportFormat,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let detector = match &cli.config {
        Some(path) => Detector::from_config_file(path)?,
        None => Detector::new(DetectionConfig::default())?,
    };

    match cli.command {
        Commands::Analyze {
            input,
            limit,
            report,
            format,
        } => {
            analyze(&detector, &input, limit, report.as_deref(), format)?;
        }
        Commands::Dashboard { input } => {
            dashboard(&detector, &input)?;
        }
        Commands::Sample { input, count } => {
            sample(&input, count)?;
        }
        Commands::Export { input, output, format } => {
            let batch = load_batch(&input)?;
            let result = detector.analyze(&batch)?;
            export(&detector, &batch, &result, &output, format)?;
        }
    }

    Ok(())
}

fn load_batch(input: &Input) -> Result<LogBatch, Box<dyn std::error::Error>> {
    let raw = RawTable::from_path(&input.csv)?;
    let batch = load_with(&raw, &input.columns())?;

    println!(
        "{} {} ({} records, {} rows dropped)",
        "Loaded:".dimmed(),
        input.csv.display(),
        batch.len().to_string().green(),
        batch.dropped_rows().to_string().yellow()
    );
    Ok(batch)
}

fn analyze(
    detector: &Detector,
    input: &Input,
    limit: usize,
    report: Option<&Path>,
    format: ReportFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n{}", "Failure Analysis".cyan().bold());
    println!("{}", "─".repeat(60).dimmed());

    let batch = load_batch(input)?;
    let result = detector.analyze(&batch)?;

    let stage = match result.model_stage {
        ModelStage::NotRun => "not run".to_string(),
        ModelStage::NoErrorRecords => "skipped (no error-level records)".to_string(),
        ModelStage::EmptyVocabulary => "skipped (no usable terms)".to_string(),
        ModelStage::Ran { scored, outliers } => format!("{} scored, {} outliers", scored, outliers),
    };
    println!("{} {}", "Anomaly model:".dimmed(), stage);

    if result.is_empty() {
        println!("\n{}", "No failures detected.".green());
    } else {
        println!(
            "{} {} ({} high, {} medium, {} low)",
            "Flagged:".dimmed(),
            result.len().to_string().red(),
            result.count_by_severity(Severity::High),
            result.count_by_severity(Severity::Medium),
            result.count_by_severity(Severity::Low)
        );
        println!("{}", detections_table(&result, limit));
        if result.len() > limit {
            println!("{} {} more not shown", "...".dimmed(), result.len() - limit);
        }
    }

    if let Some(path) = report {
        export(detector, &batch, &result, path, format)?;
    }

    Ok(())
}

fn detections_table(result: &DetectionResult, limit: usize) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Time", "Level", "Severity", "Flagged by", "Message"]);

    for d in result.iter().take(limit) {
        let severity = match d.severity {
            Severity::High => d.severity.to_string().red().bold().to_string(),
            Severity::Medium => d.severity.to_string().yellow().to_string(),
            Severity::Low => d.severity.to_string().normal().to_string(),
        };
        let sources: Vec<String> = d.flagged_by.iter().map(|s| s.to_string()).collect();

        table.add_row(vec![
            d.index.to_string(),
            d.record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            d.record.level.clone(),
            severity,
            sources.join(", "),
            truncate(&d.record.message, 60),
        ]);
    }
    table
}

fn dashboard(detector: &Detector, input: &Input) -> Result<(), Box<dyn std::error::Error>> {
    println!("\n{}", "Log Dashboard".cyan().bold());
    println!("{}", "─".repeat(60).dimmed());

    let batch = load_batch(input)?;
    let result = detector.analyze(&batch)?;
    let stats = detector.summarize(&batch, &result)?;

    println!("  {} {}", "Total records:".dimmed(), stats.total_records.to_string().green());
    println!(
        "  {} {} ({:.2}%)",
        "Flagged:".dimmed(),
        stats.error_count.to_string().red(),
        stats.error_percentage
    );
    match stats.period {
        Some(p) => println!(
            "  {} {} to {}",
            "Period:".dimmed(),
            p.start.format("%Y-%m-%d %H:%M"),
            p.end.format("%Y-%m-%d %H:%M")
        ),
        None => println!("  {} -", "Period:".dimmed()),
    }
    if let Some(p) = stats.flagged_period {
        println!(
            "  {} {} to {}",
            "Failures between:".dimmed(),
            p.start.format("%Y-%m-%d %H:%M"),
            p.end.format("%Y-%m-%d %H:%M")
        );
    }
    println!(
        "  {} {}",
        "Most frequent level:".dimmed(),
        stats.most_frequent_level.as_deref().unwrap_or("-").cyan()
    );

    // levels
    let mut levels = Table::new();
    levels.load_preset(UTF8_FULL);
    levels.set_header(vec!["Level", "Count"]);
    for l in &stats.level_counts {
        levels.add_row(vec![l.level.clone(), l.count.to_string()]);
    }
    println!("\n{}", "Level distribution".bold());
    println!("{levels}");

    // failure types
    let mut categories = Table::new();
    categories.load_preset(UTF8_FULL);
    categories.set_header(vec!["Type", "Count"]);
    for c in &stats.categories {
        categories.add_row(vec![c.name.clone(), c.count.to_string()]);
    }
    categories.add_row(vec!["Other".to_string(), stats.other.to_string()]);
    println!("\n{}", "Failure types".bold());
    println!("{categories}");

    println!("\n{}", "Records by hour".bold());
    let peak = stats.hourly.iter().copied().max().unwrap_or(0);
    for (hour, count) in stats.hourly.iter().enumerate() {
        let width = if peak == 0 { 0 } else { count * 40 / peak };
        println!("  {:02}h {:>5} {}", hour, count, "█".repeat(width).red());
    }

    if !stats.daily_trend.is_empty() {
        let mut trend = Table::new();
        trend.load_preset(UTF8_FULL);
        trend.set_header(vec!["Day", "Flagged", "Moving avg"]);
        for day in &stats.daily_trend {
            trend.add_row(vec![
                day.date.to_string(),
                day.count.to_string(),
                day.moving_average.map(|m| format!("{:.2}", m)).unwrap_or_else(|| "-".to_string()),
            ]);
        }
        println!("\n{}", "Daily trend".bold());
        println!("{trend}");
    }

    if !stats.top_messages.is_empty() {
        println!("\n{}", "Most frequent failures".bold());
        for (rank, m) in stats.top_messages.iter().enumerate() {
            println!("  {}. {} {}", rank + 1, format!("({}x)", m.count).yellow(), truncate(&m.message, 70));
        }
    }

    println!();
    Ok(())
}

fn sample(input: &Input, count: usize) -> Result<(), Box<dyn std::error::Error>> {
    let batch = load_batch(input)?;
    let amount = count.min(batch.len());

    let mut rng = rand::rng();
    let mut picked = rand::seq::index::sample(&mut rng, batch.len(), amount).into_vec();
    picked.sort_unstable();

    println!("\n{} {} of {}", "Sample:".cyan().bold(), amount, batch.len());
    println!("{}", "─".repeat(80).dimmed());
    for i in picked {
        let Some(r) = batch.get(i) else { continue };
        let level = match r.level.to_lowercase().as_str() {
            "error" => format!("[{}]", r.level).red().to_string(),
            "warn" | "warning" => format!("[{}]", r.level).yellow().to_string(),
            "info" => format!("[{}]", r.level).green().to_string(),
            _ => format!("[{}]", r.level),
        };
        println!(
            "{} {} {}",
            r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            level,
            r.message
        );
    }

    Ok(())
}

fn export(
    detector: &Detector,
    batch: &LogBatch,
    result: &DetectionResult,
    path: &Path,
    format: ReportFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let stats = detector.summarize(batch, result)?;
    let mut out = BufWriter::new(File::create(path)?);
    write_report(&mut out, batch, result, &stats, format)?;
    out.flush()?;

    println!(
        "\n{} Report with {} flagged records written to {}",
        "✓".green().bold(),
        result.len(),
        path.display()
    );
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}
