//! Momentum CLI - Command-line interface for Momentum Flux
//!
//! Commands:
//! - score: Score every video in a snapshot export and report drivers and lifecycle
//! - baseline: Build an account baseline table from a snapshot export
//! - doctor: Diagnose configuration and environment

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use momentum_flux::baseline::MAX_BASELINE_LOOKBACK_DAYS;
use momentum_flux::drivers::DriverPack;
use momentum_flux::lifecycle::LifecycleLineModel;
use momentum_flux::pipeline::{group_by_video, AnalyticsScoringService};
use momentum_flux::store::{BaselineStore, InMemoryStore};
use momentum_flux::types::{AccountOverallComputation, BaselineTable, HypeComputation, Snapshot};
use momentum_flux::{BaselineBuilder, ComputeError, ServiceConfig, MOMENTUM_VERSION, PRODUCER_NAME};

/// Momentum - On-device momentum scoring for short-form video analytics
#[derive(Parser)]
#[command(name = "momentum")]
#[command(version = MOMENTUM_VERSION)]
#[command(about = "Score short-form video momentum against account baselines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every video in a snapshot export
    Score {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Account the snapshots belong to
        #[arg(long)]
        account_id: String,

        /// Reference time (RFC 3339); defaults to the current time
        #[arg(long)]
        now: Option<String>,

        /// Service configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Use this baseline table instead of rebuilding one
        #[arg(long)]
        load_baseline: Option<PathBuf>,

        /// Save the baseline table used for scoring
        #[arg(long)]
        save_baseline: Option<PathBuf>,

        /// Score every snapshot in order instead of only the latest
        #[arg(long)]
        backfill: bool,

        /// Store export to resume from and write back to
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Build an account baseline table
    Baseline {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Account the snapshots belong to
        #[arg(long)]
        account_id: String,

        /// Reference time (RFC 3339); defaults to the current time
        #[arg(long)]
        now: Option<String>,

        /// Lookback window in days
        #[arg(long, default_value = "60")]
        lookback_days: i64,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Service configuration file to check
        #[arg(long)]
        config: Option<PathBuf>,

        /// Baseline table file to check
        #[arg(long)]
        baseline: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON snapshots
    Ndjson,
    /// JSON array of snapshots
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// One video report per line, followed by the account summary
    Ndjson,
    /// Single-line JSON document
    Json,
    /// Pretty-printed JSON document
    JsonPretty,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), MomentumCliError> {
    match cli.command {
        Commands::Score {
            input,
            output,
            input_format,
            output_format,
            account_id,
            now,
            config,
            load_baseline,
            save_baseline,
            backfill,
            store,
        } => {
            let options = ScoreOptions {
                account_id,
                now: parse_now(now.as_deref())?,
                config: config.as_deref(),
                load_baseline: load_baseline.as_deref(),
                save_baseline: save_baseline.as_deref(),
                backfill,
                store: store.as_deref(),
            };
            cmd_score(&input, &output, input_format, output_format, options).await
        }

        Commands::Baseline {
            input,
            output,
            input_format,
            account_id,
            now,
            lookback_days,
        } => cmd_baseline(
            &input,
            &output,
            input_format,
            &account_id,
            parse_now(now.as_deref())?,
            lookback_days,
        ),

        Commands::Doctor {
            config,
            baseline,
            json,
        } => cmd_doctor(config.as_deref(), baseline.as_deref(), json),
    }
}

struct ScoreOptions<'a> {
    account_id: String,
    now: DateTime<Utc>,
    config: Option<&'a Path>,
    load_baseline: Option<&'a Path>,
    save_baseline: Option<&'a Path>,
    backfill: bool,
    store: Option<&'a Path>,
}

async fn cmd_score(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    options: ScoreOptions<'_>,
) -> Result<(), MomentumCliError> {
    let snapshots = read_snapshots(input, input_format)?;
    let config = ServiceConfig::load(options.config)?;
    let account_id = options.account_id.as_str();
    let now = options.now;

    let store = match options.store {
        Some(path) if path.exists() => {
            let json = fs::read_to_string(path)?;
            Arc::new(InMemoryStore::import_json(&json).map_err(ComputeError::from)?)
        }
        _ => Arc::new(InMemoryStore::new()),
    };

    let video_ids: Vec<String> = group_by_video(snapshots.clone()).into_keys().collect();
    store
        .insert_snapshots(account_id, snapshots)
        .map_err(ComputeError::from)?;

    let service = AnalyticsScoringService::in_memory(store.clone(), config);

    let table = match options.load_baseline {
        Some(path) => {
            let table = BaselineTable::from_json(&fs::read_to_string(path)?)?;
            store.save_baseline(&table).await.map_err(ComputeError::from)?;
            table
        }
        None => service.rebuild_baseline(account_id, now).await?,
    };

    if let Some(path) = options.save_baseline {
        fs::write(path, table.to_json()?)?;
    }

    let mut videos = Vec::with_capacity(video_ids.len());
    for video_id in video_ids {
        let hype = if options.backfill {
            service
                .backfill_video(account_id, &video_id, now)
                .await?
                .pop()
        } else {
            service.refresh_hype_for_video(account_id, &video_id, now).await?
        };
        let Some(hype) = hype else {
            continue;
        };

        let drivers = service.driver_pack_for_video(account_id, &video_id, now).await?;
        let lifecycle = service.lifecycle_for_video(account_id, &video_id, now).await?;
        videos.push(VideoReport {
            video_id,
            hype,
            drivers,
            lifecycle,
        });
    }

    let overall = service.compute_overall_for_account(account_id, now).await?;

    if let Some(path) = options.store {
        fs::write(path, store.export_json().map_err(ComputeError::from)?)?;
    }

    let summary = AccountSummary {
        account_id: account_id.to_string(),
        generated_at: now,
        baseline_videos: table.video_count,
        overall,
    };
    write_output(output, &format_score_report(&videos, &summary, output_format)?)
}

fn cmd_baseline(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    account_id: &str,
    now: DateTime<Utc>,
    lookback_days: i64,
) -> Result<(), MomentumCliError> {
    if !(1..=MAX_BASELINE_LOOKBACK_DAYS).contains(&lookback_days) {
        return Err(MomentumCliError::ParseError(format!(
            "lookback-days must be between 1 and {MAX_BASELINE_LOOKBACK_DAYS}"
        )));
    }

    let snapshots = read_snapshots(input, input_format)?;
    let table = BaselineBuilder::new(lookback_days).build(
        account_id,
        group_by_video(snapshots).into_values(),
        now,
    );

    write_output(output, &(serde_json::to_string_pretty(&table)? + "\n"))
}

fn cmd_doctor(
    config: Option<&Path>,
    baseline: Option<&Path>,
    json: bool,
) -> Result<(), MomentumCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "momentum_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Momentum version {}", MOMENTUM_VERSION),
    });

    checks.push(match ServiceConfig::load(config) {
        Ok(loaded) => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "Config valid (baseline from {} videos over {} days, overall window {})",
                loaded.baseline_candidate_limit,
                loaded.baseline_lookback_days,
                loaded.overall_window
            ),
        },
        Err(e) => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    });

    if let Some(baseline_path) = baseline {
        checks.push(check_baseline_file(baseline_path));
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass --input to score a file)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (ready to read snapshots)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: MOMENTUM_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Momentum Doctor Report");
        println!("======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(MomentumCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_baseline_file(path: &Path) -> DoctorCheck {
    if !path.exists() {
        return DoctorCheck {
            name: "baseline".to_string(),
            status: CheckStatus::Warning,
            message: "Baseline file does not exist".to_string(),
        };
    }

    match fs::read_to_string(path) {
        Ok(content) => match BaselineTable::from_json(&content) {
            Ok(table) => {
                let populated = table.buckets().filter(|b| b.sample_size > 0).count();
                DoctorCheck {
                    name: "baseline".to_string(),
                    status: if populated == 0 { CheckStatus::Warning } else { CheckStatus::Ok },
                    message: format!(
                        "Baseline for {} built {} ({} videos, {} populated buckets)",
                        table.account_id, table.built_at, table.video_count, populated
                    ),
                }
            }
            Err(e) => DoctorCheck {
                name: "baseline".to_string(),
                status: CheckStatus::Error,
                message: format!("Invalid baseline JSON: {}", e),
            },
        },
        Err(e) => DoctorCheck {
            name: "baseline".to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot read baseline file: {}", e),
        },
    }
}

// Helper functions

fn parse_now(raw: Option<&str>) -> Result<DateTime<Utc>, MomentumCliError> {
    match raw {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| MomentumCliError::ParseError(format!("invalid --now '{}': {}", raw, e))),
        None => Ok(Utc::now()),
    }
}

fn read_snapshots(input: &Path, format: InputFormat) -> Result<Vec<Snapshot>, MomentumCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let snapshots: Vec<Snapshot> = match format {
        InputFormat::Ndjson => {
            let mut parsed = Vec::new();
            for (line_no, line) in input_data.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let snapshot: Snapshot = serde_json::from_str(line).map_err(|e| {
                    MomentumCliError::ParseError(format!("line {}: {}", line_no + 1, e))
                })?;
                parsed.push(snapshot);
            }
            parsed
        }
        InputFormat::Json => serde_json::from_str(&input_data)?,
    };

    if snapshots.is_empty() {
        return Err(MomentumCliError::NoSnapshots);
    }
    for snapshot in &snapshots {
        snapshot.validate()?;
    }
    Ok(snapshots)
}

fn format_score_report(
    videos: &[VideoReport],
    summary: &AccountSummary,
    format: OutputFormat,
) -> Result<String, MomentumCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for video in videos {
                lines.push(serde_json::to_string(video)?);
            }
            lines.push(serde_json::to_string(summary)?);
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(&ScoreReport { summary, videos })? + "\n"),
        OutputFormat::JsonPretty => {
            Ok(serde_json::to_string_pretty(&ScoreReport { summary, videos })? + "\n")
        }
    }
}

fn write_output(output: &Path, data: &str) -> Result<(), MomentumCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum MomentumCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoSnapshots,
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for MomentumCliError {
    fn from(e: io::Error) -> Self {
        MomentumCliError::Io(e)
    }
}

impl From<ComputeError> for MomentumCliError {
    fn from(e: ComputeError) -> Self {
        MomentumCliError::Compute(e)
    }
}

impl From<serde_json::Error> for MomentumCliError {
    fn from(e: serde_json::Error) -> Self {
        MomentumCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<MomentumCliError> for CliError {
    fn from(e: MomentumCliError) -> Self {
        match e {
            MomentumCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            MomentumCliError::Compute(ComputeError::InvalidSnapshot(msg)) => CliError {
                code: "INVALID_SNAPSHOT".to_string(),
                message: msg,
                hint: Some(
                    "Snapshots need a video_id and a timestamp after post_created_at".to_string(),
                ),
            },
            MomentumCliError::Compute(ComputeError::InvalidConfig(msg)) => CliError {
                code: "INVALID_CONFIG".to_string(),
                message: msg,
                hint: Some("Run 'momentum doctor --config <file>' for details".to_string()),
            },
            MomentumCliError::Compute(e) => CliError {
                code: "COMPUTE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            MomentumCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            MomentumCliError::NoSnapshots => CliError {
                code: "NO_SNAPSHOTS".to_string(),
                message: "No snapshots found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            MomentumCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            MomentumCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct VideoReport {
    video_id: String,
    hype: HypeComputation,
    #[serde(skip_serializing_if = "Option::is_none")]
    drivers: Option<DriverPack>,
    lifecycle: LifecycleLineModel,
}

#[derive(Serialize)]
struct AccountSummary {
    account_id: String,
    generated_at: DateTime<Utc>,
    baseline_videos: u32,
    overall: AccountOverallComputation,
}

#[derive(Serialize)]
struct ScoreReport<'a> {
    #[serde(flatten)]
    summary: &'a AccountSummary,
    videos: &'a [VideoReport],
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
