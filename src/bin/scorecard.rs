//! Scorecard CLI - Command-line interface for the scorecard engine
//!
//! Commands:
//! - grid: Render a week, month or quarter rollup grid from period rows
//! - health: Score every configured entity from board snapshots
//! - ack: Acknowledge a declining entity until local midnight
//! - validate: Validate period rows
//! - doctor: Diagnose configuration and input files
//! - init-config: Print a default configuration file

use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use scorecard_engine::config::Overrides;
use scorecard_engine::grid::RollupGrid;
use scorecard_engine::refresh::{EntityOutcome, RefreshReport};
use scorecard_engine::schema::RowAdapter;
use scorecard_engine::sources::{StaticBoardSource, StaticPeriodSource};
use scorecard_engine::types::Granularity;
use scorecard_engine::{Config, ScorecardError, ScorecardProcessor, ViewRequest, ENGINE_VERSION};

/// Scorecard - period rollups and composite health scores
#[derive(Parser)]
#[command(name = "scorecard")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Roll up weekly metrics and score entity health", long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a rollup grid from period rows
    Grid {
        /// Input file path (use - for stdin), JSON array or NDJSON
        #[arg(short, long)]
        input: PathBuf,

        /// View granularity
        #[arg(long, default_value = "week")]
        view: ViewArg,

        /// Period to render: 2026-10 for week/month views, 2026-Q4 for quarter views
        #[arg(long)]
        period: Option<String>,

        /// Reference time (defaults to local now)
        #[arg(long)]
        now: Option<String>,

        /// Append a month/quarter-to-date column
        #[arg(long)]
        to_date: bool,

        /// Number of week columns in week views
        #[arg(long)]
        week_slots: Option<usize>,

        /// Configuration file
        #[arg(short, long, env = "SCORECARD_CONFIG")]
        config: Option<PathBuf>,

        /// Output format (defaults to pretty JSON on a terminal)
        #[arg(long)]
        output_format: Option<OutputFormat>,
    },

    /// Score configured entities from board snapshots
    Health {
        /// Board snapshots file: JSON object of entity id to snapshot
        #[arg(short, long)]
        boards: PathBuf,

        /// Configuration file listing the entities
        #[arg(short, long, env = "SCORECARD_CONFIG")]
        config: PathBuf,

        /// Acknowledgments file
        #[arg(long)]
        acks: Option<PathBuf>,

        /// Bypass the cache for every entity
        #[arg(long)]
        force: bool,

        /// Reference time (defaults to local now)
        #[arg(long)]
        now: Option<String>,

        /// Per-entity fetch timeout in seconds
        #[arg(long)]
        fetch_timeout: Option<u64>,

        /// Output format (defaults to pretty JSON on a terminal)
        #[arg(long)]
        output_format: Option<OutputFormat>,
    },

    /// Acknowledge a declining entity until local midnight
    Ack {
        /// Entity id
        entity: String,

        /// Acknowledgments file, created when missing
        #[arg(long)]
        acks: PathBuf,

        /// Reference time (defaults to local now)
        #[arg(long)]
        now: Option<String>,
    },

    /// Validate period rows
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and input files
    Doctor {
        /// Configuration file to check
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Board snapshots file to check
        #[arg(long)]
        boards: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a default configuration file
    InitConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum ViewArg {
    Week,
    Month,
    Quarter,
}

impl From<ViewArg> for Granularity {
    fn from(view: ViewArg) -> Self {
        match view {
            ViewArg::Week => Granularity::Week,
            ViewArg::Month => Granularity::Month,
            ViewArg::Quarter => Granularity::Quarter,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// Plain text table
    Table,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };
    let filter = if verbose || quiet {
        EnvFilter::new(default)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    };

    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

async fn run(command: Commands) -> Result<(), ScorecardCliError> {
    match command {
        Commands::Grid {
            input,
            view,
            period,
            now,
            to_date,
            week_slots,
            config,
            output_format,
        } => {
            let overrides = Overrides {
                week_slots,
                to_date: to_date.then_some(true),
                ..Default::default()
            };
            cmd_grid(
                &input,
                view.into(),
                period.as_deref(),
                now.as_deref(),
                config.as_deref(),
                &overrides,
                output_format,
            )
            .await
        }

        Commands::Health {
            boards,
            config,
            acks,
            force,
            now,
            fetch_timeout,
            output_format,
        } => {
            let overrides = Overrides {
                fetch_timeout_seconds: fetch_timeout,
                ..Default::default()
            };
            cmd_health(
                &boards,
                &config,
                acks.as_deref(),
                force,
                now.as_deref(),
                &overrides,
                output_format,
            )
            .await
        }

        Commands::Ack { entity, acks, now } => cmd_ack(&entity, &acks, now.as_deref()),

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Doctor {
            config,
            boards,
            json,
        } => cmd_doctor(config.as_deref(), boards.as_deref(), json),

        Commands::InitConfig => {
            print!("{}", Config::default_toml());
            Ok(())
        }
    }
}

async fn cmd_grid(
    input: &Path,
    granularity: Granularity,
    period: Option<&str>,
    now: Option<&str>,
    config: Option<&Path>,
    overrides: &Overrides,
    output_format: Option<OutputFormat>,
) -> Result<(), ScorecardCliError> {
    let now = reference_time(now)?;
    let request = match period {
        Some(p) => ViewRequest::parse(granularity, p)?,
        None => ViewRequest::containing(granularity, now.date()),
    };

    let mut config = Config::load_or_default(config)?;
    config.merge(overrides);
    let processor = ScorecardProcessor::with_config(config)?;

    let source = StaticPeriodSource::parse(&read_input(input)?)?;
    info!(view = request.granularity.as_str(), "rendering grid");

    let grid = processor.grid_from_source(&source, request, now).await?;
    if grid.entities.is_empty() {
        return Err(ScorecardCliError::NoRows);
    }
    match resolve_format(output_format) {
        OutputFormat::Json => println!("{}", serde_json::to_string(&grid)?),
        OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(&grid)?),
        OutputFormat::Table => print!("{}", grid_table(&grid)),
    }
    Ok(())
}

async fn cmd_health(
    boards: &Path,
    config: &Path,
    acks: Option<&Path>,
    force: bool,
    now: Option<&str>,
    overrides: &Overrides,
    output_format: Option<OutputFormat>,
) -> Result<(), ScorecardCliError> {
    let now = reference_time(now)?;
    let mut config = Config::load(config)?;
    config.merge(overrides);
    if config.entities.is_empty() {
        return Err(ScorecardCliError::NoEntities);
    }

    let entities = config.entities.clone();
    let mut processor = ScorecardProcessor::with_config(config)?;
    if let Some(path) = acks.filter(|p| p.exists()) {
        processor.load_acknowledgments(&fs::read_to_string(path)?)?;
    }

    let source = StaticBoardSource::load(boards)?;
    let refresher = processor.refresher(Arc::new(source));
    let report = refresher
        .refresh_all(&entities, processor.acknowledgments(), now, force)
        .await;
    debug!(cycle_id = %report.cycle_id, "health report ready");

    match resolve_format(output_format) {
        OutputFormat::Json => println!("{}", serde_json::to_string(&report)?),
        OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print!("{}", health_table(&report)),
    }
    Ok(())
}

fn cmd_ack(entity: &str, acks: &Path, now: Option<&str>) -> Result<(), ScorecardCliError> {
    let now = reference_time(now)?;
    let mut processor = ScorecardProcessor::new();
    if acks.exists() {
        processor.load_acknowledgments(&fs::read_to_string(acks)?)?;
    }

    let expiry = processor.acknowledge(entity, now);
    fs::write(acks, processor.save_acknowledgments()?)?;
    println!("Acknowledged {} until {}", entity, expiry);
    Ok(())
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), ScorecardCliError> {
    let rows = RowAdapter::parse(&read_input(input)?)?;
    let results = RowAdapter::validate_rows(&rows);
    let dropped = results.iter().filter(|r| r.is_dropped()).count();

    let report = ValidationReport {
        total_rows: rows.len(),
        dropped_rows: dropped,
        rows_with_blanked_cells: results.len() - dropped,
        results,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total rows:     {}", report.total_rows);
        println!("Dropped rows:   {}", report.dropped_rows);
        println!("Blanked cells:  {}", report.rows_with_blanked_cells);

        if !report.results.is_empty() {
            println!("\nIssues:");
            for result in &report.results {
                for error in &result.errors {
                    println!(
                        "  - Row {} ({}): {}",
                        result.index,
                        result.period.as_deref().unwrap_or("unknown"),
                        error
                    );
                }
            }
        }
    }

    if report.dropped_rows > 0 {
        Err(ScorecardCliError::ValidationFailed(report.dropped_rows))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, boards: Option<&Path>, json: bool) -> Result<(), ScorecardCliError> {
    let mut checks = vec![DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Scorecard engine version {}", ENGINE_VERSION),
    }];

    if let Some(path) = config {
        checks.push(match Config::load(path).and_then(|c| c.registry().map(|r| (c, r))) {
            Ok((config, registry)) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "{} metrics, {} entities",
                    registry.len(),
                    config.entities.len()
                ),
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            },
        });
    }

    if let Some(path) = boards {
        checks.push(match StaticBoardSource::load(path) {
            Ok(_) => DoctorCheck {
                name: "boards".to_string(),
                status: CheckStatus::Ok,
                message: format!("{} is readable", path.display()),
            },
            Err(e) => DoctorCheck {
                name: "boards".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            },
        });
    }

    checks.push(DoctorCheck {
        name: "stdout".to_string(),
        status: CheckStatus::Ok,
        message: if atty::is(atty::Stream::Stdout) {
            "stdout is a TTY (pretty output)".to_string()
        } else {
            "stdout is a pipe (compact output)".to_string()
        },
    });

    let report = DoctorReport {
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Scorecard Doctor Report");
        println!("=======================");
        println!("Version: {}", report.version);
        for check in &report.checks {
            let mark = match check.status {
                CheckStatus::Ok => "ok",
                CheckStatus::Error => "error",
            };
            println!("  [{}] {}: {}", mark, check.name, check.message);
        }
    }

    if report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error))
    {
        Err(ScorecardCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn read_input(input: &Path) -> Result<String, ScorecardCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

/// Parse `--now`, or take the local wall clock.
fn reference_time(now: Option<&str>) -> Result<NaiveDateTime, ScorecardCliError> {
    let Some(raw) = now else {
        return Ok(chrono::Local::now().naive_local());
    };
    let raw = raw.trim();
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(parsed);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ScorecardCliError::InvalidArgument(format!("invalid --now value: {}", raw)))
}

fn resolve_format(requested: Option<OutputFormat>) -> OutputFormat {
    requested.unwrap_or_else(|| {
        if atty::is(atty::Stream::Stdout) {
            OutputFormat::JsonPretty
        } else {
            OutputFormat::Json
        }
    })
}

fn grid_table(grid: &RollupGrid) -> String {
    let mut out = format!("{}\n", grid.label);
    for entity in &grid.entities {
        out.push_str(&format!("\n[{}]\n", entity.entity_id));
        let name_width = entity
            .rows
            .iter()
            .map(|r| r.name.chars().count())
            .max()
            .unwrap_or(0)
            .max(6);

        out.push_str(&format!("{:<width$}", "Metric", width = name_width));
        for column in &entity.columns {
            let marker = if column.is_current { "*" } else { "" };
            out.push_str(&format!(" | {:>10}", format!("{}{}", column.label, marker)));
        }
        out.push('\n');

        for row in &entity.rows {
            out.push_str(&format!("{:<width$}", row.name, width = name_width));
            for cell in &row.cells {
                out.push_str(&format!(" | {:>10}", cell.formatted));
            }
            out.push('\n');
        }
    }
    out.push_str(&format!(
        "\nLatest finalized week: {} green, {} yellow, {} red\n",
        grid.summary.green, grid.summary.yellow, grid.summary.red
    ));
    out
}

fn health_table(report: &RefreshReport) -> String {
    let mut out = String::new();
    for outcome in &report.outcomes {
        match outcome {
            EntityOutcome::Scored {
                name,
                scored,
                presentation,
                ..
            } => out.push_str(&format!(
                "{:<20} {:>3}  {:<12} {:?}\n",
                name,
                scored.health.score,
                scored.health.state.as_str(),
                presentation
            )),
            EntityOutcome::Failed { name, error, .. } => {
                out.push_str(&format!("{:<20} ERR  {}\n", name, error))
            }
        }
    }
    let counts = &report.counts;
    out.push_str(&format!(
        "\n{} thriving, {} stable, {} declining, {} provisioning, {} errors\n",
        counts.thriving, counts.stable, counts.declining, counts.provisioning, counts.errors
    ));
    out
}

// Error types

#[derive(Debug)]
enum ScorecardCliError {
    Io(io::Error),
    Engine(ScorecardError),
    Json(serde_json::Error),
    InvalidArgument(String),
    NoRows,
    NoEntities,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for ScorecardCliError {
    fn from(e: io::Error) -> Self {
        ScorecardCliError::Io(e)
    }
}

impl From<ScorecardError> for ScorecardCliError {
    fn from(e: ScorecardError) -> Self {
        ScorecardCliError::Engine(e)
    }
}

impl From<serde_json::Error> for ScorecardCliError {
    fn from(e: serde_json::Error) -> Self {
        ScorecardCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ScorecardCliError> for CliError {
    fn from(e: ScorecardCliError) -> Self {
        match e {
            ScorecardCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ScorecardCliError::Engine(e) => {
                let (code, hint) = match &e {
                    ScorecardError::InvalidConfig(_)
                    | ScorecardError::InvalidThresholds { .. }
                    | ScorecardError::InvalidWeights(_)
                    | ScorecardError::Toml(_) => ("CONFIG_ERROR", "Run 'scorecard doctor --config <file>'"),
                    _ => ("PARSE_ERROR", "Run 'scorecard validate' for details"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            ScorecardCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            ScorecardCliError::InvalidArgument(msg) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message: msg,
                hint: Some("Use YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS".to_string()),
            },
            ScorecardCliError::NoRows => CliError {
                code: "NO_ROWS".to_string(),
                message: "No usable period rows found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            ScorecardCliError::NoEntities => CliError {
                code: "NO_ENTITIES".to_string(),
                message: "Configuration lists no entities".to_string(),
                hint: Some("Add [[entities]] tables to the configuration".to_string()),
            },
            ScorecardCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} rows would be dropped", count),
                hint: Some("Fix period and date columns and retry".to_string()),
            },
            ScorecardCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_rows: usize,
    dropped_rows: usize,
    rows_with_blanked_cells: usize,
    results: Vec<scorecard_engine::schema::ValidationResult>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Error,
}
