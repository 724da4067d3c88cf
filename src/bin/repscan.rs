//! Repscan CLI - drive the repetition engine from recorded captures
//!
//! Commands:
//! - replay: Run an NDJSON stream of raw detector frames through a session
//! - exercises: List the built-in exercise catalogue
//! - validate: Validate a frame stream or a custom exercise config

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use repscan::config::ExerciseConfig;
use repscan::schema::RawFrame;
use repscan::transport::NullSink;
use repscan::{ExerciseRegistry, ExerciseSession, ENGINE_VERSION};

/// Repscan - repetition detection and scoring for pose-tracked exercises
#[derive(Parser)]
#[command(name = "repscan")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Count and score exercise repetitions from pose landmark streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run raw detector frames through a session (NDJSON in, NDJSON events out)
    Replay {
        /// Exercise id (see `repscan exercises`)
        #[arg(short, long)]
        exercise: String,

        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Custom exercise config JSON (overrides --exercise)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the session summary to this file (stderr by default)
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Hold duration in milliseconds
        #[arg(long)]
        hold_ms: Option<u64>,
    },

    /// List the built-in exercise catalogue
    Exercises {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate an NDJSON frame stream or a custom exercise config
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Treat the input as an exercise config instead of a frame stream
        #[arg(long)]
        config: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Replay {
            exercise,
            input,
            config,
            summary,
            hold_ms,
        } => cmd_replay(&exercise, &input, config.as_deref(), summary.as_deref(), hold_ms),
        Commands::Exercises { json } => cmd_exercises(json),
        Commands::Validate { input, config } => cmd_validate(&input, config),
    }
}

fn read_input(path: &Path) -> Result<String, CliError> {
    if path.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            eprintln!("reading frames from stdin (pipe NDJSON, one frame per line)...");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn cmd_replay(
    exercise: &str,
    input: &Path,
    config: Option<&Path>,
    summary_out: Option<&Path>,
    hold_ms: Option<u64>,
) -> Result<(), CliError> {
    let mut session = match config {
        Some(path) => {
            let json = fs::read_to_string(path)?;
            let config = ExerciseConfig::from_json(&json)?;
            ExerciseSession::start(config, Box::new(NullSink))?
        }
        None => ExerciseSession::start_builtin(exercise)?,
    };
    if let Some(hold) = hold_ms {
        session.set_hold_ms(hold);
    }

    let input_data = read_input(input)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for (line_no, line) in input_data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let event = session
            .on_raw_json(trimmed)
            .map_err(|e| CliError::Frame(line_no + 1, e.to_string()))?;
        writeln!(out, "{}", serde_json::to_string(&event)?)?;
    }

    let summary = session.end()?;
    let summary_json = serde_json::to_string_pretty(&summary)?;
    match summary_out {
        Some(path) => fs::write(path, summary_json)?,
        None => eprintln!("{summary_json}"),
    }

    Ok(())
}

fn cmd_exercises(json: bool) -> Result<(), CliError> {
    let registry = ExerciseRegistry::builtin();

    if json {
        let configs: Vec<&ExerciseConfig> = registry.iter().collect();
        println!("{}", serde_json::to_string_pretty(&configs)?);
    } else {
        println!("Built-in exercises ({}):", registry.len());
        for config in registry.iter() {
            println!(
                "  {:24} {}  (down {} / success {}, peak {}-{})",
                config.id,
                config.name,
                config.down_threshold,
                config.success_threshold,
                config.success_min,
                config.success_max
            );
        }
    }
    Ok(())
}

fn cmd_validate(input: &Path, as_config: bool) -> Result<(), CliError> {
    let input_data = read_input(input)?;

    if as_config {
        let config = ExerciseConfig::from_json(&input_data)?;
        println!("config ok: {} ({})", config.id, config.name);
        return Ok(());
    }

    let mut total = 0usize;
    let mut invalid = 0usize;
    for (line_no, line) in input_data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        total += 1;
        if let Err(e) = RawFrame::from_json(trimmed) {
            invalid += 1;
            eprintln!("line {}: {}", line_no + 1, e);
        }
    }

    println!("{} frames, {} invalid", total, invalid);
    if invalid > 0 {
        Err(CliError::ValidationFailed(invalid))
    } else {
        Ok(())
    }
}

#[derive(Debug)]
enum CliError {
    Io(io::Error),
    Engine(repscan::EngineError),
    Json(serde_json::Error),
    Frame(usize, String),
    ValidationFailed(usize),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Io(e) => write!(f, "{e}"),
            CliError::Engine(e) => write!(f, "{e}"),
            CliError::Json(e) => write!(f, "{e}"),
            CliError::Frame(line, msg) => write!(f, "frame at line {line}: {msg}"),
            CliError::ValidationFailed(count) => write!(f, "{count} frames failed validation"),
        }
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<repscan::EngineError> for CliError {
    fn from(e: repscan::EngineError) -> Self {
        CliError::Engine(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Json(e)
    }
}
