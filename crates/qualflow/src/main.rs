//! Qualflow command-line interface
//!
//! Loads a checker declaration and a lowered program from JSON, runs the
//! analysis and reports diagnostics. Exits with status 1 when any unit fails
//! or reports a diagnostic.

mod report;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use qualflow_analysis::{BatchAnalyzer, BatchConfig, LatticeVerifier};
use qualflow_core::dataflow::build_cfg;
use qualflow_core::hir::HirProgram;
use qualflow_core::qualifiers::Checker;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qualflow")]
#[command(about = "Flow-sensitive type-qualifier checker")]
#[command(version)]
struct Cli {
    /// Raise log output to debug (-v) or trace (-vv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze every unit of a program
    Check {
        /// Checker declaration (JSON)
        #[arg(long)]
        checker: PathBuf,
        /// Lowered program (JSON)
        #[arg(long)]
        program: PathBuf,
        /// Batch and solver settings (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
        /// Analyze units one after another
        #[arg(long)]
        sequential: bool,
    },
    /// Print the control flow graph of one unit
    Cfg {
        #[arg(long)]
        program: PathBuf,
        #[arg(long)]
        unit: String,
    },
    /// Check the lattice laws of a checker's hierarchy
    Verify {
        #[arg(long)]
        checker: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_checker(path: &Path) -> Result<Checker> {
    Checker::from_file(path).with_context(|| format!("loading checker {}", path.display()))
}

fn load_program(path: &Path) -> Result<HirProgram> {
    HirProgram::from_file(path).with_context(|| format!("loading program {}", path.display()))
}

fn exit_code(findings: bool) -> ExitCode {
    if findings {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn check(
    checker: &Path,
    program: &Path,
    config: Option<&Path>,
    format: Format,
    sequential: bool,
) -> Result<ExitCode> {
    let checker = load_checker(checker)?;
    let program = load_program(program)?;
    let mut config = match config {
        Some(path) => BatchConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))?,
        None => BatchConfig::default(),
    };
    if sequential {
        config.parallel = false;
    }
    debug!(units = program.units.len(), parallel = config.parallel, "checking program");

    let report = BatchAnalyzer::new(config).run(&checker, &program.units);
    match format {
        Format::Text => print!("{}", report::render_batch(&report)?),
        Format::Json => println!("{}", serde_json::to_string_pretty(&report.summary())?),
    }
    Ok(exit_code(report.has_findings()))
}

fn dump_cfg(program: &Path, unit: &str) -> Result<ExitCode> {
    let program = load_program(program)?;
    let Some(unit) = program.unit(unit) else {
        bail!("program has no unit named `{unit}`");
    };
    let cfg = build_cfg(unit).with_context(|| format!("building the graph of `{}`", unit.name))?;
    print!("{cfg}");
    Ok(ExitCode::SUCCESS)
}

fn verify(checker: &Path, format: Format) -> Result<ExitCode> {
    let checker = load_checker(checker)?;
    let results = LatticeVerifier::new().verify(checker.hierarchy());
    match format {
        Format::Text => print!("{}", report::render_verification(checker.name(), &results)?),
        Format::Json => println!("{}", serde_json::to_string_pretty(&results)?),
    }
    Ok(exit_code(results.iter().any(|r| r.is_violated())))
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Check {
            checker,
            program,
            config,
            format,
            sequential,
        } => check(&checker, &program, config.as_deref(), format, sequential),
        Commands::Cfg { program, unit } => dump_cfg(&program, &unit),
        Commands::Verify { checker, format } => verify(&checker, format),
    }
}
