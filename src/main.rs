//! apibind CLI - inspect binding plans and validation expressions

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::Value;
use thiserror::Error;

use apibind::{BindFailure, Expr, ExprError, FixSuggestion, Level, Plan, Schema, SchemaError};

#[derive(Parser)]
#[command(name = "apibind")]
#[command(about = "apibind - inspect HTTP binding plans")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and print the binding plan of a field schema
    Plan {
        /// Path to a YAML field schema
        file: PathBuf,

        /// Traversal level (overrides the schema's own)
        #[arg(short, long, value_enum)]
        level: Option<LevelArg>,
    },

    /// Evaluate a validation expression
    Eval {
        /// Expression, e.g. "$ > 0 && $ < 10"
        expr: String,

        /// Current value `$` as JSON
        #[arg(short, long, default_value = "null")]
        value: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LevelArg {
    OnlyFirst,
    FirstAndTagged,
    Any,
}

impl From<LevelArg> for Level {
    fn from(arg: LevelArg) -> Self {
        match arg {
            LevelArg::OnlyFirst => Level::OnlyFirst,
            LevelArg::FirstAndTagged => Level::FirstAndTagged,
            LevelArg::Any => Level::Any,
        }
    }
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Plan(#[from] BindFailure),

    #[error("CLI-001: invalid expression: {0}")]
    Expr(#[from] ExprError),

    #[error("CLI-002: --value is not valid JSON: {0}")]
    Value(#[from] serde_json::Error),
}

impl FixSuggestion for CliError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            CliError::Schema(e) => e.fix_suggestion(),
            CliError::Plan(e) => e.fix_suggestion(),
            CliError::Expr(_) => Some("Expressions use $, literals, comparisons, && || ! and len/regexp/in"),
            CliError::Value(_) => Some("Quote strings as JSON, e.g. --value '\"abc\"'"),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Plan { file, level } => print_plan(&file, level.map(Level::from)),
        Commands::Eval { expr, value } => eval(&expr, &value),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn print_plan(file: &Path, level: Option<Level>) -> Result<(), CliError> {
    let schema = Schema::load(file)?;
    let effective = level.or(schema.level).unwrap_or_default();
    let plan = schema.build_plan(Some(effective))?;

    println!(
        "{} Plan for '{}' (level: {})",
        "✓".green(),
        file.display(),
        effective.to_string().cyan()
    );
    print_descriptors(&plan);
    Ok(())
}

fn print_descriptors(plan: &Plan) {
    for d in plan.descriptors() {
        let required = if d.required() { " required" } else { "" };
        println!(
            "  {:<24} {:<14} name={}{}",
            d.selector(),
            d.source().as_str(),
            d.name(),
            required.yellow()
        );
    }
    let sources: Vec<&str> = plan.sources().iter().map(|s| s.as_str()).collect();
    println!("  Sources: {}", if sources.is_empty() { "-".to_string() } else { sources.join(", ") });
    println!(
        "  Validation: {}",
        if plan.has_validation() { "yes" } else { "no" }
    );
}

fn eval(source: &str, value: &str) -> Result<(), CliError> {
    let expr = Expr::compile(source)?;
    let current: Value = serde_json::from_str(value)?;
    println!("{}", expr.eval(&current));
    Ok(())
}
