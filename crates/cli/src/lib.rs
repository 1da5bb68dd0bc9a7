pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use tierflow_core::config::LogFormat;

#[derive(Debug, Parser)]
#[command(
    name = "tierflow",
    about = "Tierflow operator CLI",
    long_about = "Operate Tierflow migrations, demo fixtures, config inspection, and smoke validation.",
    after_help = "Examples:\n  tierflow doctor --json\n  tierflow migrate\n  tierflow smoke"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset and verify it against its contract")]
    Seed,
    #[command(about = "Run an end-to-end approval round trip with per-check timing details")]
    Smoke,
    #[command(about = "Inspect effective configuration values")]
    Config,
    #[command(about = "Validate config and database connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Smoke => commands::smoke::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Best-effort subscriber setup. Commands print structured output on stdout;
/// tracing goes to stderr so the two never interleave.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("TIERFLOW_LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let format = std::env::var("TIERFLOW_LOG_FORMAT")
        .ok()
        .and_then(|value| value.parse::<LogFormat>().ok())
        .unwrap_or(LogFormat::Compact);

    let builder =
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    // A second init (e.g. in tests) is fine to ignore.
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
