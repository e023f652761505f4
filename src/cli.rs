// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};

/// Command-line arguments for `trainer`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "trainer",
    version,
    about = "Run a chain of programs connected by pipes and supervise them until they exit.",
    long_about = None
)]
pub struct CliArgs {
    /// Argument forwarded verbatim to the first stage (usually a CSV path).
    #[arg(value_name = "INPUT")]
    pub input: String,

    /// Path to a pipeline description (TOML).
    ///
    /// Without it the built-in four-stage pipeline under `bin/` is used.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TRAINER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print the pipeline wiring, but don't spawn anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Exit non-zero if any stage failed or was killed.
    #[arg(long)]
    pub strict: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Parse the process arguments.
///
/// Usage errors print clap's message (which includes the usage line) to
/// stderr and exit with status 1. `--help` and `--version` keep clap's
/// behaviour.
pub fn parse() -> CliArgs {
    match CliArgs::try_parse() {
        Ok(args) => args,
        Err(err) => exit_with_usage(err),
    }
}

fn exit_with_usage(err: clap::Error) -> ! {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
        _ => {
            let _ = err.print();
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_positional_is_accepted() {
        let args = CliArgs::try_parse_from(["trainer", "data.csv"]).unwrap();
        assert_eq!(args.input, "data.csv");
        assert!(args.config.is_none());
        assert!(!args.strict);
    }

    #[test]
    fn two_positionals_are_rejected() {
        let err = CliArgs::try_parse_from(["trainer", "a.csv", "b.csv"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn missing_positional_is_rejected() {
        let err = CliArgs::try_parse_from(["trainer"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }
}
