//! Stitch CLI: incremental compile and package for multi-module projects.
//!
//! Provides `stitch status` to show what each task would do, `stitch compile`
//! to bring compiled outputs up to date, `stitch package` to compile, package
//! and merge every module, and `stitch invalidate` / `stitch clean` to manage
//! stored baselines.

#![warn(missing_docs)]

mod clean;
mod compile;
mod invalidate;
mod package;
mod pipeline;
mod status;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stitch: incremental compile-and-package engine.
#[derive(Parser, Debug)]
#[command(name = "stitch", version, about = "Incremental compile and package")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `stitch.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show what each compile task would do, without compiling.
    Status(StatusArgs),
    /// Compile changed sources.
    Compile(ModuleArgs),
    /// Compile, package every module and merge the fragments.
    Package(ModuleArgs),
    /// Mark stored baselines as failed so the next run compiles fully.
    Invalidate(ModuleArgs),
    /// Delete every stored baseline.
    Clean,
}

/// Module selection shared by several commands.
#[derive(Parser, Debug)]
pub struct ModuleArgs {
    /// Only act on this module.
    #[arg(short, long)]
    pub module: Option<String>,
}

/// Arguments for the `stitch status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Only show this module.
    #[arg(short, long)]
    pub module: Option<String>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Status output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Status(ref args) => status::run(args, &global),
        Command::Compile(ref args) => compile::run(args, &global),
        Command::Package(ref args) => package::run(args, &global),
        Command::Invalidate(ref args) => invalidate::run(args, &global),
        Command::Clean => clean::run(&global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Default log filter when `RUST_LOG` is not set.
fn default_filter(quiet: bool, verbose: bool) -> &'static str {
    if quiet {
        "stitch=warn"
    } else if verbose {
        "stitch=debug"
    } else {
        "stitch=info"
    }
}

fn init_tracing(quiet: bool, verbose: bool) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(quiet, verbose).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_status_defaults() {
        let cli = Cli::parse_from(["stitch", "status"]);
        match cli.command {
            Command::Status(args) => {
                assert!(args.module.is_none());
                assert_eq!(args.format, ReportFormat::Text);
            }
            _ => panic!("expected Status command"),
        }
    }

    #[test]
    fn parse_status_json_for_module() {
        let cli = Cli::parse_from(["stitch", "status", "--module", "app", "--format", "json"]);
        match cli.command {
            Command::Status(args) => {
                assert_eq!(args.module.as_deref(), Some("app"));
                assert_eq!(args.format, ReportFormat::Json);
            }
            _ => panic!("expected Status command"),
        }
    }

    #[test]
    fn parse_compile_with_module() {
        let cli = Cli::parse_from(["stitch", "compile", "-m", "login"]);
        match cli.command {
            Command::Compile(args) => assert_eq!(args.module.as_deref(), Some("login")),
            _ => panic!("expected Compile command"),
        }
    }

    #[test]
    fn parse_package_and_clean() {
        let cli = Cli::parse_from(["stitch", "package"]);
        assert!(matches!(cli.command, Command::Package(ModuleArgs { module: None })));
        let cli = Cli::parse_from(["stitch", "clean"]);
        assert!(matches!(cli.command, Command::Clean));
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::parse_from(["stitch", "-q", "--config", "/work/stitch.toml", "invalidate"]);
        assert!(cli.quiet);
        assert!(!cli.verbose);
        assert_eq!(cli.config.as_deref(), Some("/work/stitch.toml"));
        assert!(matches!(cli.command, Command::Invalidate(_)));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["stitch", "compile", "--verbose"]);
        assert!(cli.verbose);
    }

    #[test]
    fn filter_follows_flags() {
        assert_eq!(default_filter(false, false), "stitch=info");
        assert_eq!(default_filter(false, true), "stitch=debug");
        assert_eq!(default_filter(true, true), "stitch=warn");
    }
}
