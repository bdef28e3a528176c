//! Calendar-based build versioning for CI.
//!
//! Derives a version from the calendar and git history and writes it into
//! every versionable artifact of a source tree:
//! - .NET projects, Directory.Build.props and AssemblyInfo files
//! - NuGet specs, package.json, Dockerfiles and compose files
//! - pyproject/setup files, go.mod, Cargo.toml, pom.xml and Helm charts
//!
//! Results are printed as TeamCity parameter lines on stdout; logs go to
//! stderr. Fatal conditions exit with a dedicated code.

use std::process;

use clap::{
    Parser,
    Subcommand,
};
use tracing::error;
use tracing_subscriber::EnvFilter;
use versioner::commands;
use versioner::commands::{
    CalendarArgs,
    DiscoverArgs,
    LabelArgs,
    RunArgs,
};
use versioner::error::exit_code_for;

#[derive(Parser, Debug)]
#[command(name = "versioner", version, about, arg_required_else_help = true)]
struct Cli {
    /// Log filter used when `RUST_LOG` is not set (e.g. `debug`,
    /// `versioner=trace`).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Version every artifact under a working folder
    #[command(name = "run")]
    Run(RunArgs),
    /// List the artifacts that would be versioned
    #[command(name = "discover")]
    Discover(DiscoverArgs),
    /// Print the build label of a folder
    #[command(name = "label")]
    Label(LabelArgs),
    /// Print the calendar windows of the current year
    #[command(name = "calendar")]
    Calendar(CalendarArgs),
}

fn main() {
    let cli = Cli::parse();

    // stdout carries CI parameter lines, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let result = match cli.command {
        Command::Run(args) => commands::run(args),
        Command::Discover(args) => commands::discover(args),
        Command::Label(args) => commands::label(args),
        Command::Calendar(args) => commands::calendar(args),
    };

    if let Err(e) = result {
        let code = exit_code_for(&e);
        error!(code, "{:#}", e);
        process::exit(code);
    }
}
