//! Vellum: diff-based preservation of staged deposits into a repository.
//!
//! # Usage
//!
//! ```text
//! vellum diff <target> --source <location> [--name <name>] [--out <file>] [--json]
//! vellum submit <changeset.json>
//! vellum job show <job-id> [--json]
//! vellum job list [--json]
//! vellum run <target> --source <location> [--name <name>] | vellum run --changeset <file>
//! vellum show <target> [--version <label|memento>] [--json]
//! vellum export <target> --to <location> [--version <label|memento>] [--json]
//! vellum source <location> [--copy-to <location>] [--json]
//! vellum container show [<path>] [--json] | vellum container create <path> [--name <name>]
//! vellum daemon start|stop|status
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    container::ContainerCommand, daemon::DaemonCommand, diff::DiffArgs, export::ExportArgs,
    job::JobCommand, run::RunArgs, show::ShowArgs, source::SourceArgs, submit::SubmitArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "vellum",
    version,
    about = "Synchronize staged deposits into preserved repository objects",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute the changeset that would bring an object in line with a deposit.
    Diff(DiffArgs),

    /// Queue a changeset file on the running daemon.
    Submit(SubmitArgs),

    /// Inspect submitted jobs.
    Job {
        #[command(subcommand)]
        command: JobCommand,
    },

    /// Diff and execute in this process, without the daemon.
    Run(RunArgs),

    /// Print a preserved object's tree and version history.
    Show(ShowArgs),

    /// Copy a preserved object's binaries to a staging location.
    Export(ExportArgs),

    /// List the files a staged deposit holds.
    Source(SourceArgs),

    /// Browse repository resources or create a plain container.
    Container {
        #[command(subcommand)]
        command: ContainerCommand,
    },

    /// Manage the background job daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Diff(args) => args.run(),
        Commands::Submit(args) => args.run(),
        Commands::Job { command } => commands::job::run(command),
        Commands::Run(args) => args.run(),
        Commands::Show(args) => args.run(),
        Commands::Export(args) => args.run(),
        Commands::Source(args) => args.run(),
        Commands::Container { command } => commands::container::run(command),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
