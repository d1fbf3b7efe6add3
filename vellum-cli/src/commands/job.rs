//! `vellum job`: inspect submitted jobs.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use vellum_core::jobs::{list_jobs_at, load_job_at};
use vellum_core::{JobId, JobRecord, JobStatus};
use vellum_daemon::{request_poll, DaemonError};

#[derive(Subcommand, Debug)]
pub enum JobCommand {
    /// Show one job: status, result lists and errors.
    Show(ShowArgs),
    /// List every job on record, oldest first.
    List {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub job_id: String,

    /// Emit the full job record as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct JobRow {
    #[tabled(rename = "job")]
    id: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "target")]
    target: String,
    #[tabled(rename = "submitted")]
    submitted: String,
    #[tabled(rename = "operations")]
    operations: usize,
    #[tabled(rename = "errors")]
    errors: usize,
}

pub fn run(command: JobCommand) -> Result<()> {
    let home = vellum_core::home().context("could not determine home directory")?;

    match command {
        JobCommand::Show(args) => {
            // The daemon owns the queue, but the records are plain files.
            let record = match request_poll(&home, &args.job_id) {
                Ok(record) => record,
                Err(DaemonError::DaemonNotRunning { .. }) => {
                    load_job_at(&home, &JobId::from(args.job_id.as_str()))
                        .with_context(|| format!("failed to load job '{}'", args.job_id))?
                }
                Err(err) => return Err(err).context("failed to poll job"),
            };
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&record).context("failed to render job JSON")?
                );
            } else {
                print_record(&record);
            }
        }
        JobCommand::List { json } => {
            let records = list_jobs_at(&home).context("failed to list jobs")?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&records).context("failed to render jobs JSON")?
                );
            } else if records.is_empty() {
                println!("No jobs submitted yet.");
            } else {
                let rows: Vec<JobRow> = records
                    .iter()
                    .map(|r| JobRow {
                        id: r.id.to_string(),
                        status: colored_status(r.status),
                        target: r.changeset.object_path.clone(),
                        submitted: r.submitted.format("%Y-%m-%d %H:%M:%S").to_string(),
                        operations: r.changeset.operation_count(),
                        errors: r.errors().len(),
                    })
                    .collect();
                let mut table = Table::new(rows);
                table.with(Style::rounded());
                println!("{table}");
            }
        }
    }
    Ok(())
}

fn print_record(record: &JobRecord) {
    println!("{} {}", "job:".bold(), record.id);
    println!("{} {}", "status:".bold(), colored_status(record.status));
    println!("{} {}", "target:".bold(), record.changeset.object_path);
    println!("{} {}", "source:".bold(), record.changeset.source);
    if record.status.is_terminal() {
        super::print_results(&record.changeset);
    } else {
        super::print_pending(&record.changeset);
    }
}

fn colored_status(status: JobStatus) -> String {
    match status {
        JobStatus::Waiting => status.to_string().yellow().to_string(),
        JobStatus::Running => status.to_string().cyan().to_string(),
        JobStatus::Completed => status.to_string().green().to_string(),
        JobStatus::CompletedWithErrors => status.to_string().red().to_string(),
    }
}
