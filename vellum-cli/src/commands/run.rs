//! `vellum run`: diff (or load a changeset) and execute it in-process,
//! without the daemon.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use vellum_core::jobs::save_job_at;
use vellum_core::{JobRecord, JobStatus};

/// Arguments for `vellum run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Repository path of the preserved object.
    #[arg(required_unless_present = "changeset")]
    pub target: Option<String>,

    /// Staged deposit to diff against the object.
    #[arg(long, requires = "target", conflicts_with = "changeset")]
    pub source: Option<String>,

    /// Display name for a new object.
    #[arg(long, requires = "source")]
    pub name: Option<String>,

    /// Execute a changeset file instead of computing a fresh diff.
    #[arg(long)]
    pub changeset: Option<PathBuf>,

    /// Emit the finished job record as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let (home, engine) = super::engine()?;

        let changeset = match (&self.changeset, &self.target, &self.source) {
            (Some(path), _, _) => super::submit::read_changeset(path)?,
            (None, Some(target), Some(source)) => engine
                .generate_diff(target, source, self.name.as_deref())
                .with_context(|| format!("diff failed for '{target}'"))?,
            _ => anyhow::bail!("provide --source to diff, or --changeset to execute a file"),
        };
        engine
            .validate_for_submit(&changeset)
            .with_context(|| format!("changeset for '{}' rejected", changeset.object_path))?;

        let mut record = JobRecord::waiting(changeset);
        record.set_status(JobStatus::Running);
        save_job_at(&home, &record).context("failed to record job")?;
        engine.run_job(&mut record);
        save_job_at(&home, &record).context("failed to record job result")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&record).context("failed to render job JSON")?
            );
        } else {
            println!("job {} {}", record.id, record.status);
            super::print_results(&record.changeset);
        }

        if record.status == JobStatus::CompletedWithErrors {
            anyhow::bail!("job {} completed with errors", record.id);
        }
        Ok(())
    }
}
