//! `vellum submit <changeset.json>`: queue a changeset on the daemon.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use vellum_core::Changeset;
use vellum_daemon::{request_submit, DaemonError};

/// Arguments for `vellum submit`.
#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Changeset file produced by `vellum diff --out`, possibly hand-edited.
    pub changeset: PathBuf,
}

impl SubmitArgs {
    pub fn run(self) -> Result<()> {
        let home = vellum_core::home().context("could not determine home directory")?;
        let changeset = read_changeset(&self.changeset)?;

        match request_submit(&home, changeset) {
            Ok(handle) => {
                let job_id = handle["job_id"].as_str().unwrap_or_default();
                let status = handle["status"].as_str().unwrap_or_default();
                println!("{} job {} ({status})", "✓ submitted".green(), job_id.bold());
                println!("poll with `vellum job show {job_id}`");
                Ok(())
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                anyhow::bail!("daemon is not running; start it with `vellum daemon start` or use `vellum run`")
            }
            Err(err) => Err(err).context("submission rejected"),
        }
    }
}

pub(crate) fn read_changeset(path: &std::path::Path) -> Result<Changeset> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("{} is not a changeset", path.display()))
}
