//! `vellum diff <target> --source <location>`: compute a changeset, read-only.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

/// Arguments for `vellum diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Repository path of the preserved object, e.g. `collection/ms-1`.
    pub target: String,

    /// Staged deposit (`s3://bucket/prefix/` or `file:///abs/path/`).
    #[arg(long)]
    pub source: String,

    /// Display name; required when the object does not exist yet.
    #[arg(long)]
    pub name: Option<String>,

    /// Write the changeset JSON to this file for review before `submit`.
    #[arg(long, short)]
    pub out: Option<PathBuf>,

    /// Print the changeset as JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let (_home, engine) = super::engine()?;
        let changeset = engine
            .generate_diff(&self.target, &self.source, self.name.as_deref())
            .with_context(|| format!("diff failed for '{}'", self.target))?;

        if let Some(out) = &self.out {
            let json = serde_json::to_string_pretty(&changeset).context("failed to encode changeset")?;
            std::fs::write(out, json).with_context(|| format!("write {}", out.display()))?;
        }

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&changeset).context("failed to render changeset JSON")?
            );
        } else {
            super::print_pending(&changeset);
            if let Some(out) = &self.out {
                println!("changeset written to {}", out.display());
            }
        }
        Ok(())
    }
}
