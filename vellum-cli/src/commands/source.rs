//! `vellum source <location>`: list what a staged deposit holds, optionally
//! copying it somewhere that records checksums first.

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

/// Arguments for `vellum source`.
#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Staged location (`s3://bucket/prefix/` or `file:///abs/path/`).
    pub location: String,

    /// Copy the deposit here, recording checksums, and inspect the copy.
    #[arg(long)]
    pub copy_to: Option<String>,

    /// Emit the inspected tree as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct FileRow {
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "content type")]
    content_type: String,
    #[tabled(rename = "digest")]
    digest: String,
}

impl SourceArgs {
    pub fn run(self) -> Result<()> {
        let (_home, engine) = super::engine()?;
        let tree = match &self.copy_to {
            Some(destination) => engine
                .copy_source(&self.location, destination)
                .with_context(|| format!("failed to copy '{}' to '{destination}'", self.location))?,
            None => engine
                .inspect(&self.location, "")
                .with_context(|| format!("failed to inspect '{}'", self.location))?,
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&tree).context("failed to render source JSON")?
            );
            return Ok(());
        }

        let (containers, files) = (tree.containers.len(), tree.files.len());
        let rows: Vec<FileRow> = tree
            .files
            .into_iter()
            .map(|f| FileRow {
                path: f.path,
                content_type: f.content_type,
                digest: f.digest.map(|d| d.chars().take(12).collect()).unwrap_or_default(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        println!("{files} file(s) in {containers} container(s)");
        Ok(())
    }
}
