//! `vellum export <target> --to <location>`: copy a preserved object's
//! binaries out to a staging location.

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

/// Arguments for `vellum export`.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Repository path of the preserved object.
    pub target: String,

    /// Destination prefix (`s3://bucket/prefix/` or `file:///abs/path/`).
    #[arg(long)]
    pub to: String,

    /// Version label (`v2`) or memento timestamp; HEAD when omitted.
    #[arg(long)]
    pub version: Option<String>,

    /// Emit the copied file list as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct ExportRow {
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "size")]
    size: u64,
    #[tabled(rename = "destination")]
    destination: String,
}

impl ExportArgs {
    pub fn run(self) -> Result<()> {
        let (_home, engine) = super::engine()?;
        let files = engine
            .export(&self.target, self.version.as_deref(), &self.to)
            .with_context(|| format!("export failed for '{}'", self.target))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&files).context("failed to render export JSON")?
            );
            return Ok(());
        }

        let count = files.len();
        let rows: Vec<ExportRow> = files
            .into_iter()
            .map(|f| ExportRow {
                path: f.path,
                size: f.size,
                destination: f.destination,
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        println!("✓ exported {count} file(s) to {}", self.to);
        Ok(())
    }
}
