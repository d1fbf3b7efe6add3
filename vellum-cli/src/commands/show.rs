//! `vellum show <target>`: print a preserved object's tree and versions.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use vellum_core::slug::display_name;
use vellum_core::Container;

/// Arguments for `vellum show`.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Repository path of the preserved object.
    pub target: String,

    /// Version label (`v2`) or memento timestamp; HEAD when omitted.
    #[arg(long)]
    pub version: Option<String>,

    /// Emit the loaded object as JSON.
    #[arg(long)]
    pub json: bool,
}

impl ShowArgs {
    pub fn run(self) -> Result<()> {
        let (_home, engine) = super::engine()?;
        let object = engine
            .load(&self.target, self.version.as_deref())
            .with_context(|| format!("failed to load '{}'", self.target))?
            .with_context(|| format!("no preserved object at '{}'", self.target))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&object).context("failed to render object JSON")?
            );
            return Ok(());
        }

        let slug = vellum_core::slug::NameAndParent::split(&object.path).name;
        println!(
            "{} {}",
            "object:".bold(),
            display_name(object.name.as_deref().unwrap_or(slug), slug)
        );
        if let Some(version) = &object.version {
            println!("{} {}", "version:".bold(), version);
        }
        for version in &object.versions {
            let marker = if Some(version) == object.version.as_ref() { "*" } else { " " };
            println!("  {marker} {version}");
        }
        print_tree(&object.root, 0);
        Ok(())
    }
}

fn print_tree(container: &Container, depth: usize) {
    let indent = "  ".repeat(depth);
    for child in &container.containers {
        let slug = vellum_core::slug::NameAndParent::split(&child.path).name;
        println!("{indent}{}/", slug.blue());
        print_tree(child, depth + 1);
    }
    for binary in &container.binaries {
        let slug = vellum_core::slug::NameAndParent::split(&binary.path).name;
        println!(
            "{indent}{slug}  {} bytes  {}",
            binary.size,
            binary.digest.as_deref().unwrap_or("-").dimmed()
        );
    }
}
