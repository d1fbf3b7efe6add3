//! `vellum container`: browse repository resources and create plain
//! containers above the preserved objects.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use vellum_core::slug::{display_name, NameAndParent};

#[derive(Subcommand, Debug)]
pub enum ContainerCommand {
    /// Describe any resource and list its direct children.
    Show(ShowArgs),
    /// Create a plain container; its parent must not be inside a preserved object.
    Create(CreateArgs),
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Repository path; the repository root when omitted.
    #[arg(default_value = "")]
    pub path: String,

    /// Emit the description as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Repository path of the new container.
    pub path: String,

    /// Display name; the last path segment when omitted.
    #[arg(long)]
    pub name: Option<String>,
}

pub fn run(command: ContainerCommand) -> Result<()> {
    let (_home, engine) = super::engine()?;
    match command {
        ContainerCommand::Show(args) => {
            let view = engine
                .browse(&args.path)
                .with_context(|| format!("failed to browse '{}'", args.path))?
                .with_context(|| format!("nothing at '{}'", args.path))?;
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&view).context("failed to render resource JSON")?
                );
                return Ok(());
            }
            let slug = NameAndParent::split(&view.path).name;
            let label = display_name(view.title.as_deref().unwrap_or(slug), slug);
            let kind = view
                .kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "resource".to_string());
            println!("{} {} [{}]", "resource:".bold(), label, kind.cyan());
            if let Some(size) = view.size {
                println!("{} {size} bytes", "size:".bold());
            }
            if let Some(digest) = &view.digest {
                println!("{} {}", "sha-256:".bold(), digest.dimmed());
            }
            for child in &view.children {
                println!("  {child}");
            }
            Ok(())
        }
        ContainerCommand::Create(args) => {
            let created = engine
                .create_container(&args.path, args.name.as_deref())
                .with_context(|| format!("failed to create container '{}'", args.path))?;
            println!("{} {created}", "✓ created container".green());
            Ok(())
        }
    }
}
