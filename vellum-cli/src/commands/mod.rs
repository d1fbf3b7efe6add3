pub mod container;
pub mod daemon;
pub mod diff;
pub mod export;
pub mod job;
pub mod run;
pub mod show;
pub mod source;
pub mod submit;

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use vellum_core::{config, Changeset, Settings};
use vellum_sync::Engine;

/// Resolve home and settings once, then build the engine from them.
pub(crate) fn engine() -> Result<(PathBuf, Engine)> {
    let home = vellum_core::home().context("could not determine home directory")?;
    let settings: Settings = config::load_settings_at(&home)
        .with_context(|| format!("failed to load {}", config::settings_path_at(&home).display()))?;
    let engine = Engine::from_settings(&home, &settings).context("failed to configure engine")?;
    Ok((home, engine))
}

#[derive(Tabled)]
struct OperationRow {
    #[tabled(rename = "operation")]
    operation: String,
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "digest")]
    digest: String,
}

fn row(operation: &str, path: &str, name: &str, digest: Option<&str>) -> OperationRow {
    OperationRow {
        operation: operation.to_string(),
        path: path.to_string(),
        name: vellum_core::slug::display_name(name, vellum_core::slug::NameAndParent::split(path).name),
        digest: digest.map(|d| d.chars().take(12).collect()).unwrap_or_default(),
    }
}

/// Pending operations of a changeset, in execution order.
pub(crate) fn print_pending(changeset: &Changeset) {
    println!(
        "{} {}",
        "target:".bold(),
        match &changeset.object_name {
            Some(name) => format!("{} ({name})", changeset.object_path),
            None => changeset.object_path.clone(),
        }
    );
    println!(
        "{} {}",
        "against:".bold(),
        changeset
            .diff_version
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "new object".to_string())
    );

    if changeset.is_empty() {
        println!("{}", "no changes".green());
        return;
    }

    let mut rows = Vec::new();
    rows.extend(changeset.containers_to_add.iter().map(|c| row("add container", &c.path, &c.name, None)));
    rows.extend(changeset.files_to_add.iter().map(|f| row("add file", &f.path, &f.name, f.digest.as_deref())));
    rows.extend(changeset.files_to_patch.iter().map(|f| row("patch file", &f.path, &f.name, f.digest.as_deref())));
    rows.extend(changeset.files_to_delete.iter().map(|f| row("delete file", &f.path, &f.name, f.digest.as_deref())));
    rows.extend(changeset.containers_to_delete.iter().map(|c| row("delete container", &c.path, &c.name, None)));

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!("{} operation(s)", changeset.operation_count());
}

/// Result lists, new version and errors of an executed changeset.
pub(crate) fn print_results(changeset: &Changeset) {
    let mut rows = Vec::new();
    rows.extend(changeset.containers_added.iter().map(|c| row("added container", &c.path, &c.name, None)));
    rows.extend(changeset.files_added.iter().map(|f| row("added file", &f.path, &f.name, f.digest.as_deref())));
    rows.extend(changeset.files_patched.iter().map(|f| row("patched file", &f.path, &f.name, f.digest.as_deref())));
    rows.extend(changeset.files_deleted.iter().map(|f| row("deleted file", &f.path, &f.name, f.digest.as_deref())));
    rows.extend(changeset.containers_deleted.iter().map(|c| row("deleted container", &c.path, &c.name, None)));
    if !rows.is_empty() {
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    if let Some(version) = &changeset.new_version {
        println!("{} {}", "✓ new version".green(), version);
    }
    for error in &changeset.errors {
        println!("{} [{}] {}", "✗".red(), error.category, error.message);
    }
}
