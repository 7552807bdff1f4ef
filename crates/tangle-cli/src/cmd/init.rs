use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;
use tangle_core::config;
use tangle_core::db;

use super::fail;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite `.tangle/config.toml` even if the project already exists.
    /// The database and its revision log are kept.
    #[arg(long)]
    pub force: bool,
}

const CONFIG_TOML: &str = "[replay]\n\
    # as-logged | committed-only\n\
    mode = \"as-logged\"\n\
    \n\
    [federation]\n\
    policy = \"append-new-overwrite-existing\"\n\
    max_rounds = 64\n\
    round_deadline_ms = 5000\n\
    \n\
    [lock]\n\
    timeout_ms = 5000\n";

#[derive(Debug, Serialize)]
struct InitReport {
    project_dir: String,
    database: String,
    reinitialized: bool,
}

/// Execute `tg init`. Creates the project skeleton:
///
/// ```text
/// .tangle/
///   config.toml   (default project config)
///   tangle.db     (empty, migrated database)
/// ```
///
/// # Errors
///
/// Returns an error if `.tangle/` already exists and `--force` is not set,
/// or if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project_dir = config::project_dir(project_root);
    let existed = project_dir.exists();
    if existed && !args.force {
        anyhow::bail!(".tangle/ already exists. Use `tg init --force` to reinitialize.");
    }

    std::fs::create_dir_all(&project_dir)
        .with_context(|| format!("Failed to create {}", project_dir.display()))?;

    let config_path = project_dir.join("config.toml");
    std::fs::write(&config_path, CONFIG_TOML)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    let db_path = config::database_path(project_root);
    db::open_database(&db_path).map_err(|e| fail(output, e))?;
    tracing::info!(path = %db_path.display(), "project initialized");

    let report = InitReport {
        project_dir: project_dir.display().to_string(),
        database: db_path.display().to_string(),
        reinitialized: existed,
    };
    render_mode(
        output,
        &report,
        |r, w| writeln!(w, "initialized {}", r.project_dir),
        |r, w| {
            pretty_section(w, "Initialized tangle project")?;
            pretty_kv(w, "Directory", &r.project_dir)?;
            pretty_kv(w, "Database", &r.database)
        },
    )
}
