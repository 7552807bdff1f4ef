use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tangle_core::config::{self, ProjectConfig};
use tangle_core::lock::WriterLock;
use tangle_core::{ReplayMode, ReplayStats, rebuild};

use super::{CheckoutArgs, fail, open_checkout};

#[derive(Args, Debug)]
pub struct ReplayArgs {
    #[command(flatten)]
    pub checkout: CheckoutArgs,

    /// Apply only operations whose transaction committed, whatever the
    /// project config says.
    #[arg(long)]
    pub committed_only: bool,
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    graph: String,
    branch: String,
    mode: ReplayMode,
    elapsed_ms: u128,
    stats: ReplayStats,
}

/// Execute `tg replay`: clear the checkout's stores and play its whole log.
///
/// # Errors
///
/// Returns an error if the project is not initialized, the writer lock is
/// not acquired in time, or replay aborts on a revision.
pub fn run_replay(
    args: &ReplayArgs,
    output: OutputMode,
    project_root: &Path,
    project: &ProjectConfig,
) -> Result<()> {
    let conn = open_checkout(output, project_root, &args.checkout)?;
    let mode = if args.committed_only {
        ReplayMode::CommittedOnly
    } else {
        project.replay.mode
    };

    let _lock = WriterLock::acquire(&config::lock_path(project_root), project.lock.timeout())
        .map_err(|e| fail(output, e))?;
    let start = Instant::now();
    let stats = rebuild(&conn, mode).map_err(|e| fail(output, e))?;

    let report = ReplayReport {
        graph: conn.graph().to_string(),
        branch: conn.branch().to_string(),
        mode,
        elapsed_ms: start.elapsed().as_millis(),
        stats,
    };
    render_mode(
        output,
        &report,
        |r, w| {
            writeln!(
                w,
                "played={} created={} merged={} unchanged={} deleted={} discarded={}",
                r.stats.played,
                r.stats.created,
                r.stats.merged,
                r.stats.unchanged,
                r.stats.deleted,
                r.stats.discarded
            )
        },
        |r, w| {
            pretty_section(w, &format!("Replayed {}/{}", r.graph, r.branch))?;
            pretty_kv(w, "Mode", format!("{:?}", r.mode))?;
            pretty_kv(w, "Played", r.stats.played.to_string())?;
            pretty_kv(w, "Created", r.stats.created.to_string())?;
            pretty_kv(w, "Merged", r.stats.merged.to_string())?;
            pretty_kv(w, "Unchanged", r.stats.unchanged.to_string())?;
            pretty_kv(w, "Deleted", r.stats.deleted.to_string())?;
            pretty_kv(
                w,
                "Repaired",
                format!("{} ({} still hanging)", r.stats.repaired, r.stats.still_hanging),
            )?;
            pretty_kv(w, "Properties", r.stats.properties_set.to_string())?;
            pretty_kv(w, "Imports", r.stats.imported.to_string())?;
            pretty_kv(w, "Discarded", r.stats.discarded.to_string())?;
            pretty_kv(w, "Elapsed", format!("{}ms", r.elapsed_ms))
        },
    )
}
