use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_error, render_mode};
use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::io::Read as _;
use std::path::Path;
use tangle_core::config::{self, ProjectConfig};
use tangle_core::error::ErrorCode;
use tangle_core::lock::WriterLock;
use tangle_core::{GraphOperation, LogPlayer, ReplayStats, submit_operations};

use super::{CheckoutArgs, fail, open_checkout};

#[derive(Args, Debug)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub checkout: CheckoutArgs,

    /// Play the new transaction into the entity store right away.
    #[arg(long)]
    pub play: bool,

    /// JSON file holding an array of operations, or `-` for stdin.
    #[arg(value_name = "FILE|-")]
    pub input: String,
}

#[derive(Debug, Serialize)]
struct SubmitReport {
    graph: String,
    branch: String,
    txn_id: String,
    operations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    played: Option<ReplayStats>,
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read operations from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {input}"))
    }
}

/// Parse an operation batch. Transaction markers are written by the
/// helper, never by callers.
fn parse_operations(raw: &str) -> std::result::Result<Vec<GraphOperation>, String> {
    let operations: Vec<GraphOperation> =
        serde_json::from_str(raw).map_err(|e| format!("invalid operation batch: {e}"))?;
    if let Some(marker) = operations.iter().find(|op| op.is_marker()) {
        return Err(format!(
            "`{}` markers cannot be submitted directly",
            marker.kind()
        ));
    }
    Ok(operations)
}

/// Execute `tg submit`.
///
/// # Errors
///
/// Returns an error if the input cannot be read or parsed, the writer lock
/// is not acquired in time, validation rejects the batch, or playing the
/// transaction fails.
pub fn run_submit(
    args: &SubmitArgs,
    output: OutputMode,
    project_root: &Path,
    project: &ProjectConfig,
) -> Result<()> {
    let conn = open_checkout(output, project_root, &args.checkout)?;
    let raw = read_input(&args.input)?;
    let operations = match parse_operations(&raw) {
        Ok(ops) => ops,
        Err(reason) => {
            let message = format!("{}: {reason}", ErrorCode::ValidationFailed.code());
            render_error(output, &CliError::coded(&message, ErrorCode::ValidationFailed))?;
            anyhow::bail!(message);
        }
    };
    let count = operations.len();

    let _lock = WriterLock::acquire(&config::lock_path(project_root), project.lock.timeout())
        .map_err(|e| fail(output, e))?;
    let txn_id = submit_operations(&conn, operations).map_err(|e| fail(output, e))?;
    let played = if args.play {
        let stats = LogPlayer::new(&conn)
            .with_mode(project.replay.mode)
            .play_transaction(&txn_id)
            .map_err(|e| fail(output, e))?;
        Some(stats)
    } else {
        None
    };

    let report = SubmitReport {
        graph: conn.graph().to_string(),
        branch: conn.branch().to_string(),
        txn_id: txn_id.to_string(),
        operations: count,
        played,
    };
    render_mode(
        output,
        &report,
        |r, w| {
            writeln!(w, "{}\t{}", r.txn_id, r.operations)?;
            if let Some(stats) = r.played {
                writeln!(w, "played {}", stats.played)?;
            }
            Ok(())
        },
        |r, w| {
            pretty_section(w, &format!("Submitted to {}/{}", r.graph, r.branch))?;
            pretty_kv(w, "Transaction", &r.txn_id)?;
            pretty_kv(w, "Operations", r.operations.to_string())?;
            if let Some(stats) = r.played {
                pretty_kv(
                    w,
                    "Played",
                    format!(
                        "{} ({} created, {} merged, {} unchanged)",
                        stats.played, stats.created, stats.merged, stats.unchanged
                    ),
                )?;
            }
            Ok(())
        },
    )
}
