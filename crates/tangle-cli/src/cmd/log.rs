use crate::output::{OutputMode, pretty_section, render_mode};
use anyhow::Result;
use clap::Args;
use std::path::Path;
use tangle_core::config::{self, ProjectConfig};
use tangle_core::lock::ReaderLock;
use tangle_core::{GraphOperation, RevisionItem, TxnId};

use super::{CheckoutArgs, fail, open_checkout};

#[derive(Args, Debug)]
pub struct LogArgs {
    #[command(flatten)]
    pub checkout: CheckoutArgs,

    /// Only show the items of this transaction, in sequence order.
    #[arg(long)]
    pub txn: Option<String>,
}

/// Short description of what an item targets.
fn subject(operation: &GraphOperation) -> String {
    match operation {
        GraphOperation::NodeModification(op) => format!("{} [{:?}]", op.node.keys, op.merge_policy),
        GraphOperation::EdgeModification(op) => format!(
            "{} {} -> {} [{:?}]",
            op.edge.keys, op.edge.from, op.edge.to, op.merge_policy
        ),
        GraphOperation::DeleteByUid { kind, uid } => format!("{kind} {uid}"),
        GraphOperation::FixHangingEdge(op) => op.edge_uid.clone(),
        GraphOperation::SetNamedProperty {
            entity_type,
            name,
            property,
            value,
        } => format!("{entity_type}/{name}.{property} = {value}"),
        GraphOperation::BranchImport { graph, branch } => format!("{graph}/{branch}"),
        GraphOperation::TransactionBegin { .. }
        | GraphOperation::TransactionCommit { .. }
        | GraphOperation::TransactionRollback { .. } => String::new(),
    }
}

/// Execute `tg log`: print the checkout's revision items in log order.
///
/// # Errors
///
/// Returns an error if the project is not initialized or the log cannot be
/// read.
pub fn run_log(
    args: &LogArgs,
    output: OutputMode,
    project_root: &Path,
    project: &ProjectConfig,
) -> Result<()> {
    let conn = open_checkout(output, project_root, &args.checkout)?;
    let _lock = ReaderLock::acquire(&config::lock_path(project_root), project.lock.timeout())
        .map_err(|e| fail(output, e))?;

    let items: Vec<RevisionItem> = args
        .txn
        .as_deref()
        .map_or_else(
            || conn.revlog().iterate_all(conn.graph(), conn.branch()),
            |txn| {
                conn.revlog()
                    .iterate_transaction(conn.graph(), conn.branch(), &TxnId::new(txn))
            },
        )
        .map_err(|e| fail(output, e))?;

    render_mode(
        output,
        &items,
        |items, w| {
            for item in items {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}\t{}",
                    item.position,
                    item.txn_id,
                    item.seq_no,
                    item.operation.kind(),
                    subject(&item.operation)
                )?;
            }
            Ok(())
        },
        |items, w| {
            pretty_section(w, &format!("Revision log of {}", conn.label()))?;
            if items.is_empty() {
                writeln!(w, "(empty)")?;
            }
            for item in items {
                writeln!(
                    w,
                    "{:>6}  {}  {:<22}  {:<16}  {}",
                    item.position,
                    item.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    format!("{}#{}", item.txn_id, item.seq_no),
                    item.operation.kind().as_str(),
                    subject(&item.operation)
                )?;
            }
            Ok(())
        },
    )
}
