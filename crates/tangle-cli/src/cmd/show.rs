use crate::output::{OutputMode, pretty_section, render_mode};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::Path;
use tangle_core::GraphError;
use tangle_core::config::{self, ProjectConfig};
use tangle_core::lock::ReaderLock;

use super::{
    CheckoutArgs, EntityView, SelectorArgs, fail, open_checkout, write_entity_pretty,
    write_entity_text,
};

#[derive(Args, Debug)]
pub struct ShowArgs {
    #[command(flatten)]
    pub checkout: CheckoutArgs,

    #[command(flatten)]
    pub selector: SelectorArgs,
}

#[derive(Debug, Serialize)]
struct ShowView {
    source: String,
    kind: &'static str,
    document: EntityView,
}

/// Execute `tg show`: print one node or edge from the checkout's store.
///
/// # Errors
///
/// Returns an error if the project is not initialized, the store cannot be
/// read, or nothing matches the selector.
pub fn run_show(
    args: &ShowArgs,
    output: OutputMode,
    project_root: &Path,
    project: &ProjectConfig,
) -> Result<()> {
    let keys = args.selector.keys()?;
    let conn = open_checkout(output, project_root, &args.checkout)?;
    let _lock = ReaderLock::acquire(&config::lock_path(project_root), project.lock.timeout())
        .map_err(|e| fail(output, e))?;

    let found = if args.selector.edge {
        conn.edges().get_by_key(&keys).map(|doc| doc.map(EntityView::Edge))
    } else {
        conn.nodes().get_by_key(&keys).map(|doc| doc.map(EntityView::Node))
    }
    .map_err(|e| fail(output, e))?;

    let Some(document) = found else {
        return Err(fail(
            output,
            GraphError::not_found(format!("{keys} in {}", conn.label())),
        ));
    };

    let view = ShowView {
        source: conn.label(),
        kind: document.kind(),
        document,
    };
    render_mode(
        output,
        &view,
        |v, w| write_entity_text(w, &v.document),
        |v, w| {
            pretty_section(w, &v.source)?;
            write_entity_pretty(w, &v.document)
        },
    )
}
