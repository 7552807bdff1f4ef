use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tangle_core::config::{self, ProjectConfig};
use tangle_core::lock::ReaderLock;
use tangle_core::model::{Edge, EntityKeys};
use tangle_core::store::{Direction, EdgeStoreExt};

use super::{CheckoutArgs, EntityView, KeyArgs, fail, open_checkout, write_entity_pretty, write_entity_text};

#[derive(Args, Debug)]
pub struct EdgesArgs {
    #[command(flatten)]
    pub checkout: CheckoutArgs,

    #[command(flatten)]
    pub node: KeyArgs,

    /// Edges leading into the node instead of out of it.
    #[arg(long)]
    pub incoming: bool,

    /// Only edges of this type.
    #[arg(long = "edge-type", value_name = "TYPE")]
    pub edge_type: Option<String>,

    /// Print counts per edge type instead of the edges.
    #[arg(long)]
    pub count: bool,
}

const fn direction_name(direction: Direction) -> &'static str {
    match direction {
        Direction::Outgoing => "outgoing",
        Direction::Incoming => "incoming",
    }
}

#[derive(Debug, Serialize)]
struct EdgesView {
    source: String,
    node: EntityKeys,
    direction: &'static str,
    edges: Vec<Edge>,
}

#[derive(Debug, Serialize)]
struct EdgeCountView {
    source: String,
    node: EntityKeys,
    direction: &'static str,
    total: u64,
    by_type: BTreeMap<String, u64>,
}

/// Execute `tg edges`: list or count the edges on one side of a node.
///
/// The node is looked up first so that every identifier it carries is
/// matched. A node that is not stored is matched by the given identifiers
/// alone, which still finds edges left hanging on it.
///
/// # Errors
///
/// Returns an error if the project is not initialized or the stores cannot
/// be read.
pub fn run_edges(
    args: &EdgesArgs,
    output: OutputMode,
    project_root: &Path,
    project: &ProjectConfig,
) -> Result<()> {
    let given = args.node.keys()?;
    let conn = open_checkout(output, project_root, &args.checkout)?;
    let _lock = ReaderLock::acquire(&config::lock_path(project_root), project.lock.timeout())
        .map_err(|e| fail(output, e))?;

    let node = conn
        .nodes()
        .get_by_key(&given)
        .map_err(|e| fail(output, e))?
        .map_or(given, |found| found.keys);
    let direction = if args.incoming {
        Direction::Incoming
    } else {
        Direction::Outgoing
    };
    let edges: Vec<Edge> = conn
        .edges()
        .edges_of(&node, direction)
        .map_err(|e| fail(output, e))?
        .into_iter()
        .filter(|edge| {
            args.edge_type
                .as_deref()
                .is_none_or(|wanted| edge.keys.entity_type.as_deref() == Some(wanted))
        })
        .collect();

    if args.count {
        let mut by_type = BTreeMap::new();
        for edge in &edges {
            if let Some(edge_type) = &edge.keys.entity_type {
                *by_type.entry(edge_type.clone()).or_insert(0) += 1;
            }
        }
        let view = EdgeCountView {
            source: conn.label(),
            node,
            direction: direction_name(direction),
            total: edges.len() as u64,
            by_type,
        };
        return render_mode(
            output,
            &view,
            |v, w| {
                writeln!(w, "total\t{}", v.total)?;
                for (edge_type, count) in &v.by_type {
                    writeln!(w, "{edge_type}\t{count}")?;
                }
                Ok(())
            },
            |v, w| {
                pretty_section(w, &format!("{} edges of {} in {}", v.direction, v.node, v.source))?;
                pretty_kv(w, "Total", v.total.to_string())?;
                for (edge_type, count) in &v.by_type {
                    pretty_kv(w, edge_type, count.to_string())?;
                }
                Ok(())
            },
        );
    }

    let view = EdgesView {
        source: conn.label(),
        node,
        direction: direction_name(direction),
        edges,
    };
    render_mode(
        output,
        &view,
        |v, w| {
            for edge in &v.edges {
                write_entity_text(w, &EntityView::Edge(edge.clone()))?;
            }
            Ok(())
        },
        |v, w| {
            pretty_section(w, &format!("{} edges of {} in {}", v.direction, v.node, v.source))?;
            if v.edges.is_empty() {
                writeln!(w, "(none)")?;
            }
            for (i, edge) in v.edges.iter().enumerate() {
                if i > 0 {
                    writeln!(w)?;
                }
                write_entity_pretty(w, &EntityView::Edge(edge.clone()))?;
            }
            Ok(())
        },
    )
}
