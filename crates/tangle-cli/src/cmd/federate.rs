use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_error, render_mode};
use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::Path;
use tangle_core::config::{self, ProjectConfig, UserConfig};
use tangle_core::error::ErrorCode;
use tangle_core::federation;
use tangle_core::model::{Edge, Node};
use tangle_core::{DEFAULT_BRANCH, GraphConnection, GraphError, federated_count};

use super::{EntityView, SelectorArgs, fail, open_project_db, write_entity_pretty, write_entity_text};

#[derive(Args, Debug)]
pub struct FederateArgs {
    /// Graph of this project to include, as `G` or `G/B`. Repeatable; order
    /// is merge priority, later graphs win under the default policy.
    #[arg(long = "graph", short = 'g', value_name = "G[/B]")]
    pub graphs: Vec<String>,

    /// Ignore the `[[graphs]]` sources of the user config.
    #[arg(long)]
    pub no_user_graphs: bool,

    #[command(subcommand)]
    pub command: FederateCommand,
}

#[derive(Subcommand, Debug)]
pub enum FederateCommand {
    /// Resolve one entity across every source and print the merged document.
    Get(SelectorArgs),
    /// Sum document counts across every source.
    Count {
        /// Count edges instead of nodes.
        #[arg(long)]
        edge: bool,
    },
}

/// Split `G/B` into graph and branch; a bare `G` means the default branch.
fn parse_graph_spec(spec: &str) -> Option<(&str, &str)> {
    let (graph, branch) = spec.split_once('/').unwrap_or((spec, DEFAULT_BRANCH));
    if graph.trim().is_empty() || branch.trim().is_empty() {
        return None;
    }
    Some((graph, branch))
}

/// Local graphs first, in flag order, then available user-config sources.
fn connect_sources(
    args: &FederateArgs,
    output: OutputMode,
    project_root: &Path,
    user: &UserConfig,
) -> Result<Vec<GraphConnection>> {
    let mut conns = Vec::new();

    if !args.graphs.is_empty() {
        let shared = open_project_db(output, project_root)?;
        for spec in &args.graphs {
            let Some((graph, branch)) = parse_graph_spec(spec) else {
                let message = format!(
                    "{}: `{spec}` is not a graph spec, expected G or G/B",
                    ErrorCode::ValidationFailed.code()
                );
                render_error(output, &CliError::coded(&message, ErrorCode::ValidationFailed))?;
                anyhow::bail!(message);
            };
            conns.push(GraphConnection::sqlite(&shared, graph, branch).map_err(|e| fail(output, e))?);
        }
    }

    if !args.no_user_graphs {
        for (source, available) in config::discover_graphs(user) {
            if !available {
                continue;
            }
            let conn = GraphConnection::open_sqlite(
                &source.database_path(),
                &source.graph,
                &source.branch,
            )
            .map_err(|e| fail(output, e))?;
            tracing::debug!(name = %source.name, checkout = %conn.label(), "federation source");
            conns.push(conn);
        }
    }

    if conns.is_empty() {
        let message = format!(
            "{}: no graphs to federate; pass --graph or add [[graphs]] to the user config",
            ErrorCode::ValidationFailed.code()
        );
        render_error(output, &CliError::coded(&message, ErrorCode::ValidationFailed))?;
        anyhow::bail!(message);
    }
    Ok(conns)
}

#[derive(Debug, Serialize)]
struct GetView {
    sources: Vec<String>,
    kind: &'static str,
    document: EntityView,
}

#[derive(Debug, Serialize)]
struct CountView {
    sources: Vec<String>,
    kind: &'static str,
    count: u64,
}

/// Execute `tg federate`.
///
/// # Errors
///
/// Returns an error if no source is available, a source database cannot be
/// opened, the fixpoint does not converge, or (for `get`) nothing matches.
pub fn run_federate(
    args: &FederateArgs,
    output: OutputMode,
    project_root: &Path,
    project: &ProjectConfig,
    user: &UserConfig,
) -> Result<()> {
    let conns = connect_sources(args, output, project_root, user)?;
    let sources: Vec<String> = conns.iter().map(GraphConnection::label).collect();
    let settings = project.federation.settings();

    match &args.command {
        FederateCommand::Get(selector) => {
            let keys = selector.keys()?;
            let found = if selector.edge {
                federation::resolve::<Edge>(&conns, &keys, &settings)
                    .map(|doc| doc.map(EntityView::Edge))
            } else {
                federation::resolve::<Node>(&conns, &keys, &settings)
                    .map(|doc| doc.map(EntityView::Node))
            }
            .map_err(|e| fail(output, e))?;

            let Some(document) = found else {
                return Err(fail(
                    output,
                    GraphError::not_found(format!("{keys} in {}", sources.join(", "))),
                ));
            };
            let view = GetView {
                sources,
                kind: document.kind(),
                document,
            };
            render_mode(
                output,
                &view,
                |v, w| write_entity_text(w, &v.document),
                |v, w| {
                    pretty_section(w, &format!("Federated over {}", v.sources.join(", ")))?;
                    write_entity_pretty(w, &v.document)
                },
            )
        }
        FederateCommand::Count { edge } => {
            let (kind, count) = if *edge {
                ("edge", federated_count::<Edge>(&conns))
            } else {
                ("node", federated_count::<Node>(&conns))
            };
            let view = CountView {
                sources,
                kind,
                count: count.map_err(|e| fail(output, e))?,
            };
            render_mode(
                output,
                &view,
                |v, w| writeln!(w, "{}", v.count),
                |v, w| {
                    pretty_section(w, &format!("Federated over {}", v.sources.join(", ")))?;
                    pretty_kv(w, &format!("{}s", v.kind), v.count.to_string())
                },
            )
        }
    }
}
