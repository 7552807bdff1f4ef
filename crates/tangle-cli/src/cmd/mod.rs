pub mod edges;
pub mod federate;
pub mod init;
pub mod log;
pub mod replay;
pub mod show;
pub mod submit;

use crate::output::{CliError, OutputMode, pretty_kv, render_error};
use clap::Args;
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;
use tangle_core::config;
use tangle_core::db::{self, SharedConnection};
use tangle_core::error::ErrorCode;
use tangle_core::model::{Edge, EntityKeys, Fields, Node};
use tangle_core::{DEFAULT_BRANCH, GraphConnection};

/// Graph and branch selection shared by checkout-scoped commands.
#[derive(Args, Debug, Clone)]
pub struct CheckoutArgs {
    /// Graph name.
    #[arg(long, short = 'g')]
    pub graph: String,

    /// Branch of the graph.
    #[arg(long, short = 'b', default_value = DEFAULT_BRANCH)]
    pub branch: String,
}

/// Identity of the entity to look up: a uid, or a type plus a name.
#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// Look the entity up by uid.
    #[arg(long, required_unless_present = "name", conflicts_with_all = ["entity_type", "name"])]
    pub uid: Option<String>,

    /// Entity type, used with `--name`.
    #[arg(long = "type", requires = "name")]
    pub entity_type: Option<String>,

    /// Entity name, used with `--type`.
    #[arg(long, requires = "entity_type")]
    pub name: Option<String>,
}

impl KeyArgs {
    pub fn keys(&self) -> anyhow::Result<EntityKeys> {
        match (&self.uid, &self.entity_type, &self.name) {
            (Some(uid), _, _) => Ok(EntityKeys::from_uid(uid)),
            (None, Some(entity_type), Some(name)) => Ok(EntityKeys::named(entity_type, name)),
            _ => anyhow::bail!("pass --uid, or --type together with --name"),
        }
    }
}

/// A node or edge selection.
#[derive(Args, Debug, Clone)]
pub struct SelectorArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Look in the edge collection instead of nodes.
    #[arg(long)]
    pub edge: bool,
}

impl SelectorArgs {
    pub fn keys(&self) -> anyhow::Result<EntityKeys> {
        self.key.keys()
    }
}

/// A node or edge document, as printed by `show` and `federate get`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum EntityView {
    Node(Node),
    Edge(Edge),
}

impl EntityView {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Node(_) => "node",
            Self::Edge(_) => "edge",
        }
    }

    const fn keys(&self) -> &EntityKeys {
        match self {
            Self::Node(node) => &node.keys,
            Self::Edge(edge) => &edge.keys,
        }
    }

    const fn fields(&self) -> &Fields {
        match self {
            Self::Node(node) => &node.fields,
            Self::Edge(edge) => &edge.fields,
        }
    }
}

fn join(set: &std::collections::BTreeSet<String>) -> String {
    if set.is_empty() {
        "-".to_string()
    } else {
        set.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
    }
}

/// Key/value block for one document.
pub fn write_entity_pretty(w: &mut dyn Write, entity: &EntityView) -> io::Result<()> {
    let keys = entity.keys();
    pretty_kv(w, "Kind", entity.kind())?;
    pretty_kv(w, "Type", keys.entity_type.as_deref().unwrap_or("-"))?;
    pretty_kv(w, "Uids", join(&keys.uids))?;
    pretty_kv(w, "Names", join(&keys.names))?;
    if let EntityView::Edge(edge) = entity {
        pretty_kv(w, "From", edge.from.to_string())?;
        pretty_kv(w, "To", edge.to.to_string())?;
        pretty_kv(w, "Hanging", if edge.hanging { "yes" } else { "no" })?;
    }
    if !entity.fields().is_empty() {
        writeln!(w)?;
        for (name, value) in entity.fields() {
            pretty_kv(w, name, value.to_string())?;
        }
    }
    Ok(())
}

/// One line per document: kind, keyset, then the fields as JSON.
pub fn write_entity_text(w: &mut dyn Write, entity: &EntityView) -> io::Result<()> {
    let fields = serde_json::to_string(entity.fields()).map_err(io::Error::other)?;
    match entity {
        EntityView::Node(node) => writeln!(w, "node  {}  {fields}", node.keys),
        EntityView::Edge(edge) => writeln!(
            w,
            "edge  {}  {} -> {}{}  {fields}",
            edge.keys,
            edge.from,
            edge.to,
            if edge.hanging { " (hanging)" } else { "" }
        ),
    }
}

/// Render `err` to stderr and hand it back for propagation.
pub fn fail<E>(output: OutputMode, err: E) -> anyhow::Error
where
    E: std::error::Error + Send + Sync + 'static,
    CliError: for<'a> From<&'a E>,
{
    if let Err(render_err) = render_error(output, &CliError::from(&err)) {
        return render_err;
    }
    anyhow::Error::new(err)
}

/// Fail with `E1001` unless `.tangle/` holds a database.
pub fn require_project(output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let db_path = config::database_path(project_root);
    if db_path.is_file() {
        return Ok(());
    }
    let message = format!(
        "{}: no tangle project at {}",
        ErrorCode::NotInitialized.code(),
        project_root.display()
    );
    render_error(output, &CliError::coded(&message, ErrorCode::NotInitialized))?;
    anyhow::bail!(message)
}

/// Open the project database once, to be shared by several checkouts.
pub fn open_project_db(output: OutputMode, project_root: &Path) -> anyhow::Result<SharedConnection> {
    require_project(output, project_root)?;
    let conn = db::open_database(&config::database_path(project_root)).map_err(|e| fail(output, e))?;
    Ok(db::share(conn))
}

/// Open one checkout of the project database.
pub fn open_checkout(
    output: OutputMode,
    project_root: &Path,
    checkout: &CheckoutArgs,
) -> anyhow::Result<GraphConnection> {
    let shared = open_project_db(output, project_root)?;
    GraphConnection::sqlite(&shared, &checkout.graph, &checkout.branch).map_err(|e| fail(output, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn selector(uid: Option<&str>, entity_type: Option<&str>, name: Option<&str>) -> SelectorArgs {
        SelectorArgs {
            key: KeyArgs {
                uid: uid.map(str::to_string),
                entity_type: entity_type.map(str::to_string),
                name: name.map(str::to_string),
            },
            edge: false,
        }
    }

    #[test]
    fn selector_prefers_uid() {
        let keys = selector(Some("u1"), None, None).keys().expect("keys");
        assert_eq!(keys, EntityKeys::from_uid("u1"));
    }

    #[test]
    fn selector_by_type_and_name() {
        let keys = selector(None, Some("Person"), Some("alice")).keys().expect("keys");
        assert_eq!(keys, EntityKeys::named("Person", "alice"));
    }

    #[test]
    fn selector_without_identity_is_rejected() {
        assert!(selector(None, Some("Person"), None).keys().is_err());
    }

    #[test]
    fn text_line_shows_edge_endpoints() {
        let edge = Edge::new(
            EntityKeys::typed("knows").with_uid("e1"),
            EntityKeys::from_uid("n1"),
            EntityKeys::from_uid("n2"),
        )
        .with_field("since", json!(2020));
        let mut buf = Vec::new();
        write_entity_text(&mut buf, &EntityView::Edge(edge)).expect("write");
        let line = String::from_utf8(buf).expect("utf8");
        assert!(line.starts_with("edge  "));
        assert!(line.contains(" -> "));
        assert!(line.contains(r#"{"since":2020}"#));
    }

    #[test]
    fn pretty_block_lists_fields() {
        let node = Node::new(EntityKeys::named("Person", "alice")).with_field("age", json!(30));
        let mut buf = Vec::new();
        write_entity_pretty(&mut buf, &EntityView::Node(node)).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("Names:       alice"));
        assert!(text.contains("age:         30"));
    }
}
