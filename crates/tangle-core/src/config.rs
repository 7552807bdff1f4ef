//! Project and user configuration.
//!
//! Project settings live in `.tangle/config.toml` next to the database; user
//! settings (output preference, extra federation sources) in
//! `~/.config/tangle/config.toml`. Missing files mean defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connection::DEFAULT_BRANCH;
use crate::error::ErrorCode;
use crate::federation::{DEFAULT_MAX_ROUNDS, DEFAULT_ROUND_DEADLINE, FederationSettings};
use crate::merge::MergePolicy;
use crate::player::ReplayMode;

/// Directory holding a project's database and config.
pub const PROJECT_DIR: &str = ".tangle";

/// Database file inside [`PROJECT_DIR`].
pub const DATABASE_FILE: &str = "tangle.db";

/// Writer lock file inside [`PROJECT_DIR`].
pub const LOCK_FILE: &str = "write.lock";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub federation: FederationConfig,
    #[serde(default)]
    pub lock: LockConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayConfig {
    #[serde(default)]
    pub mode: ReplayMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationConfig {
    #[serde(default = "default_federation_policy")]
    pub policy: MergePolicy,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Zero disables the per-round deadline.
    #[serde(default = "default_round_deadline_ms")]
    pub round_deadline_ms: u64,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            policy: default_federation_policy(),
            max_rounds: default_max_rounds(),
            round_deadline_ms: default_round_deadline_ms(),
        }
    }
}

impl FederationConfig {
    #[must_use]
    pub const fn settings(&self) -> FederationSettings {
        let round_deadline = if self.round_deadline_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.round_deadline_ms))
        };
        FederationSettings {
            policy: self.policy,
            max_rounds: self.max_rounds,
            round_deadline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl LockConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// A checkout in another project's database, used as a federation source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSourceConfig {
    pub name: String,
    /// Project root containing `.tangle/`.
    pub path: PathBuf,
    pub graph: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

impl GraphSourceConfig {
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        database_path(&self.path)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub graphs: Vec<GraphSourceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// `.tangle/` under `project_root`.
#[must_use]
pub fn project_dir(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_DIR)
}

/// `.tangle/tangle.db` under `project_root`.
#[must_use]
pub fn database_path(project_root: &Path) -> PathBuf {
    project_dir(project_root).join(DATABASE_FILE)
}

/// `.tangle/write.lock` under `project_root`.
#[must_use]
pub fn lock_path(project_root: &Path) -> PathBuf {
    project_dir(project_root).join(LOCK_FILE)
}

fn read_toml<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str::<T>(&content).with_context(|| {
        format!(
            "{}: failed to parse {}",
            ErrorCode::ConfigParseError.code(),
            path.display()
        )
    })
}

/// Load `.tangle/config.toml`, or defaults if it does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_dir(project_root).join("config.toml");
    let config: ProjectConfig = read_toml(&path)?;
    if config.federation.max_rounds == 0 {
        anyhow::bail!(
            "{}: federation.max_rounds must be at least 1 in {}",
            ErrorCode::ConfigParseError.code(),
            path.display()
        );
    }
    Ok(config)
}

/// Load `~/.config/tangle/config.toml`, or defaults if it does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };
    read_toml(&config_dir.join("tangle/config.toml"))
}

/// Pair each configured source with whether its database exists.
///
/// Unavailable sources are logged and reported, not dropped.
#[must_use]
pub fn discover_graphs(config: &UserConfig) -> Vec<(GraphSourceConfig, bool)> {
    config
        .graphs
        .iter()
        .map(|source| {
            let available = source.database_path().is_file();
            if !available {
                if source.path.exists() {
                    tracing::warn!(
                        name = %source.name,
                        path = %source.path.display(),
                        "graph source has no .tangle/ database"
                    );
                } else {
                    tracing::warn!(
                        name = %source.name,
                        path = %source.path.display(),
                        "graph source path does not exist"
                    );
                }
            }
            (source.clone(), available)
        })
        .collect()
}

/// Load both config layers and settle the output mode.
///
/// # Errors
///
/// Returns an error if either config file is present but invalid.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;
    let resolved_output = resolve_output(
        cli_json,
        user.output.as_deref(),
        env::var("FORMAT").ok().as_deref(),
        std::io::stdout().is_terminal(),
    );
    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

/// `--json` beats `FORMAT`, which beats the user config; otherwise `pretty`
/// on a terminal and `text` when piped. Unknown values are skipped.
#[must_use]
pub fn resolve_output(
    cli_json: bool,
    user_output: Option<&str>,
    env_format: Option<&str>,
    is_tty: bool,
) -> String {
    fn normalize(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "plain" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    let mode = if cli_json {
        "json"
    } else if let Some(mode) = env_format.and_then(normalize) {
        mode
    } else if let Some(mode) = user_output.and_then(normalize) {
        mode
    } else if is_tty {
        "pretty"
    } else {
        "text"
    };
    mode.to_string()
}

const fn default_federation_policy() -> MergePolicy {
    MergePolicy::AppendNewOverwriteExisting
}

const fn default_max_rounds() -> usize {
    DEFAULT_MAX_ROUNDS
}

#[allow(clippy::cast_possible_truncation)]
const fn default_round_deadline_ms() -> u64 {
    DEFAULT_ROUND_DEADLINE.as_millis() as u64
}

const fn default_lock_timeout_ms() -> u64 {
    5_000
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_project_config(root: &Path, content: &str) {
        let dir = project_dir(root);
        std::fs::create_dir_all(&dir).expect("create .tangle");
        std::fs::write(dir.join("config.toml"), content).expect("write config");
    }

    #[test]
    fn missing_project_config_uses_defaults() {
        let root = tempfile::tempdir().expect("tempdir");
        let cfg = load_project_config(root.path()).expect("load should succeed");
        assert_eq!(cfg.replay.mode, ReplayMode::AsLogged);
        assert_eq!(cfg.federation.policy, MergePolicy::AppendNewOverwriteExisting);
        assert_eq!(cfg.federation.max_rounds, 64);
        assert_eq!(cfg.federation.round_deadline_ms, 5_000);
        assert_eq!(cfg.lock.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn project_config_overrides_are_read() {
        let root = tempfile::tempdir().expect("tempdir");
        write_project_config(
            root.path(),
            r#"
[replay]
mode = "committed-only"

[federation]
policy = "append-new-leave-existing"
max_rounds = 8
round_deadline_ms = 0
"#,
        );
        let cfg = load_project_config(root.path()).expect("load");
        assert_eq!(cfg.replay.mode, ReplayMode::CommittedOnly);
        let settings = cfg.federation.settings();
        assert_eq!(settings.policy, MergePolicy::AppendNewLeaveExisting);
        assert_eq!(settings.max_rounds, 8);
        assert_eq!(settings.round_deadline, None);
        assert_eq!(cfg.lock.timeout_ms, 5_000);
    }

    #[test]
    fn invalid_project_config_names_the_error_code() {
        let root = tempfile::tempdir().expect("tempdir");
        write_project_config(root.path(), "[replay]\nmode = \"sometimes\"\n");
        let err = load_project_config(root.path()).expect_err("bad mode");
        assert!(format!("{err:#}").contains("E1002"));
    }

    #[test]
    fn zero_federation_rounds_are_rejected() {
        let root = tempfile::tempdir().expect("tempdir");
        write_project_config(root.path(), "[federation]\nmax_rounds = 0\n");
        let err = load_project_config(root.path()).expect_err("zero rounds");
        let message = format!("{err:#}");
        assert!(message.contains("E1002"));
        assert!(message.contains("max_rounds"));
    }

    #[test]
    fn cli_json_overrides_env_and_config() {
        assert_eq!(resolve_output(true, Some("pretty"), Some("text"), true), "json");
    }

    #[test]
    fn env_beats_user_config_and_aliases_normalize() {
        assert_eq!(resolve_output(false, Some("json"), Some("human"), false), "pretty");
        assert_eq!(resolve_output(false, Some("plain"), Some("bogus"), true), "text");
        assert_eq!(resolve_output(false, None, None, true), "pretty");
        assert_eq!(resolve_output(false, None, None, false), "text");
    }

    #[test]
    fn user_config_parses_graph_sources() {
        let cfg: UserConfig = toml::from_str(
            r#"
output = "json"

[[graphs]]
name = "crm"
path = "/srv/crm"
graph = "people"

[[graphs]]
name = "hr"
path = "/srv/hr"
graph = "people"
branch = "staging"
"#,
        )
        .expect("parse");

        assert_eq!(cfg.output.as_deref(), Some("json"));
        assert_eq!(cfg.graphs.len(), 2);
        assert_eq!(cfg.graphs[0].branch, "main");
        assert_eq!(cfg.graphs[1].branch, "staging");
        assert_eq!(
            cfg.graphs[0].database_path(),
            PathBuf::from("/srv/crm/.tangle/tangle.db")
        );
    }

    #[test]
    fn discover_graphs_reports_availability() {
        let root = tempfile::tempdir().expect("tempdir");
        let present = root.path().join("present");
        std::fs::create_dir_all(project_dir(&present)).expect("create .tangle");
        std::fs::write(database_path(&present), b"").expect("touch db");
        let bare = root.path().join("bare");
        std::fs::create_dir_all(&bare).expect("create bare");

        let source = |name: &str, path: PathBuf| GraphSourceConfig {
            name: name.to_string(),
            path,
            graph: "g".to_string(),
            branch: "main".to_string(),
        };
        let config = UserConfig {
            output: None,
            graphs: vec![
                source("present", present),
                source("bare", bare),
                source("missing", root.path().join("missing")),
            ],
        };

        let found: Vec<(String, bool)> = discover_graphs(&config)
            .into_iter()
            .map(|(source, available)| (source.name, available))
            .collect();
        assert_eq!(
            found,
            vec![
                ("present".to_string(), true),
                ("bare".to_string(), false),
                ("missing".to_string(), false),
            ]
        );
    }

    #[test]
    fn discover_graphs_empty_config() {
        assert!(discover_graphs(&UserConfig::default()).is_empty());
    }
}
