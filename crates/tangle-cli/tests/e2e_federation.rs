//! E2E tests for `tg federate`: local graphs, user-config sources, counts.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::path::Path;
use tempfile::TempDir;

fn tg(dir: &Path, config_home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tg"));
    cmd.current_dir(dir);
    cmd.env("XDG_CONFIG_HOME", config_home);
    cmd.env_remove("FORMAT");
    cmd.env("TANGLE_LOG", "error");
    cmd
}

fn init(dir: &Path, config_home: &Path) {
    tg(dir, config_home).arg("init").assert().success();
}

/// Submit and play `alice` with `uid` and `fields` into `graph` of the
/// project at `dir`.
fn seed_alice(dir: &Path, config_home: &Path, graph: &str, uid: &str, fields: Value) {
    let mut node = json!({ "keys": { "type": "Person", "uids": [uid], "names": ["alice"] } });
    if let (Some(node), Some(fields)) = (node.as_object_mut(), fields.as_object()) {
        node.extend(fields.clone());
    }
    let ops = json!([{ "op": "node_modification", "node": node }]);
    tg(dir, config_home)
        .args(["submit", "--graph", graph, "--play", "-"])
        .write_stdin(ops.to_string())
        .assert()
        .success();
}

fn run_json(cmd: &mut Command) -> Value {
    let output = cmd.arg("--json").output().expect("run tg");
    assert!(
        output.status.success(),
        "tg failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("--json should produce valid JSON")
}

fn write_user_config(config_home: &Path, body: &str) {
    let dir = config_home.join("tangle");
    std::fs::create_dir_all(&dir).expect("config dir");
    std::fs::write(dir.join("config.toml"), body).expect("write user config");
}

fn uids(doc: &Value) -> Vec<&str> {
    doc["keys"]["uids"]
        .as_array()
        .expect("uids")
        .iter()
        .filter_map(Value::as_str)
        .collect()
}

#[test]
fn local_graphs_merge_on_shared_name() {
    let project = TempDir::new().expect("tempdir");
    let home = TempDir::new().expect("config home");
    init(project.path(), home.path());
    seed_alice(project.path(), home.path(), "crm", "crm-7", json!({ "email": "a@example.com" }));
    seed_alice(project.path(), home.path(), "hr", "hr-3", json!({ "band": "B" }));

    let value = run_json(tg(project.path(), home.path()).args([
        "federate", "--graph", "crm", "--graph", "hr", "get", "--type", "Person", "--name",
        "alice",
    ]));
    assert_eq!(value["sources"], json!(["crm/main", "hr/main"]));
    assert_eq!(value["kind"], "node");
    assert_eq!(uids(&value["document"]), vec!["crm-7", "hr-3"]);
    assert_eq!(value["document"]["email"], "a@example.com");
    assert_eq!(value["document"]["band"], "B");

    // Starting from the other store's uid reaches the same entity.
    let by_uid = run_json(tg(project.path(), home.path()).args([
        "federate", "-g", "crm", "-g", "hr", "get", "--uid", "hr-3",
    ]));
    assert_eq!(by_uid["document"], value["document"]);
}

#[test]
fn later_graph_wins_on_conflicting_fields() {
    let project = TempDir::new().expect("tempdir");
    let home = TempDir::new().expect("config home");
    init(project.path(), home.path());
    seed_alice(project.path(), home.path(), "a", "u1", json!({ "v": "a" }));
    seed_alice(project.path(), home.path(), "b", "u1", json!({ "v": "b" }));

    let forward = run_json(
        tg(project.path(), home.path()).args(["federate", "-g", "a", "-g", "b", "get", "--uid", "u1"]),
    );
    assert_eq!(forward["document"]["v"], "b");

    std::fs::write(
        project.path().join(".tangle/config.toml"),
        "[federation]\npolicy = \"append-new-leave-existing\"\n",
    )
    .expect("write config");
    let leave = run_json(
        tg(project.path(), home.path()).args(["federate", "-g", "a", "-g", "b", "get", "--uid", "u1"]),
    );
    assert_eq!(leave["document"]["v"], "a");
}

#[test]
fn count_sums_across_graphs() {
    let project = TempDir::new().expect("tempdir");
    let home = TempDir::new().expect("config home");
    init(project.path(), home.path());
    seed_alice(project.path(), home.path(), "crm", "crm-7", json!({}));
    seed_alice(project.path(), home.path(), "hr", "hr-3", json!({}));

    let nodes = run_json(tg(project.path(), home.path()).args([
        "federate", "-g", "crm", "-g", "hr", "count",
    ]));
    assert_eq!(nodes["count"], 2);
    assert_eq!(nodes["kind"], "node");

    let edges = run_json(tg(project.path(), home.path()).args([
        "federate", "-g", "crm", "-g", "hr", "count", "--edge",
    ]));
    assert_eq!(edges["count"], 0);
}

#[test]
fn user_config_sources_join_the_federation() {
    let here = TempDir::new().expect("here");
    let there = TempDir::new().expect("there");
    let home = TempDir::new().expect("config home");
    init(here.path(), home.path());
    init(there.path(), home.path());
    seed_alice(here.path(), home.path(), "crm", "crm-7", json!({ "email": "a@example.com" }));
    seed_alice(there.path(), home.path(), "hr", "hr-3", json!({ "band": "B" }));

    let missing = here.path().join("does-not-exist");
    write_user_config(
        home.path(),
        &format!(
            "[[graphs]]\nname = \"hr\"\npath = {:?}\ngraph = \"hr\"\n\n\
             [[graphs]]\nname = \"gone\"\npath = {:?}\ngraph = \"x\"\n",
            there.path().display().to_string(),
            missing.display().to_string(),
        ),
    );

    let value = run_json(tg(here.path(), home.path()).args([
        "federate", "-g", "crm", "get", "--type", "Person", "--name", "alice",
    ]));
    assert_eq!(value["sources"], json!(["crm/main", "hr/main"]));
    assert_eq!(value["document"]["band"], "B");
    assert_eq!(value["document"]["email"], "a@example.com");

    let local_only = run_json(tg(here.path(), home.path()).args([
        "federate", "-g", "crm", "--no-user-graphs", "get", "--uid", "crm-7",
    ]));
    assert_eq!(uids(&local_only["document"]), vec!["crm-7"]);
}

#[test]
fn no_sources_is_an_error() {
    let project = TempDir::new().expect("tempdir");
    let home = TempDir::new().expect("config home");
    tg(project.path(), home.path())
        .args(["federate", "count"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no graphs to federate"));
}

#[test]
fn unknown_entity_is_not_found() {
    let project = TempDir::new().expect("tempdir");
    let home = TempDir::new().expect("config home");
    init(project.path(), home.path());
    seed_alice(project.path(), home.path(), "crm", "crm-7", json!({}));
    tg(project.path(), home.path())
        .args(["federate", "-g", "crm", "get", "--uid", "nobody", "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2003"));
}

#[test]
fn bad_graph_spec_is_rejected() {
    let project = TempDir::new().expect("tempdir");
    let home = TempDir::new().expect("config home");
    init(project.path(), home.path());
    tg(project.path(), home.path())
        .args(["federate", "-g", "crm/", "count"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a graph spec"));
}
