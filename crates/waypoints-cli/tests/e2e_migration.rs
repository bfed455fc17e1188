//! E2E CLI tests covering one-shot migration into a remote account:
//! - clean migration into an empty remote file
//! - the persisted single-flight guard (`E4002` on a second run)
//! - `manual_review` conflicts, `wp migration-status --reset`, and a rerun
//!
//! The remote is the JSON file at `.waypoints/remote.json`.

use assert_cmd::Command;
use serde_json::{Value, json};
use std::path::Path;
use tempfile::TempDir;

fn wp_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("wp"));
    cmd.current_dir(dir);
    cmd.env("WAYPOINTS_LOG", "error");
    cmd.env("XDG_CONFIG_HOME", dir.join(".xdg"));
    cmd.env_remove("FORMAT");
    cmd
}

fn init_project() -> TempDir {
    let dir = TempDir::new().expect("create temp dir");
    wp_cmd(dir.path()).arg("init").assert().success();
    dir
}

fn run_json(dir: &Path, args: &[&str]) -> (bool, Value, Value) {
    let output = wp_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("command should not crash");
    let stdout = serde_json::from_slice(&output.stdout).unwrap_or(Value::Null);
    let stderr = serde_json::from_slice(&output.stderr).unwrap_or(Value::Null);
    (output.status.success(), stdout, stderr)
}

fn json_ok(dir: &Path, args: &[&str]) -> Value {
    let (ok, stdout, stderr) = run_json(dir, args);
    assert!(ok, "{args:?} failed: {stderr}");
    stdout
}

fn add(dir: &Path, text: &str) -> String {
    json_ok(dir, &["add", text])["id"]
        .as_str()
        .expect("id")
        .to_string()
}

fn remote(dir: &Path) -> Value {
    let raw = std::fs::read_to_string(dir.join(".waypoints/remote.json")).expect("remote file");
    serde_json::from_str(&raw).expect("remote JSON")
}

/// Seed the remote file with one active item for `account`.
fn seed_remote(dir: &Path, account: &str, id: &str, text: &str) {
    let item = json!({
        "id": id,
        "ownerId": account,
        "text": text,
        "kind": "step",
        "parentId": null,
        "position": 0,
        "completed": false,
        "completedAt": null,
        "points": 5,
        "deletedAt": null,
        "createdAt": "2026-01-01T00:00:00Z",
        "updatedAt": "2026-01-01T00:00:00Z",
    });
    let file = json!({ "accounts": { account: { "items": [item] } } });
    std::fs::write(
        dir.join(".waypoints/remote.json"),
        serde_json::to_string_pretty(&file).expect("encode"),
    )
    .expect("write remote file");
}

#[test]
fn clean_migration_claims_rows_and_runs_once() {
    let dir = init_project();
    let parent = add(dir.path(), "Ship v1");
    let child = json_ok(dir.path(), &["add", "Design", "--parent", &parent])["id"]
        .as_str()
        .expect("id")
        .to_string();
    json_ok(dir.path(), &["done", &child]);

    let outcome = json_ok(dir.path(), &["migrate", "acct-1"]);
    assert_eq!(outcome["state"], "completed");
    assert_eq!(outcome["strategy"], "keep_newest");
    assert_eq!(outcome["result"]["itemsMigrated"], 2);
    assert_eq!(outcome["result"]["achievementsMigrated"], 1);

    let account = &remote(dir.path())["accounts"]["acct-1"];
    let items = account["items"].as_array().expect("items");
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i["ownerId"] == "acct-1"));
    let design = items
        .iter()
        .find(|i| i["text"] == "Design")
        .expect("design migrated");
    assert_eq!(design["id"], child.as_str());
    assert_eq!(design["parentId"], parent.as_str());

    // The local store is left as it was.
    let local = json_ok(dir.path(), &["show", &child]);
    assert!(local["ownerId"].is_null());

    let (ok, _, err) = run_json(dir.path(), &["migrate", "acct-1"]);
    assert!(!ok);
    assert_eq!(err["error"]["error_code"], "E4002");

    let status = json_ok(dir.path(), &["migration-status", "acct-1"]);
    assert_eq!(status[0]["state"], "completed");
    assert_eq!(status[0]["attempts"], 1);
}

#[test]
fn manual_review_fails_until_reset_and_rerun() {
    let dir = init_project();
    add(dir.path(), "Groceries");
    seed_remote(dir.path(), "acct-2", "remote-1", "groceries");

    let (ok, outcome, err) = run_json(
        dir.path(),
        &["migrate", "acct-2", "--strategy", "manual_review"],
    );
    assert!(!ok);
    assert_eq!(err["error"]["error_code"], "E4004");
    assert_eq!(outcome["state"], "failed");
    let unresolved = outcome["unresolved"].as_array().expect("unresolved");
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0]["reason"], "text_match");

    // Nothing was written to the remote.
    let items = remote(dir.path())["accounts"]["acct-2"]["items"].clone();
    assert_eq!(items.as_array().expect("items").len(), 1);

    // A failed attempt must be reset before it can run again.
    let (ok, _, err) = run_json(dir.path(), &["migrate", "acct-2"]);
    assert!(!ok);
    assert_eq!(err["error"]["error_code"], "E4003");

    let reset = json_ok(dir.path(), &["migration-status", "acct-2", "--reset"]);
    assert_eq!(reset[0]["state"], "pending");

    let outcome = json_ok(
        dir.path(),
        &["migrate", "acct-2", "--strategy", "keep_local"],
    );
    assert_eq!(outcome["state"], "completed");
    assert_eq!(outcome["result"]["conflicts"], 1);
    assert_eq!(outcome["result"]["keptLocal"], 1);
}

#[test]
fn migrate_needs_an_account() {
    let dir = init_project();
    let (ok, _, err) = run_json(dir.path(), &["migrate"]);
    assert!(!ok);
    assert_eq!(err["error"]["error_code"], "E1001");

    // --owner supplies it.
    let outcome = json_ok(dir.path(), &["migrate", "--owner", "acct-3"]);
    assert_eq!(outcome["accountId"], "acct-3");
}

#[test]
fn status_lists_nothing_before_any_migration() {
    let dir = init_project();
    let status = json_ok(dir.path(), &["migration-status"]);
    assert_eq!(status, json!([]));
}
