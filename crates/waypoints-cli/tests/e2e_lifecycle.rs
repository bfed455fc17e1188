//! E2E CLI tests covering the item lifecycle:
//! - `wp init` / `wp add` / `wp list` / `wp show`
//! - completion and points (`wp done`, `wp undo`, `wp points`)
//! - auto-linking (`wp links`, `wp delete --all-linked`, `wp edit --sync-linked`)
//! - soft delete, restore, and error codes on stderr
//!
//! Each test runs `wp` as a subprocess in an isolated temp directory.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

/// Build a Command targeting the `wp` binary, rooted in `dir`.
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

/// Run a command with `--json`, assert success, and parse stdout.
fn json_ok(dir: &Path, args: &[&str]) -> Value {
    let output = wp_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("command should not crash");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("--json should produce valid JSON")
}

/// Run a command with `--json`, assert failure, and return the error code.
fn json_err(dir: &Path, args: &[&str]) -> Value {
    let output = wp_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("command should not crash");
    assert!(!output.status.success(), "{args:?} unexpectedly succeeded");
    let json: Value =
        serde_json::from_slice(&output.stderr).expect("errors should render as JSON on stderr");
    json["error"].clone()
}

fn add(dir: &Path, text: &str, extra: &[&str]) -> String {
    let mut args = vec!["add", text];
    args.extend_from_slice(extra);
    json_ok(dir, &args)["id"]
        .as_str()
        .expect("add output should have 'id' field")
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn init_creates_store_and_is_repeatable() {
    let dir = init_project();
    assert!(dir.path().join(".waypoints/waypoints.db").exists());
    assert!(dir.path().join(".waypoints/config.toml").exists());

    let again = json_ok(dir.path(), &["init"]);
    assert_eq!(again["config_written"], false);
    assert_eq!(again["already_initialized"], true);
}

#[test]
fn commands_require_init() {
    let dir = TempDir::new().expect("create temp dir");
    let err = json_err(dir.path(), &["list"]);
    assert_eq!(err["error_code"], "E1002");
    assert!(
        err["message"]
            .as_str()
            .expect("message")
            .contains("wp init")
    );
}

#[test]
fn add_builds_a_tree_and_list_orders_it() {
    let dir = init_project();
    let ship = add(dir.path(), "Ship v1", &["--kind", "direction"]);
    let design = add(dir.path(), "Design", &["--kind", "waypoint", "--parent", &ship[..8]]);
    let build = add(dir.path(), "Build", &["--parent", &ship]);

    let shown = json_ok(dir.path(), &["show", &ship]);
    assert_eq!(shown["points"], 100);
    let children: Vec<&str> = shown["children"]
        .as_array()
        .expect("children array")
        .iter()
        .map(|c| c["id"].as_str().expect("id"))
        .collect();
    assert_eq!(children, vec![design.as_str(), build.as_str()]);

    let list = wp_cmd(dir.path())
        .args(["list", "--format", "text"])
        .output()
        .expect("list");
    let text = String::from_utf8(list.stdout).expect("utf8");
    let rows: Vec<&str> = text.lines().collect();
    assert_eq!(rows.len(), 3);
    assert!(rows[0].starts_with(&ship));
    assert!(rows[1].starts_with(&design));
    assert!(rows[2].ends_with("\tBuild"));
}

#[test]
fn done_and_undo_move_the_day_total_by_the_points() {
    let dir = init_project();
    let id = add(dir.path(), "Write report", &["--kind", "waypoint"]);

    let before = json_ok(dir.path(), &["points"]);
    assert_eq!(before["baselinePoints"], 10);
    assert_eq!(before["total"], 10);

    let done = json_ok(dir.path(), &["done", &id]);
    assert_eq!(done["completions"][0]["recorded"]["pointsEarned"], 25);
    assert_eq!(json_ok(dir.path(), &["points"])["total"], 35);

    // A second `done` records nothing.
    let again = json_ok(dir.path(), &["done", &id]);
    assert!(again["completions"][0].get("recorded").is_none());
    assert_eq!(json_ok(dir.path(), &["points"])["total"], 35);

    let undone = json_ok(dir.path(), &["undo", &id]);
    assert_eq!(undone["completions"][0]["revoked"]["pointsEarned"], 25);
    assert_eq!(json_ok(dir.path(), &["points"])["total"], 10);

    let history = json_ok(dir.path(), &["points", "--days", "3"]);
    assert_eq!(history.as_array().expect("days").len(), 3);
}

#[test]
fn same_text_links_and_group_delete_counts() {
    let dir = init_project();
    let a = add(dir.path(), "Review", &[]);
    let b = add(dir.path(), "review", &[]);
    add(dir.path(), "REVIEW", &[]);
    add(dir.path(), "Unrelated", &[]);

    let shown = json_ok(dir.path(), &["show", &b]);
    assert_eq!(shown["isCanonical"], false);
    assert_eq!(shown["linkedInstances"].as_array().expect("linked").len(), 2);

    let groups = json_ok(dir.path(), &["links"]);
    let groups = groups.as_array().expect("groups");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["canonicalId"], a.as_str());

    let deleted = json_ok(dir.path(), &["delete", &b, "--all-linked"]);
    assert_eq!(deleted["count"], 3);

    let list = json_ok(dir.path(), &["list"]);
    assert_eq!(list.as_array().expect("items").len(), 1);
    let trash = json_ok(dir.path(), &["list", "--deleted"]);
    assert_eq!(trash.as_array().expect("items").len(), 3);
}

#[test]
fn sync_linked_edit_renames_every_instance() {
    let dir = init_project();
    let a = add(dir.path(), "Standup", &[]);
    add(dir.path(), "standup", &[]);

    let edited = json_ok(
        dir.path(),
        &["edit", &a, "--text", "Daily standup", "--sync-linked"],
    );
    let items = edited["items"].as_array().expect("items");
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i["text"] == "Daily standup"));
}

#[test]
fn soft_delete_keeps_children_and_restore_brings_it_back() {
    let dir = init_project();
    let parent = add(dir.path(), "Parent", &["--kind", "direction"]);
    let child = add(dir.path(), "Child", &["--parent", &parent]);

    json_ok(dir.path(), &["delete", &parent]);
    let shown = json_ok(dir.path(), &["show", &child]);
    assert!(shown["deletedAt"].is_null());

    let restored = json_ok(dir.path(), &["restore", &parent]);
    assert!(restored["deletedAt"].is_null());
    assert_eq!(json_ok(dir.path(), &["list"]).as_array().expect("items").len(), 2);
}

#[test]
fn move_rejects_cycles() {
    let dir = init_project();
    let top = add(dir.path(), "Top", &[]);
    let under = add(dir.path(), "Under", &["--parent", &top]);

    let err = json_err(dir.path(), &["move", &top, "--parent", &under]);
    assert_eq!(err["error_code"], "E2003");

    let moved = json_ok(dir.path(), &["move", &under, "--root"]);
    assert!(moved["parentId"].is_null());
}

#[test]
fn errors_carry_codes() {
    let dir = init_project();

    let missing = json_err(dir.path(), &["show", "nope"]);
    assert_eq!(missing["error_code"], "E2001");

    let invalid = json_err(dir.path(), &["add", "Bad", "--kind", "epic", "--points", "-1"]);
    assert_eq!(invalid["error_code"], "E1001");
    assert_eq!(invalid["fields"].as_array().expect("fields").len(), 2);

    let orphan = json_err(dir.path(), &["add", "Orphan", "--parent", "ghost"]);
    assert_eq!(orphan["error_code"], "E2002");

    wp_cmd(dir.path())
        .args(["show", "nope", "--format", "text"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E2001]"));
}

#[test]
fn export_writes_a_valid_snapshot() {
    let dir = init_project();
    let id = add(dir.path(), "Keep me", &[]);
    json_ok(dir.path(), &["done", &id]);

    let report = json_ok(dir.path(), &["export", "--output", "snap.json"]);
    assert_eq!(report["counts"]["items"], 1);
    assert_eq!(report["counts"]["achievements"], 1);
    assert!(report["validation"]["errors"].as_array().expect("errors").is_empty());

    let raw = std::fs::read_to_string(dir.path().join("snap.json")).expect("snapshot file");
    let snapshot: Value = serde_json::from_str(&raw).expect("snapshot JSON");
    assert_eq!(snapshot["formatVersion"], 1);
}

#[test]
fn config_set_changes_point_defaults() {
    let dir = init_project();
    json_ok(dir.path(), &["config", "set", "points.step", "8"]);
    let id = add(dir.path(), "Small thing", &[]);
    assert_eq!(json_ok(dir.path(), &["show", &id])["points"], 8);

    let bad = wp_cmd(dir.path())
        .args(["config", "set", "points.nope", "1"])
        .output()
        .expect("config");
    assert!(!bad.status.success());
}
