use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Subcommand, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};
use toml::Value;
use waypoints_core::config::{DATA_DIR, EffectiveConfig, resolve_config};
use waypoints_core::migration::ResolutionStrategy;

use crate::output::{OutputMode, render_mode};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Show resolved or raw configuration
    Show(ShowArgs),
    /// Set a configuration key in project or user scope
    Set(SetArgs),
    /// Unset a configuration key in project or user scope
    Unset(UnsetArgs),
}

#[derive(Args, Debug)]
struct ShowArgs {
    /// Show raw project config only
    #[arg(long, conflicts_with = "user")]
    project: bool,

    /// Show raw user config only
    #[arg(long)]
    user: bool,
}

#[derive(Args, Debug)]
struct SetArgs {
    /// Scope to mutate
    #[arg(long, default_value = "project")]
    scope: ConfigScope,

    /// Dot path key (e.g. points.step, user.owner)
    key: String,

    /// New value
    value: String,
}

#[derive(Args, Debug)]
struct UnsetArgs {
    /// Scope to mutate
    #[arg(long, default_value = "project")]
    scope: ConfigScope,

    /// Dot path key (e.g. points.step, user.owner)
    key: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum ConfigScope {
    Project,
    User,
}

/// How the value of a known key is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Integer,
    Text,
    Strategy,
    OutputMode,
}

pub fn run_config(args: &ConfigArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    match &args.command {
        ConfigCommand::Show(show) => run_show(show, project_root, output),
        ConfigCommand::Set(set) => run_set(set, project_root, output),
        ConfigCommand::Unset(unset) => run_unset(unset, project_root, output),
    }
}

fn run_show(args: &ShowArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    if args.project {
        let value = load_toml_table(&project_config_path(project_root))?;
        return print_toml_or_json(&value, output);
    }

    if args.user {
        let value = load_toml_table(&user_config_path()?)?;
        return print_toml_or_json(&value, output);
    }

    let effective = resolve_config(project_root, output.is_json())?;
    print_effective(&effective, output)
}

fn scope_path(scope: ConfigScope, project_root: &Path) -> Result<PathBuf> {
    match scope {
        ConfigScope::Project => Ok(project_config_path(project_root)),
        ConfigScope::User => user_config_path(),
    }
}

fn run_set(args: &SetArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    let path = scope_path(args.scope, project_root)?;
    let mut value = load_toml_table(&path)?;
    apply_set(&mut value, args.scope, &args.key, &args.value)?;
    write_toml_table(&path, &value)?;
    render_mutation(output, "set", args.scope, &args.key)
}

fn run_unset(args: &UnsetArgs, project_root: &Path, output: OutputMode) -> Result<()> {
    let path = scope_path(args.scope, project_root)?;
    let mut value = load_toml_table(&path)?;
    apply_unset(&mut value, args.scope, &args.key)?;
    write_toml_table(&path, &value)?;
    render_mutation(output, "unset", args.scope, &args.key)
}

/// The table that holds `key`, created on demand, and the leaf name.
fn target_table<'v>(
    root: &'v mut Value,
    scope: ConfigScope,
    key: &str,
) -> Result<(&'v mut toml::map::Map<String, Value>, String)> {
    let (section, leaf, _) = split_known_key(scope, key)?;
    let table = root
        .as_table_mut()
        .ok_or_else(|| anyhow!("Config root must be a TOML table"))?;

    // User keys are stored at the top level of the user file.
    if scope == ConfigScope::User {
        return Ok((table, leaf.to_string()));
    }

    let section_table = table
        .entry(section.to_string())
        .or_insert_with(|| Value::Table(toml::map::Map::new()))
        .as_table_mut()
        .ok_or_else(|| anyhow!("Section {section} must be a TOML table"))?;
    Ok((section_table, leaf.to_string()))
}

fn apply_set(root: &mut Value, scope: ConfigScope, key: &str, raw: &str) -> Result<()> {
    let parsed = parse_value(scope, key, raw)?;
    let (table, leaf) = target_table(root, scope, key)?;
    table.insert(leaf, parsed);
    Ok(())
}

fn apply_unset(root: &mut Value, scope: ConfigScope, key: &str) -> Result<()> {
    let (section, leaf, _) = split_known_key(scope, key)?;
    let table = root
        .as_table_mut()
        .ok_or_else(|| anyhow!("Config root must be a TOML table"))?;

    if scope == ConfigScope::User {
        table.remove(leaf);
        return Ok(());
    }

    if let Some(section_entry) = table.get_mut(section)
        && let Some(section_table) = section_entry.as_table_mut()
    {
        section_table.remove(leaf);
        if section_table.is_empty() {
            table.remove(section);
        }
    }

    Ok(())
}

fn split_known_key(scope: ConfigScope, key: &str) -> Result<(&str, &str, KeyKind)> {
    let (section, leaf) = key
        .split_once('.')
        .ok_or_else(|| anyhow!("Key must use section.key format"))?;

    let kind = match scope {
        ConfigScope::Project => match (section, leaf) {
            ("storage", "capacity_bytes")
            | ("points", "direction" | "waypoint" | "step" | "daily_baseline") => {
                Some(KeyKind::Integer)
            }
            ("storage", "db_file") | ("migration", "remote_file") => Some(KeyKind::Text),
            ("migration", "default_strategy") => Some(KeyKind::Strategy),
            _ => None,
        },
        ConfigScope::User => match (section, leaf) {
            ("user", "output") => Some(KeyKind::OutputMode),
            ("user", "owner") => Some(KeyKind::Text),
            _ => None,
        },
    };

    match kind {
        Some(kind) => Ok((section, leaf, kind)),
        None => bail!("Unsupported key `{key}` for {} scope", scope_label(scope)),
    }
}

fn parse_value(scope: ConfigScope, key: &str, raw: &str) -> Result<Value> {
    let (_, _, kind) = split_known_key(scope, key)?;

    match kind {
        KeyKind::Integer => {
            let number: i64 = raw
                .parse()
                .with_context(|| format!("{key} expects a non-negative integer"))?;
            if number < 0 {
                bail!("{key} expects a non-negative integer");
            }
            Ok(Value::Integer(number))
        }
        KeyKind::Text => Ok(Value::String(raw.to_string())),
        KeyKind::Strategy => {
            let strategy: ResolutionStrategy =
                raw.parse().with_context(|| format!("{key} expects one of {}", strategy_names()))?;
            Ok(Value::String(strategy.as_str().to_string()))
        }
        KeyKind::OutputMode => match OutputMode::from_name(raw) {
            Some(_) => Ok(Value::String(raw.trim().to_ascii_lowercase())),
            None => bail!("{key} expects pretty, text, or json"),
        },
    }
}

fn strategy_names() -> String {
    ResolutionStrategy::ALL
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn load_toml_table(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(Value::Table(toml::map::Map::new()));
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let value: Value =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;

    if !value.is_table() {
        bail!("{} must contain a top-level TOML table", path.display());
    }

    Ok(value)
}

fn write_toml_table(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let serialized = toml::to_string_pretty(value)?;
    std::fs::write(path, serialized).with_context(|| format!("Failed to write {}", path.display()))
}

fn print_toml_or_json(value: &Value, output: OutputMode) -> Result<()> {
    let rendered = toml::to_string_pretty(value)?;
    render_mode(
        output,
        value,
        |_, w| write!(w, "{rendered}"),
        |_, w| write!(w, "{rendered}"),
    )
}

fn print_effective(value: &EffectiveConfig, output: OutputMode) -> Result<()> {
    let project = &value.project;
    render_mode(
        output,
        value,
        |v, w| {
            writeln!(w, "resolved_output={}", v.resolved_output)?;
            writeln!(w, "storage.capacity_bytes={}", project.storage.capacity_bytes)?;
            writeln!(w, "storage.db_file={}", project.storage.db_file)?;
            writeln!(w, "points.direction={}", project.points.direction)?;
            writeln!(w, "points.waypoint={}", project.points.waypoint)?;
            writeln!(w, "points.step={}", project.points.step)?;
            writeln!(w, "points.daily_baseline={}", project.points.daily_baseline)?;
            writeln!(w, "migration.default_strategy={}", project.migration.default_strategy)?;
            if let Some(remote) = &project.migration.remote_file {
                writeln!(w, "migration.remote_file={}", remote.display())?;
            }
            if let Some(out) = &v.user.output {
                writeln!(w, "user.output={out}")?;
            }
            if let Some(owner) = &v.user.owner {
                writeln!(w, "user.owner={owner}")?;
            }
            Ok(())
        },
        |v, w| {
            writeln!(w, "resolved_output = \"{}\"", v.resolved_output)?;
            writeln!(w)?;
            writeln!(w, "[storage]")?;
            writeln!(w, "capacity_bytes = {}", project.storage.capacity_bytes)?;
            writeln!(w, "db_file = \"{}\"", project.storage.db_file)?;
            writeln!(w)?;
            writeln!(w, "[points]")?;
            writeln!(w, "direction = {}", project.points.direction)?;
            writeln!(w, "waypoint = {}", project.points.waypoint)?;
            writeln!(w, "step = {}", project.points.step)?;
            writeln!(w, "daily_baseline = {}", project.points.daily_baseline)?;
            writeln!(w)?;
            writeln!(w, "[migration]")?;
            writeln!(w, "default_strategy = \"{}\"", project.migration.default_strategy)?;
            if let Some(remote) = &project.migration.remote_file {
                writeln!(w, "remote_file = \"{}\"", remote.display())?;
            }
            writeln!(w)?;
            writeln!(w, "[user]")?;
            if let Some(out) = &v.user.output {
                writeln!(w, "output = \"{out}\"")?;
            }
            if let Some(owner) = &v.user.owner {
                writeln!(w, "owner = \"{owner}\"")?;
            }
            Ok(())
        },
    )
}

fn render_mutation(output: OutputMode, action: &str, scope: ConfigScope, key: &str) -> Result<()> {
    let report = serde_json::json!({
        "ok": true,
        "action": action,
        "scope": scope_label(scope),
        "key": key,
    });
    render_mode(
        output,
        &report,
        |_, w| {
            writeln!(
                w,
                "ok=true action={action} scope={} key={key}",
                scope_label(scope)
            )
        },
        |_, w| {
            writeln!(
                w,
                "{} {key} in {} config",
                action_to_title(action),
                scope_label(scope)
            )
        },
    )
}

fn action_to_title(action: &str) -> &'static str {
    match action {
        "set" => "Set",
        "unset" => "Unset",
        _ => "Updated",
    }
}

fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(DATA_DIR).join("config.toml")
}

fn user_config_path() -> Result<PathBuf> {
    let config_dir =
        dirs::config_dir().ok_or_else(|| anyhow!("Unable to resolve user config directory"))?;
    Ok(config_dir.join("waypoints/config.toml"))
}

const fn scope_label(scope: ConfigScope) -> &'static str {
    match scope {
        ConfigScope::Project => "project",
        ConfigScope::User => "user",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> Value {
        Value::Table(toml::map::Map::new())
    }

    #[test]
    fn project_keys_land_in_their_section() {
        let mut root = empty();
        apply_set(&mut root, ConfigScope::Project, "points.step", "7").expect("set");
        apply_set(
            &mut root,
            ConfigScope::Project,
            "migration.default_strategy",
            "keep-local",
        )
        .expect("set");
        assert_eq!(root["points"]["step"].as_integer(), Some(7));
        assert_eq!(
            root["migration"]["default_strategy"].as_str(),
            Some("keep_local")
        );
    }

    #[test]
    fn user_keys_are_top_level() {
        let mut root = empty();
        apply_set(&mut root, ConfigScope::User, "user.owner", "acct-1").expect("set");
        assert_eq!(root["owner"].as_str(), Some("acct-1"));
        apply_unset(&mut root, ConfigScope::User, "user.owner").expect("unset");
        assert!(root.get("owner").is_none());
    }

    #[test]
    fn unset_drops_empty_sections() {
        let mut root = empty();
        apply_set(&mut root, ConfigScope::Project, "storage.db_file", "alt.db").expect("set");
        apply_unset(&mut root, ConfigScope::Project, "storage.db_file").expect("unset");
        assert!(root.get("storage").is_none());
    }

    #[test]
    fn bad_values_and_keys_are_rejected() {
        let mut root = empty();
        assert!(apply_set(&mut root, ConfigScope::Project, "points.step", "-1").is_err());
        assert!(
            apply_set(&mut root, ConfigScope::Project, "migration.default_strategy", "coin").is_err()
        );
        assert!(apply_set(&mut root, ConfigScope::User, "user.output", "yaml").is_err());
        assert!(apply_set(&mut root, ConfigScope::Project, "user.owner", "x").is_err());
        assert!(apply_set(&mut root, ConfigScope::Project, "points", "1").is_err());
    }

    #[test]
    fn written_project_config_loads_back() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = project_config_path(dir.path());
        let mut root = load_toml_table(&path).expect("missing file is empty");
        apply_set(&mut root, ConfigScope::Project, "points.daily_baseline", "20").expect("set");
        write_toml_table(&path, &root).expect("write");

        let loaded = waypoints_core::config::load_project_config(dir.path()).expect("load");
        assert_eq!(loaded.points.daily_baseline, 20);
        assert_eq!(loaded.points.step, 5);
    }
}
