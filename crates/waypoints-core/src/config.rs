use crate::migration::ResolutionStrategy;
use crate::model::{DEFAULT_BASELINE_POINTS, ItemKind, PointTable};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

/// Directory holding project data, relative to the project root.
pub const DATA_DIR: &str = ".waypoints";

/// Mirrors the quota a browser grants local storage.
pub const DEFAULT_CAPACITY_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub points: PointsConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Total bytes the store may hold; `0` disables the limit.
    #[serde(default = "default_capacity_bytes")]
    pub capacity_bytes: u64,
    #[serde(default = "default_db_file")]
    pub db_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: default_capacity_bytes(),
            db_file: default_db_file(),
        }
    }
}

impl StorageConfig {
    #[must_use]
    pub const fn capacity(&self) -> Option<u64> {
        if self.capacity_bytes == 0 {
            None
        } else {
            Some(self.capacity_bytes)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsConfig {
    #[serde(default = "default_direction_points")]
    pub direction: u32,
    #[serde(default = "default_waypoint_points")]
    pub waypoint: u32,
    #[serde(default = "default_step_points")]
    pub step: u32,
    #[serde(default = "default_daily_baseline")]
    pub daily_baseline: u32,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            direction: default_direction_points(),
            waypoint: default_waypoint_points(),
            step: default_step_points(),
            daily_baseline: default_daily_baseline(),
        }
    }
}

impl PointsConfig {
    #[must_use]
    pub const fn table(&self) -> PointTable {
        PointTable {
            direction: self.direction,
            waypoint: self.waypoint,
            step: self.step,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    #[serde(default)]
    pub default_strategy: ResolutionStrategy,
    /// JSON file standing in for the remote account store.
    #[serde(default)]
    pub remote_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
    /// Account id used for `--owner` when the flag is omitted.
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

#[must_use]
pub fn data_dir(project_root: &Path) -> PathBuf {
    project_root.join(DATA_DIR)
}

/// Location of the store database for `project_root`.
#[must_use]
pub fn db_path(project_root: &Path, config: &ProjectConfig) -> PathBuf {
    data_dir(project_root).join(&config.storage.db_file)
}

/// Load `.waypoints/config.toml`; a missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = data_dir(project_root).join("config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load `<config dir>/waypoints/config.toml`; missing yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("waypoints/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write the default project config, leaving an existing file alone.
///
/// Returns whether a file was written.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn write_default_project_config(project_root: &Path) -> Result<bool> {
    let dir = data_dir(project_root);
    let path = dir.join("config.toml");
    if path.exists() {
        return Ok(false);
    }
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let content = toml::to_string_pretty(&ProjectConfig::default())
        .context("Failed to render default config")?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}

/// Merge project config, user config, and output mode.
///
/// # Errors
///
/// Returns an error if either config file is unreadable.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.clone(), env_format);

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

fn resolve_output(cli_json: bool, user_output: Option<String>, env_format: Option<String>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "plain" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

const fn default_capacity_bytes() -> u64 {
    DEFAULT_CAPACITY_BYTES
}

fn default_db_file() -> String {
    "waypoints.db".to_string()
}

const fn default_direction_points() -> u32 {
    ItemKind::Direction.default_points()
}

const fn default_waypoint_points() -> u32 {
    ItemKind::Waypoint.default_points()
}

const fn default_step_points() -> u32 {
    ItemKind::Step.default_points()
}

const fn default_daily_baseline() -> u32 {
    DEFAULT_BASELINE_POINTS
}
