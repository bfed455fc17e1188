//! Locating the project, opening its store, and resolving item ids.

use crate::output::CommandError;
use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use waypoints_core::Tracker;
use waypoints_core::clock::SystemClock;
use waypoints_core::config::{self, EffectiveConfig};
use waypoints_core::id::UuidGenerator;
use waypoints_core::model::Item;
use waypoints_core::store::SqliteStore;

/// Everything a command needs besides its own arguments.
#[derive(Debug)]
pub struct Project {
    pub root: PathBuf,
    pub config: EffectiveConfig,
    /// `--owner`, else `owner` from the user config, else local.
    pub owner: Option<String>,
}

impl Project {
    pub fn new(root: PathBuf, config: EffectiveConfig, owner_flag: Option<String>) -> Self {
        let owner = owner_flag
            .or_else(|| config.user.owner.clone())
            .filter(|o| !o.trim().is_empty());
        Self {
            root,
            config,
            owner,
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        config::data_dir(&self.root)
    }

    pub fn db_path(&self) -> PathBuf {
        config::db_path(&self.root, &self.config.project)
    }

    /// Open the store of an initialized project.
    pub fn open(&self) -> Result<Tracker<SqliteStore>> {
        let dir = self.data_dir();
        if !dir.is_dir() {
            return Err(CommandError::NotInitialized(dir.display().to_string()).into());
        }
        self.open_unchecked()
    }

    /// Open (creating if needed) the store without requiring `wp init`.
    pub fn open_unchecked(&self) -> Result<Tracker<SqliteStore>> {
        let path = self.db_path();
        let store = SqliteStore::open(&path, self.config.project.storage.capacity())
            .with_context(|| format!("Failed to open store at {}", path.display()))?;
        let points = self.config.project.points;
        Ok(
            Tracker::new(store, Arc::new(SystemClock), Arc::new(UuidGenerator))
                .with_points(points.table(), points.daily_baseline)
                .for_owner(self.owner.clone()),
        )
    }

    /// Remote file for migration: flag, then config (relative to the
    /// project root), then `.waypoints/remote.json`.
    pub fn remote_path(&self, flag: Option<&Path>) -> PathBuf {
        let configured = flag.or(self.config.project.migration.remote_file.as_deref());
        match configured {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => self.root.join(path),
            None => self.data_dir().join("remote.json"),
        }
    }
}

/// Resolve a full id or a unique id prefix to an item.
pub fn resolve_item(
    tracker: &Tracker<SqliteStore>,
    input: &str,
    include_deleted: bool,
) -> Result<Item> {
    let input = input.trim();
    if let Some(item) = tracker.items().get_by_id(input, include_deleted)? {
        return Ok(item);
    }

    let mut matches: Vec<Item> = tracker
        .items()
        .get_all()?
        .into_iter()
        .filter(|i| include_deleted || i.is_active())
        .filter(|i| !input.is_empty() && i.id.starts_with(input))
        .collect();
    match matches.len() {
        0 => Err(CommandError::NotFound(input.to_string()).into()),
        1 => Ok(matches.remove(0)),
        n => Err(CommandError::Ambiguous {
            input: input.to_string(),
            matches: n,
        }
        .into()),
    }
}

/// Resolve a parent reference through id prefixes. An unknown parent is
/// passed through unchanged so the repository reports it as a bad reference.
pub fn resolve_parent(tracker: &Tracker<SqliteStore>, raw: &str) -> Result<String> {
    match resolve_item(tracker, raw, false) {
        Ok(parent) => Ok(parent.id),
        Err(err) if matches!(err.downcast_ref::<CommandError>(), Some(CommandError::NotFound(_))) => {
            Ok(raw.trim().to_string())
        }
        Err(err) => Err(err),
    }
}

/// First eight characters of an id, for human output.
pub fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(at, _)| &id[..at])
}
