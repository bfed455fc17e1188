use crate::output::{OutputMode, render_mode};
use crate::project::Project;
use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::io::Write;
use waypoints_core::config;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite `.gitignore` even if `.waypoints/` already exists.
    #[arg(long)]
    pub force: bool,
}

const GITIGNORE: &str = "waypoints.db\nwaypoints.db-wal\nwaypoints.db-shm\nremote.json\n";

#[derive(Debug, Serialize)]
struct InitReport {
    data_dir: String,
    db: String,
    config_written: bool,
    already_initialized: bool,
}

/// Execute `wp init`. Creates the project skeleton:
///
/// ```text
/// .waypoints/
///   config.toml     (default project config, never overwritten)
///   waypoints.db    (SQLite key/value store)
///   .gitignore      (database files, local remote stand-in)
/// ```
///
/// Running it again is harmless.
///
/// # Errors
///
/// Returns an error if any filesystem operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project: &Project) -> Result<()> {
    let data_dir = project.data_dir();
    let already_initialized = data_dir.is_dir();

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    let config_written = config::write_default_project_config(&project.root)?;

    let gitignore_path = data_dir.join(".gitignore");
    if args.force || !gitignore_path.exists() {
        std::fs::write(&gitignore_path, GITIGNORE)
            .with_context(|| format!("Failed to write {}", gitignore_path.display()))?;
    }

    // Opening creates the database and applies schema migrations.
    project.open_unchecked()?;

    let report = InitReport {
        data_dir: data_dir.display().to_string(),
        db: project.db_path().display().to_string(),
        config_written,
        already_initialized,
    };

    render_mode(
        output,
        &report,
        |r, w| {
            writeln!(w, "data_dir={}", r.data_dir)?;
            writeln!(w, "db={}", r.db)?;
            writeln!(w, "config_written={}", r.config_written)
        },
        |r, w| {
            if r.already_initialized {
                writeln!(w, "✓ {} already initialized.", r.data_dir)?;
            } else {
                writeln!(w, "✓ Initialized {}.", r.data_dir)?;
            }
            writeln!(w)?;
            writeln!(w, "  Store:  {}", r.db)?;
            writeln!(w, "  Config: .waypoints/config.toml")?;
            writeln!(w)?;
            writeln!(w, "Next steps:")?;
            writeln!(w, "  wp add \"Ship v1\" --kind direction")?;
            writeln!(w, "  wp list")
        },
    )
}
