use crate::output::{OutputMode, pretty_kv, render_mode};
use crate::project::Project;
use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;
use waypoints_core::clock::SystemClock;
use waypoints_core::migration::{SnapshotCounts, SnapshotReport, export_snapshot, validate_snapshot};

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Write the snapshot here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportReport {
    path: String,
    counts: SnapshotCounts,
    validation: SnapshotReport,
}

/// Execute `wp export`: a full snapshot of every bucket, soft-deleted rows
/// included, in the same shape migration sends.
pub fn run_export(args: &ExportArgs, output: OutputMode, project: &Project) -> Result<()> {
    let tracker = project.open()?;
    let snapshot = export_snapshot(tracker.store(), &SystemClock)?;
    let validation = validate_snapshot(&snapshot);
    for issue in &validation.errors {
        warn!(%issue, "snapshot failed validation");
    }

    let Some(path) = &args.output else {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        serde_json::to_writer_pretty(&mut out, &snapshot)?;
        writeln!(out)?;
        return Ok(());
    };

    let body = serde_json::to_string_pretty(&snapshot).context("Failed to encode snapshot")?;
    std::fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))?;

    let report = ExportReport {
        path: path.display().to_string(),
        counts: snapshot.counts,
        validation,
    };
    render_mode(
        output,
        &report,
        |r, w| {
            writeln!(w, "path={}", r.path)?;
            writeln!(w, "items={}", r.counts.items)?;
            writeln!(w, "achievements={}", r.counts.achievements)?;
            writeln!(w, "daily_baselines={}", r.counts.daily_baselines)?;
            writeln!(w, "valid={}", r.validation.is_valid())
        },
        |r, w| {
            writeln!(w, "✓ Exported snapshot to {}", r.path)?;
            pretty_kv(w, "items", r.counts.items.to_string())?;
            pretty_kv(w, "achievements", r.counts.achievements.to_string())?;
            pretty_kv(w, "baselines", r.counts.daily_baselines.to_string())?;
            for issue in &r.validation.errors {
                writeln!(w, "  ✗ {issue}")?;
            }
            for warning in &r.validation.warnings {
                writeln!(w, "  ! {warning}")?;
            }
            Ok(())
        },
    )
}
