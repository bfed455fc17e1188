use crate::output::{OutputMode, pretty_kv, render_mode};
use crate::project::Project;
use anyhow::Result;
use clap::Args;
use std::io::Write;
use waypoints_core::validate::NewBaseline;

#[derive(Args, Debug)]
pub struct BaselineArgs {
    /// Day (YYYY-MM-DD, UTC). Defaults to today.
    #[arg(long)]
    pub date: Option<String>,

    /// Baseline points, used only if the day has no baseline yet.
    #[arg(long, allow_negative_numbers = true)]
    pub points: Option<i64>,
}

/// Execute `wp baseline`. Ensures a baseline row exists for the day; an
/// existing row is returned unchanged.
pub fn run_baseline(args: &BaselineArgs, output: OutputMode, project: &Project) -> Result<()> {
    let tracker = project.open()?;
    let date = args
        .date
        .clone()
        .unwrap_or_else(|| tracker.today().format("%Y-%m-%d").to_string());
    let points = args
        .points
        .unwrap_or_else(|| i64::from(project.config.project.points.daily_baseline));

    let record = tracker.baselines().ensure(&NewBaseline {
        owner_id: tracker.owner_id().map(str::to_string),
        date,
        baseline_points: points,
    })?;

    render_mode(
        output,
        &record,
        |r, w| writeln!(w, "{}\t{}\t{}", r.id, r.date, r.baseline_points),
        |r, w| {
            pretty_kv(w, "date", r.date.to_string())?;
            pretty_kv(w, "baseline", r.baseline_points.to_string())?;
            pretty_kv(w, "created", r.created_at.to_rfc3339())
        },
    )
}
