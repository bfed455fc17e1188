use crate::cmd::show::{item_line, item_row};
use crate::output::{CommandError, OutputMode, render_mode};
use crate::project::{Project, resolve_item};
use anyhow::Result;
use clap::Args;
use std::io::Write;
use tracing::debug;
use waypoints_core::EditOutcome;
use waypoints_core::validate::ItemPatch;

#[derive(Args, Debug)]
pub struct DoneArgs {
    /// Item ID (full or unique prefix).
    pub id: String,

    /// Complete every linked instance of the item's text.
    #[arg(long)]
    pub sync_linked: bool,
}

/// Flip completion on one item or its whole linked group.
pub(crate) fn toggle(
    project: &Project,
    id: &str,
    completed: bool,
    sync_linked: bool,
) -> Result<EditOutcome> {
    let tracker = project.open()?;
    let item = resolve_item(&tracker, id, false)?;

    if sync_linked {
        return Ok(tracker.edit(&item.id, &ItemPatch::completed(completed), true)?);
    }

    let change = if completed {
        tracker.complete(&item.id)?
    } else {
        tracker.uncomplete(&item.id)?
    };
    let change = change.ok_or_else(|| CommandError::NotFound(item.id.clone()))?;
    debug!(id = %item.id, completed, "completion toggled");
    Ok(EditOutcome {
        items: vec![change.item.clone()],
        completions: vec![change],
    })
}

pub fn run_done(args: &DoneArgs, output: OutputMode, project: &Project) -> Result<()> {
    let outcome = toggle(project, &args.id, true, args.sync_linked)?;

    render_mode(
        output,
        &outcome,
        |o, w| {
            for item in &o.items {
                item_row(w, item)?;
            }
            Ok(())
        },
        |o, w| {
            for c in &o.completions {
                match &c.recorded {
                    Some(record) => writeln!(
                        w,
                        "✓ {}  (+{} pts)",
                        item_line(&c.item),
                        record.points_earned
                    )?,
                    None => writeln!(w, "· {}  (already done)", item_line(&c.item))?,
                }
            }
            Ok(())
        },
    )
}
