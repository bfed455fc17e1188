use crate::cmd::show::{item_line, item_row};
use crate::output::{CommandError, OutputMode, render_mode};
use crate::project::{Project, resolve_item};
use anyhow::Result;
use clap::Args;
use std::io::Write;

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Deleted item ID (full or unique prefix).
    pub id: String,
}

pub fn run_restore(args: &RestoreArgs, output: OutputMode, project: &Project) -> Result<()> {
    let tracker = project.open()?;
    let item = resolve_item(&tracker, &args.id, true)?;
    if item.is_active() {
        return render_mode(
            output,
            &item,
            |i, w| item_row(w, i),
            |i, w| writeln!(w, "· {}  (not deleted)", item_line(i)),
        );
    }

    let restored = tracker
        .items()
        .restore(&item.id)?
        .ok_or_else(|| CommandError::NotFound(item.id.clone()))?;

    render_mode(
        output,
        &restored,
        |i, w| item_row(w, i),
        |i, w| writeln!(w, "✓ Restored {}", item_line(i)),
    )
}
