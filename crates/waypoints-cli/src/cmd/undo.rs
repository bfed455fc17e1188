use crate::cmd::done::toggle;
use crate::cmd::show::{item_line, item_row};
use crate::output::{OutputMode, render_mode};
use crate::project::Project;
use anyhow::Result;
use clap::Args;
use std::io::Write;

#[derive(Args, Debug)]
pub struct UndoArgs {
    /// Item ID (full or unique prefix).
    pub id: String,

    /// Reopen every linked instance of the item's text.
    #[arg(long)]
    pub sync_linked: bool,
}

/// Execute `wp undo`: mark an item incomplete and revoke its latest
/// achievement, so the day's total drops by exactly what was earned.
pub fn run_undo(args: &UndoArgs, output: OutputMode, project: &Project) -> Result<()> {
    let outcome = toggle(project, &args.id, false, args.sync_linked)?;

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
                match &c.revoked {
                    Some(record) => writeln!(
                        w,
                        "↺ {}  (-{} pts)",
                        item_line(&c.item),
                        record.points_earned
                    )?,
                    None => writeln!(w, "· {}  (not completed)", item_line(&c.item))?,
                }
            }
            Ok(())
        },
    )
}
