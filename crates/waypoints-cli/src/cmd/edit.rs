use crate::cmd::show::{item_line, item_row};
use crate::output::{OutputMode, render_mode};
use crate::project::{Project, resolve_item};
use anyhow::{Result, bail};
use clap::Args;
use std::io::Write;
use waypoints_core::validate::ItemPatch;

#[derive(Args, Debug)]
pub struct EditArgs {
    /// Item ID (full or unique prefix).
    pub id: String,

    /// New text.
    #[arg(short, long)]
    pub text: Option<String>,

    /// New kind: direction, waypoint, or step.
    #[arg(short, long)]
    pub kind: Option<String>,

    /// New point value.
    #[arg(long, allow_negative_numbers = true)]
    pub points: Option<i64>,

    /// New position among siblings.
    #[arg(long, allow_negative_numbers = true)]
    pub position: Option<i64>,

    /// Apply the change to every linked instance of the item's text.
    #[arg(long)]
    pub sync_linked: bool,
}

impl EditArgs {
    fn patch(&self) -> ItemPatch {
        ItemPatch {
            text: self.text.clone(),
            kind: self.kind.clone(),
            position: self.position,
            completed: None,
            points: self.points,
        }
    }
}

pub fn run_edit(args: &EditArgs, output: OutputMode, project: &Project) -> Result<()> {
    let patch = args.patch();
    if patch.is_empty() {
        bail!("nothing to change: pass --text, --kind, --points, or --position");
    }

    let tracker = project.open()?;
    let item = resolve_item(&tracker, &args.id, false)?;
    let outcome = tracker.edit(&item.id, &patch, args.sync_linked)?;

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
            writeln!(w, "✓ Updated {} item(s)", o.items.len())?;
            for item in &o.items {
                writeln!(w, "  {}", item_line(item))?;
            }
            Ok(())
        },
    )
}
