use crate::output::{OutputMode, render_mode};
use crate::project::{Project, resolve_item, short_id};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::Write;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Item ID (full or unique prefix).
    pub id: String,

    /// Also delete every other instance linked by the same text.
    #[arg(long, conflicts_with = "purge")]
    pub all_linked: bool,

    /// Permanently remove the item and its whole subtree, deleted or not.
    #[arg(long)]
    pub purge: bool,
}

#[derive(Debug, Serialize)]
struct DeleteReport {
    count: usize,
    ids: Vec<String>,
    purged: bool,
}

/// Execute `wp delete`.
///
/// Soft delete only marks the named item(s); children stay active and show
/// up at the top level of `wp list`. `--purge` is the only way rows leave
/// the store.
pub fn run_delete(args: &DeleteArgs, output: OutputMode, project: &Project) -> Result<()> {
    let tracker = project.open()?;
    let item = resolve_item(&tracker, &args.id, args.purge)?;

    let report = if args.purge {
        let ids = tracker.items().purge(&item.id)?;
        DeleteReport {
            count: ids.len(),
            ids,
            purged: true,
        }
    } else {
        let deletion = tracker.links().delete_group(&item.id, args.all_linked)?;
        DeleteReport {
            count: deletion.count,
            ids: deletion.ids,
            purged: false,
        }
    };

    render_mode(
        output,
        &report,
        |r, w| {
            for id in &r.ids {
                writeln!(w, "{id}")?;
            }
            Ok(())
        },
        |r, w| {
            let verb = if r.purged { "Purged" } else { "Deleted" };
            writeln!(w, "✓ {verb} {} item(s)", r.count)?;
            for id in &r.ids {
                writeln!(w, "  {}", short_id(id))?;
            }
            if !r.purged && r.count > 0 {
                writeln!(w, "  undo with `wp restore <id>`")?;
            }
            Ok(())
        },
    )
}
