use crate::cmd::show::{item_line, item_row};
use crate::output::{CommandError, OutputMode, render_mode};
use crate::project::{Project, resolve_item, resolve_parent};
use anyhow::{Result, bail};
use clap::Args;
use std::io::Write;

#[derive(Args, Debug)]
pub struct MoveArgs {
    /// Item ID (full or unique prefix).
    pub id: String,

    /// New parent item ID.
    #[arg(short, long, conflicts_with = "root")]
    pub parent: Option<String>,

    /// Make the item a top-level item.
    #[arg(long)]
    pub root: bool,

    /// New position among siblings (default: after the last one).
    #[arg(long, allow_negative_numbers = true)]
    pub position: Option<i64>,
}

pub fn run_move(args: &MoveArgs, output: OutputMode, project: &Project) -> Result<()> {
    if args.parent.is_none() && !args.root && args.position.is_none() {
        bail!("nothing to move: pass --parent, --root, or --position");
    }

    let tracker = project.open()?;
    let item = resolve_item(&tracker, &args.id, false)?;

    let parent = match (&args.parent, args.root) {
        (Some(raw), _) => Some(resolve_parent(&tracker, raw)?),
        (None, true) => None,
        // Reorder in place.
        (None, false) => item.parent_id.clone(),
    };

    let moved = tracker
        .items()
        .move_item(&item.id, parent.as_deref(), args.position)?
        .ok_or_else(|| CommandError::NotFound(item.id.clone()))?;

    render_mode(
        output,
        &moved,
        |i, w| item_row(w, i),
        |i, w| {
            writeln!(w, "✓ Moved {}", item_line(i))?;
            match &i.parent_id {
                Some(pid) => writeln!(w, "  parent {pid}, position {}", i.position),
                None => writeln!(w, "  top level, position {}", i.position),
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: MoveArgs,
    }

    #[test]
    fn parent_and_root_conflict() {
        assert!(Wrapper::try_parse_from(["test", "a", "--parent", "b", "--root"]).is_err());
        let w = Wrapper::parse_from(["test", "a", "--root", "--position", "2"]);
        assert!(w.args.root);
        assert_eq!(w.args.position, Some(2));
    }
}
