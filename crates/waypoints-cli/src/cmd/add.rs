use crate::cmd::show::{item_line, item_row};
use crate::output::{CommandError, OutputMode, render_mode};
use crate::project::{Project, resolve_parent, short_id};
use anyhow::Result;
use clap::Args;
use std::io::Write;
use tracing::debug;
use waypoints_core::validate::NewItem;

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Item text.
    pub text: String,

    /// Item kind: direction, waypoint, or step.
    #[arg(short, long, default_value = "step")]
    pub kind: String,

    /// Parent item ID (full or unique prefix).
    #[arg(short, long)]
    pub parent: Option<String>,

    /// Position among siblings (default: after the last one).
    #[arg(long, allow_negative_numbers = true)]
    pub position: Option<i64>,

    /// Points awarded on completion (default: the kind's value).
    #[arg(long, allow_negative_numbers = true)]
    pub points: Option<i64>,
}

pub fn run_add(args: &AddArgs, output: OutputMode, project: &Project) -> Result<()> {
    let tracker = project.open()?;

    let parent_id = args
        .parent
        .as_deref()
        .map(|raw| resolve_parent(&tracker, raw))
        .transpose()?;

    let input = NewItem {
        text: args.text.clone(),
        kind: args.kind.clone(),
        parent_id,
        position: args.position,
        points: args.points,
        owner_id: None,
    };
    let created = tracker.create(&input)?;
    debug!(id = %created.id, "item created");

    let enriched = tracker
        .links()
        .enrich(std::slice::from_ref(&created))?
        .pop()
        .ok_or_else(|| CommandError::NotFound(created.id.clone()))?;

    render_mode(
        output,
        &enriched,
        |e, w| item_row(w, &e.item),
        |e, w| {
            writeln!(w, "✓ Added {}", item_line(&e.item))?;
            if let Some(linked) = &e.linked_instances {
                writeln!(
                    w,
                    "  linked with {} other instance(s) of \"{}\"",
                    linked.len(),
                    e.item.text
                )?;
                for l in linked {
                    let under = l.parent_text.as_deref().unwrap_or("(root)");
                    writeln!(w, "    {}  under {under}", short_id(&l.id))?;
                }
            }
            Ok(())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_args_defaults() {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            args: AddArgs,
        }
        let w = Wrapper::parse_from(["test", "Design"]);
        assert_eq!(w.args.text, "Design");
        assert_eq!(w.args.kind, "step");
        assert!(w.args.parent.is_none());
        assert!(w.args.points.is_none());
    }

    #[test]
    fn add_args_accept_negative_points_for_validation() {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            args: AddArgs,
        }
        let w = Wrapper::parse_from(["test", "Bad", "--points", "-3"]);
        assert_eq!(w.args.points, Some(-3));
    }
}
