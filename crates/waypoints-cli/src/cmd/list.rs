use crate::cmd::show::{item_line, item_row};
use crate::output::{OutputMode, render_mode};
use crate::project::Project;
use anyhow::Result;
use clap::Args;
use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use waypoints_core::autolink::EnrichedItem;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// List soft-deleted items instead of the active tree.
    #[arg(long)]
    pub deleted: bool,

    /// Hide completed items.
    #[arg(long)]
    pub open: bool,
}

/// An enriched item with its depth in the displayed tree.
struct Row<'a> {
    depth: usize,
    entry: &'a EnrichedItem,
}

/// Depth-first order by position. Items whose parent is missing or deleted
/// are shown at the top level.
fn tree_order(items: &[EnrichedItem]) -> Vec<Row<'_>> {
    let present: HashSet<&str> = items.iter().map(|e| e.item.id.as_str()).collect();
    let mut children: HashMap<Option<&str>, Vec<&EnrichedItem>> = HashMap::new();
    for entry in items {
        let parent = entry
            .item
            .parent_id
            .as_deref()
            .filter(|p| present.contains(p));
        children.entry(parent).or_default().push(entry);
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| {
            a.item
                .position
                .cmp(&b.item.position)
                .then(a.item.created_at.cmp(&b.item.created_at))
                .then(a.item.id.cmp(&b.item.id))
        });
    }

    let mut rows = Vec::with_capacity(items.len());
    let mut stack: Vec<(usize, &EnrichedItem)> = children
        .get(&None)
        .map(|roots| roots.iter().rev().map(|e| (0, *e)).collect())
        .unwrap_or_default();
    while let Some((depth, entry)) = stack.pop() {
        rows.push(Row { depth, entry });
        if let Some(kids) = children.get(&Some(entry.item.id.as_str())) {
            stack.extend(kids.iter().rev().map(|e| (depth + 1, *e)));
        }
    }
    rows
}

fn link_marker(entry: &EnrichedItem) -> String {
    match (&entry.linked_instances, entry.is_canonical) {
        (Some(linked), Some(true)) => format!("  [linked +{}, canonical]", linked.len()),
        (Some(linked), _) => format!("  [linked +{}]", linked.len()),
        (None, _) => String::new(),
    }
}

fn write_tree(w: &mut dyn Write, items: &[EnrichedItem]) -> io::Result<()> {
    if items.is_empty() {
        return writeln!(w, "No items. Add one with `wp add \"<text>\"`.");
    }
    for row in tree_order(items) {
        writeln!(
            w,
            "{}{}{}",
            "  ".repeat(row.depth),
            item_line(&row.entry.item),
            link_marker(row.entry)
        )?;
    }
    Ok(())
}

pub fn run_list(args: &ListArgs, output: OutputMode, project: &Project) -> Result<()> {
    let tracker = project.open()?;

    let mut items = if args.deleted {
        tracker.items().list_deleted()?
    } else {
        tracker.items().get_all_active()?
    };
    if args.open {
        items.retain(|i| !i.completed);
    }
    let enriched = tracker.links().enrich(&items)?;

    if args.deleted {
        return render_mode(
            output,
            &enriched,
            |list, w| {
                for e in list {
                    item_row(w, &e.item)?;
                }
                Ok(())
            },
            |list, w| {
                if list.is_empty() {
                    return writeln!(w, "Nothing in the trash.");
                }
                for e in list {
                    writeln!(w, "{}", item_line(&e.item))?;
                }
                Ok(())
            },
        );
    }

    render_mode(
        output,
        &enriched,
        |list, w| {
            for row in tree_order(list) {
                item_row(w, &row.entry.item)?;
            }
            Ok(())
        },
        |list, w| write_tree(w, list),
    )
}
