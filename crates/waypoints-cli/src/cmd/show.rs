use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use crate::project::{Project, resolve_item, short_id};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::{self, Write};
use waypoints_core::autolink::EnrichedItem;
use waypoints_core::model::{AchievementRecord, Item};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Item ID (full or unique prefix).
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShowReport {
    #[serde(flatten)]
    item: EnrichedItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_text: Option<String>,
    children: Vec<Item>,
    achievements: Vec<AchievementRecord>,
}

/// `[x]`/`[ ]` checkbox, kind, points, short id, and text on one line.
pub fn item_line(item: &Item) -> String {
    let mark = if item.completed { "[x]" } else { "[ ]" };
    let deleted = if item.is_active() { "" } else { " (deleted)" };
    format!(
        "{mark} {:<9} {:>4} pts  {}  {}{deleted}",
        item.kind.as_str(),
        item.points,
        short_id(&item.id),
        item.text
    )
}

/// Tab-separated row: id, kind, points, completed, parent, text.
pub fn item_row(w: &mut dyn Write, item: &Item) -> io::Result<()> {
    writeln!(
        w,
        "{}\t{}\t{}\t{}\t{}\t{}",
        item.id,
        item.kind,
        item.points,
        item.completed,
        item.parent_id.as_deref().unwrap_or("-"),
        item.text
    )
}

pub fn run_show(args: &ShowArgs, output: OutputMode, project: &Project) -> Result<()> {
    let tracker = project.open()?;
    let item = resolve_item(&tracker, &args.id, true)?;

    let parent_text = match item.parent_id.as_deref() {
        Some(pid) => tracker.items().get_by_id(pid, true)?.map(|p| p.text),
        None => None,
    };
    let children = tracker.items().get_children(&item.id, false)?;
    let achievements = tracker.ledger().list_for_item(&item.id)?;
    let enriched = tracker
        .links()
        .enrich(std::slice::from_ref(&item))?
        .pop()
        .unwrap_or(EnrichedItem {
            item,
            linked_instances: None,
            is_canonical: None,
        });

    let report = ShowReport {
        item: enriched,
        parent_text,
        children,
        achievements,
    };

    render_mode(
        output,
        &report,
        |r, w| {
            item_row(w, &r.item.item)?;
            for child in &r.children {
                write!(w, "child\t")?;
                item_row(w, child)?;
            }
            for a in &r.achievements {
                writeln!(w, "achievement\t{}\t{}\t{}", a.id, a.points_earned, a.achieved_at.to_rfc3339())?;
            }
            Ok(())
        },
        |r, w| {
            let item = &r.item.item;
            pretty_section(w, &item.text)?;
            pretty_kv(w, "id", &item.id)?;
            pretty_kv(w, "kind", item.kind.as_str())?;
            pretty_kv(w, "points", item.points.to_string())?;
            pretty_kv(w, "completed", completed_label(item))?;
            match (&item.parent_id, &r.parent_text) {
                (Some(pid), Some(text)) => pretty_kv(w, "parent", format!("{text} ({})", short_id(pid)))?,
                (Some(pid), None) => pretty_kv(w, "parent", format!("{} (missing)", short_id(pid)))?,
                (None, _) => pretty_kv(w, "parent", "(root)")?,
            }
            pretty_kv(w, "created", item.created_at.to_rfc3339())?;
            if let Some(deleted) = item.deleted_at {
                pretty_kv(w, "deleted", deleted.to_rfc3339())?;
            }

            if let Some(linked) = &r.item.linked_instances {
                writeln!(w)?;
                let role = if r.item.is_canonical == Some(true) {
                    "canonical"
                } else {
                    "linked"
                };
                writeln!(w, "Linked instances ({role}):")?;
                for l in linked {
                    let under = l.parent_text.as_deref().unwrap_or("(root)");
                    writeln!(w, "  {}  under {under}", short_id(&l.id))?;
                }
            }

            if !r.children.is_empty() {
                writeln!(w)?;
                writeln!(w, "Children:")?;
                for child in &r.children {
                    writeln!(w, "  {}", item_line(child))?;
                }
            }

            if !r.achievements.is_empty() {
                writeln!(w)?;
                writeln!(w, "Achievements:")?;
                for a in &r.achievements {
                    writeln!(w, "  +{} pts at {}", a.points_earned, a.achieved_at.to_rfc3339())?;
                }
            }
            Ok(())
        },
    )
}

fn completed_label(item: &Item) -> String {
    match item.completed_at {
        Some(at) if item.completed => format!("yes ({})", at.to_rfc3339()),
        _ if item.completed => "yes".to_string(),
        _ => "no".to_string(),
    }
}
