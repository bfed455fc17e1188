use crate::cmd::show::item_line;
use crate::output::{CommandError, OutputMode, render_mode};
use crate::project::{Project, resolve_item, short_id};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::Write;
use waypoints_core::Tracker;
use waypoints_core::autolink::group_key;
use waypoints_core::model::Item;
use waypoints_core::store::SqliteStore;

#[derive(Args, Debug)]
pub struct LinksArgs {
    /// Item ID or item text. Omit to list every linked group.
    pub target: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkGroup {
    text: String,
    canonical_id: Option<String>,
    members: Vec<Item>,
}

impl LinkGroup {
    fn from_members(text: &str, members: Vec<Item>) -> Self {
        Self {
            text: text.to_string(),
            canonical_id: members.first().map(|i| i.id.clone()),
            members,
        }
    }
}

/// The group for an id (exact or prefix), falling back to a text lookup.
fn group_for(tracker: &Tracker<SqliteStore>, target: &str) -> Result<LinkGroup> {
    let text = match resolve_item(tracker, target, false) {
        Ok(item) => item.text,
        Err(err) if matches!(err.downcast_ref::<CommandError>(), Some(CommandError::NotFound(_))) => {
            target.to_string()
        }
        Err(err) => return Err(err),
    };
    let members = tracker.links().find_group(&text)?;
    if members.is_empty() {
        return Err(CommandError::NotFound(target.to_string()).into());
    }
    Ok(LinkGroup::from_members(&text, members))
}

fn all_groups(tracker: &Tracker<SqliteStore>) -> Result<Vec<LinkGroup>> {
    let mut seen = BTreeSet::new();
    let mut groups = Vec::new();
    for item in tracker.items().get_all_active()? {
        if !seen.insert(group_key(&item.text)) {
            continue;
        }
        let members = tracker.links().find_group(&item.text)?;
        if members.len() > 1 {
            groups.push(LinkGroup::from_members(&item.text, members));
        }
    }
    groups.sort_by(|a, b| group_key(&a.text).cmp(&group_key(&b.text)));
    Ok(groups)
}

pub fn run_links(args: &LinksArgs, output: OutputMode, project: &Project) -> Result<()> {
    let tracker = project.open()?;
    let groups = match args.target.as_deref() {
        Some(target) => vec![group_for(&tracker, target)?],
        None => all_groups(&tracker)?,
    };

    render_mode(
        output,
        &groups,
        |groups, w| {
            for g in groups {
                for m in &g.members {
                    let role = if g.canonical_id.as_deref() == Some(m.id.as_str()) {
                        "canonical"
                    } else {
                        "linked"
                    };
                    writeln!(w, "{}\t{role}\t{}", m.id, m.text)?;
                }
            }
            Ok(())
        },
        |groups, w| {
            if groups.is_empty() {
                return writeln!(w, "No linked items.");
            }
            for g in groups {
                writeln!(w, "\"{}\"  ({} instances)", g.text, g.members.len())?;
                for m in &g.members {
                    let star = if g.canonical_id.as_deref() == Some(m.id.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    let under = m.parent_id.as_deref().map_or("(root)", short_id);
                    writeln!(w, "  {star} {}  under {under}", item_line(m))?;
                }
            }
            Ok(())
        },
    )
}
