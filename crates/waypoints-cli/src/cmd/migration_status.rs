use crate::cmd::migrate::account_id;
use crate::output::{OutputMode, pretty_kv, render_mode};
use crate::project::Project;
use anyhow::Result;
use clap::Args;
use std::io::{self, Write};
use waypoints_core::migration::{MemoryRemote, MigrationStatusRecord};

#[derive(Args, Debug)]
pub struct MigrationStatusArgs {
    /// Account to inspect. Omit to list every tracked account.
    pub account: Option<String>,

    /// Move a failed attempt back to pending so it can be rerun.
    #[arg(long)]
    pub reset: bool,
}

fn write_record(w: &mut dyn Write, r: &MigrationStatusRecord) -> io::Result<()> {
    writeln!(
        w,
        "{}\t{}\t{}\t{}",
        r.account_id,
        r.state,
        r.attempts,
        r.error.as_deref().unwrap_or("-")
    )
}

fn pretty_record(w: &mut dyn Write, r: &MigrationStatusRecord) -> io::Result<()> {
    writeln!(w, "{}", r.account_id)?;
    pretty_kv(w, "state", r.state.as_str())?;
    pretty_kv(w, "attempts", r.attempts.to_string())?;
    if let Some(at) = r.started_at {
        pretty_kv(w, "started", at.to_rfc3339())?;
    }
    if let Some(at) = r.finished_at {
        pretty_kv(w, "finished", at.to_rfc3339())?;
    }
    if let Some(error) = &r.error {
        pretty_kv(w, "error", error)?;
    }
    if let Some(result) = &r.result {
        pretty_kv(
            w,
            "migrated",
            format!(
                "{} item(s), {} achievement(s), {} baseline(s)",
                result.items_migrated, result.achievements_migrated, result.baselines_migrated
            ),
        )?;
    }
    Ok(())
}

/// Execute `wp migration-status`. Reads and resets only touch the local
/// status bucket; the remote is never contacted.
pub fn run_migration_status(
    args: &MigrationStatusArgs,
    output: OutputMode,
    project: &Project,
) -> Result<()> {
    let tracker = project.open()?;
    let pipeline = tracker.migration(MemoryRemote::new());

    let records: Vec<MigrationStatusRecord> = if args.reset {
        let account = account_id(args.account.as_deref(), project)?;
        vec![pipeline.reset(&account)?]
    } else if args.account.is_some() {
        let account = account_id(args.account.as_deref(), project)?;
        pipeline.status().get(&account)?.into_iter().collect()
    } else {
        pipeline.status().list()?
    };

    render_mode(
        output,
        &records,
        |records, w| {
            for r in records {
                write_record(w, r)?;
            }
            Ok(())
        },
        |records, w| {
            if records.is_empty() {
                return writeln!(w, "No migrations recorded.");
            }
            for (i, r) in records.iter().enumerate() {
                if i > 0 {
                    writeln!(w)?;
                }
                pretty_record(w, r)?;
            }
            Ok(())
        },
    )
}
