use crate::output::{CommandError, OutputMode, pretty_kv, pretty_section, render_mode};
use crate::project::{Project, short_id};
use anyhow::Result;
use clap::Args;
use std::io::{self, Write};
use std::path::PathBuf;
use waypoints_core::migration::{JsonFileRemote, MigrationOutcome, MigrationResult, ResolutionStrategy};
use waypoints_core::validate::{ValidationErrors, check_id};

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Remote account to migrate into (default: the configured owner).
    pub account: Option<String>,

    /// Conflict strategy: keep_local, keep_cloud, keep_both, keep_newest,
    /// or manual_review (default from project config).
    #[arg(short, long)]
    pub strategy: Option<ResolutionStrategy>,

    /// JSON file standing in for the remote store.
    #[arg(long)]
    pub remote: Option<PathBuf>,
}

/// Account argument, else `--owner`/config owner.
pub(crate) fn account_id(explicit: Option<&str>, project: &Project) -> Result<String> {
    let account = explicit
        .or(project.owner.as_deref())
        .unwrap_or_default()
        .trim()
        .to_string();
    check_id("accountId", &account).map_err(ValidationErrors::single)?;
    Ok(account)
}

fn write_result(w: &mut dyn Write, r: &MigrationResult) -> io::Result<()> {
    pretty_kv(w, "items", r.items_migrated.to_string())?;
    pretty_kv(w, "achievements", r.achievements_migrated.to_string())?;
    pretty_kv(w, "baselines", r.baselines_migrated.to_string())?;
    pretty_kv(
        w,
        "conflicts",
        format!(
            "{} (kept local {}, kept cloud {}, duplicated {})",
            r.conflicts, r.kept_local, r.kept_remote, r.duplicated
        ),
    )?;
    if r.remote_deleted > 0 {
        pretty_kv(w, "replaced", r.remote_deleted.to_string())?;
    }
    for warning in &r.warnings {
        writeln!(w, "  ! {warning}")?;
    }
    for error in &r.errors {
        writeln!(w, "  ✗ {error}")?;
    }
    Ok(())
}

/// Execute `wp migrate`.
///
/// A `manual_review` run that finds conflicts prints them, leaves the
/// attempt failed, and exits non-zero. Reset with
/// `wp migration-status <account> --reset` and rerun with another strategy.
pub fn run_migrate(args: &MigrateArgs, output: OutputMode, project: &Project) -> Result<()> {
    let account = account_id(args.account.as_deref(), project)?;
    let strategy = args
        .strategy
        .unwrap_or(project.config.project.migration.default_strategy);
    let remote = JsonFileRemote::new(project.remote_path(args.remote.as_deref()));

    let tracker = project.open()?;
    let outcome = tracker.migration(remote).run(&account, strategy)?;

    render_mode(
        output,
        &outcome,
        |o: &MigrationOutcome, w| {
            writeln!(w, "account={}", o.account_id)?;
            writeln!(w, "strategy={}", o.strategy)?;
            writeln!(w, "state={}", o.state)?;
            writeln!(w, "items={}", o.result.items_migrated)?;
            writeln!(w, "achievements={}", o.result.achievements_migrated)?;
            writeln!(w, "baselines={}", o.result.baselines_migrated)?;
            writeln!(w, "conflicts={}", o.result.conflicts)?;
            for c in &o.unresolved {
                writeln!(w, "unresolved\t{}\t{}\t{}", c.reason, c.local.id, c.remote.id)?;
            }
            Ok(())
        },
        |o: &MigrationOutcome, w| {
            pretty_section(w, &format!("Migration to {} ({})", o.account_id, o.strategy))?;
            pretty_kv(w, "state", o.state.as_str())?;
            write_result(w, &o.result)?;
            if !o.skipped.is_empty() {
                pretty_kv(w, "skipped", format!("{} row(s) owned by other accounts", o.skipped.len()))?;
            }
            if !o.unresolved.is_empty() {
                writeln!(w)?;
                writeln!(w, "Needs review:")?;
                for c in &o.unresolved {
                    writeln!(
                        w,
                        "  {:<10} local {} \"{}\"  remote {} \"{}\"",
                        c.reason.as_str(),
                        short_id(&c.local.id),
                        c.local.text,
                        short_id(&c.remote.id),
                        c.remote.text
                    )?;
                }
            }
            Ok(())
        },
    )?;

    if outcome.unresolved.is_empty() {
        Ok(())
    } else {
        Err(CommandError::ManualReview(outcome.unresolved.len(), outcome.account_id).into())
    }
}
