#![forbid(unsafe_code)]

mod cmd;
mod output;
mod project;

use clap::{Parser, Subcommand};
use output::{CliError, CommandError, OutputMode, render_error, resolve_output_mode};
use project::Project;
use std::env;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use waypoints_core::config::resolve_config;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "wp: local-first directions, waypoints, and steps",
    long_about = None
)]
struct Cli {
    /// Enable debug logging (unless WAYPOINTS_LOG is set).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output (same as `--format json`).
    #[arg(long, global = true)]
    json: bool,

    /// Output format. Defaults to pretty on a terminal, text when piped.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Account that owns new items and whose points are totalled.
    #[arg(long, global = true)]
    owner: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a waypoints project",
        long_about = "Create .waypoints/ with a default config and an empty store in the current directory.",
        after_help = "EXAMPLES:\n    # Initialize a project in the current directory\n    wp init\n\n    # Emit machine-readable output\n    wp init --json"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Show or change configuration",
        long_about = "Show the resolved configuration, or set and unset keys in the project or user config file.",
        after_help = "EXAMPLES:\n    # Show resolved config\n    wp config show\n\n    # Award 10 points per step\n    wp config set points.step 10\n\n    # Default owner for this machine\n    wp config set --scope user user.owner acct-42"
    )]
    Config(cmd::config::ConfigArgs),

    #[command(
        next_help_heading = "Items",
        about = "Add an item",
        long_about = "Add a direction, waypoint, or step. Items with the same text (ignoring case) are linked automatically.",
        after_help = "EXAMPLES:\n    # A top-level direction\n    wp add \"Ship v1\" --kind direction\n\n    # A step under it\n    wp add \"Design\" --parent 3f2a --kind waypoint\n\n    # Emit machine-readable output\n    wp add \"Design\" --json"
    )]
    Add(cmd::add::AddArgs),

    #[command(
        next_help_heading = "Items",
        about = "List items as a tree",
        long_about = "List active items as a tree ordered by position. Children of deleted items are shown at the top level.",
        after_help = "EXAMPLES:\n    # The active tree\n    wp list\n\n    # Only what is left to do\n    wp list --open\n\n    # The trash\n    wp list --deleted"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Items",
        about = "Show one item",
        long_about = "Show an item with its parent, children, linked instances, and achievements.",
        after_help = "EXAMPLES:\n    # Show an item\n    wp show 3f2a9c01\n\n    # Use a short prefix when unique\n    wp show 3f2a"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Items",
        about = "Edit an item",
        long_about = "Change an item's text, kind, points, or position, optionally across every linked instance.",
        after_help = "EXAMPLES:\n    # Rename one instance\n    wp edit 3f2a --text \"Design review\"\n\n    # Rename every linked instance\n    wp edit 3f2a --text \"Design review\" --sync-linked"
    )]
    Edit(cmd::edit::EditArgs),

    #[command(
        next_help_heading = "Items",
        about = "Move an item",
        long_about = "Reparent or reorder an item. A move that would put an item under itself is rejected.",
        after_help = "EXAMPLES:\n    # Move under another item\n    wp move 3f2a --parent 9b1c\n\n    # Make it top level\n    wp move 3f2a --root"
    )]
    Move(cmd::move_cmd::MoveArgs),

    #[command(
        next_help_heading = "Items",
        about = "Soft-delete an item",
        long_about = "Soft-delete an item (children stay), its whole linked group, or purge a subtree for good.",
        after_help = "EXAMPLES:\n    # Delete one instance\n    wp delete 3f2a\n\n    # Delete every linked instance\n    wp delete 3f2a --all-linked\n\n    # Remove permanently\n    wp delete 3f2a --purge"
    )]
    Delete(cmd::delete::DeleteArgs),

    #[command(
        next_help_heading = "Items",
        about = "Restore a deleted item",
        after_help = "EXAMPLES:\n    # Find it, then restore it\n    wp list --deleted\n    wp restore 3f2a"
    )]
    Restore(cmd::restore::RestoreArgs),

    #[command(
        next_help_heading = "Items",
        about = "Show linked groups",
        long_about = "Show the instances linked to an item (by id or text), or every linked group. The canonical instance is the oldest.",
        after_help = "EXAMPLES:\n    # Groups for one item\n    wp links 3f2a\n\n    # Look up by text\n    wp links \"design\"\n\n    # Every group\n    wp links"
    )]
    Links(cmd::links::LinksArgs),

    #[command(
        next_help_heading = "Progress",
        about = "Complete an item",
        long_about = "Mark an item completed and record an achievement worth its points.",
        after_help = "EXAMPLES:\n    # Complete an item\n    wp done 3f2a\n\n    # Complete every linked instance\n    wp done 3f2a --sync-linked"
    )]
    Done(cmd::done::DoneArgs),

    #[command(
        next_help_heading = "Progress",
        about = "Reopen a completed item",
        long_about = "Mark an item incomplete and revoke the achievement its completion recorded.",
        after_help = "EXAMPLES:\n    # Reopen an item\n    wp undo 3f2a"
    )]
    Undo(cmd::undo::UndoArgs),

    #[command(
        next_help_heading = "Progress",
        about = "Show point totals",
        long_about = "Show the daily baseline plus earned points for today, a given day, or the last N days.",
        after_help = "EXAMPLES:\n    # Today\n    wp points\n\n    # A past day\n    wp points --date 2026-03-01\n\n    # The last week\n    wp points --days 7"
    )]
    Points(cmd::points::PointsArgs),

    #[command(
        next_help_heading = "Progress",
        about = "Ensure a daily baseline",
        long_about = "Create the baseline row for a day if it does not exist. Existing rows are never changed.",
        after_help = "EXAMPLES:\n    # Today, default points\n    wp baseline\n\n    # A specific day\n    wp baseline --date 2026-03-01 --points 15"
    )]
    Baseline(cmd::baseline::BaselineArgs),

    #[command(
        next_help_heading = "Migration",
        about = "Export a snapshot",
        long_about = "Write every bucket (deleted items included) as one JSON snapshot.",
        after_help = "EXAMPLES:\n    # To stdout\n    wp export\n\n    # To a file\n    wp export --output backup.json"
    )]
    Export(cmd::export::ExportArgs),

    #[command(
        next_help_heading = "Migration",
        about = "Migrate local data into an account",
        long_about = "Copy local items and history into a remote account, resolving conflicts with one strategy. Runs at most once per account.",
        after_help = "EXAMPLES:\n    # Migrate with the configured strategy\n    wp migrate acct-42\n\n    # Review conflicts first\n    wp migrate acct-42 --strategy manual_review\n\n    # Use a different remote file\n    wp migrate acct-42 --remote ../cloud.json"
    )]
    Migrate(cmd::migrate::MigrateArgs),

    #[command(
        name = "migration-status",
        next_help_heading = "Migration",
        about = "Show or reset migration status",
        after_help = "EXAMPLES:\n    # Every account\n    wp migration-status\n\n    # Retry after a failure\n    wp migration-status acct-42 --reset"
    )]
    MigrationStatus(cmd::migration_status::MigrationStatusArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("WAYPOINTS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "waypoints=debug,info"
        } else {
            "waypoints=info,warn"
        })
    });

    let format = env::var("WAYPOINTS_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays parseable.
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn dispatch(command: &Commands, output: OutputMode, project: &Project) -> anyhow::Result<()> {
    match command {
        Commands::Init(args) => cmd::init::run_init(args, output, project),
        Commands::Config(args) => cmd::config::run_config(args, &project.root, output),
        Commands::Add(args) => cmd::add::run_add(args, output, project),
        Commands::List(args) => cmd::list::run_list(args, output, project),
        Commands::Show(args) => cmd::show::run_show(args, output, project),
        Commands::Edit(args) => cmd::edit::run_edit(args, output, project),
        Commands::Move(args) => cmd::move_cmd::run_move(args, output, project),
        Commands::Delete(args) => cmd::delete::run_delete(args, output, project),
        Commands::Restore(args) => cmd::restore::run_restore(args, output, project),
        Commands::Links(args) => cmd::links::run_links(args, output, project),
        Commands::Done(args) => cmd::done::run_done(args, output, project),
        Commands::Undo(args) => cmd::undo::run_undo(args, output, project),
        Commands::Points(args) => cmd::points::run_points(args, output, project),
        Commands::Baseline(args) => cmd::baseline::run_baseline(args, output, project),
        Commands::Export(args) => cmd::export::run_export(args, output, project),
        Commands::Migrate(args) => cmd::migrate::run_migrate(args, output, project),
        Commands::MigrationStatus(args) => {
            cmd::migration_status::run_migration_status(args, output, project)
        }
    }
}

/// Resolve configuration and run the command, returning the output mode
/// errors should be rendered in.
fn run(cli: &Cli) -> (OutputMode, anyhow::Result<()>) {
    let fallback = resolve_output_mode(cli.format, cli.json, None);
    let root = match env::current_dir() {
        Ok(root) => root,
        Err(err) => return (fallback, Err(err.into())),
    };

    // `wp config` must stay usable to repair a config file that fails to parse.
    if let Commands::Config(args) = &cli.command {
        return (fallback, cmd::config::run_config(args, &root, fallback));
    }

    let config = match resolve_config(&root, cli.json) {
        Ok(config) => config,
        Err(err) => {
            return (
                fallback,
                Err(CommandError::Config(format!("{err:#}")).into()),
            );
        }
    };
    let output = resolve_output_mode(cli.format, cli.json, Some(&config.resolved_output));
    debug!(root = %root.display(), ?output, "resolved project");

    let project = Project::new(root, config, cli.owner.clone());
    (output, dispatch(&cli.command, output, &project))
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let (output, result) = run(&cli);
    if let Err(err) = result {
        let error = CliError::from(&err);
        if let Err(render_err) = render_error(output, &error) {
            eprintln!("error: {err:#} ({render_err})");
        }
        std::process::exit(1);
    }
}
