//! Shared output layer for pretty/text/JSON parity across all CLI commands.
//!
//! Every command handler receives an [`OutputMode`] and formats its output
//! accordingly: pretty output for humans, compact text for scripts, or stable
//! JSON.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--format` / `--json` flag
//! 2. `FORMAT` env var, then `output` in the user config
//! 3. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.

use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};
use waypoints_core::ErrorCode;
use waypoints_core::migration::{MigrationError, RemoteError};
use waypoints_core::repo::RepoError;
use waypoints_core::store::StoreError;
use waypoints_core::validate::{ValidationError, ValidationErrors};

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

/// Write a horizontal separator used by pretty human output.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

/// The three output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-optimized output (trees, sections, visual framing).
    Pretty,
    /// Token-efficient plain text for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    /// Returns `true` if JSON output was requested.
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }

    /// Parse a resolved mode name (`pretty`, `text`, `json`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some(Self::Pretty),
            "text" | "plain" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Core resolution logic, separated from I/O for testability.
fn resolve_output_mode_inner(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    configured: Option<&str>,
    is_tty: bool,
) -> OutputMode {
    if let Some(mode) = format_flag {
        return mode;
    }

    if json_flag {
        return OutputMode::Json;
    }

    if let Some(mode) = configured.and_then(OutputMode::from_name) {
        return mode;
    }

    if is_tty {
        OutputMode::Pretty
    } else {
        OutputMode::Text
    }
}

/// Resolve the output mode from CLI flags and the mode already resolved from
/// `FORMAT` and the user config (if the config loaded).
pub fn resolve_output_mode(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    configured: Option<&str>,
) -> OutputMode {
    let is_tty = io::stdout().is_terminal();
    let env_val = std::env::var("FORMAT").ok();
    resolve_output_mode_inner(
        format_flag,
        json_flag,
        configured.or(env_val.as_deref()),
        is_tty,
    )
}

/// Render a serializable value with explicit pretty/text renderers.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text_fn(value, &mut out)?,
        OutputMode::Pretty => pretty_fn(value, &mut out)?,
    }
    Ok(())
}

/// Failures raised by the CLI itself rather than the core.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("item '{0}' not found")]
    NotFound(String),

    #[error("{0} conflict(s) need manual review before account {1} can be migrated")]
    ManualReview(usize, String),

    #[error("'{input}' matches {matches} items; use more of the id")]
    Ambiguous { input: String, matches: usize },

    #[error("{0}")]
    Config(String),

    #[error("not a waypoints project: {0} does not exist (run `wp init`)")]
    NotInitialized(String),
}

impl CommandError {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::ItemNotFound,
            Self::Ambiguous { .. } => ErrorCode::ValidationFailed,
            Self::ManualReview(..) => ErrorCode::ManualReviewRequired,
            Self::Config(_) | Self::NotInitialized(_) => ErrorCode::ConfigParseError,
        }
    }
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    /// Human-readable error message.
    pub message: String,
    /// Optional suggestion for how to fix the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Machine-readable error code (`E####`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Field-level violations for validation failures.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<ValidationError>,
}

impl CliError {
    fn coded(message: String, code: ErrorCode) -> Self {
        Self {
            message,
            suggestion: code.hint().map(str::to_string),
            error_code: Some(code.code().to_string()),
            fields: Vec::new(),
        }
    }
}

/// Map any command failure onto a coded [`CliError`] by walking its chain.
impl From<&anyhow::Error> for CliError {
    fn from(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        for cause in err.chain() {
            if let Some(e) = cause.downcast_ref::<CommandError>() {
                return Self::coded(message, e.code());
            }
            if let Some(e) = cause.downcast_ref::<RepoError>() {
                let mut out = Self::coded(message, e.code());
                if let Some(v) = e.validation() {
                    out.fields.clone_from(&v.errors);
                }
                return out;
            }
            if let Some(e) = cause.downcast_ref::<ValidationErrors>() {
                let mut out = Self::coded(message, e.code());
                out.fields.clone_from(&e.errors);
                return out;
            }
            if let Some(e) = cause.downcast_ref::<MigrationError>() {
                return Self::coded(message, e.code());
            }
            if let Some(e) = cause.downcast_ref::<RemoteError>() {
                return Self::coded(message, e.code());
            }
            if let Some(e) = cause.downcast_ref::<StoreError>() {
                return Self::coded(message, e.code());
            }
        }
        Self::coded(message, ErrorCode::InternalUnexpected)
    }
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({
                "error": error,
            });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            match &error.error_code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(ref suggestion) = error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoints_core::validate::{NewItem, validate_new_item};

    // ── resolve_output_mode_inner ───────────────────────────────────────────

    #[test]
    fn resolve_format_flag_wins_over_json_and_config() {
        let mode = resolve_output_mode_inner(Some(OutputMode::Text), true, Some("pretty"), true);
        assert_eq!(mode, OutputMode::Text);
    }

    #[test]
    fn resolve_json_flag_wins_over_config() {
        let mode = resolve_output_mode_inner(None, true, Some("pretty"), true);
        assert_eq!(mode, OutputMode::Json);
    }

    #[test]
    fn resolve_configured_aliases() {
        assert_eq!(
            resolve_output_mode_inner(None, false, Some("human"), false),
            OutputMode::Pretty
        );
        assert_eq!(
            resolve_output_mode_inner(None, false, Some("TEXT"), true),
            OutputMode::Text
        );
    }

    #[test]
    fn resolve_unknown_value_falls_through_to_tty() {
        let mode_tty = resolve_output_mode_inner(None, false, Some("fancy"), true);
        assert_eq!(mode_tty, OutputMode::Pretty);
        let mode_pipe = resolve_output_mode_inner(None, false, Some("fancy"), false);
        assert_eq!(mode_pipe, OutputMode::Text);
    }

    // ── CliError ────────────────────────────────────────────────────────────

    #[test]
    fn coded_errors_take_the_code_hint() {
        let err = CliError::coded("gone".into(), ErrorCode::ItemNotFound);
        assert_eq!(err.error_code.as_deref(), Some("E2001"));
        assert_eq!(
            err.suggestion.as_deref(),
            ErrorCode::ItemNotFound.hint()
        );
    }

    #[test]
    fn not_found_maps_to_item_not_found() {
        let err = anyhow::Error::from(CommandError::NotFound("abc".into()));
        let cli = CliError::from(&err);
        assert_eq!(cli.error_code.as_deref(), Some("E2001"));
        assert!(cli.message.contains("abc"));
    }

    #[test]
    fn validation_errors_carry_fields_through_context() {
        let invalid = validate_new_item(&NewItem {
            kind: "epic".into(),
            ..NewItem::new("", waypoints_core::model::ItemKind::Step)
        })
        .expect_err("two violations");
        let err = anyhow::Error::from(RepoError::from(invalid)).context("add failed");
        let cli = CliError::from(&err);
        assert_eq!(cli.error_code.as_deref(), Some("E1001"));
        assert_eq!(cli.fields.len(), 2);
        assert!(cli.message.starts_with("add failed"));
    }

    #[test]
    fn unknown_errors_are_internal() {
        let err = anyhow::anyhow!("boom");
        assert_eq!(CliError::from(&err).error_code.as_deref(), Some("E9001"));
    }

    #[test]
    fn render_error_json_and_human() {
        let err = CliError::coded("bad input".into(), ErrorCode::ValidationFailed);
        assert!(render_error(OutputMode::Json, &err).is_ok());
        assert!(render_error(OutputMode::Pretty, &err).is_ok());
    }
}
