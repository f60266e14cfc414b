//! Shared output layer for pretty/text/JSON parity across CLI commands.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--format` flag
//! 2. hidden `--json` flag
//! 3. `FORMAT` env var → `"pretty"` | `"text"` | `"json"`
//! 4. `output` key of the loaded config
//! 5. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.

use std::io::{self, Write};

use clap::ValueEnum;
use genea_core::error::ErrorCode;
use genea_core::extract::ExtractError;
use genea_core::genealogy::TrackError;
use genea_core::io::InputError;
use genea_core::oracle::OracleError;
use serde::Serialize;

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
    writeln!(w, "{:<14} {}", format!("{key}:"), value.as_ref())
}

/// The three output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-optimized output with sections and separators.
    Pretty,
    /// Plain `key value` lines for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

/// Resolve the output mode from flags, environment, config and TTY state.
///
/// # Errors
///
/// Propagates failures from the shared config-level resolution.
pub fn resolve_output_mode(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    config_output: Option<&str>,
) -> anyhow::Result<OutputMode> {
    if let Some(mode) = format_flag {
        return Ok(mode);
    }
    let env_format = std::env::var("FORMAT").ok();
    let resolved = genea_core::config::resolve_output(json_flag, config_output, env_format.as_deref())?;
    Ok(OutputMode::from_str(&resolved, true).unwrap_or(OutputMode::Text))
}

/// Render a serializable value with explicit pretty/text renderers.
///
/// # Errors
///
/// Fails if writing to stdout or serializing `value` fails.
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

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// `E####` code when the failure came from a known error type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            error_code: None,
        }
    }

    fn with_code(mut self, code: Option<ErrorCode>) -> Self {
        if let Some(code) = code {
            self.error_code = Some(code.code().to_string());
            self.suggestion = code.hint().map(str::to_string);
        }
        self
    }

    /// Attach the stable code of the first recognised error in the chain.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        Self::new(format!("{err:#}")).with_code(error_code_of(err))
    }
}

fn error_code_of(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain().find_map(|cause| {
        cause
            .downcast_ref::<TrackError>()
            .map(TrackError::code)
            .or_else(|| cause.downcast_ref::<InputError>().map(InputError::code))
            .or_else(|| cause.downcast_ref::<ExtractError>().map(ExtractError::code))
            .or_else(|| cause.downcast_ref::<OracleError>().map(|_| ErrorCode::FunctionOracleFailed))
            .or_else(|| cause.downcast_ref::<toml::de::Error>().map(|_| ErrorCode::ConfigParseError))
    })
}

/// Render an error to stderr in the requested format.
///
/// # Errors
///
/// Fails if writing to stderr fails.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, &serde_json::json!({ "error": error }))?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            match &error.error_code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(suggestion) = &error.suggestion {
                writeln!(out, "  hint: {suggestion}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use genea_core::io::read_commits;

    #[test]
    fn explicit_format_wins() {
        let mode = resolve_output_mode(Some(OutputMode::Pretty), true, Some("json")).expect("resolve");
        assert_eq!(mode, OutputMode::Pretty);
    }

    #[test]
    fn json_flag_beats_config() {
        let mode = resolve_output_mode(None, true, Some("pretty")).expect("resolve");
        assert_eq!(mode, OutputMode::Json);
    }

    #[test]
    fn pretty_helpers_pad_keys() {
        let mut buf = Vec::new();
        pretty_section(&mut buf, "Replay").expect("section");
        pretty_kv(&mut buf, "commits", "3").expect("kv");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Replay");
        assert_eq!(lines[1].len(), PRETTY_RULE_WIDTH);
        assert_eq!(lines[2], "commits:       3");
    }

    #[test]
    fn input_errors_carry_their_code() {
        let err = read_commits(r#"{"hash":"a","timestamp":1,"parents":["ghost"]}"#.as_bytes())
            .expect_err("unknown parent");
        let rendered = CliError::from_anyhow(&anyhow::Error::new(err).context("loading commits"));
        assert_eq!(rendered.error_code.as_deref(), Some("E1003"));
        assert!(rendered.message.starts_with("loading commits: "));
        assert!(rendered.suggestion.is_some());
    }

    #[test]
    fn unknown_errors_have_no_code() {
        let rendered = CliError::from_anyhow(&anyhow::anyhow!("boom"));
        assert_eq!(rendered.message, "boom");
        assert!(rendered.error_code.is_none());
        let json = serde_json::to_value(&rendered).expect("serialize");
        assert_eq!(json, serde_json::json!({ "message": "boom" }));
    }
}
