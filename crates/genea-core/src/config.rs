use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

/// File name looked up in the working directory.
pub const LOCAL_CONFIG: &str = "genea.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneaConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Preferred output mode (`pretty`, `text`, `json`).
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Compare each merge's live table with the functions oracle.
    #[serde(default)]
    pub validate_merges: bool,
    /// Maximum ancestor branches inspected when a MOD misses locally.
    #[serde(default = "default_lineage_search_limit")]
    pub lineage_search_limit: usize,
    /// Missing/superfluous ids itemized per merge in validation logs.
    #[serde(default = "default_max_reported_discrepancies")]
    pub max_reported_discrepancies: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            validate_merges: false,
            lineage_search_limit: default_lineage_search_limit(),
            max_reported_discrepancies: default_max_reported_discrepancies(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Program and leading arguments; the commit hash is appended.
    #[serde(default)]
    pub command: Vec<String>,
    /// Directory holding one `<hash>.json` function list per commit.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

/// Parse one TOML config file.
///
/// # Errors
///
/// Fails if the file cannot be read or is not valid config TOML.
pub fn load_config_file(path: &Path) -> Result<GeneaConfig> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<GeneaConfig>(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Path of the per-user config file, if the platform has a config dir.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("genea/config.toml"))
}

/// Resolve the effective configuration.
///
/// Lookup order: `explicit`, then `<cwd>/genea.toml`, then the user
/// config, then defaults. `GENEA_WORKERS` is applied on top.
///
/// # Errors
///
/// Fails if an explicit path is missing, or if the chosen file does not parse.
pub fn resolve_config(explicit: Option<&Path>, cwd: &Path) -> Result<(GeneaConfig, Option<PathBuf>)> {
    let chosen = match explicit {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file {} does not exist", path.display());
            }
            Some(path.to_path_buf())
        }
        None => {
            let local = cwd.join(LOCAL_CONFIG);
            if local.exists() {
                Some(local)
            } else {
                user_config_path().filter(|p| p.exists())
            }
        }
    };

    let mut config = match &chosen {
        Some(path) => load_config_file(path)?,
        None => GeneaConfig::default(),
    };
    config.apply_env_overrides(env::var("GENEA_WORKERS").ok().as_deref())?;
    Ok((config, chosen))
}

impl GeneaConfig {
    /// Apply environment overrides.
    ///
    /// # Errors
    ///
    /// Fails if `workers` is set but not a positive integer.
    pub fn apply_env_overrides(&mut self, workers: Option<&str>) -> Result<()> {
        if let Some(raw) = workers {
            let parsed: usize = raw
                .trim()
                .parse()
                .with_context(|| format!("GENEA_WORKERS must be a positive integer, got {raw:?}"))?;
            if parsed == 0 {
                anyhow::bail!("GENEA_WORKERS must be a positive integer, got 0");
            }
            self.extract.workers = parsed;
        }
        Ok(())
    }
}

/// Pick the output mode: `--json` flag, then `FORMAT`, then config, then
/// TTY detection.
///
/// # Errors
///
/// Currently infallible; kept fallible for parity with config loading.
pub fn resolve_output(cli_json: bool, config_output: Option<&str>, env_format: Option<&str>) -> Result<String> {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return Ok("json".to_string());
    }

    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return Ok(mode.to_string());
    }

    if let Some(mode) = config_output.and_then(normalize_output_mode) {
        return Ok(mode.to_string());
    }

    if std::io::stdout().is_terminal() {
        Ok("pretty".to_string())
    } else {
        Ok("text".to_string())
    }
}

const fn default_lineage_search_limit() -> usize {
    256
}

const fn default_max_reported_discrepancies() -> usize {
    10
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
}

const fn default_queue_capacity() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_use_defaults() {
        let cfg: GeneaConfig = toml::from_str("").expect("empty config parses");
        assert!(!cfg.tracker.validate_merges);
        assert_eq!(cfg.tracker.lineage_search_limit, 256);
        assert_eq!(cfg.tracker.max_reported_discrepancies, 10);
        assert_eq!(cfg.extract.queue_capacity, 64);
        assert!(cfg.extract.workers >= 1);
        assert!(cfg.oracle.command.is_empty());
        assert!(cfg.oracle.cache_dir.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: GeneaConfig = toml::from_str(
            r#"
output = "json"

[tracker]
validate_merges = true

[oracle]
command = ["list-functions", "--repo", "/src/linux"]
cache_dir = "/var/cache/genea"
"#,
        )
        .expect("parse");

        assert!(cfg.tracker.validate_merges);
        assert_eq!(cfg.tracker.lineage_search_limit, 256);
        assert_eq!(cfg.output.as_deref(), Some("json"));
        assert_eq!(cfg.oracle.command.len(), 3);
        assert_eq!(cfg.oracle.cache_dir, Some(PathBuf::from("/var/cache/genea")));
    }

    #[test]
    fn explicit_path_wins_and_local_file_is_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(LOCAL_CONFIG), "[extract]\nqueue_capacity = 8\n").expect("write local");
        let explicit = dir.path().join("other.toml");
        std::fs::write(&explicit, "[extract]\nqueue_capacity = 2\n").expect("write explicit");

        let (local, path) = resolve_config(None, dir.path()).expect("local");
        assert_eq!(local.extract.queue_capacity, 8);
        assert_eq!(path, Some(dir.path().join(LOCAL_CONFIG)));

        let (chosen, path) = resolve_config(Some(&explicit), dir.path()).expect("explicit");
        assert_eq!(chosen.extract.queue_capacity, 2);
        assert_eq!(path, Some(explicit));
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = resolve_config(Some(&dir.path().join("nope.toml")), dir.path()).expect_err("missing");
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn parse_error_names_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[tracker\n").expect("write");
        let err = load_config_file(&path).expect_err("bad toml");
        assert!(format!("{err:#}").contains("bad.toml"));
    }

    #[test]
    fn workers_override() {
        let mut cfg = GeneaConfig::default();
        cfg.apply_env_overrides(Some("3")).expect("valid");
        assert_eq!(cfg.extract.workers, 3);
        assert!(cfg.apply_env_overrides(Some("0")).is_err());
        assert!(cfg.apply_env_overrides(Some("many")).is_err());
        cfg.apply_env_overrides(None).expect("unset");
        assert_eq!(cfg.extract.workers, 3);
    }

    #[test]
    fn cli_json_overrides_env_and_config() {
        let output = resolve_output(true, Some("pretty"), Some("text")).expect("resolve should succeed");
        assert_eq!(output, "json");
    }

    #[test]
    fn env_beats_config_and_aliases_normalize() {
        assert_eq!(resolve_output(false, Some("table"), Some("human")).expect("ok"), "pretty");
        assert_eq!(resolve_output(false, Some("human"), None).expect("ok"), "pretty");
        assert_eq!(resolve_output(false, Some("bogus"), Some("table")).expect("ok"), "text");
    }
}
