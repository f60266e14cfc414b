//! "Actual functions at commit" oracle.
//!
//! Merge validation compares computed live tables with the functions that
//! really exist at a commit. Listing them means checking out and parsing a
//! tree, so the listing is cached twice: in memory for the current run and
//! on disk as `<cache_dir>/<hash>.json` for later runs.
//!
//! ```text
//! CachedOracle ──► memory (DashMap) ──► <cache_dir>/<hash>.json ──► FunctionLister
//! ```

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, instrument};

use crate::model::{Commit, FunctionId};

/// Errors from listing functions at a commit.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// No lister command is configured.
    #[error("no function lister configured (set [oracle] command)")]
    NotConfigured,

    /// The lister program could not be started.
    #[error("failed to run function lister {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The lister exited unsuccessfully.
    #[error("function lister failed for {hash} (exit {status:?}): {stderr}")]
    Lister {
        hash: String,
        status: Option<i32>,
        stderr: String,
    },

    /// A line of lister output is not `signature<TAB>file`.
    #[error("function lister output for {hash}, line {line}: expected `signature<TAB>file`, got {raw:?}")]
    Parse { hash: String, line: usize, raw: String },

    /// Reading or writing the on-disk cache failed.
    #[error("function cache {}: {source}", path.display())]
    Cache {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An on-disk cache entry is not valid JSON.
    #[error("corrupt function cache {}: {source}", path.display())]
    CorruptCache {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of the functions that exist at a commit.
pub trait FunctionOracle {
    /// Every function id present in the tree of `commit`.
    ///
    /// # Errors
    ///
    /// Returns an [`OracleError`] if the functions cannot be listed.
    fn list_function_ids(&self, commit: &Commit) -> Result<HashSet<FunctionId>, OracleError>;
}

/// Uncached producer of function lists, keyed by commit hash.
pub trait FunctionLister: Send + Sync {
    /// # Errors
    ///
    /// Returns an [`OracleError`] if the listing fails.
    fn list(&self, hash: &str) -> Result<Vec<FunctionId>, OracleError>;
}

/// [`FunctionOracle`] with an in-memory and an optional on-disk cache in
/// front of a [`FunctionLister`].
#[derive(Debug)]
pub struct CachedOracle<L> {
    lister: L,
    memory: DashMap<String, Arc<HashSet<FunctionId>>>,
    cache_dir: Option<PathBuf>,
}

impl<L: FunctionLister> CachedOracle<L> {
    #[must_use]
    pub fn new(lister: L, cache_dir: Option<PathBuf>) -> Self {
        Self {
            lister,
            memory: DashMap::new(),
            cache_dir,
        }
    }

    /// Number of commits held in memory.
    #[must_use]
    pub fn cached_commits(&self) -> usize {
        self.memory.len()
    }

    fn cache_path(&self, hash: &str) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join(format!("{hash}.json")))
    }

    /// Function ids at `hash`, from the first cache level that has them.
    ///
    /// # Errors
    ///
    /// Propagates cache I/O, cache corruption and lister failures.
    #[instrument(skip(self))]
    pub fn functions_at(&self, hash: &str) -> Result<Arc<HashSet<FunctionId>>, OracleError> {
        if let Some(hit) = self.memory.get(hash) {
            return Ok(Arc::clone(hit.value()));
        }

        let path = self.cache_path(hash);
        let functions = match path.as_deref().map(read_cache).transpose()?.flatten() {
            Some(functions) => {
                debug!("function list loaded from disk cache");
                functions
            }
            None => {
                let listed = self.lister.list(hash)?;
                if let Some(path) = &path {
                    write_cache(path, &listed)?;
                }
                debug!(functions = listed.len(), "function list computed");
                listed
            }
        };

        let set = Arc::new(functions.into_iter().collect::<HashSet<_>>());
        self.memory.insert(hash.to_string(), Arc::clone(&set));
        Ok(set)
    }
}

impl<L: FunctionLister> FunctionOracle for CachedOracle<L> {
    fn list_function_ids(&self, commit: &Commit) -> Result<HashSet<FunctionId>, OracleError> {
        Ok(self.functions_at(&commit.hash)?.as_ref().clone())
    }
}

fn read_cache(path: &Path) -> Result<Option<Vec<FunctionId>>, OracleError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(OracleError::Cache {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| OracleError::CorruptCache {
            path: path.to_path_buf(),
            source,
        })
}

fn write_cache(path: &Path, functions: &[FunctionId]) -> Result<(), OracleError> {
    let cache_err = |source: io::Error| OracleError::Cache {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(cache_err)?;
    }

    let mut sorted = functions.to_vec();
    sorted.sort();
    let body = serde_json::to_vec(&sorted).map_err(|source| OracleError::CorruptCache {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, body).map_err(cache_err)?;
    fs::rename(&tmp_path, path).map_err(cache_err)
}

/// [`FunctionLister`] that runs an external program.
///
/// The commit hash is appended to the configured argv. The program prints
/// one `signature<TAB>file` line per function; blank lines are skipped.
#[derive(Debug, Clone)]
pub struct CommandLister {
    argv: Vec<String>,
}

impl CommandLister {
    /// # Errors
    ///
    /// Returns [`OracleError::NotConfigured`] for an empty argv.
    pub fn new(argv: Vec<String>) -> Result<Self, OracleError> {
        if argv.is_empty() {
            return Err(OracleError::NotConfigured);
        }
        Ok(Self { argv })
    }
}

impl FunctionLister for CommandLister {
    fn list(&self, hash: &str) -> Result<Vec<FunctionId>, OracleError> {
        let (program, args) = self.argv.split_first().ok_or(OracleError::NotConfigured)?;
        let output = Command::new(program)
            .args(args)
            .arg(hash)
            .output()
            .map_err(|source| OracleError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(OracleError::Lister {
                hash: hash.to_string(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_listing(hash, &String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `signature<TAB>file` lines.
///
/// # Errors
///
/// Returns [`OracleError::Parse`] for a non-blank line without a tab.
pub fn parse_listing(hash: &str, stdout: &str) -> Result<Vec<FunctionId>, OracleError> {
    stdout
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            line.split_once('\t')
                .map(|(sig, file)| FunctionId::new(sig.trim(), file.trim()))
                .ok_or_else(|| OracleError::Parse {
                    hash: hash.to_string(),
                    line: i + 1,
                    raw: line.to_string(),
                })
        })
        .collect()
}
