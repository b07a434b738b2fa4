//! XDG-compliant path resolution for the tokenbayes driver.
//!
//! The token database lives under `$XDG_DATA_HOME/tokenbayes/` and the
//! classifier tuning under `$XDG_CONFIG_HOME/tokenbayes/config.toml`.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(tokenbayes::paths::no_home),
        help(
            "Set the HOME environment variable, or pass --data-dir and --config explicitly."
        )
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(tokenbayes::paths::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

const APP_DIR: &str = "tokenbayes";

/// Global directories used by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBayesPaths {
    /// `$XDG_CONFIG_HOME/tokenbayes/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/tokenbayes/`
    pub data_dir: PathBuf,
}

impl TokenBayesPaths {
    /// Resolve XDG directories from the environment with standard fallbacks.
    pub fn resolve() -> PathResult<Self> {
        Self::from_env(|key| std::env::var(key).ok())
    }

    /// Resolve using a custom variable lookup.
    ///
    /// Empty values count as unset, as XDG requires.
    pub fn from_env(var: impl Fn(&str) -> Option<String>) -> PathResult<Self> {
        let lookup = |key: &str| var(key).filter(|v| !v.is_empty()).map(PathBuf::from);
        let home = lookup("HOME");

        let base = |xdg: &str, fallback: &str| -> PathResult<PathBuf> {
            match lookup(xdg) {
                Some(dir) => Ok(dir),
                None => home
                    .as_ref()
                    .map(|h| h.join(fallback))
                    .ok_or(PathError::NoHome),
            }
        };

        Ok(Self {
            config_dir: base("XDG_CONFIG_HOME", ".config")?.join(APP_DIR),
            data_dir: base("XDG_DATA_HOME", ".local/share")?.join(APP_DIR),
        })
    }

    /// Path to the classifier config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Create the base directories. Idempotent.
    pub fn ensure_dirs(&self) -> PathResult<()> {
        for dir in [&self.config_dir, &self.data_dir] {
            std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }
}
