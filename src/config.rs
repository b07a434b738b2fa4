//! Classifier tuning, persisted as TOML.
//!
//! A [`ClassifierConfig`] is immutable once handed to a classifier; several
//! independently tuned classifiers can share one store.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Tunables of the chi-squared classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    /// Prior spam probability of a token never seen in training.
    #[serde(default = "default_unknown_token_prob")]
    pub unknown_token_prob: f64,
    /// Weight of the prior, in units of "messages of evidence".
    #[serde(default = "default_unknown_token_strength")]
    pub unknown_token_strength: f64,
    /// Minimum `|p - 0.5|` for a token to count as a discriminator.
    #[serde(default = "default_minimum_prob_strength")]
    pub minimum_prob_strength: f64,
    /// Scores below this are ham.
    #[serde(default = "default_ham_cutoff")]
    pub ham_cutoff: f64,
    /// Scores above this are spam.
    #[serde(default = "default_spam_cutoff")]
    pub spam_cutoff: f64,
    /// Maximum number of discriminators combined per message.
    #[serde(default = "default_max_discriminators")]
    pub max_discriminators: usize,
}

fn default_unknown_token_prob() -> f64 {
    0.5
}
fn default_unknown_token_strength() -> f64 {
    0.45
}
fn default_minimum_prob_strength() -> f64 {
    0.1
}
fn default_ham_cutoff() -> f64 {
    0.2
}
fn default_spam_cutoff() -> f64 {
    0.9
}
fn default_max_discriminators() -> usize {
    150
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            unknown_token_prob: default_unknown_token_prob(),
            unknown_token_strength: default_unknown_token_strength(),
            minimum_prob_strength: default_minimum_prob_strength(),
            ham_cutoff: default_ham_cutoff(),
            spam_cutoff: default_spam_cutoff(),
            max_discriminators: default_max_discriminators(),
        }
    }
}

impl ClassifierConfig {
    /// Check every field's range.
    pub fn validate(&self) -> ConfigResult<()> {
        unit_interval("unknown_token_prob", self.unknown_token_prob)?;
        unit_interval("ham_cutoff", self.ham_cutoff)?;
        unit_interval("spam_cutoff", self.spam_cutoff)?;

        if !(self.unknown_token_strength.is_finite() && self.unknown_token_strength >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "unknown_token_strength",
                message: format!("{} is not a finite non-negative number", self.unknown_token_strength),
            });
        }
        if !(0.0..=0.5).contains(&self.minimum_prob_strength) {
            return Err(ConfigError::Invalid {
                field: "minimum_prob_strength",
                message: format!("{} is outside [0, 0.5]", self.minimum_prob_strength),
            });
        }
        if self.ham_cutoff > self.spam_cutoff {
            return Err(ConfigError::Invalid {
                field: "ham_cutoff",
                message: format!(
                    "{} exceeds spam_cutoff {}",
                    self.ham_cutoff, self.spam_cutoff
                ),
            });
        }
        if self.max_discriminators == 0 {
            return Err(ConfigError::Invalid {
                field: "max_discriminators",
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Load and validate a TOML file. Missing fields take their defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml().map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| e.to_string())
    }
}

fn unit_interval(field: &'static str, value: f64) -> ConfigResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            message: format!("{value} is outside [0, 1]"),
        })
    }
}
