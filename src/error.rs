//! Rich diagnostic error types for tokenbayes.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so callers can tell a
//! corrupted store apart from a misconfigured classifier or a misused
//! statistics function.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the crate.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, sources) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum TokenBayesError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Paths(#[from] crate::paths::PathError),
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(tokenbayes::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(tokenbayes::store::redb),
        help(
            "The embedded token database encountered a transaction error. \
             This may indicate corruption or another process holding the database open."
        )
    )]
    Redb { message: String },

    #[error("inconsistent count update for token {token:?}: {message}")]
    #[diagnostic(
        code(tokenbayes::store::inconsistent),
        help(
            "A message can only be untrained if it was trained before with the same \
             label and the same tokens. Nothing was changed; check that the message \
             is retracted from the class it was trained as."
        )
    )]
    Inconsistent { token: String, message: String },

    #[error("cannot retract a {label} message: no {label} messages are trained")]
    #[diagnostic(
        code(tokenbayes::store::nothing_trained),
        help("Only previously trained messages can be untrained.")
    )]
    NothingTrained { label: String },
}

// ---------------------------------------------------------------------------
// Classifier errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ClassifierError {
    #[error(
        "token counts ({spam} spam, {ham} ham) exceed trained message totals \
         ({nspam} spam, {nham} ham)"
    )]
    #[diagnostic(
        code(tokenbayes::classifier::count_invariant),
        help(
            "A token cannot appear in more messages than were trained. The count store \
             is corrupted; rebuild it from the training corpus."
        )
    )]
    CountInvariant {
        spam: u64,
        ham: u64,
        nspam: u64,
        nham: u64,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Statistics errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StatsError {
    #[error("chi-squared upper tail requires even degrees of freedom, got {dof}")]
    #[diagnostic(
        code(tokenbayes::stats::odd_dof),
        help("The closed-form series only exists for even degrees of freedom (2n for n clues).")
    )]
    OddDegreesOfFreedom { dof: u32 },

    #[error("probability {p} is outside [0, 1]")]
    #[diagnostic(
        code(tokenbayes::stats::probability_range),
        help("Inverse Gaussian functions accept probabilities between 0.0 and 1.0 inclusive.")
    )]
    ProbabilityOutOfRange { p: f64 },

    #[error("statistic is not a number")]
    #[diagnostic(
        code(tokenbayes::stats::nan),
        help("A NaN reached a statistics function. Check the inputs for 0/0 divisions.")
    )]
    NotANumber,
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read classifier config: {path}")]
    #[diagnostic(
        code(tokenbayes::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse classifier config {path}: {message}")]
    #[diagnostic(
        code(tokenbayes::config::parse),
        help("Check the TOML syntax and field names in the config file.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write classifier config: {path}")]
    #[diagnostic(
        code(tokenbayes::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid classifier setting `{field}`: {message}")]
    #[diagnostic(
        code(tokenbayes::config::invalid),
        help(
            "Probabilities must lie in [0, 1], minimum_prob_strength in [0, 0.5], \
             ham_cutoff must not exceed spam_cutoff and max_discriminators must be at least 1."
        )
    )]
    Invalid { field: &'static str, message: String },
}

/// Convenience result type for top-level operations.
pub type TokenBayesResult<T> = std::result::Result<T, TokenBayesError>;
