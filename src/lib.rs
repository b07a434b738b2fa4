// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # tokenbayes
//!
//! A statistical spam/ham classifier over per-token message counts, combined
//! with a chi-squared significance test (Robinson's Bayesian adjustment plus
//! Fisher's chi-combining).
//!
//! ## Architecture
//!
//! - **Statistics** (`stats`): chi-squared upper tail, unit Gaussian and its inverse
//! - **Count stores** (`store`): the [`store::TokenStore`] trait, volatile
//!   (`MemStore`, DashMap) and durable (`DurableStore`, redb) backends
//! - **Classifier** (`classifier`): per-token probabilities, discriminator
//!   selection and chi-squared combination
//! - **Configuration** (`config`): immutable, TOML-backed tuning
//!
//! Tokenization is not part of this crate: every entry point takes an
//! already-tokenized stream and deduplicates it per message.
//!
//! ## Library usage
//!
//! ```
//! use tokenbayes::classifier::{Classifier, Verdict};
//! use tokenbayes::store::MemStore;
//!
//! let classifier = Classifier::new(MemStore::new());
//! classifier.add_spam(["buy", "viagra"]).unwrap();
//! classifier.add_ham(["hello", "world"]).unwrap();
//!
//! let score = classifier.spam_probability(["buy", "viagra"]).unwrap();
//! assert!(score > 0.9);
//! assert_eq!(classifier.classify(["hello", "world"]).unwrap(), Verdict::Ham);
//! ```

pub mod classifier;
pub mod config;
pub mod error;
pub mod paths;
pub mod stats;
pub mod store;
