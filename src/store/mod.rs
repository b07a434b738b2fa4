//! Token count storage.
//!
//! A [`TokenStore`] records, per token, how many trained spam and ham
//! messages contained it, plus the number of trained messages of each class.
//! Two backends implement it:
//!
//! - [`MemStore`] — volatile counts in a concurrent hashmap (DashMap)
//! - [`DurableStore`] — counts in a single redb table, global totals kept in a
//!   reserved sentinel row
//!
//! Training is per message presence: a token seen many times in one message
//! still moves its count by exactly one.

pub mod durable;
pub mod mem;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use durable::DurableStore;
pub use mem::MemStore;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Number of trained spam and ham messages containing one token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenCounts {
    pub spam: u64,
    pub ham: u64,
}

impl TokenCounts {
    pub fn new(spam: u64, ham: u64) -> Self {
        Self { spam, ham }
    }

    /// Messages of either class that contained the token.
    pub fn total(&self) -> u64 {
        self.spam + self.ham
    }
}

/// Number of trained spam and ham messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalCounts {
    pub nspam: u64,
    pub nham: u64,
}

impl GlobalCounts {
    pub fn new(nspam: u64, nham: u64) -> Self {
        Self { nspam, nham }
    }

    /// Total trained messages.
    pub fn total(&self) -> u64 {
        self.nspam + self.nham
    }
}

/// Which class a training call updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Spam,
    Ham,
}

impl Label {
    /// Counts contributed by one message of this class.
    pub(crate) fn unit(self) -> TokenCounts {
        match self {
            Label::Spam => TokenCounts::new(1, 0),
            Label::Ham => TokenCounts::new(0, 1),
        }
    }

    pub(crate) fn count_of(self, counts: TokenCounts) -> u64 {
        match self {
            Label::Spam => counts.spam,
            Label::Ham => counts.ham,
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spam => write!(f, "spam"),
            Self::Ham => write!(f, "ham"),
        }
    }
}

/// Storage contract shared by every count backend.
///
/// All methods take `&self`; backends do their own interior locking.
pub trait TokenStore {
    /// Number of trained spam and ham messages.
    fn global_counts(&self) -> StoreResult<GlobalCounts>;

    /// Counts for every token of `tokens` known to the store.
    ///
    /// Unknown tokens are omitted rather than reported as zero.
    fn token_counts(&self, tokens: &BTreeSet<String>) -> StoreResult<HashMap<String, TokenCounts>>;

    /// Message totals and per-token counts read at the same instant.
    ///
    /// No training call is half-visible in the result, so the counts never
    /// exceed the totals on a healthy store. Classification reads through
    /// this.
    fn counts_snapshot(
        &self,
        tokens: &BTreeSet<String>,
    ) -> StoreResult<(GlobalCounts, HashMap<String, TokenCounts>)>;

    /// Record one spam message containing `tokens`.
    fn add_spam(&self, tokens: &BTreeSet<String>) -> StoreResult<()>;

    /// Record one ham message containing `tokens`.
    fn add_ham(&self, tokens: &BTreeSet<String>) -> StoreResult<()>;

    /// Retract one previously recorded spam message.
    ///
    /// Fails with [`StoreError::Inconsistent`] without changing anything if a
    /// token has no spam count left to remove.
    fn remove_spam(&self, tokens: &BTreeSet<String>) -> StoreResult<()>;

    /// Retract one previously recorded ham message.
    fn remove_ham(&self, tokens: &BTreeSet<String>) -> StoreResult<()>;

    /// Number of token records held by the store.
    fn vocabulary_size(&self) -> StoreResult<u64>;
}

impl<T: TokenStore + ?Sized> TokenStore for &T {
    fn global_counts(&self) -> StoreResult<GlobalCounts> {
        (**self).global_counts()
    }

    fn token_counts(&self, tokens: &BTreeSet<String>) -> StoreResult<HashMap<String, TokenCounts>> {
        (**self).token_counts(tokens)
    }

    fn counts_snapshot(
        &self,
        tokens: &BTreeSet<String>,
    ) -> StoreResult<(GlobalCounts, HashMap<String, TokenCounts>)> {
        (**self).counts_snapshot(tokens)
    }

    fn add_spam(&self, tokens: &BTreeSet<String>) -> StoreResult<()> {
        (**self).add_spam(tokens)
    }

    fn add_ham(&self, tokens: &BTreeSet<String>) -> StoreResult<()> {
        (**self).add_ham(tokens)
    }

    fn remove_spam(&self, tokens: &BTreeSet<String>) -> StoreResult<()> {
        (**self).remove_spam(tokens)
    }

    fn remove_ham(&self, tokens: &BTreeSet<String>) -> StoreResult<()> {
        (**self).remove_ham(tokens)
    }

    fn vocabulary_size(&self) -> StoreResult<u64> {
        (**self).vocabulary_size()
    }
}

impl<T: TokenStore + ?Sized> TokenStore for Arc<T> {
    fn global_counts(&self) -> StoreResult<GlobalCounts> {
        (**self).global_counts()
    }

    fn token_counts(&self, tokens: &BTreeSet<String>) -> StoreResult<HashMap<String, TokenCounts>> {
        (**self).token_counts(tokens)
    }

    fn counts_snapshot(
        &self,
        tokens: &BTreeSet<String>,
    ) -> StoreResult<(GlobalCounts, HashMap<String, TokenCounts>)> {
        (**self).counts_snapshot(tokens)
    }

    fn add_spam(&self, tokens: &BTreeSet<String>) -> StoreResult<()> {
        (**self).add_spam(tokens)
    }

    fn add_ham(&self, tokens: &BTreeSet<String>) -> StoreResult<()> {
        (**self).add_ham(tokens)
    }

    fn remove_spam(&self, tokens: &BTreeSet<String>) -> StoreResult<()> {
        (**self).remove_spam(tokens)
    }

    fn remove_ham(&self, tokens: &BTreeSet<String>) -> StoreResult<()> {
        (**self).remove_ham(tokens)
    }

    fn vocabulary_size(&self) -> StoreResult<u64> {
        (**self).vocabulary_size()
    }
}

/// Collect a token stream into the deduplicated set the stores consume.
pub fn token_set<I, T>(tokens: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    tokens.into_iter().map(|t| t.as_ref().to_owned()).collect()
}
