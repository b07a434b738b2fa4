//! In-memory token counts backed by DashMap.
//!
//! Fastest backend, used for tests, benchmarks and short-lived classifiers.
//! All data is lost on process exit.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;

use crate::error::StoreError;
use crate::store::{GlobalCounts, Label, StoreResult, TokenCounts, TokenStore};

/// Volatile count store using a sharded hashmap.
///
/// Training calls hold the write side of `gate` for their whole update and
/// reads hold the read side, so a reader never sees a message half-trained
/// and two removals can never both pass validation on the last count.
/// Removal validates the whole message before decrementing anything.
#[derive(Debug, Default)]
pub struct MemStore {
    counts: DashMap<String, TokenCounts>,
    nspam: AtomicU64,
    nham: AtomicU64,
    gate: RwLock<()>,
}

impl MemStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with pre-allocated capacity for `capacity` tokens.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            counts: DashMap::with_capacity(capacity),
            ..Self::default()
        }
    }

    fn messages(&self, label: Label) -> &AtomicU64 {
        match label {
            Label::Spam => &self.nspam,
            Label::Ham => &self.nham,
        }
    }

    // The gate guards no data of its own, so a poisoned lock is still usable.
    fn reading(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn writing(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, tokens: &BTreeSet<String>, label: Label) {
        let _writer = self.writing();
        let unit = label.unit();
        for token in tokens {
            let mut entry = self.counts.entry(token.clone()).or_default();
            entry.spam += unit.spam;
            entry.ham += unit.ham;
        }
        self.messages(label).fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%label, tokens = tokens.len(), "trained message in memory store");
    }

    fn remove(&self, tokens: &BTreeSet<String>, label: Label) -> StoreResult<()> {
        let _writer = self.writing();
        let messages = self.messages(label);
        if messages.load(Ordering::SeqCst) == 0 {
            return Err(StoreError::NothingTrained {
                label: label.to_string(),
            });
        }

        for token in tokens {
            let reason = match self.counts.get(token) {
                None => "token was never trained",
                Some(counts) if label.count_of(*counts) == 0 => "count is already zero",
                Some(_) => continue,
            };
            tracing::warn!(%label, token = %token, reason, "rejected untraining");
            return Err(StoreError::Inconsistent {
                token: token.clone(),
                message: format!("{label} {reason}"),
            });
        }

        let unit = label.unit();
        for token in tokens {
            if let Some(mut counts) = self.counts.get_mut(token) {
                counts.spam -= unit.spam;
                counts.ham -= unit.ham;
            }
        }
        messages.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(%label, tokens = tokens.len(), "untrained message in memory store");
        Ok(())
    }
}

impl TokenStore for MemStore {
    fn global_counts(&self) -> StoreResult<GlobalCounts> {
        let _reader = self.reading();
        Ok(GlobalCounts::new(
            self.nspam.load(Ordering::SeqCst),
            self.nham.load(Ordering::SeqCst),
        ))
    }

    fn token_counts(&self, tokens: &BTreeSet<String>) -> StoreResult<HashMap<String, TokenCounts>> {
        Ok(self.counts_snapshot(tokens)?.1)
    }

    fn counts_snapshot(
        &self,
        tokens: &BTreeSet<String>,
    ) -> StoreResult<(GlobalCounts, HashMap<String, TokenCounts>)> {
        let _reader = self.reading();
        let globals = GlobalCounts::new(
            self.nspam.load(Ordering::SeqCst),
            self.nham.load(Ordering::SeqCst),
        );
        let counts = tokens
            .iter()
            .filter_map(|token| {
                self.counts
                    .get(token)
                    .map(|counts| (token.clone(), *counts.value()))
            })
            .collect();
        Ok((globals, counts))
    }

    fn add_spam(&self, tokens: &BTreeSet<String>) -> StoreResult<()> {
        self.add(tokens, Label::Spam);
        Ok(())
    }

    fn add_ham(&self, tokens: &BTreeSet<String>) -> StoreResult<()> {
        self.add(tokens, Label::Ham);
        Ok(())
    }

    fn remove_spam(&self, tokens: &BTreeSet<String>) -> StoreResult<()> {
        self.remove(tokens, Label::Spam)
    }

    fn remove_ham(&self, tokens: &BTreeSet<String>) -> StoreResult<()> {
        self.remove(tokens, Label::Ham)
    }

    fn vocabulary_size(&self) -> StoreResult<u64> {
        Ok(self.counts.len() as u64)
    }
}
