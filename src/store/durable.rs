//! ACID-durable token counts backed by redb.
//!
//! One table maps each token to its `(spam, ham)` message counts. The global
//! message totals are not a separate record: they live in the row of the
//! reserved [`DOC_COUNT_TOKEN`], whose columns double as `(nspam, nham)`.
//!
//! Every training call is a single write transaction. redb admits one writer
//! at a time, so the insert-or-add of each row and the sentinel update commit
//! together and concurrent trainers never lose an update.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition, WriteTransaction};

use crate::error::StoreError;
use crate::store::{GlobalCounts, Label, StoreResult, TokenCounts, TokenStore};

/// Token → (spam messages, ham messages).
const TOKENS_TABLE: TableDefinition<&str, (u64, u64)> = TableDefinition::new("tokens");

/// Reserved key holding `(nspam, nham)`.
///
/// The surrounding spaces keep it out of reach of any whitespace-splitting
/// tokenizer.
pub const DOC_COUNT_TOKEN: &str = " $DOC_COUNT$ ";

/// Database file name inside the data directory.
const DB_FILE: &str = "tokens.redb";

fn redb_err<E: std::fmt::Display>(op: &'static str) -> impl FnOnce(E) -> StoreError {
    move |e| StoreError::Redb {
        message: format!("{op} failed: {e}"),
    }
}

/// Persistent count store using redb.
///
/// Writes go through transactions; reads use MVCC snapshots, so a
/// classification sees either all or none of a concurrent training call.
pub struct DurableStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl DurableStore {
    /// Open or create the token database in the given directory.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Io { source: e })?;
        let path = data_dir.join(DB_FILE);
        let db = Database::create(&path).map_err(|e| StoreError::Redb {
            message: format!("failed to open redb at {}: {e}", path.display()),
        })?;

        // Create the table up front so read transactions never miss it.
        let txn = db.begin_write().map_err(redb_err("begin_write"))?;
        txn.open_table(TOKENS_TABLE).map_err(redb_err("open_table"))?;
        txn.commit().map_err(redb_err("commit"))?;

        tracing::info!(path = %path.display(), "opened durable token store");
        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn begin_write(&self) -> StoreResult<WriteTransaction> {
        self.db.begin_write().map_err(redb_err("begin_write"))
    }

    /// Insert-or-add `label`'s unit to every token and to the sentinel row.
    fn add(&self, tokens: &BTreeSet<String>, label: Label) -> StoreResult<()> {
        reject_reserved(tokens)?;
        let unit = label.unit();
        let txn = self.begin_write()?;
        {
            let mut table = txn.open_table(TOKENS_TABLE).map_err(redb_err("open_table"))?;
            for key in tokens.iter().map(String::as_str).chain([DOC_COUNT_TOKEN]) {
                let (spam, ham) = table
                    .get(key)
                    .map_err(redb_err("get"))?
                    .map(|guard| guard.value())
                    .unwrap_or((0, 0));
                table
                    .insert(key, (spam + unit.spam, ham + unit.ham))
                    .map_err(redb_err("insert"))?;
            }
        }
        txn.commit().map_err(redb_err("commit"))?;
        tracing::debug!(%label, tokens = tokens.len(), "trained message in durable store");
        Ok(())
    }

    /// Subtract `label`'s unit from existing rows only.
    ///
    /// The whole message is checked inside the write transaction before any
    /// row changes; a failed check aborts the transaction.
    fn remove(&self, tokens: &BTreeSet<String>, label: Label) -> StoreResult<()> {
        reject_reserved(tokens)?;
        let txn = self.begin_write()?;
        match Self::decrement(&txn, tokens, label) {
            Ok(()) => {
                txn.commit().map_err(redb_err("commit"))?;
                tracing::debug!(%label, tokens = tokens.len(), "untrained message in durable store");
                Ok(())
            }
            Err(e) => {
                txn.abort().map_err(redb_err("abort"))?;
                Err(e)
            }
        }
    }

    fn decrement(txn: &WriteTransaction, tokens: &BTreeSet<String>, label: Label) -> StoreResult<()> {
        let mut table = txn.open_table(TOKENS_TABLE).map_err(redb_err("open_table"))?;

        let totals = table
            .get(DOC_COUNT_TOKEN)
            .map_err(redb_err("get"))?
            .map(|guard| guard.value())
            .unwrap_or((0, 0));
        if label.count_of(TokenCounts::new(totals.0, totals.1)) == 0 {
            return Err(StoreError::NothingTrained {
                label: label.to_string(),
            });
        }

        let mut updated = Vec::with_capacity(tokens.len() + 1);
        for token in tokens {
            let current = table
                .get(token.as_str())
                .map_err(redb_err("get"))?
                .map(|guard| guard.value());
            let (spam, ham) = match current {
                Some(row) if label.count_of(TokenCounts::new(row.0, row.1)) > 0 => row,
                Some(_) => return Err(inconsistent(token, label, "count is already zero")),
                None => return Err(inconsistent(token, label, "token was never trained")),
            };
            updated.push((token.as_str(), (spam, ham)));
        }
        updated.push((DOC_COUNT_TOKEN, totals));

        let unit = label.unit();
        for (key, (spam, ham)) in updated {
            table
                .insert(key, (spam - unit.spam, ham - unit.ham))
                .map_err(redb_err("insert"))?;
        }
        Ok(())
    }
}

fn inconsistent(token: &str, label: Label, reason: &str) -> StoreError {
    tracing::warn!(%label, token, reason, "rejected untraining");
    StoreError::Inconsistent {
        token: token.to_owned(),
        message: format!("{label} {reason}"),
    }
}

fn reject_reserved(tokens: &BTreeSet<String>) -> StoreResult<()> {
    if tokens.contains(DOC_COUNT_TOKEN) {
        return Err(StoreError::Inconsistent {
            token: DOC_COUNT_TOKEN.to_owned(),
            message: "token is reserved for the message totals".into(),
        });
    }
    Ok(())
}

impl TokenStore for DurableStore {
    fn global_counts(&self) -> StoreResult<GlobalCounts> {
        Ok(self.counts_snapshot(&BTreeSet::new())?.0)
    }

    fn token_counts(&self, tokens: &BTreeSet<String>) -> StoreResult<HashMap<String, TokenCounts>> {
        Ok(self.counts_snapshot(tokens)?.1)
    }

    /// Served from a single read transaction.
    fn counts_snapshot(
        &self,
        tokens: &BTreeSet<String>,
    ) -> StoreResult<(GlobalCounts, HashMap<String, TokenCounts>)> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn.open_table(TOKENS_TABLE).map_err(redb_err("open_table"))?;

        let (nspam, nham) = table
            .get(DOC_COUNT_TOKEN)
            .map_err(redb_err("get"))?
            .map(|guard| guard.value())
            .unwrap_or((0, 0));

        let mut counts = HashMap::with_capacity(tokens.len());
        for token in tokens.iter().filter(|t| t.as_str() != DOC_COUNT_TOKEN) {
            if let Some(guard) = table.get(token.as_str()).map_err(redb_err("get"))? {
                let (spam, ham) = guard.value();
                counts.insert(token.clone(), TokenCounts::new(spam, ham));
            }
        }
        Ok((GlobalCounts::new(nspam, nham), counts))
    }

    fn add_spam(&self, tokens: &BTreeSet<String>) -> StoreResult<()> {
        self.add(tokens, Label::Spam)
    }

    fn add_ham(&self, tokens: &BTreeSet<String>) -> StoreResult<()> {
        self.add(tokens, Label::Ham)
    }

    fn remove_spam(&self, tokens: &BTreeSet<String>) -> StoreResult<()> {
        self.remove(tokens, Label::Spam)
    }

    fn remove_ham(&self, tokens: &BTreeSet<String>) -> StoreResult<()> {
        self.remove(tokens, Label::Ham)
    }

    fn vocabulary_size(&self) -> StoreResult<u64> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn.open_table(TOKENS_TABLE).map_err(redb_err("open_table"))?;
        let rows = table.len().map_err(redb_err("len"))?;
        let sentinel = table.get(DOC_COUNT_TOKEN).map_err(redb_err("get"))?.is_some();
        Ok(rows - u64::from(sentinel))
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore")
            .field("path", &self.path)
            .finish()
    }
}
