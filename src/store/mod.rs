//! Versioned state store.
//!
//! All live entity state is one [`StateTree`]. Writes happen inside
//! [`Store::dispatch`]: the first dispatch on a call chain opens a
//! transaction over a private copy of the tree, nested dispatches from the
//! same chain run inline against that copy, and the outermost one publishes
//! the result as a new snapshot (or drops it when the mutator fails).

pub mod entity_table;
pub mod tree;

use std::{
    sync::{Arc, Mutex, MutexGuard, RwLock},
    thread::{self, ThreadId},
};

use thiserror::Error;
use tracing::debug;

pub use entity_table::EntityTable;
pub use tree::{get_path, root_tree, set_path, PathSegment, StateTree};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Store lock poisoned")]
    LockPoisoned,
    #[error("Path not found: {0}")]
    PathNotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: u64,
    pub tree: StateTree,
}

#[derive(Debug, Default)]
struct Transaction {
    owner: Option<ThreadId>,
    pending: StateTree,
}

#[derive(Debug)]
struct StoreInner {
    snapshot: RwLock<Snapshot>,
    transaction: Mutex<Transaction>,
    // serializes independent call chains; held for the whole outer dispatch
    gate: Mutex<()>,
    entities: EntityTable,
}

/// Cheaply cloneable handle; clones share the same state.
#[derive(Debug, Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Store {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                snapshot: RwLock::new(Snapshot {
                    version: 0,
                    tree: root_tree(),
                }),
                transaction: Mutex::new(Transaction::default()),
                gate: Mutex::new(()),
                entities: EntityTable::new(),
            }),
        }
    }

    pub fn entities(&self) -> &EntityTable {
        &self.inner.entities
    }

    fn lock_transaction(&self) -> StoreResult<MutexGuard<'_, Transaction>> {
        self.inner
            .transaction
            .lock()
            .map_err(|_| StoreError::LockPoisoned)
    }

    /// True when the calling thread owns the open transaction.
    pub fn in_transaction(&self) -> bool {
        self.lock_transaction()
            .map(|txn| txn.owner == Some(thread::current().id()))
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> StoreResult<Snapshot> {
        self.inner
            .snapshot
            .read()
            .map(|s| s.clone())
            .map_err(|_| StoreError::LockPoisoned)
    }

    pub fn version(&self) -> StoreResult<u64> {
        Ok(self.snapshot()?.version)
    }

    /// The tree visible to the caller: the pending copy inside its own
    /// transaction, the published snapshot otherwise.
    pub fn current_tree(&self) -> StoreResult<StateTree> {
        {
            let txn = self.lock_transaction()?;
            if txn.owner == Some(thread::current().id()) {
                return Ok(txn.pending.clone());
            }
        }
        Ok(self.snapshot()?.tree)
    }

    pub fn get_path(&self, path: &[PathSegment]) -> StoreResult<Option<StateTree>> {
        let tree = self.current_tree()?;
        Ok(get_path(&tree, path).cloned())
    }

    pub fn set_path(&self, path: &[PathSegment], value: StateTree) -> StoreResult<()> {
        self.dispatch(|| {
            let mut txn = self.lock_transaction()?;
            txn.pending = set_path(&txn.pending, path, value);
            Ok(())
        })
    }

    /// Runs `mutator` atomically. Reentrant: a dispatch issued while the
    /// caller already owns the transaction executes inline.
    pub fn dispatch<R, E, F>(&self, mutator: F) -> Result<R, E>
    where
        F: FnOnce() -> Result<R, E>,
        E: From<StoreError>,
    {
        if self.in_transaction() {
            return mutator();
        }

        let _gate = self.inner.gate.lock().map_err(|_| StoreError::LockPoisoned)?;
        let base = self.snapshot()?;
        {
            let mut txn = self.lock_transaction()?;
            txn.owner = Some(thread::current().id());
            txn.pending = base.tree;
        }
        let guard = TransactionGuard { store: self };

        let result = mutator();
        match result {
            Ok(value) => {
                let pending = guard.finish()?;
                let mut snapshot = self
                    .inner
                    .snapshot
                    .write()
                    .map_err(|_| StoreError::LockPoisoned)?;
                snapshot.version = base.version + 1;
                snapshot.tree = pending;
                debug!("Published store version {}", snapshot.version);
                Ok(value)
            }
            Err(e) => {
                debug!("Transaction rolled back at version {}", base.version);
                Err(e)
            }
        }
    }

    /// Drops all state and identities.
    pub fn reset(&self) -> StoreResult<()> {
        let _gate = self.inner.gate.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut snapshot = self
            .inner
            .snapshot
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        snapshot.version = 0;
        snapshot.tree = root_tree();
        self.inner.entities.clear();
        Ok(())
    }
}

/// Clears transaction ownership however the outer dispatch exits.
struct TransactionGuard<'a> {
    store: &'a Store,
}

impl TransactionGuard<'_> {
    fn finish(self) -> StoreResult<StateTree> {
        let mut txn = self.store.lock_transaction()?;
        Ok(std::mem::take(&mut txn.pending))
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut txn) = self.store.inner.transaction.lock() {
            txn.owner = None;
            txn.pending = StateTree::Null;
        }
    }
}
