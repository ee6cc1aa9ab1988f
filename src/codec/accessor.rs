use std::sync::{Arc, RwLock};

use super::{CodecError, CodecResult};
use crate::store::{get_path, set_path, PathSegment, StateTree, Store};

/// State of an embedded value: its own local tree until it is written into
/// an owner, then a delegate to the owner's path.
#[derive(Debug, Clone)]
pub enum EmbeddedSlot {
    Local(StateTree),
    Bound(Accessor),
}

pub type SharedSlot = Arc<RwLock<EmbeddedSlot>>;

#[derive(Debug, Clone)]
enum AccessorRoot {
    Store(Store),
    Slot(SharedSlot),
}

/// A get/set pair over one path. `get` re-reads on every call.
#[derive(Debug, Clone)]
pub struct Accessor {
    root: AccessorRoot,
    path: Vec<PathSegment>,
}

impl Accessor {
    pub fn store(store: &Store, path: Vec<PathSegment>) -> Self {
        Self {
            root: AccessorRoot::Store(store.clone()),
            path,
        }
    }

    pub fn slot(slot: &SharedSlot) -> Self {
        Self {
            root: AccessorRoot::Slot(slot.clone()),
            path: Vec::new(),
        }
    }

    pub fn child(&self, segment: impl Into<PathSegment>) -> Self {
        let mut path = self.path.clone();
        path.push(segment.into());
        Self {
            root: self.root.clone(),
            path,
        }
    }

    fn descend(&self, suffix: &[PathSegment]) -> Self {
        let mut path = self.path.clone();
        path.extend_from_slice(suffix);
        Self {
            root: self.root.clone(),
            path,
        }
    }

    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    /// Current value, `Null` when nothing is stored at the path.
    pub fn get(&self) -> CodecResult<StateTree> {
        match &self.root {
            AccessorRoot::Store(store) => Ok(store.get_path(&self.path)?.unwrap_or_default()),
            AccessorRoot::Slot(slot) => {
                let state = slot
                    .read()
                    .map_err(|_| CodecError::SlotPoisoned)?
                    .clone();
                match state {
                    EmbeddedSlot::Local(tree) => {
                        Ok(get_path(&tree, &self.path).cloned().unwrap_or_default())
                    }
                    EmbeddedSlot::Bound(owner) => owner.descend(&self.path).get(),
                }
            }
        }
    }

    pub fn set(&self, value: StateTree) -> CodecResult<()> {
        match &self.root {
            AccessorRoot::Store(store) => Ok(store.set_path(&self.path, value)?),
            AccessorRoot::Slot(slot) => {
                let owner = {
                    let mut state = slot.write().map_err(|_| CodecError::SlotPoisoned)?;
                    match &mut *state {
                        EmbeddedSlot::Local(tree) => {
                            *tree = set_path(tree, &self.path, value);
                            return Ok(());
                        }
                        EmbeddedSlot::Bound(owner) => owner.clone(),
                    }
                };
                owner.descend(&self.path).set(value)
            }
        }
    }

    /// True when both accessors address the same location.
    pub fn same_target(&self, other: &Accessor) -> bool {
        self.path == other.path
            && match (&self.root, &other.root) {
                (AccessorRoot::Store(a), AccessorRoot::Store(b)) => a == b,
                (AccessorRoot::Slot(a), AccessorRoot::Slot(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
    }
}
