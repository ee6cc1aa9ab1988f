use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use tracing::debug;

use super::{
    deserialize, serialize, Accessor, CodecError, CodecResult, EmbeddedSlot, SharedSlot, Value,
};
use crate::store::{tree::entity_path, StateTree, Store};

/// Field-level access to a live object.
pub trait Entity {
    fn class_name(&self) -> &str;

    /// Accessor for the object's own subtree.
    fn accessor(&self) -> Accessor;

    fn store(&self) -> &Store;

    fn get(&self, field: &str) -> CodecResult<Value> {
        let accessor = self.accessor().child(field);
        deserialize(&accessor.get()?, &accessor, self.store())
    }

    fn set(&self, field: &str, value: &Value) -> CodecResult<()> {
        let accessor = self.accessor().child(field);
        self.store().dispatch(|| {
            let tree = serialize(value, &accessor)?;
            accessor.set(tree)
        })
    }

    /// Current stored subtree of the object.
    fn state(&self) -> CodecResult<StateTree> {
        self.accessor().get()
    }
}

/// Handle to a keyed entity. Two handles with the same class and key
/// observe the same state.
#[derive(Debug, Clone)]
pub struct EntityRef {
    pub class: String,
    pub key: String,
    store: Store,
}

impl EntityRef {
    pub(crate) fn new(class: &str, key: &str, store: &Store) -> Self {
        Self {
            class: class.to_string(),
            key: key.to_string(),
            store: store.clone(),
        }
    }

    /// Looks up a registered entity.
    pub fn lookup(store: &Store, class: &str, key: &str) -> CodecResult<Self> {
        if store.entities().contains(class, key) {
            Ok(Self::new(class, key, store))
        } else {
            Err(CodecError::UnknownEntity {
                class: class.to_string(),
                key: key.to_string(),
            })
        }
    }

    pub fn is_deleted(&self) -> CodecResult<bool> {
        Ok(matches!(
            self.accessor()
                .child(crate::store::tree::DELETED_FLAG)
                .get()?,
            StateTree::Boolean(true)
        ))
    }
}

impl Entity for EntityRef {
    fn class_name(&self) -> &str {
        &self.class
    }

    fn accessor(&self) -> Accessor {
        Accessor::store(&self.store, entity_path(&self.class, &self.key))
    }

    fn store(&self) -> &Store {
        &self.store
    }

    fn set(&self, field: &str, value: &Value) -> CodecResult<()> {
        if self.store.entities().key_field(&self.class).as_deref() == Some(field) {
            return Err(CodecError::KeyImmutable {
                class: self.class.clone(),
                field: field.to_string(),
            });
        }
        let accessor = self.accessor().child(field);
        self.store.dispatch(|| {
            let tree = serialize(value, &accessor)?;
            accessor.set(tree)
        })
    }
}

/// Value object owned by some slot of another object. Fresh handles are
/// created on every read; they delegate to the owner's path.
#[derive(Debug, Clone)]
pub struct EmbeddedRef {
    pub class: String,
    pub(crate) slot: SharedSlot,
    store: Store,
}

impl EmbeddedRef {
    pub(crate) fn bound(class: &str, owner: &Accessor, store: &Store) -> Self {
        Self {
            class: class.to_string(),
            slot: Arc::new(RwLock::new(EmbeddedSlot::Bound(owner.clone()))),
            store: store.clone(),
        }
    }

    pub fn same_slot(&self, other: &EmbeddedRef) -> bool {
        if Arc::ptr_eq(&self.slot, &other.slot) {
            return true;
        }
        match (self.slot.read(), other.slot.read()) {
            (Ok(a), Ok(b)) => match (&*a, &*b) {
                (EmbeddedSlot::Bound(a), EmbeddedSlot::Bound(b)) => a.same_target(b),
                _ => false,
            },
            _ => false,
        }
    }

    /// True once the value has been written into an owner.
    pub fn is_bound(&self) -> bool {
        self.slot
            .read()
            .map(|slot| matches!(&*slot, EmbeddedSlot::Bound(_)))
            .unwrap_or(false)
    }

    pub(crate) fn rebind(&self, owner: &Accessor) -> CodecResult<()> {
        let mut slot = self.slot.write().map_err(|_| CodecError::SlotPoisoned)?;
        *slot = EmbeddedSlot::Bound(owner.clone());
        Ok(())
    }
}

impl Entity for EmbeddedRef {
    fn class_name(&self) -> &str {
        &self.class
    }

    fn accessor(&self) -> Accessor {
        Accessor::slot(&self.slot)
    }

    fn store(&self) -> &Store {
        &self.store
    }
}

fn key_string(class: &str, key_field: &str, value: Option<&Value>) -> CodecResult<String> {
    match value {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Integer(i)) => Ok(i.to_string()),
        Some(Value::Null) | None => Err(CodecError::MissingKey {
            class: class.to_string(),
            field: key_field.to_string(),
        }),
        Some(other) => Err(CodecError::InvalidKey {
            class: class.to_string(),
            value: other.to_string(),
        }),
    }
}

/// Writes a new entity at `OBJECT[class][key]` in one transaction and
/// registers its identity. An existing record with the same key is replaced.
pub fn create_entity(
    store: &Store,
    class: &str,
    key_field: &str,
    fields: Vec<(String, Value)>,
) -> CodecResult<EntityRef> {
    let key = key_string(
        class,
        key_field,
        fields
            .iter()
            .find(|(name, _)| name == key_field)
            .map(|(_, value)| value),
    )?;
    let entity = EntityRef::new(class, &key, store);
    let root = entity.accessor();

    store.dispatch(|| {
        root.set(StateTree::empty_map())?;
        for (name, value) in &fields {
            let accessor = root.child(name.as_str());
            let tree = serialize(value, &accessor)?;
            accessor.set(tree)?;
        }
        Ok::<_, CodecError>(())
    })?;
    store.entities().register(class, key_field, &key);
    debug!("Created entity {}[{}]", class, key);
    Ok(entity)
}

/// Builds an unowned value object from its fields.
pub fn create_embedded(
    store: &Store,
    class: &str,
    fields: Vec<(String, Value)>,
) -> CodecResult<EmbeddedRef> {
    let embedded = EmbeddedRef {
        class: class.to_string(),
        slot: Arc::new(RwLock::new(EmbeddedSlot::Local(StateTree::Embedded {
            class: class.to_string(),
            fields: Arc::new(BTreeMap::new()),
        }))),
        store: store.clone(),
    };
    for (name, value) in &fields {
        let accessor = embedded.accessor().child(name.as_str());
        let tree = serialize(value, &accessor)?;
        accessor.set(tree)?;
    }
    Ok(embedded)
}
