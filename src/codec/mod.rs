//! Conversion between live values and the store's plain tree.
//!
//! Keyed entities are written as references and resolved back through the
//! store's identity table. Value objects are written inline and read back
//! as fresh handles bound to their owner's path. Arrays read back as
//! [`ObservableArray`]s that write every mutation through.

pub mod accessor;
pub mod entity;
pub mod observable;
pub mod value;

use std::sync::Arc;

use thiserror::Error;

pub use accessor::{Accessor, EmbeddedSlot, SharedSlot};
pub use entity::{create_embedded, create_entity, EmbeddedRef, Entity, EntityRef};
pub use observable::ObservableArray;
pub use value::{ObjectRef, Value};

use crate::store::{StateTree, Store, StoreError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Key field {class}.{field} is missing or null")]
    MissingKey { class: String, field: String },
    #[error("Key {value} of {class} must be a string or an integer")]
    InvalidKey { class: String, value: String },
    #[error("Key field {class}.{field} cannot be reassigned")]
    KeyImmutable { class: String, field: String },
    #[error("Unknown entity {class}[{key}]")]
    UnknownEntity { class: String, key: String },
    #[error("Unsupported state at {0}")]
    Unsupported(String),
    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Embedded slot lock poisoned")]
    SlotPoisoned,
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Converts `value` to its stored form. `target` is where the result is
/// about to be written: value objects are rebound to it.
///
/// Every value object's state is read before any of them is rebound, so a
/// value appearing twice (an indexed replace with a sibling) is copied, not
/// swapped. A handle written to several positions stays with the first.
pub fn serialize(value: &Value, target: &Accessor) -> CodecResult<StateTree> {
    let mut rebinds = Vec::new();
    let tree = encode(value, target, &mut rebinds)?;
    for (embedded, owner) in rebinds {
        embedded.rebind(&owner)?;
    }
    Ok(tree)
}

fn encode(
    value: &Value,
    target: &Accessor,
    rebinds: &mut Vec<(EmbeddedRef, Accessor)>,
) -> CodecResult<StateTree> {
    match value {
        Value::Null => Ok(StateTree::Null),
        Value::Boolean(b) => Ok(StateTree::Boolean(*b)),
        Value::Integer(i) => Ok(StateTree::Integer(*i)),
        Value::Float(x) => Ok(StateTree::Float(*x)),
        Value::String(s) => Ok(StateTree::String(s.clone())),
        Value::Array(array) => {
            let items = array
                .iter()
                .enumerate()
                .map(|(i, item)| encode(item, &target.child(i), rebinds))
                .collect::<CodecResult<Vec<_>>>()?;
            Ok(StateTree::list(items))
        }
        Value::Object(ObjectRef::Entity(entity)) => Ok(StateTree::Reference {
            class: entity.class.clone(),
            key: entity.key.clone(),
        }),
        Value::Object(ObjectRef::Embedded(embedded)) => {
            let tree = match embedded.state()? {
                tree @ StateTree::Embedded { .. } => tree,
                StateTree::Map(fields) => StateTree::Embedded {
                    class: embedded.class.clone(),
                    fields,
                },
                _ => StateTree::Embedded {
                    class: embedded.class.clone(),
                    fields: Default::default(),
                },
            };
            if !rebinds
                .iter()
                .any(|(pending, _)| Arc::ptr_eq(&pending.slot, &embedded.slot))
            {
                rebinds.push((embedded.clone(), target.clone()));
            }
            Ok(tree)
        }
    }
}

/// Converts a stored tree read from `source` back to a live value.
pub fn deserialize(tree: &StateTree, source: &Accessor, store: &Store) -> CodecResult<Value> {
    match tree {
        StateTree::Null => Ok(Value::Null),
        StateTree::Boolean(b) => Ok(Value::Boolean(*b)),
        StateTree::Integer(i) => Ok(Value::Integer(*i)),
        StateTree::Float(x) => Ok(Value::Float(*x)),
        StateTree::String(s) => Ok(Value::String(s.clone())),
        StateTree::List(items) => {
            let values = items
                .iter()
                .enumerate()
                .map(|(i, item)| deserialize(item, &source.child(i), store))
                .collect::<CodecResult<Vec<_>>>()?;
            Ok(Value::Array(ObservableArray::bound(values, source.clone())))
        }
        StateTree::Reference { class, key } => {
            Ok(Value::Object(ObjectRef::Entity(EntityRef::lookup(store, class, key)?)))
        }
        StateTree::Embedded { class, .. } => Ok(Value::Object(ObjectRef::Embedded(
            EmbeddedRef::bound(class, source, store),
        ))),
        StateTree::Map(_) => Err(CodecError::Unsupported(
            crate::store::tree::display_path(source.path()),
        )),
    }
}

impl Entity for ObjectRef {
    fn class_name(&self) -> &str {
        ObjectRef::class_name(self)
    }

    fn accessor(&self) -> Accessor {
        match self {
            ObjectRef::Entity(e) => e.accessor(),
            ObjectRef::Embedded(e) => e.accessor(),
        }
    }

    fn store(&self) -> &Store {
        match self {
            ObjectRef::Entity(e) => e.store(),
            ObjectRef::Embedded(e) => e.store(),
        }
    }

    fn set(&self, field: &str, value: &Value) -> CodecResult<()> {
        match self {
            ObjectRef::Entity(e) => e.set(field, value),
            ObjectRef::Embedded(e) => e.set(field, value),
        }
    }
}
