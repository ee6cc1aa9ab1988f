//! Immutable state tree with structural sharing.
//!
//! `set_path` rebuilds only the chain of nodes from the root down to the
//! written path; every untouched subtree is shared through its `Arc`.

use std::{collections::BTreeMap, fmt, sync::Arc};

use serde_json::{json, Map as JsonMap, Value as JsonValue};

pub const CLASS_NAMESPACE: &str = "CLASS";
pub const OBJECT_NAMESPACE: &str = "OBJECT";
pub const DELETED_FLAG: &str = "__deleted";

#[derive(Debug, Clone, PartialEq, Default)]
pub enum StateTree {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Arc<Vec<StateTree>>),
    Map(Arc<BTreeMap<String, StateTree>>),
    /// Handle to a keyed entity living at `OBJECT[class][key]`.
    Reference { class: String, key: String },
    /// Value object stored inline in its owner.
    Embedded {
        class: String,
        fields: Arc<BTreeMap<String, StateTree>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{}", key),
            PathSegment::Index(index) => write!(f, "[{}]", index),
        }
    }
}

pub fn display_path(path: &[PathSegment]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

/// The empty store: `{CLASS: {}, OBJECT: {}}`.
pub fn root_tree() -> StateTree {
    let mut root = BTreeMap::new();
    root.insert(CLASS_NAMESPACE.to_string(), StateTree::empty_map());
    root.insert(OBJECT_NAMESPACE.to_string(), StateTree::empty_map());
    StateTree::Map(Arc::new(root))
}

pub fn entity_path(class: &str, key: &str) -> Vec<PathSegment> {
    vec![
        OBJECT_NAMESPACE.into(),
        class.into(),
        key.into(),
    ]
}

pub fn static_path(class: &str, field: &str) -> Vec<PathSegment> {
    vec![CLASS_NAMESPACE.into(), class.into(), field.into()]
}

impl StateTree {
    pub fn empty_map() -> Self {
        StateTree::Map(Arc::new(BTreeMap::new()))
    }

    pub fn list(items: Vec<StateTree>) -> Self {
        StateTree::List(Arc::new(items))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StateTree::Null)
    }

    pub fn get(&self, segment: &PathSegment) -> Option<&StateTree> {
        match (self, segment) {
            (StateTree::Map(map), PathSegment::Key(key)) => map.get(key),
            (StateTree::Embedded { fields, .. }, PathSegment::Key(key)) => fields.get(key),
            (StateTree::List(items), PathSegment::Index(index)) => items.get(*index),
            _ => None,
        }
    }

    /// Returns a copy of this node with `segment` replaced by `child`.
    /// Scalars are promoted to the container the segment requires.
    fn with_child(&self, segment: &PathSegment, child: StateTree) -> StateTree {
        match (self, segment) {
            (StateTree::Map(map), PathSegment::Key(key)) => {
                let mut map = map.as_ref().clone();
                map.insert(key.clone(), child);
                StateTree::Map(Arc::new(map))
            }
            (StateTree::Embedded { class, fields }, PathSegment::Key(key)) => {
                let mut fields = fields.as_ref().clone();
                fields.insert(key.clone(), child);
                StateTree::Embedded {
                    class: class.clone(),
                    fields: Arc::new(fields),
                }
            }
            (StateTree::List(items), PathSegment::Index(index)) => {
                let mut items = items.as_ref().clone();
                if *index >= items.len() {
                    items.resize(*index + 1, StateTree::Null);
                }
                items[*index] = child;
                StateTree::List(Arc::new(items))
            }
            (_, PathSegment::Key(key)) => {
                let mut map = BTreeMap::new();
                map.insert(key.clone(), child);
                StateTree::Map(Arc::new(map))
            }
            (_, PathSegment::Index(index)) => {
                let mut items = vec![StateTree::Null; *index + 1];
                items[*index] = child;
                StateTree::List(Arc::new(items))
            }
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            StateTree::Null => JsonValue::Null,
            StateTree::Boolean(b) => json!(b),
            StateTree::Integer(i) => json!(i),
            StateTree::Float(x) => json!(x),
            StateTree::String(s) => json!(s),
            StateTree::List(items) => JsonValue::Array(items.iter().map(Self::to_json).collect()),
            StateTree::Map(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<JsonMap<_, _>>(),
            ),
            StateTree::Reference { class, key } => json!({
                "__kind": "reference",
                "class": class,
                "key": key,
            }),
            StateTree::Embedded { class, fields } => {
                let mut object = fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<JsonMap<_, _>>();
                object.insert("__kind".to_string(), json!("embedded"));
                object.insert("__class".to_string(), json!(class));
                JsonValue::Object(object)
            }
        }
    }
}

/// Walks `path` from `tree`; `None` when any segment is absent.
pub fn get_path<'a>(tree: &'a StateTree, path: &[PathSegment]) -> Option<&'a StateTree> {
    path.iter().try_fold(tree, |node, segment| node.get(segment))
}

/// Pure copy-on-write write of `value` at `path`.
pub fn set_path(tree: &StateTree, path: &[PathSegment], value: StateTree) -> StateTree {
    match path.split_first() {
        None => value,
        Some((head, rest)) => {
            let child = tree.get(head).cloned().unwrap_or_default();
            let child = set_path(&child, rest, value);
            tree.with_child(head, child)
        }
    }
}
