use std::fmt;

use serde_json::{json, Value as JsonValue};

use super::{EmbeddedRef, EntityRef, ObservableArray};

/// Live value handed to and returned from application code.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(ObservableArray),
    Object(ObjectRef),
}

/// Handle to a non-primitive value.
#[derive(Debug, Clone)]
pub enum ObjectRef {
    Entity(EntityRef),
    Embedded(EmbeddedRef),
}

impl ObjectRef {
    pub fn class_name(&self) -> &str {
        match self {
            ObjectRef::Entity(e) => &e.class,
            ObjectRef::Embedded(e) => &e.class,
        }
    }
}

impl PartialEq for ObjectRef {
    /// Entities compare by `(class, key)`; embedded values by the slot they
    /// occupy.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ObjectRef::Entity(a), ObjectRef::Entity(b)) => a.class == b.class && a.key == b.key,
            (ObjectRef::Embedded(a), ObjectRef::Embedded(b)) => a.same_slot(b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.items() == b.items(),
            (Value::Object(a), Value::Object(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, Value::Array(_) | Value::Object(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(x) if x.fract() == 0.0 => Some(*x as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ObservableArray> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut ObservableArray> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Runtime type tag: a primitive name, a class name, or `T[]`.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "void".to_string(),
            Value::Boolean(_) => "boolean".to_string(),
            Value::Integer(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Array(a) => match a.items().first() {
                Some(first) => format!("{}[]", first.type_name()),
                None => "[]".to_string(),
            },
            Value::Object(o) => o.class_name().to_string(),
        }
    }

    /// JSON of primitives; `None` for objects and arrays.
    pub fn primitive_json(&self) -> Option<JsonValue> {
        match self {
            Value::Null => Some(JsonValue::Null),
            Value::Boolean(b) => Some(json!(b)),
            Value::Integer(i) => Some(json!(i)),
            Value::Float(x) => Some(json!(x)),
            Value::String(s) => Some(json!(s)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(a) => {
                let items = a.items().iter().map(ToString::to_string).collect::<Vec<_>>();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Object(ObjectRef::Entity(e)) => write!(f, "{}[{}]", e.class, e.key),
            Value::Object(ObjectRef::Embedded(e)) => write!(f, "{}{{..}}", e.class),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(ObservableArray::detached(items))
    }
}

impl From<EntityRef> for Value {
    fn from(entity: EntityRef) -> Self {
        Value::Object(ObjectRef::Entity(entity))
    }
}

impl From<EmbeddedRef> for Value {
    fn from(embedded: EmbeddedRef) -> Self {
        Value::Object(ObjectRef::Embedded(embedded))
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Value::Object(object)
    }
}
