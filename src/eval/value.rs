use serde_json::{json, Value as JsonValue};

use crate::{
    codec::{ObservableArray, Value},
    descriptor::{base_type, split_array_type},
};

pub const VOID_TYPE: &str = "void";

/// Evaluator result of any node.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    /// A bare class name used as the receiver of static members.
    Class(String),
    /// A single value of `object_type`; `None` is void or a dry-run
    /// placeholder.
    Object {
        object_type: String,
        value: Option<Value>,
    },
    Array {
        value: Vec<TypedValue>,
        element_type: Option<String>,
    },
}

impl TypedValue {
    pub fn object(object_type: impl Into<String>, value: Value) -> Self {
        TypedValue::Object {
            object_type: object_type.into(),
            value: Some(value),
        }
    }

    pub fn void() -> Self {
        TypedValue::Object {
            object_type: VOID_TYPE.to_string(),
            value: None,
        }
    }

    pub fn empty_array() -> Self {
        TypedValue::Array {
            value: Vec::new(),
            element_type: None,
        }
    }

    /// Empty array that still knows what it would hold.
    pub fn empty_of(element_type: Option<&str>) -> Self {
        TypedValue::Array {
            value: Vec::new(),
            element_type: element_type.map(str::to_string),
        }
    }

    /// Builds an array whose element type follows its first element.
    pub fn array_of(items: Vec<TypedValue>) -> Self {
        let element_type = items.first().map(TypedValue::type_tag);
        TypedValue::Array {
            value: items,
            element_type,
        }
    }

    /// Like [`TypedValue::array_of`], falling back to `declared` when there
    /// is no element to take the type from.
    pub fn array_or(items: Vec<TypedValue>, declared: Option<String>) -> Self {
        if items.is_empty() {
            TypedValue::Array {
                value: items,
                element_type: declared,
            }
        } else {
            TypedValue::array_of(items)
        }
    }

    /// Placeholder of the declared shape: arrays hold one void element so
    /// chained members still validate.
    pub fn placeholder(declared: &str) -> Self {
        let declared = base_type(declared);
        match split_array_type(declared) {
            Some(element) => TypedValue::Array {
                value: vec![TypedValue::placeholder(element)],
                element_type: Some(base_type(element).to_string()),
            },
            None => TypedValue::Object {
                object_type: declared.to_string(),
                value: None,
            },
        }
    }

    /// Wraps a live value according to its declared type.
    pub fn from_declared(declared: &str, value: Value) -> Self {
        let declared = base_type(declared);
        if declared == VOID_TYPE {
            return TypedValue::void();
        }
        match (split_array_type(declared), value) {
            (Some(element), Value::Array(array)) => TypedValue::Array {
                value: array
                    .into_items()
                    .into_iter()
                    .map(|item| TypedValue::from_declared(element, item))
                    .collect(),
                element_type: Some(base_type(element).to_string()),
            },
            (Some(element), Value::Null) => TypedValue::empty_of(Some(base_type(element))),
            (_, value) => TypedValue::object(declared, value),
        }
    }

    /// Wraps a live value using its runtime type.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(array) => TypedValue::array_of(
                array
                    .into_items()
                    .into_iter()
                    .map(TypedValue::from_value)
                    .collect(),
            ),
            value => TypedValue::object(value.type_name(), value),
        }
    }

    /// Class name, primitive tag, or `T[]`.
    pub fn type_tag(&self) -> String {
        match self {
            TypedValue::Class(name) => name.clone(),
            TypedValue::Object { object_type, .. } => object_type.clone(),
            TypedValue::Array { element_type, .. } => match element_type {
                Some(element) => format!("{}[]", element),
                None => "[]".to_string(),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TypedValue::Class(_) => "class",
            TypedValue::Object { .. } => "object",
            TypedValue::Array { .. } => "array",
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            TypedValue::Object { value, .. } => value.as_ref(),
            _ => None,
        }
    }

    /// Native form for application code: placeholders become `Null`.
    pub fn strip(&self) -> Value {
        match self {
            TypedValue::Class(_) => Value::Null,
            TypedValue::Object { value, .. } => value.clone().unwrap_or_default(),
            TypedValue::Array { value, .. } => Value::Array(ObservableArray::detached(
                value.iter().map(TypedValue::strip).collect(),
            )),
        }
    }

    /// Shape without live handles, for logs and step traces.
    pub fn summary(&self) -> JsonValue {
        match self {
            TypedValue::Class(name) => json!({"type": "class", "name": name}),
            TypedValue::Object { object_type, value } => json!({
                "type": "object",
                "objectType": object_type,
                "value": value.as_ref().map(ToString::to_string),
            }),
            TypedValue::Array {
                value,
                element_type,
            } => json!({
                "type": "array",
                "elementType": element_type,
                "value": value.iter().map(TypedValue::summary).collect::<Vec<_>>(),
            }),
        }
    }
}
