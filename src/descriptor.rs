//! Class metadata consumed by the evaluator and the entity codec.
//!
//! Descriptors are plain data. They carry no behavior beyond equality
//! (`is_same`) and the C-like text rendering produced by `description()`,
//! which is handed verbatim to prompt builders.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type tags that never name a class.
pub const PRIMITIVE_TYPES: [&str; 6] = ["string", "int", "float", "boolean", "bool", "void"];

pub fn is_primitive_type(type_name: &str) -> bool {
    PRIMITIVE_TYPES.contains(&type_name)
}

/// Splits `"Food[]"` into `Some("Food")`. Non-array tags return `None`.
pub fn split_array_type(type_name: &str) -> Option<&str> {
    type_name.strip_suffix("[]")
}

/// Strips the optional marker (`DateTime?`) some declarations carry.
pub fn base_type(type_name: &str) -> &str {
    type_name.trim_end_matches('?')
}

/// Default of a parameter. Expressions are rendered between backticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum DefaultValue {
    String(String),
    Int(i64),
    Float(f64),
    Boolean(bool),
    Expression(String),
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::String(s) => write!(f, "{}", s),
            DefaultValue::Int(i) => write!(f, "{}", i),
            DefaultValue::Float(x) => write!(f, "{}", x),
            DefaultValue::Boolean(b) => write!(f, "{}", b),
            DefaultValue::Expression(e) => write!(f, "`{}`", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub name: String,
    pub param_type: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub default_value: Option<DefaultValue>,
}

fn default_required() -> bool {
    true
}

impl ParamDescriptor {
    pub fn new(name: impl Into<String>, param_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            required: true,
            default_value: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_default(mut self, value: DefaultValue) -> Self {
        self.required = false;
        self.default_value = Some(value);
        self
    }

    pub fn description(&self) -> String {
        match &self.default_value {
            Some(value) => format!("{}: {} = {}", self.name, self.param_type, value),
            None => format!("{}: {}", self.name, self.param_type),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDescriptor {
    pub func_name: String,
    #[serde(default)]
    pub parameters: Vec<ParamDescriptor>,
    pub return_type: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub comment: String,
}

impl FuncDescriptor {
    pub fn new(
        func_name: impl Into<String>,
        parameters: Vec<ParamDescriptor>,
        return_type: impl Into<String>,
    ) -> Self {
        Self {
            func_name: func_name.into(),
            parameters,
            return_type: return_type.into(),
            is_static: false,
            comment: String::new(),
        }
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn param(&self, name: &str) -> Option<&ParamDescriptor> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn description(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(ParamDescriptor::description)
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{}{}{} {}({});",
            comment_prefix(&self.comment),
            if self.is_static { "static " } else { "" },
            self.return_type,
            self.func_name,
            params
        )
    }

    /// Positional agreement of name, return type, static flag and parameter
    /// name/type pairs. Comments and defaults are ignored.
    pub fn is_same(&self, other: &FuncDescriptor) -> bool {
        self.func_name == other.func_name
            && self.return_type == other.return_type
            && self.is_static == other.is_static
            && self.parameters.len() == other.parameters.len()
            && self
                .parameters
                .iter()
                .zip(&other.parameters)
                .all(|(a, b)| a.name == b.name && a.param_type == b.param_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub field: String,
    pub field_type: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub comment: String,
}

impl FieldDescriptor {
    pub fn new(field: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            field_type: field_type.into(),
            is_static: false,
            comment: String::new(),
        }
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn description(&self) -> String {
        format!(
            "{}{}{} {};",
            comment_prefix(&self.comment),
            if self.is_static { "static " } else { "" },
            self.field_type,
            self.field
        )
    }

    pub fn is_same(&self, other: &FieldDescriptor) -> bool {
        self.field == other.field
            && self.field_type == other.field_type
            && self.is_static == other.is_static
    }
}

fn comment_prefix(comment: &str) -> String {
    if comment.is_empty() {
        String::new()
    } else {
        format!("// {}\n\t", comment)
    }
}

/// Fields and functions are kept in insertion order; adding a member whose
/// name is already present replaces it in place.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub class_name: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub functions: Vec<FuncDescriptor>,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl ClassDescriptor {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            ..Default::default()
        }
    }

    pub fn add_field(&mut self, field: FieldDescriptor) {
        match self.fields.iter_mut().find(|f| f.field == field.field) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    pub fn add_function(&mut self, function: FuncDescriptor) {
        match self
            .functions
            .iter_mut()
            .find(|f| f.func_name == function.func_name)
        {
            Some(existing) => *existing = function,
            None => self.functions.push(function),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.field == name)
    }

    pub fn function(&self, name: &str) -> Option<&FuncDescriptor> {
        self.functions.iter().find(|f| f.func_name == name)
    }

    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| !f.is_static)
    }

    /// True when every member present in both descriptors agrees and both
    /// declare the same member names.
    pub fn is_same(&self, other: &ClassDescriptor) -> bool {
        self.class_name == other.class_name
            && self.fields.len() == other.fields.len()
            && self.functions.len() == other.functions.len()
            && self.fields.iter().all(|f| {
                other
                    .field(&f.field)
                    .map(|o| f.is_same(o))
                    .unwrap_or(false)
            })
            && self.functions.iter().all(|f| {
                other
                    .function(&f.func_name)
                    .map(|o| f.is_same(o))
                    .unwrap_or(false)
            })
    }

    pub fn description(&self) -> String {
        let fields = self
            .fields
            .iter()
            .map(|f| format!("\t{}", f.description()))
            .collect::<Vec<_>>()
            .join("\n");
        let functions = self
            .functions
            .iter()
            .map(|f| format!("\t{}", f.description()))
            .collect::<Vec<_>>()
            .join("\n");
        let header = if self.comment.is_empty() {
            String::new()
        } else {
            format!("// {}\n", self.comment)
        };
        format!(
            "{}class {} {{\n{}\n{}\n}}",
            header, self.class_name, fields, functions
        )
    }
}
