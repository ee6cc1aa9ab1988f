use serde::{Deserialize, Serialize};

/// A parsed program: top-level statements in source order.
pub type Program = Vec<Node>;

/// Expression nodes, tagged by `type` when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Access {
        parent: Parent,
        access: Member,
    },
    Index {
        parent: Parent,
        index: IndexValue,
    },
    FunctionCall {
        func_name: String,
        parameters: Option<Vec<Parameter>>,
    },
    Array {
        value: Vec<Node>,
    },
    String {
        value: String,
    },
    Int {
        value: i64,
    },
    Float {
        value: f64,
    },
    Boolean {
        value: bool,
    },
    /// `.field` or `.field.sub`, kept as a dotted path.
    Accessor {
        field: String,
    },
}

/// The receiver of an access or index: a bare class name or a sub-expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Parent {
    Class(String),
    Node(Box<Node>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Member {
    Field(String),
    Node(Box<Node>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexValue {
    Literal(i64),
    Node(Box<Node>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub parameter: String,
    pub value: Node,
}

impl Node {
    pub fn access(parent: Parent, access: Member) -> Self {
        Node::Access { parent, access }
    }

    pub fn call(func_name: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Node::FunctionCall {
            func_name: func_name.into(),
            parameters: if parameters.is_empty() {
                None
            } else {
                Some(parameters)
            },
        }
    }

    pub fn accessor_path(&self) -> Option<Vec<String>> {
        match self {
            Node::Accessor { field } => Some(
                field
                    .trim_start_matches('.')
                    .split('.')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Node kind as written in the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Access { .. } => "access",
            Node::Index { .. } => "index",
            Node::FunctionCall { .. } => "function_call",
            Node::Array { .. } => "array",
            Node::String { .. } => "string",
            Node::Int { .. } => "int",
            Node::Float { .. } => "float",
            Node::Boolean { .. } => "boolean",
            Node::Accessor { .. } => "accessor",
        }
    }
}

impl Parent {
    pub fn node(node: Node) -> Self {
        Parent::Node(Box::new(node))
    }
}

impl Member {
    pub fn call(node: Node) -> Self {
        Member::Node(Box::new(node))
    }
}
