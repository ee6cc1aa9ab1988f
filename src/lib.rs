//! # Genie: typed object-graph expressions over a reactive store
//!
//! Genie evaluates small expression programs such as
//! `Restaurant.all().matching(field: .address, value: "palo alto")[0].name`
//! against classes registered by the host application.
//!
//! ## Pipeline
//!
//! ```text
//! Source → Analyzer → AST → Evaluator (ExecutionContext) → TypedValue → describe
//! ```
//!
//! - Parsing ([`analyzer`]) produces the tree in [`ast`].
//! - Classes are declared through [`descriptor`] and registered with behavior
//!   in [`class_registry`].
//! - The [`eval`] module resolves nodes, applies the built-in array operators
//!   and records evaluation steps. A dry run validates member access without
//!   touching state.
//!
//! ## State
//!
//! All entity state lives in one immutable tree owned by [`store::Store`].
//! Mutations run inside `dispatch`, which is reentrant and publishes a new
//! snapshot only when the outermost closure succeeds. The [`codec`] module
//! maps between host values and the tree, keeping entity identity through
//! references and binding arrays and embedded objects to their location.

pub mod analyzer;
pub mod ast;
pub mod class_registry;
pub mod codec;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod eval;
pub mod store;

// Re-exports
pub use analyzer::{parse_expression, parse_program, ParseError};
pub use ast::{Node, Program};
pub use class_registry::{Arguments, ClassBuilder, ClassRegistry};
pub use codec::{Entity, ObjectRef, Value};
pub use config::InterpreterConfig;
pub use error::*;
pub use eval::{EvalError, EvalResult, Evaluator, ExecutionContext, Step, TypedValue};
pub use store::Store;
