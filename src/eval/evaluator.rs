use std::sync::Arc;

use serde_json::{json, Value as JsonValue};
use thiserror::Error;

use super::{
    context::ExecutionContext,
    expression::ExpressionEvaluator,
    statement::{StatementEvaluator, Step},
    value::TypedValue,
};
use crate::{
    analyzer,
    ast::{Node, Program},
    class_registry::ClassRegistry,
    codec::{CodecError, Value},
    config::InterpreterConfig,
    store::{Store, StoreError},
    InternalResult,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    // structural
    #[error("Class {0} is missing")]
    ClassMissing(String),
    #[error("Field {class}.{field} is missing")]
    FieldMissing { class: String, field: String },
    #[error("Field {class}.{field} should be static")]
    FieldStatic { class: String, field: String },
    #[error("Function {class}.{function} is missing")]
    FunctionMissing { class: String, function: String },
    #[error("Function {class}.{function} should be static")]
    FunctionStatic { class: String, function: String },

    #[error("Index {index} out of range for array of length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("Cannot compare {0} with {1}")]
    Incomparable(String, String),
    #[error("Class {0} does not define compare")]
    MissingComparator(String),
    #[error("Array elements must share one object type, found {0} and {1}")]
    HeterogeneousArray(String, String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Null reference: {0}")]
    NullReference(String),
    #[error("Accessor .{0} is only valid as an array operator argument")]
    MisplacedAccessor(String),
    #[error("Refresh of {0} timed out")]
    RefreshTimeout(String),
    #[error("Application error: {0}")]
    Application(String),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl EvalError {
    /// Errors raised because the program names a member that does not
    /// exist, or uses one with the wrong static-ness.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            EvalError::ClassMissing(_)
                | EvalError::FieldMissing { .. }
                | EvalError::FieldStatic { .. }
                | EvalError::FunctionMissing { .. }
                | EvalError::FunctionStatic { .. }
        )
    }

    pub fn field_missing(class: &str, field: &str) -> Self {
        EvalError::FieldMissing {
            class: class.to_string(),
            field: field.to_string(),
        }
    }

    pub fn function_missing(class: &str, function: &str) -> Self {
        EvalError::FunctionMissing {
            class: class.to_string(),
            function: function.to_string(),
        }
    }
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Entry point for evaluating programs against one session.
pub struct Evaluator {
    context: ExecutionContext,
    statement_evaluator: StatementEvaluator,
}

impl Evaluator {
    pub fn new(context: ExecutionContext) -> Self {
        let expression_evaluator = Arc::new(ExpressionEvaluator::new(context.clone()));
        Self {
            context,
            statement_evaluator: StatementEvaluator::new(expression_evaluator),
        }
    }

    /// Fresh store, setup hooks run, default configuration.
    pub fn with_classes(classes: ClassRegistry) -> EvalResult<Self> {
        Self::with_config(classes, InterpreterConfig::default())
    }

    pub fn with_config(classes: ClassRegistry, config: InterpreterConfig) -> EvalResult<Self> {
        let context = ExecutionContext::new(Store::new(), Arc::new(classes), config)?;
        Ok(Self::new(context))
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Evaluator over the same session in dry-run mode.
    pub fn dry_run(&self) -> Self {
        let config = InterpreterConfig {
            dry_run: true,
            ..self.context.config().clone()
        };
        Self::new(self.context.with_config(config))
    }

    pub fn is_dry_run(&self) -> bool {
        self.context.config().dry_run
    }

    #[tracing::instrument(skip(self, node))]
    pub async fn resolve(&self, node: &Node) -> EvalResult<TypedValue> {
        self.statement_evaluator.eval_statement(node, None).await
    }

    /// Evaluates every statement in order and returns the last value.
    #[tracing::instrument(skip(self, program))]
    pub async fn interpret(&self, program: &Program) -> EvalResult<TypedValue> {
        self.statement_evaluator.eval_program(program).await
    }

    /// Parses and evaluates DSL text.
    pub async fn interpret_source(&self, source: &str) -> InternalResult<TypedValue> {
        let program = analyzer::parse_program(source)?;
        Ok(self.interpret(&program).await?)
    }

    /// Like [`Evaluator::interpret`], recording every resolved node.
    #[tracing::instrument(skip(self, program))]
    pub async fn interpret_steps(&self, program: &Program) -> EvalResult<Vec<Step>> {
        self.statement_evaluator.eval_program_steps(program).await
    }

    pub async fn interpret_source_steps(&self, source: &str) -> InternalResult<Vec<Step>> {
        let program = analyzer::parse_program(source)?;
        Ok(self.interpret_steps(&program).await?)
    }

    /// Plain JSON form of a result. Objects use their class projection.
    pub fn describe(&self, value: &TypedValue) -> EvalResult<JsonValue> {
        match value {
            TypedValue::Class(name) => Ok(json!(name)),
            TypedValue::Object { value: None, .. } => Ok(JsonValue::Null),
            TypedValue::Object {
                value: Some(value), ..
            } => self.context.describe_value(value, 0),
            TypedValue::Array { value, .. } => value
                .iter()
                .map(|item| self.describe(item))
                .collect::<EvalResult<Vec<_>>>()
                .map(JsonValue::Array),
        }
    }

    /// `{type, value}` for each step result.
    pub fn describe_steps(&self, steps: &[Step]) -> EvalResult<Vec<JsonValue>> {
        steps
            .iter()
            .map(|step| {
                Ok(json!({
                    "type": step.result.kind(),
                    "value": self.describe(&step.result)?,
                }))
            })
            .collect()
    }

    /// Raw form used as application arguments.
    pub fn strip(&self, value: &TypedValue) -> Value {
        value.strip()
    }
}
