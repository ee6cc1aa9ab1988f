use async_recursion::async_recursion;
use std::str::FromStr;
use tracing::debug;

use super::{
    array_ops::{self, ArrayOperator},
    context::ExecutionContext,
    evaluator::{EvalError, EvalResult},
    statement::{record_step, StepRecorder},
    value::TypedValue,
};
use crate::{
    analyzer,
    ast::{IndexValue, Member, Node, Parameter, Parent},
    class_registry::{Arguments, ClassDefinition, CONSTRUCTOR},
    codec::{Entity, ObjectRef, Value},
    config::InterpreterConfig,
    descriptor::{
        base_type, is_primitive_type, split_array_type, DefaultValue, FieldDescriptor,
        FuncDescriptor,
    },
};

/// Resolves AST nodes to [`TypedValue`]s.
///
/// Structural checks (class, field and function existence and static-ness)
/// always run; in dry-run mode every read and call is then replaced by a
/// placeholder of the declared shape.
pub struct ExpressionEvaluator {
    context: ExecutionContext,
}

impl ExpressionEvaluator {
    pub fn new(context: ExecutionContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn is_dry_run(&self) -> bool {
        self.context.config().dry_run
    }

    /// Same session in dry-run mode: nodes are checked for structure and
    /// nothing is read, called or constructed.
    pub(crate) fn structural_only(&self) -> ExpressionEvaluator {
        let config = InterpreterConfig {
            dry_run: true,
            ..self.context.config().clone()
        };
        ExpressionEvaluator::new(self.context.with_config(config))
    }

    /// `env` is the receiver of a function call; other nodes ignore it.
    #[async_recursion]
    pub async fn resolve<'a>(
        &'a self,
        node: &'a Node,
        env: Option<&'a TypedValue>,
        steps: Option<&'a StepRecorder>,
    ) -> EvalResult<TypedValue> {
        let result = match node {
            Node::Access { parent, access } => self.resolve_access(parent, access, steps).await?,
            Node::Index { parent, index } => self.resolve_index(parent, index, steps).await?,
            Node::FunctionCall {
                func_name,
                parameters,
            } => {
                let parameters = parameters.as_deref().unwrap_or(&[]);
                self.resolve_call(func_name, parameters, env, steps).await?
            }
            Node::Array { value } => self.resolve_array(value, steps).await?,
            Node::String { value } => TypedValue::object("string", Value::from(value.as_str())),
            Node::Int { value } => TypedValue::object("int", Value::Integer(*value)),
            Node::Float { value } => TypedValue::object("float", Value::Float(*value)),
            Node::Boolean { value } => TypedValue::object("boolean", Value::Boolean(*value)),
            Node::Accessor { field } => {
                return Err(EvalError::MisplacedAccessor(
                    field.trim_start_matches('.').to_string(),
                ))
            }
        };
        debug!("Resolved {} to {}", node.kind(), result.type_tag());
        record_step(steps, node, &result);
        Ok(result)
    }

    async fn resolve_parent<'a>(
        &'a self,
        parent: &'a Parent,
        steps: Option<&'a StepRecorder>,
    ) -> EvalResult<TypedValue> {
        match parent {
            Parent::Class(name) => {
                self.context.class(name)?;
                Ok(TypedValue::Class(name.clone()))
            }
            Parent::Node(node) => self.resolve(node, None, steps).await,
        }
    }

    async fn resolve_access<'a>(
        &'a self,
        parent: &'a Parent,
        access: &'a Member,
        steps: Option<&'a StepRecorder>,
    ) -> EvalResult<TypedValue> {
        let target = self.resolve_parent(parent, steps).await?;
        match access {
            Member::Field(field) => self.access_field(&target, field).await,
            Member::Node(node) => self.resolve(node, Some(&target), steps).await,
        }
    }

    /// `parent[i]` is `parent.index(index: i)`.
    async fn resolve_index<'a>(
        &'a self,
        parent: &'a Parent,
        index: &'a IndexValue,
        steps: Option<&'a StepRecorder>,
    ) -> EvalResult<TypedValue> {
        let target = self.resolve_parent(parent, steps).await?;
        let value = match index {
            IndexValue::Literal(i) => Node::Int { value: *i },
            IndexValue::Node(node) => node.as_ref().clone(),
        };
        let call = Node::call(
            ArrayOperator::Index.to_string(),
            vec![Parameter {
                parameter: "index".to_string(),
                value,
            }],
        );
        self.resolve(&call, Some(&target), steps).await
    }

    async fn resolve_array<'a>(
        &'a self,
        items: &'a [Node],
        steps: Option<&'a StepRecorder>,
    ) -> EvalResult<TypedValue> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            values.push(self.resolve(item, None, steps).await?);
        }
        if let Some(first) = values.first() {
            let expected = match first {
                TypedValue::Object { object_type, .. } => object_type.clone(),
                other => {
                    return Err(EvalError::HeterogeneousArray(
                        "object".to_string(),
                        other.type_tag(),
                    ))
                }
            };
            for value in &values {
                match value {
                    TypedValue::Object { object_type, .. } if *object_type == expected => {}
                    other => {
                        return Err(EvalError::HeterogeneousArray(
                            expected.clone(),
                            other.type_tag(),
                        ))
                    }
                }
            }
        }
        Ok(TypedValue::array_of(values))
    }

    /// Class definition for a receiver's type; primitives have no members.
    fn member_owner(&self, type_name: &str, member: &str, is_field: bool) -> EvalResult<&ClassDefinition> {
        if is_primitive_type(type_name) {
            return Err(if is_field {
                EvalError::field_missing(type_name, member)
            } else {
                EvalError::function_missing(type_name, member)
            });
        }
        Ok(self.context.class(type_name)?.as_ref())
    }

    fn lookup_field<'d>(
        definition: &'d ClassDefinition,
        field: &str,
    ) -> EvalResult<&'d FieldDescriptor> {
        definition
            .descriptor
            .field(field)
            .ok_or_else(|| EvalError::field_missing(definition.name(), field))
    }

    fn lookup_function<'d>(
        definition: &'d ClassDefinition,
        function: &str,
    ) -> EvalResult<&'d FuncDescriptor> {
        definition
            .descriptor
            .function(function)
            .ok_or_else(|| EvalError::function_missing(definition.name(), function))
    }

    /// Checks `member` against the innermost element type of an array about
    /// to be broadcast over, and returns the element type of the result.
    /// Runs before any element is visited so empty arrays are checked too.
    fn broadcast_type(
        &self,
        element_type: Option<&str>,
        member: &str,
        is_field: bool,
    ) -> EvalResult<Option<String>> {
        let Some(element_type) = element_type else {
            return Ok(None);
        };
        let mut inner = base_type(element_type);
        let mut depth = 0;
        while let Some(element) = split_array_type(inner) {
            inner = base_type(element);
            depth += 1;
        }
        let definition = self.member_owner(inner, member, is_field)?;
        let declared = if is_field {
            &Self::lookup_field(definition, member)?.field_type
        } else {
            &Self::lookup_function(definition, member)?.return_type
        };
        let mut tag = TypedValue::placeholder(declared).type_tag();
        for _ in 0..depth {
            tag.push_str("[]");
        }
        Ok(Some(tag))
    }

    fn read_static(&self, class: &str, field: &FieldDescriptor) -> EvalResult<TypedValue> {
        if self.is_dry_run() {
            return Ok(TypedValue::placeholder(&field.field_type));
        }
        let value = self.context.static_value(class, &field.field)?;
        Ok(TypedValue::from_declared(&field.field_type, value))
    }

    /// Field read. Over arrays the read is applied to every element.
    #[async_recursion]
    pub async fn access_field<'a>(
        &'a self,
        target: &'a TypedValue,
        field: &'a str,
    ) -> EvalResult<TypedValue> {
        match target {
            TypedValue::Class(class) => {
                let definition = self.context.class(class)?;
                let descriptor = Self::lookup_field(definition, field)?;
                if !descriptor.is_static {
                    return Err(EvalError::FieldStatic {
                        class: class.clone(),
                        field: field.to_string(),
                    });
                }
                self.read_static(class, descriptor)
            }
            TypedValue::Object { object_type, value } => {
                let definition = self.member_owner(object_type, field, true)?;
                let descriptor = Self::lookup_field(definition, field)?;
                if descriptor.is_static {
                    return self.read_static(object_type, descriptor);
                }
                if self.is_dry_run() {
                    return Ok(TypedValue::placeholder(&descriptor.field_type));
                }
                let object = Self::live_object(object_type, field, value.as_ref())?;
                self.refresh(object).await?;
                let value = object.get(field)?;
                Ok(TypedValue::from_declared(&descriptor.field_type, value))
            }
            TypedValue::Array {
                value,
                element_type,
            } => {
                let declared = self.broadcast_type(element_type.as_deref(), field, true)?;
                let mut items = Vec::with_capacity(value.len());
                for item in value {
                    items.push(self.access_field(item, field).await?);
                }
                Ok(TypedValue::array_or(items, declared))
            }
        }
    }

    fn live_object<'v>(
        object_type: &str,
        member: &str,
        value: Option<&'v Value>,
    ) -> EvalResult<&'v ObjectRef> {
        match value {
            Some(Value::Object(object)) => Ok(object),
            _ => Err(EvalError::NullReference(format!(
                "{}.{} on an empty {}",
                object_type, member, object_type
            ))),
        }
    }

    pub(crate) async fn refresh(&self, object: &ObjectRef) -> EvalResult<()> {
        if self.is_dry_run() {
            return Ok(());
        }
        self.context.refresh(object).await
    }

    /// Function call on `env`: construction, static call, method call or
    /// array operator.
    #[async_recursion]
    pub async fn resolve_call<'a>(
        &'a self,
        func_name: &'a str,
        parameters: &'a [Parameter],
        env: Option<&'a TypedValue>,
        steps: Option<&'a StepRecorder>,
    ) -> EvalResult<TypedValue> {
        match env {
            None => self.construct(func_name, parameters, steps).await,
            Some(TypedValue::Class(class)) => {
                let definition = self.context.class(class)?;
                let descriptor = Self::lookup_function(definition, func_name)?;
                if !descriptor.is_static {
                    return Err(EvalError::FunctionStatic {
                        class: class.clone(),
                        function: func_name.to_string(),
                    });
                }
                let args = self.bind_arguments(descriptor, parameters, steps).await?;
                if self.is_dry_run() {
                    return Ok(TypedValue::placeholder(&descriptor.return_type));
                }
                let value = definition
                    .behavior
                    .call_static(&self.context, func_name, &args)?;
                Ok(TypedValue::from_declared(&descriptor.return_type, value))
            }
            Some(TypedValue::Object { object_type, value }) => {
                let definition = self.member_owner(object_type, func_name, false)?;
                let descriptor = Self::lookup_function(definition, func_name)?;
                let args = self.bind_arguments(descriptor, parameters, steps).await?;
                if self.is_dry_run() {
                    return Ok(TypedValue::placeholder(&descriptor.return_type));
                }
                let result = if descriptor.is_static {
                    definition
                        .behavior
                        .call_static(&self.context, func_name, &args)?
                } else {
                    let object = Self::live_object(object_type, func_name, value.as_ref())?;
                    self.refresh(object).await?;
                    definition
                        .behavior
                        .call_method(&self.context, object, func_name, &args)?
                };
                Ok(TypedValue::from_declared(&descriptor.return_type, result))
            }
            Some(TypedValue::Array {
                value,
                element_type,
            }) => {
                if let Ok(operator) = ArrayOperator::from_str(func_name) {
                    return array_ops::apply(
                        self,
                        operator,
                        value,
                        element_type.as_deref(),
                        parameters,
                        steps,
                    )
                    .await;
                }
                let declared = self.broadcast_type(element_type.as_deref(), func_name, false)?;
                match element_type {
                    // arguments are still checked, without side effects
                    Some(element_type) if value.is_empty() => {
                        let checker = self.structural_only();
                        let receiver = TypedValue::placeholder(element_type);
                        checker
                            .resolve_call(func_name, parameters, Some(&receiver), None)
                            .await?;
                    }
                    _ => {}
                }
                let mut items = Vec::with_capacity(value.len());
                for item in value {
                    items.push(
                        self.resolve_call(func_name, parameters, Some(item), steps)
                            .await?,
                    );
                }
                Ok(TypedValue::array_or(items, declared))
            }
        }
    }

    async fn construct<'a>(
        &'a self,
        class: &'a str,
        parameters: &'a [Parameter],
        steps: Option<&'a StepRecorder>,
    ) -> EvalResult<TypedValue> {
        let definition = self.context.class(class)?;
        let descriptor = Self::lookup_function(definition, CONSTRUCTOR)?;
        let args = self.bind_arguments(descriptor, parameters, steps).await?;
        if self.is_dry_run() {
            return Ok(TypedValue::Object {
                object_type: class.to_string(),
                value: None,
            });
        }
        let value = definition.behavior.construct(&self.context, &args)?;
        Ok(TypedValue::object(class, value))
    }

    /// Resolves named parameters declared by `descriptor`; unknown names are
    /// dropped and missing ones take their declared default.
    async fn bind_arguments<'a>(
        &'a self,
        descriptor: &'a FuncDescriptor,
        parameters: &'a [Parameter],
        steps: Option<&'a StepRecorder>,
    ) -> EvalResult<Arguments> {
        let mut args = Arguments::new();
        for parameter in parameters {
            if descriptor.param(&parameter.parameter).is_none() {
                debug!(
                    "Dropping unknown parameter {} of {}",
                    parameter.parameter, descriptor.func_name
                );
                continue;
            }
            let value = self.resolve(&parameter.value, None, steps).await?;
            args.insert(parameter.parameter.clone(), value.strip());
        }
        for param in &descriptor.parameters {
            if args.contains(&param.name) {
                continue;
            }
            if let Some(default) = &param.default_value {
                let value = self.default_value(default, steps).await?;
                args.insert(param.name.clone(), value);
            }
        }
        Ok(args)
    }

    async fn default_value<'a>(
        &'a self,
        default: &'a DefaultValue,
        steps: Option<&'a StepRecorder>,
    ) -> EvalResult<Value> {
        match default {
            DefaultValue::String(s) => Ok(Value::from(s.as_str())),
            DefaultValue::Int(i) => Ok(Value::Integer(*i)),
            DefaultValue::Float(x) => Ok(Value::Float(*x)),
            DefaultValue::Boolean(b) => Ok(Value::Boolean(*b)),
            DefaultValue::Expression(source) => {
                let program = analyzer::parse_program(source).map_err(|e| {
                    EvalError::InvalidArgument(format!("default `{}`: {}", source, e))
                })?;
                let mut last = TypedValue::void();
                for statement in &program {
                    last = self.resolve(statement, None, steps).await?;
                }
                Ok(last.strip())
            }
        }
    }

    /// Reads `field` from an object, or from every element of an array.
    #[async_recursion]
    pub(crate) async fn select_field<'a>(&'a self, value: Value, field: &'a str) -> EvalResult<Value> {
        match value {
            Value::Object(object) => {
                self.refresh(&object).await?;
                Ok(object.get(field)?)
            }
            Value::Array(array) => {
                let mut items = Vec::with_capacity(array.len());
                for item in array.into_items() {
                    items.push(self.select_field(item, field).await?);
                }
                Ok(Value::from(items))
            }
            Value::Null => Ok(Value::Null),
            other => Err(EvalError::field_missing(&other.type_name(), field)),
        }
    }
}
