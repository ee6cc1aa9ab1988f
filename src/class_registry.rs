//! Declarative class registration.
//!
//! Application classes are declared once at startup with a [`ClassBuilder`],
//! which produces both the [`ClassDescriptor`] the evaluator validates
//! against and the [`ClassBehavior`] it dispatches to.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;
use tracing::debug;

use crate::{
    codec::{Entity, ObjectRef, ObservableArray, Value},
    descriptor::{ClassDescriptor, FieldDescriptor, FuncDescriptor, ParamDescriptor},
    eval::{
        context::ExecutionContext,
        evaluator::{EvalError, EvalResult},
    },
};

pub const CONSTRUCTOR: &str = "constructor";
pub const ALL_FUNCTION: &str = "All";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Class {0} is registered twice with different descriptors")]
    Conflict(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassKind {
    /// Keyed, stored by reference.
    Data { key_field: String },
    /// Embedded by value in its owner.
    Helper,
}

impl ClassKind {
    pub fn key_field(&self) -> Option<&str> {
        match self {
            ClassKind::Data { key_field } => Some(key_field),
            ClassKind::Helper => None,
        }
    }
}

/// Named arguments of a call, after default binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: BTreeMap<String, Value>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn require(&self, name: &str) -> EvalResult<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| EvalError::InvalidArgument(format!("missing argument {}", name)))
    }

    fn mismatch(name: &str, expected: &str, found: &Value) -> EvalError {
        EvalError::InvalidArgument(format!(
            "argument {} should be {}, found {}",
            name,
            expected,
            found.type_name()
        ))
    }

    pub fn str(&self, name: &str) -> EvalResult<&str> {
        let value = self.require(name)?;
        value.as_str().ok_or_else(|| Self::mismatch(name, "string", value))
    }

    pub fn int(&self, name: &str) -> EvalResult<i64> {
        let value = self.require(name)?;
        value.as_i64().ok_or_else(|| Self::mismatch(name, "int", value))
    }

    pub fn int_or(&self, name: &str, default: i64) -> EvalResult<i64> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(default),
            Some(_) => self.int(name),
        }
    }

    pub fn float(&self, name: &str) -> EvalResult<f64> {
        let value = self.require(name)?;
        value.as_f64().ok_or_else(|| Self::mismatch(name, "float", value))
    }

    pub fn bool_or(&self, name: &str, default: bool) -> EvalResult<bool> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| Self::mismatch(name, "boolean", value)),
        }
    }

    pub fn object(&self, name: &str) -> EvalResult<&ObjectRef> {
        let value = self.require(name)?;
        value.as_object().ok_or_else(|| Self::mismatch(name, "object", value))
    }

    pub fn array(&self, name: &str) -> EvalResult<&ObservableArray> {
        let value = self.require(name)?;
        value.as_array().ok_or_else(|| Self::mismatch(name, "array", value))
    }

    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.values.into_iter().collect()
    }
}

impl FromIterator<(String, Value)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Runtime behavior of a registered class.
#[async_trait]
pub trait ClassBehavior: Send + Sync {
    fn construct(&self, ctx: &ExecutionContext, args: &Arguments) -> EvalResult<Value>;

    fn call_static(&self, ctx: &ExecutionContext, name: &str, args: &Arguments)
        -> EvalResult<Value>;

    fn call_method(
        &self,
        ctx: &ExecutionContext,
        target: &ObjectRef,
        name: &str,
        args: &Arguments,
    ) -> EvalResult<Value>;

    /// Plain projection used by `describe`.
    fn describe(&self, ctx: &ExecutionContext, target: &ObjectRef, depth: usize)
        -> EvalResult<JsonValue>;

    /// Projection of the constructor parameters; objects with equal
    /// identities match each other.
    fn identity(&self, ctx: &ExecutionContext, target: &ObjectRef) -> EvalResult<JsonValue>;

    /// Static three-way comparison; `None` when the class declares none.
    /// At least one operand is an instance of this class, the other may be
    /// a primitive.
    fn compare(
        &self,
        _ctx: &ExecutionContext,
        _a: &Value,
        _b: &Value,
    ) -> Option<EvalResult<Ordering>> {
        None
    }

    /// Lets an object pull external state before it is read or called.
    async fn refresh(&self, _ctx: &ExecutionContext, _target: &ObjectRef) -> EvalResult<()> {
        Ok(())
    }

    /// Runs once when an execution context is created.
    fn setup(&self, _ctx: &ExecutionContext) -> EvalResult<()> {
        Ok(())
    }
}

pub struct ClassDefinition {
    pub descriptor: ClassDescriptor,
    pub kind: ClassKind,
    pub behavior: Arc<dyn ClassBehavior>,
}

impl ClassDefinition {
    pub fn name(&self) -> &str {
        &self.descriptor.class_name
    }
}

impl std::fmt::Debug for ClassDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassDefinition")
            .field("descriptor", &self.descriptor)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Registered classes in registration order.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: Vec<Arc<ClassDefinition>>,
    index: HashMap<String, usize>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registering the same class again is accepted when both descriptors
    /// agree; the first registration is kept.
    pub fn register(&mut self, definition: ClassDefinition) -> RegistryResult<()> {
        let name = definition.name().to_string();
        if let Some(&position) = self.index.get(&name) {
            if self.classes[position].descriptor.is_same(&definition.descriptor) {
                debug!("Class {} already registered", name);
                return Ok(());
            }
            return Err(RegistryError::Conflict(name));
        }
        debug!("Registering class {}", name);
        self.index.insert(name, self.classes.len());
        self.classes.push(Arc::new(definition));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ClassDefinition>> {
        self.index.get(name).map(|&i| &self.classes[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ClassDefinition>> {
        self.classes.iter()
    }

    pub fn descriptors(&self) -> Vec<ClassDescriptor> {
        self.classes.iter().map(|c| c.descriptor.clone()).collect()
    }

    /// All class descriptions, separated by blank lines.
    pub fn description(&self) -> String {
        self.classes
            .iter()
            .map(|c| c.descriptor.description())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

type CallFn = Arc<dyn Fn(&ExecutionContext, &Arguments) -> EvalResult<Value> + Send + Sync>;
type MethodFn =
    Arc<dyn Fn(&ExecutionContext, &ObjectRef, &Arguments) -> EvalResult<Value> + Send + Sync>;
type DescribeFn = Arc<dyn Fn(&ExecutionContext, &ObjectRef) -> EvalResult<JsonValue> + Send + Sync>;
type CompareFn = Arc<dyn Fn(&ExecutionContext, &Value, &Value) -> EvalResult<Ordering> + Send + Sync>;
type RefreshFn =
    Arc<dyn Fn(ExecutionContext, ObjectRef) -> BoxFuture<'static, EvalResult<()>> + Send + Sync>;
type SetupFn = Arc<dyn Fn(&ExecutionContext) -> EvalResult<()> + Send + Sync>;

/// Behavior assembled from closures by [`ClassBuilder`].
struct ClosureBehavior {
    descriptor: ClassDescriptor,
    kind: ClassKind,
    constructor: Option<CallFn>,
    statics: HashMap<String, CallFn>,
    methods: HashMap<String, MethodFn>,
    static_values: Vec<(String, Value)>,
    describe: Option<DescribeFn>,
    compare: Option<CompareFn>,
    refresh: Option<RefreshFn>,
    setup: Option<SetupFn>,
}

impl ClosureBehavior {
    fn class_name(&self) -> &str {
        &self.descriptor.class_name
    }

    fn unknown(&self, name: &str) -> EvalError {
        EvalError::FunctionMissing {
            class: self.class_name().to_string(),
            function: name.to_string(),
        }
    }

    /// Fields whose values define identity: the constructor parameters,
    /// falling back to the key or every instance field.
    fn identity_fields(&self) -> Vec<String> {
        if let Some(constructor) = self.descriptor.function(CONSTRUCTOR) {
            if !constructor.parameters.is_empty() {
                return constructor
                    .parameters
                    .iter()
                    .map(|p| p.name.clone())
                    .collect();
            }
        }
        match &self.kind {
            ClassKind::Data { key_field } => vec![key_field.clone()],
            ClassKind::Helper => self
                .descriptor
                .instance_fields()
                .map(|f| f.field.clone())
                .collect(),
        }
    }
}

#[async_trait]
impl ClassBehavior for ClosureBehavior {
    fn construct(&self, ctx: &ExecutionContext, args: &Arguments) -> EvalResult<Value> {
        if let Some(constructor) = &self.constructor {
            return constructor(ctx, args);
        }
        match &self.kind {
            ClassKind::Data { .. } => Ok(ctx
                .create_entity(self.class_name(), args.clone().into_fields())?
                .into()),
            ClassKind::Helper => Ok(ctx
                .create_embedded(self.class_name(), args.clone().into_fields())?
                .into()),
        }
    }

    fn call_static(
        &self,
        ctx: &ExecutionContext,
        name: &str,
        args: &Arguments,
    ) -> EvalResult<Value> {
        match self.statics.get(name) {
            Some(function) => function(ctx, args),
            None if name == ALL_FUNCTION && self.kind.key_field().is_some() => {
                Ok(Value::from(ctx.all_objects(self.class_name())?))
            }
            None => Err(self.unknown(name)),
        }
    }

    fn call_method(
        &self,
        ctx: &ExecutionContext,
        target: &ObjectRef,
        name: &str,
        args: &Arguments,
    ) -> EvalResult<Value> {
        match self.methods.get(name) {
            Some(method) => method(ctx, target, args),
            None => Err(self.unknown(name)),
        }
    }

    fn describe(
        &self,
        ctx: &ExecutionContext,
        target: &ObjectRef,
        depth: usize,
    ) -> EvalResult<JsonValue> {
        if let Some(describe) = &self.describe {
            return describe(ctx, target);
        }
        let mut object = JsonMap::new();
        for field in self.descriptor.instance_fields() {
            let value = target.get(&field.field)?;
            object.insert(field.field.clone(), ctx.describe_value(&value, depth + 1)?);
        }
        Ok(JsonValue::Object(object))
    }

    fn identity(&self, ctx: &ExecutionContext, target: &ObjectRef) -> EvalResult<JsonValue> {
        let mut object = JsonMap::new();
        for field in self.identity_fields() {
            let value = target.get(&field)?;
            object.insert(field, ctx.identity_value(&value)?);
        }
        Ok(JsonValue::Object(object))
    }

    fn compare(
        &self,
        ctx: &ExecutionContext,
        a: &Value,
        b: &Value,
    ) -> Option<EvalResult<Ordering>> {
        self.compare.as_ref().map(|compare| compare(ctx, a, b))
    }

    async fn refresh(&self, ctx: &ExecutionContext, target: &ObjectRef) -> EvalResult<()> {
        match &self.refresh {
            Some(refresh) => refresh(ctx.clone(), target.clone()).await,
            None => Ok(()),
        }
    }

    fn setup(&self, ctx: &ExecutionContext) -> EvalResult<()> {
        for (field, value) in &self.static_values {
            ctx.set_static_value(self.class_name(), field, value)?;
        }
        match &self.setup {
            Some(setup) => setup(ctx),
            None => Ok(()),
        }
    }
}

/// Builds a class descriptor together with its closure-backed behavior.
///
/// ```ignore
/// let food = ClassBuilder::data_class("Food", "name")
///     .field(FieldDescriptor::new("name", "string"))
///     .field(FieldDescriptor::new("price", "float"))
///     .build();
/// ```
pub struct ClassBuilder {
    behavior: ClosureBehavior,
}

impl ClassBuilder {
    fn with_kind(name: &str, kind: ClassKind) -> Self {
        Self {
            behavior: ClosureBehavior {
                descriptor: ClassDescriptor::new(name),
                kind,
                constructor: None,
                statics: HashMap::new(),
                methods: HashMap::new(),
                static_values: Vec::new(),
                describe: None,
                compare: None,
                refresh: None,
                setup: None,
            },
        }
    }

    pub fn data_class(name: &str, key_field: &str) -> Self {
        Self::with_kind(
            name,
            ClassKind::Data {
                key_field: key_field.to_string(),
            },
        )
    }

    pub fn helper_class(name: &str) -> Self {
        Self::with_kind(name, ClassKind::Helper)
    }

    pub fn comment(mut self, comment: &str) -> Self {
        self.behavior.descriptor.comment = comment.to_string();
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.behavior.descriptor.add_field(field);
        self
    }

    /// Declares a static field seeded with `value` under `CLASS[class]`.
    pub fn static_value(mut self, field: FieldDescriptor, value: Value) -> Self {
        let field = field.with_static(true);
        self.behavior
            .static_values
            .push((field.field.clone(), value));
        self.behavior.descriptor.add_field(field);
        self
    }

    /// Declares the construction entry point; objects are created from the
    /// named arguments as fields.
    pub fn constructor(mut self, parameters: Vec<ParamDescriptor>) -> Self {
        let class = self.behavior.descriptor.class_name.clone();
        self.behavior
            .descriptor
            .add_function(FuncDescriptor::new(CONSTRUCTOR, parameters, class));
        self
    }

    /// Like [`ClassBuilder::constructor`] with custom construction.
    pub fn constructor_with<F>(self, parameters: Vec<ParamDescriptor>, build: F) -> Self
    where
        F: Fn(&ExecutionContext, &Arguments) -> EvalResult<Value> + Send + Sync + 'static,
    {
        let mut builder = self.constructor(parameters);
        builder.behavior.constructor = Some(Arc::new(build));
        builder
    }

    pub fn static_function<F>(mut self, descriptor: FuncDescriptor, function: F) -> Self
    where
        F: Fn(&ExecutionContext, &Arguments) -> EvalResult<Value> + Send + Sync + 'static,
    {
        let descriptor = descriptor.with_static(true);
        self.behavior
            .statics
            .insert(descriptor.func_name.clone(), Arc::new(function));
        self.behavior.descriptor.add_function(descriptor);
        self
    }

    pub fn method<F>(mut self, descriptor: FuncDescriptor, method: F) -> Self
    where
        F: Fn(&ExecutionContext, &ObjectRef, &Arguments) -> EvalResult<Value>
            + Send
            + Sync
            + 'static,
    {
        let descriptor = descriptor.with_static(false);
        self.behavior
            .methods
            .insert(descriptor.func_name.clone(), Arc::new(method));
        self.behavior.descriptor.add_function(descriptor);
        self
    }

    pub fn describe<F>(mut self, describe: F) -> Self
    where
        F: Fn(&ExecutionContext, &ObjectRef) -> EvalResult<JsonValue> + Send + Sync + 'static,
    {
        self.behavior.describe = Some(Arc::new(describe));
        self
    }

    pub fn compare<F>(mut self, compare: F) -> Self
    where
        F: Fn(&ExecutionContext, &Value, &Value) -> EvalResult<Ordering>
            + Send
            + Sync
            + 'static,
    {
        self.behavior.compare = Some(Arc::new(compare));
        self
    }

    pub fn refresh<F>(mut self, refresh: F) -> Self
    where
        F: Fn(ExecutionContext, ObjectRef) -> BoxFuture<'static, EvalResult<()>>
            + Send
            + Sync
            + 'static,
    {
        self.behavior.refresh = Some(Arc::new(refresh));
        self
    }

    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&ExecutionContext) -> EvalResult<()> + Send + Sync + 'static,
    {
        self.behavior.setup = Some(Arc::new(setup));
        self
    }

    /// Data classes get a static `All()` listing every live instance.
    pub fn build(mut self) -> ClassDefinition {
        if self.behavior.kind.key_field().is_some()
            && self.behavior.descriptor.function(ALL_FUNCTION).is_none()
        {
            let class = self.behavior.descriptor.class_name.clone();
            self.behavior.descriptor.add_function(
                FuncDescriptor::new(ALL_FUNCTION, vec![], format!("{}[]", class)).with_static(true),
            );
        }
        let descriptor = self.behavior.descriptor.clone();
        let kind = self.behavior.kind.clone();
        ClassDefinition {
            descriptor,
            kind,
            behavior: Arc::new(self.behavior),
        }
    }
}
