use std::{cmp::Ordering, sync::Arc};

use serde_json::{json, Value as JsonValue};
use tracing::debug;

use super::evaluator::{EvalError, EvalResult};
use crate::{
    class_registry::{Arguments, ClassDefinition, ClassKind, ClassRegistry},
    codec::{self, deserialize, Accessor, EmbeddedRef, Entity, EntityRef, ObjectRef, Value},
    config::InterpreterConfig,
    descriptor::split_array_type,
    store::{
        tree::{static_path, DELETED_FLAG},
        StateTree, Store,
    },
};

/// Session state shared by every evaluation: the store handle, the class
/// registry and the configuration. Cloning is cheap.
#[derive(Clone)]
pub struct ExecutionContext {
    store: Store,
    classes: Arc<ClassRegistry>,
    config: Arc<InterpreterConfig>,
}

impl ExecutionContext {
    /// Creates a context and runs every class's setup hook in registration
    /// order.
    pub fn new(
        store: Store,
        classes: Arc<ClassRegistry>,
        config: InterpreterConfig,
    ) -> EvalResult<Self> {
        let context = Self {
            store,
            classes,
            config: Arc::new(config),
        };
        for class in context.classes.iter() {
            debug!("Setting up class {}", class.name());
            class.behavior.setup(&context)?;
        }
        Ok(context)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn classes(&self) -> &Arc<ClassRegistry> {
        &self.classes
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Same session with another configuration.
    pub fn with_config(&self, config: InterpreterConfig) -> Self {
        Self {
            store: self.store.clone(),
            classes: self.classes.clone(),
            config: Arc::new(config),
        }
    }

    pub fn class(&self, name: &str) -> EvalResult<&Arc<ClassDefinition>> {
        self.classes
            .get(name)
            .ok_or_else(|| EvalError::ClassMissing(name.to_string()))
    }

    /// Runs `mutator` as one store transaction.
    pub fn dispatch<R, F>(&self, mutator: F) -> EvalResult<R>
    where
        F: FnOnce() -> EvalResult<R>,
    {
        self.store.dispatch(mutator)
    }

    /// Creates a keyed entity from `fields`. Declared instance fields that
    /// are not given start empty.
    pub fn create_entity(&self, class: &str, fields: Vec<(String, Value)>) -> EvalResult<EntityRef> {
        let definition = self.class(class)?;
        let key_field = match &definition.kind {
            ClassKind::Data { key_field } => key_field.clone(),
            ClassKind::Helper => {
                return Err(EvalError::InvalidArgument(format!(
                    "{} is not a data class",
                    class
                )))
            }
        };
        let fields = Self::complete_fields(definition, fields);
        Ok(codec::create_entity(&self.store, class, &key_field, fields)?)
    }

    /// Creates an unowned value object of a helper class.
    pub fn create_embedded(
        &self,
        class: &str,
        fields: Vec<(String, Value)>,
    ) -> EvalResult<EmbeddedRef> {
        let definition = self.class(class)?;
        let fields = Self::complete_fields(definition, fields);
        Ok(codec::create_embedded(&self.store, class, fields)?)
    }

    fn complete_fields(
        definition: &ClassDefinition,
        mut fields: Vec<(String, Value)>,
    ) -> Vec<(String, Value)> {
        for field in definition.descriptor.instance_fields() {
            if fields.iter().all(|(name, _)| name != &field.field) {
                let empty = match split_array_type(&field.field_type) {
                    Some(_) => Value::from(Vec::new()),
                    None => Value::Null,
                };
                fields.push((field.field.clone(), empty));
            }
        }
        fields
    }

    /// Invokes the class's construction entry point.
    pub fn construct(&self, class: &str, args: &Arguments) -> EvalResult<Value> {
        self.class(class)?.behavior.construct(self, args)
    }

    /// Live entity for `key`, unless unknown or deleted.
    pub fn get_object(&self, class: &str, key: &str) -> EvalResult<Option<EntityRef>> {
        let entity = match EntityRef::lookup(&self.store, class, key) {
            Ok(entity) => entity,
            Err(_) => return Ok(None),
        };
        if entity.is_deleted()? {
            Ok(None)
        } else {
            Ok(Some(entity))
        }
    }

    /// Marks the entity deleted. Its record stays in the store.
    pub fn delete_object(&self, entity: &EntityRef) -> EvalResult<()> {
        debug!("Deleting {}[{}]", entity.class, entity.key);
        entity
            .accessor()
            .child(DELETED_FLAG)
            .set(StateTree::Boolean(true))?;
        Ok(())
    }

    /// Live instances of `class` in creation order.
    pub fn all_objects(&self, class: &str) -> EvalResult<Vec<Value>> {
        let mut objects = Vec::new();
        for key in self.store.entities().keys(class) {
            if let Some(entity) = self.get_object(class, &key)? {
                objects.push(Value::from(entity));
            }
        }
        Ok(objects)
    }

    pub fn static_value(&self, class: &str, field: &str) -> EvalResult<Value> {
        let accessor = Accessor::store(&self.store, static_path(class, field));
        Ok(deserialize(&accessor.get()?, &accessor, &self.store)?)
    }

    pub fn set_static_value(&self, class: &str, field: &str, value: &Value) -> EvalResult<()> {
        let accessor = Accessor::store(&self.store, static_path(class, field));
        self.store.dispatch(|| {
            let tree = codec::serialize(value, &accessor)?;
            accessor.set(tree)?;
            Ok(())
        })
    }

    /// Gives the object's class a chance to refresh it, bounded by the
    /// configured timeout.
    pub async fn refresh(&self, target: &ObjectRef) -> EvalResult<()> {
        if !self.config.refresh_entities {
            return Ok(());
        }
        let behavior = self.class(target.class_name())?.behavior.clone();
        match self.config.refresh_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, behavior.refresh(self, target))
                .await
                .map_err(|_| EvalError::RefreshTimeout(target.class_name().to_string()))?,
            None => behavior.refresh(self, target).await,
        }
    }

    /// Plain JSON projection of a live value.
    pub fn describe_value(&self, value: &Value, depth: usize) -> EvalResult<JsonValue> {
        if let Some(json) = value.primitive_json() {
            return Ok(json);
        }
        match value {
            Value::Array(array) => array
                .iter()
                .map(|item| self.describe_value(item, depth))
                .collect::<EvalResult<Vec<_>>>()
                .map(JsonValue::Array),
            Value::Object(object) if depth >= self.config.max_describe_depth => {
                self.identity(object)
            }
            Value::Object(object) => self
                .class(object.class_name())?
                .behavior
                .describe(self, object, depth),
            _ => Ok(JsonValue::Null),
        }
    }

    /// Identity projection of an object, as defined by its class.
    pub fn identity(&self, object: &ObjectRef) -> EvalResult<JsonValue> {
        self.class(object.class_name())?
            .behavior
            .identity(self, object)
    }

    /// Value as it appears inside an identity projection: entities collapse
    /// to their key.
    pub fn identity_value(&self, value: &Value) -> EvalResult<JsonValue> {
        if let Some(json) = value.primitive_json() {
            return Ok(json);
        }
        match value {
            Value::Array(array) => array
                .iter()
                .map(|item| self.identity_value(item))
                .collect::<EvalResult<Vec<_>>>()
                .map(JsonValue::Array),
            Value::Object(ObjectRef::Entity(entity)) => {
                Ok(json!({"class": entity.class, "key": entity.key}))
            }
            Value::Object(object) => self.identity(object),
            _ => Ok(JsonValue::Null),
        }
    }

    /// Three-way comparison through the static comparator of `owner`'s
    /// class. `owner` is whichever operand is an object.
    pub fn compare_with(&self, owner: &ObjectRef, a: &Value, b: &Value) -> EvalResult<Ordering> {
        let class = owner.class_name();
        self.class(class)?
            .behavior
            .compare(self, a, b)
            .unwrap_or_else(|| Err(EvalError::MissingComparator(class.to_string())))
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("config", &self.config)
            .finish()
    }
}
