//! Built-in operators available on every array value.

use std::{cmp::Ordering, collections::HashMap};

use lazy_static::lazy_static;
use strum::{Display, EnumIter, EnumString};
use tracing::debug;

use super::{
    context::ExecutionContext,
    evaluator::{EvalError, EvalResult},
    expression::ExpressionEvaluator,
    statement::StepRecorder,
    value::TypedValue,
};
use crate::{
    ast::{Node, Parameter},
    codec::{ObjectRef, Value},
    descriptor::{
        base_type, is_primitive_type, split_array_type, DefaultValue, FuncDescriptor,
        ParamDescriptor,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ArrayOperator {
    Matching,
    Contains,
    Between,
    Equals,
    Sort,
    Index,
    Length,
}

lazy_static! {
    static ref OPERATOR_DESCRIPTORS: Vec<FuncDescriptor> = vec![
        FuncDescriptor::new(
            ArrayOperator::Matching.to_string(),
            vec![
                ParamDescriptor::new("field", "accessor"),
                ParamDescriptor::new("value", "any"),
            ],
            "T[]",
        )
        .with_comment("Elements whose field matches value, case-insensitive for strings"),
        FuncDescriptor::new(
            ArrayOperator::Contains.to_string(),
            vec![
                ParamDescriptor::new("field", "accessor"),
                ParamDescriptor::new("value", "any"),
            ],
            "T[]",
        )
        .with_comment("Elements whose field, or any item of it, matches value"),
        FuncDescriptor::new(
            ArrayOperator::Between.to_string(),
            vec![
                ParamDescriptor::new("field", "accessor"),
                ParamDescriptor::new("from", "any").optional(),
                ParamDescriptor::new("to", "any").optional(),
            ],
            "T[]",
        )
        .with_comment("Elements whose field lies within the inclusive range"),
        FuncDescriptor::new(
            ArrayOperator::Equals.to_string(),
            vec![
                ParamDescriptor::new("field", "accessor"),
                ParamDescriptor::new("value", "any"),
            ],
            "T[]",
        )
        .with_comment("Elements whose field equals value"),
        FuncDescriptor::new(
            ArrayOperator::Sort.to_string(),
            vec![
                ParamDescriptor::new("field", "accessor"),
                ParamDescriptor::new("ascending", "boolean")
                    .with_default(DefaultValue::Boolean(true)),
            ],
            "T[]",
        )
        .with_comment("Stable sort by field"),
        FuncDescriptor::new(
            ArrayOperator::Index.to_string(),
            vec![ParamDescriptor::new("index", "int")],
            "T",
        )
        .with_comment("Element at index, negative counts from the end"),
        FuncDescriptor::new(ArrayOperator::Length.to_string(), vec![], "int")
            .with_comment("Number of elements"),
    ];
}

/// Operators as descriptors, for prompt rendering.
pub fn array_operator_descriptors() -> &'static [FuncDescriptor] {
    &OPERATOR_DESCRIPTORS
}

fn descriptor(operator: ArrayOperator) -> Option<&'static FuncDescriptor> {
    let name = operator.to_string();
    OPERATOR_DESCRIPTORS.iter().find(|d| d.func_name == name)
}

/// Named parameters of an operator call, limited to the declared ones.
struct OperatorArgs<'a> {
    operator: ArrayOperator,
    nodes: HashMap<&'a str, &'a Node>,
}

impl<'a> OperatorArgs<'a> {
    fn new(operator: ArrayOperator, parameters: &'a [Parameter]) -> Self {
        let declared = descriptor(operator);
        let mut nodes = HashMap::new();
        for parameter in parameters {
            let known = declared
                .map(|d| d.param(&parameter.parameter).is_some())
                .unwrap_or(false);
            if known {
                nodes.insert(parameter.parameter.as_str(), &parameter.value);
            } else {
                debug!(
                    "Dropping unknown parameter {} of {}",
                    parameter.parameter, operator
                );
            }
        }
        Self { operator, nodes }
    }

    fn node(&self, name: &str) -> Option<&'a Node> {
        self.nodes.get(name).copied()
    }

    fn required(&self, name: &str) -> EvalResult<&'a Node> {
        self.node(name).ok_or_else(|| {
            EvalError::InvalidArgument(format!("{} requires {}", self.operator, name))
        })
    }

    fn field_path(&self) -> EvalResult<Vec<String>> {
        self.required("field")?.accessor_path().ok_or_else(|| {
            EvalError::InvalidArgument(format!(
                "field of {} must be an accessor such as .name",
                self.operator
            ))
        })
    }
}

async fn resolve_arg<'a>(
    evaluator: &'a ExpressionEvaluator,
    node: Option<&'a Node>,
    steps: Option<&'a StepRecorder>,
) -> EvalResult<Option<Value>> {
    match node {
        Some(node) => Ok(Some(evaluator.resolve(node, None, steps).await?.strip())),
        None => Ok(None),
    }
}

/// Applies `operator` to `items`. On an empty array the arguments are only
/// checked for structure, so constructors and calls inside them never run.
pub async fn apply<'a>(
    evaluator: &'a ExpressionEvaluator,
    operator: ArrayOperator,
    items: &'a [TypedValue],
    element_type: Option<&'a str>,
    parameters: &'a [Parameter],
    steps: Option<&'a StepRecorder>,
) -> EvalResult<TypedValue> {
    let args = OperatorArgs::new(operator, parameters);
    let dry_run = evaluator.is_dry_run();
    let checker;
    let (arguments, steps) = if items.is_empty() && !dry_run {
        checker = evaluator.structural_only();
        (&checker, None)
    } else {
        (evaluator, steps)
    };

    match operator {
        ArrayOperator::Length => {
            if dry_run {
                return Ok(TypedValue::placeholder("int"));
            }
            Ok(TypedValue::object("int", Value::Integer(items.len() as i64)))
        }
        ArrayOperator::Index => {
            let index = resolve_arg(arguments, Some(args.required("index")?), steps).await?;
            if items.is_empty() {
                return Ok(TypedValue::empty_of(element_type));
            }
            if dry_run {
                return Ok(items[0].clone());
            }
            let index = index.as_ref().and_then(Value::as_i64).ok_or_else(|| {
                EvalError::InvalidArgument("index must be an integer".to_string())
            })?;
            let len = items.len();
            let position = if index < 0 { len as i64 + index } else { index };
            if position < 0 || position >= len as i64 {
                return Err(EvalError::IndexOutOfRange { index, len });
            }
            Ok(items[position as usize].clone())
        }
        _ => {
            let path = args.field_path()?;
            let element_type = match element_type {
                Some(element_type) => element_type.to_string(),
                None => match items.first() {
                    Some(first) => first.type_tag(),
                    None => return Ok(TypedValue::empty_array()),
                },
            };
            selected_type(evaluator.context(), &element_type, &path)?;

            let value = resolve_arg(arguments, args.node("value"), steps).await?;
            let from = resolve_arg(arguments, args.node("from"), steps).await?;
            let to = resolve_arg(arguments, args.node("to"), steps).await?;
            let ascending = match resolve_arg(arguments, args.node("ascending"), steps).await? {
                None | Some(Value::Null) => true,
                Some(value) => value.as_bool().ok_or_else(|| {
                    EvalError::InvalidArgument(format!(
                        "ascending of {} must be a boolean, got {}",
                        operator,
                        value.type_name()
                    ))
                })?,
            };

            if items.is_empty() {
                return Ok(TypedValue::empty_of(Some(&element_type)));
            }
            if dry_run {
                return Ok(TypedValue::Array {
                    value: items.to_vec(),
                    element_type: Some(element_type),
                });
            }

            let mut pairs = Vec::with_capacity(items.len());
            for item in items {
                let mut selected = item.strip();
                for field in &path {
                    selected = evaluator.select_field(selected, field).await?;
                }
                pairs.push((item.clone(), selected));
            }

            let ctx = evaluator.context();
            let value = value.unwrap_or_default();
            let kept = match operator {
                ArrayOperator::Matching => filter(pairs, |s| matches(ctx, s, &value))?,
                ArrayOperator::Contains => filter(pairs, |s| contains(ctx, s, &value))?,
                ArrayOperator::Equals => filter(pairs, |s| Ok(equals(s, &value)))?,
                ArrayOperator::Between => filter(pairs, |s| {
                    let above = match &from {
                        Some(from) => compare(ctx, s, from)? != Ordering::Less,
                        None => true,
                    };
                    let below = match &to {
                        Some(to) => compare(ctx, s, to)? != Ordering::Greater,
                        None => true,
                    };
                    Ok(above && below)
                })?,
                _ => sort(ctx, pairs, ascending)?,
            };
            Ok(TypedValue::Array {
                value: kept,
                element_type: Some(element_type),
            })
        }
    }
}

fn filter<F>(pairs: Vec<(TypedValue, Value)>, mut keep: F) -> EvalResult<Vec<TypedValue>>
where
    F: FnMut(&Value) -> EvalResult<bool>,
{
    let mut kept = Vec::new();
    for (item, selected) in pairs {
        if keep(&selected)? {
            kept.push(item);
        }
    }
    Ok(kept)
}

fn sort(
    ctx: &ExecutionContext,
    mut pairs: Vec<(TypedValue, Value)>,
    ascending: bool,
) -> EvalResult<Vec<TypedValue>> {
    let mut failure = None;
    // stable; ties keep input order
    pairs.sort_by(|(_, a), (_, b)| {
        let ordering = if ascending {
            compare(ctx, a, b)
        } else {
            compare(ctx, b, a)
        };
        ordering.unwrap_or_else(|e| {
            failure.get_or_insert(e);
            Ordering::Equal
        })
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(pairs.into_iter().map(|(item, _)| item).collect()),
    }
}

/// Declared type selected by `path` from `element_type`. Every step must be
/// a declared field.
pub fn selected_type(
    ctx: &ExecutionContext,
    element_type: &str,
    path: &[String],
) -> EvalResult<String> {
    let mut current = element_type.to_string();
    for field in path {
        let owner = {
            let declared = base_type(&current);
            base_type(split_array_type(declared).unwrap_or(declared)).to_string()
        };
        if is_primitive_type(&owner) {
            return Err(EvalError::field_missing(&owner, field));
        }
        let definition = ctx.class(&owner)?;
        let descriptor = definition
            .descriptor
            .field(field)
            .ok_or_else(|| EvalError::field_missing(&owner, field))?;
        current = descriptor.field_type.clone();
    }
    Ok(current)
}

fn same_object(ctx: &ExecutionContext, a: &ObjectRef, b: &ObjectRef) -> EvalResult<bool> {
    Ok(a.class_name() == b.class_name() && ctx.identity(a)? == ctx.identity(b)?)
}

/// Substring match for strings, identity projection for objects, equality
/// for other scalars.
pub fn matches(ctx: &ExecutionContext, selected: &Value, value: &Value) -> EvalResult<bool> {
    match (selected, value) {
        (Value::String(s), Value::String(v)) => Ok(s.to_lowercase().contains(&v.to_lowercase())),
        (Value::Object(a), Value::Object(b)) => same_object(ctx, a, b),
        (a, b) if a.is_primitive() && b.is_primitive() => Ok(a == b),
        _ => Ok(false),
    }
}

pub fn contains(ctx: &ExecutionContext, selected: &Value, value: &Value) -> EvalResult<bool> {
    match selected {
        Value::Array(array) => {
            for item in array.iter() {
                if matches(ctx, item, value)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => matches(ctx, other, value),
    }
}

pub fn equals(selected: &Value, value: &Value) -> bool {
    match (selected, value) {
        (Value::String(s), Value::String(v)) => s.to_lowercase() == v.to_lowercase(),
        (a, b) => a == b,
    }
}

/// Native ordering for primitives, the class comparator as soon as one
/// side is an object.
pub fn compare(ctx: &ExecutionContext, a: &Value, b: &Value) -> EvalResult<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Boolean(x), Value::Boolean(y)) => Ok(x.cmp(y)),
        (Value::Object(x), Value::Object(y)) if x.class_name() != y.class_name() => Err(
            EvalError::Incomparable(x.class_name().to_string(), y.class_name().to_string()),
        ),
        (Value::Object(owner), other) | (other, Value::Object(owner))
            if matches!(other, Value::Object(_)) || other.is_primitive() =>
        {
            ctx.compare_with(owner, a, b)
        }
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x
                .partial_cmp(&y)
                .ok_or_else(|| EvalError::Incomparable(a.to_string(), b.to_string())),
            _ => Err(EvalError::Incomparable(a.type_name(), b.type_name())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_operator_names() {
        assert_eq!(ArrayOperator::from_str("matching"), Ok(ArrayOperator::Matching));
        assert!(ArrayOperator::from_str("addFoods").is_err());
        for operator in ArrayOperator::iter() {
            assert!(descriptor(operator).is_some(), "{} has no descriptor", operator);
        }
    }

    #[test]
    fn test_equals_and_ordering_of_primitives() {
        assert!(equals(&Value::from("KFC"), &Value::from("kfc")));
        assert!(equals(&Value::Float(1.0), &Value::Integer(1)));
        assert!(!equals(&Value::from("KFC"), &Value::from("KF")));
    }

    #[test]
    fn test_descriptor_rendering() {
        let sort = descriptor(ArrayOperator::Sort).unwrap();
        assert_eq!(
            sort.description(),
            "// Stable sort by field\n\tT[] sort(field: accessor, ascending: boolean = true);"
        );
    }
}
