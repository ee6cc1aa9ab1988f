//! Restaurant ordering domain used across the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use genie::{
    class_registry::{Arguments, ClassBuilder, ClassRegistry},
    codec::{Entity, ObjectRef, Value},
    descriptor::{DefaultValue, FieldDescriptor, FuncDescriptor, ParamDescriptor},
    eval::{EvalError, EvalResult, Evaluator, ExecutionContext},
    InterpreterConfig,
};
use serde_json::json;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

pub type Bookings = Arc<Mutex<Vec<String>>>;

pub struct Fixture {
    pub evaluator: Evaluator,
    pub bookings: Bookings,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(InterpreterConfig::default())
    }

    pub fn with_config(config: InterpreterConfig) -> Self {
        let bookings = Bookings::default();
        let evaluator =
            Evaluator::with_config(classes(bookings.clone()), config).expect("fixture setup");
        Self {
            evaluator,
            bookings,
        }
    }

    pub fn last_booking(&self) -> Option<String> {
        self.bookings.lock().unwrap().last().cloned()
    }

    pub fn version(&self) -> u64 {
        self.evaluator.context().store().version().unwrap()
    }
}

fn invalid(message: impl Into<String>) -> EvalError {
    EvalError::InvalidArgument(message.into())
}

fn int_field(object: &ObjectRef, field: &str) -> EvalResult<i64> {
    object
        .get(field)?
        .as_i64()
        .ok_or_else(|| invalid(format!("{}.{} is not set", object.class_name(), field)))
}

fn string_field(object: &ObjectRef, field: &str) -> EvalResult<String> {
    Ok(object.get(field)?.as_str().unwrap_or_default().to_string())
}

pub fn today() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 2, 4)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .expect("valid date")
}

fn naive(object: &ObjectRef) -> EvalResult<NaiveDateTime> {
    let date = NaiveDate::from_ymd_opt(
        int_field(object, "year")? as i32,
        int_field(object, "month")? as u32,
        int_field(object, "day")? as u32,
    );
    date.and_then(|d| {
        d.and_hms_opt(
            int_field(object, "hour").ok()? as u32,
            int_field(object, "minute").ok()? as u32,
            0,
        )
    })
    .ok_or_else(|| invalid("not a valid date"))
}

fn naive_value(value: &Value) -> EvalResult<NaiveDateTime> {
    match value.as_object() {
        Some(object) => naive(object),
        None => Err(invalid(format!("cannot compare a DateTime with {}", value.type_name()))),
    }
}

fn date_fields(date: NaiveDateTime) -> Vec<(String, Value)> {
    vec![
        ("year".to_string(), Value::from(date.year() as i64)),
        ("month".to_string(), Value::from(date.month() as i64)),
        ("day".to_string(), Value::from(date.day() as i64)),
        ("hour".to_string(), Value::from(date.hour() as i64)),
        ("minute".to_string(), Value::from(date.minute() as i64)),
        (
            "dayOfWeek".to_string(),
            Value::from(date.format("%A").to_string()),
        ),
    ]
}

pub fn date_time(ctx: &ExecutionContext, date: NaiveDateTime) -> EvalResult<Value> {
    Ok(ctx.create_embedded("DateTime", date_fields(date))?.into())
}

fn write_date(target: &ObjectRef, date: NaiveDateTime) -> EvalResult<()> {
    for (field, value) in date_fields(date) {
        target.set(&field, &value)?;
    }
    Ok(())
}

fn date_label(object: &ObjectRef) -> EvalResult<String> {
    Ok(format!(
        "{}-{}-{} {}:{}",
        int_field(object, "year")?,
        int_field(object, "month")?,
        int_field(object, "day")?,
        int_field(object, "hour")?,
        int_field(object, "minute")?
    ))
}

fn offset(date: NaiveDateTime, args: &Arguments) -> EvalResult<NaiveDateTime> {
    let months = args.int_or("year", 0)? * 12 + args.int_or("month", 0)?;
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(months as u32))
    } else {
        date.checked_sub_months(Months::new(months.unsigned_abs() as u32))
    };
    let shifted = shifted.ok_or_else(|| invalid("date offset out of range"))?;
    Ok(shifted
        + TimeDelta::days(args.int_or("day", 0)?)
        + TimeDelta::hours(args.int_or("hour", 0)?)
        + TimeDelta::minutes(args.int_or("minute", 0)?))
}

fn date_params(names: &[&str]) -> Vec<ParamDescriptor> {
    names
        .iter()
        .map(|name| ParamDescriptor::new(*name, "int").optional())
        .collect()
}

fn date_time_class() -> ClassBuilder {
    let mut builder = ClassBuilder::helper_class("DateTime")
        .field(FieldDescriptor::new("year", "int"))
        .field(FieldDescriptor::new("month", "int"))
        .field(FieldDescriptor::new("day", "int"))
        .field(FieldDescriptor::new("hour", "int"))
        .field(FieldDescriptor::new("minute", "int"))
        .field(FieldDescriptor::new("dayOfWeek", "string"));
    for (i, day) in [
        "sunday",
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
    ]
    .iter()
    .enumerate()
    {
        builder = builder.static_value(FieldDescriptor::new(*day, "int"), Value::from(i as i64));
    }
    builder
        .constructor_with(
            date_params(&["year", "month", "day", "hour", "minute"]),
            |ctx, args| {
                let base = today();
                let date = NaiveDate::from_ymd_opt(
                    args.int_or("year", base.year() as i64)? as i32,
                    args.int_or("month", base.month() as i64)? as u32,
                    args.int_or("day", base.day() as i64)? as u32,
                )
                .and_then(|d| {
                    d.and_hms_opt(
                        args.int_or("hour", base.hour() as i64).ok()? as u32,
                        args.int_or("minute", base.minute() as i64).ok()? as u32,
                        0,
                    )
                })
                .ok_or_else(|| invalid("not a valid date"))?;
                date_time(ctx, date)
            },
        )
        .static_function(
            FuncDescriptor::new("today", vec![], "DateTime").with_comment("Get the current date time"),
            |ctx, _| date_time(ctx, today()),
        )
        .method(
            FuncDescriptor::new(
                "addDateOffset",
                ["year", "month", "day", "hour", "minute"]
                    .iter()
                    .map(|name| ParamDescriptor::new(*name, "int").with_default(DefaultValue::Int(0)))
                    .collect(),
                "DateTime",
            )
            .with_comment("Add a date offset to the current date"),
            |_, target, args| {
                let date = offset(naive(target)?, args)?;
                write_date(target, date)?;
                Ok(Value::Object(target.clone()))
            },
        )
        .compare(|_, a, b| Ok(naive_value(a)?.cmp(&naive_value(b)?)))
}

fn food_class() -> ClassBuilder {
    ClassBuilder::data_class("Food", "name")
        .comment("A food item")
        .field(FieldDescriptor::new("name", "string"))
        .field(FieldDescriptor::new("price", "float"))
        .field(
            FieldDescriptor::new("restaurant", "Restaurant")
                .with_comment("The restaurant this food is served at"),
        )
        .static_function(
            FuncDescriptor::new("all", vec![], "Food[]").with_comment("All foods"),
            |ctx, _| Ok(Value::from(ctx.all_objects("Food")?)),
        )
        .describe(|_, food| {
            let restaurant = food.get("restaurant")?;
            Ok(json!({
                "name": string_field(food, "name")?,
                "price": food.get("price")?.primitive_json(),
                "restaurant": match restaurant.as_object() {
                    Some(r) => json!(string_field(r, "name")?),
                    None => serde_json::Value::Null,
                },
            }))
        })
}

fn current_order(ctx: &ExecutionContext) -> EvalResult<Value> {
    ctx.dispatch(|| {
        let current = ctx.static_value("Order", "current")?;
        if current.as_object().is_some() {
            return Ok(current);
        }
        let count = ctx.all_objects("Order")?.len();
        let restaurant = first_restaurant(ctx)?;
        let order = ctx.create_entity(
            "Order",
            vec![
                ("orderId".to_string(), Value::from((count + 1).to_string())),
                ("dateTime".to_string(), date_time(ctx, today())?),
                ("foods".to_string(), Value::from(Vec::new())),
                ("restaurant".to_string(), restaurant),
            ],
        )?;
        let order = Value::from(order);
        ctx.set_static_value("Order", "current", &order)?;
        Ok(order)
    })
}

fn order_class() -> ClassBuilder {
    ClassBuilder::data_class("Order", "orderId")
        .comment("An Order")
        .field(FieldDescriptor::new("orderId", "string"))
        .field(FieldDescriptor::new("dateTime", "DateTime"))
        .field(FieldDescriptor::new("foods", "Food[]"))
        .field(FieldDescriptor::new("restaurant", "Restaurant"))
        .method(
            FuncDescriptor::new(
                "addFoods",
                vec![ParamDescriptor::new("foods", "Food[]")],
                "void",
            )
            .with_comment("Add a list of foods to the order"),
            |_, order, args| {
                let added = args.array("foods")?.items().to_vec();
                let mut foods = order.get("foods")?;
                if let Some(foods) = foods.as_array_mut() {
                    foods.extend(added)?;
                }
                Ok(Value::Null)
            },
        )
        .method(
            FuncDescriptor::new(
                "removeFoods",
                vec![ParamDescriptor::new("foods", "Food[]")],
                "void",
            )
            .with_comment("Remove a list of foods from the order"),
            |_, order, args| {
                let removed = args.array("foods")?.items().to_vec();
                let mut foods = order.get("foods")?;
                if let Some(foods) = foods.as_array_mut() {
                    foods.retain(|food| !removed.contains(food))?;
                }
                Ok(Value::Null)
            },
        )
        .method(
            FuncDescriptor::new("placeOrder", vec![], "void").with_comment("Place the order"),
            |_, order, _| {
                let restaurant = order.get("restaurant")?;
                if let Some(restaurant) = restaurant.as_object() {
                    let mut orders = restaurant.get("orders")?;
                    if let Some(orders) = orders.as_array_mut() {
                        if !orders.items().contains(&Value::Object(order.clone())) {
                            orders.push(Value::Object(order.clone()))?;
                        }
                    }
                }
                Ok(Value::Null)
            },
        )
        .static_function(
            FuncDescriptor::new("current", vec![], "Order").with_comment("The current order"),
            |ctx, _| current_order(ctx),
        )
        .static_function(
            FuncDescriptor::new("all", vec![], "Order[]").with_comment("All past orders"),
            |ctx, _| Ok(Value::from(ctx.all_objects("Order")?)),
        )
        .describe(|_, order| {
            let date = order.get("dateTime")?;
            let foods = order.get("foods")?;
            let restaurant = order.get("restaurant")?;
            Ok(json!({
                "dateTime": match date.as_object() {
                    Some(date) => json!(date_label(date)?),
                    None => serde_json::Value::Null,
                },
                "foods": foods
                    .as_array()
                    .map(|foods| {
                        foods
                            .iter()
                            .filter_map(Value::as_object)
                            .map(|food| string_field(food, "name"))
                            .collect::<EvalResult<Vec<_>>>()
                    })
                    .transpose()?,
                "restaurant": match restaurant.as_object() {
                    Some(r) => json!(string_field(r, "name")?),
                    None => serde_json::Value::Null,
                },
            }))
        })
}

fn first_restaurant(ctx: &ExecutionContext) -> EvalResult<Value> {
    ctx.all_objects("Restaurant")?
        .into_iter()
        .next()
        .ok_or_else(|| EvalError::Application("no restaurants".to_string()))
}

const RESTAURANTS: [(&str, i64, i64, &str, &str); 7] = [
    ("McDonald's", 4, 2, "Fast Food", "123 Main St, Mountain view, USA"),
    ("KFC", 3, 1, "Fast Food", "123 Main St, Palo Alto, USA"),
    ("Pizza Hut", 4, 2, "Fast Food", "123 Main St, Palo Alto, USA"),
    ("Burger King", 4, 2, "Fast Food", "123 Main St, Mountain View, USA"),
    ("Taste", 5, 3, "Chinese", "123 Main St, Palo Alto, USA"),
    ("Oren's Hummus", 4, 2, "Middle Eastern", "123 Main St, Mountain View, USA"),
    ("Steam", 4, 2, "Chinese", "123 Main St, Palo Alto, USA"),
];

fn push_to(object: &ObjectRef, field: &str, value: Value) -> EvalResult<()> {
    let mut items = object.get(field)?;
    match items.as_array_mut() {
        Some(items) => Ok(items.push(value)?),
        None => Err(invalid(format!("{} is not an array", field))),
    }
}

fn create_food(ctx: &ExecutionContext, restaurant: &ObjectRef, name: &str, price: f64) -> EvalResult<Value> {
    let food = Value::from(ctx.create_entity(
        "Food",
        vec![
            ("name".to_string(), Value::from(name)),
            ("price".to_string(), Value::from(price)),
            ("restaurant".to_string(), Value::Object(restaurant.clone())),
        ],
    )?);
    push_to(restaurant, "menu", food.clone())?;
    Ok(food)
}

fn create_order(
    ctx: &ExecutionContext,
    restaurant: &ObjectRef,
    (month, day, hour): (u32, u32, u32),
    foods: Vec<Value>,
) -> EvalResult<()> {
    let count = ctx.all_objects("Order")?.len();
    let date = NaiveDate::from_ymd_opt(2020, month, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .ok_or_else(|| invalid("not a valid date"))?;
    let order = Value::from(ctx.create_entity(
        "Order",
        vec![
            ("orderId".to_string(), Value::from((count + 1).to_string())),
            ("dateTime".to_string(), date_time(ctx, date)?),
            ("foods".to_string(), Value::from(foods)),
            ("restaurant".to_string(), Value::Object(restaurant.clone())),
        ],
    )?);
    push_to(restaurant, "orders", order)
}

fn seed(ctx: &ExecutionContext) -> EvalResult<()> {
    ctx.dispatch(|| {
        let mut restaurants = Vec::new();
        for (name, rating, price_grade, cuisine, address) in RESTAURANTS {
            let restaurant = ctx.create_entity(
                "Restaurant",
                vec![
                    ("name".to_string(), Value::from(name)),
                    ("rating".to_string(), Value::from(rating)),
                    ("priceGrade".to_string(), Value::from(price_grade)),
                    ("cuisine".to_string(), Value::from(cuisine)),
                    ("address".to_string(), Value::from(address)),
                ],
            )?;
            restaurants.push(ObjectRef::Entity(restaurant));
        }

        let mcdonalds = &restaurants[0];
        let mut menu = Vec::new();
        for (name, price) in [
            ("Hamburger", 5.0),
            ("Cheeseburger", 6.0),
            ("McFlurry", 3.0),
            ("McChicken", 4.0),
            ("McDouble", 4.0),
            ("Coca Cola Coke", 2.0),
        ] {
            menu.push(create_food(ctx, mcdonalds, name, price)?);
        }
        create_order(ctx, mcdonalds, (1, 1, 12), menu[0..2].to_vec())?;
        create_order(ctx, mcdonalds, (1, 1, 13), menu[2..4].to_vec())?;
        create_order(ctx, mcdonalds, (2, 1, 14), menu[4..6].to_vec())?;

        let kfc = &restaurants[1];
        let mut menu = Vec::new();
        for (name, price) in [("Chicken", 5.0), ("Fries", 2.0), ("Pepsi Coke", 2.0)] {
            menu.push(create_food(ctx, kfc, name, price)?);
        }
        create_order(ctx, kfc, (1, 1, 15), menu[0..2].to_vec())
    })
}

fn restaurant_class(bookings: Bookings) -> ClassBuilder {
    ClassBuilder::data_class("Restaurant", "name")
        .comment("A restaurant")
        .field(FieldDescriptor::new("name", "string"))
        .field(FieldDescriptor::new("menu", "Food[]"))
        .field(FieldDescriptor::new("rating", "int"))
        .field(FieldDescriptor::new("priceGrade", "float"))
        .field(FieldDescriptor::new("cuisine", "string"))
        .field(FieldDescriptor::new("address", "string"))
        .field(FieldDescriptor::new("orders", "Order[]"))
        .static_function(
            FuncDescriptor::new("all", vec![], "Restaurant[]").with_comment("All active restaurants"),
            |ctx, _| Ok(Value::from(ctx.all_objects("Restaurant")?)),
        )
        .static_function(
            FuncDescriptor::new("All", vec![], "Restaurant[]").with_comment("All active restaurants"),
            |ctx, _| Ok(Value::from(ctx.all_objects("Restaurant")?)),
        )
        .static_function(
            FuncDescriptor::new("current", vec![], "Restaurant")
                .with_comment("The current restaurant"),
            |ctx, _| first_restaurant(ctx),
        )
        .method(
            FuncDescriptor::new(
                "book",
                vec![ParamDescriptor::new("dateTime", "DateTime?").with_default(
                    DefaultValue::Expression("DateTime.today()".to_string()),
                )],
                "void",
            )
            .with_comment("Book a table for a given date time"),
            move |_, restaurant, args| {
                let booking = format!(
                    "{} is booking for {}",
                    string_field(restaurant, "name")?,
                    date_label(args.object("dateTime")?)?
                );
                tracing::info!("{}", booking);
                bookings
                    .lock()
                    .map_err(|_| EvalError::Application("bookings poisoned".to_string()))?
                    .push(booking);
                Ok(Value::Null)
            },
        )
        .describe(|_, restaurant| {
            Ok(json!({
                "name": string_field(restaurant, "name")?,
                "cuisine": string_field(restaurant, "cuisine")?,
                "rating": restaurant.get("rating")?.primitive_json(),
                "priceGrade": restaurant.get("priceGrade")?.primitive_json(),
                "address": string_field(restaurant, "address")?,
            }))
        })
        .setup(seed)
}

/// Classes in registration order. Seeding runs in the Restaurant setup
/// hook, so every other class must be registered by then.
pub fn classes(bookings: Bookings) -> ClassRegistry {
    let mut registry = ClassRegistry::new();
    for definition in [
        date_time_class().build(),
        food_class().build(),
        order_class().build(),
        restaurant_class(bookings).build(),
    ] {
        registry.register(definition).expect("unique classes");
    }
    registry
}

pub const RESTAURANT_DESCRIPTION: &str = "// A restaurant\n\
class Restaurant {\n\
\tstring name;\n\
\tFood[] menu;\n\
\tint rating;\n\
\tfloat priceGrade;\n\
\tstring cuisine;\n\
\tstring address;\n\
\tOrder[] orders;\n\
\t// All active restaurants\n\
\tstatic Restaurant[] all();\n\
\t// All active restaurants\n\
\tstatic Restaurant[] All();\n\
\t// The current restaurant\n\
\tstatic Restaurant current();\n\
\t// Book a table for a given date time\n\
\tvoid book(dateTime: DateTime? = `DateTime.today()`);\n\
}";
