mod common;

use common::Fixture;
use genie::{eval::TypedValue, Error, EvalError, InterpreterConfig};
use pretty_assertions::assert_eq;

async fn both_modes(source: &str) -> (Result<TypedValue, Error>, Result<TypedValue, Error>) {
    let fixture = Fixture::new();
    let before = fixture.version();
    let dry = fixture.evaluator.dry_run().interpret_source(source).await;
    assert_eq!(fixture.version(), before, "dry run of {} touched the store", source);
    let live = fixture.evaluator.interpret_source(source).await;
    (dry, live)
}

fn eval_error(result: Result<TypedValue, Error>) -> EvalError {
    match result {
        Err(Error::Eval(e)) => e,
        other => panic!("expected evaluation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_placeholder_result() {
    let fixture = Fixture::with_config(InterpreterConfig::dry_run());
    let result = fixture
        .evaluator
        .interpret_source(
            r#"Order.all().contains(field: .foods, value: Restaurant.current().menu.matching(field: .name, value: "hamburger")[0])[0].restaurant.name"#,
        )
        .await
        .unwrap();
    assert_eq!(
        result,
        TypedValue::Object {
            object_type: "string".to_string(),
            value: None,
        }
    );
}

#[tokio::test]
async fn test_dry_run_does_not_mutate() {
    let fixture = Fixture::new();
    let version = fixture.version();
    let dry = fixture.evaluator.dry_run();
    assert!(dry.is_dry_run());
    dry.interpret_source("Restaurant.current().book()")
        .await
        .unwrap();
    dry.interpret_source("Order.current().addFoods(foods: Restaurant.current().menu)")
        .await
        .unwrap();
    assert_eq!(fixture.version(), version);
    assert!(fixture.last_booking().is_none());
}

#[tokio::test]
async fn test_missing_field_in_operator() {
    let (dry, live) =
        both_modes(r#"Restaurant.All().matching(field: .noiseLevel, value: "quiet")"#).await;
    let dry = eval_error(dry);
    assert_eq!(dry.to_string(), "Field Restaurant.noiseLevel is missing");
    assert!(dry.is_structural());
    assert_eq!(dry, eval_error(live));
}

#[tokio::test]
async fn test_missing_field_after_index() {
    let (dry, live) = both_modes("Restaurant.All()[0].noiseLevel").await;
    let dry = eval_error(dry);
    assert_eq!(dry.to_string(), "Field Restaurant.noiseLevel is missing");
    assert_eq!(dry, eval_error(live));
}

#[tokio::test]
async fn test_missing_function() {
    let (dry, live) = both_modes("Order.current().notifyWhenNearLocation()").await;
    let dry = eval_error(dry);
    assert_eq!(
        dry.to_string(),
        "Function Order.notifyWhenNearLocation is missing"
    );
    assert_eq!(dry, eval_error(live));
}

#[tokio::test]
async fn test_missing_class() {
    let (dry, live) = both_modes("User.login()").await;
    let dry = eval_error(dry);
    assert_eq!(dry.to_string(), "Class User is missing");
    assert_eq!(dry, eval_error(live));
}

#[tokio::test]
async fn test_nested_path_is_validated_per_level() {
    let (dry, live) =
        both_modes(r#"Order.all().matching(field: .restaurant.noiseLevel, value: "quiet")"#).await;
    let dry = eval_error(dry);
    assert_eq!(dry, EvalError::field_missing("Restaurant", "noiseLevel"));
    assert_eq!(dry, eval_error(live));
}

#[tokio::test]
async fn test_instance_function_called_statically() {
    let (dry, live) = both_modes("Restaurant.book()").await;
    let dry = eval_error(dry);
    assert!(matches!(dry, EvalError::FunctionStatic { .. }));
    assert_eq!(dry, eval_error(live));
}

#[tokio::test]
async fn test_members_checked_on_empty_filtered_arrays() {
    let (dry, live) =
        both_modes("Restaurant.all().equals(field: .priceGrade, value: 9).noiseLevel").await;
    let dry = eval_error(dry);
    assert_eq!(dry.to_string(), "Field Restaurant.noiseLevel is missing");
    assert_eq!(dry, eval_error(live));

    let (dry, live) =
        both_modes("Restaurant.all().equals(field: .priceGrade, value: 9)[0].notAMethod()").await;
    let dry = eval_error(dry);
    assert_eq!(dry.to_string(), "Function Restaurant.notAMethod is missing");
    assert_eq!(dry, eval_error(live));

    // arguments of a broadcast call over an empty array are checked too
    let (dry, live) = both_modes(
        "Restaurant.all().equals(field: .priceGrade, value: 9).book(dateTime: Calendar.today())",
    )
    .await;
    let dry = eval_error(dry);
    assert_eq!(dry.to_string(), "Class Calendar is missing");
    assert_eq!(dry, eval_error(live));
}
