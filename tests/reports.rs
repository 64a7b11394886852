mod common;

use std::sync::Arc;

use common::{assert_close, engine, CATALOG};
use indoc::indoc;
use portion::{
    aggregate::OTHER_TYPE, AggregateOptions, CallerContext, Engine, Error, ErrorKind,
    IngredientId, InstanceKey, MemoryCatalog, MemoryLedger, ReportScope, UnitPolicy,
};

#[test]
fn event_report() {
    let engine = engine();
    let report = engine.aggregate_event(&"lunch".into()).unwrap();
    assert_eq!(report.scope, ReportScope::Event("lunch".into()));

    let ids: Vec<_> = report.rows.iter().map(|r| r.ingredient.as_str()).collect();
    assert_eq!(ids, ["paneer", "butter", "tomato", "cream", "rice", "peas"]);

    let paneer = report.row(&"paneer".into()).unwrap();
    assert_eq!(paneer.total_quantity, 2500.0);
    assert_eq!(paneer.unit, "g");
    assert_eq!(paneer.price_per_unit, 0.4);
    assert_close(paneer.total_cost, 1000.0);
    assert_eq!(paneer.supplier.as_deref(), Some("Amul"));

    assert_eq!(report.summary.distinct_ingredients, 6);
    assert_eq!(report.summary.distinct_types, 3);
    assert_eq!(report.summary.instances_resolved, 2);

    // paneer 1000 + butter 300 + cream 50 + tomato 75 + peas 120 + rice 400
    assert_close(report.summary.grand_total_cost, 1945.0);
}

#[test]
fn buckets_and_suppliers() {
    let engine = engine();
    let report = engine.aggregate_booking(&"b-42".into()).unwrap();

    let types: Vec<_> = report.types.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(types, ["Dairy", "Vegetables", OTHER_TYPE]);
    let other = report.types.last().unwrap();
    assert_eq!(other.ingredient_type, None);
    assert_eq!(other.ingredients, [IngredientId::from("rice")]);

    let bucket_total: f64 = report.types.iter().map(|t| t.total_cost).sum();
    assert_close(bucket_total, report.summary.grand_total_cost);

    let suppliers: Vec<_> = report
        .suppliers
        .iter()
        .map(|s| s.supplier.as_deref())
        .collect();
    assert_eq!(suppliers, [Some("Amul"), Some("Market")]);
    let supplier_total: f64 = report.suppliers.iter().map(|s| s.total_cost).sum();
    assert_close(supplier_total, report.summary.grand_total_cost);

    let amul = report.supplier(Some("Amul")).unwrap();
    assert_eq!(amul.ingredients, 3);
}

#[test]
fn supplier_purchase_orders() {
    let engine = engine();
    let report = engine.aggregate_booking(&"b-42".into()).unwrap();

    let market = report.supplier(Some("Market")).unwrap();
    let items: Vec<_> = market
        .items
        .iter()
        .map(|i| (i.name.as_str(), i.display.to_string()))
        .collect();
    assert_eq!(
        items,
        [
            ("Basmati rice", "17 kg".to_string()),
            ("Green peas", "3.4 kg".to_string()),
            ("Tomato", "3.9 kg".to_string()),
        ]
    );
    assert!(market
        .items
        .iter()
        .all(|i| i.supplier.as_deref() == Some("Market")));
    // rice 17 * 80 + peas 3400 * 0.12 + tomato 3900 * 0.05
    assert_close(market.total_cost, 1963.0);

    for supplier in &report.suppliers {
        assert_eq!(supplier.items.len(), supplier.ingredients);
        let items_cost: f64 = supplier.items.iter().map(|i| i.total_cost).sum();
        assert_close(items_cost, supplier.total_cost);
    }
}

#[test]
fn event_in_two_occasions_counts_once() {
    let catalog = format!(
        "{CATALOG}\n{}",
        indoc! {r#"
            [[occasion]]
            id = "reception"
            events = ["dinner"]

            [[booking]]
            id = "b-43"
            occasions = ["wedding", "reception"]

            [[booking]]
            id = "b-44"
            occasions = ["wedding"]
        "#}
    );
    let engine = Engine::new(
        MemoryCatalog::from_toml_str(&catalog).unwrap(),
        MemoryLedger::new(),
    );

    let twice = engine.aggregate_booking(&"b-43".into()).unwrap();
    let once = engine.aggregate_booking(&"b-44".into()).unwrap();
    assert_eq!(twice.summary.instances_resolved, 3);
    assert_eq!(once.summary.instances_resolved, 3);
    assert_close(twice.summary.grand_total_cost, once.summary.grand_total_cost);

    // lunch 500 + dinner 800
    let butter = twice.row(&"butter".into()).unwrap();
    assert_close(butter.total_quantity, 1300.0);
    assert_eq!(butter.instances.len(), 2);
}

#[test]
fn ingredients_without_supplier() {
    let engine = engine();
    let chef = CallerContext::new("chef");
    engine
        .add(&InstanceKey::new("lunch", "pbm"), &"saffron".into(), 2.0, &chef)
        .unwrap();
    let report = engine.aggregate_event(&"lunch".into()).unwrap();
    let none = report.supplier(None).unwrap();
    assert_eq!(none.ingredients, 1);
    assert_close(none.total_cost, 600.0);
    let items: Vec<_> = none.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(items, ["Saffron"]);
    assert_eq!(report.suppliers.last().unwrap().supplier, None);
}

#[test]
fn purchase_list_is_fitted() {
    let engine = engine();
    let report = engine.aggregate_booking(&"b-42".into()).unwrap();

    let dairy = &report.purchase_list[0];
    assert_eq!(dairy.name, "Dairy");
    let items: Vec<_> = dairy
        .items
        .iter()
        .map(|i| (i.name.as_str(), i.display.to_string()))
        .collect();
    assert_eq!(
        items,
        [
            ("Butter", "1.3 kg".to_string()),
            ("Cream", "650 ml".to_string()),
            ("Paneer", "6.5 kg".to_string()),
        ]
    );
    assert_eq!(dairy.items[2].quantity.to_string(), "6500 g");

    let unfitted = engine
        .aggregate_booking_with(
            &"b-42".into(),
            &AggregateOptions {
                fit_display: false,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(
        unfitted.purchase_list[0].items[2].display.to_string(),
        "6500 g"
    );
}

#[test]
fn reports_are_cached_until_the_ledger_moves() {
    let engine = engine();
    let booking = "b-42".into();
    let first = engine.aggregate_booking(&booking).unwrap();
    let again = engine.aggregate_booking(&booking).unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    let chef = CallerContext::new("chef");
    engine
        .modify(&InstanceKey::new("dinner", "pbm"), &"butter".into(), 700.0, &chef)
        .unwrap();
    let updated = engine.aggregate_booking(&booking).unwrap();
    assert!(!Arc::ptr_eq(&first, &updated));
    assert!(updated.watermark > first.watermark);
    assert_close(updated.row(&"butter".into()).unwrap().total_quantity, 500.0 + 700.0);

    // a write elsewhere doesn't invalidate the sangeet report
    let sangeet = engine.aggregate_event(&"sangeet".into()).unwrap();
    engine
        .modify(&InstanceKey::new("lunch", "pbm"), &"butter".into(), 400.0, &chef)
        .unwrap();
    let sangeet_again = engine.aggregate_event(&"sangeet".into()).unwrap();
    assert!(Arc::ptr_eq(&sangeet, &sangeet_again));
}

const MIXED_UNITS: &str = indoc! {r#"
    [[ingredient]]
    id = "milk"
    name = "Milk"
    unit = "l"
    price = 1.2
    type = "dairy"

    [[ingredient]]
    id = "sugar"
    name = "Sugar"
    unit = "kg"
    price = 1.0
    type = "baking"

    [[dish]]
    id = "kheer"
    serves = 10
    ingredients = [
        { ingredient = "milk", quantity = 2000, unit = "ml", main = true },
        { ingredient = "sugar", quantity = 0.25 },
    ]

    [[dish]]
    id = "chai"
    serves = 10
    ingredients = [
        { ingredient = "milk", quantity = 1, main = true },
        { ingredient = "sugar", quantity = 100, unit = "tbsp" },
    ]

    [[event]]
    id = "lunch"
    guests = 20
    menu = ["kheer"]

    [[event]]
    id = "tea"
    guests = 10
    menu = ["chai"]
"#};

fn mixed() -> Engine<MemoryCatalog, MemoryLedger> {
    Engine::new(
        MemoryCatalog::from_toml_str(MIXED_UNITS).unwrap(),
        MemoryLedger::new(),
    )
}

#[test]
fn strict_policy_stops_on_unit_mismatch() {
    let err = mixed().aggregate_event(&"lunch".into()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnitMismatch);
    match err {
        Error::UnitMismatch { ingredient, .. } => assert_eq!(ingredient.as_str(), "milk"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn convert_policy_converts_to_catalog_unit() {
    let engine = mixed().with_options(AggregateOptions {
        unit_policy: UnitPolicy::ConvertToCatalogUnit,
        fit_display: true,
    });
    let report = engine.aggregate_event(&"lunch".into()).unwrap();
    let milk = report.row(&"milk".into()).unwrap();
    assert_close(milk.total_quantity, 4.0);
    assert_eq!(milk.unit, "l");
    assert_close(milk.total_cost, 4.8);

    // a volume can't be converted to a mass
    let err = engine.aggregate_event(&"tea".into()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnitMismatch);
}

#[test]
fn report_serializes() {
    let engine = engine();
    let report = engine.aggregate_booking(&"b-42".into()).unwrap();
    let json = serde_json::to_value(&*report).unwrap();

    assert_eq!(
        json["scope"],
        serde_json::json!({ "kind": "booking", "id": "b-42" })
    );
    assert_eq!(json["summary"]["distinctIngredients"], 6);
    assert!(json["summary"]["grandTotalCost"].is_number());
    assert_eq!(json["rows"][0]["ingredient"], "paneer");
    assert_eq!(json["rows"][0]["instances"][0]["event"], "lunch");
    assert_eq!(json["purchaseList"][0]["items"][0]["display"]["unit"], "kg");
}

#[test]
fn empty_booking() {
    let catalog = MemoryCatalog::from_toml_str(indoc! {r#"
        [[booking]]
        id = "empty"
        occasions = []
    "#})
    .unwrap();
    let engine = Engine::new(catalog, MemoryLedger::new());
    let report = engine.aggregate_booking(&"empty".into()).unwrap();
    assert!(report.rows.is_empty());
    assert_eq!(report.summary.instances_resolved, 0);
    assert_eq!(report.summary.grand_total_cost, 0.0);
}
