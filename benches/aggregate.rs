use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use portion::{
    Booking, CallerContext, CatalogBuilder, Dish, Engine, Event, Ingredient, IngredientType,
    InstanceKey, MemoryCatalog, MemoryLedger, Occasion, RecipeIngredient,
};

const INGREDIENTS: usize = 200;
const DISHES: usize = 40;
const TYPES: usize = 12;

fn catalog(events: usize) -> MemoryCatalog {
    let mut builder = CatalogBuilder::new();
    for t in 0..TYPES {
        builder
            .add_ingredient_type(IngredientType {
                id: format!("type-{t}").into(),
                name: format!("Type {t}"),
            })
            .unwrap();
    }
    for i in 0..INGREDIENTS {
        builder
            .add_ingredient(Ingredient {
                id: format!("ing-{i}").into(),
                name: format!("Ingredient {i}"),
                unit: if i % 3 == 0 { "ml" } else { "g" }.into(),
                price_per_unit: 0.01 * (i % 17 + 1) as f64,
                supplier: (i % 5 != 0).then(|| format!("supplier-{}", i % 7)),
                // one type past the known ones lands in "other"
                ingredient_type: format!("type-{}", i % (TYPES + 1)).into(),
            })
            .unwrap();
    }
    for d in 0..DISHES {
        let ingredients = (0..12)
            .map(|n| {
                let i = (d * 7 + n * 13) % INGREDIENTS;
                RecipeIngredient {
                    ingredient: format!("ing-{i}").into(),
                    quantity: 100.0 + n as f64 * 25.0,
                    unit: if i % 3 == 0 { "ml" } else { "g" }.into(),
                    is_main: n == 0,
                }
            })
            .collect();
        builder
            .add_dish(Dish {
                id: format!("dish-{d}").into(),
                name: format!("Dish {d}"),
                base_serving_people: 100,
                ingredients,
            })
            .unwrap();
    }
    for e in 0..events {
        builder
            .add_event(Event {
                id: format!("event-{e}").into(),
                name: String::new(),
                guest_count: 50 + (e as u32 * 37) % 400,
                menu: (0..8)
                    .map(|m| format!("dish-{}", (e * 3 + m * 5) % DISHES).into())
                    .collect(),
            })
            .unwrap();
    }
    builder
        .add_occasion(Occasion {
            id: "all".into(),
            name: String::new(),
            events: (0..events).map(|e| format!("event-{e}").into()).collect(),
        })
        .unwrap();
    builder
        .add_booking(Booking {
            id: "booking".into(),
            name: String::new(),
            occasions: vec!["all".into()],
        })
        .unwrap();
    builder.finish().unwrap()
}

fn aggregate_booking(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate booking");

    for events in [1, 10, 50] {
        let engine = Engine::new(catalog(events), MemoryLedger::new());
        let chef = CallerContext::new("bench");
        // a few overrides so the ledger is not empty
        for e in 0..events {
            let key = InstanceKey::new(format!("event-{e}"), format!("dish-{}", (e * 3) % DISHES));
            let _ = engine.rescale_from_anchor(
                &key,
                &format!("ing-{}", ((e * 3) % DISHES) * 7 % INGREDIENTS).into(),
                500.0,
                &chef,
            );
        }
        let booking = "booking".into();

        group.bench_with_input(BenchmarkId::new("uncached", events), &events, |b, _| {
            b.iter(|| {
                // every write moves the watermark, so the cache never hits
                let key = InstanceKey::new("event-0", "dish-0");
                let _ = engine.modify(&key, &"ing-13".into(), black_box(1.0), &chef);
                let _ = engine.modify(&key, &"ing-13".into(), black_box(2.0), &chef);
                engine.aggregate_booking(&booking).unwrap()
            })
        });

        group.bench_with_input(BenchmarkId::new("cached", events), &events, |b, _| {
            b.iter(|| engine.aggregate_booking(black_box(&booking)).unwrap())
        });
    }
}

fn resolve(c: &mut Criterion) {
    let engine = Engine::new(catalog(1), MemoryLedger::new());
    let key = InstanceKey::new("event-0", "dish-0");
    c.bench_function("resolve dish instance", |b| {
        b.iter(|| engine.ingredient_table(black_box(&key)).unwrap())
    });
}

criterion_group!(benches, aggregate_booking, resolve);
criterion_main!(benches);
