#![allow(dead_code)]

use indoc::indoc;
use portion::{Engine, MemoryCatalog, MemoryLedger};

pub const CATALOG: &str = indoc! {r#"
    [[ingredient_type]]
    id = "dairy"
    name = "Dairy"

    [[ingredient_type]]
    id = "spices"
    name = "Spices"

    [[ingredient_type]]
    id = "vegetables"
    name = "Vegetables"

    [[ingredient]]
    id = "paneer"
    name = "Paneer"
    unit = "g"
    price = 0.4
    supplier = "Amul"
    type = "dairy"

    [[ingredient]]
    id = "butter"
    name = "Butter"
    unit = "g"
    price = 0.6
    supplier = "Amul"
    type = "dairy"

    [[ingredient]]
    id = "cream"
    name = "Cream"
    unit = "ml"
    price = 0.2
    supplier = "Amul"
    type = "dairy"

    [[ingredient]]
    id = "tomato"
    name = "Tomato"
    unit = "g"
    price = 0.05
    supplier = "Market"
    type = "vegetables"

    [[ingredient]]
    id = "peas"
    name = "Green peas"
    unit = "g"
    price = 0.12
    supplier = "Market"
    type = "vegetables"

    [[ingredient]]
    id = "saffron"
    name = "Saffron"
    unit = "g"
    price = 300
    type = "spices"

    [[ingredient]]
    id = "rice"
    name = "Basmati rice"
    unit = "kg"
    price = 80
    supplier = "Market"
    type = "grains"

    [[dish]]
    id = "pbm"
    name = "Paneer Butter Masala"
    serves = 100
    ingredients = [
        { ingredient = "butter", quantity = 1000 },
        { ingredient = "paneer", quantity = 5000, main = true },
        { ingredient = "tomato", quantity = 3000 },
        { ingredient = "cream", quantity = 500 },
    ]

    [[dish]]
    id = "pulao"
    name = "Peas pulao"
    serves = 10
    ingredients = [
        { ingredient = "rice", quantity = 1, main = true },
        { ingredient = "peas", quantity = 200 },
    ]

    [[event]]
    id = "lunch"
    name = "Wedding lunch"
    guests = 50
    menu = ["pbm", "pulao"]

    [[event]]
    id = "dinner"
    name = "Wedding dinner"
    guests = 80
    menu = ["pbm"]

    [[event]]
    id = "sangeet"
    guests = 120
    menu = ["pulao"]

    [[occasion]]
    id = "wedding"
    events = ["lunch", "dinner"]

    [[occasion]]
    id = "sangeet-night"
    events = ["sangeet"]

    [[booking]]
    id = "b-42"
    name = "Sharma wedding"
    occasions = ["wedding", "sangeet-night"]
"#};

pub fn catalog() -> MemoryCatalog {
    MemoryCatalog::from_toml_str(CATALOG).unwrap()
}

pub fn engine() -> Engine {
    Engine::new(catalog(), MemoryLedger::new())
}

pub fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-9, "{a} != {b}");
}
