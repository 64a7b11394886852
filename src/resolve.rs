//! Quantity resolution of dish instances
//!
//! Resolving a dish instance scales its base recipe to the guest count of
//! the event and applies the override ledger on top. The result is the
//! effective ingredient list used for purchasing.

use serde::Serialize;

use crate::{
    catalog::Catalog,
    error::Error,
    ledger::{DishLedger, LedgerStore},
    model::{Dish, IngredientId, InstanceKey},
    scale::ScaleTarget,
};

/// One ingredient of a resolved dish instance
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedIngredientLine {
    pub ingredient: IngredientId,
    pub unit: String,
    /// Recipe quantity, 0 for ad-hoc ingredients
    pub base_quantity: f64,
    /// Recipe quantity scaled to the guest count, 0 for ad-hoc ingredients
    pub scaled_quantity: f64,
    /// Quantity confirmed by a user
    pub custom_quantity: Option<f64>,
    /// Quantity used for purchasing
    pub effective_quantity: f64,
    pub is_main: bool,
    pub added_ad_hoc: bool,
}

impl ResolvedIngredientLine {
    /// The line has been explicitly confirmed by a user
    pub fn is_confirmed(&self) -> bool {
        self.custom_quantity.is_some()
    }
}

/// Resolved ingredient list of a dish instance
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientTable {
    pub instance: InstanceKey,
    pub guest_count: u32,
    /// Ledger version the table was resolved from
    pub version: u64,
    pub lines: Vec<ResolvedIngredientLine>,
    /// Every line has a custom quantity
    pub complete: bool,
    /// Number of lines with a custom quantity
    pub confirmed: usize,
}

impl IngredientTable {
    pub fn new(
        instance: InstanceKey,
        guest_count: u32,
        version: u64,
        lines: Vec<ResolvedIngredientLine>,
    ) -> Self {
        let confirmed = lines.iter().filter(|l| l.is_confirmed()).count();
        Self {
            instance,
            guest_count,
            version,
            complete: confirmed == lines.len(),
            confirmed,
            lines,
        }
    }

    pub fn line(&self, ingredient: &IngredientId) -> Option<&ResolvedIngredientLine> {
        self.lines.iter().find(|l| &l.ingredient == ingredient)
    }
}

/// Resolve a dish instance from the catalog and the stored ledger
///
/// Fails with [`Error::NotFound`] if the event or the dish don't exist and
/// with [`Error::NotOnMenu`] if the dish is not served at the event.
#[tracing::instrument(level = "debug", skip_all, fields(instance = %key))]
pub fn resolve<C, L>(catalog: &C, ledger: &L, key: &InstanceKey) -> Result<IngredientTable, Error>
where
    C: Catalog + ?Sized,
    L: LedgerStore + ?Sized,
{
    let event = catalog.require_event(&key.event)?;
    if !event.menu.contains(&key.dish) {
        return Err(Error::NotOnMenu {
            instance: key.clone(),
        });
    }
    let dish = catalog.require_dish(&key.dish)?;
    let rows = ledger.load(key)?;
    let lines = resolve_lines(catalog, &dish, event.guest_count, &rows)?;
    Ok(IngredientTable::new(
        key.clone(),
        event.guest_count,
        rows.version(),
        lines,
    ))
}

/// Effective ingredient lines of `dish` for `guests` with the given ledger
///
/// Order is main ingredients, then the other recipe ingredients, both in
/// recipe order, then ad-hoc ingredients in the order they were added.
/// Removed ingredients are left out.
pub fn resolve_lines<C>(
    catalog: &C,
    dish: &Dish,
    guests: u32,
    ledger: &DishLedger,
) -> Result<Vec<ResolvedIngredientLine>, Error>
where
    C: Catalog + ?Sized,
{
    let target = ScaleTarget::for_dish(dish, guests)?;

    let (main, extra): (Vec<_>, Vec<_>) = dish
        .ingredients
        .iter()
        .filter(|e| !ledger.is_removed(&e.ingredient))
        .partition(|e| e.is_main);

    let mut lines = Vec::with_capacity(dish.ingredients.len());
    for entry in main.into_iter().chain(extra) {
        let scaled_quantity = target.scale(entry.quantity);
        let custom_quantity = ledger
            .get(&entry.ingredient)
            .and_then(|row| row.custom_quantity());
        lines.push(ResolvedIngredientLine {
            ingredient: entry.ingredient.clone(),
            unit: entry.unit.clone(),
            base_quantity: entry.quantity,
            scaled_quantity,
            custom_quantity,
            effective_quantity: custom_quantity.unwrap_or(scaled_quantity),
            is_main: entry.is_main,
            added_ad_hoc: false,
        });
    }

    for row in ledger.ad_hoc() {
        if dish.contains(&row.ingredient) {
            continue;
        }
        let Some(quantity) = row.custom_quantity() else {
            continue;
        };
        let ingredient = catalog.require_ingredient(&row.ingredient)?;
        lines.push(ResolvedIngredientLine {
            ingredient: row.ingredient.clone(),
            unit: ingredient.unit.clone(),
            base_quantity: 0.0,
            scaled_quantity: 0.0,
            custom_quantity: Some(quantity),
            effective_quantity: quantity,
            is_main: false,
            added_ad_hoc: true,
        });
    }

    tracing::trace!(lines = lines.len(), factor = target.factor(), "resolved");
    Ok(lines)
}
