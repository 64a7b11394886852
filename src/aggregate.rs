//! Aggregation of resolved dish instances into purchase reports
//!
//! Every resolved line of every dish instance in scope is grouped by
//! ingredient and summed. Quantities are never converted silently: with
//! [`UnitPolicy::Strict`] every line must already be in the unit the
//! ingredient is priced in, with [`UnitPolicy::ConvertToCatalogUnit`] the
//! lines are converted first and a failed conversion is an error too.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
    catalog::Catalog,
    convert::Converter,
    error::Error,
    model::{BookingId, EventId, Ingredient, IngredientId, IngredientTypeId, InstanceKey},
    quantity::{IncompatibleUnits, Quantity, QuantityAddError},
    resolve::IngredientTable,
};

/// Name of the bucket for ingredients whose type is not in the catalog
pub const OTHER_TYPE: &str = "other";

/// How lines in units other than the catalog unit are handled
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UnitPolicy {
    /// Lines must be in the catalog unit of the ingredient
    #[default]
    Strict,
    /// Lines are converted to the catalog unit of the ingredient
    ConvertToCatalogUnit,
}

/// Aggregation configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateOptions {
    pub unit_policy: UnitPolicy,
    /// Fit purchase list quantities to the best unit, like `2500 g` to `2.5 kg`
    pub fit_display: bool,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            unit_policy: UnitPolicy::Strict,
            fit_display: true,
        }
    }
}

/// What a report covers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum ReportScope {
    Booking(BookingId),
    Event(EventId),
}

impl std::fmt::Display for ReportScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportScope::Booking(id) => write!(f, "booking {id}"),
            ReportScope::Event(id) => write!(f, "event {id}"),
        }
    }
}

/// Total of one ingredient over the report scope
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedIngredientRow {
    pub ingredient: IngredientId,
    pub name: String,
    pub total_quantity: f64,
    /// Catalog unit of the ingredient
    pub unit: String,
    pub price_per_unit: f64,
    pub total_cost: f64,
    pub supplier: Option<String>,
    pub ingredient_type: IngredientTypeId,
    /// Dish instances using the ingredient
    pub instances: SmallVec<[InstanceKey; 4]>,
}

/// Ingredients of one type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeBucket {
    /// `None` for the [`OTHER_TYPE`] bucket
    pub ingredient_type: Option<IngredientTypeId>,
    pub name: String,
    pub ingredients: Vec<IngredientId>,
    pub total_cost: f64,
}

/// Everything bought from one supplier
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierTotal {
    /// `None` for ingredients without supplier
    pub supplier: Option<String>,
    pub ingredients: usize,
    pub total_cost: f64,
    /// Purchase order lines, sorted by name
    pub items: Vec<PurchaseItem>,
}

/// Entry of the purchase list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseItem {
    pub ingredient: IngredientId,
    pub name: String,
    /// Exact total in the catalog unit
    pub quantity: Quantity,
    /// Total to show, fitted to a best unit if enabled
    pub display: Quantity,
    pub supplier: Option<String>,
    pub total_cost: f64,
}

/// Purchase list items of one ingredient type, sorted by name
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseGroup {
    pub ingredient_type: Option<IngredientTypeId>,
    pub name: String,
    pub items: Vec<PurchaseItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub distinct_ingredients: usize,
    pub distinct_types: usize,
    pub grand_total_cost: f64,
    pub instances_resolved: usize,
    /// Dish instances with lines not confirmed by a user
    pub incomplete_instances: usize,
}

/// Aggregated purchase report
///
/// Rows are in order of first appearance. Type buckets and purchase groups
/// are sorted by type id with the [`OTHER_TYPE`] bucket last. Suppliers
/// are sorted by name with the ingredients without supplier last.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub scope: ReportScope,
    /// Ledger watermark the report was computed at
    pub watermark: u64,
    pub summary: ReportSummary,
    pub rows: Vec<AggregatedIngredientRow>,
    pub types: Vec<TypeBucket>,
    pub suppliers: Vec<SupplierTotal>,
    pub purchase_list: Vec<PurchaseGroup>,
}

impl Report {
    pub fn row(&self, ingredient: &IngredientId) -> Option<&AggregatedIngredientRow> {
        self.rows.iter().find(|r| &r.ingredient == ingredient)
    }

    pub fn supplier(&self, supplier: Option<&str>) -> Option<&SupplierTotal> {
        self.suppliers
            .iter()
            .find(|s| s.supplier.as_deref() == supplier)
    }
}

struct Group {
    ingredient: Arc<Ingredient>,
    total: Quantity,
    instances: SmallVec<[InstanceKey; 4]>,
}

/// Aggregate resolved dish instances
///
/// Fails with [`Error::UnitMismatch`] on the first ingredient whose lines
/// can't be summed in its catalog unit.
#[tracing::instrument(level = "debug", skip_all, fields(scope = %scope, instances = tables.len()))]
pub fn aggregate<C>(
    catalog: &C,
    converter: &Converter,
    options: &AggregateOptions,
    scope: ReportScope,
    watermark: u64,
    tables: &[IngredientTable],
) -> Result<Report, Error>
where
    C: Catalog + ?Sized,
{
    let mut groups: IndexMap<IngredientId, Group> = IndexMap::new();

    for table in tables {
        for line in &table.lines {
            let group = match groups.entry(line.ingredient.clone()) {
                indexmap::map::Entry::Occupied(e) => e.into_mut(),
                indexmap::map::Entry::Vacant(e) => {
                    let ingredient = catalog.require_ingredient(&line.ingredient)?;
                    let total = Quantity::new(0.0, ingredient.unit.clone());
                    e.insert(Group {
                        ingredient,
                        total,
                        instances: SmallVec::new(),
                    })
                }
            };

            let mismatch = |source: QuantityAddError| {
                tracing::warn!(
                    ingredient = %line.ingredient,
                    instance = %table.instance,
                    line_unit = %line.unit,
                    catalog_unit = %group.ingredient.unit,
                    "unit mismatch"
                );
                Error::UnitMismatch {
                    ingredient: line.ingredient.clone(),
                    source,
                }
            };

            let quantity = Quantity::new(line.effective_quantity, line.unit.clone());
            let quantity = match options.unit_policy {
                UnitPolicy::Strict => {
                    if !converter.same_unit(&quantity.unit, &group.ingredient.unit) {
                        return Err(mismatch(
                            IncompatibleUnits::PriceUnit {
                                unit: quantity.unit,
                                price_unit: group.ingredient.unit.clone(),
                            }
                            .into(),
                        ));
                    }
                    quantity
                }
                UnitPolicy::ConvertToCatalogUnit => quantity
                    .convert_to(&group.ingredient.unit, converter)
                    .map_err(|e| mismatch(e.into()))?,
            };

            let total = group
                .total
                .try_add(&quantity, converter)
                .map_err(|e| mismatch(e.into()))?;
            group.total = total;
            group.instances.push(table.instance.clone());
        }
    }

    let rows: Vec<AggregatedIngredientRow> = groups
        .into_values()
        .map(|g| AggregatedIngredientRow {
            ingredient: g.ingredient.id.clone(),
            name: g.ingredient.name.clone(),
            total_quantity: g.total.value,
            unit: g.total.unit,
            price_per_unit: g.ingredient.price_per_unit,
            total_cost: g.total.value * g.ingredient.price_per_unit,
            supplier: g.ingredient.supplier.clone(),
            ingredient_type: g.ingredient.ingredient_type.clone(),
            instances: g.instances,
        })
        .collect();

    let types = type_buckets(catalog, &rows);
    let suppliers = supplier_totals(converter, options, &rows);
    let purchase_list = purchase_list(converter, options, &rows, &types);

    let summary = ReportSummary {
        distinct_ingredients: rows.len(),
        distinct_types: rows
            .iter()
            .map(|r| &r.ingredient_type)
            .collect::<HashSet<_>>()
            .len(),
        grand_total_cost: rows.iter().fold(0.0, |acc, r| acc + r.total_cost),
        instances_resolved: tables.len(),
        incomplete_instances: tables.iter().filter(|t| !t.complete).count(),
    };

    tracing::debug!(
        ingredients = summary.distinct_ingredients,
        total = summary.grand_total_cost,
        "aggregated"
    );

    Ok(Report {
        scope,
        watermark,
        summary,
        rows,
        types,
        suppliers,
        purchase_list,
    })
}

fn type_buckets<C: Catalog + ?Sized>(catalog: &C, rows: &[AggregatedIngredientRow]) -> Vec<TypeBucket> {
    let mut known: BTreeMap<IngredientTypeId, TypeBucket> = BTreeMap::new();
    let mut other = TypeBucket {
        ingredient_type: None,
        name: OTHER_TYPE.to_string(),
        ingredients: Vec::new(),
        total_cost: 0.0,
    };

    for row in rows {
        let bucket = match catalog.ingredient_type(&row.ingredient_type) {
            Some(t) => known.entry(t.id.clone()).or_insert_with(|| TypeBucket {
                ingredient_type: Some(t.id.clone()),
                name: t.name.clone(),
                ingredients: Vec::new(),
                total_cost: 0.0,
            }),
            None => &mut other,
        };
        bucket.ingredients.push(row.ingredient.clone());
        bucket.total_cost += row.total_cost;
    }

    let mut buckets: Vec<_> = known.into_values().collect();
    if !other.ingredients.is_empty() {
        buckets.push(other);
    }
    buckets
}

fn supplier_totals(
    converter: &Converter,
    options: &AggregateOptions,
    rows: &[AggregatedIngredientRow],
) -> Vec<SupplierTotal> {
    let new_total = |supplier: Option<String>| SupplierTotal {
        supplier,
        ingredients: 0,
        total_cost: 0.0,
        items: Vec::new(),
    };
    let mut by_supplier: BTreeMap<&str, SupplierTotal> = BTreeMap::new();
    let mut unknown = new_total(None);

    for row in rows {
        let total = match &row.supplier {
            Some(s) => by_supplier
                .entry(s)
                .or_insert_with(|| new_total(Some(s.clone()))),
            None => &mut unknown,
        };
        total.ingredients += 1;
        total.total_cost += row.total_cost;
        total.items.push(purchase_item(converter, options, row));
    }

    let mut totals: Vec<_> = by_supplier.into_values().collect();
    if unknown.ingredients > 0 {
        totals.push(unknown);
    }
    for total in &mut totals {
        total.items.sort_by(|a, b| a.name.cmp(&b.name));
    }
    totals
}

fn purchase_list(
    converter: &Converter,
    options: &AggregateOptions,
    rows: &[AggregatedIngredientRow],
    types: &[TypeBucket],
) -> Vec<PurchaseGroup> {
    let by_id: HashMap<&IngredientId, &AggregatedIngredientRow> =
        rows.iter().map(|r| (&r.ingredient, r)).collect();

    types
        .iter()
        .map(|bucket| {
            let mut items: Vec<PurchaseItem> = bucket
                .ingredients
                .iter()
                .filter_map(|id| by_id.get(id))
                .map(|row| purchase_item(converter, options, row))
                .collect();
            items.sort_by(|a, b| a.name.cmp(&b.name));
            PurchaseGroup {
                ingredient_type: bucket.ingredient_type.clone(),
                name: bucket.name.clone(),
                items,
            }
        })
        .collect()
}

fn purchase_item(
    converter: &Converter,
    options: &AggregateOptions,
    row: &AggregatedIngredientRow,
) -> PurchaseItem {
    let quantity = Quantity::new(row.total_quantity, row.unit.clone());
    let mut display = quantity.clone();
    if options.fit_display {
        if let Err(e) = display.fit(converter) {
            tracing::trace!(ingredient = %row.ingredient, "display not fitted: {e}");
            display = quantity.clone();
        }
    }
    PurchaseItem {
        ingredient: row.ingredient.clone(),
        name: row.name.clone(),
        quantity,
        display,
        supplier: row.supplier.clone(),
        total_cost: row.total_cost,
    }
}

/// Cache of computed reports
///
/// A report is reused while the ledger watermark of its scope doesn't move.
/// Computing the watermark is up to the caller, see
/// [`Engine`](crate::Engine).
#[derive(Debug, Default)]
pub struct ReportCache {
    reports: Mutex<HashMap<(ReportScope, AggregateOptions), Arc<Report>>>,
}

impl ReportCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached report computed at `watermark`
    pub fn get(
        &self,
        scope: &ReportScope,
        options: &AggregateOptions,
        watermark: u64,
    ) -> Option<Arc<Report>> {
        let reports = self.reports.lock();
        let hit = reports
            .get(&(scope.clone(), *options))
            .filter(|r| r.watermark == watermark)
            .cloned();
        tracing::trace!(%scope, watermark, hit = hit.is_some(), "report cache");
        hit
    }

    /// Store a report, replacing older ones of the same scope and options
    pub fn insert(&self, options: &AggregateOptions, report: Report) -> Arc<Report> {
        let report = Arc::new(report);
        let mut reports = self.reports.lock();
        let key = (report.scope.clone(), *options);
        match reports.get(&key) {
            // a slower request may finish after a newer report was stored
            Some(current) if current.watermark > report.watermark => {}
            _ => {
                reports.insert(key, Arc::clone(&report));
            }
        }
        report
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}
