//! Engine facade
//!
//! [`Engine`] ties a [`Catalog`] and a [`LedgerStore`] together and exposes
//! the operations callers use: ingredient tables, ledger mutations,
//! rescaling and reports.

use std::sync::Arc;

use indexmap::IndexSet;

use crate::{
    aggregate::{aggregate, AggregateOptions, Report, ReportCache, ReportScope},
    catalog::{Catalog, MemoryCatalog},
    convert::Converter,
    error::Error,
    ledger::{DishLedger, IngredientOverride, InstanceLocks, LedgerStore, MemoryLedger},
    model::{
        BookingId, CallerContext, Dish, Event, EventId, IngredientId, InstanceKey,
    },
    rescale::rescale_from_anchor,
    resolve::{resolve, IngredientTable, ResolvedIngredientLine},
};

/// Scaling, override and aggregation engine
///
/// All operations take `&self` and the engine can be shared between
/// threads. Writes to the same dish instance are serialized, writes to
/// different instances run in parallel. Reports never take write locks.
///
/// ```
/// # use portion::{Engine, MemoryCatalog, MemoryLedger, CallerContext, InstanceKey};
/// let catalog = MemoryCatalog::from_toml_str(r#"
///     [[ingredient]]
///     id = "rice"
///     name = "Rice"
///     unit = "g"
///     price = 0.002
///     type = "grains"
///
///     [[dish]]
///     id = "pulao"
///     serves = 10
///     ingredients = [{ ingredient = "rice", quantity = 1000, main = true }]
///
///     [[event]]
///     id = "lunch"
///     guests = 25
///     menu = ["pulao"]
/// "#).unwrap();
/// let engine = Engine::new(catalog, MemoryLedger::new());
/// let key = InstanceKey::new("lunch", "pulao");
///
/// let table = engine.ingredient_table(&key).unwrap();
/// assert_eq!(table.lines[0].scaled_quantity, 2500.0);
///
/// let chef = CallerContext::new("chef");
/// engine.modify(&key, &"rice".into(), 3000.0, &chef).unwrap();
/// let report = engine.aggregate_event(&"lunch".into()).unwrap();
/// assert_eq!(report.rows[0].total_quantity, 3000.0);
/// ```
#[derive(Debug)]
pub struct Engine<C = MemoryCatalog, L = MemoryLedger> {
    catalog: C,
    ledger: L,
    converter: Converter,
    options: AggregateOptions,
    locks: InstanceLocks,
    cache: ReportCache,
}

impl<C: Catalog, L: LedgerStore> Engine<C, L> {
    /// New engine with the default [`Converter`] and [`AggregateOptions`]
    pub fn new(catalog: C, ledger: L) -> Self {
        Self {
            catalog,
            ledger,
            converter: Converter::default(),
            options: AggregateOptions::default(),
            locks: InstanceLocks::new(),
            cache: ReportCache::new(),
        }
    }

    /// Set the converter used for unit checks, conversion and display
    pub fn with_converter(mut self, converter: Converter) -> Self {
        self.converter = converter;
        self.cache.clear();
        self
    }

    /// Set the default report options
    pub fn with_options(mut self, options: AggregateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    pub fn options(&self) -> &AggregateOptions {
        &self.options
    }

    /// Resolved ingredient lines of a dish instance
    pub fn resolve(&self, key: &InstanceKey) -> Result<Vec<ResolvedIngredientLine>, Error> {
        Ok(self.ingredient_table(key)?.lines)
    }

    /// Resolved ingredient table of a dish instance, with completion
    pub fn ingredient_table(&self, key: &InstanceKey) -> Result<IngredientTable, Error> {
        resolve(&self.catalog, &self.ledger, key)
    }

    /// Add an ingredient to a dish instance
    ///
    /// See [`DishLedger::add`].
    #[tracing::instrument(level = "debug", skip_all, fields(instance = %key, ingredient = %ingredient, quantity = quantity, user = %caller.user_id))]
    pub fn add(
        &self,
        key: &InstanceKey,
        ingredient: &IngredientId,
        quantity: f64,
        caller: &CallerContext,
    ) -> Result<IngredientOverride, Error> {
        self.catalog.require_ingredient(ingredient)?;
        self.write(key, |ledger, dish| {
            ledger.add(dish, ingredient, quantity, caller)?;
            row(ledger, ingredient)
        })
    }

    /// Set the custom quantity of an ingredient of a dish instance
    ///
    /// See [`DishLedger::modify`].
    #[tracing::instrument(level = "debug", skip_all, fields(instance = %key, ingredient = %ingredient, quantity = quantity, user = %caller.user_id))]
    pub fn modify(
        &self,
        key: &InstanceKey,
        ingredient: &IngredientId,
        quantity: f64,
        caller: &CallerContext,
    ) -> Result<IngredientOverride, Error> {
        self.catalog.require_ingredient(ingredient)?;
        self.write(key, |ledger, dish| {
            ledger.modify(dish, ingredient, quantity, caller)?;
            row(ledger, ingredient)
        })
    }

    /// Remove an ingredient from a dish instance
    ///
    /// See [`DishLedger::remove`].
    #[tracing::instrument(level = "debug", skip_all, fields(instance = %key, ingredient = %ingredient, user = %caller.user_id))]
    pub fn remove(
        &self,
        key: &InstanceKey,
        ingredient: &IngredientId,
        caller: &CallerContext,
    ) -> Result<IngredientOverride, Error> {
        self.write(key, |ledger, dish| {
            ledger.remove(dish, ingredient, caller)?;
            row(ledger, ingredient)
        })
    }

    /// Rescale a dish instance from one of its main ingredients
    ///
    /// The whole batch is committed at once. See
    /// [`rescale_from_anchor`](crate::rescale::rescale_from_anchor).
    #[tracing::instrument(level = "debug", skip_all, fields(instance = %key, anchor = %anchor, quantity = quantity, user = %caller.user_id))]
    pub fn rescale_from_anchor(
        &self,
        key: &InstanceKey,
        anchor: &IngredientId,
        quantity: f64,
        caller: &CallerContext,
    ) -> Result<Vec<IngredientOverride>, Error> {
        self.write(key, |ledger, dish| {
            rescale_from_anchor(ledger, dish, anchor, quantity, caller)
        })
    }

    /// Report of one event with the engine options
    pub fn aggregate_event(&self, event: &EventId) -> Result<Arc<Report>, Error> {
        self.aggregate_event_with(event, &self.options)
    }

    pub fn aggregate_event_with(
        &self,
        event: &EventId,
        options: &AggregateOptions,
    ) -> Result<Arc<Report>, Error> {
        let event = self.catalog.require_event(event)?;
        self.report(ReportScope::Event(event.id.clone()), &[event], options)
    }

    /// Report of every event of every occasion of a booking with the engine
    /// options
    pub fn aggregate_booking(&self, booking: &BookingId) -> Result<Arc<Report>, Error> {
        self.aggregate_booking_with(booking, &self.options)
    }

    pub fn aggregate_booking_with(
        &self,
        booking: &BookingId,
        options: &AggregateOptions,
    ) -> Result<Arc<Report>, Error> {
        let events = self.catalog.booking_events(booking)?;
        self.report(ReportScope::Booking(booking.clone()), &events, options)
    }

    /// Highest ledger watermark of the dish instances of some events
    ///
    /// Any commit to one of the instances makes it grow.
    pub fn scope_watermark(&self, events: &[Arc<Event>]) -> u64 {
        events
            .iter()
            .flat_map(|e| e.instances())
            .map(|key| self.ledger.instance_watermark(&key))
            .max()
            .unwrap_or(0)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(scope = %scope))]
    fn report(
        &self,
        scope: ReportScope,
        events: &[Arc<Event>],
        options: &AggregateOptions,
    ) -> Result<Arc<Report>, Error> {
        let watermark = self.scope_watermark(events);
        if let Some(report) = self.cache.get(&scope, options, watermark) {
            return Ok(report);
        }

        // an event listed in two occasions is still cooked once
        let keys: IndexSet<InstanceKey> = events.iter().flat_map(|e| e.instances()).collect();
        let tables = keys
            .iter()
            .map(|key| resolve(&self.catalog, &self.ledger, key))
            .collect::<Result<Vec<_>, _>>()?;

        let report = aggregate(
            &self.catalog,
            &self.converter,
            options,
            scope,
            watermark,
            &tables,
        )?;
        Ok(self.cache.insert(options, report))
    }

    /// Run a ledger transition under the instance lock and commit it if it
    /// changed anything
    fn write<T>(
        &self,
        key: &InstanceKey,
        f: impl FnOnce(&mut DishLedger, &Dish) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let dish = self.instance_dish(key)?;
        let _guard = self.locks.lock(key);
        let mut ledger = self.ledger.load(key)?;
        let before = ledger.clone();
        let out = f(&mut ledger, &dish)?;
        if ledger != before {
            self.ledger.commit(&ledger)?;
        } else {
            tracing::debug!("nothing to commit");
        }
        Ok(out)
    }

    fn instance_dish(&self, key: &InstanceKey) -> Result<Arc<Dish>, Error> {
        let event = self.catalog.require_event(&key.event)?;
        if !event.menu.contains(&key.dish) {
            return Err(Error::NotOnMenu {
                instance: key.clone(),
            });
        }
        self.catalog.require_dish(&key.dish)
    }
}

fn row(ledger: &DishLedger, ingredient: &IngredientId) -> Result<IngredientOverride, Error> {
    ledger
        .get(ingredient)
        .cloned()
        .ok_or_else(|| Error::NotInInstance {
            instance: ledger.key().clone(),
            ingredient: ingredient.clone(),
        })
}
