//! Unit & price catalog and recipe store
//!
//! The engine only reads from a [`Catalog`]. [`MemoryCatalog`] is the bundled
//! implementation. It can be built in code with a [`CatalogBuilder`] or
//! loaded from a TOML [`CatalogFile`]:
//!
//! ```toml
//! [[ingredient_type]]
//! id = "dairy"
//! name = "Dairy"
//!
//! [[ingredient]]
//! id = "paneer"
//! name = "Paneer"
//! unit = "g"
//! price = 0.4
//! supplier = "Amul"
//! type = "dairy"
//!
//! [[dish]]
//! id = "pbm"
//! name = "Paneer Butter Masala"
//! serves = 100
//! ingredients = [{ ingredient = "paneer", quantity = 5000, main = true }]
//!
//! [[event]]
//! id = "lunch"
//! guests = 50
//! menu = ["pbm"]
//!
//! [[occasion]]
//! id = "wedding"
//! events = ["lunch"]
//!
//! [[booking]]
//! id = "b-42"
//! occasions = ["wedding"]
//! ```

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    error::{EntityKind, Error},
    model::{
        Booking, BookingId, Dish, DishId, Event, EventId, Ingredient, IngredientId,
        IngredientType, IngredientTypeId, Occasion, OccasionId, RecipeIngredient,
    },
};

/// Read access to catalog and booking records
///
/// Implementations must be cheap to query: the resolver asks for the same
/// dish and ingredients many times while building a report.
pub trait Catalog: Send + Sync {
    fn ingredient(&self, id: &IngredientId) -> Option<Arc<Ingredient>>;
    fn ingredient_type(&self, id: &IngredientTypeId) -> Option<Arc<IngredientType>>;
    fn dish(&self, id: &DishId) -> Option<Arc<Dish>>;
    fn event(&self, id: &EventId) -> Option<Arc<Event>>;
    fn occasion(&self, id: &OccasionId) -> Option<Arc<Occasion>>;
    fn booking(&self, id: &BookingId) -> Option<Arc<Booking>>;

    fn require_ingredient(&self, id: &IngredientId) -> Result<Arc<Ingredient>, Error> {
        self.ingredient(id)
            .ok_or_else(|| Error::not_found(EntityKind::Ingredient, id))
    }

    fn require_dish(&self, id: &DishId) -> Result<Arc<Dish>, Error> {
        self.dish(id)
            .ok_or_else(|| Error::not_found(EntityKind::Dish, id))
    }

    fn require_event(&self, id: &EventId) -> Result<Arc<Event>, Error> {
        self.event(id)
            .ok_or_else(|| Error::not_found(EntityKind::Event, id))
    }

    /// All the events of a booking, in occasion order
    fn booking_events(&self, id: &BookingId) -> Result<Vec<Arc<Event>>, Error> {
        let booking = self
            .booking(id)
            .ok_or_else(|| Error::not_found(EntityKind::Booking, id))?;
        let mut events = Vec::new();
        for occasion_id in &booking.occasions {
            let occasion = self
                .occasion(occasion_id)
                .ok_or_else(|| Error::not_found(EntityKind::Occasion, occasion_id))?;
            for event_id in &occasion.events {
                events.push(self.require_event(event_id)?);
            }
        }
        Ok(events)
    }
}

impl<C: Catalog + ?Sized> Catalog for Arc<C> {
    fn ingredient(&self, id: &IngredientId) -> Option<Arc<Ingredient>> {
        (**self).ingredient(id)
    }

    fn ingredient_type(&self, id: &IngredientTypeId) -> Option<Arc<IngredientType>> {
        (**self).ingredient_type(id)
    }

    fn dish(&self, id: &DishId) -> Option<Arc<Dish>> {
        (**self).dish(id)
    }

    fn event(&self, id: &EventId) -> Option<Arc<Event>> {
        (**self).event(id)
    }

    fn occasion(&self, id: &OccasionId) -> Option<Arc<Occasion>> {
        (**self).occasion(id)
    }

    fn booking(&self, id: &BookingId) -> Option<Arc<Booking>> {
        (**self).booking(id)
    }
}

/// In memory [`Catalog`]
///
/// All references are checked when built, so lookups of ids coming from
/// another record of the same catalog never fail.
#[derive(Debug, Default, Clone)]
pub struct MemoryCatalog {
    ingredients: HashMap<IngredientId, Arc<Ingredient>>,
    ingredient_types: HashMap<IngredientTypeId, Arc<IngredientType>>,
    dishes: HashMap<DishId, Arc<Dish>>,
    events: HashMap<EventId, Arc<Event>>,
    occasions: HashMap<OccasionId, Arc<Occasion>>,
    bookings: HashMap<BookingId, Arc<Booking>>,
}

impl MemoryCatalog {
    /// Start to create a new [`MemoryCatalog`]
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Parse and build a catalog from the TOML [`CatalogFile`] format
    pub fn from_toml_str(input: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(input)?;
        Self::from_file(file)
    }

    /// Build a catalog from a deserialized [`CatalogFile`]
    ///
    /// Recipe entries without a unit take the unit of their ingredient.
    pub fn from_file(file: CatalogFile) -> Result<Self, CatalogError> {
        let mut builder = CatalogBuilder::default();
        for t in file.ingredient_types {
            builder.add_ingredient_type(t)?;
        }
        for i in file.ingredients {
            builder.add_ingredient(i)?;
        }
        for d in file.dishes {
            let ingredients = d
                .ingredients
                .into_iter()
                .map(|e| {
                    let unit = match e.unit {
                        Some(unit) => unit,
                        None => builder
                            .ingredients
                            .get(&e.ingredient)
                            .map(|i| i.unit.clone())
                            .ok_or_else(|| CatalogError::UnknownReference {
                                kind: EntityKind::Dish,
                                id: d.id.to_string(),
                                target: EntityKind::Ingredient,
                                target_id: e.ingredient.to_string(),
                            })?,
                    };
                    Ok(RecipeIngredient {
                        ingredient: e.ingredient,
                        quantity: e.quantity,
                        unit,
                        is_main: e.is_main,
                    })
                })
                .collect::<Result<Vec<_>, CatalogError>>()?;
            builder.add_dish(Dish {
                id: d.id,
                name: d.name,
                base_serving_people: d.base_serving_people,
                ingredients,
            })?;
        }
        for e in file.events {
            builder.add_event(e)?;
        }
        for o in file.occasions {
            builder.add_occasion(o)?;
        }
        for b in file.bookings {
            builder.add_booking(b)?;
        }
        builder.finish()
    }

    /// Iterate over all dishes, in no particular order
    pub fn dishes(&self) -> impl Iterator<Item = &Dish> {
        self.dishes.values().map(|d| d.as_ref())
    }

    /// Iterate over all events, in no particular order
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.values().map(|e| e.as_ref())
    }
}

impl Catalog for MemoryCatalog {
    fn ingredient(&self, id: &IngredientId) -> Option<Arc<Ingredient>> {
        self.ingredients.get(id).cloned()
    }

    fn ingredient_type(&self, id: &IngredientTypeId) -> Option<Arc<IngredientType>> {
        self.ingredient_types.get(id).cloned()
    }

    fn dish(&self, id: &DishId) -> Option<Arc<Dish>> {
        self.dishes.get(id).cloned()
    }

    fn event(&self, id: &EventId) -> Option<Arc<Event>> {
        self.events.get(id).cloned()
    }

    fn occasion(&self, id: &OccasionId) -> Option<Arc<Occasion>> {
        self.occasions.get(id).cloned()
    }

    fn booking(&self, id: &BookingId) -> Option<Arc<Booking>> {
        self.bookings.get(id).cloned()
    }
}

/// Builder to create a [`MemoryCatalog`]
///
/// Every record is validated on its own when added. References between
/// records are checked in [`CatalogBuilder::finish`], so records can be
/// added in any order.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    ingredients: HashMap<IngredientId, Arc<Ingredient>>,
    ingredient_types: HashMap<IngredientTypeId, Arc<IngredientType>>,
    dishes: HashMap<DishId, Arc<Dish>>,
    events: HashMap<EventId, Arc<Event>>,
    occasions: HashMap<OccasionId, Arc<Occasion>>,
    bookings: HashMap<BookingId, Arc<Booking>>,
}

macro_rules! insert_unique {
    ($map:expr, $kind:expr, $item:expr) => {{
        let item = $item;
        if $map.contains_key(&item.id) {
            return Err(CatalogError::Duplicate {
                kind: $kind,
                id: item.id.to_string(),
            });
        }
        $map.insert(item.id.clone(), Arc::new(item));
    }};
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_ingredient_type(
        &mut self,
        ingredient_type: IngredientType,
    ) -> Result<&mut Self, CatalogError> {
        insert_unique!(
            self.ingredient_types,
            EntityKind::IngredientType,
            ingredient_type
        );
        Ok(self)
    }

    /// Add an ingredient
    ///
    /// The ingredient type doesn't need to exist. Ingredients of unknown
    /// types are listed under `"other"` in reports.
    pub fn add_ingredient(&mut self, ingredient: Ingredient) -> Result<&mut Self, CatalogError> {
        if !(ingredient.price_per_unit.is_finite() && ingredient.price_per_unit >= 0.0) {
            return Err(CatalogError::InvalidIngredient {
                ingredient: ingredient.id,
                reason: "price must be a non negative number",
            });
        }
        if ingredient.unit.trim().is_empty() {
            return Err(CatalogError::InvalidIngredient {
                ingredient: ingredient.id,
                reason: "empty unit",
            });
        }
        insert_unique!(self.ingredients, EntityKind::Ingredient, ingredient);
        Ok(self)
    }

    pub fn add_dish(&mut self, dish: Dish) -> Result<&mut Self, CatalogError> {
        let invalid = |reason| CatalogError::InvalidDish {
            dish: dish.id.clone(),
            reason,
        };
        if dish.base_serving_people == 0 {
            return Err(invalid("base serving people must be greater than zero"));
        }
        if dish.main_ingredients().next().is_none() {
            return Err(invalid("at least one main ingredient is required"));
        }
        let mut seen = HashSet::with_capacity(dish.ingredients.len());
        for entry in &dish.ingredients {
            if !seen.insert(&entry.ingredient) {
                return Err(invalid("ingredient listed more than once"));
            }
            if !(entry.quantity.is_finite() && entry.quantity >= 0.0) {
                return Err(invalid("recipe quantities must be non negative numbers"));
            }
        }
        insert_unique!(self.dishes, EntityKind::Dish, dish);
        Ok(self)
    }

    pub fn add_event(&mut self, event: Event) -> Result<&mut Self, CatalogError> {
        if event.guest_count == 0 {
            return Err(CatalogError::InvalidEvent {
                event: event.id,
                reason: "guest count must be greater than zero",
            });
        }
        let mut seen = HashSet::with_capacity(event.menu.len());
        if !event.menu.iter().all(|d| seen.insert(d)) {
            return Err(CatalogError::InvalidEvent {
                event: event.id,
                reason: "dish listed more than once in the menu",
            });
        }
        insert_unique!(self.events, EntityKind::Event, event);
        Ok(self)
    }

    pub fn add_occasion(&mut self, occasion: Occasion) -> Result<&mut Self, CatalogError> {
        insert_unique!(self.occasions, EntityKind::Occasion, occasion);
        Ok(self)
    }

    pub fn add_booking(&mut self, booking: Booking) -> Result<&mut Self, CatalogError> {
        insert_unique!(self.bookings, EntityKind::Booking, booking);
        Ok(self)
    }

    /// Check all references and return the [`MemoryCatalog`]
    pub fn finish(self) -> Result<MemoryCatalog, CatalogError> {
        fn check<'a, T: 'a>(
            kind: EntityKind,
            id: &impl ToString,
            refs: impl IntoIterator<Item = &'a T>,
            target: EntityKind,
            exists: impl Fn(&T) -> bool,
        ) -> Result<(), CatalogError>
        where
            T: ToString,
        {
            for r in refs {
                if !exists(r) {
                    return Err(CatalogError::UnknownReference {
                        kind,
                        id: id.to_string(),
                        target,
                        target_id: r.to_string(),
                    });
                }
            }
            Ok(())
        }

        for dish in self.dishes.values() {
            check(
                EntityKind::Dish,
                &dish.id,
                dish.ingredients.iter().map(|e| &e.ingredient),
                EntityKind::Ingredient,
                |i| self.ingredients.contains_key(i),
            )?;
        }
        for event in self.events.values() {
            check(
                EntityKind::Event,
                &event.id,
                &event.menu,
                EntityKind::Dish,
                |d| self.dishes.contains_key(d),
            )?;
        }
        for occasion in self.occasions.values() {
            check(
                EntityKind::Occasion,
                &occasion.id,
                &occasion.events,
                EntityKind::Event,
                |e| self.events.contains_key(e),
            )?;
        }
        for booking in self.bookings.values() {
            check(
                EntityKind::Booking,
                &booking.id,
                &booking.occasions,
                EntityKind::Occasion,
                |o| self.occasions.contains_key(o),
            )?;
        }

        tracing::debug!(
            ingredients = self.ingredients.len(),
            dishes = self.dishes.len(),
            events = self.events.len(),
            "catalog built"
        );

        Ok(MemoryCatalog {
            ingredients: self.ingredients,
            ingredient_types: self.ingredient_types,
            dishes: self.dishes,
            events: self.events,
            occasions: self.occasions,
            bookings: self.bookings,
        })
    }
}

/// Catalog file format
///
/// This structure is designed for deserializing [TOML](https://toml.io/en/),
/// but you can try other formats supported by serde. See the
/// [module documentation](self) for an example.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct CatalogFile {
    #[serde(default, rename = "ingredient_type")]
    pub ingredient_types: Vec<IngredientType>,
    #[serde(default, rename = "ingredient")]
    pub ingredients: Vec<Ingredient>,
    #[serde(default, rename = "dish")]
    pub dishes: Vec<DishEntry>,
    #[serde(default, rename = "event")]
    pub events: Vec<Event>,
    #[serde(default, rename = "occasion")]
    pub occasions: Vec<Occasion>,
    #[serde(default, rename = "booking")]
    pub bookings: Vec<Booking>,
}

/// A dish in a [`CatalogFile`]
#[derive(Debug, Deserialize, Clone)]
pub struct DishEntry {
    pub id: DishId,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "serves")]
    pub base_serving_people: u32,
    pub ingredients: Vec<RecipeEntry>,
}

/// A recipe entry in a [`CatalogFile`]
#[derive(Debug, Deserialize, Clone)]
pub struct RecipeEntry {
    pub ingredient: IngredientId,
    pub quantity: f64,
    /// Defaults to the catalog unit of the ingredient
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, alias = "main")]
    pub is_main: bool,
}

/// Errors building a catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Duplicate {kind} id: '{id}'")]
    Duplicate { kind: EntityKind, id: String },

    #[error("{kind} '{id}' references unknown {target} '{target_id}'")]
    UnknownReference {
        kind: EntityKind,
        id: String,
        target: EntityKind,
        target_id: String,
    },

    #[error("Invalid ingredient '{ingredient}': {reason}")]
    InvalidIngredient {
        ingredient: IngredientId,
        reason: &'static str,
    },

    #[error("Invalid dish '{dish}': {reason}")]
    InvalidDish { dish: DishId, reason: &'static str },

    #[error("Invalid event '{event}': {reason}")]
    InvalidEvent { event: EventId, reason: &'static str },

    #[error("Error parsing catalog file: {0}")]
    Parse(#[from] toml::de::Error),
}
