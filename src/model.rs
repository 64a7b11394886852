//! Catering data model
//!
//! Catalog entities ([`Ingredient`], [`IngredientType`], [`Dish`]) and the
//! booking structure ([`Booking`] → [`Occasion`] → [`Event`]) are read-only
//! inputs. The only mutable state lives in the [`ledger`](crate::ledger).

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(id: impl Into<Arc<str>>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

id_type!(
    /// Identifies an [`Ingredient`] in the catalog
    IngredientId
);
id_type!(
    /// Identifies an [`IngredientType`]
    IngredientTypeId
);
id_type!(
    /// Identifies a [`Dish`]
    DishId
);
id_type!(
    /// Identifies an [`Event`]
    EventId
);
id_type!(OccasionId);
id_type!(BookingId);

/// Purchasable ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: IngredientId,
    /// Display name
    pub name: String,
    /// Unit the price is quoted in
    pub unit: String,
    /// Price of one [`Self::unit`]
    #[serde(alias = "price")]
    pub price_per_unit: f64,
    pub supplier: Option<String>,
    #[serde(alias = "type")]
    pub ingredient_type: IngredientTypeId,
}

/// Grouping used for purchase lists, like "Dairy" or "Spices"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientType {
    pub id: IngredientTypeId,
    pub name: String,
}

/// An entry of a dish base recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeIngredient {
    pub ingredient: IngredientId,
    /// Quantity for [`Dish::base_serving_people`]
    pub quantity: f64,
    pub unit: String,
    /// Main ingredients anchor proportional rescaling
    pub is_main: bool,
}

/// A dish and its base recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dish {
    pub id: DishId,
    pub name: String,
    /// Number of people the base recipe serves. Always > 0 in a built catalog.
    pub base_serving_people: u32,
    /// Recipe entries in authoring order. Ingredient ids are unique.
    pub ingredients: Vec<RecipeIngredient>,
}

impl Dish {
    /// Find an ingredient in the base recipe and its position
    pub fn recipe_entry(&self, ingredient: &IngredientId) -> Option<(usize, &RecipeIngredient)> {
        self.ingredients
            .iter()
            .enumerate()
            .find(|(_, e)| &e.ingredient == ingredient)
    }

    /// Check if the ingredient is part of the base recipe
    pub fn contains(&self, ingredient: &IngredientId) -> bool {
        self.recipe_entry(ingredient).is_some()
    }

    /// Iterate over the main (anchor) ingredients
    pub fn main_ingredients(&self) -> impl Iterator<Item = &RecipeIngredient> {
        self.ingredients.iter().filter(|e| e.is_main)
    }
}

/// A catered event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "guests")]
    pub guest_count: u32,
    /// Dishes served. Each one is a dish instance of this event.
    #[serde(default)]
    pub menu: Vec<DishId>,
}

impl Event {
    /// Iterate over the dish instances of the event
    pub fn instances(&self) -> impl Iterator<Item = InstanceKey> + '_ {
        self.menu
            .iter()
            .map(|dish| InstanceKey::new(self.id.clone(), dish.clone()))
    }
}

/// A group of events, like "Wedding day" with lunch and dinner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occasion {
    pub id: OccasionId,
    #[serde(default)]
    pub name: String,
    pub events: Vec<EventId>,
}

/// A customer booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    #[serde(default)]
    pub name: String,
    pub occasions: Vec<OccasionId>,
}

/// Identifies a dish instance: one dish on the menu of one event
///
/// This is the unit of resolution and of mutual exclusion for ledger writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    pub event: EventId,
    pub dish: DishId,
}

impl InstanceKey {
    pub fn new(event: impl Into<EventId>, dish: impl Into<DishId>) -> Self {
        Self {
            event: event.into(),
            dish: dish.into(),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.event, self.dish)
    }
}

/// Who is performing a mutation
///
/// Passed explicitly to every ledger write and recorded on the rows it
/// touches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerContext {
    pub user_id: String,
}

impl CallerContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_instances() {
        let event = Event {
            id: "e1".into(),
            name: "Lunch".into(),
            guest_count: 10,
            menu: vec!["dal".into(), "rice".into()],
        };
        let keys: Vec<_> = event.instances().map(|k| k.to_string()).collect();
        assert_eq!(keys, ["e1/dal", "e1/rice"]);
    }

    #[test]
    fn ids_serialize_transparent() {
        let id = IngredientId::new("paneer");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"paneer\"");
    }
}
