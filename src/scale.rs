//! Support for recipe scaling
//!
//! A base recipe is authored for [`Dish::base_serving_people`]. A dish
//! instance scales it linearly to the guest count of its event.

use serde::{Deserialize, Serialize};

use crate::{error::Error, model::Dish};

/// Configures the scaling target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleTarget {
    guests: u32,
    base_servings: u32,
}

impl ScaleTarget {
    /// Creates a new [`ScaleTarget`] to serve `guests` with `dish`.
    ///
    /// Fails with [`Error::InvalidRecipe`] if the dish serves nobody. A built
    /// catalog never holds such a dish.
    pub fn for_dish(dish: &Dish, guests: u32) -> Result<Self, Error> {
        if dish.base_serving_people == 0 {
            return Err(Error::InvalidRecipe {
                dish: dish.id.clone(),
                reason: "base serving people is zero",
            });
        }
        Ok(Self {
            guests,
            base_servings: dish.base_serving_people,
        })
    }

    /// Get the calculated scaling factor
    pub fn factor(&self) -> f64 {
        self.guests as f64 / self.base_servings as f64
    }

    pub fn guests(&self) -> u32 {
        self.guests
    }

    /// Scale a base recipe quantity
    ///
    /// Computed as `base * guests / base_servings`.
    pub fn scale(&self, base_quantity: f64) -> f64 {
        base_quantity * self.guests as f64 / self.base_servings as f64
    }
}
