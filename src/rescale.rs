//! Proportional rescaling from an anchor ingredient
//!
//! Setting a new quantity for a main ingredient recomputes every other
//! recipe ingredient of the dish instance with the same ratio, so the dish
//! keeps its recipe proportions. Ad-hoc and removed ingredients are left as
//! they are.

use crate::{
    error::{AnchorProblem, Error},
    ledger::{DishLedger, IngredientOverride},
    model::{CallerContext, Dish, IngredientId},
};

/// Rescale the recipe ingredients of `ledger` from `anchor`
///
/// All the changes are applied to `ledger` or none of them is. The ledger
/// still has to be committed as one batch. Returns the written rows, the
/// siblings in recipe order and the anchor last.
///
/// Fails with [`Error::InvalidAnchor`] if `anchor` is not a main ingredient
/// of the base recipe, was removed from the instance or has a zero base
/// quantity.
#[tracing::instrument(level = "debug", skip_all, fields(instance = %ledger.key(), anchor = %anchor, quantity = new_quantity))]
pub fn rescale_from_anchor(
    ledger: &mut DishLedger,
    dish: &Dish,
    anchor: &IngredientId,
    new_quantity: f64,
    caller: &CallerContext,
) -> Result<Vec<IngredientOverride>, Error> {
    let invalid = |reason| Error::InvalidAnchor {
        instance: ledger.key().clone(),
        ingredient: anchor.clone(),
        reason,
    };

    let Some((_, entry)) = dish.recipe_entry(anchor) else {
        return Err(invalid(AnchorProblem::NotInRecipe));
    };
    if !entry.is_main {
        return Err(invalid(AnchorProblem::NotMain));
    }
    if ledger.is_removed(anchor) {
        return Err(invalid(AnchorProblem::Removed));
    }
    if entry.quantity == 0.0 {
        return Err(invalid(AnchorProblem::ZeroBaseQuantity));
    }
    if !(new_quantity.is_finite() && new_quantity >= 0.0) {
        return Err(Error::InvalidQuantity {
            ingredient: anchor.clone(),
            quantity: new_quantity,
            reason: "must not be negative",
        });
    }

    let ratio = new_quantity / entry.quantity;
    let mut next = ledger.clone();
    let mut touched = Vec::with_capacity(dish.ingredients.len());
    for sibling in &dish.ingredients {
        if &sibling.ingredient == anchor || next.is_removed(&sibling.ingredient) {
            continue;
        }
        next.modify(dish, &sibling.ingredient, ratio * sibling.quantity, caller)?;
        touched.push(&sibling.ingredient);
    }
    next.modify(dish, anchor, new_quantity, caller)?;
    touched.push(anchor);

    let batch = touched
        .into_iter()
        .filter_map(|id| next.get(id).cloned())
        .collect::<Vec<_>>();
    tracing::debug!(ratio, rows = batch.len(), "rescaled");
    *ledger = next;
    Ok(batch)
}
