//! Error type and utilities.

use thiserror::Error;

use crate::{
    catalog::CatalogError,
    model::{DishId, IngredientId, InstanceKey},
    quantity::QuantityAddError,
};

/// General engine error type
///
/// None of these are transient. Only [`Error::Conflict`] is worth retrying,
/// after re-reading the dish instance. See [`Error::is_retryable`].
#[derive(Debug, Error)]
pub enum Error {
    /// An unknown catalog or booking reference
    #[error("{kind} not found: '{id}'")]
    NotFound { kind: EntityKind, id: String },

    /// The dish is not on the menu of the event
    #[error("Dish '{}' is not on the menu of event '{}'", .instance.dish, .instance.event)]
    NotOnMenu { instance: InstanceKey },

    /// The ingredient is not present in the dish instance, either because it
    /// was never part of it or because it was removed
    #[error("Ingredient '{ingredient}' is not present in dish instance {instance}")]
    NotInInstance {
        instance: InstanceKey,
        ingredient: IngredientId,
    },

    #[error("Invalid quantity {quantity} for ingredient '{ingredient}': {reason}")]
    InvalidQuantity {
        ingredient: IngredientId,
        quantity: f64,
        reason: &'static str,
    },

    #[error("Ingredient '{ingredient}' cannot anchor a rescale of {instance}: {reason}")]
    InvalidAnchor {
        instance: InstanceKey,
        ingredient: IngredientId,
        reason: AnchorProblem,
    },

    #[error("Ingredient '{ingredient}' is already present in dish instance {instance}")]
    AlreadyExists {
        instance: InstanceKey,
        ingredient: IngredientId,
    },

    #[error("Unit mismatch for ingredient '{ingredient}'")]
    UnitMismatch {
        ingredient: IngredientId,
        #[source]
        source: QuantityAddError,
    },

    #[error("Concurrent modification of {instance}: expected version {expected}, found {found}")]
    Conflict {
        instance: InstanceKey,
        expected: u64,
        found: u64,
    },

    #[error("Invalid recipe for dish '{dish}': {reason}")]
    InvalidRecipe { dish: DishId, reason: &'static str },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Fieldless classification of an [`Error`]
///
/// Meant for callers that map errors to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidQuantity,
    InvalidAnchor,
    AlreadyExists,
    UnitMismatch,
    Conflict,
    InvalidRecipe,
    Config,
}

/// Kind of entity an [`Error::NotFound`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum EntityKind {
    Ingredient,
    #[strum(serialize = "Ingredient type")]
    IngredientType,
    Dish,
    Event,
    Occasion,
    Booking,
}

/// Why an ingredient cannot drive a proportional rescale
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum AnchorProblem {
    #[strum(serialize = "not part of the base recipe")]
    NotInRecipe,
    #[strum(serialize = "not a main ingredient")]
    NotMain,
    #[strum(serialize = "removed from this dish instance")]
    Removed,
    #[strum(serialize = "base quantity is zero")]
    ZeroBaseQuantity,
}

impl Error {
    pub(crate) fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } | Error::NotOnMenu { .. } | Error::NotInInstance { .. } => {
                ErrorKind::NotFound
            }
            Error::InvalidQuantity { .. } => ErrorKind::InvalidQuantity,
            Error::InvalidAnchor { .. } => ErrorKind::InvalidAnchor,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::UnitMismatch { .. } => ErrorKind::UnitMismatch,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::InvalidRecipe { .. } => ErrorKind::InvalidRecipe,
            Error::Catalog(_) => ErrorKind::Config,
        }
    }

    /// Check if the caller may re-read the dish instance and try again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}
