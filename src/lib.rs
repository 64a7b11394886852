//! Recipe quantity scaling and ingredient aggregation for catering.
//!
//! A dish has a base recipe authored for a fixed number of people. Each
//! dish served at an event (a *dish instance*) scales that recipe to the
//! event guest count. Users then adjust single dish instances through an
//! override ledger: custom quantities, ad-hoc ingredients and removals.
//! Finally every dish instance of an event or a booking is aggregated into a
//! priced purchase report.
//!
//! Also includes:
//! - Proportional rescaling of a dish instance from one main ingredient.
//! - Unit conversion and display fitting, like `2500 g` to `2.5 kg`.
//! - A TOML catalog format for ingredients, dishes, events and bookings.
//!
//! # Basic usage
//! Load a [`MemoryCatalog`] and create an [`Engine`] with a ledger store.
//!
//! ```rust
//! # use portion::{Engine, MemoryCatalog, MemoryLedger, CallerContext, InstanceKey};
//! let catalog = MemoryCatalog::from_toml_str(r#"
//!     [[ingredient]]
//!     id = "paneer"
//!     name = "Paneer"
//!     unit = "g"
//!     price = 0.4
//!     type = "dairy"
//!
//!     [[ingredient]]
//!     id = "butter"
//!     name = "Butter"
//!     unit = "g"
//!     price = 0.6
//!     type = "dairy"
//!
//!     [[dish]]
//!     id = "pbm"
//!     name = "Paneer Butter Masala"
//!     serves = 100
//!     ingredients = [
//!         { ingredient = "paneer", quantity = 5000, main = true },
//!         { ingredient = "butter", quantity = 1000 },
//!     ]
//!
//!     [[event]]
//!     id = "lunch"
//!     guests = 50
//!     menu = ["pbm"]
//! "#)?;
//! let engine = Engine::new(catalog, MemoryLedger::new());
//! let key = InstanceKey::new("lunch", "pbm");
//!
//! // 5000 g for 100 people is 2500 g for 50
//! let table = engine.ingredient_table(&key)?;
//! assert_eq!(table.lines[0].scaled_quantity, 2500.0);
//!
//! // set paneer to 3000 g and keep the recipe proportions
//! let chef = CallerContext::new("chef");
//! engine.rescale_from_anchor(&key, &"paneer".into(), 3000.0, &chef)?;
//! let table = engine.ingredient_table(&key)?;
//! assert_eq!(table.lines[1].effective_quantity, 600.0);
//! assert!(table.complete);
//!
//! let report = engine.aggregate_event(&"lunch".into())?;
//! assert_eq!(report.summary.grand_total_cost, 3000.0 * 0.4 + 600.0 * 0.6);
//! # Ok::<(), portion::Error>(())
//! ```

#![warn(rustdoc::broken_intra_doc_links, clippy::doc_markdown)]

#[cfg(doc)]
pub mod _features {
    //! This lib has 1 feature, enabled by default:
    //! - `bundled_units`. Includes a units file with the mass, volume and
    //!   count units most kitchens buy in. The default
    //!   [`Converter`](crate::convert::Converter) uses them if this feature
    //!   is enabled.
}

pub mod aggregate;
pub mod catalog;
pub mod convert;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod model;
pub mod quantity;
pub mod rescale;
pub mod resolve;
pub mod scale;

pub use aggregate::{AggregateOptions, Report, ReportScope, UnitPolicy};
pub use catalog::{Catalog, CatalogBuilder, MemoryCatalog};
pub use convert::Converter;
pub use engine::Engine;
pub use error::{Error, ErrorKind};
pub use ledger::{IngredientOverride, LedgerStore, MemoryLedger, OverrideState};
pub use model::*;
pub use quantity::Quantity;
pub use resolve::{IngredientTable, ResolvedIngredientLine};
