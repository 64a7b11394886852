//! Support for **configurable** unit conversion
//!
//! Ingredient prices are quoted per catalog unit, while recipes may be
//! authored in any unit of the same physical quantity. The [`Converter`]
//! holds the known units and performs:
//! - Conversions between units of the same [`PhysicalQuantity`]
//! - Conversions to the best fit possible for display (`2500 g` → `2.5 kg`)

use std::{collections::HashMap, sync::Arc};

use enum_map::EnumMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use builder::{ConverterBuilder, ConverterBuilderError};
pub use units_file::UnitsFile;

mod builder;
pub mod units_file;

/// Main struct to perform conversions
///
/// This holds information about all the known units and how to convert them.
///
/// To create one use a [`ConverterBuilder`].
///
/// [`Converter::default`] changes with the feature `bundled_units`:
/// - When enabled, [`Converter::bundled`].
/// - When disabled, [`Converter::empty`].
#[derive(Debug, Clone)]
pub struct Converter {
    all_units: Vec<Arc<Unit>>,
    unit_index: UnitIndex,
    best: EnumMap<PhysicalQuantity, BestConversionsStore>,
    default_system: System,
}

impl Converter {
    /// Empty converter
    ///
    /// Every unit is unknown to it, so every conversion fails. Useful to
    /// aggregate with [`UnitPolicy::Strict`](crate::aggregate::UnitPolicy)
    /// and no display fitting.
    pub fn empty() -> Self {
        Self {
            all_units: Default::default(),
            unit_index: Default::default(),
            best: Default::default(),
            default_system: Default::default(),
        }
    }

    /// Converter with the bundled units
    ///
    /// These are the metric and imperial mass and volume units plus counts
    /// (pieces, dozens) most kitchens buy in.
    ///
    /// This is only available when the `bundled_units` feature is enabled.
    #[cfg(feature = "bundled_units")]
    pub fn bundled() -> Self {
        static BUNDLED: once_cell::sync::Lazy<Converter> = once_cell::sync::Lazy::new(|| {
            ConverterBuilder::new()
                .with_bundled_units()
                .and_then(ConverterBuilder::finish)
                .unwrap_or_else(|e| panic!("bundled units are invalid: {e}"))
        });
        BUNDLED.clone()
    }

    /// Get the total number of known units.
    ///
    /// This is **not** all the known unit names, just **different units**.
    pub fn unit_count(&self) -> usize {
        self.all_units.len()
    }

    /// Find a unit by any of it's names, symbols or aliases
    pub fn find_unit(&self, unit: &str) -> Option<Arc<Unit>> {
        let uid = self.unit_index.get_unit_id(unit).ok()?;
        Some(Arc::clone(&self.all_units[uid]))
    }

    /// Check if two unit texts name the same unit
    ///
    /// Unknown units are only the same if the text is equal.
    pub fn same_unit(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        match (self.unit_index.get_unit_id(a), self.unit_index.get_unit_id(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Convert a value from one unit to another
    ///
    /// Both units have to be known and of the same [`PhysicalQuantity`].
    #[tracing::instrument(level = "trace", skip(self), ret)]
    pub fn convert(&self, value: f64, from: &str, to: &str) -> Result<f64, ConvertError> {
        let from = self.get_unit(from)?;
        let to = self.get_unit(to)?;
        if from.physical_quantity != to.physical_quantity {
            return Err(ConvertError::MixedQuantities {
                from: from.physical_quantity,
                to: to.physical_quantity,
            });
        }
        Ok(self.convert_f64(value, from, to))
    }

    /// Convert a value to the best unit of a system
    ///
    /// If `system` is [`None`], the system of the unit is used, or
    /// the [default](Self::default_system) if the unit has none.
    pub fn convert_to_best(
        &self,
        value: f64,
        unit: &str,
        system: Option<System>,
    ) -> Result<(f64, Arc<Unit>), ConvertError> {
        let unit = self.get_unit(unit)?;
        let system = system.or(unit.system).unwrap_or(self.default_system);
        let conversions = self.best[unit.physical_quantity].conversions(system);

        let best_unit = conversions.best_unit(self, value, unit).ok_or({
            ConvertError::BestUnitNotFound {
                physical_quantity: unit.physical_quantity,
                system: unit.system,
            }
        })?;
        let converted = self.convert_f64(value, unit, best_unit.as_ref());

        Ok((converted, best_unit))
    }

    fn convert_f64(&self, value: f64, from: &Unit, to: &Unit) -> f64 {
        if std::ptr::eq(from, to) {
            return value;
        }
        convert_f64(value, from, to)
    }

    pub(crate) fn get_unit(&self, key: &str) -> Result<&Arc<Unit>, UnknownUnit> {
        let id = self.unit_index.get_unit_id(key)?;
        Ok(&self.all_units[id])
    }
}

#[cfg(not(feature = "bundled_units"))]
impl Default for Converter {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(feature = "bundled_units")]
impl Default for Converter {
    fn default() -> Self {
        Self::bundled()
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct UnitIndex(HashMap<Arc<str>, usize>);

impl UnitIndex {
    fn get_unit_id(&self, key: &str) -> Result<usize, UnknownUnit> {
        self.0
            .get(key)
            .copied()
            .ok_or_else(|| UnknownUnit(key.to_string()))
    }
}

/// A unit
///
/// Conversion to the base unit of the quantity is `val * [Self::ratio]`.
///
/// It implements [Display](std::fmt::Display). It will use [`Self::symbol`] or,
/// if alternate (`#`) is given, it will try the first name.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Unit {
    /// All the names that may be used to format the unit
    pub names: Vec<Arc<str>>,
    /// All the symbols (abbreviations), like `kg` for `kilograms`
    pub symbols: Vec<Arc<str>>,
    /// Custom aliases to parse the unit from a different string
    pub aliases: Vec<Arc<str>>,
    /// Conversion ratio
    pub ratio: f64,
    /// The [`PhysicalQuantity`] this unit belongs to
    pub physical_quantity: PhysicalQuantity,
    /// The unit [System] this unit belongs to, if any
    pub system: Option<System>,
}

impl Unit {
    fn all_keys(&self) -> impl Iterator<Item = &Arc<str>> {
        self.names.iter().chain(&self.symbols).chain(&self.aliases)
    }

    /// Get the symbol that represent this unit. The process is:
    /// - First symbol (if any)
    /// - Or first name (if any)
    /// - Or first alias
    ///
    /// The builder refuses units without any of them.
    pub fn symbol(&self) -> &str {
        self.symbols
            .first()
            .or_else(|| self.names.first())
            .or_else(|| self.aliases.first())
            .map(|s| &**s)
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if f.alternate() && !self.names.is_empty() {
            write!(f, "{}", self.names[0])
        } else {
            write!(f, "{}", self.symbol())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum BestConversionsStore {
    Unified(BestConversions),
    BySystem {
        metric: BestConversions,
        imperial: BestConversions,
    },
}

impl BestConversionsStore {
    fn conversions(&self, system: System) -> &BestConversions {
        match self {
            BestConversionsStore::Unified(u) => u,
            BestConversionsStore::BySystem { metric, imperial } => match system {
                System::Metric => metric,
                System::Imperial => imperial,
            },
        }
    }
}

impl Default for BestConversionsStore {
    fn default() -> Self {
        Self::Unified(Default::default())
    }
}

/// Thresholds (in the smallest best unit) and unit ids, sorted by ratio
#[derive(Debug, Clone, Default, PartialEq)]
struct BestConversions(Vec<(f64, usize)>);

impl BestConversions {
    fn base(&self) -> Option<usize> {
        self.0.first().map(|c| c.1)
    }

    fn best_unit(&self, converter: &Converter, value: f64, unit: &Unit) -> Option<Arc<Unit>> {
        let base_unit_id = self.base()?;
        let base_unit = &converter.all_units[base_unit_id];
        let norm = converter.convert_f64(value.abs(), unit, base_unit);

        let best_id = self
            .0
            .iter()
            .rev()
            .find(|(th, _)| norm >= (th - 0.001))
            .or_else(|| self.0.first())
            .map(|&(_, id)| id)?;
        Some(Arc::clone(&converter.all_units[best_id]))
    }

}

/// Kind of magnitude a unit measures
///
/// Only units of the same quantity can be converted into each other.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Deserialize,
    Serialize,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
    enum_map::Enum,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum PhysicalQuantity {
    Mass,
    Volume,
    Count,
}

pub(crate) fn convert_f64(value: f64, from: &Unit, to: &Unit) -> f64 {
    debug_assert_eq!(from.physical_quantity, to.physical_quantity);
    value * from.ratio / to.ratio
}

/// Error when try to convert an unknown unit
#[derive(Debug, Error, Clone, PartialEq)]
#[error("Unknown unit: '{0}'")]
pub struct UnknownUnit(pub String);

/// Unit system
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Deserialize,
    Serialize,
    Default,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    enum_map::Enum,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum System {
    #[default]
    Metric,
    Imperial,
}

/// Errors from converting
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConvertError {
    #[error("Mixed physical quantities: {from} {to}")]
    MixedQuantities {
        from: PhysicalQuantity,
        to: PhysicalQuantity,
    },

    #[error("Could not find best unit for a {physical_quantity} unit. System: {system:?}")]
    BestUnitNotFound {
        physical_quantity: PhysicalQuantity,
        system: Option<System>,
    },

    #[error(transparent)]
    UnknownUnit(#[from] UnknownUnit),
}
