//! Configuration data structures used in [`ConverterBuilder`](super::ConverterBuilder)

use serde::Deserialize;
use std::{collections::HashMap, fmt::Debug, sync::Arc};

use super::{PhysicalQuantity, System};

/// Units configuration consumed by [`ConverterBuilder`](super::ConverterBuilder)
///
/// This structure is designed for deserializing [TOML](https://toml.io/en/),
/// but you can try other formats supported by serde.
///
/// ```toml
/// default_system = "metric"
///
/// [[quantity]]
/// quantity = "mass"
/// best = ["g", "kg"]
///
/// [[quantity.units]]
/// names = ["gram", "grams"]
/// symbols = ["g"]
/// ratio = 1
/// ```
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UnitsFile {
    /// Set the default system
    ///
    /// Used when a unit doesn't belong to any system and the converter has to
    /// pick display units for it.
    pub default_system: Option<System>,
    /// Extend and/or edit units from other layers before
    pub extend: Option<Extend>,
    /// Declare new units
    #[serde(default)]
    pub quantity: Vec<QuantityGroup>,
}

impl UnitsFile {
    /// Parse a units file from TOML text
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }
}

/// Extend units from other layers config used in [`UnitsFile`]
///
/// The maps's keys are any name, symbol or alias of the unit you want to extend.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Extend {
    /// Precedence when joining to other layers
    pub precedence: Precedence,
    /// Map for units to edit
    pub units: HashMap<String, ExtendUnitEntry>,
}

/// Precedence when joining a list to other layers
///
/// The first symbol is the one that will be used for formatting, so this
/// matters.
#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Precedence {
    /// The list will be added before the current ones (*higher priority*)
    #[default]
    Before,
    /// The list will be added after the current ones (*lower priority*)
    After,
    /// The list will replace the current ones
    Override,
}

/// Editable unit
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ExtendUnitEntry {
    pub ratio: Option<f64>,
    #[serde(alias = "name")]
    pub names: Option<Vec<Arc<str>>>,
    #[serde(alias = "symbol")]
    pub symbols: Option<Vec<Arc<str>>>,
    #[serde(alias = "alias")]
    pub aliases: Option<Vec<Arc<str>>>,
}

/// Configuration of a group of units belonging to a [`PhysicalQuantity`]
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct QuantityGroup {
    /// Quantity of the group
    ///
    /// All units in this struct will be belong to this quantity
    pub quantity: PhysicalQuantity,
    /// List of best units
    ///
    /// At least one [`QuantityGroup`] of each quantity in any [`UnitsFile`]
    /// of a converter has to define it and not be empty.
    ///
    /// **This will always replace the configuration from [`UnitsFile`] before**
    #[serde(default)]
    pub best: Option<BestUnits>,
    /// Definition of units
    #[serde(default)]
    pub units: Option<Units>,
}

/// List of best units
///
/// The *best* units are the ones a purchase list may pick to display a
/// total. `2500 g` is shown as `2.5 kg` when both are best units.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged, deny_unknown_fields)]
pub enum BestUnits {
    /// List without system information
    Unified(Vec<String>),
    /// A list per system
    BySystem {
        metric: Vec<String>,
        imperial: Vec<String>,
    },
}

/// New units
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged, deny_unknown_fields)]
pub enum Units {
    /// List without [`System`] information
    Unified(Vec<UnitEntry>),
    /// A list per [`System`] or uspecified
    BySystem {
        #[serde(default)]
        metric: Vec<UnitEntry>,
        #[serde(default)]
        imperial: Vec<UnitEntry>,
        #[serde(default)]
        unspecified: Vec<UnitEntry>,
    },
}

/// A new unit
///
/// Conversions will be `val * [Self::ratio]` to the base of the quantity.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UnitEntry {
    /// Names. For example: `grams`
    #[serde(alias = "name")]
    pub names: Vec<Arc<str>>,
    /// Symbols. For example: `g`
    #[serde(alias = "symbol")]
    pub symbols: Vec<Arc<str>>,
    /// Whatever other way you want to call the unit.
    #[serde(default, alias = "alias")]
    pub aliases: Vec<Arc<str>>,
    /// Conversion ratio.
    ///
    /// All units of a [`PhysicalQuantity`] have to be configured carefuly so
    /// ratios match. If `gram` has a ratio of `1`, `kilogram` will have a
    /// ratio of `1000`.
    pub ratio: f64,
}

#[cfg(feature = "bundled_units")]
const BUNDLED_UNITS: &str = include_str!("../../units.toml");

#[cfg(feature = "bundled_units")]
impl UnitsFile {
    /// Get the bundled units file
    ///
    /// This is only available with the `bundled_units` feature.
    pub fn bundled() -> Self {
        static BUNDLED: once_cell::sync::Lazy<UnitsFile> = once_cell::sync::Lazy::new(|| {
            UnitsFile::from_toml_str(BUNDLED_UNITS).unwrap_or_else(|e| {
                panic!("bundled units.toml is invalid: {e}");
            })
        });
        BUNDLED.clone()
    }
}

#[cfg(all(test, feature = "bundled_units"))]
mod tests {
    use super::*;

    #[test]
    fn bundled_parses() {
        let units = UnitsFile::bundled();
        assert_eq!(units.default_system, Some(System::Metric));
        let quantities: Vec<_> = units.quantity.iter().map(|g| g.quantity).collect();
        assert!(quantities.contains(&PhysicalQuantity::Mass));
        assert!(quantities.contains(&PhysicalQuantity::Volume));
        assert!(quantities.contains(&PhysicalQuantity::Count));
    }

    #[test]
    fn extend_section() {
        let input = r#"
            [extend]
            precedence = "after"
            [extend.units.kg]
            aliases = ["kilo"]
        "#;
        let units = UnitsFile::from_toml_str(input).unwrap();
        let extend = units.extend.unwrap();
        assert_eq!(extend.precedence, Precedence::After);
        assert_eq!(
            extend.units["kg"].aliases.as_deref(),
            Some(&[Arc::from("kilo")][..])
        );
    }
}
