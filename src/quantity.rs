//! Quantity model

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::convert::{ConvertError, Converter};

/// A numeric amount in a unit
///
/// The unit is kept as written in the catalog or recipe. Whether two units
/// are the same is decided with a [`Converter`], so `kg` and `kilograms`
/// match, but `kg` and `g` do not.
///
/// The [`Display`] implementation rounds to 3 decimal places.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
}

impl Quantity {
    /// Creates a new quantity
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }

    /// Checks if two quantities can be added without converting
    pub fn compatible_unit(
        &self,
        rhs: &Self,
        converter: &Converter,
    ) -> Result<(), IncompatibleUnits> {
        if converter.same_unit(&self.unit, &rhs.unit) {
            Ok(())
        } else {
            Err(IncompatibleUnits::DifferentUnits {
                a: self.unit.clone(),
                b: rhs.unit.clone(),
            })
        }
    }

    /// Try adding two quantities
    ///
    /// This never converts. Quantities in different units are an error, even
    /// if they measure the same physical quantity.
    pub fn try_add(&self, rhs: &Self, converter: &Converter) -> Result<Self, IncompatibleUnits> {
        self.compatible_unit(rhs, converter)?;
        Ok(Quantity {
            value: self.value + rhs.value,
            unit: self.unit.clone(), // unit is mantained
        })
    }

    /// Converts the quantity to another unit
    pub fn convert_to(&self, unit: &str, converter: &Converter) -> Result<Self, ConvertError> {
        if self.unit == unit {
            return Ok(self.clone());
        }
        let value = converter.convert(self.value, &self.unit, unit)?;
        Ok(Quantity::new(value, unit))
    }

    /// Converts the unit to the best possible match in the same unit system.
    ///
    /// For example, `2500 g` would be converted to `2.5 kg`. Unknown units
    /// are left untouched.
    pub fn fit(&mut self, converter: &Converter) -> Result<(), ConvertError> {
        if converter.find_unit(&self.unit).is_none() {
            return Ok(());
        }
        let (value, unit) = converter.convert_to_best(self.value, &self.unit, None)?;
        self.value = value;
        self.unit = unit.symbol().to_string();
        Ok(())
    }
}

impl Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", round3(self.value))?;
        if !self.unit.is_empty() {
            write!(f, " {}", self.unit)?;
        }
        Ok(())
    }
}

/// Round to 3 decimal places, the precision shown to users
pub fn round3(n: f64) -> f64 {
    (n * 1000.0).round() / 1000.0
}

/// Error during adding of quantities
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QuantityAddError {
    #[error(transparent)]
    IncompatibleUnits(#[from] IncompatibleUnits),

    #[error(transparent)]
    Convert(#[from] ConvertError),
}

/// Error that makes quantity units incompatible to be added
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IncompatibleUnits {
    #[error("Units differ: '{a}' '{b}'")]
    DifferentUnits { a: String, b: String },

    #[error("Quantity is in '{unit}' but the ingredient is priced per '{price_unit}'")]
    PriceUnit { unit: String, price_unit: String },
}
