use std::sync::Arc;

use enum_map::{enum_map, EnumMap};
use thiserror::Error;

use super::{
    convert_f64,
    units_file::{BestUnits, Extend, Precedence, UnitEntry, Units, UnitsFile},
    BestConversions, BestConversionsStore, Converter, PhysicalQuantity, System, Unit, UnitIndex,
    UnknownUnit,
};

/// Builder to create a custom [`Converter`]
///
/// The builder uses [`UnitsFile`] to configure the converter. More than one
/// file can be layered. Order matters, as one file can extend the units of
/// another added before, or be overwritten by others after.
#[derive(Debug, Default)]
pub struct ConverterBuilder {
    all_units: Vec<Unit>,
    unit_index: UnitIndex,
    extend: Vec<Extend>,
    best_units: EnumMap<PhysicalQuantity, Option<BestUnits>>,
    default_system: System,
}

impl ConverterBuilder {
    /// New empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the bundled units to the builder
    ///
    /// This is only available with the `bundled_units` feature.
    #[cfg(feature = "bundled_units")]
    pub fn with_bundled_units(mut self) -> Result<Self, ConverterBuilderError> {
        self.add_units_file(UnitsFile::bundled())?;
        Ok(self)
    }

    /// Add a [`UnitsFile`] to the builder
    pub fn with_units_file(mut self, units: UnitsFile) -> Result<Self, ConverterBuilderError> {
        self.add_units_file(units)?;
        Ok(self)
    }

    /// Add a [`UnitsFile`] to the builder
    pub fn add_units_file(&mut self, units: UnitsFile) -> Result<&mut Self, ConverterBuilderError> {
        for group in units.quantity {
            let mut add_units =
                |units: Vec<UnitEntry>, system| -> Result<(), ConverterBuilderError> {
                    for entry in units {
                        if !(entry.ratio.is_finite() && entry.ratio > 0.0) {
                            return Err(ConverterBuilderError::InvalidRatio {
                                ratio: entry.ratio,
                                quantity: group.quantity,
                            });
                        }
                        let unit = Unit {
                            names: entry.names,
                            symbols: entry.symbols,
                            aliases: entry.aliases,
                            ratio: entry.ratio,
                            physical_quantity: group.quantity,
                            system,
                        };
                        self.add_unit(unit)?;
                    }
                    Ok(())
                };
            if let Some(units) = group.units {
                match units {
                    Units::Unified(units) => add_units(units, None)?,
                    Units::BySystem {
                        metric,
                        imperial,
                        unspecified,
                    } => {
                        add_units(metric, Some(System::Metric))?;
                        add_units(imperial, Some(System::Imperial))?;
                        add_units(unspecified, None)?;
                    }
                };
            }

            // best units always override previous layers
            if let Some(best_units) = group.best {
                if match &best_units {
                    BestUnits::Unified(v) => v.is_empty(),
                    BestUnits::BySystem { metric, imperial } => {
                        metric.is_empty() || imperial.is_empty()
                    }
                } {
                    return Err(ConverterBuilderError::EmptyBest {
                        reason: "empty list of units",
                        quantity: group.quantity,
                    });
                }
                self.best_units[group.quantity] = Some(best_units);
            }
        }

        // extensions are applied at the end
        if let Some(extend) = units.extend {
            self.extend.push(extend);
        }

        if let Some(default_system) = units.default_system {
            self.default_system = default_system;
        }

        Ok(self)
    }

    /// Consume the builder and return the new [`Converter`]
    pub fn finish(mut self) -> Result<Converter, ConverterBuilderError> {
        apply_extend_groups(self.extend, &mut self.all_units, &mut self.unit_index)?;

        let best = enum_map! {
            q => {
                if let Some(best_units) = &self.best_units[q] {
                    BestConversionsStore::new(best_units, &self.unit_index, &self.all_units)?
                } else {
                    return Err(ConverterBuilderError::EmptyBest { reason: "no best units given", quantity: q })
                }
            }
        };

        Ok(Converter {
            all_units: self.all_units.into_iter().map(Arc::new).collect(),
            unit_index: self.unit_index,
            best,
            default_system: self.default_system,
        })
    }

    fn add_unit(&mut self, unit: Unit) -> Result<usize, ConverterBuilderError> {
        let id = self.all_units.len();
        self.unit_index.add_unit(&unit, id)?;
        self.all_units.push(unit);
        Ok(id)
    }
}

impl BestConversionsStore {
    fn new(
        best_units: &BestUnits,
        unit_index: &UnitIndex,
        all_units: &[Unit],
    ) -> Result<Self, ConverterBuilderError> {
        let v = match best_units {
            BestUnits::Unified(names) => {
                Self::Unified(BestConversions::new(names, unit_index, all_units)?)
            }
            BestUnits::BySystem { metric, imperial } => Self::BySystem {
                metric: BestConversions::new(metric, unit_index, all_units)?,
                imperial: BestConversions::new(imperial, unit_index, all_units)?,
            },
        };
        Ok(v)
    }
}

impl BestConversions {
    fn new(
        units: &[String],
        unit_index: &UnitIndex,
        all_units: &[Unit],
    ) -> Result<Self, ConverterBuilderError> {
        let mut units = units
            .iter()
            .map(|n| unit_index.get_unit_id(n))
            .collect::<Result<Vec<_>, _>>()?;

        units.sort_by(|a, b| {
            all_units[*a]
                .ratio
                .partial_cmp(&all_units[*b].ratio)
                .unwrap_or(std::cmp::Ordering::Less)
        });

        let mut units = units.into_iter();
        let Some(base_unit) = units.next() else {
            return Ok(Self::default());
        };

        let mut conversions = vec![(1.0, base_unit)];
        for unit in units {
            let v = convert_f64(1.0, &all_units[unit], &all_units[base_unit]);
            conversions.push((v, unit));
        }

        Ok(Self(conversions))
    }
}

fn apply_extend_groups(
    extend: Vec<Extend>,
    all_units: &mut [Unit],
    unit_index: &mut UnitIndex,
) -> Result<(), ConverterBuilderError> {
    for extend_group in extend {
        let Extend { precedence, units } = extend_group;

        let mut to_update = Vec::with_capacity(units.len());

        // resolve every key against the current index first
        for (k, entry) in units {
            let id = unit_index.get_unit_id(k.as_str())?;
            if to_update.iter().any(|&(eid, _)| eid == id) {
                return Err(ConverterBuilderError::DuplicateExtendUnit { key: k });
            }
            to_update.push((id, entry));
        }

        for (id, entry) in to_update {
            unit_index.remove_unit(&all_units[id]);
            let unit = &mut all_units[id];

            if let Some(ratio) = entry.ratio {
                unit.ratio = ratio;
            }
            if let Some(names) = entry.names {
                join_alias_vec(&mut unit.names, names, precedence);
            }
            if let Some(symbols) = entry.symbols {
                join_alias_vec(&mut unit.symbols, symbols, precedence);
            }
            if let Some(aliases) = entry.aliases {
                join_alias_vec(&mut unit.aliases, aliases, precedence);
            }

            unit_index.add_unit(&all_units[id], id)?;
        }
    }
    Ok(())
}

fn join_alias_vec(target: &mut Vec<Arc<str>>, mut src: Vec<Arc<str>>, src_precedence: Precedence) {
    match src_precedence {
        Precedence::Before => {
            src.append(target);
            *target = src;
        }
        Precedence::After => {
            target.append(&mut src);
        }
        Precedence::Override => {
            *target = src;
        }
    }
}

impl UnitIndex {
    fn remove_unit(&mut self, unit: &Unit) {
        for key in unit.all_keys() {
            self.0.remove(key);
        }
    }

    fn add_unit(&mut self, unit: &Unit, id: usize) -> Result<usize, ConverterBuilderError> {
        let mut added = 0;
        for key in unit.all_keys() {
            if key.trim().is_empty() {
                return Err(ConverterBuilderError::EmptyUnitKey {
                    quantity: unit.physical_quantity,
                });
            }
            if self.0.insert(Arc::clone(key), id).is_some() {
                return Err(ConverterBuilderError::DuplicateUnit {
                    name: key.to_string(),
                });
            }
            added += 1;
        }
        if added == 0 {
            return Err(ConverterBuilderError::EmptyUnit {
                quantity: unit.physical_quantity,
            });
        }
        Ok(added)
    }
}

/// Errors generated by [`ConverterBuilder`]
#[derive(Debug, Error)]
pub enum ConverterBuilderError {
    #[error("Duplicate unit: {name}")]
    DuplicateUnit { name: String },

    #[error("Duplicate unit in extend, another key points to the same unit: {key}")]
    DuplicateExtendUnit { key: String },

    #[error(transparent)]
    UnknownUnit(#[from] UnknownUnit),

    #[error("Unit without names or symbols in {quantity}")]
    EmptyUnit { quantity: PhysicalQuantity },

    #[error("Unit where a name, symbol or alias is empty in {quantity}")]
    EmptyUnitKey { quantity: PhysicalQuantity },

    #[error("Unit ratio must be a positive number in {quantity}, found {ratio}")]
    InvalidRatio {
        ratio: f64,
        quantity: PhysicalQuantity,
    },

    #[error("Best units for '{quantity}' empty: {reason}")]
    EmptyBest {
        reason: &'static str,
        quantity: PhysicalQuantity,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(input: &str) -> UnitsFile {
        UnitsFile::from_toml_str(input).unwrap()
    }

    const MINIMAL: &str = r#"
        [[quantity]]
        quantity = "mass"
        best = ["g", "kg"]
        [[quantity.units]]
        names = ["gram"]
        symbols = ["g"]
        ratio = 1.0
        [[quantity.units]]
        names = ["kilogram"]
        symbols = ["kg"]
        ratio = 1000.0

        [[quantity]]
        quantity = "volume"
        best = ["l"]
        [[quantity.units]]
        names = ["litre"]
        symbols = ["l"]
        ratio = 1.0

        [[quantity]]
        quantity = "count"
        best = ["pc"]
        [[quantity.units]]
        names = ["piece"]
        symbols = ["pc"]
        ratio = 1.0
    "#;

    #[test]
    fn missing_best_units() {
        let err = ConverterBuilder::new()
            .with_units_file(file(
                r#"
                [[quantity]]
                quantity = "mass"
                best = ["g"]
                [[quantity.units]]
                names = ["gram"]
                symbols = ["g"]
                ratio = 1.0
                "#,
            ))
            .unwrap()
            .finish()
            .unwrap_err();
        assert!(matches!(err, ConverterBuilderError::EmptyBest { .. }));
    }

    #[test]
    fn duplicate_unit() {
        let err = ConverterBuilder::new()
            .with_units_file(file(MINIMAL))
            .unwrap()
            .with_units_file(file(
                r#"
                [[quantity]]
                quantity = "mass"
                [[quantity.units]]
                names = ["gramme"]
                symbols = ["g"]
                ratio = 1.0
                "#,
            ))
            .unwrap_err();
        assert!(matches!(err, ConverterBuilderError::DuplicateUnit { name } if name == "g"));
    }

    #[test]
    fn extend_layer_adds_alias() {
        let converter = ConverterBuilder::new()
            .with_units_file(file(MINIMAL))
            .unwrap()
            .with_units_file(file(
                r#"
                [extend.units.kg]
                aliases = ["kilo"]
                "#,
            ))
            .unwrap()
            .finish()
            .unwrap();
        let kilo = converter.find_unit("kilo").unwrap();
        assert_eq!(kilo.symbol(), "kg");
        assert_eq!(converter.unit_count(), 4);
    }

    #[test]
    fn rejects_zero_ratio() {
        let err = ConverterBuilder::new()
            .with_units_file(file(
                r#"
                [[quantity]]
                quantity = "mass"
                [[quantity.units]]
                names = ["nothing"]
                symbols = ["n"]
                ratio = 0.0
                "#,
            ))
            .unwrap_err();
        assert!(matches!(err, ConverterBuilderError::InvalidRatio { .. }));
    }
}
