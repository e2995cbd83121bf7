//! NTC calibration table: temperature to resistance.

use std::collections::BTreeMap;

use tracing::warn;

use crate::error::{Result, SweepError};

/// Rounds a resistance to the 4 decimal places the table stores, ties to
/// even on the exact binary value.
pub fn round_resistance(resistance: f64) -> f64 {
    format!("{:.4}", resistance).parse().unwrap_or(resistance)
}

/// How repeated temperatures are treated while the table is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// The last occurrence wins.
    #[default]
    Overwrite,
    /// A repeated temperature is a configuration error.
    Reject,
}

/// Immutable mapping from integer temperature to resistance in ohms.
#[derive(Debug, Clone, PartialEq)]
pub struct ResistanceTable {
    points: BTreeMap<i32, f64>,
}

impl ResistanceTable {
    /// Pairs `temperatures` and `resistances` positionally. Later duplicates
    /// overwrite earlier ones.
    pub fn new(temperatures: &[i32], resistances: &[f64]) -> Result<Self> {
        Self::with_policy(temperatures, resistances, DuplicatePolicy::Overwrite)
    }

    /// Same as [`ResistanceTable::new`] with an explicit duplicate policy.
    pub fn with_policy(
        temperatures: &[i32],
        resistances: &[f64],
        policy: DuplicatePolicy,
    ) -> Result<Self> {
        if temperatures.len() != resistances.len() {
            return Err(SweepError::TableLengthMismatch {
                temperatures: temperatures.len(),
                resistances: resistances.len(),
            });
        }

        let mut points = BTreeMap::new();
        for (&temperature, &resistance) in temperatures.iter().zip(resistances) {
            let resistance = round_resistance(resistance);
            if let Some(previous) = points.insert(temperature, resistance) {
                match policy {
                    DuplicatePolicy::Reject => {
                        return Err(SweepError::DuplicateTemperature(temperature))
                    }
                    DuplicatePolicy::Overwrite => warn!(
                        temperature,
                        previous, resistance, "duplicate NTC temperature overwrites earlier entry"
                    ),
                }
            }
        }

        Ok(Self { points })
    }

    /// Looks up the resistance for `temperature`. An absent key is fatal.
    pub fn get_resistance(&self, temperature: i32) -> Result<f64> {
        self.points
            .get(&temperature)
            .copied()
            .ok_or(SweepError::MissingTemperature(temperature))
    }

    pub fn contains(&self, temperature: i32) -> bool {
        self.points.contains_key(&temperature)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Lowest and highest calibrated temperature, if any.
    pub fn span(&self) -> Option<(i32, i32)> {
        let low = self.points.keys().next()?;
        let high = self.points.keys().next_back()?;
        Some((*low, *high))
    }
}
