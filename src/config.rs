//! Sweep configuration file.
//!
//! The file is TOML. It carries the circuit formula, the step delay, the NTC
//! calibration points and the supply and serial settings. Loading validates
//! everything the core would otherwise only discover mid-run.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::controller::SupplySettings;
use crate::formula::VoltageFormula;
use crate::instrument::SerialSettings;
use crate::logging::LoggingConfig;
use crate::sequencer::RunParameters;
use crate::table::{DuplicatePolicy, ResistanceTable};

/// One calibration point of the NTC curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NtcPoint {
    pub temperature: i32,
    pub resistance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Resistance-to-voltage expression over `r`.
    pub circuit: String,
    /// Seconds to hold each step.
    pub delay: f64,
    #[serde(default)]
    pub reject_duplicate_temperatures: bool,
    #[serde(default)]
    pub supply: SupplySettings,
    #[serde(default)]
    pub instrument: SerialSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ntc: Vec<NtcPoint>,
}

impl SweepConfig {
    pub const ENV_CONFIG_PATH: &'static str = "NTC_SWEEP_CONFIG";
    pub const DEFAULT_CANDIDATES: [&'static str; 2] = ["ntc_sweep.toml", "config.toml"];

    /// Resolves the config path: explicit path, then `NTC_SWEEP_CONFIG`,
    /// then the first default candidate that exists.
    pub fn locate(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                return Ok(PathBuf::from(env_path));
            }
        }
        Self::DEFAULT_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists())
            .ok_or_else(|| {
                anyhow!(
                    "no configuration found; pass --config, set {} or create one of {:?}",
                    Self::ENV_CONFIG_PATH,
                    Self::DEFAULT_CANDIDATES
                )
            })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        let config = Self::from_toml_str(&raw)
            .with_context(|| format!("invalid configuration {}", path.display()))?;
        debug!(path = %path.display(), points = config.ntc.len(), "configuration loaded");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if Duration::try_from_secs_f64(self.delay).is_err() {
            bail!(
                "delay must be a finite, non-negative number of seconds (got {})",
                self.delay
            );
        }
        if self.ntc.is_empty() {
            bail!("at least one [[ntc]] calibration point is required");
        }
        if let Some(point) = self
            .ntc
            .iter()
            .find(|p| !p.resistance.is_finite() || p.resistance <= 0.0)
        {
            bail!(
                "resistance for temperature {} must be positive (got {})",
                point.temperature,
                point.resistance
            );
        }
        let supply = &self.supply;
        if !supply.protection_level.is_finite() || supply.protection_level <= 0.0 {
            bail!(
                "supply protection_level must be a positive voltage (got {})",
                supply.protection_level
            );
        }
        if !supply.rail_voltage.is_finite() || supply.rail_voltage <= 0.0 {
            bail!(
                "supply rail_voltage must be a positive voltage (got {})",
                supply.rail_voltage
            );
        }
        // Output 1 would trip its own protection as soon as it is enabled.
        if supply.rail_voltage >= supply.protection_level {
            bail!(
                "supply rail_voltage {} must be below protection_level {}",
                supply.rail_voltage,
                supply.protection_level
            );
        }
        self.formula()?;
        Ok(())
    }

    pub fn formula(&self) -> Result<VoltageFormula> {
        VoltageFormula::parse(&self.circuit)
            .with_context(|| format!("invalid circuit formula '{}'", self.circuit))
    }

    pub fn table(&self) -> Result<ResistanceTable> {
        let policy = if self.reject_duplicate_temperatures {
            DuplicatePolicy::Reject
        } else {
            DuplicatePolicy::Overwrite
        };
        let temperatures: Vec<i32> = self.ntc.iter().map(|p| p.temperature).collect();
        let resistances: Vec<f64> = self.ntc.iter().map(|p| p.resistance).collect();
        Ok(ResistanceTable::with_policy(
            &temperatures,
            &resistances,
            policy,
        )?)
    }

    /// Run parameters for the operator's temperature bounds.
    pub fn run_parameters(
        &self,
        initial_temperature: i32,
        final_temperature: i32,
    ) -> Result<RunParameters> {
        Ok(RunParameters::new(
            initial_temperature,
            final_temperature,
            self.delay,
        )?)
    }
}
