//! Dual-output supply control.
//!
//! Output 1 powers the device under test. Output 2 simulates the NTC.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SweepError};
use crate::instrument::InstrumentConnection;

fn default_protection_level() -> f64 {
    4.0
}

fn default_rail_voltage() -> f64 {
    3.8
}

/// Fixed levels applied during initialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupplySettings {
    /// Overvoltage protection ceiling for output 1, in volts.
    #[serde(default = "default_protection_level")]
    pub protection_level: f64,
    /// Output 1 voltage powering the device under test.
    #[serde(default = "default_rail_voltage")]
    pub rail_voltage: f64,
}

impl Default for SupplySettings {
    fn default() -> Self {
        Self {
            protection_level: default_protection_level(),
            rail_voltage: default_rail_voltage(),
        }
    }
}

/// Owns the instrument session and sequences every command sent to it.
#[derive(Debug)]
pub struct SourceController<C: InstrumentConnection> {
    connection: C,
    settings: SupplySettings,
}

impl<C: InstrumentConnection> SourceController<C> {
    /// Binds the controller to `connection`. Fails without sending anything
    /// if the connection has no open session.
    pub fn new(connection: C, settings: SupplySettings) -> Result<Self> {
        if !connection.is_connected() {
            return Err(SweepError::UnboundConnection(
                connection.resource().to_owned(),
            ));
        }
        Ok(Self {
            connection,
            settings,
        })
    }

    /// Brings the supply to a known state with output 2 at `initial_voltage`.
    ///
    /// Protection and decoupling are set up before either output is enabled,
    /// and both levels are programmed before output 1 powers the device.
    pub fn initialize(&mut self, initial_voltage: f64) -> Result<()> {
        info!(
            resource = %self.connection.resource(),
            initial_voltage,
            "initializing supply"
        );

        // reset
        self.send("*rst; status:preset; *cls")?;
        // outputs are set independently
        self.send("instrument:couple:output:state none")?;
        self.send(&format!(
            "voltage:protection:level {};state on",
            self.settings.protection_level
        ))?;
        self.send(&format!("voltage1 {}", self.settings.rail_voltage))?;
        self.set_voltage(initial_voltage)?;
        self.send("output1 on")?;
        self.send("output2 on")?;
        self.send("display on")?;
        self.send("display:channel 2")?;
        Ok(())
    }

    /// Sets the simulated NTC voltage on output 2.
    pub fn set_voltage(&mut self, voltage: f64) -> Result<()> {
        self.send(&format!("voltage2 {:.3}", voltage))
    }

    pub fn settings(&self) -> &SupplySettings {
        &self.settings
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Releases the session.
    pub fn into_connection(self) -> C {
        self.connection
    }

    fn send(&mut self, command: &str) -> Result<()> {
        self.connection.send(command)?;
        Ok(())
    }
}
