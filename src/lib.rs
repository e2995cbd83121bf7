//! # NTC Temperature Sweep Library
//!
//! This library drives a dual-output power supply so that output 2 presents
//! the voltage an NTC thermistor circuit would produce at a given temperature,
//! while output 1 powers the device under test. A run initializes the supply,
//! ramps the simulated temperature from an initial to a final value and back,
//! and holds each step for a configured delay.
//!
//! The pieces, leaves first:
//!
//! - [`ResistanceTable`]: calibration points, temperature to resistance.
//! - [`VoltageFormula`]: the circuit expression, resistance to voltage.
//! - [`InstrumentConnection`]: anything that can send a command string.
//! - [`SourceController`]: owns the connection and sequences supply commands.
//! - [`RampSequencer`]: walks the temperature range and applies each step.

pub mod config;
pub mod controller;
pub mod error;
pub mod formula;
pub mod instrument;
pub mod logging;
pub mod sequencer;
pub mod table;

pub use config::{NtcPoint, SweepConfig};
pub use controller::{SourceController, SupplySettings};
pub use error::{Result, SweepError};
pub use formula::{FormulaError, VoltageFormula};
pub use instrument::{
    available_instruments, InstrumentConnection, InstrumentError, LoopbackInstrument,
    SerialInstrument, SerialSettings,
};
pub use sequencer::{
    Direction, Pause, RampSequencer, RunParameters, SweepReport, SweepState, SweepStep,
    ThreadSleep,
};
pub use table::{DuplicatePolicy, ResistanceTable};
