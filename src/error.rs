//! Error types shared by every stage of a temperature sweep.

use thiserror::Error;

use crate::formula::FormulaError;
use crate::instrument::InstrumentError;

pub type Result<T> = std::result::Result<T, SweepError>;

// Every variant is fatal for the current run. Nothing in the library retries.
#[derive(Debug, Error)]
pub enum SweepError {
    /// The sweep reached a temperature the calibration table does not cover.
    #[error("temperature {0} is not present in the NTC table")]
    MissingTemperature(i32),
    /// Temperatures and resistances were not supplied pairwise.
    #[error("NTC table has {temperatures} temperatures but {resistances} resistances")]
    TableLengthMismatch {
        temperatures: usize,
        resistances: usize,
    },
    /// A temperature appeared twice while duplicates were being rejected.
    #[error("temperature {0} appears more than once in the NTC table")]
    DuplicateTemperature(i32),
    /// The inter-step delay is negative or not a number.
    #[error("step delay must be a finite, non-negative number of seconds (got {0})")]
    InvalidDelay(f64),
    /// The circuit formula failed to parse or evaluate.
    #[error("circuit formula: {0}")]
    Formula(#[from] FormulaError),
    /// The connection handed to the controller has no live session behind it.
    #[error("instrument connection '{0}' is not bound to an open session")]
    UnboundConnection(String),
    /// Sending a command to the instrument failed.
    #[error("instrument: {0}")]
    Instrument(#[from] InstrumentError),
    /// Reading the operator's confirmation failed.
    #[error("operator console: {0}")]
    Console(#[from] std::io::Error),
}
