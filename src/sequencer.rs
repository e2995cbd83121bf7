//! Temperature ramp sequencing.
//!
//! A test is a round trip: initialize the supply at the starting
//! temperature, wait for the operator, ramp to the final temperature and
//! ramp back. Each step looks up the resistance, converts it to a voltage,
//! applies it on the simulated NTC output and then blocks for the step delay.

use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::controller::SourceController;
use crate::error::{Result, SweepError};
use crate::formula::VoltageFormula;
use crate::instrument::InstrumentConnection;
use crate::table::ResistanceTable;

/// Blocking wait between ramp steps.
pub trait Pause {
    fn pause(&mut self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Pause for ThreadSleep {
    fn pause(&mut self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rising,
    Falling,
}

impl Direction {
    /// Rising only when `initial` is strictly below `last`.
    pub fn between(initial: i32, last: i32) -> Self {
        if initial < last {
            Direction::Rising
        } else {
            Direction::Falling
        }
    }

    pub fn step(self) -> i64 {
        match self {
            Direction::Rising => 1,
            Direction::Falling => -1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rising => f.write_str("rising"),
            Direction::Falling => f.write_str("falling"),
        }
    }
}

/// Every integer temperature from `initial` to `last`, both inclusive.
pub fn temperatures(initial: i32, last: i32) -> impl Iterator<Item = i32> {
    let step = Direction::between(initial, last).step();
    let count = (i64::from(last) - i64::from(initial)).unsigned_abs() + 1;
    // Stays within [initial, last], so the narrowing is lossless.
    (0..count).map(move |k| (i64::from(initial) + step * k as i64) as i32)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SweepState {
    #[default]
    Idle,
    RampingForward,
    RampingReverse,
}

/// Per-run inputs: the operator's temperature bounds and the step delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunParameters {
    pub initial_temperature: i32,
    pub final_temperature: i32,
    pub delay: Duration,
}

impl RunParameters {
    /// Builds run parameters from a delay in seconds.
    pub fn new(initial_temperature: i32, final_temperature: i32, delay_secs: f64) -> Result<Self> {
        if !delay_secs.is_finite() || delay_secs < 0.0 {
            return Err(SweepError::InvalidDelay(delay_secs));
        }
        let delay =
            Duration::try_from_secs_f64(delay_secs).map_err(|_| SweepError::InvalidDelay(delay_secs))?;
        Ok(Self {
            initial_temperature,
            final_temperature,
            delay,
        })
    }
}

/// One applied ramp step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepStep {
    pub temperature: i32,
    pub resistance: f64,
    pub voltage: f64,
    pub direction: Direction,
    /// Sequencer state while the step was applied.
    pub phase: SweepState,
}

/// Steps applied during a round trip, outbound then return.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub forward: Vec<SweepStep>,
    pub reverse: Vec<SweepStep>,
}

impl SweepReport {
    pub fn steps(&self) -> impl Iterator<Item = &SweepStep> {
        self.forward.iter().chain(self.reverse.iter())
    }

    pub fn len(&self) -> usize {
        self.forward.len() + self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lowest and highest voltage applied.
    pub fn voltage_range(&self) -> Option<(f64, f64)> {
        self.steps().map(|s| s.voltage).fold(None, |range, v| match range {
            None => Some((v, v)),
            Some((low, high)) => Some((low.min(v), high.max(v))),
        })
    }
}

pub struct RampSequencer<'a, C: InstrumentConnection, P: Pause = ThreadSleep> {
    table: &'a ResistanceTable,
    formula: &'a VoltageFormula,
    source: SourceController<C>,
    pause: P,
    state: SweepState,
}

impl<'a, C: InstrumentConnection> RampSequencer<'a, C> {
    pub fn new(
        table: &'a ResistanceTable,
        formula: &'a VoltageFormula,
        source: SourceController<C>,
    ) -> Self {
        Self {
            table,
            formula,
            source,
            pause: ThreadSleep,
            state: SweepState::Idle,
        }
    }
}

impl<'a, C: InstrumentConnection, P: Pause> RampSequencer<'a, C, P> {
    /// Replaces the step delay implementation.
    pub fn with_pause<Q: Pause>(self, pause: Q) -> RampSequencer<'a, C, Q> {
        RampSequencer {
            table: self.table,
            formula: self.formula,
            source: self.source,
            pause,
            state: self.state,
        }
    }

    /// Resistance and output voltage for `temperature`.
    pub fn resolve(&self, temperature: i32) -> Result<(f64, f64)> {
        let resistance = self.table.get_resistance(temperature)?;
        let voltage = self.formula.evaluate(resistance)?;
        Ok((resistance, voltage))
    }

    /// Initializes the supply with the voltage for `initial_temperature`.
    /// Returns the voltage applied.
    pub fn initialize(&mut self, initial_temperature: i32) -> Result<f64> {
        let (_, voltage) = self.resolve(initial_temperature)?;
        self.source.initialize(voltage)?;
        Ok(voltage)
    }

    /// Ramps from `initial_temperature` to `final_temperature`, applying each
    /// step and waiting `delay` after it.
    ///
    /// This is a single outbound pass: the state is `RampingForward` whichever
    /// way the temperature moves. Only the return leg of a round trip runs as
    /// `RampingReverse`.
    pub fn run_sweep(
        &mut self,
        initial_temperature: i32,
        final_temperature: i32,
        delay: Duration,
    ) -> Result<Vec<SweepStep>> {
        self.state = SweepState::RampingForward;
        let steps = self.ramp(initial_temperature, final_temperature, delay);
        self.state = SweepState::Idle;
        steps
    }

    /// Ramps out to the final temperature and back again.
    pub fn run_round_trip(&mut self, params: &RunParameters) -> Result<SweepReport> {
        let RunParameters {
            initial_temperature,
            final_temperature,
            delay,
        } = *params;
        if initial_temperature == final_temperature {
            warn!(
                temperature = initial_temperature,
                "initial and final temperature are equal; round trip is a single step each way"
            );
        }

        let report = self.round_trip(initial_temperature, final_temperature, delay);
        self.state = SweepState::Idle;
        let report = report?;

        info!(steps = report.len(), "round trip complete");
        Ok(report)
    }

    /// Full test procedure: initialize, wait for `confirm`, then round trip.
    pub fn run_test<F>(&mut self, params: &RunParameters, confirm: F) -> Result<SweepReport>
    where
        F: FnOnce() -> Result<()>,
    {
        self.initialize(params.initial_temperature)?;
        confirm()?;
        self.run_round_trip(params)
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    pub fn source(&self) -> &SourceController<C> {
        &self.source
    }

    pub fn into_source(self) -> SourceController<C> {
        self.source
    }

    fn round_trip(&mut self, initial: i32, last: i32, delay: Duration) -> Result<SweepReport> {
        self.state = SweepState::RampingForward;
        let forward = self.ramp(initial, last, delay)?;
        self.state = SweepState::RampingReverse;
        let reverse = self.ramp(last, initial, delay)?;
        Ok(SweepReport { forward, reverse })
    }

    fn ramp(&mut self, initial: i32, last: i32, delay: Duration) -> Result<Vec<SweepStep>> {
        let direction = Direction::between(initial, last);
        info!(from = initial, to = last, %direction, "ramp started");

        let mut steps = Vec::new();
        for temperature in temperatures(initial, last) {
            let (resistance, voltage) = self.resolve(temperature)?;
            self.source.set_voltage(voltage)?;
            info!(temperature, resistance, voltage, "temperature step applied");
            steps.push(SweepStep {
                temperature,
                resistance,
                voltage,
                direction,
                phase: self.state,
            });
            self.pause.pause(delay);
        }
        Ok(steps)
    }
}
