use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use ntc_sim::{
    InstrumentConnection, InstrumentError, LoopbackInstrument, Pause, RampSequencer,
    ResistanceTable, RunParameters, SourceController, SupplySettings, SweepError, SweepState,
    VoltageFormula,
};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Command(String),
    Pause(Duration),
}

type Log = Rc<RefCell<Vec<Event>>>;

// Records commands into a shared log; optionally fails on the nth command.
#[derive(Debug)]
struct ScriptedInstrument {
    log: Log,
    fail_at: Option<usize>,
    sent: usize,
    connected: bool,
}

impl ScriptedInstrument {
    fn new(log: &Log) -> Self {
        Self {
            log: Rc::clone(log),
            fail_at: None,
            sent: 0,
            connected: true,
        }
    }
}

impl InstrumentConnection for ScriptedInstrument {
    fn send(&mut self, command: &str) -> Result<(), InstrumentError> {
        if self.fail_at == Some(self.sent) {
            return Err(InstrumentError::Send {
                command: command.to_owned(),
                source: io::Error::new(io::ErrorKind::TimedOut, "no response"),
            });
        }
        self.sent += 1;
        self.log
            .borrow_mut()
            .push(Event::Command(command.to_owned()));
        Ok(())
    }

    fn resource(&self) -> &str {
        "GPIB0::5::INSTR"
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

struct LoggedPause(Log);

impl Pause for LoggedPause {
    fn pause(&mut self, duration: Duration) {
        self.0.borrow_mut().push(Event::Pause(duration));
    }
}

fn commands(log: &Log) -> Vec<String> {
    log.borrow()
        .iter()
        .filter_map(|e| match e {
            Event::Command(c) => Some(c.clone()),
            Event::Pause(_) => None,
        })
        .collect()
}

fn linear_table(from: i32, to: i32) -> ResistanceTable {
    let temperatures: Vec<i32> = (from..=to).collect();
    let resistances: Vec<f64> = temperatures
        .iter()
        .map(|t| 10000.0 - 500.0 * f64::from(t - from))
        .collect();
    ResistanceTable::new(&temperatures, &resistances).unwrap()
}

#[test]
fn three_step_sweep_sets_each_voltage_then_waits() {
    let log: Log = Rc::default();
    let table = ResistanceTable::new(&[20, 21, 22], &[10000.0, 9500.0, 9000.0]).unwrap();
    let formula = VoltageFormula::parse("resistance * 0").unwrap();
    let source =
        SourceController::new(ScriptedInstrument::new(&log), SupplySettings::default()).unwrap();
    let delay = Duration::from_millis(250);

    let mut sequencer =
        RampSequencer::new(&table, &formula, source).with_pause(LoggedPause(Rc::clone(&log)));
    let steps = sequencer.run_sweep(20, 22, delay).unwrap();

    assert_eq!(
        *log.borrow(),
        vec![
            Event::Command("voltage2 0.000".into()),
            Event::Pause(delay),
            Event::Command("voltage2 0.000".into()),
            Event::Pause(delay),
            Event::Command("voltage2 0.000".into()),
            Event::Pause(delay),
        ]
    );
    assert_eq!(
        steps.iter().map(|s| s.temperature).collect::<Vec<_>>(),
        [20, 21, 22]
    );
    assert!(steps.iter().all(|s| s.voltage == 0.0));
}

#[test]
fn round_trip_visits_every_temperature_out_and_back() {
    let log: Log = Rc::default();
    let table = linear_table(20, 25);
    let formula = VoltageFormula::parse("r / 1000").unwrap();
    let source =
        SourceController::new(ScriptedInstrument::new(&log), SupplySettings::default()).unwrap();
    let mut sequencer =
        RampSequencer::new(&table, &formula, source).with_pause(LoggedPause(Rc::clone(&log)));

    let params = RunParameters::new(20, 25, 0.0).unwrap();
    let report = sequencer.run_round_trip(&params).unwrap();

    let visited: Vec<i32> = report.steps().map(|s| s.temperature).collect();
    assert_eq!(visited, [20, 21, 22, 23, 24, 25, 25, 24, 23, 22, 21, 20]);
    let phases: Vec<SweepState> = report.steps().map(|s| s.phase).collect();
    assert_eq!(phases[..6], [SweepState::RampingForward; 6]);
    assert_eq!(phases[6..], [SweepState::RampingReverse; 6]);

    let sent = commands(&log);
    assert_eq!(sent.len(), 12);
    assert_eq!(sent.first(), sent.last());
    assert_eq!(sent[0], "voltage2 10.000");
    assert_eq!(sent[5], "voltage2 7.500");
    assert_eq!(sequencer.state(), SweepState::Idle);
}

#[test]
fn falling_sweep_counts_down() {
    let table = linear_table(-3, 0);
    let formula = VoltageFormula::parse("r / 1000").unwrap();
    let source =
        SourceController::new(LoopbackInstrument::new("loop"), SupplySettings::default()).unwrap();
    let mut sequencer =
        RampSequencer::new(&table, &formula, source).with_pause(ntc_sim::ThreadSleep);

    let steps = sequencer.run_sweep(0, -3, Duration::ZERO).unwrap();
    assert_eq!(
        steps.iter().map(|s| s.temperature).collect::<Vec<_>>(),
        [0, -1, -2, -3]
    );
}

#[test]
fn test_procedure_initializes_before_confirming_and_ramping() {
    let log: Log = Rc::default();
    let table = linear_table(20, 22);
    let formula = VoltageFormula::parse("3.3 * r / (r + 10000)").unwrap();
    let source =
        SourceController::new(ScriptedInstrument::new(&log), SupplySettings::default()).unwrap();
    let mut sequencer =
        RampSequencer::new(&table, &formula, source).with_pause(LoggedPause(Rc::clone(&log)));

    let params = RunParameters::new(20, 22, 0.0).unwrap();
    let confirm_log = Rc::clone(&log);
    let report = sequencer
        .run_test(&params, move || {
            // Initialization must be complete by the time the operator confirms.
            assert_eq!(confirm_log.borrow().len(), 9);
            Ok(())
        })
        .unwrap();
    assert_eq!(report.len(), 6);

    let sent = commands(&log);
    assert_eq!(
        &sent[..9],
        [
            "*rst; status:preset; *cls",
            "instrument:couple:output:state none",
            "voltage:protection:level 4;state on",
            "voltage1 3.8",
            "voltage2 1.650",
            "output1 on",
            "output2 on",
            "display on",
            "display:channel 2",
        ]
    );
    assert_eq!(sent.len(), 9 + 6);
}

#[test]
fn missing_temperature_aborts_without_further_commands() {
    let log: Log = Rc::default();
    let table = ResistanceTable::new(&[20, 21, 23], &[10000.0, 9500.0, 8500.0]).unwrap();
    let formula = VoltageFormula::parse("r / 1000").unwrap();
    let source =
        SourceController::new(ScriptedInstrument::new(&log), SupplySettings::default()).unwrap();
    let mut sequencer =
        RampSequencer::new(&table, &formula, source).with_pause(LoggedPause(Rc::clone(&log)));

    let params = RunParameters::new(20, 23, 0.0).unwrap();
    let err = sequencer.run_round_trip(&params).unwrap_err();
    assert!(matches!(err, SweepError::MissingTemperature(22)));
    assert_eq!(commands(&log), ["voltage2 10.000", "voltage2 9.500"]);
    assert_eq!(sequencer.state(), SweepState::Idle);
}

#[test]
fn missing_initial_temperature_fails_before_initialization() {
    let log: Log = Rc::default();
    let table = linear_table(20, 22);
    let formula = VoltageFormula::parse("r").unwrap();
    let source =
        SourceController::new(ScriptedInstrument::new(&log), SupplySettings::default()).unwrap();
    let mut sequencer =
        RampSequencer::new(&table, &formula, source).with_pause(LoggedPause(Rc::clone(&log)));

    let params = RunParameters::new(19, 22, 0.0).unwrap();
    let err = sequencer.run_test(&params, || Ok(())).unwrap_err();
    assert!(matches!(err, SweepError::MissingTemperature(19)));
    assert!(log.borrow().is_empty());
}

#[test]
fn formula_errors_abort_the_sweep() {
    let log: Log = Rc::default();
    let table = ResistanceTable::new(&[0, 1], &[5.0, 10.0]).unwrap();
    let formula = VoltageFormula::parse("1 / (r - 10)").unwrap();
    let source =
        SourceController::new(ScriptedInstrument::new(&log), SupplySettings::default()).unwrap();
    let mut sequencer =
        RampSequencer::new(&table, &formula, source).with_pause(LoggedPause(Rc::clone(&log)));

    let err = sequencer.run_sweep(0, 1, Duration::ZERO).unwrap_err();
    assert!(matches!(err, SweepError::Formula(_)));
    assert_eq!(commands(&log), ["voltage2 -0.200"]);
}

#[test]
fn unbound_connection_sends_nothing() {
    let log: Log = Rc::default();
    let mut instrument = ScriptedInstrument::new(&log);
    instrument.connected = false;

    let err = SourceController::new(instrument, SupplySettings::default()).unwrap_err();
    assert!(matches!(err, SweepError::UnboundConnection(ref name) if name == "GPIB0::5::INSTR"));
    assert!(log.borrow().is_empty());
}

#[test]
fn communication_failure_propagates_and_stops_initialization() {
    let log: Log = Rc::default();
    let mut instrument = ScriptedInstrument::new(&log);
    instrument.fail_at = Some(3);
    let mut source = SourceController::new(instrument, SupplySettings::default()).unwrap();

    let err = source.initialize(1.0).unwrap_err();
    assert!(matches!(
        err,
        SweepError::Instrument(InstrumentError::Send { ref command, .. }) if command == "voltage1 3.8"
    ));
    assert_eq!(commands(&log).len(), 3);
}

#[test]
fn operator_abort_stops_before_ramping() {
    let table = linear_table(20, 21);
    let formula = VoltageFormula::parse("r / 1000").unwrap();
    let source =
        SourceController::new(LoopbackInstrument::new("loop"), SupplySettings::default()).unwrap();
    let mut sequencer = RampSequencer::new(&table, &formula, source);

    let params = RunParameters::new(20, 21, 0.0).unwrap();
    let err = sequencer
        .run_test(&params, || {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "console closed").into())
        })
        .unwrap_err();
    assert!(matches!(err, SweepError::Console(_)));
    assert_eq!(sequencer.source().connection().commands().len(), 9);
}
