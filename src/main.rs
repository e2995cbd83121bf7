use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::style::Stylize;
use ntc_sim::logging::{self, LogFormat};
use ntc_sim::{
    available_instruments, InstrumentConnection, LoopbackInstrument, RampSequencer,
    ResistanceTable, RunParameters, SerialInstrument, SourceController, SweepConfig, SweepReport,
    VoltageFormula,
};
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Sweeps a simulated NTC temperature on a dual-output supply",
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults to $NTC_SWEEP_CONFIG, ntc_sweep.toml or config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Serial port of the supply, overrides the configuration
    #[arg(short, long)]
    port: Option<String>,
    /// Baud rate, overrides the configuration
    #[arg(short, long)]
    baud: Option<u32>,
    /// Initial temperature; prompted for when absent
    #[arg(long, allow_negative_numbers = true)]
    initial: Option<i32>,
    /// Final temperature; prompted for when absent
    #[arg(long = "final", allow_negative_numbers = true)]
    final_temperature: Option<i32>,
    /// Start the sweep without waiting for confirmation
    #[arg(short, long)]
    yes: bool,
    /// Log commands instead of sending them to hardware
    #[arg(long)]
    dry_run: bool,
    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,
    /// Log output format, overrides the configuration
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

// The main entry point for the sweep application.
fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_ports {
        logging::init(cli.log_format.unwrap_or_default());
        return list_ports();
    }

    let config_path = SweepConfig::locate(cli.config.as_deref())?;
    let mut config = SweepConfig::from_path(&config_path)?;
    logging::init(cli.log_format.unwrap_or(config.logging.format));

    if let Some(port) = cli.port {
        config.instrument.port = Some(port);
    }
    if let Some(baud) = cli.baud {
        config.instrument.baud_rate = baud;
    }

    let table = config.table()?;
    let formula = config.formula()?;
    info!(
        config = %config_path.display(),
        points = table.len(),
        formula = %formula,
        delay = config.delay,
        "configuration ready"
    );

    println!("=========================");
    println!("   NTC Temperature Sweep ");
    println!("=========================");
    if let Some((low, high)) = table.span() {
        println!("Calibrated range: {} .. {}", low, high);
    }

    let initial = match cli.initial {
        Some(t) => t,
        None => prompt_temperature("input initial temperature: ")?,
    };
    let last = match cli.final_temperature {
        Some(t) => t,
        None => prompt_temperature("input final temperature: ")?,
    };
    let params = config.run_parameters(initial, last)?;

    let report = if cli.dry_run {
        let instrument = LoopbackInstrument::new("dry-run");
        run(instrument, &config, &table, &formula, &params, cli.yes)?
    } else {
        let instrument =
            SerialInstrument::open_first(&config.instrument).context("failed to open the supply")?;
        run(instrument, &config, &table, &formula, &params, cli.yes)?
    };

    print_summary(&report);
    Ok(())
}

// Initializes the supply, waits for the operator and runs the round trip.
fn run<C: InstrumentConnection>(
    connection: C,
    config: &SweepConfig,
    table: &ResistanceTable,
    formula: &VoltageFormula,
    params: &RunParameters,
    skip_confirm: bool,
) -> Result<SweepReport> {
    let source = SourceController::new(connection, config.supply)?;
    let mut sequencer = RampSequencer::new(table, formula, source);
    let report = sequencer.run_test(params, || {
        if !skip_confirm {
            prompt("press 'enter' to start test: ")?;
        }
        Ok(())
    })?;
    Ok(report)
}

fn list_ports() -> Result<()> {
    let ports = available_instruments().context("could not enumerate serial ports")?;
    print!("{}", port_listing(&ports)?);
    Ok(())
}

// An empty listing is an error so the exit status reports it.
fn port_listing(ports: &[String]) -> Result<String> {
    if ports.is_empty() {
        bail!("no serial ports found");
    }
    let mut listing = String::from("Available serial ports:\n");
    for (i, port) in ports.iter().enumerate() {
        listing.push_str(&format!("  {}: {}\n", i, port));
    }
    Ok(listing)
}

fn prompt(message: &str) -> io::Result<String> {
    print!("{}", message.bold());
    io::stdout().flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "console closed before input was given",
        ));
    }
    Ok(input.trim().to_owned())
}

// Keeps asking until the operator enters an integer.
fn prompt_temperature(message: &str) -> Result<i32> {
    loop {
        let input = prompt(message)?;
        match input.parse::<i32>() {
            Ok(temperature) => return Ok(temperature),
            Err(_) => eprintln!(
                "{} '{}' is not an integer temperature.",
                "[ERROR]".red(),
                input
            ),
        }
    }
}

fn print_summary(report: &SweepReport) {
    println!();
    println!("{}", "Sweep complete".green().bold());
    println!("  steps applied: {}", report.len());
    if let (Some(first), Some(last)) = (report.forward.first(), report.forward.last()) {
        println!(
            "  outbound:      {} -> {} ({})",
            first.temperature, last.temperature, first.direction
        );
    }
    if let Some((low, high)) = report.voltage_range() {
        println!("  voltage range: {:.3} V .. {:.3} V", low, high);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_port_list_is_an_error() {
        let err = port_listing(&[]).unwrap_err();
        assert_eq!(err.to_string(), "no serial ports found");
    }

    #[test]
    fn ports_are_listed_with_their_index() {
        let ports = ["/dev/ttyUSB0".to_owned(), "/dev/ttyUSB1".to_owned()];
        assert_eq!(
            port_listing(&ports).unwrap(),
            "Available serial ports:\n  0: /dev/ttyUSB0\n  1: /dev/ttyUSB1\n"
        );
    }
}
