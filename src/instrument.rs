//! Instrument command transport.
//!
//! [`InstrumentConnection`] is the only capability the controller needs from
//! a connection: send one command string. [`SerialInstrument`] talks to a
//! real supply over a serial port, [`LoopbackInstrument`] records commands
//! for dry runs.

use std::io::{self, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Error raised by the command transport.
#[derive(Debug, Error)]
pub enum InstrumentError {
    /// No instrument connection could be enumerated.
    #[error("no instrument connections available")]
    NoConnections,
    /// The session behind this connection is closed.
    #[error("connection '{0}' is not open")]
    NotConnected(String),
    /// Enumerating or opening a port failed.
    #[error("serial port: {0}")]
    Serial(#[from] serialport::Error),
    /// Writing a command failed or timed out.
    #[error("failed to send '{command}': {source}")]
    Send {
        command: String,
        #[source]
        source: io::Error,
    },
}

/// A connection capable of sending command strings to an instrument.
pub trait InstrumentConnection {
    /// Sends one command. Returns once the transport has accepted it.
    fn send(&mut self, command: &str) -> Result<(), InstrumentError>;

    /// Name of the resource this connection is bound to.
    fn resource(&self) -> &str;

    /// Whether a live session backs this connection.
    fn is_connected(&self) -> bool {
        true
    }
}

impl<C: InstrumentConnection + ?Sized> InstrumentConnection for Box<C> {
    fn send(&mut self, command: &str) -> Result<(), InstrumentError> {
        (**self).send(command)
    }

    fn resource(&self) -> &str {
        (**self).resource()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_timeout_ms() -> u64 {
    2000
}

/// Serial line settings for the supply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Port to open. When unset the first enumerated port is used.
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Lists the names of every serial port the host reports.
pub fn available_instruments() -> Result<Vec<String>, InstrumentError> {
    let ports = serialport::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

// Commands are newline terminated, as the supply's serial interface expects.
pub struct SerialInstrument {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

impl SerialInstrument {
    /// Opens `name` with the given settings.
    pub fn open(name: &str, settings: &SerialSettings) -> Result<Self, InstrumentError> {
        let port = serialport::new(name, settings.baud_rate)
            .timeout(Duration::from_millis(settings.timeout_ms))
            .open()?;
        info!(port = %name, baud = settings.baud_rate, "instrument connection opened");
        Ok(Self {
            port,
            name: name.to_owned(),
        })
    }

    /// Opens the configured port, or the first enumerated one if none is set.
    pub fn open_first(settings: &SerialSettings) -> Result<Self, InstrumentError> {
        match &settings.port {
            Some(name) => Self::open(name, settings),
            None => {
                let ports = available_instruments()?;
                let first = ports.first().ok_or(InstrumentError::NoConnections)?;
                Self::open(first, settings)
            }
        }
    }
}

impl InstrumentConnection for SerialInstrument {
    fn send(&mut self, command: &str) -> Result<(), InstrumentError> {
        debug!(port = %self.name, command, "send");
        let framed = format!("{}\n", command);
        self.port
            .write_all(framed.as_bytes())
            .and_then(|_| self.port.flush())
            .map_err(|source| InstrumentError::Send {
                command: command.to_owned(),
                source,
            })
    }

    fn resource(&self) -> &str {
        &self.name
    }
}

/// Accepts and records every command without touching hardware.
#[derive(Debug, Clone)]
pub struct LoopbackInstrument {
    name: String,
    connected: bool,
    commands: Vec<String>,
}

impl LoopbackInstrument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connected: true,
            commands: Vec::new(),
        }
    }

    /// A loopback with no session behind it. Controllers refuse it.
    pub fn disconnected(name: impl Into<String>) -> Self {
        Self {
            connected: false,
            ..Self::new(name)
        }
    }

    /// Every command sent so far, in order.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }
}

impl InstrumentConnection for LoopbackInstrument {
    fn send(&mut self, command: &str) -> Result<(), InstrumentError> {
        if !self.connected {
            return Err(InstrumentError::NotConnected(self.name.clone()));
        }
        info!(resource = %self.name, command, "dry-run command");
        self.commands.push(command.to_owned());
        Ok(())
    }

    fn resource(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
