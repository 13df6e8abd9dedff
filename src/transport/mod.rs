//! Transport boundary to the remote sensing unit.
//!
//! This module provides a trait-based abstraction over the link to the device,
//! so the acquisition pipeline can run against BLE hardware, a simulated unit,
//! or a scripted fake in tests. A transport owns at most one logical connection
//! at a time and delivers incoming data through a per-connection channel.

#[cfg(feature = "bluer")]
pub mod bluer;

pub mod simulated;

use crate::device::DeviceFilter;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Channel buffer size for incoming transport events.
pub const EVENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Terminator appended to every command written to the device.
pub const COMMAND_TERMINATOR: u8 = b'\n';

/// Default time allowed for discovering the sensing unit.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Error type for transport operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// No active connection
    #[error("Not connected")]
    NotConnected,
    /// A connection is already established or being established
    #[error("Already connected")]
    AlreadyConnected,
    /// The operator cancelled device selection or pairing
    #[error("Connection cancelled")]
    Cancelled,
    /// No matching device showed up during discovery
    #[error("No matching device found")]
    DeviceNotFound,
    /// The device does not expose the acquisition service
    #[error("Acquisition service not found on device")]
    ServiceNotFound,
    /// An operation did not finish in time
    #[error("Timed out: {0}")]
    Timeout(String),
    /// Bluetooth stack error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

impl TransportError {
    /// Cancellation is an expected outcome and must not be shown as an error.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}

/// Something that happened on an established connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Raw bytes received from the device, in arrival order
    Data(Vec<u8>),
    /// The device went away
    Disconnected,
}

/// An established connection as seen by the caller.
#[derive(Debug)]
pub struct Link {
    /// Human-readable device name
    pub device_name: String,
    /// Incoming data and the disconnect notification for this connection only
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Boxed future returned by [`Transport`] operations.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Link abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Transport: Send {
    /// Open a connection. Fails with [`TransportError::AlreadyConnected`] if one is active.
    fn connect(&mut self) -> TransportFuture<'_, Link>;

    /// Close the active connection, if any.
    fn disconnect(&mut self) -> TransportFuture<'_, ()>;

    /// Write one command line to the device.
    fn send(&mut self, command: String) -> TransportFuture<'_, ()>;
}

/// Encode a command as written on the wire.
pub fn encode_command(command: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(command.len() + 1);
    bytes.extend_from_slice(command.as_bytes());
    bytes.push(COMMAND_TERMINATOR);
    bytes
}

/// Available transport backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus GATT client (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// In-process simulated sensing unit, no hardware needed
    Simulated,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(not(feature = "bluer"))]
        return Backend::Simulated;
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            Backend::Simulated => write!(f, "simulated"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            #[cfg(feature = "bluer")]
            "bluer" | "bluez" => Ok(Backend::Bluer),
            "simulated" | "sim" => Ok(Backend::Simulated),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Settings shared by the hardware backends.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub filter: DeviceFilter,
    pub scan_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            filter: DeviceFilter::default(),
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }
}

/// Create a transport for the specified backend.
pub fn open(backend: Backend, settings: TransportSettings) -> Box<dyn Transport> {
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => Box::new(bluer::BluerTransport::new(
            settings.filter,
            settings.scan_timeout,
        )),
        Backend::Simulated => {
            let _ = settings;
            Box::new(simulated::SimulatedTransport::new())
        }
    }
}
