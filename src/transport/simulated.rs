//! In-process simulated sensing unit.
//!
//! Answers acquisition commands the way the field firmware does: `START` and
//! poll requests move to the next electrode station and report a full-form
//! reading, `REPEAT` measures the current station again and `STOP` is silent.
//! Each reading is delivered in two notification chunks so the receive path
//! sees fragmented frames.

use super::{
    EVENT_CHANNEL_BUFFER_SIZE, Link, Transport, TransportError, TransportEvent, TransportFuture,
};
use crate::acquisition::{REPEAT_COMMAND, START_COMMAND, STOP_COMMAND};
use log::{debug, warn};
use tokio::sync::mpsc;

/// Name reported for the simulated device.
pub const SIMULATED_DEVICE_NAME: &str = "ESP32-SIM";

/// Number of electrode stations before the simulated line wraps around.
const STATIONS: u32 = 24;

#[derive(Debug, Default)]
pub struct SimulatedTransport {
    tx: Option<mpsc::Sender<TransportEvent>>,
    /// Current station, `None` before the first reading of a run
    station: Option<u32>,
    /// Readings produced so far, drives the resistivity variation
    produced: u32,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn advance(&mut self) -> u32 {
        let next = match self.station {
            Some(s) => (s + 1) % STATIONS,
            None => 0,
        };
        self.station = Some(next);
        next
    }

    fn reading_line(&mut self, station: u32) -> String {
        self.produced += 1;
        let (a, b, m, n) = (station + 1, station + 2, station + 3, station + 4);
        let ra = 100.0 + 25.0 * (f64::from(station) * 0.5).sin() + f64::from(self.produced % 7) * 0.1;
        format!("{},{},{},{},{:.2}\n", a, b, m, n, ra)
    }

    fn emit(&self, line: &str) {
        let Some(tx) = &self.tx else {
            return;
        };
        let split = line.len() / 2;
        for chunk in [&line[..split], &line[split..]] {
            if tx
                .try_send(TransportEvent::Data(chunk.as_bytes().to_vec()))
                .is_err()
            {
                warn!("Simulated device dropped a chunk, receiver is full or gone");
                return;
            }
        }
    }
}

impl Transport for SimulatedTransport {
    fn connect(&mut self) -> TransportFuture<'_, Link> {
        Box::pin(async move {
            if self.tx.is_some() {
                return Err(TransportError::AlreadyConnected);
            }
            let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER_SIZE);
            self.tx = Some(tx);
            self.station = None;
            Ok(Link {
                device_name: SIMULATED_DEVICE_NAME.to_string(),
                events: rx,
            })
        })
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.tx = None;
            Ok(())
        })
    }

    fn send(&mut self, command: String) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            if self.tx.is_none() {
                return Err(TransportError::NotConnected);
            }
            debug!("Simulated device received {:?}", command);

            let station = match command.trim() {
                STOP_COMMAND => return Ok(()),
                START_COMMAND => {
                    self.station = None;
                    self.advance()
                }
                REPEAT_COMMAND => match self.station {
                    Some(s) => s,
                    None => self.advance(),
                },
                _ => self.advance(),
            };
            let line = self.reading_line(station);
            self.emit(&line);
            Ok(())
        })
    }
}
