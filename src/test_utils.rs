use crate::reading::{Measurement, MeasurementId, Reading};
use crate::transport::{
    EVENT_CHANNEL_BUFFER_SIZE, Link, Transport, TransportError, TransportEvent, TransportFuture,
};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A stable timestamp for unit tests (2024-05-01T10:00:00Z).
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

/// A dipole-dipole style reading shifted `i` electrodes along the line.
pub fn reading_at(i: u32) -> Reading {
    Reading::new(i + 1, i + 2, i + 3, i + 4, 100.0 + f64::from(i))
}

/// Build `count` measurements with distinct identifiers and one-second spacing.
pub fn sample_measurements(count: u32) -> Vec<Measurement> {
    (0..count)
        .map(|i| {
            Measurement::new(
                MeasurementId(1_000 + u64::from(i)),
                reading_at(i),
                fixed_time() + chrono::Duration::seconds(i64::from(i)),
            )
        })
        .collect()
}

/// Scripted transport for controller tests.
///
/// Clones share state, so a test keeps one handle to inspect sent commands and
/// inject chunks while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

#[derive(Debug, Default)]
struct FakeState {
    tx: Option<mpsc::Sender<TransportEvent>>,
    sent: Vec<String>,
    responses: HashMap<String, Vec<String>>,
    connect_error: Option<TransportError>,
    fail_sends: bool,
    connects: usize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command written so far, without the terminator.
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().tx.is_some()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    /// Chunks delivered each time `command` is sent.
    pub fn respond_to(&self, command: &str, chunks: &[&str]) {
        self.state.lock().unwrap().responses.insert(
            command.to_string(),
            chunks.iter().map(|c| c.to_string()).collect(),
        );
    }

    pub fn fail_next_connect(&self, error: TransportError) {
        self.state.lock().unwrap().connect_error = Some(error);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().unwrap().fail_sends = fail;
    }

    /// Deliver a chunk on the active connection.
    pub fn push(&self, chunk: &str) {
        let state = self.state.lock().unwrap();
        let tx = state.tx.as_ref().expect("not connected");
        tx.try_send(TransportEvent::Data(chunk.as_bytes().to_vec()))
            .unwrap();
    }

    /// Simulate the device going away.
    pub fn drop_link(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(tx) = state.tx.take() {
            tx.try_send(TransportEvent::Disconnected).unwrap();
        }
    }
}

impl Transport for FakeTransport {
    fn connect(&mut self) -> TransportFuture<'_, Link> {
        let mut state = self.state.lock().unwrap();
        let result = if let Some(error) = state.connect_error.take() {
            Err(error)
        } else if state.tx.is_some() {
            Err(TransportError::AlreadyConnected)
        } else {
            let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER_SIZE);
            state.tx = Some(tx);
            state.connects += 1;
            Ok(Link {
                device_name: "ESP32-TEST".to_string(),
                events: rx,
            })
        };
        Box::pin(async move { result })
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        self.state.lock().unwrap().tx = None;
        Box::pin(async { Ok(()) })
    }

    fn send(&mut self, command: String) -> TransportFuture<'_, ()> {
        let mut state = self.state.lock().unwrap();
        let result = if state.fail_sends {
            Err(TransportError::Bluetooth("write failed".to_string()))
        } else if let Some(tx) = state.tx.clone() {
            state.sent.push(command.clone());
            for chunk in state.responses.get(&command).into_iter().flatten() {
                let _ = tx.try_send(TransportEvent::Data(chunk.as_bytes().to_vec()));
            }
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        };
        Box::pin(async move { result })
    }
}
