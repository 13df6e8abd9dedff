//! The acquisition session controller.
//!
//! [`Session`] is the single owner of all mutable session state: the transport
//! and its event channel, the frame buffer, the acquisition state machine, the
//! poll timer, the ledger and the survey configuration. Presentation code drives
//! it through operator operations and by feeding it the events returned from
//! [`Session::next_event`].
//!
//! Waiting and reacting are split on purpose: `next_event` only awaits
//! cancel-safe sources and can sit inside a `select!`, while `handle_event`
//! performs the follow-up work (parsing, poll requests) to completion.

use crate::acquisition::{
    Acquisition, AcquisitionError, Action, DEFAULT_POLL_COMMAND, DeviceCommand, Phase, TimerEffect,
};
use crate::export::{ExportFormat, write_export};
use crate::framing::FrameReassembler;
use crate::ledger::Ledger;
use crate::parser::parse_message;
use crate::reading::{Measurement, MeasurementId, Reading};
use crate::store::{self, Store, StoreError};
use crate::survey::{ConfigError, ConfigUpdate, SurveyConfig};
use crate::timer::{DEFAULT_POLL_INTERVAL, PollTimer};
use crate::transport::{Transport, TransportError, TransportEvent};
use chrono::{NaiveDate, Utc};
use log::{debug, error, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Message shown when the device drops the link.
pub const DISCONNECTED_MESSAGE: &str = "Device disconnected";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Export failed: {0}")]
    Export(#[from] io::Error),
}

impl SessionError {
    /// Whether this error is an operator cancellation rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SessionError::Transport(e) if e.is_cancellation())
    }
}

/// What became of an injected message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Injection {
    /// Parsed and held as the pending reading.
    Pending(Reading),
    /// Parsed, but acquisition is stopped.
    Stopped,
    /// Not a valid device message.
    Rejected,
}

/// Tunables of the acquisition loop.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub poll_interval: Duration,
    /// Request written on every poll tick
    pub poll_command: String,
    /// Empty the ledger whenever a run is started
    pub clear_on_start: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_command: DEFAULT_POLL_COMMAND.to_string(),
            clear_on_start: false,
        }
    }
}

/// Connection status as shown to the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub connected: bool,
    pub connecting: bool,
    pub device_name: Option<String>,
    /// Last user-visible failure; cancellations never land here
    pub last_error: Option<String>,
}

/// Something the session is waiting on has happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// An event from the active connection, `None` once its channel closed
    Transport(Option<TransportEvent>),
    /// The poll timer fired
    PollTick,
}

/// Observable outcome of handling a [`SessionEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// A new pending reading replaced the previous one
    Reading(Reading),
    /// The connection was lost and the session was torn down
    LinkLost,
    /// A poll request could not be written
    PollFailed(TransportError),
}

pub struct Session {
    transport: Box<dyn Transport>,
    store: Box<dyn Store>,
    options: SessionOptions,
    reassembler: FrameReassembler,
    acquisition: Acquisition,
    timer: PollTimer,
    ledger: Ledger,
    config: SurveyConfig,
    connection: ConnectionState,
    events: Option<mpsc::Receiver<TransportEvent>>,
}

impl Session {
    /// Create a session, restoring the ledger and configuration from `store`.
    pub fn new(
        transport: Box<dyn Transport>,
        store: Box<dyn Store>,
        options: SessionOptions,
    ) -> Self {
        let ledger = store::load_ledger(store.as_ref());
        let config = store::load_config(store.as_ref());
        info!(
            "Restored {} measurements for project '{}'",
            ledger.len(),
            config.project_name
        );
        Self {
            transport,
            store,
            timer: PollTimer::new(options.poll_interval),
            options,
            reassembler: FrameReassembler::new(),
            acquisition: Acquisition::new(),
            ledger,
            config,
            connection: ConnectionState::default(),
            events: None,
        }
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn phase(&self) -> Phase {
        self.acquisition.phase()
    }

    pub fn pending(&self) -> Option<&Reading> {
        self.acquisition.pending()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn config(&self) -> &SurveyConfig {
        &self.config
    }

    pub fn is_polling(&self) -> bool {
        self.acquisition.is_polling()
    }

    pub fn is_timer_active(&self) -> bool {
        self.timer.is_active()
    }

    /// Open a connection to the device and return its display name.
    ///
    /// Rejected while another connection is active or being established.
    pub async fn connect(&mut self) -> Result<String, SessionError> {
        if self.connection.connected || self.connection.connecting {
            return Err(TransportError::AlreadyConnected.into());
        }

        self.connection.connecting = true;
        self.connection.last_error = None;
        self.reassembler.reset();

        let result = self.transport.connect().await;
        self.connection.connecting = false;

        match result {
            Ok(link) => {
                info!("Connected to {}", link.device_name);
                self.connection.connected = true;
                self.connection.device_name = Some(link.device_name.clone());
                self.events = Some(link.events);
                Ok(link.device_name)
            }
            Err(e) => {
                if e.is_cancellation() {
                    info!("Connection cancelled");
                } else {
                    warn!("Connection failed: {}", e);
                    self.connection.last_error = Some(e.to_string());
                }
                Err(e.into())
            }
        }
    }

    /// Close the connection. Transient state is cleared even if the transport
    /// reports an error.
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        if !self.connection.connected {
            return Ok(());
        }
        self.teardown();
        info!("Disconnected");
        self.transport.disconnect().await?;
        Ok(())
    }

    /// Send the start command and begin polling.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        self.run(Action::Start).await?;
        if self.options.clear_on_start {
            self.clear();
        }
        Ok(())
    }

    /// Ensure polling is active; asks for a new reading if it already is.
    pub async fn repeat(&mut self) -> Result<(), SessionError> {
        self.run(Action::Repeat).await
    }

    /// Send the stop command and cancel polling. The ledger is kept.
    pub async fn stop(&mut self) -> Result<(), SessionError> {
        self.run(Action::Stop).await
    }

    /// Commit the pending reading to the ledger. Polling continues.
    pub fn accept(&mut self) -> Result<Measurement, SessionError> {
        let reading = self.acquisition.take_pending()?;
        let measurement = self.ledger.record(reading, Utc::now()).clone();
        info!("Recorded measurement {} ({})", measurement.id, reading);
        self.persist_ledger();
        Ok(measurement)
    }

    /// Remove one measurement. Returns `false` if it did not exist.
    pub fn delete(&mut self, id: MeasurementId) -> bool {
        let removed = self.ledger.delete_by_id(id);
        if removed {
            self.persist_ledger();
        }
        removed
    }

    /// Empty the ledger and drop the pending reading.
    pub fn clear(&mut self) {
        self.ledger.clear();
        self.acquisition.clear_pending();
        self.persist_ledger();
    }

    pub fn update_config(&mut self, update: ConfigUpdate) -> Result<(), SessionError> {
        self.config.apply(update)?;
        if let Err(e) = store::save_config(self.store.as_mut(), &self.config) {
            error!("Failed to save survey configuration: {}", e);
        }
        Ok(())
    }

    /// Inject one logical message as if the device had sent it.
    ///
    /// Malformed messages are dropped the same way as on the receive path.
    pub fn simulate(&mut self, message: &str) -> Injection {
        match parse_message(message, self.ledger.len()) {
            Ok(reading) => {
                if self.acquisition.offer(reading) {
                    Injection::Pending(reading)
                } else {
                    debug!("Ignoring reading while stopped: {}", reading);
                    Injection::Stopped
                }
            }
            Err(e) => {
                debug!("Rejected message {:?}: {}", message, e);
                Injection::Rejected
            }
        }
    }

    /// Write the inversion-format file into `dir`.
    pub fn export_primary(&self, dir: &Path, date: NaiveDate) -> Result<PathBuf, SessionError> {
        self.export(ExportFormat::Dat, dir, date)
    }

    /// Write the tabular file into `dir`.
    pub fn export_secondary(&self, dir: &Path, date: NaiveDate) -> Result<PathBuf, SessionError> {
        self.export(ExportFormat::Csv, dir, date)
    }

    pub fn export(
        &self,
        format: ExportFormat,
        dir: &Path,
        date: NaiveDate,
    ) -> Result<PathBuf, SessionError> {
        let path = write_export(dir, format, self.ledger.measurements(), &self.config, date)?;
        info!(
            "Exported {} measurements to {}",
            self.ledger.len(),
            path.display()
        );
        Ok(path)
    }

    /// Wait for the next transport event or poll tick.
    ///
    /// Cancel-safe: nothing is lost if the returned future is dropped early.
    pub async fn next_event(&mut self) -> SessionEvent {
        let events = &mut self.events;
        let timer = &mut self.timer;
        tokio::select! {
            biased;
            event = recv_or_pending(events) => SessionEvent::Transport(event),
            _ = timer.tick() => SessionEvent::PollTick,
        }
    }

    /// React to an event returned by [`next_event`](Self::next_event).
    pub async fn handle_event(&mut self, event: SessionEvent) -> Vec<SessionUpdate> {
        match event {
            SessionEvent::Transport(Some(TransportEvent::Data(bytes))) => self.ingest(&bytes),
            SessionEvent::Transport(Some(TransportEvent::Disconnected) | None) => {
                self.link_lost().await
            }
            SessionEvent::PollTick => self.poll().await,
        }
    }

    /// Mandatory teardown: cancels polling and releases the connection.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.disconnect().await {
            warn!("Error while disconnecting: {}", e);
        }
        self.timer.cancel();
        self.reassembler.reset();
    }

    async fn run(&mut self, action: Action) -> Result<(), SessionError> {
        let command = self.acquisition.plan(action, self.connection.connected)?;
        self.send(command).await?;

        match self.acquisition.commit(command) {
            TimerEffect::Restart => self.timer.start(),
            TimerEffect::Keep => {}
            TimerEffect::Cancel => self.timer.cancel(),
        }
        info!("Sent {} ({})", command, self.acquisition.phase());
        Ok(())
    }

    async fn send(&mut self, command: DeviceCommand) -> Result<(), TransportError> {
        if let Err(e) = self.transport.send(command.as_str().to_string()).await {
            warn!("Failed to send {}: {}", command, e);
            self.connection.last_error = Some(e.to_string());
            return Err(e);
        }
        Ok(())
    }

    fn ingest(&mut self, bytes: &[u8]) -> Vec<SessionUpdate> {
        let text = String::from_utf8_lossy(bytes);
        let mut updates = Vec::new();
        for message in self.reassembler.feed(&text) {
            match parse_message(&message, self.ledger.len()) {
                Ok(reading) => {
                    if self.acquisition.offer(reading) {
                        updates.push(SessionUpdate::Reading(reading));
                    } else {
                        debug!("Ignoring reading while stopped: {}", reading);
                    }
                }
                Err(e) => debug!("Rejected message {:?}: {}", message, e),
            }
        }
        updates
    }

    async fn poll(&mut self) -> Vec<SessionUpdate> {
        if !self.acquisition.is_polling() || !self.connection.connected {
            self.timer.cancel();
            return Vec::new();
        }
        debug!("Requesting reading");
        match self.transport.send(self.options.poll_command.clone()).await {
            Ok(()) => Vec::new(),
            Err(e) => {
                warn!("Poll request failed: {}", e);
                vec![SessionUpdate::PollFailed(e)]
            }
        }
    }

    async fn link_lost(&mut self) -> Vec<SessionUpdate> {
        if !self.connection.connected {
            return Vec::new();
        }
        warn!("{}", DISCONNECTED_MESSAGE);
        self.teardown();
        self.connection.last_error = Some(DISCONNECTED_MESSAGE.to_string());
        if let Err(e) = self.transport.disconnect().await {
            debug!("Transport cleanup after link loss failed: {}", e);
        }
        vec![SessionUpdate::LinkLost]
    }

    fn teardown(&mut self) {
        self.timer.cancel();
        self.reassembler.reset();
        self.acquisition.on_disconnect();
        self.events = None;
        self.connection.connected = false;
        self.connection.device_name = None;
    }

    fn persist_ledger(&mut self) {
        if let Err(e) = store::save_ledger(self.store.as_mut(), &self.ledger) {
            error!("Failed to save measurements: {}", e);
        }
    }
}

async fn recv_or_pending(
    events: &mut Option<mpsc::Receiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{REPEAT_COMMAND, START_COMMAND, STOP_COMMAND};
    use crate::store::MemoryStore;
    use crate::test_utils::{FakeTransport, sample_measurements};

    fn session(fake: &FakeTransport) -> Session {
        Session::new(
            Box::new(fake.clone()),
            Box::new(MemoryStore::new()),
            SessionOptions::default(),
        )
    }

    async fn connected(fake: &FakeTransport) -> Session {
        let mut session = session(fake);
        session.connect().await.unwrap();
        session
    }

    /// Handle every event that is ready without letting the poll timer fire.
    async fn drain(session: &mut Session) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while let Ok(event) =
            tokio::time::timeout(Duration::from_millis(1), session.next_event()).await
        {
            updates.extend(session.handle_event(event).await);
        }
        updates
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_sets_state() {
        let fake = FakeTransport::new();
        let mut session = session(&fake);

        let name = session.connect().await.unwrap();
        assert_eq!(name, "ESP32-TEST");
        let state = session.connection();
        assert!(state.connected);
        assert!(!state.connecting);
        assert_eq!(state.device_name.as_deref(), Some("ESP32-TEST"));
        assert_eq!(state.last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_connect_rejected() {
        let fake = FakeTransport::new();
        let mut session = connected(&fake).await;

        let err = session.connect().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::AlreadyConnected)
        ));
        assert_eq!(fake.connects(), 1);
        assert!(session.connection().connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_connect_is_not_an_error() {
        let fake = FakeTransport::new();
        fake.fail_next_connect(TransportError::Cancelled);
        let mut session = session(&fake);

        let err = session.connect().await.unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(session.connection().last_error, None);
        assert!(!session.connection().connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_sets_error() {
        let fake = FakeTransport::new();
        fake.fail_next_connect(TransportError::DeviceNotFound);
        let mut session = session(&fake);

        assert!(session.connect().await.is_err());
        assert_eq!(
            session.connection().last_error.as_deref(),
            Some("No matching device found")
        );
        assert!(!session.connection().connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_reading_accept() {
        let fake = FakeTransport::new();
        fake.respond_to(START_COMMAND, &["1,2,3,", "4,56.7\n"]);
        let mut session = connected(&fake).await;

        session.start().await.unwrap();
        let updates = drain(&mut session).await;
        assert_eq!(
            updates,
            vec![SessionUpdate::Reading(Reading::new(1, 2, 3, 4, 56.7))]
        );

        let measurement = session.accept().unwrap();
        assert_eq!(measurement.reading, Reading::new(1, 2, 3, 4, 56.7));
        assert_eq!(session.ledger().len(), 1);
        assert!(session.pending().is_none());
        assert!(session.is_polling());
        assert!(session.is_timer_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_without_pending_reading() {
        let fake = FakeTransport::new();
        let mut session = connected(&fake).await;
        assert!(matches!(
            session.accept(),
            Err(SessionError::Acquisition(AcquisitionError::NoPendingReading))
        ));
        assert!(session.ledger().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_disconnected() {
        let fake = FakeTransport::new();
        let mut session = session(&fake);
        assert!(matches!(
            session.start().await,
            Err(SessionError::Acquisition(AcquisitionError::NotConnected))
        ));
        assert!(fake.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_ticks_send_poll_command() {
        let fake = FakeTransport::new();
        let mut session = connected(&fake).await;
        session.start().await.unwrap();

        let started = tokio::time::Instant::now();
        let event = session.next_event().await;
        assert_eq!(event, SessionEvent::PollTick);
        assert!(started.elapsed() >= DEFAULT_POLL_INTERVAL);

        session.handle_event(event).await;
        assert_eq!(fake.sent(), vec![START_COMMAND, DEFAULT_POLL_COMMAND]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resistance_only_reading_uses_ledger_length() {
        let fake = FakeTransport::new();
        fake.respond_to(DEFAULT_POLL_COMMAND, &["42.0\n"]);
        let mut session = connected(&fake).await;
        session.start().await.unwrap();

        let tick = session.next_event().await;
        session.handle_event(tick).await;
        drain(&mut session).await;
        session.accept().unwrap();

        let tick = session.next_event().await;
        session.handle_event(tick).await;
        drain(&mut session).await;
        assert_eq!(session.pending(), Some(&Reading::new(2, 3, 4, 5, 42.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_reading_wins() {
        let fake = FakeTransport::new();
        let mut session = connected(&fake).await;
        session.start().await.unwrap();

        fake.push("1,2,3,4,10\n1,2,3,4,");
        fake.push("20\n");
        let updates = drain(&mut session).await;
        assert_eq!(updates.len(), 2);

        let measurement = session.accept().unwrap();
        assert_eq!(measurement.reading.ra, 20.0);
        assert!(session.accept().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_messages_are_dropped() {
        let fake = FakeTransport::new();
        let mut session = connected(&fake).await;
        session.start().await.unwrap();

        fake.push("abc\n\n1,2,3\nOK\n");
        assert!(drain(&mut session).await.is_empty());
        assert!(session.pending().is_none());
        assert_eq!(session.connection().last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_while_polling_sends_repeat() {
        let fake = FakeTransport::new();
        let mut session = connected(&fake).await;
        session.start().await.unwrap();
        session.repeat().await.unwrap();

        assert_eq!(fake.sent(), vec![START_COMMAND, REPEAT_COMMAND]);
        assert!(session.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_when_idle_starts_polling() {
        let fake = FakeTransport::new();
        let mut session = connected(&fake).await;
        session.repeat().await.unwrap();

        assert_eq!(fake.sent(), vec![START_COMMAND]);
        assert!(session.is_polling());
        assert!(session.is_timer_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_silences_readings_and_timer() {
        let fake = FakeTransport::new();
        let mut session = connected(&fake).await;
        session.start().await.unwrap();
        session.stop().await.unwrap();
        session.stop().await.unwrap();

        assert_eq!(fake.sent(), vec![START_COMMAND, STOP_COMMAND, STOP_COMMAND]);
        assert_eq!(session.phase(), Phase::Stopped);
        assert!(!session.is_timer_active());

        fake.push("1,2,3,4,5\n");
        fake.push("7.5\n");
        assert!(drain(&mut session).await.is_empty());
        assert!(session.pending().is_none());

        // No tick ever arrives once stopped.
        let waited = tokio::time::timeout(Duration::from_secs(60), session.next_event()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_keeps_state() {
        let fake = FakeTransport::new();
        let mut session = connected(&fake).await;
        fake.fail_sends(true);

        assert!(matches!(
            session.start().await,
            Err(SessionError::Transport(TransportError::Bluetooth(_)))
        ));
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!session.is_timer_active());
        assert!(session.connection().last_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_poll_is_reported() {
        let fake = FakeTransport::new();
        let mut session = connected(&fake).await;
        session.start().await.unwrap();
        fake.fail_sends(true);

        let tick = session.next_event().await;
        let updates = session.handle_event(tick).await;
        assert!(matches!(
            updates.as_slice(),
            [SessionUpdate::PollFailed(TransportError::Bluetooth(_))]
        ));
        assert!(session.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_loss_tears_down() {
        let fake = FakeTransport::new();
        let mut session = connected(&fake).await;
        session.start().await.unwrap();
        fake.push("1,2,3,4,5\n9,9,");
        drain(&mut session).await;
        assert!(session.pending().is_some());

        fake.drop_link();
        let updates = drain(&mut session).await;
        assert_eq!(updates, vec![SessionUpdate::LinkLost]);

        assert_eq!(session.phase(), Phase::Idle);
        assert!(session.pending().is_none());
        assert!(!session.is_timer_active());
        assert!(!session.connection().connected);
        assert_eq!(
            session.connection().last_error.as_deref(),
            Some(DISCONNECTED_MESSAGE)
        );
        assert!(matches!(
            session.accept(),
            Err(SessionError::Acquisition(AcquisitionError::NoPendingReading))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_discards_partial_frame() {
        let fake = FakeTransport::new();
        let mut session = connected(&fake).await;
        fake.push("1,2,3,");
        drain(&mut session).await;

        session.disconnect().await.unwrap();
        session.connect().await.unwrap();
        assert_eq!(fake.connects(), 2);

        fake.push("4,56.7\n");
        drain(&mut session).await;
        assert!(session.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_and_clear() {
        let fake = FakeTransport::new();
        let mut session = connected(&fake).await;
        for i in 0..3 {
            session.simulate(&format!("{}", 10 + i));
            session.accept().unwrap();
        }
        let ids: Vec<MeasurementId> = session.ledger().measurements().iter().map(|m| m.id).collect();

        assert!(!session.delete(MeasurementId(1)));
        assert_eq!(session.ledger().len(), 3);

        assert!(session.delete(ids[1]));
        let remaining: Vec<MeasurementId> =
            session.ledger().measurements().iter().map(|m| m.id).collect();
        assert_eq!(remaining, vec![ids[0], ids[2]]);

        session.simulate("5,6,7,8,1.5");
        session.clear();
        assert!(session.ledger().is_empty());
        assert!(session.pending().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulate_rejects_malformed() {
        let fake = FakeTransport::new();
        let mut session = session(&fake);
        assert_eq!(session.simulate("1,2,3"), Injection::Rejected);
        assert_eq!(session.simulate("abc"), Injection::Rejected);
        assert!(session.pending().is_none());
        assert!(session.connection().last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_on_start() {
        let fake = FakeTransport::new();
        let mut backing = MemoryStore::new();
        store::save_ledger(&mut backing, &Ledger::from_measurements(sample_measurements(2)))
            .unwrap();
        let mut session = Session::new(
            Box::new(fake.clone()),
            Box::new(backing),
            SessionOptions {
                clear_on_start: true,
                ..SessionOptions::default()
            },
        );
        assert_eq!(session.ledger().len(), 2);

        session.connect().await.unwrap();
        session.start().await.unwrap();
        assert!(session.ledger().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutations_are_persisted() {
        let fake = FakeTransport::new();
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(
            Box::new(fake.clone()),
            Box::new(store::JsonFileStore::new(dir.path())),
            SessionOptions::default(),
        );
        session.simulate("1,2,3,4,56.7");
        let recorded = session.accept().unwrap();
        session
            .update_config(ConfigUpdate::ProjectName("Dam".to_string()))
            .unwrap();

        let reopened = Session::new(
            Box::new(FakeTransport::new()),
            Box::new(store::JsonFileStore::new(dir.path())),
            SessionOptions::default(),
        );
        assert_eq!(reopened.ledger().measurements(), &[recorded]);
        assert_eq!(reopened.config().project_name, "Dam");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_config_update_rejected() {
        let fake = FakeTransport::new();
        let mut session = session(&fake);
        assert!(matches!(
            session.update_config(ConfigUpdate::ElectrodeSpacing(0.0)),
            Err(SessionError::Config(ConfigError::InvalidSpacing(_)))
        ));
        assert_eq!(session.config().electrode_spacing, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_files() {
        let fake = FakeTransport::new();
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(&fake);
        session.simulate("1,2,3,4,56.7");
        session.accept().unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let dat = session.export_primary(dir.path(), date).unwrap();
        let csv = session.export_secondary(dir.path(), date).unwrap();

        assert!(dat.ends_with("ERT-Survey_2024-05-01.dat"));
        assert!(csv.ends_with("ERT-Survey_2024-05-01.csv"));
        let dat = std::fs::read_to_string(dat).unwrap();
        assert_eq!(dat, session.ledger().export_primary(session.config()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_everything() {
        let fake = FakeTransport::new();
        let mut session = connected(&fake).await;
        session.start().await.unwrap();
        fake.push("1,2,");
        drain(&mut session).await;

        session.shutdown().await;
        assert!(!session.is_timer_active());
        assert!(!session.connection().connected);
        assert_eq!(session.phase(), Phase::Idle);
        let waited = tokio::time::timeout(Duration::from_secs(60), session.next_event()).await;
        assert!(waited.is_err());
    }
}
