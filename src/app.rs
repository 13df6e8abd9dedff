//! Core application runner (business logic) for `ert-acquire`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit codes
//! so it can be tested deterministically with an injected transport, store and
//! operator input.

use crate::acquisition::DEFAULT_POLL_COMMAND;
use crate::command::{HELP, OperatorCommand, parse_line};
use crate::device::{DEFAULT_NAME_PREFIX, DeviceAddress, DeviceFilter};
use crate::reading::Measurement;
use crate::session::{
    Injection, Session, SessionError, SessionEvent, SessionOptions, SessionUpdate,
};
use crate::store::{JsonFileStore, Store};
use crate::timer::{parse_duration, parse_poll_interval};
use crate::transport::{self, Backend, Transport, TransportSettings};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use std::fmt;
use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Transport backend used to reach the sensing unit
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,

    /// Only connect to the device with this address.
    /// Format: --device 24:6F:28:AA:BB:CC
    #[arg(long, value_name = "ADDRESS")]
    pub device: Option<DeviceAddress>,

    /// Advertised name prefix of the sensing unit
    #[arg(long, default_value = DEFAULT_NAME_PREFIX)]
    pub name_prefix: String,

    /// How long to look for the device before giving up.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub scan_timeout: Duration,

    /// Delay between automatic reading requests while acquiring
    #[arg(long, default_value = "1500ms", value_parser = parse_poll_interval)]
    pub poll_interval: Duration,

    /// Command written to the device on every poll
    #[arg(long, default_value = DEFAULT_POLL_COMMAND)]
    pub poll_command: String,

    /// Directory holding the persisted measurements and survey configuration
    #[arg(long, default_value = "ert-data")]
    pub data_dir: PathBuf,

    /// Directory receiving export files
    #[arg(long, default_value = ".")]
    pub export_dir: PathBuf,

    /// Remove all recorded measurements whenever acquisition is started
    #[arg(long)]
    pub clear_on_start: bool,

    /// Verbose output, log every rejected message and poll request
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Options {
    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            filter: DeviceFilter {
                address: self.device,
                name_prefix: self.name_prefix.clone(),
            },
            scan_timeout: self.scan_timeout,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            poll_interval: self.poll_interval,
            poll_command: self.poll_command.clone(),
            clear_on_start: self.clear_on_start,
        }
    }
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One row of the `list` table.
struct Row<'a>(usize, &'a Measurement);

impl fmt::Display for Row<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Row(index, m) = self;
        let r = &m.reading;
        write!(
            f,
            "{:>4}  {:>15}  {:>4} {:>4} {:>4} {:>4}  {:>10.2}  {}",
            index,
            m.id,
            r.a,
            r.b,
            r.m,
            r.n,
            r.ra,
            m.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

fn write_list(session: &Session, out: &mut dyn Write) -> io::Result<()> {
    let measurements = session.ledger().measurements();
    if measurements.is_empty() {
        return writeln!(out, "No measurements");
    }
    writeln!(
        out,
        "{:>4}  {:>15}  {:>4} {:>4} {:>4} {:>4}  {:>10}  Timestamp",
        "#", "ID", "A", "B", "M", "N", "Rho_a"
    )?;
    for (i, m) in measurements.iter().enumerate() {
        writeln!(out, "{}", Row(i + 1, m))?;
    }
    Ok(())
}

fn write_status(session: &Session, out: &mut dyn Write) -> io::Result<()> {
    let state = session.connection();
    match (&state.device_name, state.connected, state.connecting) {
        (Some(name), true, _) => writeln!(out, "Device: {} (connected)", name)?,
        (_, _, true) => writeln!(out, "Device: connecting")?,
        _ => writeln!(out, "Device: not connected")?,
    }
    writeln!(out, "Acquisition: {}", session.phase())?;
    match session.pending() {
        Some(reading) => writeln!(out, "Pending: {}", reading)?,
        None => writeln!(out, "Pending: none")?,
    }
    writeln!(out, "Measurements: {}", session.ledger().len())?;
    let config = session.config();
    writeln!(
        out,
        "Survey: {} / {} / {}, {} m spacing",
        config.project_name, config.operator, config.array_type, config.electrode_spacing
    )?;
    if let Some(error) = &state.last_error {
        writeln!(out, "Last error: {}", error)?;
    }
    Ok(())
}

fn report(
    result: Result<String, SessionError>,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> io::Result<()> {
    match result {
        Ok(message) => writeln!(out, "{}", message),
        Err(e) if e.is_cancellation() => writeln!(out, "Connection cancelled"),
        Err(e) => writeln!(err, "error: {}", e),
    }
}

fn write_update(update: &SessionUpdate, out: &mut dyn Write, err: &mut dyn Write) -> io::Result<()> {
    match update {
        SessionUpdate::Reading(reading) => writeln!(out, "Reading: {}", reading),
        SessionUpdate::LinkLost => writeln!(err, "Device disconnected"),
        SessionUpdate::PollFailed(e) => writeln!(err, "warning: poll request failed: {}", e),
    }
}

async fn execute(
    session: &mut Session,
    command: OperatorCommand,
    options: &Options,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> io::Result<()> {
    let result = match command {
        OperatorCommand::Connect => session
            .connect()
            .await
            .map(|name| format!("Connected to {}", name)),
        OperatorCommand::Disconnect => session
            .disconnect()
            .await
            .map(|_| "Disconnected".to_string()),
        OperatorCommand::Start => session
            .start()
            .await
            .map(|_| "Acquisition started".to_string()),
        OperatorCommand::Accept => session
            .accept()
            .map(|m| format!("Recorded #{} {}", m.id, m.reading)),
        OperatorCommand::Repeat => session
            .repeat()
            .await
            .map(|_| "Repeat requested".to_string()),
        OperatorCommand::Stop => session
            .stop()
            .await
            .map(|_| "Acquisition stopped".to_string()),
        OperatorCommand::Delete(id) => Ok(if session.delete(id) {
            format!("Deleted #{}", id)
        } else {
            format!("No measurement #{}", id)
        }),
        OperatorCommand::Clear => {
            session.clear();
            Ok("Cleared all measurements".to_string())
        }
        OperatorCommand::List => return write_list(session, out),
        OperatorCommand::Status => return write_status(session, out),
        OperatorCommand::Export(format) => session
            .export(format, &options.export_dir, Utc::now().date_naive())
            .map(|path| format!("Wrote {}", path.display())),
        OperatorCommand::Set(update) => session.update_config(update).map(|_| {
            let config = session.config();
            format!(
                "Survey: {} / {} / {}, {} m spacing",
                config.project_name, config.operator, config.array_type, config.electrode_spacing
            )
        }),
        OperatorCommand::Simulate(message) => Ok(match session.simulate(&message) {
            Injection::Pending(reading) => format!("Reading: {}", reading),
            Injection::Stopped => "Ignored: acquisition is stopped".to_string(),
            Injection::Rejected => "Ignored: not a valid reading".to_string(),
        }),
        OperatorCommand::Help => return writeln!(out, "{}", HELP),
        OperatorCommand::Quit => return Ok(()),
    };
    report(result, out, err)
}

enum Step {
    Event(SessionEvent),
    Line(Option<String>),
}

/// Run the operator loop until `quit` or end of input, then tear the session down.
///
/// - Operator commands are read line by line from `input`; results go to `out`,
///   failures to `err`.
/// - Device events and poll ticks are handled between commands, with device
///   events taking priority.
pub async fn run_with_io(
    options: Options,
    transport: Box<dyn Transport>,
    store: Box<dyn Store>,
    input: impl AsyncBufRead + Unpin,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), RunError> {
    let mut session = Session::new(transport, store, options.session_options());
    writeln!(
        out,
        "{} measurements loaded. Type 'help' for commands.",
        session.ledger().len()
    )?;

    let mut lines = input.lines();
    let result = loop {
        let step = tokio::select! {
            biased;
            event = session.next_event() => Step::Event(event),
            line = lines.next_line() => match line {
                Ok(line) => Step::Line(line),
                Err(e) => break Err(e),
            },
        };

        let handled = match step {
            Step::Event(event) => session
                .handle_event(event)
                .await
                .iter()
                .try_for_each(|update| write_update(update, out, err)),
            Step::Line(None) => break Ok(()),
            Step::Line(Some(line)) => match parse_line(&line) {
                None => Ok(()),
                Some(Ok(OperatorCommand::Quit)) => break Ok(()),
                Some(Ok(command)) => execute(&mut session, command, &options, out, err).await,
                Some(Err(e)) => writeln!(err, "{}", e),
            },
        };
        if let Err(e) = handled {
            break Err(e);
        }
    };

    session.shutdown().await;
    result?;
    Ok(())
}

/// Run against the configured backend, the JSON store and the process stdio.
pub async fn run(options: Options) -> Result<(), RunError> {
    let transport = transport::open(options.backend, options.transport_settings());
    let store = Box::new(JsonFileStore::new(options.data_dir.clone()));
    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let mut out = io::stdout();
    let mut err = io::stderr();
    run_with_io(options, transport, store, input, &mut out, &mut err).await
}
