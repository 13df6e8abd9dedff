//! Acquisition state machine.
//!
//! Tracks whether the device is being polled and holds the single pending
//! reading waiting for the operator. The machine is synchronous and performs no
//! I/O: the controller asks it which command a transition needs, sends that
//! command, and only commits the transition once the send succeeded. A failed
//! send therefore leaves the state untouched.

use crate::reading::Reading;
use std::fmt;
use thiserror::Error;

/// Command word that starts an acquisition run.
pub const START_COMMAND: &str = "START";
/// Command word that asks the device to measure the current station again.
pub const REPEAT_COMMAND: &str = "REPEAT";
/// Command word that ends an acquisition run.
pub const STOP_COMMAND: &str = "STOP";
/// Default request sent on every poll tick.
pub const DEFAULT_POLL_COMMAND: &str = "READ";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("Not connected to a device")]
    NotConnected,
    #[error("Acquisition is already running")]
    AlreadyPolling,
    #[error("No reading to accept")]
    NoPendingReading,
}

/// Polling phase. The pending reading is tracked separately and may coexist
/// with any phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Polling,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Polling => write!(f, "polling"),
            Phase::Stopped => write!(f, "stopped"),
        }
    }
}

/// Operator actions that talk to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Repeat,
    Stop,
}

/// A command the device understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    Start,
    Repeat,
    Stop,
}

impl DeviceCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCommand::Start => START_COMMAND,
            DeviceCommand::Repeat => REPEAT_COMMAND,
            DeviceCommand::Stop => STOP_COMMAND,
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the poll timer must do once a command has been committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEffect {
    /// Begin a fresh run of the timer
    Restart,
    /// Leave the timer as it is
    Keep,
    /// Cancel the timer
    Cancel,
}

#[derive(Debug, Clone, Default)]
pub struct Acquisition {
    phase: Phase,
    pending: Option<Reading>,
}

impl Acquisition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_polling(&self) -> bool {
        self.phase == Phase::Polling
    }

    pub fn pending(&self) -> Option<&Reading> {
        self.pending.as_ref()
    }

    /// Decide which command an operator action needs, without changing state.
    ///
    /// Repeat while not polling behaves exactly like start. Stop is accepted in
    /// any phase so it can be issued repeatedly.
    pub fn plan(&self, action: Action, connected: bool) -> Result<DeviceCommand, AcquisitionError> {
        if !connected {
            return Err(AcquisitionError::NotConnected);
        }
        match action {
            Action::Start if self.is_polling() => Err(AcquisitionError::AlreadyPolling),
            Action::Start => Ok(DeviceCommand::Start),
            Action::Repeat if self.is_polling() => Ok(DeviceCommand::Repeat),
            Action::Repeat => Ok(DeviceCommand::Start),
            Action::Stop => Ok(DeviceCommand::Stop),
        }
    }

    /// Apply the transition for a command that was sent successfully.
    pub fn commit(&mut self, command: DeviceCommand) -> TimerEffect {
        match command {
            DeviceCommand::Start => {
                self.phase = Phase::Polling;
                TimerEffect::Restart
            }
            DeviceCommand::Repeat => TimerEffect::Keep,
            DeviceCommand::Stop => {
                self.phase = Phase::Stopped;
                TimerEffect::Cancel
            }
        }
    }

    /// Stash an incoming reading, replacing any pending one.
    ///
    /// Returns `false` when the reading was ignored because the run was stopped.
    pub fn offer(&mut self, reading: Reading) -> bool {
        if self.phase == Phase::Stopped {
            return false;
        }
        self.pending = Some(reading);
        true
    }

    /// Remove the pending reading for commitment to the ledger.
    pub fn take_pending(&mut self) -> Result<Reading, AcquisitionError> {
        self.pending.take().ok_or(AcquisitionError::NoPendingReading)
    }

    pub fn clear_pending(&mut self) {
        self.pending = None;
    }

    /// The link is gone: back to idle and drop the pending reading.
    pub fn on_disconnect(&mut self) {
        self.phase = Phase::Idle;
        self.pending = None;
    }
}
