//! `ert-acquire` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing and process exit codes.
//! The acquisition pipeline lives in [`crate::session`], driven by the operator
//! loop in [`crate::app`], where it can be tested deterministically with an
//! injected transport, store and input stream.
//!
//! Data flows transport → [`framing`] → [`parser`] → [`acquisition`] →
//! [`ledger`] → [`export`].

pub mod acquisition;
pub mod app;
pub mod command;
pub mod device;
pub mod export;
pub mod framing;
pub mod ledger;
pub mod logging;
pub mod parser;
pub mod reading;
pub mod session;
pub mod store;
pub mod survey;
pub mod timer;
pub mod transport;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use acquisition::{Acquisition, AcquisitionError, Phase};
pub use device::{DeviceAddress, DeviceFilter};
pub use export::{ExportFormat, Exporter};
pub use framing::FrameReassembler;
pub use ledger::Ledger;
pub use parser::{ParseError, parse_message};
pub use reading::{Measurement, MeasurementId, Reading};
pub use session::{Injection, Session, SessionError, SessionOptions};
pub use store::{JsonFileStore, MemoryStore, Store, StoreError};
pub use survey::{ArrayType, ConfigUpdate, SurveyConfig};
pub use timer::{PollTimer, parse_duration};
pub use transport::{Backend, Transport, TransportError, TransportEvent};
