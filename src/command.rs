//! Operator command surface.
//!
//! One command per input line. Arguments are separated by whitespace except
//! for free-text values (`set project`, `set operator`, `simulate`), which take
//! the rest of the line verbatim.

use crate::export::ExportFormat;
use crate::reading::MeasurementId;
use crate::survey::{ArrayType, ConfigError, ConfigUpdate, validate_spacing};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("Unknown command '{0}' (type 'help' for a list)")]
    Unknown(String),
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("Invalid measurement id '{0}'")]
    InvalidId(String),
    #[error("Invalid number '{0}'")]
    InvalidNumber(String),
    #[error("{0}")]
    Format(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    Connect,
    Disconnect,
    Start,
    Accept,
    Repeat,
    Stop,
    Delete(MeasurementId),
    Clear,
    List,
    Status,
    Export(ExportFormat),
    Set(ConfigUpdate),
    Simulate(String),
    Help,
    Quit,
}

/// Text printed by the `help` command.
pub const HELP: &str = "\
Commands:
  connect | disconnect          open or close the device link
  start                         start acquisition and polling
  next | accept                 record the pending reading
  repeat                        measure again (starts polling if idle)
  stop                          stop acquisition
  delete <id>                   remove one measurement
  clear                         remove all measurements
  list | status                 show measurements or session state
  export dat|csv                write an export file
  set array <dd|wenner|schlumberger>
  set spacing <meters>
  set project <name>
  set operator <name>
  simulate <message>            inject a device message
  quit";

/// Split off the first whitespace-delimited word.
fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(pos) => (&input[..pos], input[pos..].trim()),
        None => (input, ""),
    }
}

fn parse_set(args: &str) -> Result<ConfigUpdate, CommandError> {
    let (field, value) = split_word(args);
    if field.is_empty() {
        return Err(CommandError::MissingArgument("field"));
    }
    if value.is_empty() {
        return Err(CommandError::MissingArgument("value"));
    }
    match field.to_lowercase().as_str() {
        "array" => Ok(ConfigUpdate::ArrayType(value.parse::<ArrayType>()?)),
        "spacing" => {
            let spacing: f64 = value
                .parse()
                .map_err(|_| CommandError::InvalidNumber(value.to_string()))?;
            Ok(ConfigUpdate::ElectrodeSpacing(validate_spacing(spacing)?))
        }
        "project" => Ok(ConfigUpdate::ProjectName(value.to_string())),
        "operator" => Ok(ConfigUpdate::Operator(value.to_string())),
        other => Err(CommandError::Unknown(format!("set {}", other))),
    }
}

impl FromStr for OperatorCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (word, args) = split_word(line);
        match word.to_lowercase().as_str() {
            "connect" => Ok(OperatorCommand::Connect),
            "disconnect" => Ok(OperatorCommand::Disconnect),
            "start" => Ok(OperatorCommand::Start),
            "next" | "accept" => Ok(OperatorCommand::Accept),
            "repeat" => Ok(OperatorCommand::Repeat),
            "stop" => Ok(OperatorCommand::Stop),
            "delete" | "rm" => {
                if args.is_empty() {
                    return Err(CommandError::MissingArgument("id"));
                }
                let id: u64 = args
                    .parse()
                    .map_err(|_| CommandError::InvalidId(args.to_string()))?;
                Ok(OperatorCommand::Delete(MeasurementId(id)))
            }
            "clear" => Ok(OperatorCommand::Clear),
            "list" | "ls" => Ok(OperatorCommand::List),
            "status" => Ok(OperatorCommand::Status),
            "export" => {
                if args.is_empty() {
                    return Err(CommandError::MissingArgument("format"));
                }
                args.parse()
                    .map(OperatorCommand::Export)
                    .map_err(CommandError::Format)
            }
            "set" => parse_set(args).map(OperatorCommand::Set),
            "simulate" | "sim" => {
                if args.is_empty() {
                    return Err(CommandError::MissingArgument("message"));
                }
                Ok(OperatorCommand::Simulate(args.to_string()))
            }
            "help" | "?" => Ok(OperatorCommand::Help),
            "quit" | "exit" => Ok(OperatorCommand::Quit),
            _ => Err(CommandError::Unknown(word.to_string())),
        }
    }
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<Result<OperatorCommand, CommandError>> {
    if line.trim().is_empty() {
        None
    } else {
        Some(line.parse())
    }
}
