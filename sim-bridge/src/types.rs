//! Core types for the callback bridge
//!
//! This module defines the values that cross the native/host boundary: the
//! status codes returned to the engine, the error taxonomy, and the host-level
//! requests built from raw callback arguments.

use serde::{Deserialize, Serialize};
use std::ffi::c_void;
use std::fmt;
use std::str::FromStr;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur while bridging callbacks
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("No live host context for handle 0x{0:X}")]
    MissingContext(usize),

    #[error("Malformed native payload: {0}")]
    Marshal(String),

    #[error("{kind} handler failed: {error:#}")]
    HostHandler {
        kind: CallbackKind,
        error: anyhow::Error,
    },

    #[error("Native library rejected the {kind} callback: {reason}")]
    RegistrationFailed { kind: CallbackKind, reason: String },

    #[error("Bridge runtime is not initialized")]
    NotInitialized,

    #[error("Bridge runtime is already initialized")]
    AlreadyInitialized,

    #[error("Host context '{0}' is already bound to an open session")]
    ContextInUse(String),

    #[error("Cannot shut down with {0} context(s) still registered")]
    ContextsRegistered(usize),

    #[error("Failed to load native library: {0}")]
    Library(#[from] libloading::Error),

    #[error("Native library does not export `{name}`: {reason}")]
    MissingSymbol { name: String, reason: String },

    #[error("Unknown event: {0}")]
    UnknownEvent(String),
}

impl BridgeError {
    /// Native status code reported for this error
    pub fn status(&self) -> Status {
        match self {
            BridgeError::MissingContext(_) | BridgeError::NotInitialized => Status::MissingContext,
            BridgeError::Marshal(_) => Status::MarshalError,
            _ => Status::HostHandlerError,
        }
    }
}

/// Status codes returned to the native library by value-returning callbacks
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Success = 0,
    MissingContext = 1,
    MarshalError = 2,
    HostHandlerError = 3,
}

impl Status {
    /// Collapse an operation result into a status code
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Status::Success,
            Err(e) => e.status(),
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<Status> for i32 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

/// The six callback shapes the engine can invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackKind {
    Plot,
    Write,
    InitControls,
    CheckControls,
    StepControls,
    Event,
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallbackKind::Plot => "plot",
            CallbackKind::Write => "write",
            CallbackKind::InitControls => "init-controls",
            CallbackKind::CheckControls => "check-controls",
            CallbackKind::StepControls => "step-controls",
            CallbackKind::Event => "event",
        };
        f.write_str(name)
    }
}

/// Phase of the engine's control iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlPhase {
    Init,
    Check,
    Step,
}

impl ControlPhase {
    pub const ALL: [ControlPhase; 3] = [ControlPhase::Init, ControlPhase::Check, ControlPhase::Step];

    pub fn callback_kind(self) -> CallbackKind {
        match self {
            ControlPhase::Init => CallbackKind::InitControls,
            ControlPhase::Check => CallbackKind::CheckControls,
            ControlPhase::Step => CallbackKind::StepControls,
        }
    }
}

/// Message-type tag carried by the write callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Error,
    General,
    Info,
    Help,
    Progress,
    ProgressCaption,
    ProgressFormCaption,
    ProgressPercent,
    FireOffEditor,
    /// A tag this bridge does not know about, kept verbatim
    Unknown(i32),
}

impl MessageType {
    pub fn from_raw(tag: i32) -> Self {
        match tag {
            -1 => MessageType::Error,
            0 => MessageType::General,
            1 => MessageType::Info,
            2 => MessageType::Help,
            3 => MessageType::Progress,
            4 => MessageType::ProgressCaption,
            5 => MessageType::ProgressFormCaption,
            6 => MessageType::ProgressPercent,
            7 => MessageType::FireOffEditor,
            other => MessageType::Unknown(other),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            MessageType::Error => -1,
            MessageType::General => 0,
            MessageType::Info => 1,
            MessageType::Help => 2,
            MessageType::Progress => 3,
            MessageType::ProgressCaption => 4,
            MessageType::ProgressFormCaption => 5,
            MessageType::ProgressPercent => 6,
            MessageType::FireOffEditor => 7,
            MessageType::Unknown(tag) => tag,
        }
    }

    /// Progress updates are chatty and carry no user-facing text
    pub fn is_progress(self) -> bool {
        matches!(
            self,
            MessageType::Progress
                | MessageType::ProgressCaption
                | MessageType::ProgressFormCaption
                | MessageType::ProgressPercent
        )
    }
}

/// Event code of the event notification callback
///
/// Codes 0-2 mirror the classic control-iteration events; the engine may
/// send codes beyond the named ones, so any integer is representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventCode(pub i32);

impl EventCode {
    pub const INIT_CONTROLS: EventCode = EventCode(0);
    pub const CHECK_CONTROLS: EventCode = EventCode(1);
    pub const STEP_CONTROLS: EventCode = EventCode(2);
    pub const CLEAR: EventCode = EventCode(3);
    pub const REPROCESS_BUSES: EventCode = EventCode(4);
    pub const BUILD_SYSTEM_Y: EventCode = EventCode(5);

    const NAMED: [(EventCode, &'static str); 6] = [
        (EventCode::INIT_CONTROLS, "init_controls"),
        (EventCode::CHECK_CONTROLS, "check_controls"),
        (EventCode::STEP_CONTROLS, "step_controls"),
        (EventCode::CLEAR, "clear"),
        (EventCode::REPROCESS_BUSES, "reprocess_buses"),
        (EventCode::BUILD_SYSTEM_Y, "build_system_y"),
    ];

    pub fn name(self) -> Option<&'static str> {
        Self::NAMED.iter().find(|(code, _)| *code == self).map(|(_, name)| *name)
    }

    /// Legacy control events are delivered without step or payload
    pub fn is_legacy(self) -> bool {
        (0..=2).contains(&self.0)
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "event#{}", self.0),
        }
    }
}

impl FromStr for EventCode {
    type Err = BridgeError;

    /// Accepts `build_system_y`, `BuildSystemY`, `Legacy_InitControls` or a bare integer
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<i32>() {
            return Ok(EventCode(code));
        }

        let normalized: String = trimmed
            .strip_prefix("Legacy_")
            .or_else(|| trimmed.strip_prefix("legacy_"))
            .unwrap_or(trimmed)
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        Self::NAMED
            .iter()
            .find(|(_, name)| name.replace('_', "") == normalized)
            .map(|(code, _)| *code)
            .ok_or_else(|| BridgeError::UnknownEvent(s.to_string()))
    }
}

/// A plot request: the parameter text sent by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotRequest {
    params: String,
}

impl PlotRequest {
    pub fn new(params: impl Into<String>) -> Self {
        Self {
            params: params.into(),
        }
    }

    /// Raw parameter text, exactly as received
    pub fn params(&self) -> &str {
        &self.params
    }

    /// Parse the parameters as JSON (the engine serializes plot settings this way)
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.params)
    }

    /// The `PlotType` entry of JSON parameters, if present
    pub fn plot_type(&self) -> Option<String> {
        self.json()
            .ok()?
            .get("PlotType")?
            .as_str()
            .map(str::to_string)
    }
}

/// A message emitted through the write callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub kind: MessageType,
}

/// An event notification
///
/// The payload pointer belongs to the engine and is only valid for the
/// duration of the callback.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub code: EventCode,
    pub step: i32,
    pub payload: *mut c_void,
}

impl Event {
    pub fn has_payload(&self) -> bool {
        !self.payload.is_null()
    }
}
