//! Error types - protocol violations and lifecycle failures
//!
//! Two tiers:
//! - `ProtocolError`: producer and consumer of the shared stack disagree.
//!   Never recovered from; the runtime turns it into a panic or an abort.
//! - `RuntimeError`: lifecycle and configuration failures reported to callers.
//!
//! Business failures of native operations are not errors at this level; they
//! travel through the exception channel.

use crate::stack::Tag;
use std::fmt;
use std::path::PathBuf;

/// Violation of the stack/registry protocol between generated call sites
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    TagMismatch { expected: Tag, found: Tag },
    StackUnderflow { expected: Tag },
    UnknownModule { name: String },
    UnknownMethod { module: String, name: String },
    UnknownInterface { module: String, name: String },
    UnknownInterfaceMethod { interface: String, name: String },
    UnknownException { module: String, name: String },
    UnknownHandle { kind: &'static str, raw: usize },
    UnknownServerInstance { id: i32 },
    UnknownServerFunc { id: i32 },
    DoubleRelease { space: &'static str, id: i32 },
    InstanceInUse { id: i32, pins: u32 },
    InstanceSpaceMismatch { expected: &'static str, id: i32 },
    InstanceTypeMismatch { id: i32, expected: &'static str, found: &'static str },
    StaleInstance { id: i32, issued_epoch: u64 },
    StaleTransient { issued_epoch: u64, current_epoch: u64 },
    TransientTypeMismatch { expected: &'static str },
    MissingImplementation { interface: String, method: String },
    NullPointer { argument: &'static str },
    InvalidUtf8 { argument: &'static str },
    IdsExhausted { space: &'static str },
    NotInitialized,
    DispatchAbandoned,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TagMismatch { expected, found } => {
                write!(f, "stack tag mismatch: expected {}, found {}", expected, found)
            }
            Self::StackUnderflow { expected } => {
                write!(f, "stack underflow while popping {}", expected)
            }
            Self::UnknownModule { name } => write!(f, "unknown module '{}'", name),
            Self::UnknownMethod { module, name } => {
                write!(f, "unknown method '{}' in module '{}'", name, module)
            }
            Self::UnknownInterface { module, name } => {
                write!(f, "unknown interface '{}' in module '{}'", name, module)
            }
            Self::UnknownInterfaceMethod { interface, name } => {
                write!(f, "unknown method '{}' on interface '{}'", name, interface)
            }
            Self::UnknownException { module, name } => {
                write!(f, "unknown exception '{}' in module '{}'", name, module)
            }
            Self::UnknownHandle { kind, raw } => {
                write!(f, "{:#x} is not a live {} handle", raw, kind)
            }
            Self::UnknownServerInstance { id } => write!(f, "unknown server instance {}", id),
            Self::UnknownServerFunc { id } => write!(f, "unknown server function {}", id),
            Self::DoubleRelease { space, id } => {
                write!(f, "double release of {} id {}", space, id)
            }
            Self::InstanceInUse { id, pins } => {
                write!(f, "server instance {} released while pinned by {} call(s)", id, pins)
            }
            Self::InstanceSpaceMismatch { expected, id } => {
                write!(f, "expected a {} instance, got id {} from the other space", expected, id)
            }
            Self::InstanceTypeMismatch { id, expected, found } => {
                write!(f, "server instance {} is a {}, not a {}", id, found, expected)
            }
            Self::StaleInstance { id, issued_epoch } => {
                write!(
                    f,
                    "transient server instance {} from safety epoch {} used after clear",
                    id, issued_epoch
                )
            }
            Self::StaleTransient { issued_epoch, current_epoch } => {
                write!(
                    f,
                    "transient handle from safety epoch {} used in epoch {}",
                    issued_epoch, current_epoch
                )
            }
            Self::TransientTypeMismatch { expected } => {
                write!(f, "transient handle does not hold a {}", expected)
            }
            Self::MissingImplementation { interface, method } => {
                write!(f, "no native implementation of {}.{}", interface, method)
            }
            Self::NullPointer { argument } => write!(f, "null pointer passed as {}", argument),
            Self::InvalidUtf8 { argument } => write!(f, "{} is not valid UTF-8", argument),
            Self::IdsExhausted { space } => write!(f, "{} ids exhausted", space),
            Self::NotInitialized => write!(f, "runtime used before init"),
            Self::DispatchAbandoned => {
                write!(f, "callback hand-off abandoned before completion")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Lifecycle and configuration errors
#[derive(Debug)]
pub enum RuntimeError {
    AlreadyInitialized,
    ConfigRead { path: PathBuf, source: std::io::Error },
    ConfigParse(toml::de::Error),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized => write!(f, "runtime already initialized"),
            Self::ConfigRead { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            Self::ConfigParse(err) => write!(f, "invalid config: {}", err),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigRead { source, .. } => Some(source),
            Self::ConfigParse(err) => Some(err),
            Self::AlreadyInitialized => None,
        }
    }
}

impl From<toml::de::Error> for RuntimeError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigParse(err)
    }
}

impl RuntimeError {
    /// Status code reported through the C ABI
    pub const fn status(&self) -> i32 {
        match self {
            Self::AlreadyInitialized => 1,
            Self::ConfigRead { .. } => 2,
            Self::ConfigParse(_) => 3,
        }
    }
}
