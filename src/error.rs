//! Error types for every stage of the record pipeline.
//!
//! Cipher and codec errors are local to a single record. A caller discards the
//! offending record and keeps going, nothing here is fatal to the process.

use crate::protocol::PropertyKind;

/// The key handed to the cipher is unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Key must be exactly 16 bytes long, got {0}")]
    InvalidKeyLength(usize),
    #[error("Key is not a valid hex string: {0}")]
    InvalidKeyHex(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    #[error("Cipher used before a key was set")]
    NotInitialized,
    #[error("Buffer length {0} is not a positive multiple of 4")]
    MisalignedLength(usize),
}

/// A record could not be turned into a property.
///
/// Out of range values usually mean a transmission error or a wrong key.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("Record too short: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error("Implausible {field} value: {value}")]
    OutOfRange { field: &'static str, value: f32 },
    #[error("Minimum temperature {min} is not below maximum temperature {max}")]
    InvalidRange { min: f32, max: f32 },
    #[error("Unknown device mode: {0}")]
    UnknownMode(u8),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error("Cannot encode {field} value: {value}")]
    OutOfRange { field: &'static str, value: f32 },
    #[error("Minimum temperature {min} is not below maximum temperature {max}")]
    InvalidRange { min: f32, max: f32 },
}

/// Failure reported by a [`crate::link::Link`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("Link is not connected")]
    NotConnected,
    #[error("Link request timed out")]
    Timeout,
    #[error("Link transport error: {0}")]
    Transport(String),
}

/// Failure while executing a single command.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("No {0} value to write")]
    NoValue(PropertyKind),
}

/// A command was rejected by the queue. The command is handed back.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("Command queue is full")]
    Full(crate::command::Command),
    #[error("Command queue is closed")]
    Closed(crate::command::Command),
}

impl PushError {
    /// Takes back the rejected command, e.g. to retry it later.
    pub fn into_command(self) -> crate::command::Command {
        match self {
            PushError::Full(cmd) | PushError::Closed(cmd) => cmd,
        }
    }
}

/// Represents every error this crate can produce.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Push(#[from] PushError),
}

pub type Result<T> = std::result::Result<T, Error>;
