//! Read and write requests against a single property.
//!
//! A [`Property`] is a shared slot holding the last value decoded for one
//! record. A [`Command`] refers to a property and moves through
//! [`CommandState`] as it travels through the queue and is executed.
//!
//! Write commands can only be built for [`WritableRecord`]s, so writing a
//! read only property is a compile error rather than a runtime failure.

use crate::error::{CommandError, DecodeError};
use crate::link::Link;
use crate::protocol::{PropertyKind, Record, WritableRecord};
use crate::xxtea::Xxtea;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared slot for the latest value of one record.
///
/// Cloning is cheap and every clone refers to the same slot.
pub struct Property<T> {
    cell: Arc<Cell<T>>,
}

struct Cell<T> {
    cipher: Arc<Xxtea>,
    value: Mutex<Option<T>>,
}

impl<T> Cell<T> {
    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: Record> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("kind", &T::KIND)
            .field("value", &*self.cell.lock())
            .finish()
    }
}

impl<T: Record> Property<T> {
    /// Creates an empty property decoded with `cipher`.
    pub fn new(cipher: Arc<Xxtea>) -> Self {
        Self {
            cell: Arc::new(Cell {
                cipher,
                value: Mutex::new(None),
            }),
        }
    }

    pub fn kind(&self) -> PropertyKind {
        T::KIND
    }

    /// The last value read from, or set for, the valve.
    pub fn value(&self) -> Option<T> {
        self.cell.lock().clone()
    }

    /// Replaces the local value. Queue a [`Command::write`] to send it.
    pub fn set_value(&self, value: T) {
        *self.cell.lock() = Some(value);
    }

    /// Changes the local value in place. Returns `None` if nothing was read yet.
    pub fn modify<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.cell.lock().as_mut().map(f)
    }

    /// Decodes an unsolicited notification from the link and stores the value.
    ///
    /// On error the previous value is kept.
    pub fn handle_notification(&self, raw: &[u8]) -> Result<(), DecodeError> {
        self.cell.store(raw)
    }

    #[cfg(test)]
    pub(crate) fn handle_count(&self) -> usize {
        Arc::strong_count(&self.cell)
    }
}

impl<T: Record> Cell<T> {
    fn store(&self, raw: &[u8]) -> Result<(), DecodeError> {
        match T::decode(&self.cipher, raw) {
            Ok(value) => {
                log::debug!("{} updated: {value:?}", T::KIND);
                *self.lock() = Some(value);
                Ok(())
            }
            Err(err) => {
                log::warn!("Discarding {} record: {err}", T::KIND);
                Err(err)
            }
        }
    }
}

trait ReadTarget: Send + Sync {
    fn kind(&self) -> PropertyKind;
    fn read_from(&self, link: &mut dyn Link) -> Result<(), CommandError>;
}

trait WriteTarget: ReadTarget {
    fn write_to(&self, link: &mut dyn Link) -> Result<(), CommandError>;
}

impl<T: Record> ReadTarget for Cell<T> {
    fn kind(&self) -> PropertyKind {
        T::KIND
    }

    fn read_from(&self, link: &mut dyn Link) -> Result<(), CommandError> {
        let raw = link.read(T::KIND)?;
        Ok(self.store(&raw)?)
    }
}

impl<T: WritableRecord> WriteTarget for Cell<T> {
    fn write_to(&self, link: &mut dyn Link) -> Result<(), CommandError> {
        let value = self.lock().clone().ok_or(CommandError::NoValue(T::KIND))?;
        let raw = value.encode(&self.cipher)?;
        link.write(T::KIND, &raw)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Waiting in the queue.
    Pending,
    /// Taken from the queue and being executed.
    InFlight,
    Completed,
    Failed,
}

enum Operation {
    Read(Arc<dyn ReadTarget>),
    Write(Arc<dyn WriteTarget>),
}

/// A single request to the valve.
pub struct Command {
    operation: Operation,
    state: CommandState,
}

impl Command {
    /// Reads the record of `property` and stores the decoded value in it.
    pub fn read<T: Record>(property: &Property<T>) -> Self {
        Self {
            operation: Operation::Read(property.cell.clone()),
            state: CommandState::Pending,
        }
    }

    /// Encodes the current value of `property` and writes it to the valve.
    pub fn write<T: WritableRecord>(property: &Property<T>) -> Self {
        Self {
            operation: Operation::Write(property.cell.clone()),
            state: CommandState::Pending,
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self.operation {
            Operation::Read(_) => CommandKind::Read,
            Operation::Write(_) => CommandKind::Write,
        }
    }

    pub fn property_kind(&self) -> PropertyKind {
        match &self.operation {
            Operation::Read(target) => target.kind(),
            Operation::Write(target) => target.kind(),
        }
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: CommandState) {
        self.state = state;
    }

    /// Runs the command against `link` and waits for the response.
    ///
    /// Nothing is retried. A failed command stays [`CommandState::Failed`],
    /// the producer may queue a fresh one.
    pub fn execute(&mut self, link: &mut dyn Link) -> Result<(), CommandError> {
        self.state = CommandState::InFlight;
        let result = match &self.operation {
            Operation::Read(target) => target.read_from(link),
            Operation::Write(target) => target.write_to(link),
        };
        self.state = match result {
            Ok(()) => CommandState::Completed,
            Err(_) => CommandState::Failed,
        };
        result
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("kind", &self.kind())
            .field("property", &self.property_kind())
            .field("state", &self.state)
            .finish()
    }
}
