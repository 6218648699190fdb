//! Bounded FIFO between command producers and the single drain context.
//!
//! Producers (polling timers, user requests) push from any thread. One drain
//! context pops a command, executes it against the link and only then pops
//! the next one, because the link allows one outstanding request.
//!
//! ```
//! use danfoss_eco_lib::{
//!     command::{Command, Property},
//!     link::MemoryLink,
//!     protocol::BatteryLevel,
//!     queue::CommandQueue,
//!     xxtea::Xxtea,
//! };
//! use std::sync::Arc;
//!
//! let battery = Property::<BatteryLevel>::new(Arc::new(Xxtea::new()));
//! let queue = CommandQueue::new();
//! queue.push(Command::read(&battery)).unwrap();
//!
//! let mut link = MemoryLink::new().with_record(battery.kind(), [64]);
//! let report = queue.drain(&mut link);
//! assert_eq!(report.completed, 1);
//! assert_eq!(*battery.value().unwrap(), 64);
//! ```

use crate::command::{Command, CommandState};
use crate::error::{CommandError, PushError};
use crate::link::Link;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

pub const DEFAULT_CAPACITY: usize = 32;

/// How often a blocked producer retries.
const CHECK_INTERVAL: Duration = Duration::from_millis(1);

/// What a push does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushPolicy {
    /// Hand the command back immediately.
    #[default]
    Reject,
    /// Wait up to the given time for a free slot.
    Block(Duration),
}

/// Thread safe bounded command queue. Share it with an `Arc`.
///
/// Both ends of a bounded channel live in the queue, producers only ever use
/// the non-blocking side of it so no async runtime is needed. Commands still
/// queued when the queue is closed or dropped are released.
#[derive(Debug)]
pub struct CommandQueue {
    sender: mpsc::Sender<Command>,
    receiver: Mutex<mpsc::Receiver<Command>>,
    capacity: usize,
}

/// Outcome of [`CommandQueue::drain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    pub completed: usize,
    pub failed: usize,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    /// Creates a queue with [`DEFAULT_CAPACITY`] slots.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a queue with `capacity` slots, at least one.
    pub fn with_capacity(capacity: usize) -> Self {
        if capacity == 0 {
            log::warn!("Command queue capacity 0 is not usable, using 1");
        }
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            capacity,
        }
    }

    fn receiver(&self) -> MutexGuard<'_, mpsc::Receiver<Command>> {
        self.receiver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a command without waiting.
    pub fn push(&self, mut cmd: Command) -> Result<(), PushError> {
        cmd.set_state(CommandState::Pending);
        self.sender.try_send(cmd).map_err(|err| match err {
            TrySendError::Full(cmd) => PushError::Full(cmd),
            TrySendError::Closed(cmd) => PushError::Closed(cmd),
        })
    }

    /// Appends a command, waiting up to `timeout` for a free slot.
    pub fn push_timeout(&self, cmd: Command, timeout: Duration) -> Result<(), PushError> {
        let start = Instant::now();
        let mut cmd = cmd;
        loop {
            match self.push(cmd) {
                Err(PushError::Full(rejected)) => {
                    let elapsed = start.elapsed();
                    if elapsed >= timeout {
                        log::warn!("Command queue full for {timeout:?}, rejecting {rejected:?}");
                        return Err(PushError::Full(rejected));
                    }
                    std::thread::sleep(CHECK_INTERVAL.min(timeout - elapsed));
                    cmd = rejected;
                }
                result => return result,
            }
        }
    }

    pub fn push_with(&self, cmd: Command, policy: PushPolicy) -> Result<(), PushError> {
        match policy {
            PushPolicy::Reject => {
                let result = self.push(cmd);
                if let Err(PushError::Full(rejected)) = &result {
                    log::warn!(
                        "Command queue full ({} entries), rejecting {rejected:?}",
                        self.capacity
                    );
                }
                result
            }
            PushPolicy::Block(timeout) => self.push_timeout(cmd, timeout),
        }
    }

    /// Takes the oldest command. Never blocks.
    pub fn pop(&self) -> Option<Command> {
        let mut cmd = match self.receiver().try_recv() {
            Ok(cmd) => cmd,
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => return None,
        };
        cmd.set_state(CommandState::InFlight);
        Some(cmd)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Rejects all further pushes and releases the queued commands.
    ///
    /// Returns the number of commands released. Producers waiting in
    /// [`CommandQueue::push_timeout`] give up with [`PushError::Closed`].
    pub fn close(&self) -> usize {
        let mut receiver = self.receiver();
        receiver.close();
        let mut released = 0;
        while receiver.try_recv().is_ok() {
            released += 1;
        }
        if released > 0 {
            log::debug!("Command queue closed, releasing {released} commands");
        }
        released
    }

    /// Pops and executes one command.
    ///
    /// The executed command is returned in its terminal state together with
    /// the result, the caller decides whether to queue a retry.
    pub fn execute_next(
        &self,
        link: &mut dyn Link,
    ) -> Option<(Command, Result<(), CommandError>)> {
        let mut cmd = self.pop()?;
        log::debug!("Executing {cmd:?}");
        let result = cmd.execute(link);
        if let Err(err) = &result {
            log::warn!(
                "{:?} {} command failed: {err}",
                cmd.kind(),
                cmd.property_kind()
            );
        }
        Some((cmd, result))
    }

    /// Executes commands one at a time until the queue is empty.
    pub fn drain(&self, link: &mut dyn Link) -> DrainReport {
        let mut report = DrainReport::default();
        while let Some((_, result)) = self.execute_next(link) {
            match result {
                Ok(()) => report.completed += 1,
                Err(_) => report.failed += 1,
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandKind, Property};
    use crate::error::LinkError;
    use crate::link::MemoryLink;
    use crate::protocol::{BatteryLevel, Errors, PropertyKind, Temperature};
    use crate::xxtea::Xxtea;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use std::time::Instant;

    fn battery() -> Property<BatteryLevel> {
        Property::new(Arc::new(Xxtea::new()))
    }

    #[test]
    fn fifo_order() {
        let cipher = Arc::new(Xxtea::new());
        let temperature = Property::<Temperature>::new(cipher.clone());
        let errors = Property::<Errors>::new(cipher.clone());
        let battery = Property::<BatteryLevel>::new(cipher);

        let queue = CommandQueue::new();
        assert!(queue.is_empty());
        queue.push(Command::read(&temperature)).unwrap();
        queue.push(Command::write(&temperature)).unwrap();
        queue.push(Command::read(&errors)).unwrap();
        queue.push(Command::read(&battery)).unwrap();
        assert_eq!(queue.len(), 4);

        let order: Vec<_> = std::iter::from_fn(|| queue.pop())
            .map(|cmd| (cmd.kind(), cmd.property_kind()))
            .collect();
        assert_eq!(
            order,
            vec![
                (CommandKind::Read, PropertyKind::Temperature),
                (CommandKind::Write, PropertyKind::Temperature),
                (CommandKind::Read, PropertyKind::Errors),
                (CommandKind::Read, PropertyKind::Battery),
            ]
        );
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn zero_capacity_holds_one_command() {
        let battery = battery();
        let queue = CommandQueue::with_capacity(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(Command::read(&battery)).unwrap();
        assert_matches!(queue.push(Command::read(&battery)), Err(PushError::Full(..)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn pop_marks_in_flight() {
        let queue = CommandQueue::new();
        queue.push(Command::read(&battery())).unwrap();
        assert_eq!(queue.pop().unwrap().state(), CommandState::InFlight);
    }

    #[test]
    fn full_queue_rejects() {
        let battery = battery();
        let queue = CommandQueue::new();
        for _ in 0..DEFAULT_CAPACITY {
            queue.push(Command::read(&battery)).unwrap();
        }
        let rejected = queue.push(Command::read(&battery));
        assert_matches!(rejected, Err(PushError::Full(..)));
        assert_eq!(queue.len(), DEFAULT_CAPACITY);

        // the producer gets its command back and can retry after a pop
        let cmd = rejected.unwrap_err().into_command();
        queue.pop().unwrap();
        queue.push(cmd).unwrap();
        assert_eq!(queue.len(), DEFAULT_CAPACITY);
    }

    #[test]
    fn push_timeout_expires() {
        let battery = battery();
        let queue = CommandQueue::with_capacity(1);
        queue.push(Command::read(&battery)).unwrap();

        let start = Instant::now();
        assert_matches!(
            queue.push_timeout(Command::read(&battery), Duration::from_millis(20)),
            Err(PushError::Full(..))
        );
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn push_timeout_waits_for_pop() {
        let battery = battery();
        let queue = Arc::new(CommandQueue::with_capacity(1));
        queue.push(Command::read(&battery)).unwrap();

        let consumer = {
            let queue = queue.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                queue.pop().is_some()
            })
        };
        queue
            .push_with(
                Command::read(&battery),
                PushPolicy::Block(Duration::from_secs(5)),
            )
            .unwrap();
        assert!(consumer.join().unwrap());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn close_releases_commands() {
        let battery = battery();
        let queue = CommandQueue::new();
        for _ in 0..3 {
            queue.push(Command::read(&battery)).unwrap();
        }
        assert_eq!(battery.handle_count(), 4);

        assert_eq!(queue.close(), 3);
        assert_eq!(battery.handle_count(), 1);
        assert!(queue.is_closed());
        assert_matches!(queue.push(Command::read(&battery)), Err(PushError::Closed(..)));
    }

    #[test]
    fn drop_releases_commands() {
        let battery = battery();
        {
            let queue = CommandQueue::new();
            queue.push(Command::read(&battery)).unwrap();
            queue.push(Command::read(&battery)).unwrap();
            assert_eq!(battery.handle_count(), 3);
        }
        assert_eq!(battery.handle_count(), 1);
    }

    #[test]
    fn close_wakes_blocked_producer() {
        let battery = battery();
        let queue = Arc::new(CommandQueue::with_capacity(1));
        queue.push(Command::read(&battery)).unwrap();

        let producer = {
            let queue = queue.clone();
            let battery = battery.clone();
            std::thread::spawn(move || {
                queue.push_timeout(Command::read(&battery), Duration::from_secs(10))
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        queue.close();
        assert_matches!(producer.join().unwrap(), Err(PushError::Closed(..)));
    }

    #[test]
    fn drain_reports_failures_without_retry() {
        let battery = battery();
        let queue = CommandQueue::new();
        queue.push(Command::read(&battery)).unwrap();
        queue.push(Command::read(&battery)).unwrap();

        let mut link = MemoryLink::new().with_record(PropertyKind::Battery, [50]);
        link.fail_next(LinkError::Timeout);

        let report = queue.drain(&mut link);
        assert_eq!(report, DrainReport { completed: 1, failed: 1 });
        assert_eq!(link.requests(), 2);
        assert!(queue.is_empty());
        assert_eq!(*battery.value().unwrap(), 50);
    }

    #[test]
    fn execute_next_returns_terminal_command() {
        let battery = battery();
        let queue = CommandQueue::new();
        assert!(queue.execute_next(&mut MemoryLink::new()).is_none());

        queue.push(Command::read(&battery)).unwrap();
        let (cmd, result) = queue.execute_next(&mut MemoryLink::new()).unwrap();
        assert_matches!(result, Err(CommandError::Link(LinkError::Transport(..))));
        assert_eq!(cmd.state(), CommandState::Failed);
    }
}
