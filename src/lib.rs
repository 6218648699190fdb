//! A library for talking to Danfoss Eco radiator valves.
//!
//! The valve exposes its state as a handful of small, fixed size records that
//! are obfuscated with XXTEA and read or written one request at a time over a
//! wireless link. This crate covers everything between the raw bytes and typed
//! values:
//!
//! 1.  **Cipher**: [`xxtea::Xxtea`], keyed once per session with a 16 byte [`xxtea::Key`].
//! 2.  **Wire transform**: [`wire`] flips each 4 byte word around the cipher to
//!     match the valve's byte order.
//! 3.  **Record codec**: [`protocol`] decodes and encodes the temperature,
//!     settings, error and battery records, rejecting implausible values.
//! 4.  **Commands**: [`command::Command`] reads or writes one
//!     [`command::Property`] through a [`link::Link`].
//! 5.  **Queue**: [`queue::CommandQueue`] serializes commands from any number
//!     of producers onto the single-request link.
//!
//! Discovery, pairing and characteristic addressing are left to the
//! application, which provides the [`link::Link`] implementation.
//!
//! ## Quick Start
//!
//! ```
//! use danfoss_eco_lib::{
//!     device::Device,
//!     link::MemoryLink,
//!     queue::{CommandQueue, PushPolicy},
//!     xxtea::Key,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let key: Key = "00112233445566778899aabbccddeeff".parse()?;
//!     let device = Device::new(&key);
//!     let queue = CommandQueue::new();
//!
//!     // Producer side: ask for fresh values
//!     device.refresh(&queue, PushPolicy::Reject)?;
//!
//!     // Drain side: one request at a time against the link
//!     let mut link = MemoryLink::new();
//!     let report = queue.drain(&mut link);
//!     println!("{} commands completed, {} failed", report.completed, report.failed);
//!
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod device;
pub mod error;
pub mod link;
pub mod protocol;
pub mod queue;
pub mod wire;
pub mod xxtea;

pub use error::{Error, Result};
