//! The boundary to the wireless link.
//!
//! Discovery, pairing and characteristic addressing belong to the
//! application. A [`Link`] implementation only has to map a [`PropertyKind`]
//! onto whatever handle its transport uses. The link carries one request at a
//! time, so implementations may block until the response arrives.

use crate::error::LinkError;
use crate::protocol::PropertyKind;
use std::collections::{HashMap, VecDeque};

pub trait Link {
    /// Reads the raw record for `kind`.
    fn read(&mut self, kind: PropertyKind) -> Result<Vec<u8>, LinkError>;

    /// Writes an encoded record for `kind`.
    fn write(&mut self, kind: PropertyKind, data: &[u8]) -> Result<(), LinkError>;
}

/// An in-memory valve. Stores records exactly as they would travel over the
/// air and hands them back on read.
#[derive(Debug, Default)]
pub struct MemoryLink {
    records: HashMap<PropertyKind, Vec<u8>>,
    failures: VecDeque<LinkError>,
    writes: Vec<(PropertyKind, Vec<u8>)>,
    requests: usize,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, kind: PropertyKind, data: impl Into<Vec<u8>>) -> Self {
        self.set_record(kind, data);
        self
    }

    pub fn set_record(&mut self, kind: PropertyKind, data: impl Into<Vec<u8>>) {
        self.records.insert(kind, data.into());
    }

    pub fn record(&self, kind: PropertyKind) -> Option<&[u8]> {
        self.records.get(&kind).map(Vec::as_slice)
    }

    /// Makes the next request fail with `error`. Queued failures are used up in order.
    pub fn fail_next(&mut self, error: LinkError) {
        self.failures.push_back(error);
    }

    /// Every successful write, oldest first.
    pub fn writes(&self) -> &[(PropertyKind, Vec<u8>)] {
        &self.writes
    }

    /// Number of requests seen, including failed ones.
    pub fn requests(&self) -> usize {
        self.requests
    }

    fn begin(&mut self) -> Result<(), LinkError> {
        self.requests += 1;
        match self.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Link for MemoryLink {
    fn read(&mut self, kind: PropertyKind) -> Result<Vec<u8>, LinkError> {
        self.begin()?;
        self.records
            .get(&kind)
            .cloned()
            .ok_or_else(|| LinkError::Transport(format!("no {kind} record")))
    }

    fn write(&mut self, kind: PropertyKind, data: &[u8]) -> Result<(), LinkError> {
        self.begin()?;
        self.records.insert(kind, data.to_vec());
        self.writes.push((kind, data.to_vec()));
        Ok(())
    }
}
