//! SDO (Service Data Object) protocol: frame codec, client and server.

mod abort;
mod client;
mod frame;
mod server;

pub use abort::AbortCode;
pub use client::SdoClient;
pub use frame::{InitiatePayload, SdoRequest, SdoResponse};
pub use server::SdoServer;

use std::time::Duration;
use tokio::time::Instant;

use crate::callbacks::Direction;

/// Largest payload carried inside an initiate frame.
pub const EXPEDITED_MAX_SIZE: usize = 4;
/// Payload of one segment frame.
pub const SEGMENT_MAX_SIZE: usize = 7;

pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_millis(300);
pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Expedited,
    Segmented,
}

/// State of one transfer between a client and a server.
#[derive(Debug, Clone)]
pub struct TransferSession {
    pub index: u16,
    pub subindex: u8,
    pub direction: Direction,
    pub kind: TransferKind,
    /// Reassembled data (downloads to a server, uploads to a client) or
    /// data being sent.
    pub buffer: Vec<u8>,
    /// Bytes of `buffer` already sent.
    pub offset: usize,
    /// Size announced in the initiate frame.
    pub expected_size: Option<u32>,
    /// Toggle bit expected on the next segment.
    pub toggle: bool,
    pub deadline: Instant,
}

impl TransferSession {
    pub fn new(index: u16, subindex: u8, direction: Direction, kind: TransferKind, deadline: Instant) -> Self {
        Self {
            index,
            subindex,
            direction,
            kind,
            buffer: Vec::new(),
            offset: 0,
            expected_size: None,
            toggle: false,
            deadline,
        }
    }

    /// Cut the next segment out of `buffer`. Returns the data and whether it
    /// is the last one.
    pub fn next_segment(&mut self) -> (Vec<u8>, bool) {
        let end = (self.offset + SEGMENT_MAX_SIZE).min(self.buffer.len());
        let data = self.buffer[self.offset..end].to_vec();
        self.offset = end;
        (data, end == self.buffer.len())
    }

    /// Flip the toggle bit after a completed segment round trip.
    pub fn advance(&mut self, deadline: Instant) {
        self.toggle = !self.toggle;
        self.deadline = deadline;
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Whether more data arrived than the initiate frame announced.
    pub fn exceeds_expected_size(&self) -> bool {
        self.expected_size
            .is_some_and(|size| self.buffer.len() as u64 > u64::from(size))
    }
}
