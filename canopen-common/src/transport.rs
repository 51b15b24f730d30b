//! Frame channel between an SDO endpoint and the bus.
//!
//! The SDO engine only sees 8-byte payloads. Which CAN identifiers carry
//! them is decided by whoever builds the channel (see [`crate::network`]).

use tokio::sync::mpsc;

use crate::error::SdoError;

/// Payload of one SDO CAN frame.
pub type SdoFrame = [u8; 8];

/// One end of a bidirectional SDO frame channel.
#[derive(Debug)]
pub struct SdoChannel {
    tx: mpsc::UnboundedSender<SdoFrame>,
    rx: mpsc::UnboundedReceiver<SdoFrame>,
}

impl SdoChannel {
    pub fn new(tx: mpsc::UnboundedSender<SdoFrame>, rx: mpsc::UnboundedReceiver<SdoFrame>) -> Self {
        Self { tx, rx }
    }

    /// Two channel ends wired to each other, a virtual bus for one SDO
    /// client/server pair.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, b_rx), Self::new(b_tx, a_rx))
    }

    pub fn send(&self, frame: SdoFrame) -> Result<(), SdoError> {
        self.tx.send(frame).map_err(|_| SdoError::ChannelClosed)
    }

    /// Next incoming frame, `None` once the other end is gone.
    pub async fn recv(&mut self) -> Option<SdoFrame> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SdoFrame> {
        self.rx.try_recv().ok()
    }

    /// Discard every frame already queued, returning how many were dropped.
    pub fn drain(&mut self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<SdoFrame> {
        self.tx.clone()
    }
}
