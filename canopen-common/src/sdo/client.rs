//! SDO client: reads and writes a remote object dictionary.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{
    AbortCode, InitiatePayload, SdoRequest, SdoResponse, TransferKind, TransferSession,
    DEFAULT_CLIENT_TIMEOUT, EXPEDITED_MAX_SIZE,
};
use crate::callbacks::Direction;
use crate::error::{SdoAbortedError, SdoError};
use crate::transport::SdoChannel;

/// Client end of one SDO channel.
///
/// Transfers are serialized: concurrent calls wait for the channel in the
/// order they were made.
#[derive(Debug)]
pub struct SdoClient {
    channel: Mutex<SdoChannel>,
    timeout: Duration,
}

impl SdoClient {
    pub fn new(channel: SdoChannel) -> Self {
        Self {
            channel: Mutex::new(channel),
            timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }

    /// Response timeout per frame round trip.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Read an entry of the remote dictionary.
    ///
    /// Dropping the returned future before it completes aborts the transfer
    /// on the peer with [`AbortCode::GENERAL_ERROR`].
    pub async fn upload(&self, index: u16, subindex: u8) -> Result<Vec<u8>, SdoError> {
        let mut channel = self.channel.lock().await;
        let mut transfer = Transfer::new(&mut channel, index, subindex, self.timeout);
        let result = transfer.upload().await;
        transfer.finished = true;
        result
    }

    /// Write an entry of the remote dictionary.
    pub async fn download(&self, index: u16, subindex: u8, data: &[u8]) -> Result<(), SdoError> {
        let mut channel = self.channel.lock().await;
        let mut transfer = Transfer::new(&mut channel, index, subindex, self.timeout);
        let result = transfer.download(data).await;
        transfer.finished = true;
        result
    }
}

/// One request in flight. Sends an abort to the peer when dropped unfinished.
struct Transfer<'a> {
    channel: &'a mut SdoChannel,
    index: u16,
    subindex: u8,
    timeout: Duration,
    finished: bool,
}

impl<'a> Transfer<'a> {
    fn new(channel: &'a mut SdoChannel, index: u16, subindex: u8, timeout: Duration) -> Self {
        Self {
            channel,
            index,
            subindex,
            timeout,
            finished: false,
        }
    }

    fn session(&self, direction: Direction) -> TransferSession {
        TransferSession::new(
            self.index,
            self.subindex,
            direction,
            TransferKind::Segmented,
            Instant::now() + self.timeout,
        )
    }

    async fn upload(&mut self) -> Result<Vec<u8>, SdoError> {
        let (index, subindex) = (self.index, self.subindex);
        let stale = self.channel.drain();
        if stale > 0 {
            debug!(index, subindex, "Dropped {} stale SDO frames", stale);
        }
        debug!(index, subindex, "Starting SDO upload");

        let payload = match self.request(SdoRequest::InitiateUpload { index, subindex }).await? {
            SdoResponse::InitiateUpload { index, subindex, payload } => {
                self.check_multiplexer(index, subindex)?;
                payload
            }
            other => return Err(self.unexpected(other)),
        };
        let expected_size = match payload {
            InitiatePayload::Expedited(data) => return Ok(data),
            InitiatePayload::Unsized(data) => return Ok(data.to_vec()),
            InitiatePayload::Segmented(size) => size,
        };

        let mut session = self.session(Direction::Upload);
        session.expected_size = expected_size;
        loop {
            let request = SdoRequest::UploadSegment { toggle: session.toggle };
            let (toggle, data, last) = match self.request(request).await? {
                SdoResponse::UploadSegment { toggle, data, last } => (toggle, data, last),
                other => return Err(self.unexpected(other)),
            };
            if toggle != session.toggle {
                return Err(self.fail(AbortCode::TOGGLE_NOT_ALTERNATED));
            }
            session.buffer.extend_from_slice(&data);
            if session.exceeds_expected_size() {
                warn!(
                    index,
                    subindex,
                    "Received {} bytes, only {:?} were announced",
                    session.buffer.len(),
                    session.expected_size
                );
                return Err(self.fail(AbortCode::LENGTH_MISMATCH));
            }
            session.advance(Instant::now() + self.timeout);
            if last {
                break;
            }
        }

        if let Some(size) = session.expected_size {
            if session.buffer.len() != size as usize {
                warn!(
                    index,
                    subindex,
                    "Received {} bytes, {} were announced",
                    session.buffer.len(),
                    size
                );
                return Err(self.fail(AbortCode::LENGTH_MISMATCH));
            }
        }
        debug!(index, subindex, "Uploaded {} bytes", session.buffer.len());
        Ok(session.buffer)
    }

    async fn download(&mut self, data: &[u8]) -> Result<(), SdoError> {
        let (index, subindex) = (self.index, self.subindex);
        let stale = self.channel.drain();
        if stale > 0 {
            debug!(index, subindex, "Dropped {} stale SDO frames", stale);
        }
        debug!(index, subindex, "Starting SDO download of {} bytes", data.len());

        let expedited = !data.is_empty() && data.len() <= EXPEDITED_MAX_SIZE;
        let payload = if expedited {
            InitiatePayload::Expedited(data.to_vec())
        } else {
            let size = u32::try_from(data.len())
                .map_err(|_| SdoAbortedError::new(AbortCode::LENGTH_TOO_HIGH, index, subindex))?;
            InitiatePayload::Segmented(Some(size))
        };

        let request = SdoRequest::InitiateDownload { index, subindex, payload };
        match self.request(request).await? {
            SdoResponse::InitiateDownload { index, subindex } => self.check_multiplexer(index, subindex)?,
            other => return Err(self.unexpected(other)),
        }
        if expedited {
            return Ok(());
        }

        let mut session = self.session(Direction::Download);
        session.buffer = data.to_vec();
        loop {
            let toggle = session.toggle;
            let (data, last) = session.next_segment();
            match self.request(SdoRequest::DownloadSegment { toggle, data, last }).await? {
                SdoResponse::DownloadSegment { toggle } if toggle == session.toggle => {}
                SdoResponse::DownloadSegment { .. } => {
                    return Err(self.fail(AbortCode::TOGGLE_NOT_ALTERNATED));
                }
                other => return Err(self.unexpected(other)),
            }
            session.advance(Instant::now() + self.timeout);
            if last {
                return Ok(());
            }
        }
    }

    /// Send one request and wait for its response.
    async fn request(&mut self, request: SdoRequest) -> Result<SdoResponse, SdoError> {
        self.channel.send(request.encode())?;
        let frame = match tokio::time::timeout(self.timeout, self.channel.recv()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Err(SdoError::ChannelClosed),
            Err(_) => {
                warn!(
                    index = self.index,
                    subindex = self.subindex,
                    "No SDO response within {:?}",
                    self.timeout
                );
                self.send_abort(AbortCode::TIMEOUT);
                return Err(SdoError::Timeout {
                    index: self.index,
                    subindex: self.subindex,
                    timeout: self.timeout,
                });
            }
        };

        match SdoResponse::decode(&frame) {
            Ok(SdoResponse::Abort { code, .. }) => {
                warn!(
                    index = self.index,
                    subindex = self.subindex,
                    "SDO transfer aborted by server: {}",
                    code
                );
                Err(SdoAbortedError::new(code, self.index, self.subindex).into())
            }
            Ok(response) => Ok(response),
            Err(code) => {
                self.send_abort(code);
                Err(SdoError::InvalidResponse(format!(
                    "unknown server command specifier 0x{:02X}",
                    frame[0]
                )))
            }
        }
    }

    fn check_multiplexer(&mut self, index: u16, subindex: u8) -> Result<(), SdoError> {
        if (index, subindex) == (self.index, self.subindex) {
            return Ok(());
        }
        self.send_abort(AbortCode::INVALID_COMMAND);
        Err(SdoError::InvalidResponse(format!(
            "response for 0x{:04X}:{} while waiting for 0x{:04X}:{}",
            index, subindex, self.index, self.subindex
        )))
    }

    fn unexpected(&mut self, response: SdoResponse) -> SdoError {
        self.send_abort(AbortCode::INVALID_COMMAND);
        SdoError::InvalidResponse(format!("unexpected response {:?}", response))
    }

    /// Abort the transfer locally and on the peer.
    fn fail(&mut self, code: AbortCode) -> SdoError {
        self.send_abort(code);
        SdoAbortedError::new(code, self.index, self.subindex).into()
    }

    fn send_abort(&mut self, code: AbortCode) {
        warn!(
            index = self.index,
            subindex = self.subindex,
            "Aborting SDO transfer: {}",
            code
        );
        let frame = SdoRequest::Abort {
            index: self.index,
            subindex: self.subindex,
            code,
        }
        .encode();
        // the peer may already be gone, nothing left to notify then
        let _ = self.channel.send(frame);
        self.finished = true;
    }
}

impl Drop for Transfer<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.send_abort(AbortCode::GENERAL_ERROR);
        }
    }
}
