//! SDO server: serves a [`LocalNode`]'s dictionary to one client.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::frame::multiplexer;
use super::{
    AbortCode, InitiatePayload, SdoRequest, SdoResponse, TransferKind, TransferSession,
    DEFAULT_SERVER_TIMEOUT, EXPEDITED_MAX_SIZE,
};
use crate::callbacks::Direction;
use crate::error::SdoAbortedError;
use crate::node::LocalNode;
use crate::transport::{SdoChannel, SdoFrame};

/// Server state machine for one SDO channel.
///
/// [`SdoServer::handle_frame`] is the frame-in/frame-out core, [`SdoServer::run`]
/// drives it from an [`SdoChannel`].
#[derive(Debug)]
pub struct SdoServer {
    node: Arc<LocalNode>,
    session: Option<TransferSession>,
    timeout: Duration,
}

impl SdoServer {
    pub fn new(node: Arc<LocalNode>) -> Self {
        Self {
            node,
            session: None,
            timeout: DEFAULT_SERVER_TIMEOUT,
        }
    }

    /// How long a segmented session may stay idle before it is aborted.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn node(&self) -> &Arc<LocalNode> {
        &self.node
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Deadline of the pending segmented session, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.session.as_ref().map(|session| session.deadline)
    }

    /// Handle one request frame and return the response to send, if any.
    pub fn handle_frame(&mut self, frame: &SdoFrame) -> Option<SdoFrame> {
        let request = match SdoRequest::decode(frame) {
            Ok(request) => request,
            Err(code) => {
                let (index, subindex) = multiplexer(frame);
                warn!(index, subindex, "Unsupported SDO command 0x{:02X}", frame[0]);
                self.session = None;
                return Some(abort_frame(SdoAbortedError::new(code, index, subindex)));
            }
        };

        let now = Instant::now();
        let result = match request {
            SdoRequest::Abort { index, subindex, code } => {
                debug!(index, subindex, "SDO transfer aborted by client: {}", code);
                self.session = None;
                return None;
            }
            SdoRequest::InitiateUpload { index, subindex } => {
                self.check_idle(index, subindex).and_then(|()| self.initiate_upload(index, subindex, now))
            }
            SdoRequest::InitiateDownload { index, subindex, payload } => self
                .check_idle(index, subindex)
                .and_then(|()| self.initiate_download(index, subindex, payload, now)),
            SdoRequest::UploadSegment { toggle } => self.upload_segment(toggle, now),
            SdoRequest::DownloadSegment { toggle, data, last } => {
                self.download_segment(toggle, &data, last, now)
            }
        };

        match result {
            Ok(response) => Some(response.encode()),
            Err(error) => {
                warn!(
                    index = error.index,
                    subindex = error.subindex,
                    "Aborting SDO transfer: {}",
                    error.code
                );
                self.session = None;
                Some(abort_frame(error))
            }
        }
    }

    /// Abort the pending session if it has been idle past its deadline.
    pub fn poll_timeout(&mut self, now: Instant) -> Option<SdoFrame> {
        if !self.session.as_ref().is_some_and(|session| session.is_expired(now)) {
            return None;
        }
        let session = self.session.take()?;
        warn!(
            index = session.index,
            subindex = session.subindex,
            "SDO session timed out"
        );
        Some(abort_frame(SdoAbortedError::new(
            AbortCode::TIMEOUT,
            session.index,
            session.subindex,
        )))
    }

    /// Serve requests until the channel closes.
    pub async fn run(mut self, mut channel: SdoChannel) {
        info!(node_id = self.node.id(), "SDO server running");
        loop {
            let deadline = self.deadline();
            let response = tokio::select! {
                frame = channel.recv() => match frame {
                    Some(frame) => self.handle_frame(&frame),
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.poll_timeout(Instant::now())
                }
            };
            if let Some(response) = response {
                if channel.send(response).is_err() {
                    break;
                }
            }
        }
        info!(node_id = self.node.id(), "SDO server stopped");
    }

    /// A new transfer may only start while no other is pending.
    fn check_idle(&mut self, index: u16, subindex: u8) -> Result<(), SdoAbortedError> {
        match self.session.take() {
            Some(stale) => {
                warn!(
                    index = stale.index,
                    subindex = stale.subindex,
                    "New SDO request while a transfer is pending"
                );
                Err(SdoAbortedError::new(AbortCode::RESOURCE_NOT_AVAILABLE, index, subindex))
            }
            None => Ok(()),
        }
    }

    fn initiate_upload(&mut self, index: u16, subindex: u8, now: Instant) -> Result<SdoResponse, SdoAbortedError> {
        let data = self
            .node
            .get_data(index, subindex, true)
            .map_err(|code| SdoAbortedError::new(code, index, subindex))?;
        debug!(index, subindex, "Upload of {} bytes", data.len());

        if !data.is_empty() && data.len() <= EXPEDITED_MAX_SIZE {
            return Ok(SdoResponse::InitiateUpload {
                index,
                subindex,
                payload: InitiatePayload::Expedited(data),
            });
        }

        let size = u32::try_from(data.len())
            .map_err(|_| SdoAbortedError::new(AbortCode::LENGTH_TOO_HIGH, index, subindex))?;
        let mut session = TransferSession::new(
            index,
            subindex,
            Direction::Upload,
            TransferKind::Segmented,
            now + self.timeout,
        );
        session.buffer = data;
        session.expected_size = Some(size);
        self.session = Some(session);
        Ok(SdoResponse::InitiateUpload {
            index,
            subindex,
            payload: InitiatePayload::Segmented(Some(size)),
        })
    }

    fn upload_segment(&mut self, toggle: bool, now: Instant) -> Result<SdoResponse, SdoAbortedError> {
        let timeout = self.timeout;
        let session = self.active(Direction::Upload, toggle)?;
        let (data, last) = session.next_segment();
        session.advance(now + timeout);
        if last {
            debug!(
                index = session.index,
                subindex = session.subindex,
                "Segmented upload complete"
            );
            self.session = None;
        }
        Ok(SdoResponse::UploadSegment { toggle, data, last })
    }

    fn initiate_download(
        &mut self,
        index: u16,
        subindex: u8,
        payload: InitiatePayload,
        now: Instant,
    ) -> Result<SdoResponse, SdoAbortedError> {
        let abort = |code| SdoAbortedError::new(code, index, subindex);
        let entry = self.node.dictionary().find(index, subindex).map_err(abort)?;
        if !entry.access_type.is_writable() {
            return Err(abort(AbortCode::WRITE_OF_READ_ONLY));
        }

        match payload {
            InitiatePayload::Expedited(data) => {
                debug!(index, subindex, "Expedited download of {} bytes", data.len());
                self.node.set_data(index, subindex, &data, true).map_err(abort)?;
            }
            InitiatePayload::Unsized(data) => {
                let len = entry.data_type.size().map_or(data.len(), |size| size.min(data.len()));
                debug!(index, subindex, "Expedited download of {} bytes, size not indicated", len);
                self.node.set_data(index, subindex, &data[..len], true).map_err(abort)?;
            }
            InitiatePayload::Segmented(size) => {
                debug!(index, subindex, "Segmented download of {:?} bytes", size);
                let mut session = TransferSession::new(
                    index,
                    subindex,
                    Direction::Download,
                    TransferKind::Segmented,
                    now + self.timeout,
                );
                session.expected_size = size;
                self.session = Some(session);
            }
        }
        Ok(SdoResponse::InitiateDownload { index, subindex })
    }

    fn download_segment(
        &mut self,
        toggle: bool,
        data: &[u8],
        last: bool,
        now: Instant,
    ) -> Result<SdoResponse, SdoAbortedError> {
        let timeout = self.timeout;
        let session = self.active(Direction::Download, toggle)?;
        session.buffer.extend_from_slice(data);
        if session.exceeds_expected_size() {
            let (index, subindex) = (session.index, session.subindex);
            warn!(
                index,
                subindex,
                "Received {} bytes, only {:?} were announced",
                session.buffer.len(),
                session.expected_size
            );
            self.session = None;
            return Err(SdoAbortedError::new(AbortCode::LENGTH_TOO_HIGH, index, subindex));
        }
        session.advance(now + timeout);
        if !last {
            return Ok(SdoResponse::DownloadSegment { toggle });
        }

        let (index, subindex) = (session.index, session.subindex);
        let buffer = std::mem::take(&mut session.buffer);
        let expected_size = session.expected_size;
        self.session = None;
        if let Some(size) = expected_size {
            if buffer.len() != size as usize {
                return Err(SdoAbortedError::new(AbortCode::LENGTH_MISMATCH, index, subindex));
            }
        }
        debug!(index, subindex, "Segmented download of {} bytes complete", buffer.len());
        self.node
            .set_data(index, subindex, &buffer, true)
            .map_err(|code| SdoAbortedError::new(code, index, subindex))?;
        Ok(SdoResponse::DownloadSegment { toggle })
    }

    /// The pending session, checked against the direction and toggle bit of
    /// a segment request.
    fn active(&mut self, direction: Direction, toggle: bool) -> Result<&mut TransferSession, SdoAbortedError> {
        let session = match self.session.as_mut() {
            Some(session) if session.direction == direction => session,
            Some(session) => {
                return Err(SdoAbortedError::new(
                    AbortCode::INVALID_COMMAND,
                    session.index,
                    session.subindex,
                ))
            }
            None => return Err(SdoAbortedError::new(AbortCode::INVALID_COMMAND, 0, 0)),
        };
        if session.toggle != toggle {
            return Err(SdoAbortedError::new(
                AbortCode::TOGGLE_NOT_ALTERNATED,
                session.index,
                session.subindex,
            ));
        }
        Ok(session)
    }
}

fn abort_frame(error: SdoAbortedError) -> SdoFrame {
    SdoResponse::Abort {
        index: error.index,
        subindex: error.subindex,
        code: error.code,
    }
    .encode()
}
