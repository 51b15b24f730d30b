//! Encoding and decoding of SDO frames.
//!
//! Byte 0 is the command specifier, bytes 1..3 the index (little-endian),
//! byte 3 the subindex and bytes 4..8 data or abort code. Segment frames use
//! bytes 1..8 for data.

use super::{AbortCode, EXPEDITED_MAX_SIZE, SEGMENT_MAX_SIZE};
use crate::transport::SdoFrame;

const TOGGLE_BIT: u8 = 0x10;
const EXPEDITED_BIT: u8 = 0x02;
const SIZE_INDICATED_BIT: u8 = 0x01;
const NO_MORE_SEGMENTS_BIT: u8 = 0x01;

const CCS_DOWNLOAD_SEGMENT: u8 = 0;
const CCS_INITIATE_DOWNLOAD: u8 = 1;
const CCS_INITIATE_UPLOAD: u8 = 2;
const CCS_UPLOAD_SEGMENT: u8 = 3;
const CS_ABORT: u8 = 4;

const SCS_UPLOAD_SEGMENT: u8 = 0;
const SCS_DOWNLOAD_SEGMENT: u8 = 1;
const SCS_INITIATE_UPLOAD: u8 = 2;
const SCS_INITIATE_DOWNLOAD: u8 = 3;

/// Data part of an initiate download request or initiate upload response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitiatePayload {
    /// 1 to 4 bytes carried in the frame itself.
    Expedited(Vec<u8>),
    /// Expedited without size indication. The receiver takes as many of the
    /// four bytes as the object is wide.
    Unsized([u8; 4]),
    /// Data follows in segments, optionally announcing its total size.
    Segmented(Option<u32>),
}

/// Frames sent by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdoRequest {
    InitiateDownload {
        index: u16,
        subindex: u8,
        payload: InitiatePayload,
    },
    DownloadSegment {
        toggle: bool,
        data: Vec<u8>,
        last: bool,
    },
    InitiateUpload {
        index: u16,
        subindex: u8,
    },
    UploadSegment {
        toggle: bool,
    },
    Abort {
        index: u16,
        subindex: u8,
        code: AbortCode,
    },
}

/// Frames sent by a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdoResponse {
    InitiateUpload {
        index: u16,
        subindex: u8,
        payload: InitiatePayload,
    },
    UploadSegment {
        toggle: bool,
        data: Vec<u8>,
        last: bool,
    },
    InitiateDownload {
        index: u16,
        subindex: u8,
    },
    DownloadSegment {
        toggle: bool,
    },
    Abort {
        index: u16,
        subindex: u8,
        code: AbortCode,
    },
}

fn flag(set: bool, bit: u8) -> u8 {
    if set {
        bit
    } else {
        0
    }
}

/// Index and subindex of a frame.
pub(crate) fn multiplexer(frame: &SdoFrame) -> (u16, u8) {
    (u16::from_le_bytes([frame[1], frame[2]]), frame[3])
}

fn with_multiplexer(command: u8, index: u16, subindex: u8) -> SdoFrame {
    let mut frame = [0u8; 8];
    frame[0] = command;
    frame[1..3].copy_from_slice(&index.to_le_bytes());
    frame[3] = subindex;
    frame
}

fn encode_initiate(specifier: u8, index: u16, subindex: u8, payload: &InitiatePayload) -> SdoFrame {
    let base = specifier << 5;
    match payload {
        InitiatePayload::Expedited(data) if data.is_empty() => {
            with_multiplexer(base | EXPEDITED_BIT, index, subindex)
        }
        InitiatePayload::Unsized(data) => {
            let mut frame = with_multiplexer(base | EXPEDITED_BIT, index, subindex);
            frame[4..8].copy_from_slice(data);
            frame
        }
        InitiatePayload::Expedited(data) => {
            let len = data.len().min(EXPEDITED_MAX_SIZE);
            let unused = (EXPEDITED_MAX_SIZE - len) as u8;
            let mut frame = with_multiplexer(
                base | unused << 2 | EXPEDITED_BIT | SIZE_INDICATED_BIT,
                index,
                subindex,
            );
            frame[4..4 + len].copy_from_slice(&data[..len]);
            frame
        }
        InitiatePayload::Segmented(Some(size)) => {
            let mut frame = with_multiplexer(base | SIZE_INDICATED_BIT, index, subindex);
            frame[4..8].copy_from_slice(&size.to_le_bytes());
            frame
        }
        InitiatePayload::Segmented(None) => with_multiplexer(base, index, subindex),
    }
}

fn decode_initiate(frame: &SdoFrame) -> InitiatePayload {
    let command = frame[0];
    let size_indicated = command & SIZE_INDICATED_BIT != 0;
    if command & EXPEDITED_BIT != 0 && !size_indicated {
        InitiatePayload::Unsized([frame[4], frame[5], frame[6], frame[7]])
    } else if command & EXPEDITED_BIT != 0 {
        let unused = (command >> 2 & 0x03) as usize;
        InitiatePayload::Expedited(frame[4..8 - unused].to_vec())
    } else if size_indicated {
        InitiatePayload::Segmented(Some(u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]])))
    } else {
        InitiatePayload::Segmented(None)
    }
}

fn encode_segment(specifier: u8, toggle: bool, data: &[u8], last: bool) -> SdoFrame {
    let len = data.len().min(SEGMENT_MAX_SIZE);
    let mut frame = [0u8; 8];
    frame[0] = specifier << 5
        | flag(toggle, TOGGLE_BIT)
        | ((SEGMENT_MAX_SIZE - len) as u8) << 1
        | flag(last, NO_MORE_SEGMENTS_BIT);
    frame[1..1 + len].copy_from_slice(&data[..len]);
    frame
}

/// Data, toggle and last flag of a segment frame.
fn decode_segment(frame: &SdoFrame) -> (bool, Vec<u8>, bool) {
    let command = frame[0];
    let unused = (command >> 1 & 0x07) as usize;
    (
        command & TOGGLE_BIT != 0,
        frame[1..8 - unused].to_vec(),
        command & NO_MORE_SEGMENTS_BIT != 0,
    )
}

fn encode_abort(index: u16, subindex: u8, code: AbortCode) -> SdoFrame {
    let mut frame = with_multiplexer(CS_ABORT << 5, index, subindex);
    frame[4..8].copy_from_slice(&code.code().to_le_bytes());
    frame
}

fn decode_abort_code(frame: &SdoFrame) -> AbortCode {
    AbortCode(u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]))
}

impl SdoRequest {
    pub fn encode(&self) -> SdoFrame {
        match self {
            Self::InitiateDownload { index, subindex, payload } => {
                encode_initiate(CCS_INITIATE_DOWNLOAD, *index, *subindex, payload)
            }
            Self::DownloadSegment { toggle, data, last } => {
                encode_segment(CCS_DOWNLOAD_SEGMENT, *toggle, data, *last)
            }
            Self::InitiateUpload { index, subindex } => {
                with_multiplexer(CCS_INITIATE_UPLOAD << 5, *index, *subindex)
            }
            Self::UploadSegment { toggle } => {
                let mut frame = [0u8; 8];
                frame[0] = CCS_UPLOAD_SEGMENT << 5 | flag(*toggle, TOGGLE_BIT);
                frame
            }
            Self::Abort { index, subindex, code } => encode_abort(*index, *subindex, *code),
        }
    }

    /// Parse a client frame. Unsupported command specifiers (including block
    /// transfers) yield [`AbortCode::INVALID_COMMAND`].
    pub fn decode(frame: &SdoFrame) -> Result<Self, AbortCode> {
        let (index, subindex) = multiplexer(frame);
        match frame[0] >> 5 {
            CCS_DOWNLOAD_SEGMENT => {
                let (toggle, data, last) = decode_segment(frame);
                Ok(Self::DownloadSegment { toggle, data, last })
            }
            CCS_INITIATE_DOWNLOAD => Ok(Self::InitiateDownload {
                index,
                subindex,
                payload: decode_initiate(frame),
            }),
            CCS_INITIATE_UPLOAD => Ok(Self::InitiateUpload { index, subindex }),
            CCS_UPLOAD_SEGMENT => Ok(Self::UploadSegment {
                toggle: frame[0] & TOGGLE_BIT != 0,
            }),
            CS_ABORT => Ok(Self::Abort {
                index,
                subindex,
                code: decode_abort_code(frame),
            }),
            _ => Err(AbortCode::INVALID_COMMAND),
        }
    }
}

impl SdoResponse {
    pub fn encode(&self) -> SdoFrame {
        match self {
            Self::InitiateUpload { index, subindex, payload } => {
                encode_initiate(SCS_INITIATE_UPLOAD, *index, *subindex, payload)
            }
            Self::UploadSegment { toggle, data, last } => {
                encode_segment(SCS_UPLOAD_SEGMENT, *toggle, data, *last)
            }
            Self::InitiateDownload { index, subindex } => {
                with_multiplexer(SCS_INITIATE_DOWNLOAD << 5, *index, *subindex)
            }
            Self::DownloadSegment { toggle } => {
                let mut frame = [0u8; 8];
                frame[0] = SCS_DOWNLOAD_SEGMENT << 5 | flag(*toggle, TOGGLE_BIT);
                frame
            }
            Self::Abort { index, subindex, code } => encode_abort(*index, *subindex, *code),
        }
    }

    pub fn decode(frame: &SdoFrame) -> Result<Self, AbortCode> {
        let (index, subindex) = multiplexer(frame);
        match frame[0] >> 5 {
            SCS_UPLOAD_SEGMENT => {
                let (toggle, data, last) = decode_segment(frame);
                Ok(Self::UploadSegment { toggle, data, last })
            }
            SCS_DOWNLOAD_SEGMENT => Ok(Self::DownloadSegment {
                toggle: frame[0] & TOGGLE_BIT != 0,
            }),
            SCS_INITIATE_UPLOAD => Ok(Self::InitiateUpload {
                index,
                subindex,
                payload: decode_initiate(frame),
            }),
            SCS_INITIATE_DOWNLOAD => Ok(Self::InitiateDownload { index, subindex }),
            CS_ABORT => Ok(Self::Abort {
                index,
                subindex,
                code: decode_abort_code(frame),
            }),
            _ => Err(AbortCode::INVALID_COMMAND),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initiate_upload_request() {
        let frame = SdoRequest::InitiateUpload { index: 0x1017, subindex: 0 }.encode();
        assert_eq!(frame, [0x40, 0x17, 0x10, 0x00, 0, 0, 0, 0]);
    }

    #[test]
    fn expedited_frames_carry_size() {
        let response = SdoResponse::InitiateUpload {
            index: 0x1017,
            subindex: 0,
            payload: InitiatePayload::Expedited(vec![0x99, 0x00]),
        };
        let frame = response.encode();
        assert_eq!(frame, [0x4B, 0x17, 0x10, 0x00, 0x99, 0x00, 0, 0]);
        assert_eq!(SdoResponse::decode(&frame), Ok(response));

        let request = SdoRequest::InitiateDownload {
            index: 0x1018,
            subindex: 1,
            payload: InitiatePayload::Expedited(vec![0xFF, 0xFE, 0, 0]),
        };
        assert_eq!(request.encode(), [0x23, 0x18, 0x10, 0x01, 0xFF, 0xFE, 0, 0]);
    }

    #[test]
    fn expedited_without_size_is_four_bytes() {
        let frame = [0x42, 0x00, 0x10, 0x00, 1, 2, 3, 4];
        assert_eq!(
            SdoResponse::decode(&frame),
            Ok(SdoResponse::InitiateUpload {
                index: 0x1000,
                subindex: 0,
                payload: InitiatePayload::Unsized([1, 2, 3, 4]),
            })
        );

        let request = SdoRequest::InitiateDownload {
            index: 0x1017,
            subindex: 0,
            payload: InitiatePayload::Unsized([0xE8, 0x03, 0, 0]),
        };
        let frame = request.encode();
        assert_eq!(frame, [0x22, 0x17, 0x10, 0x00, 0xE8, 0x03, 0, 0]);
        assert_eq!(SdoRequest::decode(&frame), Ok(request));
    }

    #[test]
    fn segmented_initiate_announces_size() {
        let response = SdoResponse::InitiateUpload {
            index: 0x1008,
            subindex: 0,
            payload: InitiatePayload::Segmented(Some(16)),
        };
        assert_eq!(response.encode(), [0x41, 0x08, 0x10, 0x00, 16, 0, 0, 0]);
        let request = SdoRequest::InitiateDownload {
            index: 0x1008,
            subindex: 0,
            payload: InitiatePayload::Segmented(Some(0)),
        };
        assert_eq!(request.encode(), [0x21, 0x08, 0x10, 0x00, 0, 0, 0, 0]);
    }

    #[test]
    fn segment_frames() {
        let request = SdoRequest::UploadSegment { toggle: true };
        assert_eq!(request.encode(), [0x70, 0, 0, 0, 0, 0, 0, 0]);

        let response = SdoResponse::UploadSegment {
            toggle: true,
            data: b"ce".to_vec(),
            last: true,
        };
        let frame = response.encode();
        assert_eq!(frame, [0x1B, b'c', b'e', 0, 0, 0, 0, 0]);
        assert_eq!(SdoResponse::decode(&frame), Ok(response));

        let request = SdoRequest::DownloadSegment {
            toggle: false,
            data: b"Another".to_vec(),
            last: false,
        };
        assert_eq!(request.encode()[0], 0x00);
        assert_eq!(SdoResponse::DownloadSegment { toggle: true }.encode()[0], 0x30);
        assert_eq!(SdoResponse::InitiateDownload { index: 0, subindex: 0 }.encode()[0], 0x60);
    }

    #[test]
    fn abort_frames() {
        let frame = SdoResponse::Abort {
            index: 0x1234,
            subindex: 0,
            code: AbortCode::OBJECT_DOES_NOT_EXIST,
        }
        .encode();
        assert_eq!(frame, [0x80, 0x34, 0x12, 0x00, 0x00, 0x00, 0x02, 0x06]);
        assert_eq!(
            SdoRequest::decode(&frame),
            Ok(SdoRequest::Abort {
                index: 0x1234,
                subindex: 0,
                code: AbortCode::OBJECT_DOES_NOT_EXIST,
            })
        );
    }

    #[test]
    fn block_transfers_are_rejected() {
        assert_eq!(
            SdoRequest::decode(&[0xC0, 0, 0x20, 0, 0, 0, 0, 0]),
            Err(AbortCode::INVALID_COMMAND)
        );
        assert_eq!(
            SdoRequest::decode(&[0xA0, 0, 0x20, 0, 0, 0, 0, 0]),
            Err(AbortCode::INVALID_COMMAND)
        );
    }
}
