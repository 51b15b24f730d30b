//! Error types shared by the codec, the variable views and the SDO engine.

use std::time::Duration;
use thiserror::Error;

use crate::datatypes::DataType;
use crate::sdo::AbortCode;

/// Failure while translating between bytes, values and their derived views.
///
/// These are local data errors, retrying the same operation will fail the same way.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("{data_type} needs {expected} bytes, got {actual}")]
    LengthMismatch {
        data_type: DataType,
        expected: usize,
        actual: usize,
    },
    #[error("value {value} does not fit in {data_type}")]
    OutOfRange { data_type: DataType, value: String },
    #[error("value {value} cannot be represented as {data_type}")]
    TypeMismatch { data_type: DataType, value: String },
    #[error("no description for {0}")]
    NoDescription(String),
    #[error("cannot parse {text:?} as {data_type}")]
    Parse { data_type: DataType, text: String },
    #[error("bit {bit} is outside of a {width} bit value")]
    InvalidBit { bit: u32, width: u32 },
    #[error("invalid bit selection: {0}")]
    InvalidBitSelection(&'static str),
    #[error("no bit definition named {0:?}")]
    UnknownBitDefinition(String),
    #[error("{0} values are not bit addressable")]
    NotBitAddressable(DataType),
}

/// Access problems detected on the local side of a variable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("variable is not readable")]
    NotReadable,
    #[error("variable is not writable")]
    NotWritable,
    #[error("object 0x{index:04X}:{subindex} is not in the dictionary")]
    UnknownObject { index: u16, subindex: u8 },
    #[error("no object named {0:?} in the dictionary")]
    UnknownName(String),
}

/// An SDO transfer was aborted, either by the peer or locally.
///
/// This is the only error crossing the wire: both ends see the same code.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("SDO transfer of 0x{index:04X}:{subindex} aborted: {code}")]
pub struct SdoAbortedError {
    pub code: AbortCode,
    pub index: u16,
    pub subindex: u8,
}

impl SdoAbortedError {
    pub fn new(code: AbortCode, index: u16, subindex: u8) -> Self {
        Self { code, index, subindex }
    }
}

/// Errors of an SDO client transfer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SdoError {
    #[error(transparent)]
    Aborted(#[from] SdoAbortedError),
    /// No response in time. The session was torn down and the peer was sent
    /// an abort with [`AbortCode::TIMEOUT`].
    #[error("no response for 0x{index:04X}:{subindex} within {timeout:?}")]
    Timeout {
        index: u16,
        subindex: u8,
        timeout: Duration,
    },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("SDO channel closed")]
    ChannelClosed,
}

impl SdoError {
    /// Standardized abort code describing this error, if it has one.
    pub fn abort_code(&self) -> Option<AbortCode> {
        match self {
            Self::Aborted(e) => Some(e.code),
            Self::Timeout { .. } => Some(AbortCode::TIMEOUT),
            Self::InvalidResponse(_) | Self::ChannelClosed => None,
        }
    }
}

/// Failures of the SocketCAN binding.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("CAN socket error: {0}")]
    Socket(#[from] std::io::Error),
    #[error("invalid node id {0}, expected 1..=127")]
    InvalidNodeId(u8),
    #[error("COB-ID 0x{0:03X} is already in use")]
    CobIdInUse(u16),
}

/// Umbrella error of the variable views.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Sdo(#[from] SdoError),
}

impl From<SdoAbortedError> for Error {
    fn from(error: SdoAbortedError) -> Self {
        Self::Sdo(SdoError::Aborted(error))
    }
}

impl Error {
    /// Abort code carried by this error, for callers branching on SDO failures.
    pub fn abort_code(&self) -> Option<AbortCode> {
        match self {
            Self::Sdo(e) => e.abort_code(),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
