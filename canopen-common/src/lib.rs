//! # CANopen Common Library
//!
//! CANopen (CiA 301) object dictionary access shared by the mock node and the
//! command line client.
//!
//! This library provides:
//! - Data type encoding and the layered value views (raw, physical,
//!   description, bits) of [`Variable`]
//! - A read-only [`ObjectDictionary`] table and local/remote node handles
//! - The SDO protocol: frame codec, [`SdoClient`] and [`SdoServer`]
//! - A SocketCAN [`Network`] binding for SDO channels

pub mod callbacks;
pub mod codec;
pub mod datatypes;
pub mod error;
pub mod network;
pub mod node;
pub mod objectdictionary;
pub mod sdo;
pub mod transport;
pub mod variable;

// Re-export commonly used types for convenience
pub use callbacks::{Access, CallbackRegistry, Direction};
pub use datatypes::{DataType, Value};
pub use error::{AccessError, CodecError, Error, NetworkError, Result, SdoAbortedError, SdoError};
pub use network::Network;
pub use node::{LocalNode, RemoteNode};
pub use objectdictionary::{AccessType, DictionaryEntry, ObjectDictionary};
pub use sdo::{AbortCode, SdoClient, SdoServer};
pub use transport::{SdoChannel, SdoFrame};
pub use variable::{BitKey, LocalVariable, RemoteVariable, Variable};
