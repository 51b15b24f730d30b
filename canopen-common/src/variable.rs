//! Layered views over the live data of one dictionary entry.
//!
//! A [`Variable`] only has to provide [`Variable::get_bytes`] and
//! [`Variable::set_bytes`]. Every other view is built on top of them:
//!
//! ```text
//! get_bytes/set_bytes -> data -> raw -> phys
//!                                   \-> desc
//!                                   \-> bits
//! ```

use async_trait::async_trait;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::codec::{decode_bits, decode_desc, decode_phys, encode_bits, encode_desc, encode_phys};
use crate::datatypes::{DataType, Value};
use crate::error::{AccessError, CodecError, Result, SdoAbortedError};
use crate::node::LocalNode;
use crate::objectdictionary::DictionaryEntry;
use crate::sdo::SdoClient;

/// Which bits of a variable to address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BitKey {
    Bit(u32),
    /// `start..stop` taking every `step`th bit.
    Range { start: u32, stop: u32, step: u32 },
    Set(Vec<u32>),
    /// A named entry of the dictionary's bit definitions.
    Named(String),
}

impl BitKey {
    pub fn stepped(start: u32, stop: u32, step: u32) -> Self {
        Self::Range { start, stop, step }
    }

    /// Resolve to the list of bit positions it selects.
    pub fn positions(&self, entry: &DictionaryEntry) -> Result<Vec<u32>, CodecError> {
        match self {
            Self::Bit(bit) => Ok(vec![*bit]),
            Self::Range { step: 0, .. } => Err(CodecError::InvalidBitSelection("step must not be zero")),
            Self::Range { start, stop, step } => Ok((*start..*stop).step_by(*step as usize).collect()),
            Self::Set(bits) => Ok(bits.clone()),
            Self::Named(name) => entry
                .bit_definitions
                .get(name)
                .cloned()
                .ok_or_else(|| CodecError::UnknownBitDefinition(name.clone())),
        }
    }
}

impl From<u32> for BitKey {
    fn from(bit: u32) -> Self {
        Self::Bit(bit)
    }
}

impl From<Range<u32>> for BitKey {
    fn from(range: Range<u32>) -> Self {
        Self::stepped(range.start, range.end, 1)
    }
}

impl From<Vec<u32>> for BitKey {
    fn from(bits: Vec<u32>) -> Self {
        Self::Set(bits)
    }
}

impl From<&[u32]> for BitKey {
    fn from(bits: &[u32]) -> Self {
        Self::Set(bits.to_vec())
    }
}

impl From<&str> for BitKey {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

fn check_bit_addressable(data_type: DataType) -> Result<(), CodecError> {
    if data_type.is_integer() || data_type == DataType::Boolean {
        Ok(())
    } else {
        Err(CodecError::NotBitAddressable(data_type))
    }
}

/// Typed access to one dictionary entry.
#[async_trait]
pub trait Variable: Send + Sync {
    fn entry(&self) -> &DictionaryEntry;

    /// Fetch the current bytes of the entry.
    async fn get_bytes(&self) -> Result<Vec<u8>> {
        Err(AccessError::NotReadable.into())
    }

    /// Replace the bytes of the entry.
    async fn set_bytes(&self, _data: &[u8]) -> Result<()> {
        Err(AccessError::NotWritable.into())
    }

    fn index(&self) -> u16 {
        self.entry().index
    }

    fn subindex(&self) -> u8 {
        self.entry().subindex
    }

    fn name(&self) -> &str {
        &self.entry().name
    }

    /// Raw bytes. Reading a write-only entry only logs a warning.
    async fn data(&self) -> Result<Vec<u8>> {
        let entry = self.entry();
        if !entry.access_type.is_readable() {
            warn!(
                index = entry.index,
                subindex = entry.subindex,
                "Variable {} is write only",
                entry.name
            );
        }
        self.get_bytes().await
    }

    /// Write raw bytes. Writing a read-only entry only logs a warning.
    async fn set_data(&self, data: &[u8]) -> Result<()> {
        let entry = self.entry();
        if !entry.access_type.is_writable() {
            warn!(
                index = entry.index,
                subindex = entry.subindex,
                "Variable {} is read only",
                entry.name
            );
        }
        self.set_bytes(data).await
    }

    /// Value decoded according to the entry's data type.
    async fn raw(&self) -> Result<Value> {
        let data = self.data().await?;
        let entry = self.entry();
        let value = entry.data_type.decode_value(&data)?;
        match decode_desc(&value, &entry.value_descriptions) {
            Ok(description) => debug!(
                index = entry.index,
                subindex = entry.subindex,
                "{} = {} ({})",
                entry.name,
                value,
                description
            ),
            Err(_) => debug!(
                index = entry.index,
                subindex = entry.subindex,
                "{} = {}",
                entry.name,
                value
            ),
        }
        Ok(value)
    }

    async fn set_raw(&self, value: &Value) -> Result<()> {
        let entry = self.entry();
        let data = entry.data_type.encode_value(value)?;
        debug!(
            index = entry.index,
            subindex = entry.subindex,
            "Writing {} = {}",
            entry.name,
            value
        );
        self.set_data(&data).await
    }

    /// Raw value scaled by the entry's factor.
    async fn phys(&self) -> Result<Value> {
        let raw = self.raw().await?;
        let entry = self.entry();
        let value = decode_phys(&raw, entry.factor);
        if !entry.unit.is_empty() {
            debug!("Physical value of {} is {} {}", entry.name, value, entry.unit);
        }
        Ok(value)
    }

    async fn set_phys(&self, value: &Value) -> Result<()> {
        let entry = self.entry();
        let raw = encode_phys(entry.data_type, value, entry.factor)?;
        self.set_raw(&raw).await
    }

    /// Description text of the current raw value.
    async fn desc(&self) -> Result<String> {
        let raw = self.raw().await?;
        let entry = self.entry();
        let description = decode_desc(&raw, &entry.value_descriptions)?;
        debug!("Description of {} is {:?}", entry.name, description);
        Ok(description.to_string())
    }

    async fn set_desc(&self, description: &str) -> Result<()> {
        let raw = encode_desc(description, &self.entry().value_descriptions)?;
        self.set_raw(&raw).await
    }

    /// Gather the selected bits of the raw value.
    async fn bits(&self, key: BitKey) -> Result<u64> {
        let entry = self.entry();
        check_bit_addressable(entry.data_type)?;
        let positions = key.positions(entry)?;
        let raw = self.raw().await?;
        let data = entry.data_type.encode_value(&raw)?;
        Ok(decode_bits(&data, &positions)?)
    }

    /// Replace the selected bits, keeping every other bit of the raw value.
    async fn set_bits(&self, key: BitKey, value: u64) -> Result<()> {
        let entry = self.entry();
        check_bit_addressable(entry.data_type)?;
        let positions = key.positions(entry)?;
        let raw = self.raw().await?;
        let data = entry.data_type.encode_value(&raw)?;
        let updated = encode_bits(&data, &positions, value)?;
        let raw = entry.data_type.decode_value(&updated)?;
        self.set_raw(&raw).await
    }
}

/// Variable backed by a [`LocalNode`]'s data store.
#[derive(Debug, Clone)]
pub struct LocalVariable {
    node: Arc<LocalNode>,
    entry: Arc<DictionaryEntry>,
}

impl LocalVariable {
    pub fn new(node: Arc<LocalNode>, entry: Arc<DictionaryEntry>) -> Self {
        Self { node, entry }
    }
}

#[async_trait]
impl Variable for LocalVariable {
    fn entry(&self) -> &DictionaryEntry {
        &self.entry
    }

    async fn get_bytes(&self) -> Result<Vec<u8>> {
        let (index, subindex) = (self.entry.index, self.entry.subindex);
        self.node
            .get_data(index, subindex, false)
            .map_err(|code| SdoAbortedError::new(code, index, subindex).into())
    }

    async fn set_bytes(&self, data: &[u8]) -> Result<()> {
        let (index, subindex) = (self.entry.index, self.entry.subindex);
        self.node
            .set_data(index, subindex, data, false)
            .map_err(|code| SdoAbortedError::new(code, index, subindex).into())
    }
}

/// Variable read and written through SDO transfers.
#[derive(Debug, Clone)]
pub struct RemoteVariable {
    sdo: Arc<SdoClient>,
    entry: Arc<DictionaryEntry>,
}

impl RemoteVariable {
    pub fn new(sdo: Arc<SdoClient>, entry: Arc<DictionaryEntry>) -> Self {
        Self { sdo, entry }
    }
}

#[async_trait]
impl Variable for RemoteVariable {
    fn entry(&self) -> &DictionaryEntry {
        &self.entry
    }

    async fn get_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.sdo.upload(self.entry.index, self.entry.subindex).await?)
    }

    async fn set_bytes(&self, data: &[u8]) -> Result<()> {
        Ok(self
            .sdo
            .download(self.entry.index, self.entry.subindex, data)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::objectdictionary::{AccessType, ObjectDictionary};
    use crate::sdo::AbortCode;

    fn node() -> Arc<LocalNode> {
        let mut dictionary = ObjectDictionary::new();
        dictionary.add(
            DictionaryEntry::new(0x2000, 0, "Temperature", DataType::Integer16)
                .with_factor(0.1)
                .with_unit("degC")
                .with_default(235i16),
        );
        dictionary.add(
            DictionaryEntry::new(0x2001, 0, "Mode", DataType::Unsigned8)
                .with_description(0, "Off")
                .with_description(1, "On")
                .with_default(1u8),
        );
        dictionary.add(
            DictionaryEntry::new(0x2002, 0, "Status word", DataType::Unsigned16)
                .with_bit_definition("STATE", vec![4, 5, 6])
                .with_default(0b1010_0110u16),
        );
        dictionary.add(
            DictionaryEntry::new(0x2003, 0, "Serial", DataType::Unsigned32).with_access(AccessType::Ro),
        );
        dictionary.add(DictionaryEntry::new(0x2004, 0, "Name", DataType::VisibleString));
        Arc::new(LocalNode::new(1, Arc::new(dictionary)))
    }

    #[tokio::test]
    async fn raw_and_phys() {
        let node = node();
        let temperature = node.variable(0x2000, 0).unwrap();
        assert_eq!(temperature.raw().await.unwrap(), Value::Integer(235));
        match temperature.phys().await.unwrap() {
            Value::Float(x) => assert!((x - 23.5).abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
        temperature.set_phys(&Value::Float(-1.24)).await.unwrap();
        assert_eq!(temperature.raw().await.unwrap(), Value::Integer(-12));
        assert_eq!(temperature.data().await.unwrap(), (-12i16).to_le_bytes().to_vec());
    }

    #[tokio::test]
    async fn descriptions() {
        let node = node();
        let mode = node.variable_by_name("Mode").unwrap();
        assert_eq!(mode.desc().await.unwrap(), "On");
        mode.set_desc("Off").await.unwrap();
        assert_eq!(mode.raw().await.unwrap(), Value::Unsigned(0));
        assert!(matches!(
            mode.set_desc("Standby").await,
            Err(Error::Codec(CodecError::NoDescription(_)))
        ));
        mode.set_raw(&Value::Unsigned(7)).await.unwrap();
        assert!(matches!(
            mode.desc().await,
            Err(Error::Codec(CodecError::NoDescription(_)))
        ));
    }

    #[tokio::test]
    async fn bits_read_modify_write() {
        let node = node();
        let status = node.variable(0x2002, 0).unwrap();
        assert_eq!(status.bits(BitKey::Bit(1)).await.unwrap(), 1);
        assert_eq!(status.bits(BitKey::from(4..8)).await.unwrap(), 0b1010);
        assert_eq!(status.bits(BitKey::stepped(1, 8, 2)).await.unwrap(), 0b1101);
        assert_eq!(status.bits("STATE".into()).await.unwrap(), 0b010);

        status.set_bits(BitKey::from(vec![8, 9]), 0b11).await.unwrap();
        assert_eq!(status.raw().await.unwrap(), Value::Unsigned(0b11_1010_0110));
        status.set_bits("STATE".into(), 0b101).await.unwrap();
        assert_eq!(status.raw().await.unwrap(), Value::Unsigned(0b11_1101_0110));

        assert!(matches!(
            status.bits("MISSING".into()).await,
            Err(Error::Codec(CodecError::UnknownBitDefinition(_)))
        ));
        let name = node.variable(0x2004, 0).unwrap();
        assert!(matches!(
            name.bits(BitKey::Bit(0)).await,
            Err(Error::Codec(CodecError::NotBitAddressable(DataType::VisibleString)))
        ));
    }

    #[tokio::test]
    async fn access_rights_only_warn() {
        let node = node();
        let serial = node.variable(0x2003, 0).unwrap();
        serial.set_raw(&Value::Unsigned(42)).await.unwrap();
        assert_eq!(serial.raw().await.unwrap(), Value::Unsigned(42));
    }

    #[tokio::test]
    async fn local_failures_carry_abort_codes() {
        let node = node();
        let name = node.variable(0x2004, 0).unwrap();
        let error = name.raw().await.unwrap_err();
        assert_eq!(error.abort_code(), Some(AbortCode::NO_DATA_AVAILABLE));
        let serial = node.variable(0x2003, 0).unwrap();
        assert!(matches!(
            serial.set_raw(&Value::Integer(-1)).await,
            Err(Error::Codec(CodecError::OutOfRange { .. }))
        ));
    }

    struct WriteOnlySink(DictionaryEntry);

    #[async_trait]
    impl Variable for WriteOnlySink {
        fn entry(&self) -> &DictionaryEntry {
            &self.0
        }

        async fn set_bytes(&self, _data: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn missing_primitive_is_an_access_error() {
        let sink = WriteOnlySink(DictionaryEntry::new(0x2100, 0, "Sink", DataType::Unsigned8));
        sink.set_raw(&Value::Unsigned(1)).await.unwrap();
        assert!(matches!(
            sink.raw().await,
            Err(Error::Access(AccessError::NotReadable))
        ));
    }
}
