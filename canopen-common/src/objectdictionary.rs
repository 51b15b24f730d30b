//! Read-only object dictionary table.
//!
//! The table is populated once (in code or from a TOML file) and then shared
//! behind an `Arc` by nodes, variables and the SDO server without locking.

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::datatypes::{DataType, Value};
use crate::error::CodecError;
use crate::sdo::AbortCode;

/// Declared access rights of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Ro,
    Wo,
    #[default]
    Rw,
    /// Read/write, mapped in receive PDOs.
    Rwr,
    /// Read/write, mapped in transmit PDOs.
    Rww,
    Const,
}

impl AccessType {
    pub fn is_readable(self) -> bool {
        !matches!(self, Self::Wo)
    }

    pub fn is_writable(self) -> bool {
        !matches!(self, Self::Ro | Self::Const)
    }
}

/// Metadata of one (index, subindex) entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DictionaryEntry {
    pub index: u16,
    #[serde(default)]
    pub subindex: u8,
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub access_type: AccessType,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub factor: Option<f64>,
    #[serde(default)]
    pub default: Option<Value>,
    /// Raw value to description text.
    #[serde(default, deserialize_with = "description_keys")]
    pub value_descriptions: BTreeMap<i64, String>,
    /// Named bit fields, as lists of bit positions.
    #[serde(default)]
    pub bit_definitions: BTreeMap<String, Vec<u32>>,
}

impl DictionaryEntry {
    pub fn new(index: u16, subindex: u8, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            index,
            subindex,
            name: name.into(),
            data_type,
            access_type: AccessType::default(),
            unit: String::new(),
            factor: None,
            default: None,
            value_descriptions: BTreeMap::new(),
            bit_definitions: BTreeMap::new(),
        }
    }

    pub fn with_access(mut self, access_type: AccessType) -> Self {
        self.access_type = access_type;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = Some(factor);
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_description(mut self, raw: i64, text: impl Into<String>) -> Self {
        self.value_descriptions.insert(raw, text.into());
        self
    }

    pub fn with_bit_definition(mut self, name: impl Into<String>, bits: Vec<u32>) -> Self {
        self.bit_definitions.insert(name.into(), bits);
        self
    }

    /// Encoded default value, if the entry declares one.
    pub fn encoded_default(&self) -> Result<Option<Vec<u8>>, CodecError> {
        self.default
            .as_ref()
            .map(|value| self.data_type.encode_value(value))
            .transpose()
    }
}

/// Accept description keys written as TOML strings (`"0"`, `"0x10"`, `"-1"`).
fn description_keys<'de, D>(deserializer: D) -> Result<BTreeMap<i64, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, text)| {
            let trimmed = key.trim();
            let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
                Some(hex) => i64::from_str_radix(hex, 16),
                None => trimmed.parse::<i64>(),
            };
            parsed
                .map(|value| (value, text))
                .map_err(|_| serde::de::Error::custom(format!("invalid description key {:?}", key)))
        })
        .collect()
}

#[derive(Deserialize)]
struct DictionaryFile {
    #[serde(default)]
    objects: Vec<DictionaryEntry>,
}

/// Table of entries keyed by (index, subindex).
#[derive(Debug, Clone, Default)]
pub struct ObjectDictionary {
    entries: BTreeMap<(u16, u8), Arc<DictionaryEntry>>,
}

impl ObjectDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a dictionary from a TOML document of `[[objects]]` tables.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        let file: DictionaryFile = toml::from_str(text)?;
        let mut dictionary = Self::new();
        for entry in file.objects {
            dictionary.add(entry);
        }
        Ok(dictionary)
    }

    /// Insert an entry, replacing any previous one at the same address.
    pub fn add(&mut self, entry: DictionaryEntry) {
        self.entries
            .insert((entry.index, entry.subindex), Arc::new(entry));
    }

    pub fn get(&self, index: u16, subindex: u8) -> Option<&Arc<DictionaryEntry>> {
        self.entries.get(&(index, subindex))
    }

    /// Resolve an address the way an SDO server has to report it.
    pub fn find(&self, index: u16, subindex: u8) -> Result<&Arc<DictionaryEntry>, AbortCode> {
        match self.get(index, subindex) {
            Some(entry) => Ok(entry),
            None if self.contains_index(index) => Err(AbortCode::SUBINDEX_DOES_NOT_EXIST),
            None => Err(AbortCode::OBJECT_DOES_NOT_EXIST),
        }
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Arc<DictionaryEntry>> {
        self.entries.values().find(|entry| entry.name == name)
    }

    pub fn contains_index(&self, index: u16) -> bool {
        self.entries
            .range((index, u8::MIN)..=(index, u8::MAX))
            .next()
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in (index, subindex) order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<DictionaryEntry>> {
        self.entries.values()
    }
}
