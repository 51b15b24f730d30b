//! Node handles: a [`LocalNode`] owns a dictionary and its data, a
//! [`RemoteNode`] reaches a peer's dictionary through an [`SdoClient`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use crate::callbacks::{Access, CallbackRegistry, CallbackResult, Direction};
use crate::error::AccessError;
use crate::objectdictionary::{DictionaryEntry, ObjectDictionary};
use crate::sdo::{AbortCode, SdoClient};
use crate::variable::{LocalVariable, RemoteVariable};

/// A node serving its own object dictionary.
#[derive(Debug)]
pub struct LocalNode {
    id: u8,
    dictionary: Arc<ObjectDictionary>,
    data_store: Mutex<HashMap<(u16, u8), Vec<u8>>>,
    callbacks: CallbackRegistry,
}

impl LocalNode {
    pub fn new(id: u8, dictionary: Arc<ObjectDictionary>) -> Self {
        Self {
            id,
            dictionary,
            data_store: Mutex::new(HashMap::new()),
            callbacks: CallbackRegistry::new(),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn dictionary(&self) -> &Arc<ObjectDictionary> {
        &self.dictionary
    }

    /// Register a callback run on every read and write of this node's data.
    pub fn add_callback<F>(&self, callback: F)
    where
        F: Fn(&Access<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.callbacks.register(callback);
    }

    /// Current bytes of an entry.
    ///
    /// Lookup order: callback override, stored value, declared default.
    pub fn get_data(&self, index: u16, subindex: u8, check_readable: bool) -> Result<Vec<u8>, AbortCode> {
        let entry = self.dictionary.find(index, subindex)?;
        if check_readable && !entry.access_type.is_readable() {
            return Err(AbortCode::READ_OF_WRITE_ONLY);
        }

        let access = Access {
            index,
            subindex,
            direction: Direction::Upload,
            data: None,
            entry,
        };
        if let Some(data) = self.callbacks.invoke(&access)? {
            debug!(index, subindex, "Value of {} provided by callback", entry.name);
            return Ok(data);
        }

        if let Some(data) = self.stored(index, subindex) {
            return Ok(data);
        }

        match entry.encoded_default() {
            Ok(Some(data)) => Ok(data),
            Ok(None) => Err(AbortCode::NO_DATA_AVAILABLE),
            Err(e) => {
                warn!(index, subindex, "Default of {} cannot be encoded: {}", entry.name, e);
                Err(AbortCode::GENERAL_ERROR)
            }
        }
    }

    /// Store new bytes for an entry after running the callbacks.
    pub fn set_data(&self, index: u16, subindex: u8, data: &[u8], check_writable: bool) -> Result<(), AbortCode> {
        let entry = self.dictionary.find(index, subindex)?;
        if check_writable && !entry.access_type.is_writable() {
            return Err(AbortCode::WRITE_OF_READ_ONLY);
        }
        check_length(entry, data)?;

        let access = Access {
            index,
            subindex,
            direction: Direction::Download,
            data: Some(data),
            entry,
        };
        self.callbacks.invoke(&access)?;

        debug!(index, subindex, "Storing {} bytes for {}", data.len(), entry.name);
        self.data_store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((index, subindex), data.to_vec());
        Ok(())
    }

    fn stored(&self, index: u16, subindex: u8) -> Option<Vec<u8>> {
        self.data_store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(index, subindex))
            .cloned()
    }

    pub fn variable(self: &Arc<Self>, index: u16, subindex: u8) -> Result<LocalVariable, AccessError> {
        let entry = self
            .dictionary
            .get(index, subindex)
            .ok_or(AccessError::UnknownObject { index, subindex })?;
        Ok(LocalVariable::new(self.clone(), entry.clone()))
    }

    pub fn variable_by_name(self: &Arc<Self>, name: &str) -> Result<LocalVariable, AccessError> {
        let entry = self
            .dictionary
            .get_by_name(name)
            .ok_or_else(|| AccessError::UnknownName(name.to_string()))?;
        Ok(LocalVariable::new(self.clone(), entry.clone()))
    }
}

fn check_length(entry: &DictionaryEntry, data: &[u8]) -> Result<(), AbortCode> {
    match entry.data_type.size() {
        Some(size) if data.len() > size => Err(AbortCode::LENGTH_TOO_HIGH),
        Some(size) if data.len() < size => Err(AbortCode::LENGTH_TOO_LOW),
        _ => Ok(()),
    }
}

/// A peer node reached over SDO.
#[derive(Debug, Clone)]
pub struct RemoteNode {
    id: u8,
    dictionary: Arc<ObjectDictionary>,
    sdo: Arc<SdoClient>,
}

impl RemoteNode {
    pub fn new(id: u8, dictionary: Arc<ObjectDictionary>, sdo: SdoClient) -> Self {
        Self {
            id,
            dictionary,
            sdo: Arc::new(sdo),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn dictionary(&self) -> &Arc<ObjectDictionary> {
        &self.dictionary
    }

    pub fn sdo(&self) -> &Arc<SdoClient> {
        &self.sdo
    }

    pub fn variable(&self, index: u16, subindex: u8) -> Result<RemoteVariable, AccessError> {
        let entry = self
            .dictionary
            .get(index, subindex)
            .ok_or(AccessError::UnknownObject { index, subindex })?;
        Ok(RemoteVariable::new(self.sdo.clone(), entry.clone()))
    }

    pub fn variable_by_name(&self, name: &str) -> Result<RemoteVariable, AccessError> {
        let entry = self
            .dictionary
            .get_by_name(name)
            .ok_or_else(|| AccessError::UnknownName(name.to_string()))?;
        Ok(RemoteVariable::new(self.sdo.clone(), entry.clone()))
    }
}
