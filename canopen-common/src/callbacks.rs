//! Observer hooks invoked on every access to a local object dictionary.

use std::sync::{Arc, PoisonError, RwLock};

use crate::objectdictionary::DictionaryEntry;
use crate::sdo::AbortCode;

/// Direction of an access, seen from the node owning the dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Data leaves the dictionary (SDO upload, local read).
    Upload,
    /// Data enters the dictionary (SDO download, local write).
    Download,
}

/// Context handed to a callback.
#[derive(Debug, Clone, Copy)]
pub struct Access<'a> {
    pub index: u16,
    pub subindex: u8,
    pub direction: Direction,
    /// Incoming bytes of a download, `None` for uploads.
    pub data: Option<&'a [u8]>,
    pub entry: &'a DictionaryEntry,
}

/// Outcome of a callback: `Ok(Some(bytes))` overrides the uploaded value,
/// `Ok(None)` leaves it alone and `Err(code)` rejects the access.
pub type CallbackResult = Result<Option<Vec<u8>>, AbortCode>;

pub type Callback = Arc<dyn Fn(&Access<'_>) -> CallbackResult + Send + Sync>;

/// Ordered list of callbacks owned by one node.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: RwLock<Vec<Callback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback. Callbacks run in registration order.
    pub fn register<F>(&self, callback: F)
    where
        F: Fn(&Access<'_>) -> CallbackResult + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    pub fn len(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every callback once for `access`.
    ///
    /// The first non-empty override wins, later overrides are ignored but
    /// their callbacks still run. The first rejection stops the chain.
    ///
    /// Runs on a snapshot of the list, so a callback may register further
    /// callbacks. Those take part from the next access on.
    pub fn invoke(&self, access: &Access<'_>) -> CallbackResult {
        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut result = None;
        for callback in callbacks.iter() {
            if let Some(data) = callback(access)? {
                if result.is_none() && !data.is_empty() {
                    result = Some(data);
                }
            }
        }
        Ok(result)
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::DataType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn upload<'a>(entry: &'a DictionaryEntry) -> Access<'a> {
        Access {
            index: entry.index,
            subindex: entry.subindex,
            direction: Direction::Upload,
            data: None,
            entry,
        }
    }

    #[test]
    fn first_non_empty_override_wins() {
        let entry = DictionaryEntry::new(0x1003, 5, "Error field", DataType::Unsigned32);
        let registry = CallbackRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        registry.register(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Vec::new()))
        });
        let counter = calls.clone();
        registry.register(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(vec![1, 2, 0, 0]))
        });
        let counter = calls.clone();
        registry.register(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(vec![9, 9, 9, 9]))
        });

        assert_eq!(registry.invoke(&upload(&entry)), Ok(Some(vec![1, 2, 0, 0])));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn rejection_stops_the_chain() {
        let entry = DictionaryEntry::new(0x2000, 0, "Locked", DataType::Unsigned8);
        let registry = CallbackRegistry::new();
        let reached = Arc::new(AtomicUsize::new(0));
        registry.register(|_| Err(AbortCode::CANNOT_STORE_DEVICE_STATE));
        let flag = reached.clone();
        registry.register(move |_| {
            flag.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        });

        assert_eq!(
            registry.invoke(&upload(&entry)),
            Err(AbortCode::CANNOT_STORE_DEVICE_STATE)
        );
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn callback_may_register_another() {
        let entry = DictionaryEntry::new(0x2001, 0, "Counter", DataType::Unsigned32);
        let registry = Arc::new(CallbackRegistry::new());
        let weak = Arc::downgrade(&registry);
        registry.register(move |_| {
            if let Some(registry) = weak.upgrade() {
                if registry.len() == 1 {
                    registry.register(|_| Ok(Some(vec![7, 0, 0, 0])));
                }
            }
            Ok(None)
        });

        assert_eq!(registry.invoke(&upload(&entry)), Ok(None));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.invoke(&upload(&entry)), Ok(Some(vec![7, 0, 0, 0])));
    }

    #[test]
    fn empty_registry_overrides_nothing() {
        let entry = DictionaryEntry::new(0x1000, 0, "Device type", DataType::Unsigned32);
        let registry = CallbackRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.invoke(&upload(&entry)), Ok(None));
    }
}
