#![allow(dead_code)]

use std::sync::{Arc, Once};
use tracing::Level;

use canopen_common::{
    AccessType, DataType, DictionaryEntry, LocalNode, ObjectDictionary, RemoteNode, SdoChannel,
    SdoClient, SdoServer,
};

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .without_time()
            .with_test_writer()
            .try_init();
    });
}

/// Dictionary shared by both ends of the virtual bus.
pub fn sample_dictionary() -> ObjectDictionary {
    let mut dictionary = ObjectDictionary::new();
    dictionary.add(
        DictionaryEntry::new(0x1000, 0, "Device type", DataType::Unsigned32)
            .with_access(AccessType::Ro)
            .with_default(0x0001_0191u32),
    );
    dictionary.add(
        DictionaryEntry::new(0x1001, 0, "Error register", DataType::Unsigned8)
            .with_access(AccessType::Ro)
            .with_default(0u8),
    );
    dictionary.add(DictionaryEntry::new(0x1003, 0, "Number of errors", DataType::Unsigned8).with_default(0u8));
    for subindex in 1..=8u8 {
        dictionary.add(DictionaryEntry::new(
            0x1003,
            subindex,
            format!("Pre-defined error field {}", subindex),
            DataType::Unsigned32,
        ));
    }
    dictionary.add(
        DictionaryEntry::new(0x1008, 0, "Manufacturer device name", DataType::VisibleString)
            .with_default("TEST DEVICE"),
    );
    dictionary.add(
        DictionaryEntry::new(0x1017, 0, "Producer heartbeat time", DataType::Unsigned16)
            .with_unit("ms")
            .with_default(0u16),
    );
    dictionary.add(DictionaryEntry::new(0x1018, 0, "Identity object", DataType::Unsigned8).with_default(4u8));
    dictionary.add(DictionaryEntry::new(0x1018, 1, "Vendor-ID", DataType::Unsigned32).with_default(0u32));
    dictionary.add(
        DictionaryEntry::new(0x1018, 2, "Product code", DataType::Unsigned32)
            .with_access(AccessType::Ro)
            .with_default(0x1234u32),
    );
    dictionary.add(
        DictionaryEntry::new(0x2000, 0, "Temperature", DataType::Integer16)
            .with_unit("degC")
            .with_factor(0.1)
            .with_default(215i16),
    );
    dictionary.add(
        DictionaryEntry::new(0x2001, 0, "Operating mode", DataType::Unsigned8)
            .with_description(0, "Off")
            .with_description(1, "Standby")
            .with_description(2, "Running")
            .with_default(1u8),
    );
    dictionary.add(
        DictionaryEntry::new(0x2002, 0, "Status word", DataType::Unsigned16)
            .with_bit_definition("FAULT", vec![3])
            .with_bit_definition("STATE", vec![8, 9, 10])
            .with_default(0u16),
    );
    dictionary.add(
        DictionaryEntry::new(0x2003, 0, "Sensor Sampling Rate (Hz)", DataType::Real32).with_default(5.2f32),
    );
    dictionary.add(DictionaryEntry::new(0x2004, 0, "Calibration blob", DataType::Domain));
    dictionary
}

/// Both ends of one SDO channel: a served local node and a remote handle to it.
pub struct VirtualBus {
    pub local: Arc<LocalNode>,
    pub remote: RemoteNode,
}

/// Must be called from within a tokio runtime, the server runs as a task.
pub fn virtual_bus() -> VirtualBus {
    init_tracing();
    let dictionary = Arc::new(sample_dictionary());
    let (client_end, server_end) = SdoChannel::pair();
    let local = Arc::new(LocalNode::new(2, dictionary.clone()));
    tokio::spawn(SdoServer::new(local.clone()).run(server_end));
    let remote = RemoteNode::new(2, dictionary, SdoClient::new(client_end));
    VirtualBus { local, remote }
}
