//! Object Dictionary for the mock CANopen node
//!
//! Static entries carry their value as a default, dynamic ones (simulated
//! sensors and counters) are produced by a read callback on every upload.

use canopen_common::{AccessType, DataType, DictionaryEntry, Direction, LocalNode, ObjectDictionary};
use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};

/// Standard and demonstration objects of the mock node.
pub fn build(node_id: u8) -> ObjectDictionary {
    let mut od = ObjectDictionary::new();

    // Communication profile area
    od.add(
        DictionaryEntry::new(0x1000, 0x00, "Device type", DataType::Unsigned32)
            .with_access(AccessType::Ro)
            .with_default(0x0000_0191u32),
    );
    od.add(
        DictionaryEntry::new(0x1001, 0x00, "Error register", DataType::Unsigned8)
            .with_access(AccessType::Ro)
            .with_default(0u8),
    );
    od.add(
        DictionaryEntry::new(0x1008, 0x00, "Manufacturer device name", DataType::VisibleString)
            .with_access(AccessType::Const)
            .with_default("MockCANopenNode"),
    );
    od.add(
        DictionaryEntry::new(0x1017, 0x00, "Producer heartbeat time", DataType::Unsigned16)
            .with_unit("ms")
            .with_default(0u16),
    );
    od.add(
        DictionaryEntry::new(0x1018, 0x00, "Identity object", DataType::Unsigned8)
            .with_access(AccessType::Const)
            .with_default(2u8),
    );
    od.add(
        DictionaryEntry::new(0x1018, 0x01, "Vendor-ID", DataType::Unsigned32)
            .with_access(AccessType::Ro)
            .with_default(0x0000_0001u32),
    );
    od.add(
        DictionaryEntry::new(0x1018, 0x02, "Product code", DataType::Unsigned32)
            .with_access(AccessType::Ro)
            .with_default(0x0000_1000u32 + u32::from(node_id)),
    );

    // Manufacturer specific area
    od.add(
        DictionaryEntry::new(0x2000, 0x01, "Temperature", DataType::Real32)
            .with_access(AccessType::Ro)
            .with_unit("degC"),
    );
    od.add(
        DictionaryEntry::new(0x2000, 0x02, "Pressure", DataType::Real32)
            .with_access(AccessType::Ro)
            .with_unit("kPa"),
    );
    od.add(DictionaryEntry::new(0x2001, 0x01, "Counter", DataType::Unsigned32).with_access(AccessType::Ro));
    od.add(
        DictionaryEntry::new(0x2002, 0x01, "Voltage", DataType::Real32)
            .with_access(AccessType::Ro)
            .with_unit("V"),
    );
    od.add(
        DictionaryEntry::new(0x2002, 0x02, "Current", DataType::Real32)
            .with_access(AccessType::Ro)
            .with_unit("A"),
    );
    od.add(
        DictionaryEntry::new(0x2003, 0x01, "Status word", DataType::Unsigned16)
            .with_default(0x0031u16)
            .with_bit_definition("READY_TO_SWITCH_ON", vec![0])
            .with_bit_definition("SWITCHED_ON", vec![1])
            .with_bit_definition("OPERATION_ENABLED", vec![2])
            .with_bit_definition("FAULT", vec![3])
            .with_bit_definition("VOLTAGE_ENABLED", vec![4])
            .with_bit_definition("QUICK_STOP", vec![5]),
    );
    od.add(DictionaryEntry::new(0x2003, 0x02, "Control word", DataType::Unsigned16).with_default(0x000Fu16));
    od.add(
        DictionaryEntry::new(0x2004, 0x01, "Motor speed", DataType::Integer32)
            .with_access(AccessType::Ro)
            .with_unit("rpm"),
    );
    od.add(DictionaryEntry::new(0x2005, 0x01, "Position", DataType::Integer32).with_access(AccessType::Ro));
    od.add(
        DictionaryEntry::new(0x2006, 0x01, "Operating mode", DataType::Unsigned8)
            .with_default(0u8)
            .with_description(0, "Off")
            .with_description(1, "Manual")
            .with_description(2, "Automatic"),
    );
    // 23.50 degC in hundredths, the way a PDO would carry it
    od.add(
        DictionaryEntry::new(0x2007, 0x01, "Board temperature", DataType::Integer16)
            .with_access(AccessType::Ro)
            .with_unit("degC")
            .with_factor(0.01)
            .with_default(2350i16),
    );

    od
}

/// Register the read callback producing the simulated sensor values.
pub fn add_dynamic_values(node: &LocalNode) {
    let counter = AtomicU32::new(0);
    let position = AtomicU32::new(0);

    node.add_callback(move |access| {
        if access.direction != Direction::Upload {
            return Ok(None);
        }
        let mut rng = rand::rng();
        let data = match (access.index, access.subindex) {
            (0x2000, 0x01) => rng.random_range(20.0f32..30.0).to_le_bytes().to_vec(),
            (0x2000, 0x02) => rng.random_range(95.0f32..105.0).to_le_bytes().to_vec(),
            (0x2001, 0x01) => counter.fetch_add(1, Ordering::SeqCst).to_le_bytes().to_vec(),
            (0x2002, 0x01) => rng.random_range(11.5f32..12.5).to_le_bytes().to_vec(),
            (0x2002, 0x02) => rng.random_range(0.5f32..5.0).to_le_bytes().to_vec(),
            (0x2004, 0x01) => rng.random_range(1000i32..3000).to_le_bytes().to_vec(),
            (0x2005, 0x01) => (position.fetch_add(10, Ordering::SeqCst) as i32).to_le_bytes().to_vec(),
            _ => return Ok(None),
        };
        Ok(Some(data))
    });
}
