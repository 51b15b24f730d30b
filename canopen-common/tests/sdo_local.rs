//! SDO client and server against each other over an in-memory bus.

mod common;

use std::sync::{Arc, Mutex};

use canopen_common::{AbortCode, BitKey, Direction, SdoError, Value, Variable};
use common::virtual_bus;

#[tokio::test]
async fn expedited_upload() {
    let bus = virtual_bus();
    let local = bus.local.variable_by_name("Producer heartbeat time").unwrap();
    local.set_raw(&Value::from(0x99u16)).await.unwrap();

    let remote = bus.remote.variable_by_name("Producer heartbeat time").unwrap();
    assert_eq!(remote.raw().await.unwrap(), Value::Unsigned(0x99));
}

#[tokio::test]
async fn upload_default_visible_string() {
    let bus = virtual_bus();
    let remote = bus.remote.variable_by_name("Manufacturer device name").unwrap();
    assert_eq!(remote.raw().await.unwrap(), Value::Text("TEST DEVICE".into()));
}

#[tokio::test]
async fn upload_default_real() {
    let bus = virtual_bus();
    let remote = bus.remote.variable_by_name("Sensor Sampling Rate (Hz)").unwrap();
    match remote.raw().await.unwrap() {
        Value::Float(rate) => assert!((rate - 5.2).abs() < 0.01),
        other => panic!("unexpected value {:?}", other),
    }
}

#[tokio::test]
async fn segmented_upload() {
    let bus = virtual_bus();
    let local = bus.local.variable(0x1008, 0).unwrap();
    local.set_raw(&Value::from("Some cool device")).await.unwrap();

    let remote = bus.remote.variable(0x1008, 0).unwrap();
    assert_eq!(remote.data().await.unwrap(), b"Some cool device");
}

#[tokio::test]
async fn expedited_download() {
    let bus = virtual_bus();
    let remote = bus.remote.variable_by_name("Vendor-ID").unwrap();
    remote.set_raw(&Value::from(0xfeffu32)).await.unwrap();

    let local = bus.local.variable_by_name("Vendor-ID").unwrap();
    assert_eq!(local.raw().await.unwrap(), Value::Unsigned(0xfeff));
}

#[tokio::test]
async fn segmented_download() {
    let bus = virtual_bus();
    let remote = bus.remote.variable(0x1008, 0).unwrap();
    remote.set_raw(&Value::from("Another cool device")).await.unwrap();

    let local = bus.local.variable(0x1008, 0).unwrap();
    assert_eq!(local.data().await.unwrap(), b"Another cool device");
}

#[tokio::test]
async fn empty_domain_round_trip() {
    let bus = virtual_bus();
    let sdo = bus.remote.sdo();
    sdo.download(0x2004, 0, &[]).await.unwrap();
    assert_eq!(sdo.upload(0x2004, 0).await.unwrap(), Vec::<u8>::new());

    let blob: Vec<u8> = (0..=255).collect();
    sdo.download(0x2004, 0, &blob).await.unwrap();
    assert_eq!(sdo.upload(0x2004, 0).await.unwrap(), blob);
}

#[tokio::test]
async fn abort_codes() {
    let bus = virtual_bus();
    let sdo = bus.remote.sdo();

    match sdo.upload(0x1234, 0).await {
        Err(SdoError::Aborted(error)) => {
            assert_eq!(error.code, AbortCode::OBJECT_DOES_NOT_EXIST);
            assert_eq!((error.index, error.subindex), (0x1234, 0));
        }
        other => panic!("expected abort, got {:?}", other),
    }

    let error = sdo.upload(0x1018, 100).await.unwrap_err();
    assert_eq!(error.abort_code(), Some(AbortCode::SUBINDEX_DOES_NOT_EXIST));
}

#[tokio::test]
async fn server_enforces_access_rights() {
    let bus = virtual_bus();
    let error = bus.remote.sdo().download(0x1018, 2, &[1, 0, 0, 0]).await.unwrap_err();
    assert_eq!(error.abort_code(), Some(AbortCode::WRITE_OF_READ_ONLY));

    let error = bus.remote.sdo().download(0x1017, 0, &[1, 0, 0, 0]).await.unwrap_err();
    assert_eq!(error.abort_code(), Some(AbortCode::LENGTH_TOO_HIGH));

    // the variable layer only warns, the server still refuses
    let product = bus.remote.variable_by_name("Product code").unwrap();
    let error = product.set_raw(&Value::from(1u32)).await.unwrap_err();
    assert_eq!(error.abort_code(), Some(AbortCode::WRITE_OF_READ_ONLY));
}

type Seen = Arc<Mutex<Vec<(u16, u8, Direction, Option<Vec<u8>>)>>>;

#[tokio::test]
async fn callbacks_observe_and_override() {
    let bus = virtual_bus();
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let record = seen.clone();
    bus.local.add_callback(move |access| {
        record.lock().unwrap().push((
            access.index,
            access.subindex,
            access.direction,
            access.data.map(<[u8]>::to_vec),
        ));
        if access.index == 0x1003 && access.direction == Direction::Upload {
            Ok(Some(0x0201u32.to_le_bytes().to_vec()))
        } else {
            Ok(None)
        }
    });

    let data = bus.remote.sdo().upload(0x1003, 5).await.unwrap();
    assert_eq!(data, vec![0x01, 0x02, 0x00, 0x00]);
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[(0x1003, 5, Direction::Upload, None)]
    );

    bus.remote.sdo().download(0x1003, 6, &[3, 4, 5, 6]).await.unwrap();
    assert_eq!(
        seen.lock().unwrap().last(),
        Some(&(0x1003, 6, Direction::Download, Some(vec![3, 4, 5, 6])))
    );
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn callback_can_reject_a_download() {
    let bus = virtual_bus();
    bus.local.add_callback(|access| match access.data {
        Some(data) if access.index == 0x1017 && data == [0xFF, 0xFF] => Err(AbortCode::VALUE_TOO_HIGH),
        _ => Ok(None),
    });
    let error = bus.remote.sdo().download(0x1017, 0, &[0xFF, 0xFF]).await.unwrap_err();
    assert_eq!(error.abort_code(), Some(AbortCode::VALUE_TOO_HIGH));
    bus.remote.sdo().download(0x1017, 0, &[0xE8, 0x03]).await.unwrap();
}

#[tokio::test]
async fn remote_views() {
    let bus = virtual_bus();

    let temperature = bus.remote.variable_by_name("Temperature").unwrap();
    match temperature.phys().await.unwrap() {
        Value::Float(t) => assert!((t - 21.5).abs() < 1e-9),
        other => panic!("unexpected value {:?}", other),
    }
    temperature.set_phys(&Value::Float(-4.5)).await.unwrap();
    assert_eq!(temperature.raw().await.unwrap(), Value::Integer(-45));

    let mode = bus.remote.variable_by_name("Operating mode").unwrap();
    assert_eq!(mode.desc().await.unwrap(), "Standby");
    mode.set_desc("Running").await.unwrap();
    assert_eq!(mode.raw().await.unwrap(), Value::Unsigned(2));

    let status = bus.remote.variable_by_name("Status word").unwrap();
    status.set_bits(BitKey::from("STATE"), 0b101).await.unwrap();
    status.set_bits(BitKey::Bit(3), 1).await.unwrap();
    assert_eq!(status.raw().await.unwrap(), Value::Unsigned(0b101_0000_1000));
    assert_eq!(status.bits(BitKey::from(8..11)).await.unwrap(), 0b101);
    assert_eq!(status.bits("FAULT".into()).await.unwrap(), 1);
}

#[tokio::test]
async fn concurrent_transfers_are_queued() {
    let bus = virtual_bus();
    bus.local
        .variable(0x1008, 0)
        .unwrap()
        .set_raw(&Value::from("A name that needs several segments"))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let sdo = bus.remote.sdo().clone();
        tasks.push(tokio::spawn(async move { sdo.upload(0x1008, 0).await }));
    }
    for task in tasks {
        assert_eq!(
            task.await.unwrap().unwrap(),
            b"A name that needs several segments".to_vec()
        );
    }
}
