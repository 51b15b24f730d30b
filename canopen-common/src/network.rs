//! SocketCAN binding: maps SDO channels onto CAN identifiers.
//!
//! A background task polls the non-blocking socket and routes every standard
//! frame by COB-ID to the channel registered for it. Each channel gets a
//! writer task that puts its outgoing payloads on the bus.

use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Id, Socket, StandardId};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::NetworkError;
use crate::transport::{SdoChannel, SdoFrame};

/// Base COB-ID of client to server SDO frames.
pub const SDO_RX_BASE: u16 = 0x600;
/// Base COB-ID of server to client SDO frames.
pub const SDO_TX_BASE: u16 = 0x580;

const POLL_INTERVAL: Duration = Duration::from_millis(1);
const WRITE_RETRIES: usize = 10;

type Routes = Arc<Mutex<HashMap<u16, mpsc::UnboundedSender<SdoFrame>>>>;

/// An open CAN interface.
pub struct Network {
    interface: String,
    socket: Arc<Mutex<CanSocket>>,
    routes: Routes,
    reader: JoinHandle<()>,
}

impl Network {
    /// Open `interface` (e.g. `vcan0`) and start routing incoming frames.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(interface: &str) -> Result<Self, NetworkError> {
        let socket = CanSocket::open(interface)?;
        socket.set_nonblocking(true)?;
        let socket = Arc::new(Mutex::new(socket));
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(read_frames(socket.clone(), routes.clone()));
        info!(interface, "CAN interface opened");
        Ok(Self {
            interface: interface.to_string(),
            socket,
            routes,
            reader,
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Channel of an SDO client talking to node `node_id`.
    pub fn sdo_client_channel(&self, node_id: u8) -> Result<SdoChannel, NetworkError> {
        check_node_id(node_id)?;
        let id = u16::from(node_id);
        self.channel(SDO_TX_BASE + id, SDO_RX_BASE + id)
    }

    /// Channel of the SDO server of node `node_id`.
    pub fn sdo_server_channel(&self, node_id: u8) -> Result<SdoChannel, NetworkError> {
        check_node_id(node_id)?;
        let id = u16::from(node_id);
        self.channel(SDO_RX_BASE + id, SDO_TX_BASE + id)
    }

    fn channel(&self, rx_cob_id: u16, tx_cob_id: u16) -> Result<SdoChannel, NetworkError> {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        {
            let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
            if routes.get(&rx_cob_id).is_some_and(|route| !route.is_closed()) {
                return Err(NetworkError::CobIdInUse(rx_cob_id));
            }
            routes.insert(rx_cob_id, in_tx);
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_frames(self.socket.clone(), tx_cob_id, out_rx));
        debug!(
            "SDO channel receiving 0x{:03X}, sending 0x{:03X}",
            rx_cob_id, tx_cob_id
        );
        Ok(SdoChannel::new(out_tx, in_rx))
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn check_node_id(node_id: u8) -> Result<(), NetworkError> {
    if (1..=127).contains(&node_id) {
        Ok(())
    } else {
        Err(NetworkError::InvalidNodeId(node_id))
    }
}

async fn read_frames(socket: Arc<Mutex<CanSocket>>, routes: Routes) {
    loop {
        let frame = {
            let socket = socket.lock().unwrap_or_else(PoisonError::into_inner);
            socket.read_frame()
        };

        match frame {
            Ok(frame) => route(&routes, &frame),
            Err(e) if e.kind() == ErrorKind::WouldBlock => tokio::time::sleep(POLL_INTERVAL).await,
            Err(e) => {
                warn!("CAN read error: {}", e);
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}

fn route(routes: &Routes, frame: &CanFrame) {
    let cob_id = match frame.id() {
        Id::Standard(id) => id.as_raw(),
        Id::Extended(_) => return,
    };
    let mut routes = routes.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(route) = routes.get(&cob_id) else {
        return;
    };

    let mut payload: SdoFrame = [0; 8];
    let data = frame.data();
    let len = data.len().min(payload.len());
    payload[..len].copy_from_slice(&data[..len]);
    if route.send(payload).is_err() {
        debug!("SDO channel for 0x{:03X} closed", cob_id);
        routes.remove(&cob_id);
    }
}

async fn write_frames(socket: Arc<Mutex<CanSocket>>, cob_id: u16, mut outgoing: mpsc::UnboundedReceiver<SdoFrame>) {
    let Some(id) = StandardId::new(cob_id) else {
        warn!("0x{:X} is not a standard CAN identifier", cob_id);
        return;
    };
    while let Some(payload) = outgoing.recv().await {
        let Some(frame) = CanFrame::new(id, &payload) else {
            continue;
        };
        for attempt in 0..WRITE_RETRIES {
            let result = {
                let socket = socket.lock().unwrap_or_else(PoisonError::into_inner);
                socket.write_frame(&frame)
            };
            match result {
                Ok(()) => break,
                Err(e) if e.kind() == ErrorKind::WouldBlock && attempt + 1 < WRITE_RETRIES => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(e) => {
                    warn!("Failed to send frame on 0x{:03X}: {}", cob_id, e);
                    break;
                }
            }
        }
    }
}
