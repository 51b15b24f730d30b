//! # Mock CANopen Node
//!
//! A CANopen node simulator serving an object dictionary over SDO.
//!
//! This mock node:
//! - Answers SDO upload and download requests (expedited and segmented)
//! - Serves the built-in demonstration dictionary or a TOML dictionary file
//! - Simulates dynamic values (sensor readings, counters) through read callbacks
//!
//! ## Usage
//!
//! ```bash
//! # Start the mock node on vcan0 with node ID 4
//! cargo run -p mock-canopen-node -- --interface vcan0 --node-id 4
//! ```

mod config;
mod object_dictionary;

use anyhow::{bail, Context};
use canopen_common::network::SDO_RX_BASE;
use canopen_common::{LocalNode, Network, ObjectDictionary, SdoServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::NodeConfig;

/// Command line overrides of the configuration file.
#[derive(Debug, Default)]
struct Args {
    interface: Option<String>,
    node_id: Option<u8>,
    config: Option<PathBuf>,
    dictionary: Option<PathBuf>,
    help: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().with_context(|| format!("{} needs a value", name));
        match arg.as_str() {
            "--interface" | "-i" => parsed.interface = Some(value(&arg)?),
            "--node-id" | "-n" => {
                let text = value(&arg)?;
                parsed.node_id = Some(text.parse().with_context(|| format!("invalid node id {:?}", text))?);
            }
            "--config" | "-c" => parsed.config = Some(value(&arg)?.into()),
            "--dictionary" | "-d" => parsed.dictionary = Some(value(&arg)?.into()),
            "--help" | "-h" => parsed.help = true,
            other => bail!("unknown argument {:?}", other),
        }
    }
    Ok(parsed)
}

fn print_usage() {
    println!("Usage: mock-node [--interface IF] [--node-id N] [--config FILE] [--dictionary FILE]");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_dictionary(config: &NodeConfig) -> anyhow::Result<ObjectDictionary> {
    match &config.dictionary {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read dictionary {:?}", path))?;
            let od = ObjectDictionary::from_toml_str(&text)
                .with_context(|| format!("failed to parse dictionary {:?}", path))?;
            info!("Object dictionary loaded from {:?}", path);
            Ok(od)
        }
        None => Ok(object_dictionary::build(config.node_id)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = parse_args(std::env::args().skip(1))?;
    if args.help {
        print_usage();
        return Ok(());
    }

    let mut config = NodeConfig::load(args.config.as_deref());
    if let Some(interface) = args.interface {
        config.can_interface = interface;
    }
    if let Some(node_id) = args.node_id {
        config.node_id = node_id;
    }
    if let Some(dictionary) = args.dictionary {
        config.dictionary = Some(dictionary);
    }

    info!("Mock CANopen node starting");
    info!("   Interface: {}", config.can_interface);
    info!("   Node ID: {}", config.node_id);

    let od = load_dictionary(&config)?;
    info!("Object dictionary loaded with {} objects", od.len());
    for entry in od.iter() {
        info!(
            "  0x{:04X}:{:02X} - {} ({}, {:?})",
            entry.index, entry.subindex, entry.name, entry.data_type, entry.access_type
        );
    }

    let node = Arc::new(LocalNode::new(config.node_id, Arc::new(od)));
    if config.dictionary.is_none() {
        object_dictionary::add_dynamic_values(&node);
    }

    let network = match Network::connect(&config.can_interface) {
        Ok(network) => network,
        Err(e) => {
            error!("Failed to open CAN socket: {}", e);
            error!("Troubleshooting:");
            error!("  1. Create virtual CAN interface:");
            error!("     sudo modprobe vcan");
            error!("     sudo ip link add dev vcan0 type vcan");
            error!("     sudo ip link set up vcan0");
            error!("  2. Check interface exists: ip link show");
            return Err(e.into());
        }
    };
    let channel = network.sdo_server_channel(config.node_id)?;
    let server = SdoServer::new(node).with_timeout(config.sdo_timeout());

    info!(
        "Mock node is running, waiting for SDO requests on COB-ID 0x{:03X}",
        SDO_RX_BASE + u16::from(config.node_id)
    );
    tokio::select! {
        _ = server.run(channel) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            info!("Shutting down");
        }
    }
    Ok(())
}
