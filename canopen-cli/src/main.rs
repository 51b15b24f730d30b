//! # canopen-sdo
//!
//! Reads or writes one object dictionary entry of a remote CANopen node over
//! SDO.
//!
//! ```bash
//! canopen-sdo --node-id 4 read 0x1008 0
//! canopen-sdo --node-id 4 --dictionary od.toml read 0x2007 1 --phys
//! canopen-sdo --node-id 4 write 0x1017 0 "E8 03"
//! ```

mod args;
mod config;

use anyhow::{bail, Context};
use canopen_common::datatypes::parse_hex;
use canopen_common::{Network, ObjectDictionary, RemoteNode, SdoClient, Value, Variable};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use args::{Command, View};
use config::CliConfig;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<_>>()
        .join(" ")
}

fn load_dictionary(config: &CliConfig) -> anyhow::Result<Option<ObjectDictionary>> {
    let Some(path) = &config.dictionary else {
        return Ok(None);
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read dictionary {:?}", path))?;
    let od = ObjectDictionary::from_toml_str(&text).with_context(|| format!("failed to parse dictionary {:?}", path))?;
    debug!("Object dictionary {:?} has {} objects", path, od.len());
    Ok(Some(od))
}

/// Typed access through the dictionary entry.
async fn run_typed(node: &RemoteNode, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Read { index, subindex, view } => {
            let variable = node.variable(index, subindex)?;
            match view {
                View::Raw => println!("{}", variable.raw().await?),
                View::Phys => {
                    let value = variable.phys().await?;
                    let unit = &variable.entry().unit;
                    if unit.is_empty() {
                        println!("{}", value);
                    } else {
                        println!("{} {}", value, unit);
                    }
                }
                View::Desc => println!("{}", variable.desc().await?),
            }
        }
        Command::Write {
            index,
            subindex,
            value,
            view,
        } => {
            let variable = node.variable(index, subindex)?;
            match view {
                View::Raw => {
                    let raw = Value::parse(variable.entry().data_type, &value)?;
                    variable.set_raw(&raw).await?;
                }
                View::Phys => {
                    let phys: f64 = value
                        .parse()
                        .with_context(|| format!("invalid physical value {:?}", value))?;
                    variable.set_phys(&Value::Float(phys)).await?;
                }
                View::Desc => variable.set_desc(&value).await?,
            }
        }
    }
    Ok(())
}

/// Untyped access, values are hex bytes.
async fn run_bytes(sdo: &SdoClient, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Read {
            index,
            subindex,
            view: View::Raw,
        } => {
            let data = sdo.upload(index, subindex).await?;
            println!("{}", format_hex(&data));
        }
        Command::Write {
            index,
            subindex,
            value,
            view: View::Raw,
        } => {
            let data = parse_hex(&value).with_context(|| format!("invalid hex bytes {:?}", value))?;
            sdo.download(index, subindex, &data).await?;
        }
        _ => bail!("--phys and --desc need a dictionary"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = args::parse_args(std::env::args().skip(1))?;
    if args.help {
        println!("{}", args::USAGE);
        return Ok(());
    }

    let mut config = CliConfig::load(args.config.as_deref());
    if let Some(interface) = args.interface {
        config.can_interface = interface;
    }
    if let Some(node_id) = args.node_id {
        config.node_id = node_id;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if let Some(dictionary) = args.dictionary {
        config.dictionary = Some(dictionary);
    }
    if args.save {
        let path = config.save(args.config.as_deref())?;
        eprintln!("Saved configuration to {}", path.display());
    }

    let Some(command) = args.command else {
        if !args.save {
            println!("{}", args::USAGE);
        }
        return Ok(());
    };

    let dictionary = load_dictionary(&config)?;
    let network = Network::connect(&config.can_interface)
        .with_context(|| format!("failed to open CAN interface {}", config.can_interface))?;
    let channel = network.sdo_client_channel(config.node_id)?;
    let sdo = SdoClient::new(channel).with_timeout(config.timeout());
    debug!(
        "Talking to node {} on {} (timeout {:?})",
        config.node_id,
        network.interface(),
        sdo.timeout()
    );

    match dictionary {
        Some(od) => run_typed(&RemoteNode::new(config.node_id, Arc::new(od), sdo), command).await,
        None => run_bytes(&sdo, command).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_output() {
        assert_eq!(format_hex(&[0x4D, 0x6F, 0x0A]), "4D 6F 0A");
        assert_eq!(format_hex(&[]), "");
    }
}
