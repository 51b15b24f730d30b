use anyhow::{bail, Context};
use std::path::PathBuf;

/// Value view used by `read` and `write`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum View {
    #[default]
    Raw,
    Phys,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Read {
        index: u16,
        subindex: u8,
        view: View,
    },
    Write {
        index: u16,
        subindex: u8,
        value: String,
        view: View,
    },
}

#[derive(Debug, Default, PartialEq)]
pub struct Args {
    pub interface: Option<String>,
    pub node_id: Option<u8>,
    pub timeout_ms: Option<u64>,
    pub dictionary: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub save: bool,
    pub help: bool,
    pub command: Option<Command>,
}

pub const USAGE: &str = "\
Usage: canopen-sdo [OPTIONS] read INDEX SUBINDEX [--phys|--desc]
       canopen-sdo [OPTIONS] write INDEX SUBINDEX VALUE [--phys|--desc]

Options:
  -i, --interface IF     CAN interface (default vcan0)
  -n, --node-id N        remote node id 1..=127
  -t, --timeout MS       SDO response timeout in milliseconds
  -d, --dictionary FILE  TOML object dictionary of the remote node
  -c, --config FILE      configuration file
      --save             persist the effective settings
  -h, --help             show this help

Without a dictionary values are read and written as hex bytes.";

/// Parse a decimal or `0x` prefixed number.
pub fn parse_number<T>(text: &str) -> anyhow::Result<T>
where
    T: TryFrom<u64>,
{
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed
        .ok()
        .and_then(|n| T::try_from(n).ok())
        .with_context(|| format!("invalid number {:?}", text))
}

pub fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut view = View::Raw;
    let mut positional = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().with_context(|| format!("{} needs a value", name));
        match arg.as_str() {
            "--interface" | "-i" => parsed.interface = Some(value(&arg)?),
            "--node-id" | "-n" => parsed.node_id = Some(parse_number(&value(&arg)?)?),
            "--timeout" | "-t" => parsed.timeout_ms = Some(parse_number(&value(&arg)?)?),
            "--dictionary" | "-d" => parsed.dictionary = Some(value(&arg)?.into()),
            "--config" | "-c" => parsed.config = Some(value(&arg)?.into()),
            "--save" => parsed.save = true,
            "--help" | "-h" => parsed.help = true,
            "--phys" => view = View::Phys,
            "--desc" => view = View::Desc,
            // negative numbers are values, not flags
            other if other.starts_with('-') && other.parse::<f64>().is_err() => {
                bail!("unknown argument {:?}", other)
            }
            _ => positional.push(arg),
        }
    }

    parsed.command = match positional.as_slice() {
        [] => None,
        [command, index, subindex] if command == "read" => Some(Command::Read {
            index: parse_number(index)?,
            subindex: parse_number(subindex)?,
            view,
        }),
        [command, index, subindex, value] if command == "write" => Some(Command::Write {
            index: parse_number(index)?,
            subindex: parse_number(subindex)?,
            value: value.clone(),
            view,
        }),
        [command, ..] => bail!("invalid {:?} command\n\n{}", command, USAGE),
    };
    Ok(parsed)
}
