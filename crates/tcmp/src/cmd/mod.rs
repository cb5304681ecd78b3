use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use tcmp_frame::Resync;
use tcmp_transport::serial::DEFAULT_BAUD_RATE;
use tcmp_transport::SerialConfig;

use crate::exit::CliResult;
use crate::hex;
use crate::output::OutputFormat;

pub mod decode;
pub mod devices;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List attached readers.
    Devices(DevicesArgs),
    /// Send one command and print the reader's response.
    Send(SendArgs),
    /// Reassemble frames from a captured byte dump.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Devices(args) => devices::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Serial line settings shared by commands that open a port.
#[derive(Args, Debug)]
pub struct SerialArgs {
    /// Line speed in baud.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE, env = "TCMP_BAUD")]
    pub baud: u32,
    /// Only consider USB ports with this vendor id (e.g. 0x1fc9).
    #[arg(long, value_name = "VID", value_parser = parse_u16)]
    pub usb_vid: Option<u16>,
    /// Only consider USB ports with this product id.
    #[arg(long, value_name = "PID", value_parser = parse_u16)]
    pub usb_pid: Option<u16>,
}

impl SerialArgs {
    pub fn config(&self) -> SerialConfig {
        SerialConfig {
            baud_rate: self.baud,
            usb_vid: self.usb_vid,
            usb_pid: self.usb_pid,
            ..SerialConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct DevicesArgs {
    #[command(flatten)]
    pub serial: SerialArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Reader to open (e.g. /dev/ttyACM0, COM3).
    pub device: String,
    /// Command family.
    #[arg(long, short = 'f', default_value = "0", value_parser = parse_u16)]
    pub family: u16,
    /// Command code.
    #[arg(long, short = 'c', value_parser = parse_u8)]
    pub code: u8,
    /// Command payload as hex (e.g. "00 7E 10").
    #[arg(long, short = 'p', default_value = "")]
    pub payload: String,
    /// Maximum time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    #[command(flatten)]
    pub serial: SerialArgs,
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub enum ResyncArg {
    /// Drop everything buffered after a corrupt header.
    #[default]
    Discard,
    /// Skip only the corrupt start marker.
    SkipMarker,
}

impl From<ResyncArg> for Resync {
    fn from(arg: ResyncArg) -> Self {
        match arg {
            ResyncArg::Discard => Resync::DiscardBuffer,
            ResyncArg::SkipMarker => Resync::SkipMarker,
        }
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Captured bytes as hex.
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    pub hex: Option<String>,
    /// Read a binary capture from a file instead.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Recovery after a corrupt header.
    #[arg(long, value_enum, default_value_t = ResyncArg::Discard)]
    pub resync: ResyncArg,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_u16(input: &str) -> Result<u16, String> {
    let value = hex::parse_number(input)?;
    u16::try_from(value).map_err(|_| format!("{input} does not fit in 16 bits"))
}

fn parse_u8(input: &str) -> Result<u8, String> {
    let value = hex::parse_number(input)?;
    u8::try_from(value).map_err(|_| format!("{input} does not fit in 8 bits"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_parsers_check_range() {
        assert_eq!(parse_u16("0x0006"), Ok(6));
        assert_eq!(parse_u8("255"), Ok(255));
        assert!(parse_u8("256").is_err());
        assert!(parse_u16("0x10000").is_err());
    }

    #[test]
    fn serial_args_map_to_config() {
        let args = SerialArgs {
            baud: 9600,
            usb_vid: Some(0x1fc9),
            usb_pid: None,
        };
        let config = args.config();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.usb_vid, Some(0x1fc9));
        assert_eq!(config.usb_pid, None);
    }
}
