//! Open the first attached reader and send one command.
//!
//! Usage: cargo run -p tcmp --features serial --example request -- <family> <code> [payload bytes...]

use std::time::Duration;

use tcmp::device::{Command, CommandFamily, Device, DeviceConfig};
use tcmp::transport::SerialTransport;

fn parse_byte(arg: &str) -> Result<u8, std::num::ParseIntError> {
    match arg.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => arg.parse(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        return Err("usage: request <family> <code> [payload bytes...]".into());
    }
    let family = CommandFamily::new(args[0].parse()?);
    let code = parse_byte(&args[1])?;
    let payload = args[2..]
        .iter()
        .map(|arg| parse_byte(arg))
        .collect::<Result<Vec<u8>, _>>()?;

    let device = Device::with_config(
        SerialTransport::new(),
        DeviceConfig::default().with_response_timeout(Duration::from_secs(3)),
    );
    let readers = device.enumerate_devices()?;
    let reader = readers.first().ok_or("no reader attached")?;
    device.connect(reader)?;
    println!("connected to {reader}");

    let response = device.request(&Command::new(family, code).with_payload(payload), None)?;
    match response.application_error() {
        Some(err) => println!("reader reported: {err}"),
        None => println!("{:02X?}", response.frame().payload().as_ref()),
    }

    device.disconnect();
    Ok(())
}
