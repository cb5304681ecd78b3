use std::time::{Duration, Instant};

use tcmp_device::{Device, DeviceConfig};
use tcmp_frame::{Command, CommandFamily, Response};
use tcmp_transport::{DeviceId, SerialTransport, Transport};
use tracing::info;

use crate::cmd::SendArgs;
use crate::exit::{device_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::hex;
use crate::output::{print_response, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = hex::parse(&args.payload)
        .map_err(|err| CliError::new(USAGE, format!("--payload: {err}")))?;
    let command = Command::new(CommandFamily::new(args.family), args.code).with_payload(payload);

    let device = Device::with_config(
        SerialTransport::with_config(args.serial.config()),
        DeviceConfig::default().with_response_timeout(timeout),
    );
    let response = exchange(&device, &DeviceId::new(args.device), &command, timeout)?;

    print_response(&response, format);
    if response.is_error() {
        return Ok(FAILURE);
    }
    Ok(SUCCESS)
}

/// Open `id`, run one request and close the connection again.
fn exchange<T: Transport>(
    device: &Device<T>,
    id: &DeviceId,
    command: &Command,
    timeout: Duration,
) -> CliResult<Response> {
    device
        .connect(id)
        .map_err(|err| device_error("connect failed", err))?;
    info!(
        device = %id,
        family = command.family().value(),
        code = command.code(),
        "sending command"
    );

    let result = device.request(command, Some(timeout));
    device.disconnect();
    result.map_err(|err| device_error("request failed", err))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    let duration = match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    };
    if Instant::now().checked_add(duration).is_none() {
        return Err(CliError::new(USAGE, format!("duration out of range: {input}")));
    }
    Ok(duration)
}
