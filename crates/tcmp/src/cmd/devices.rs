use tcmp_transport::{SerialTransport, Transport};
use tracing::debug;

use crate::cmd::DevicesArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_devices, OutputFormat};

pub fn run(args: DevicesArgs, format: OutputFormat) -> CliResult<i32> {
    let transport = SerialTransport::with_config(args.serial.config());
    let devices = transport
        .enumerate_devices()
        .map_err(|err| transport_error("enumeration failed", err))?;
    debug!(count = devices.len(), "enumerated readers");

    print_devices(&devices, format);
    Ok(SUCCESS)
}
