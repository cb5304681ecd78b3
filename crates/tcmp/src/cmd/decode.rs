use std::fs;

use tcmp_frame::{Reassembler, ReassemblerConfig, Response};
use tracing::{debug, warn};

use crate::cmd::DecodeArgs;
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::hex;
use crate::output::{print_decoded, DecodedItem, OutputFormat};

/// Bytes fed to the reassembler per step, like a serial read would.
const FEED_CHUNK_SIZE: usize = 4096;

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let capture = load_capture(&args)?;
    let config = ReassemblerConfig {
        resync: args.resync.into(),
        ..ReassemblerConfig::default()
    };

    let decoded = decode(&capture, config);
    let items: Vec<DecodedItem<'_>> = decoded
        .items
        .iter()
        .map(|item| match item {
            Ok(response) => DecodedItem::Response(response),
            Err(err) => DecodedItem::Error(err.clone()),
        })
        .collect();
    print_decoded(&items, format);

    if decoded.trailing > 0 {
        warn!(bytes = decoded.trailing, "capture ends inside an incomplete frame");
    }
    if decoded.items.iter().any(Result::is_err) || decoded.frames() == 0 {
        return Ok(DATA_INVALID);
    }
    Ok(SUCCESS)
}

fn load_capture(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    let text = args.hex.as_deref().unwrap_or_default();
    hex::parse(text).map_err(|err| CliError::new(USAGE, format!("capture: {err}")))
}

struct Decoded {
    items: Vec<Result<Response, String>>,
    trailing: usize,
}

impl Decoded {
    fn frames(&self) -> usize {
        self.items.iter().filter(|item| item.is_ok()).count()
    }
}

fn decode(capture: &[u8], config: ReassemblerConfig) -> Decoded {
    let mut reassembler = Reassembler::with_config(config);
    let mut items = Vec::new();
    for chunk in capture.chunks(FEED_CHUNK_SIZE) {
        items.extend(
            reassembler
                .push(chunk)
                .into_iter()
                .map(|item| item.map_err(|err| err.to_string())),
        );
    }
    debug!(stats = ?reassembler.stats(), "capture decoded");
    Decoded {
        items,
        trailing: reassembler.len(),
    }
}

#[cfg(test)]
mod tests {
    use tcmp_frame::{Command, CommandFamily, Resync};

    use super::*;

    fn wire(code: u8, payload: &[u8]) -> Vec<u8> {
        Command::new(CommandFamily::BASIC_NFC, code)
            .with_payload(payload.to_vec())
            .to_wire()
            .unwrap()
            .to_vec()
    }

    #[test]
    fn decodes_noisy_capture() {
        let mut capture = vec![0x00, 0xFF];
        capture.extend(wire(0x01, &[0x7E, 0x7E]));
        capture.extend(wire(0x02, b""));
        capture.extend(&wire(0x03, b"cut")[..6]);

        let decoded = decode(&capture, ReassemblerConfig::default());

        assert_eq!(decoded.frames(), 2);
        assert_eq!(decoded.trailing, 6);
    }

    #[test]
    fn skip_marker_recovers_frame_behind_corruption() {
        let mut capture = wire(0x01, b"bad");
        capture[3] ^= 0x01;
        capture.extend(wire(0x02, b"good"));

        let discard = decode(&capture, ReassemblerConfig::default());
        assert_eq!(discard.frames(), 0);
        assert!(discard.items[0].is_err());

        let skip = decode(
            &capture,
            ReassemblerConfig {
                resync: Resync::SkipMarker,
                ..ReassemblerConfig::default()
            },
        );
        assert_eq!(skip.frames(), 1);
        let good = skip.items.iter().find_map(|item| item.as_ref().ok()).unwrap();
        assert_eq!(good.frame().payload().as_ref(), b"good");
    }
}
