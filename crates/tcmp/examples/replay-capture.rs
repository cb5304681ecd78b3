//! Replay a binary capture file through the frame reader.
//!
//! Usage: cargo run -p tcmp --example replay-capture -- capture.bin

use std::fs::File;
use std::io::BufReader;

use tcmp::frame::{family_name, FrameError, FrameReader};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .ok_or("usage: replay-capture <capture.bin>")?;
    let mut reader = FrameReader::new(BufReader::new(File::open(&path)?));

    loop {
        match reader.read_response() {
            Ok(response) => {
                let frame = response.frame();
                match response.application_error() {
                    Some(err) => println!(
                        "{} {:#04x} {err}",
                        family_name(frame.family()),
                        frame.response_code()
                    ),
                    None => println!(
                        "{} {:#04x} {} bytes",
                        family_name(frame.family()),
                        frame.response_code(),
                        frame.payload().len()
                    ),
                }
            }
            Err(FrameError::ConnectionClosed) => break,
            Err(err @ FrameError::HeaderCorruption { .. }) => eprintln!("skipping: {err}"),
            Err(err) => return Err(err.into()),
        }
    }

    println!("{:?}", reader.stats());
    Ok(())
}
