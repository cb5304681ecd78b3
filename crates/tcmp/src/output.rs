use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use tcmp_frame::{family_name, ApplicationError, Response};
use tcmp_transport::DeviceId;

use crate::hex;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ApplicationErrorOutput<'a> {
    error_code: u8,
    internal_error_code: u8,
    reader_status: u8,
    message: &'a str,
}

impl<'a> From<&'a ApplicationError> for ApplicationErrorOutput<'a> {
    fn from(err: &'a ApplicationError) -> Self {
        Self {
            error_code: err.error_code,
            internal_error_code: err.internal_error_code,
            reader_status: err.reader_status,
            message: &err.message,
        }
    }
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    family: u16,
    family_name: &'static str,
    response_code: u8,
    kind: &'static str,
    payload_size: usize,
    payload: String,
    trailer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ApplicationErrorOutput<'a>>,
}

impl<'a> ResponseOutput<'a> {
    fn new(response: &'a Response) -> Self {
        let frame = response.frame();
        Self {
            family: frame.family().value(),
            family_name: family_name(frame.family()),
            response_code: frame.response_code(),
            kind: if response.is_error() {
                "application_error"
            } else {
                "frame"
            },
            payload_size: frame.payload().len(),
            payload: hex::encode(frame.payload()),
            trailer: hex::encode(&frame.trailer()),
            error: response.application_error().map(ApplicationErrorOutput::from),
        }
    }
}

/// One line of `decode` output: a response or a stream error.
pub enum DecodedItem<'a> {
    Response(&'a Response),
    Error(String),
}

pub fn print_response(response: &Response, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ResponseOutput::new(response)),
        OutputFormat::Table => {
            let mut table = response_table();
            table.add_row(response_row(response));
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", pretty_response(response)),
        OutputFormat::Raw => print_raw(response.frame().payload()),
    }
}

pub fn print_decoded(items: &[DecodedItem<'_>], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            #[serde(untagged)]
            enum Line<'a> {
                Response(ResponseOutput<'a>),
                Error { error: &'a str },
            }
            let lines: Vec<Line<'_>> = items
                .iter()
                .map(|item| match item {
                    DecodedItem::Response(response) => {
                        Line::Response(ResponseOutput::new(response))
                    }
                    DecodedItem::Error(error) => Line::Error {
                        error: error.as_str(),
                    },
                })
                .collect();
            print_json(&lines);
        }
        OutputFormat::Table => {
            let mut table = response_table();
            for item in items {
                match item {
                    DecodedItem::Response(response) => {
                        table.add_row(response_row(response));
                    }
                    DecodedItem::Error(error) => {
                        table.add_row(vec![
                            "-".to_string(),
                            "-".to_string(),
                            "stream error".to_string(),
                            "0".to_string(),
                            error.clone(),
                        ]);
                    }
                }
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for item in items {
                match item {
                    DecodedItem::Response(response) => println!("{}", pretty_response(response)),
                    DecodedItem::Error(error) => println!("stream error: {error}"),
                }
            }
        }
        OutputFormat::Raw => {
            for item in items {
                if let DecodedItem::Response(response) = item {
                    print_raw(response.frame().as_bytes());
                }
            }
        }
    }
}

pub fn print_devices(devices: &[DeviceId], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let names: Vec<&str> = devices.iter().map(DeviceId::as_str).collect();
            print_json(&serde_json::json!({ "devices": names }));
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "DEVICE"]);
            for (i, device) in devices.iter().enumerate() {
                table.add_row(vec![i.to_string(), device.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for device in devices {
                println!("{device}");
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn response_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["FAMILY", "CODE", "KIND", "SIZE", "PAYLOAD"]);
    table
}

fn response_row(response: &Response) -> Vec<String> {
    let frame = response.frame();
    let detail = match response.application_error() {
        Some(err) => err.to_string(),
        None => hex::spaced(frame.payload()),
    };
    vec![
        family_name(frame.family()).to_string(),
        format!("{:#04x}", frame.response_code()),
        if response.is_error() { "error" } else { "frame" }.to_string(),
        frame.payload().len().to_string(),
        detail,
    ]
}

fn pretty_response(response: &Response) -> String {
    let frame = response.frame();
    let mut line = format!(
        "family={} code={:#04x} size={}",
        frame.family(),
        frame.response_code(),
        frame.payload().len()
    );
    match response.application_error() {
        Some(err) => line.push_str(&format!(" error={err}")),
        None => line.push_str(&format!(" payload={}", hex::spaced(frame.payload()))),
    }
    line
}
