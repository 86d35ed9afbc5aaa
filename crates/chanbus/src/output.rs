use std::fmt::Write as _;
use std::io::{IsTerminal, Write};

use chanbus_bus::Message;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

const PREVIEW_LIMIT: usize = 64;

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
struct MessageOutput<'a> {
    channel: &'a str,
    payload_size: usize,
    fingerprint: Option<String>,
    payload: String,
    recv_utime: Option<u64>,
}

impl<'a> MessageOutput<'a> {
    fn from_message(message: &'a Message) -> Self {
        Self {
            channel: &message.channel,
            payload_size: message.payload.len(),
            fingerprint: message.fingerprint.map(|fp| fp.to_string()),
            payload: payload_preview(&message.payload),
            recv_utime: message.recv_utime,
        }
    }
}

pub fn print_message(message: &Message, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput::from_message(message);
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let out = MessageOutput::from_message(message);
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "SIZE", "FINGERPRINT", "PAYLOAD"])
                .add_row(vec![
                    out.channel.to_string(),
                    out.payload_size.to_string(),
                    out.fingerprint.unwrap_or_else(|| "-".to_string()),
                    out.payload,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "channel={} size={} payload={}",
                message.channel,
                message.payload.len(),
                payload_preview(&message.payload)
            );
        }
        OutputFormat::Raw => print_raw(&message.payload),
    }
}

/// Print a flat record: JSON object, two-column table, or `key=value` lines.
pub fn print_record<T: Serialize>(record: &T, format: OutputFormat) {
    let value = match serde_json::to_value(record) {
        Ok(value) => value,
        Err(_) => serde_json::Value::Null,
    };
    match format {
        OutputFormat::Json => println!("{value}"),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            if let Some(fields) = value.as_object() {
                for (key, field) in fields {
                    table.add_row(vec![key.clone(), scalar(field)]);
                }
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            if let Some(fields) = value.as_object() {
                for (key, field) in fields {
                    println!("{key}={}", scalar(field));
                }
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// UTF-8 payloads print as text; anything else as (truncated) hex.
pub fn payload_preview(payload: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(payload) {
        return text.to_string();
    }
    let shown = &payload[..payload.len().min(PREVIEW_LIMIT)];
    let mut hex = String::with_capacity(shown.len() * 2 + 16);
    for byte in shown {
        let _ = write!(hex, "{byte:02x}");
    }
    if shown.len() < payload.len() {
        let _ = write!(hex, "... ({} bytes)", payload.len());
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_payloads_preview_verbatim() {
        assert_eq!(payload_preview(b"hello"), "hello");
    }

    #[test]
    fn binary_payloads_preview_as_hex() {
        assert_eq!(payload_preview(&[0xCC, 0x00, 0xFF]), "cc00ff");

        let long = vec![0xFFu8; PREVIEW_LIMIT + 1];
        let preview = payload_preview(&long);
        assert!(preview.ends_with(&format!("... ({} bytes)", PREVIEW_LIMIT + 1)));
        assert!(preview.starts_with("ffff"));
    }
}
