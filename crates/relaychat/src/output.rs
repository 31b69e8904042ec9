use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use relaychat_frame::{Frame, MessageType};
use serde::Serialize;

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
struct FrameOutput<'a> {
    kind: &'a str,
    kind_code: u8,
    from: i32,
    system: bool,
    body_size: usize,
    body: String,
    timestamp: String,
}

pub fn print_frame(frame: &Frame, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", frame_json(frame));
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "FROM", "SIZE", "BODY"])
                .add_row(vec![
                    frame.kind.name().to_string(),
                    sender_label(frame),
                    frame.body.len().to_string(),
                    body_preview(frame),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "type={} ({}) from={} size={} body={}",
                frame.kind.name(),
                frame.kind.as_u8(),
                sender_label(frame),
                frame.body.len(),
                body_preview(frame)
            );
        }
        OutputFormat::Raw => {
            print_raw(frame.body.as_ref());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn frame_json(frame: &Frame) -> String {
    let out = FrameOutput {
        kind: frame.kind.name(),
        kind_code: frame.kind.as_u8(),
        from: frame.routing_id,
        system: frame.is_system(),
        body_size: frame.body.len(),
        body: body_preview(frame),
        timestamp: now_unix_seconds(),
    };
    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
}

fn sender_label(frame: &Frame) -> String {
    if frame.is_system() {
        "system".to_string()
    } else {
        format!("User {}", frame.routing_id)
    }
}

fn body_preview(frame: &Frame) -> String {
    match frame.kind {
        MessageType::Text => match frame.body_text() {
            Some(text) => text.to_string(),
            None => format!("<invalid utf-8, {} bytes>", frame.body.len()),
        },
        kind if kind.is_call_control() => String::new(),
        _ => format!("<binary {} bytes>", frame.body.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
