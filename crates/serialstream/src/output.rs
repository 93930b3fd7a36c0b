use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;
use serialstream_frame::{EngineStats, Message, Packet, PacketKind};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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
struct MessageOutput {
    cmd: u8,
    packet_count: u8,
    wire_size: usize,
    packets: Vec<PacketOutput>,
}

#[derive(Serialize)]
struct PacketOutput {
    kind: &'static str,
    byte_size: usize,
    value: Value,
}

#[derive(Serialize)]
struct StatsOutput {
    messages_sent: u64,
    messages_received: u64,
    bytes_written: u64,
    bytes_read: u64,
    write_stalls: u64,
    read_stalls: u64,
    transport_errors: u64,
    rejected: u64,
}

impl From<EngineStats> for StatsOutput {
    fn from(s: EngineStats) -> Self {
        Self {
            messages_sent: s.messages_sent,
            messages_received: s.messages_received,
            bytes_written: s.bytes_written,
            bytes_read: s.bytes_read,
            write_stalls: s.write_stalls,
            read_stalls: s.read_stalls,
            transport_errors: s.transport_errors,
            rejected: s.rejected,
        }
    }
}

pub fn print_message(msg: &Message, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                cmd: msg.cmd(),
                packet_count: msg.packet_count(),
                wire_size: msg.wire_size(),
                packets: msg
                    .packets()
                    .iter()
                    .map(|p| PacketOutput {
                        kind: p.kind().name(),
                        byte_size: p.byte_size(),
                        value: packet_value(p),
                    })
                    .collect(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CMD", "#", "KIND", "SIZE", "VALUE"]);
            for (index, packet) in msg.packets().iter().enumerate() {
                table.add_row(vec![
                    msg.cmd().to_string(),
                    index.to_string(),
                    packet.kind().name().to_string(),
                    packet.byte_size().to_string(),
                    packet_preview(packet),
                ]);
            }
            if msg.packets().is_empty() {
                table.add_row(vec![msg.cmd().to_string(), "-".into(), "-".into(), "0".into(), String::new()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let packets: Vec<String> = msg
                .packets()
                .iter()
                .map(|p| format!("[{} {}]", p.kind().name(), packet_preview(p)))
                .collect();
            println!(
                "cmd={} packets={} {}",
                msg.cmd(),
                msg.packet_count(),
                packets.join(" ")
            );
        }
    }
}

pub fn print_stats(stats: EngineStats, format: OutputFormat) {
    let out = StatsOutput::from(stats);
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&serde_json::json!({ "stats": out }))
                    .unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["STAT", "VALUE"]);
            let rows = [
                ("messages_sent", out.messages_sent),
                ("messages_received", out.messages_received),
                ("bytes_written", out.bytes_written),
                ("bytes_read", out.bytes_read),
                ("write_stalls", out.write_stalls),
                ("read_stalls", out.read_stalls),
                ("transport_errors", out.transport_errors),
                ("rejected", out.rejected),
            ];
            for (name, value) in rows {
                table.add_row(vec![name.to_string(), value.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "sent={} received={} written={}B read={}B stalls={}/{} errors={} rejected={}",
                out.messages_sent,
                out.messages_received,
                out.bytes_written,
                out.bytes_read,
                out.write_stalls,
                out.read_stalls,
                out.transport_errors,
                out.rejected
            );
        }
    }
}

fn packet_value(packet: &Packet) -> Value {
    match packet.kind() {
        PacketKind::String => match packet.as_str() {
            Some(text) => Value::String(text.to_string()),
            None => Value::String(format!("<binary {} bytes>", packet.byte_size())),
        },
        PacketKind::Int32 => packet.i32s().map(Value::from).collect(),
        PacketKind::Float32 => packet
            .f32s()
            .map(|v| {
                serde_json::Number::from_f64(f64::from(v))
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            })
            .collect(),
    }
}

fn packet_preview(packet: &Packet) -> String {
    match packet.kind() {
        PacketKind::String => match packet.as_str() {
            Some(text) => text.to_string(),
            None => format!("<binary {} bytes>", packet.byte_size()),
        },
        PacketKind::Int32 => join(packet.i32s()),
        PacketKind::Float32 => join(packet.f32s()),
    }
}

fn join<T: ToString>(values: impl Iterator<Item = T>) -> String {
    values.map(|v| v.to_string()).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use serialstream_frame::PacketPool;

    use super::*;

    #[test]
    fn packet_values_by_kind() {
        let pool = PacketPool::new();
        let mut msg = Message::new(1);
        msg.push_packet(&pool).unwrap().set_str("hi").unwrap();
        msg.push_packet(&pool).unwrap().set_i32s(&[1, -2]).unwrap();
        msg.push_packet(&pool)
            .unwrap()
            .set_f32s(&[0.5, f32::NAN])
            .unwrap();

        assert_eq!(packet_value(&msg.packets()[0]), serde_json::json!("hi"));
        assert_eq!(packet_value(&msg.packets()[1]), serde_json::json!([1, -2]));
        assert_eq!(packet_value(&msg.packets()[2]), serde_json::json!([0.5, null]));
        assert_eq!(packet_preview(&msg.packets()[1]), "1,-2");
    }

    #[test]
    fn binary_strings_are_summarized() {
        let mut packet = Packet::new();
        packet.set_bytes(&[0xFF, 0xFE]).unwrap();
        assert_eq!(packet_preview(&packet), "<binary 2 bytes>");
    }
}
