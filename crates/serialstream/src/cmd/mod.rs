use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use serialstream_frame::{Engine, FrameError, Message, PacketPool};
use serialstream_transport::Transport;

use crate::exit::{frame_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod loopback;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run messages through an in-memory loopback and print what comes back.
    Loopback(LoopbackArgs),
    /// Connect to a socket and send one message.
    Send(SendArgs),
    /// Bind a socket, accept one peer and print received messages.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Loopback(args) => loopback::run(args, format),
        Command::Send(args) => send::run(args),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Message contents. Packets are laid out as every `--text`, then
/// `--ints`, then `--floats`.
#[derive(Args, Debug, Clone)]
pub struct MessageArgs {
    /// Command id.
    #[arg(long, default_value = "1")]
    pub cmd: u8,
    /// STRING packet (repeatable).
    #[arg(long)]
    pub text: Vec<String>,
    /// INT32 packet (comma-separated values).
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub ints: Option<Vec<i32>>,
    /// FLOAT32 packet (comma-separated values).
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub floats: Option<Vec<f32>>,
}

#[derive(Args, Debug)]
pub struct LoopbackArgs {
    #[command(flatten)]
    pub message: MessageArgs,
    /// How many copies of the message to send.
    #[arg(long, default_value = "1")]
    pub count: usize,
    /// Cap on bytes moved per transport call.
    #[arg(long)]
    pub chunk: Option<usize>,
    /// Loopback ring capacity in bytes.
    #[arg(long, default_value = "64")]
    pub capacity: usize,
    /// Print engine counters after the run.
    #[arg(long)]
    pub stats: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    #[command(flatten)]
    pub message: MessageArgs,
    /// Delay between polls (e.g. 1ms, 1s).
    #[arg(long, default_value = "1ms")]
    pub tick: String,
    /// Give up if the message is not fully written in time.
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Delay between polls (e.g. 1ms, 1s).
    #[arg(long, default_value = "1ms")]
    pub tick: String,
    /// Print engine counters on exit.
    #[arg(long)]
    pub stats: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Check a message out of the engine and fill it from `args`.
pub fn build_message<T: Transport>(engine: &mut Engine<T>, args: &MessageArgs) -> CliResult<Message> {
    let mut msg = engine.compose(args.cmd, 0);
    fill_message(&mut msg, engine.packet_pool(), args)
        .map_err(|err| frame_error("invalid message", err))?;
    Ok(msg)
}

fn fill_message(msg: &mut Message, pool: &PacketPool, args: &MessageArgs) -> Result<(), FrameError> {
    for text in &args.text {
        msg.push_packet(pool)?.set_str(text)?;
    }
    if let Some(ints) = &args.ints {
        msg.push_packet(pool)?.set_i32s(ints)?;
    }
    if let Some(floats) = &args.floats {
        msg.push_packet(pool)?.set_f32s(floats)?;
    }
    Ok(())
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use serialstream_frame::PacketKind;
    use serialstream_transport::MemoryTransport;

    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn build_message_orders_packets() {
        let mut engine = Engine::new(MemoryTransport::loopback(8));
        let args = MessageArgs {
            cmd: 4,
            text: vec!["a".into(), "b".into()],
            ints: Some(vec![1, 2]),
            floats: Some(vec![0.5]),
        };

        let msg = build_message(&mut engine, &args).unwrap();
        let kinds: Vec<_> = msg.packets().iter().map(|p| p.kind()).collect();
        assert_eq!(msg.cmd(), 4);
        assert_eq!(
            kinds,
            vec![
                PacketKind::String,
                PacketKind::String,
                PacketKind::Int32,
                PacketKind::Float32
            ]
        );
    }

    #[test]
    fn build_message_rejects_too_many_packets() {
        let mut engine = Engine::new(MemoryTransport::loopback(8));
        let args = MessageArgs {
            cmd: 1,
            text: vec![String::from("x"); 256],
            ints: None,
            floats: None,
        };

        let err = build_message(&mut engine, &args).unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
