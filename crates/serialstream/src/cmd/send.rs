use std::thread;
use std::time::Instant;

use serialstream_frame::{Engine, Phase};
use serialstream_transport::{TransportError, UnixDomainSocket};
use tracing::{info, warn};

use crate::cmd::{build_message, parse_duration, SendArgs};
use crate::exit::{frame_error, transport_error, CliError, CliResult, SUCCESS, TIMEOUT};

pub fn run(args: SendArgs) -> CliResult<i32> {
    let tick = parse_duration(&args.tick)?;
    let timeout = parse_duration(&args.timeout)?;

    let transport = UnixDomainSocket::connect(&args.path)
        .map_err(|err| transport_error("connect failed", err))?;
    let mut engine = Engine::new(transport);

    let msg = build_message(&mut engine, &args.message)?;
    let wire_size = msg.wire_size();
    engine
        .enqueue_send(msg)
        .map_err(|err| frame_error("enqueue failed", err))?;

    let start = Instant::now();
    while engine.pending_sends() > 0 || engine.send_phase() != Phase::Idle {
        if engine.get_ref().is_closed() {
            return Err(transport_error("send failed", TransportError::Closed));
        }
        if start.elapsed() >= timeout {
            return Err(CliError::new(
                TIMEOUT,
                format!("send timed out after {timeout:?}"),
            ));
        }
        if let Err(err) = engine.poll() {
            warn!(error = %err, "ignoring malformed inbound data");
        }
        thread::sleep(tick);
    }

    info!(cmd = args.message.cmd, wire_size, "message sent");
    Ok(SUCCESS)
}
