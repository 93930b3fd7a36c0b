use serialstream_frame::Engine;
use serialstream_transport::MemoryTransport;
use tracing::info;

use crate::cmd::{build_message, LoopbackArgs};
use crate::exit::{frame_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, print_stats, OutputFormat};

/// Upper bound on polls per queued message before the run counts as stuck.
const POLLS_PER_MESSAGE: usize = 1_000_000;

pub fn run(args: LoopbackArgs, format: OutputFormat) -> CliResult<i32> {
    let mut transport = MemoryTransport::loopback(args.capacity.max(1));
    transport.set_max_chunk(args.chunk);
    let mut engine = Engine::new(transport);

    for _ in 0..args.count {
        let msg = build_message(&mut engine, &args.message)?;
        engine
            .enqueue_send(msg)
            .map_err(|err| frame_error("enqueue failed", err))?;
    }

    let budget = POLLS_PER_MESSAGE.saturating_mul(args.count.max(1));
    let mut received = 0usize;
    let mut polls = 0usize;
    while received < args.count {
        if polls >= budget {
            return Err(CliError::new(
                INTERNAL,
                format!("loopback stalled after {polls} polls ({received} received)"),
            ));
        }
        engine
            .poll()
            .map_err(|err| frame_error("receive failed", err))?;
        polls += 1;

        while let Some(msg) = engine.dequeue_received() {
            print_message(&msg, format);
            engine.recycle_received(msg);
            received += 1;
        }
    }

    info!(polls, received, "loopback complete");
    if args.stats {
        print_stats(engine.stats(), format);
    }
    Ok(SUCCESS)
}
