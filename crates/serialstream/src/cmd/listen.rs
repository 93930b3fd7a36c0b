use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use serialstream_frame::Engine;
use serialstream_transport::UnixDomainSocket;
use tracing::{debug, warn};

use crate::cmd::{parse_duration, ListenArgs};
use crate::exit::{transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, print_stats, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let tick = parse_duration(&args.tick)?;
    let socket =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let transport = socket
        .accept()
        .map_err(|err| transport_error("accept failed", err))?;
    let mut engine = Engine::new(transport);
    let mut printed = 0usize;

    'poll: while running.load(Ordering::SeqCst) {
        if let Err(err) = engine.poll() {
            warn!(error = %err, "dropped malformed message");
        }

        while let Some(msg) = engine.dequeue_received() {
            print_message(&msg, format);
            engine.recycle_received(msg);
            printed = printed.saturating_add(1);

            if args.count.is_some_and(|count| printed >= count) {
                break 'poll;
            }
        }

        if engine.get_ref().is_closed() {
            debug!(printed, "peer disconnected");
            break;
        }
        thread::sleep(tick);
    }

    if args.stats {
        print_stats(engine.stats(), format);
    }
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
