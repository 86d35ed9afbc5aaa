use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use chanbus_bus::{BusConfig, BusListener, Message};
use tracing::{debug, info};

use crate::cmd::ListenArgs;
use crate::exit::{bus_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

const POLL: Duration = Duration::from_millis(100);

pub fn run(args: ListenArgs, format: OutputFormat, config: BusConfig) -> CliResult<i32> {
    let listener = BusListener::bind(&args.path)
        .map_err(|err| bus_error("bind failed", err))?
        .with_config(config);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let bus = listener
        .accept()
        .map_err(|err| bus_error("accept failed", err))?;
    info!(path = %args.path.display(), pattern = %args.pattern, "link accepted");

    let (tx, rx) = mpsc::channel::<Message>();
    bus.subscribe(&args.pattern, move |message: &Message| {
        let _ = tx.send(message.clone());
    })
    .map_err(|err| bus_error("subscribe failed", err))?;
    bus.start()
        .map_err(|err| bus_error("receive loop failed to start", err))?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL) {
            Ok(message) => {
                print_message(&message, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !bus.is_running() {
                    debug!("link closed by peer");
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let _ = bus.close();
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
