use std::sync::mpsc;
use std::time::{Duration, Instant};

use chanbus_bus::{Bus, BusConfig, Message};
use chanbus_transport::LoopbackSerial;
use serde::Serialize;
use tracing::{info, warn};

use crate::cmd::SelftestArgs;
use crate::exit::{bus_error, CliError, CliResult, SELFTEST_FAILED, SUCCESS, USAGE};
use crate::output::{print_record, OutputFormat};

const CHANNEL: &str = "SELFTEST";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Header of a frame that claims more payload than any link accepts,
/// followed by a stray sync byte.
const NOISE: &[u8] = &[0xCC, 0x00, 0x05, 0xFF, 0xCC, 0x12, 0xCC];

#[derive(Debug, Serialize)]
pub struct SelftestReport {
    pub passed: bool,
    pub sent: usize,
    pub received: usize,
    pub mismatched: usize,
    pub payload_size: usize,
    pub noise_bytes: usize,
    pub bytes_discarded: u64,
    pub corrupt_frames: u64,
    pub elapsed_ms: u64,
}

pub fn run(args: SelftestArgs, format: OutputFormat, config: BusConfig) -> CliResult<i32> {
    if args.size > config.frame.mtu {
        return Err(CliError::new(
            USAGE,
            format!("--size {} exceeds the link mtu {}", args.size, config.frame.mtu),
        ));
    }

    let report = round_trip(&args, config)?;
    print_record(&report, format);
    if report.passed {
        Ok(SUCCESS)
    } else {
        Ok(SELFTEST_FAILED)
    }
}

fn round_trip(args: &SelftestArgs, config: BusConfig) -> CliResult<SelftestReport> {
    let capacity = config.frame.buf_size;
    let (near, far) = LoopbackSerial::pair(capacity);
    let noisy = far.clone();
    let sender =
        Bus::from_io(near, config.clone()).map_err(|err| bus_error("sender setup failed", err))?;
    let receiver =
        Bus::from_io(far, config).map_err(|err| bus_error("receiver setup failed", err))?;

    let (tx, rx) = mpsc::channel::<Message>();
    receiver
        .subscribe(CHANNEL, move |message: &Message| {
            let _ = tx.send(message.clone());
        })
        .map_err(|err| bus_error("subscribe failed", err))?;
    receiver
        .start()
        .map_err(|err| bus_error("receive loop failed to start", err))?;

    let started = Instant::now();
    let mut noise_bytes = 0usize;
    for seq in 0..args.messages {
        sender
            .publish(CHANNEL, &pattern(seq, args.size))
            .map_err(|err| bus_error("publish failed", err))?;
        if args.noise {
            // Noise must land between frames, not inside one.
            sender
                .flush(DRAIN_TIMEOUT)
                .map_err(|err| bus_error("flush failed", err))?;
            noisy.inject(NOISE);
            noise_bytes += NOISE.len();
        }
    }
    sender
        .flush(DRAIN_TIMEOUT)
        .map_err(|err| bus_error("flush failed", err))?;

    let deadline = Instant::now() + DRAIN_TIMEOUT;
    let mut received = 0usize;
    let mut mismatched = 0usize;
    while received < args.messages {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let Ok(message) = rx.recv_timeout(remaining) else {
            warn!(received, expected = args.messages, "selftest timed out");
            break;
        };
        if message.payload.as_ref() != pattern(received, args.size).as_slice() {
            mismatched += 1;
        }
        received += 1;
    }

    let stats = receiver
        .stats()
        .map_err(|err| bus_error("stats unavailable", err))?;
    let _ = sender.close();
    let _ = receiver.close();

    let report = SelftestReport {
        passed: received == args.messages && mismatched == 0,
        sent: args.messages,
        received,
        mismatched,
        payload_size: args.size,
        noise_bytes,
        bytes_discarded: stats.bytes_discarded,
        corrupt_frames: stats.corrupt_frames,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    info!(
        passed = report.passed,
        received = report.received,
        discarded = report.bytes_discarded,
        "selftest finished"
    );
    Ok(report)
}

fn pattern(seq: usize, size: usize) -> Vec<u8> {
    (0..size).map(|i| (seq.wrapping_add(i) & 0xFF) as u8).collect()
}

#[cfg(test)]
mod tests {
    use chanbus_frame::FrameConfig;

    use super::*;

    fn small_config() -> BusConfig {
        BusConfig::from(FrameConfig::new(512, 8192))
    }

    #[test]
    fn clean_round_trip_passes() {
        let args = SelftestArgs {
            messages: 50,
            size: 42,
            noise: false,
        };
        let report = round_trip(&args, small_config()).expect("selftest should run");
        assert!(report.passed, "{report:?}");
        assert_eq!(report.received, 50);
        assert_eq!(report.bytes_discarded, 0);
    }

    #[test]
    fn noisy_round_trip_resyncs_every_message() {
        let args = SelftestArgs {
            messages: 20,
            size: 16,
            noise: true,
        };
        let report = round_trip(&args, small_config()).expect("selftest should run");
        assert!(report.passed, "{report:?}");
        assert_eq!(report.noise_bytes, 20 * NOISE.len());
        assert!(report.bytes_discarded >= report.noise_bytes as u64);
    }

    #[test]
    fn oversized_payload_is_a_usage_error() {
        let args = SelftestArgs {
            messages: 1,
            size: 1024,
            noise: false,
        };
        let err = run(args, OutputFormat::Json, small_config()).expect_err("size > mtu should fail");
        assert_eq!(err.code, USAGE);
    }
}
