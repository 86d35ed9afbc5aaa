use std::fs;
use std::time::Duration;

use chanbus_bus::{connect_with_config, BusConfig};
use tracing::debug;

use crate::cmd::SendArgs;
use crate::exit::{bus_error, io_error, CliError, CliResult, SUCCESS, USAGE};

pub fn run(args: SendArgs, config: BusConfig) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = resolve_payload(&args)?;

    let bus = connect_with_config(&args.path, config)
        .map_err(|err| bus_error("connect failed", err))?;
    bus.publish(&args.channel, &payload)
        .map_err(|err| bus_error("publish failed", err))?;
    bus.flush(timeout)
        .map_err(|err| bus_error("flush failed", err))?;
    debug!(channel = %args.channel, size = payload.len(), "message sent");

    let _ = bus.close();
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

fn parse_duration(input: &str) -> CliResult<Duration> {
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
