use chanbus_bus::BusConfig;
use chanbus_frame::{CHANNEL_MAXLEN, FRAME_OVERHEAD};
use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Serialize)]
struct BuildInfo<'a> {
    name: &'a str,
    version: &'a str,
    target: &'a str,
    target_os: &'a str,
    target_arch: &'a str,
    git_hash: &'a str,
    mtu: usize,
    buf_size: usize,
    frame_overhead: usize,
    channel_maxlen: usize,
    recv_thread: &'a str,
}

pub fn run(args: VersionArgs, format: OutputFormat, config: &BusConfig) -> CliResult<i32> {
    if !args.extended {
        println!("chanbus {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    let info = BuildInfo {
        name: "chanbus",
        version: env!("CARGO_PKG_VERSION"),
        target: option_env!("CHANBUS_BUILD_TARGET").unwrap_or("unknown"),
        target_os: std::env::consts::OS,
        target_arch: std::env::consts::ARCH,
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown"),
        mtu: config.frame.mtu,
        buf_size: config.frame.buf_size,
        frame_overhead: FRAME_OVERHEAD,
        channel_maxlen: CHANNEL_MAXLEN,
        recv_thread: &config.thread_name,
    };
    print_record(&info, format);

    Ok(SUCCESS)
}
