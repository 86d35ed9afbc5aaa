use clap::{Args, Subcommand};
use std::path::PathBuf;

use chanbus_bus::BusConfig;
use chanbus_frame::FrameConfig;

use crate::exit::{frame_error, CliResult};
use crate::output::OutputFormat;

pub mod listen;
pub mod selftest;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bind a socket, accept one link and print matching messages.
    Listen(ListenArgs),
    /// Connect to a socket and publish a single message.
    Send(SendArgs),
    /// Round-trip messages through an in-memory link.
    Selftest(SelftestArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat, frame: FrameConfig) -> CliResult<i32> {
    frame
        .validate()
        .map_err(|err| frame_error("invalid link configuration", err))?;
    let config = BusConfig::from(frame);

    match command {
        Command::Listen(args) => listen::run(args, format, config),
        Command::Send(args) => send::run(args, config),
        Command::Selftest(args) => selftest::run(args, format, config),
        Command::Version(args) => version::run(args, format, &config),
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Channel pattern; must match the whole channel name.
    #[arg(long, short = 'p', default_value = ".*")]
    pub pattern: String,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Channel to publish on.
    #[arg(long, short = 'c')]
    pub channel: String,
    /// JSON payload (validated before sending).
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// How long to wait for the message to leave the transmit buffer (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct SelftestArgs {
    /// Number of messages to publish.
    #[arg(long, default_value_t = 1000)]
    pub messages: usize,
    /// Payload size of each message, in bytes.
    #[arg(long, default_value_t = 42)]
    pub size: usize,
    /// Inject line noise between messages.
    #[arg(long)]
    pub noise: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
