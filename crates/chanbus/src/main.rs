mod cmd;
mod exit;
mod logging;
mod output;

use chanbus_frame::{FrameConfig, DEFAULT_BUF_SIZE, DEFAULT_MTU};
use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "chanbus", version, about = "Channel pub/sub over serial framing")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Largest payload accepted on the link, in bytes.
    #[arg(long, env = "CHANBUS_MTU", default_value_t = DEFAULT_MTU, global = true)]
    mtu: usize,

    /// Receive and transmit buffer size, in bytes.
    #[arg(long, env = "CHANBUS_BUF_SIZE", default_value_t = DEFAULT_BUF_SIZE, global = true)]
    buf_size: usize,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn frame_config(&self) -> FrameConfig {
        FrameConfig::new(self.mtu, self.buf_size)
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let frame = cli.frame_config();
    let result = cmd::run(cli.command, format, frame);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "chanbus",
            "send",
            "/tmp/test.sock",
            "--channel",
            "SENSOR_IMU",
            "--data",
            "hello",
        ])
        .expect("send args should parse");

        assert!(matches!(cli.command, Command::Send(_)));
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "chanbus",
            "send",
            "/tmp/test.sock",
            "--channel",
            "X",
            "--json",
            "{\"x\":1}",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn send_requires_a_channel() {
        let err = Cli::try_parse_from(["chanbus", "send", "/tmp/test.sock", "--data", "x"])
            .expect_err("missing channel should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn link_sizes_default_and_override() {
        let cli = Cli::try_parse_from(["chanbus", "selftest"]).expect("selftest should parse");
        let frame = cli.frame_config();
        assert_eq!(frame.mtu, DEFAULT_MTU);
        assert_eq!(frame.buf_size, DEFAULT_BUF_SIZE);

        let cli = Cli::try_parse_from([
            "chanbus",
            "selftest",
            "--mtu",
            "256",
            "--buf-size",
            "4096",
        ])
        .expect("sizes should parse after the subcommand");
        assert_eq!(cli.frame_config().mtu, 256);
        assert_eq!(cli.frame_config().buf_size, 4096);
    }

    #[test]
    fn parses_listen_subcommand() {
        let cli = Cli::try_parse_from([
            "chanbus",
            "listen",
            "/tmp/test.sock",
            "--pattern",
            "SENSOR_.*",
            "--count",
            "3",
        ])
        .expect("listen args should parse");
        match cli.command {
            Command::Listen(args) => {
                assert_eq!(args.pattern, "SENSOR_.*");
                assert_eq!(args.count, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
