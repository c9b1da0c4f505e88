use std::process::ExitCode;
use std::time::Duration;

use bt_beacon_common::config::{CONSOLE_BAUD, TRANSMIT_PERIOD_MS};
use bt_beacon_monitor::session::{self, Monitor};
use clap::Parser;
use log::{error, info};

/// Serial monitor for the Bluetooth test beacon.
#[derive(Parser, Debug)]
struct Args {
    /// Serial port, e.g. /dev/ttyUSB0 for the console or /dev/rfcomm0 for a bound Bluetooth port
    #[arg(short, long)]
    port: String,
    #[arg(short, long, default_value_t = CONSOLE_BAUD)]
    baud: u32,
    /// Report the cadence of lines equal to this text, e.g. "Test"
    #[arg(short, long)]
    expect: Option<String>,
    /// Expected interval between two expected lines
    #[arg(long, default_value_t = TRANSMIT_PERIOD_MS)]
    period_ms: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let serial = match session::open(&args.port, args.baud) {
        Ok(serial) => serial,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    info!("Opened {} at {} baud", args.port, args.baud);

    let period = Duration::from_millis(args.period_ms.into());
    let mut monitor = Monitor::new(args.expect, period);
    let result = session::run(serial, &mut monitor).await;

    if monitor.is_tracking() {
        info!("{}", monitor.summary());
    }
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
