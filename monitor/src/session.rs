use std::time::Duration;

use bt_beacon_common::line::LineBuffer;
use chrono::Local;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::time::Instant;
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use crate::cadence::{CadenceSummary, CadenceTracker};
use crate::display::{outgoing, printable, stamp};
use crate::error::Error;

const LINE_LEN: usize = 1024;

/// Opens `port` with the beacon console settings: 8 data bits, 1 stop bit, no parity.
pub fn open(port: &str, baud: u32) -> crate::Result<SerialStream> {
    tokio_serial::new(port, baud)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(Parity::None)
        .open_native_async()
        .map_err(|source| Error::OpenError {
            port: port.to_owned(),
            source,
        })
}

#[derive(Debug, PartialEq, Eq)]
pub struct ReceivedLine {
    pub text: String,
    /// Interval since the previous expected line, if this line was one.
    pub interval: Option<Duration>,
    pub early: bool,
}

/// Turns the raw byte stream into display lines and watches the cadence of an
/// expected line.
pub struct Monitor {
    lines: LineBuffer<LINE_LEN>,
    expect: Option<String>,
    cadence: CadenceTracker,
}

impl Monitor {
    pub fn new(expect: Option<String>, period: Duration) -> Self {
        Self {
            lines: LineBuffer::new(),
            expect,
            cadence: CadenceTracker::new(period),
        }
    }

    pub fn feed(&mut self, data: &[u8], at: Instant) -> Vec<ReceivedLine> {
        let mut texts = Vec::new();
        self.lines.feed(data, |line| texts.push(printable(line)));

        texts
            .into_iter()
            .map(|text| {
                let mut interval = None;
                let mut early = false;
                if self.expect.as_deref() == Some(text.as_str()) {
                    interval = self.cadence.record(at);
                    early = interval.is_some_and(|i| self.cadence.is_early(i));
                }
                ReceivedLine {
                    text,
                    interval,
                    early,
                }
            })
            .collect()
    }

    pub fn is_tracking(&self) -> bool {
        self.expect.is_some()
    }

    pub fn summary(&self) -> CadenceSummary {
        self.cadence.summary()
    }

    fn show(&self, line: &ReceivedLine) {
        println!("{}", stamp(&Local::now(), &line.text));
        if line.early {
            if let Some(interval) = line.interval {
                warn!(
                    "'{}' arrived after {}ms, expected {}ms",
                    line.text,
                    interval.as_millis(),
                    self.cadence.expected().as_millis()
                );
            }
        }
    }
}

/// Shows everything the device sends and forwards typed lines until Ctrl-C.
pub async fn run(mut serial: SerialStream, monitor: &mut Monitor) -> crate::Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut buf = [0u8; 256];

    info!("Connected, type a line and press enter to send it");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Disconnecting");
                return Ok(());
            }
            read = serial.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    return Err(Error::ClosedError);
                }
                for line in monitor.feed(&buf[..n], Instant::now()) {
                    monitor.show(&line);
                }
            }
            typed = stdin.next_line(), if stdin_open => {
                match typed? {
                    Some(message) => {
                        if let Some(wire) = outgoing(&message) {
                            serial.write_all(wire.as_bytes()).await?;
                            info!("Sent: {}", wire.trim_end());
                        }
                    }
                    None => stdin_open = false,
                }
            }
        }
    }
}
