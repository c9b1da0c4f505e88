use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{Error as _, Write};
use log::{debug, info, warn};

use crate::config::BeaconConfig;
use crate::error::Error;
use crate::serial_link::BluetoothSerial;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    Initializing,
    Transmitting,
}

/// Brings up the console and the Bluetooth serial port once, then sends the
/// payload on every period.
pub struct Beacon<C, B, D> {
    config: BeaconConfig,
    console: C,
    bluetooth: B,
    delay: D,
    state: State,
    payloads_sent: u32,
    write_errors: u32,
}

impl<C, B, D> Beacon<C, B, D>
where
    C: Write,
    B: BluetoothSerial,
    D: DelayNs,
{
    pub fn new(config: BeaconConfig, console: C, bluetooth: B, delay: D) -> Self {
        Self {
            config,
            console,
            bluetooth,
            delay,
            state: State::Initializing,
            payloads_sent: 0,
            write_errors: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn payloads_sent(&self) -> u32 {
        self.payloads_sent
    }

    pub fn write_errors(&self) -> u32 {
        self.write_errors
    }

    /// Starts the Bluetooth service and prints the status line.
    ///
    /// The status line is printed even when the service failed to start.
    pub async fn start(&mut self) {
        if self.state != State::Initializing {
            warn!("Beacon already started");
            return;
        }

        let name = self.config.device_name;
        match self.bluetooth.begin(name) {
            Ok(()) => info!("Bluetooth serial started as '{name}'"),
            Err(e) => warn!("Failed to start Bluetooth serial '{name}': {e}"),
        }

        let line = self.config.status_line();
        if let Err(e) = self.write_console(line.as_bytes()).await {
            warn!("{e}");
        }
        info!("{}", line.trim_end());

        self.state = State::Transmitting;
    }

    async fn write_console(&mut self, bytes: &[u8]) -> crate::Result<()> {
        self.console
            .write_all(bytes)
            .await
            .map_err(|e| Error::ConsoleWriteError(e.kind()))?;
        self.console
            .flush()
            .await
            .map_err(|e| Error::ConsoleWriteError(e.kind()))
    }

    /// One cycle: send the payload, then wait for the period.
    pub async fn transmit(&mut self) {
        match self.bluetooth.write_all(self.config.payload).await {
            Ok(()) => {
                self.payloads_sent = self.payloads_sent.wrapping_add(1);
                debug!("Sent payload #{}", self.payloads_sent);
            }
            Err(e) => {
                self.write_errors = self.write_errors.wrapping_add(1);
                warn!("{}", Error::BluetoothWriteError(e.kind()));
            }
        }
        self.delay.delay_ms(self.config.period_ms).await;
    }

    pub async fn run(mut self) -> ! {
        self.start().await;
        loop {
            self.transmit().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embedded_io_async::{ErrorKind, ErrorType};
    use std::vec::Vec;

    use crate::config::PAYLOAD;

    #[derive(Default)]
    struct FakeConsole {
        data: Vec<u8>,
        broken: bool,
    }

    impl ErrorType for FakeConsole {
        type Error = ErrorKind;
    }

    impl Write for FakeConsole {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
            if self.broken {
                return Err(ErrorKind::BrokenPipe);
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    #[derive(Default)]
    struct FakeBluetooth {
        name: Option<&'static str>,
        refuse_begin: bool,
        writes: Vec<Vec<u8>>,
        broken: bool,
    }

    impl ErrorType for FakeBluetooth {
        type Error = ErrorKind;
    }

    impl Write for FakeBluetooth {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
            if self.broken {
                return Err(ErrorKind::NotConnected);
            }
            self.writes.push(buf.to_vec());
            Ok(buf.len())
        }
    }

    impl BluetoothSerial for FakeBluetooth {
        fn begin(&mut self, device_name: &'static str) -> crate::Result<()> {
            if self.refuse_begin {
                return Err(Error::BluetoothUnavailable);
            }
            self.name = Some(device_name);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeDelay {
        waits_ns: Vec<u64>,
    }

    impl DelayNs for FakeDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.waits_ns.push(ns.into());
        }
    }

    #[test]
    fn start_prints_status_once() {
        let mut console = FakeConsole::default();
        let mut bluetooth = FakeBluetooth::default();
        let mut beacon = Beacon::new(
            BeaconConfig::default(),
            &mut console,
            &mut bluetooth,
            FakeDelay::default(),
        );
        assert_eq!(beacon.state(), State::Initializing);
        block_on(beacon.start());
        block_on(beacon.start());
        assert_eq!(beacon.state(), State::Transmitting);
        drop(beacon);

        assert_eq!(console.data, b"Bluetooth ready. Connect to 'ESP32_Test'\n");
        assert_eq!(bluetooth.name, Some("ESP32_Test"));
        assert!(bluetooth.writes.is_empty());
    }

    #[test]
    fn status_printed_even_if_bluetooth_fails() {
        let mut console = FakeConsole::default();
        let bluetooth = FakeBluetooth {
            refuse_begin: true,
            ..Default::default()
        };
        let mut beacon = Beacon::new(
            BeaconConfig::default(),
            &mut console,
            bluetooth,
            FakeDelay::default(),
        );
        block_on(beacon.start());
        assert_eq!(beacon.state(), State::Transmitting);
        drop(beacon);
        assert_eq!(console.data, b"Bluetooth ready. Connect to 'ESP32_Test'\n");
    }

    #[test]
    fn console_failure_does_not_stop_startup() {
        let console = FakeConsole {
            broken: true,
            ..Default::default()
        };
        let mut bluetooth = FakeBluetooth::default();
        let mut beacon = Beacon::new(
            BeaconConfig::default(),
            console,
            &mut bluetooth,
            FakeDelay::default(),
        );
        block_on(beacon.start());
        assert_eq!(beacon.state(), State::Transmitting);
        block_on(beacon.transmit());
        assert_eq!(beacon.payloads_sent(), 1);
    }

    #[test]
    fn each_cycle_sends_payload_then_waits_a_second() {
        let mut bluetooth = FakeBluetooth::default();
        let mut delay = FakeDelay::default();
        let mut beacon = Beacon::new(
            BeaconConfig::default(),
            FakeConsole::default(),
            &mut bluetooth,
            &mut delay,
        );
        block_on(beacon.start());
        for _ in 0..3 {
            block_on(beacon.transmit());
        }
        assert_eq!(beacon.payloads_sent(), 3);
        drop(beacon);

        assert_eq!(bluetooth.writes.len(), 3);
        assert!(bluetooth.writes.iter().all(|w| w == PAYLOAD));
        let total: u64 = delay.waits_ns.iter().sum();
        assert_eq!(total, 3 * 1_000_000_000);
    }

    #[test]
    fn write_errors_are_counted_and_loop_continues() {
        let bluetooth = FakeBluetooth {
            broken: true,
            ..Default::default()
        };
        let mut delay = FakeDelay::default();
        let mut beacon = Beacon::new(
            BeaconConfig::default(),
            FakeConsole::default(),
            bluetooth,
            &mut delay,
        );
        block_on(beacon.start());
        block_on(beacon.transmit());
        block_on(beacon.transmit());
        assert_eq!(beacon.payloads_sent(), 0);
        assert_eq!(beacon.write_errors(), 2);
        drop(beacon);
        assert_eq!(delay.waits_ns.len(), 2);
    }
}
