//! Device side of the Bluetooth serial endpoint.
//!
//! The transmitter writes through a [`SerialTx`] handle while the BLE
//! connection handler drains the queued frames into notifications. Writes never
//! wait for the radio: with no peer attached they are discarded, and frames that
//! do not fit in the queue are dropped.

use core::cell::Cell;
use core::convert::Infallible;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embedded_io_async::{ErrorType, Write};
use heapless::Vec;
use log::{debug, info, trace};

use crate::RawMutex;
use crate::config::validate_device_name;
use crate::error::Error;

/// Payload bytes per notification with the default ATT MTU of 23.
pub const FRAME_LEN: usize = 20;
pub const FRAME_QUEUE_LEN: usize = 4;

pub type Frame = Vec<u8, FRAME_LEN>;

/// A Bluetooth serial port that can be started under a device name.
pub trait BluetoothSerial: Write {
    /// Starts the service and makes the device discoverable under `device_name`.
    fn begin(&mut self, device_name: &'static str) -> crate::Result<()>;
}

impl<T: BluetoothSerial + ?Sized> BluetoothSerial for &mut T {
    fn begin(&mut self, device_name: &'static str) -> crate::Result<()> {
        T::begin(self, device_name)
    }
}

#[derive(Clone, Copy, Default)]
struct LinkState {
    connected: bool,
    unavailable: bool,
    dropped_frames: u32,
}

pub struct SerialLink {
    state: Mutex<RawMutex, Cell<LinkState>>,
    started: Signal<RawMutex, &'static str>,
    frames: Channel<RawMutex, Frame, FRAME_QUEUE_LEN>,
}

impl Default for SerialLink {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialLink {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(LinkState {
                connected: false,
                unavailable: false,
                dropped_frames: 0,
            })),
            started: Signal::new(),
            frames: Channel::new(),
        }
    }

    fn update(&self, f: impl FnOnce(&mut LinkState)) {
        self.state.lock(|cell| {
            let mut state = cell.get();
            f(&mut state);
            cell.set(state);
        });
    }

    fn snapshot(&self) -> LinkState {
        self.state.lock(Cell::get)
    }

    /// Marks the radio as missing, later [`SerialLink::begin`] calls fail.
    pub fn mark_unavailable(&self) {
        self.update(|s| s.unavailable = true);
    }

    pub fn begin(&self, device_name: &'static str) -> crate::Result<()> {
        if self.snapshot().unavailable {
            return Err(Error::BluetoothUnavailable);
        }
        validate_device_name(device_name)?;
        self.started.signal(device_name);
        Ok(())
    }

    /// Resolves with the device name once the service has been started.
    pub async fn started(&self) -> &'static str {
        self.started.wait().await
    }

    pub fn connect(&self) {
        // Frames queued while nobody was listening are stale.
        self.frames.clear();
        self.update(|s| s.connected = true);
        info!("Bluetooth serial peer attached");
    }

    pub fn disconnect(&self) {
        self.update(|s| s.connected = false);
        self.frames.clear();
        info!("Bluetooth serial peer detached");
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot().connected
    }

    pub fn dropped_frames(&self) -> u32 {
        self.snapshot().dropped_frames
    }

    /// Waits for the next frame to notify to the peer.
    pub async fn next_frame(&self) -> Frame {
        self.frames.receive().await
    }

    pub fn try_next_frame(&self) -> Option<Frame> {
        self.frames.try_receive().ok()
    }

    pub fn writer(&self) -> SerialTx<'_> {
        SerialTx { link: self }
    }

    /// Queues `buf` for the connected peer. Always accepts the whole buffer.
    fn send(&self, buf: &[u8]) -> usize {
        if !self.is_connected() {
            trace!("No peer attached, discarding {} bytes", buf.len());
            return buf.len();
        }
        for chunk in buf.chunks(FRAME_LEN) {
            let Ok(frame) = Frame::from_slice(chunk) else {
                continue;
            };
            if self.frames.try_send(frame).is_err() {
                self.update(|s| s.dropped_frames = s.dropped_frames.wrapping_add(1));
                debug!("Frame queue full, dropping {} bytes", chunk.len());
            }
        }
        buf.len()
    }
}

/// Write half of a [`SerialLink`].
#[derive(Clone, Copy)]
pub struct SerialTx<'a> {
    link: &'a SerialLink,
}

impl SerialTx<'_> {
    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }
}

impl ErrorType for SerialTx<'_> {
    type Error = Infallible;
}

impl Write for SerialTx<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(self.link.send(buf))
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl BluetoothSerial for SerialTx<'_> {
    fn begin(&mut self, device_name: &'static str) -> crate::Result<()> {
        self.link.begin(device_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn writes_without_peer_are_discarded() {
        let link = SerialLink::new();
        let mut tx = link.writer();
        assert_eq!(block_on(tx.write(b"Test\n\0")), Ok(6));
        link.connect();
        assert!(link.try_next_frame().is_none());
        assert_eq!(link.dropped_frames(), 0);
    }

    #[test]
    fn long_writes_are_split_into_frames() {
        let link = SerialLink::new();
        link.connect();
        let data = [0x41u8; 45];
        let mut tx = link.writer();
        assert_eq!(block_on(tx.write(&data)), Ok(45));

        let lens: std::vec::Vec<usize> = core::iter::from_fn(|| link.try_next_frame())
            .map(|f| f.len())
            .collect();
        assert_eq!(lens, [20, 20, 5]);
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let link = SerialLink::new();
        link.connect();
        let mut tx = link.writer();
        for _ in 0..FRAME_QUEUE_LEN + 3 {
            assert_eq!(block_on(tx.write(b"Test\n\0")), Ok(6));
        }
        assert_eq!(link.dropped_frames(), 3);
    }

    #[test]
    fn reconnect_clears_stale_frames() {
        let link = SerialLink::new();
        link.connect();
        block_on(link.writer().write_all(b"old")).unwrap();
        link.disconnect();
        assert!(!link.is_connected());
        link.connect();
        assert!(link.try_next_frame().is_none());
    }

    #[test]
    fn begin_validates_and_signals_name() {
        let link = SerialLink::new();
        let mut tx = link.writer();
        assert_eq!(tx.begin(""), Err(Error::InvalidDeviceName));
        assert_eq!(tx.begin("ESP32_Test"), Ok(()));
        assert_eq!(block_on(link.started()), "ESP32_Test");
    }

    #[test]
    fn begin_fails_without_radio() {
        let link = SerialLink::new();
        link.mark_unavailable();
        assert_eq!(link.begin("ESP32_Test"), Err(Error::BluetoothUnavailable));
    }
}
