use embedded_io_async::ErrorKind;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum Error {
    #[error("Device name must be 1 to 26 bytes long")]
    InvalidDeviceName,
    #[error("Transmit period must be a positive number of milliseconds")]
    InvalidPeriod,
    #[error("Console write failed: {0:?}")]
    ConsoleWriteError(ErrorKind),
    #[error("Bluetooth write failed: {0:?}")]
    BluetoothWriteError(ErrorKind),
    #[error("Bluetooth controller unavailable")]
    BluetoothUnavailable,
}
