use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Cannot open serial port {port}: {source}")]
    OpenError {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },
    #[error("Serial port closed by the device")]
    ClosedError,
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
