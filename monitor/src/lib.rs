pub mod cadence;
pub mod display;
pub mod error;
pub mod session;

pub type Result<T> = std::result::Result<T, error::Error>;
