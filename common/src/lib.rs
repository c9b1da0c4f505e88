#![cfg_attr(not(test), no_std)]

pub mod beacon;
pub mod config;
pub mod console;
pub mod error;
pub mod line;
pub mod serial_link;

pub type Result<T> = core::result::Result<T, error::Error>;

pub type RawMutex = embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
