use core::fmt::Write;

use heapless::String;
use log::{error, warn};

use crate::error::Error;

/// Name the Bluetooth serial service is advertised under.
pub const DEVICE_NAME: &str = "ESP32_Test";
pub const CONSOLE_BAUD: u32 = 115_200;
/// "Test\n" followed by one NUL byte, six bytes on the wire.
pub const PAYLOAD: &[u8; 6] = b"Test\n\0";
pub const TRANSMIT_PERIOD_MS: u32 = 1_000;

/// A legacy advertising packet is 31 bytes; the flags take 3 and the name header 2.
pub const MAX_DEVICE_NAME_LEN: usize = 26;
pub const STATUS_LINE_LEN: usize = 64;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BeaconConfig {
    pub device_name: &'static str,
    pub console_baud: u32,
    pub payload: &'static [u8],
    pub period_ms: u32,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            device_name: DEVICE_NAME,
            console_baud: CONSOLE_BAUD,
            payload: PAYLOAD,
            period_ms: TRANSMIT_PERIOD_MS,
        }
    }
}

impl BeaconConfig {
    pub fn with_device_name(mut self, name: &'static str) -> crate::Result<Self> {
        validate_device_name(name)?;
        self.device_name = name;
        Ok(self)
    }

    pub fn with_period_ms(mut self, period_ms: &str) -> crate::Result<Self> {
        self.period_ms = match period_ms.trim().parse::<u32>() {
            Ok(0) | Err(_) => return Err(Error::InvalidPeriod),
            Ok(ms) => ms,
        };
        Ok(self)
    }

    /// Applies compile-time overrides on top of the defaults.
    ///
    /// Invalid values are logged and the corresponding default is kept, so the
    /// device always comes up with a usable configuration.
    pub fn from_overrides(name: Option<&'static str>, period_ms: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(name) = name {
            match config.with_device_name(name) {
                Ok(c) => config = c,
                Err(e) => error!("Ignoring BEACON_NAME={name:?}: {e}"),
            }
        }
        if let Some(period_ms) = period_ms {
            match config.with_period_ms(period_ms) {
                Ok(c) => config = c,
                Err(e) => error!("Ignoring BEACON_PERIOD_MS={period_ms:?}: {e}"),
            }
        }
        config
    }

    /// The line printed on the console once the Bluetooth service is up.
    pub fn status_line(&self) -> String<STATUS_LINE_LEN> {
        let mut line = String::new();
        if writeln!(line, "Bluetooth ready. Connect to '{}'", self.device_name).is_err() {
            warn!("Status line truncated to {STATUS_LINE_LEN} bytes");
        }
        line
    }
}

pub fn validate_device_name(name: &str) -> crate::Result<()> {
    if name.is_empty() || name.len() > MAX_DEVICE_NAME_LEN {
        return Err(Error::InvalidDeviceName);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_line() {
        let config = BeaconConfig::default();
        assert_eq!(
            config.status_line().as_str(),
            "Bluetooth ready. Connect to 'ESP32_Test'\n"
        );
    }

    #[test]
    fn payload_is_six_bytes() {
        assert_eq!(PAYLOAD, &[0x54, 0x65, 0x73, 0x74, 0x0a, 0x00]);
        assert_eq!(BeaconConfig::default().payload.len(), 6);
    }

    #[test]
    fn device_name_bounds() {
        assert_eq!(validate_device_name(""), Err(Error::InvalidDeviceName));
        assert!(validate_device_name("ESP32_Test").is_ok());
        assert!(validate_device_name("abcdefghijklmnopqrstuvwxyz").is_ok());
        assert_eq!(
            validate_device_name("abcdefghijklmnopqrstuvwxyz0"),
            Err(Error::InvalidDeviceName)
        );
    }

    #[test]
    fn period_parsing() {
        let config = BeaconConfig::default();
        assert_eq!(config.with_period_ms(" 250 ").unwrap().period_ms, 250);
        assert_eq!(config.with_period_ms("0"), Err(Error::InvalidPeriod));
        assert_eq!(config.with_period_ms("1s"), Err(Error::InvalidPeriod));
    }

    #[test]
    fn overrides_fall_back_to_defaults() {
        let config = BeaconConfig::from_overrides(Some(""), Some("fast"));
        assert_eq!(config, BeaconConfig::default());

        let config = BeaconConfig::from_overrides(Some("Bench_01"), Some("500"));
        assert_eq!(config.device_name, "Bench_01");
        assert_eq!(config.period_ms, 500);
        assert_eq!(config.console_baud, CONSOLE_BAUD);
        assert_eq!(
            config.status_line().as_str(),
            "Bluetooth ready. Connect to 'Bench_01'\n"
        );
    }
}
