use bt_beacon_common::console::Console;
use esp_hal::Async;
use esp_hal::peripherals::{GPIO21, UART0};
use esp_hal::uart::{Config, UartTx};
use log::{error, info};

pub type ConsoleUart = UartTx<'static, Async>;

/// Opens UART0 (TX on GPIO21) as the status console.
///
/// The console is output-only. If the UART cannot be configured the error is
/// logged and a detached console is returned instead.
pub fn open(uart: UART0<'static>, tx: GPIO21<'static>, baud: u32) -> Console<ConsoleUart> {
    let config = Config::default().with_baudrate(baud);
    match UartTx::new(uart, config) {
        Ok(uart) => {
            info!("Console open on UART0 at {baud} baud");
            Console::attached(uart.with_tx(tx).into_async())
        }
        Err(e) => {
            error!("Failed to open console UART0 at {baud} baud: {e:?}");
            Console::detached()
        }
    }
}
