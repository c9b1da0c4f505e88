// Bluetooth serial test beacon
// 1. Run the app
// cargo r -r
// 2. Connect to `ESP32_Test` with any Nordic UART Service client (e.g. nRF Connect),
//    "Test" arrives every second.
// 3. Watch the console (UART0, 115200 baud) with the host monitor
// cargo run -p bt-beacon-monitor -- --port /dev/ttyUSB0
// Optional: BEACON_NAME="Bench_01" BEACON_PERIOD_MS="500" cargo r -r

#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

mod ble;
mod console;

use bt_beacon_common::beacon::Beacon;
use bt_beacon_common::config::BeaconConfig;
use bt_beacon_common::serial_link::SerialLink;
use embassy_executor::Spawner;
use embassy_futures::join::join;
use embassy_time::Delay;
use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::{
    clock::CpuClock, interrupt::software::SoftwareInterruptControl, ram, timer::timg::TimerGroup,
};
use esp_radio::Controller;
use esp_radio::ble::controller::BleConnector;
use log::{error, info};
use static_cell::StaticCell;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

const BEACON_NAME: Option<&'static str> = option_env!("BEACON_NAME");
const BEACON_PERIOD_MS: Option<&'static str> = option_env!("BEACON_PERIOD_MS");

static SERIAL_LINK: SerialLink = SerialLink::new();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::logger::init_logger_from_env();
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[ram(reclaimed)] size: 64 * 1024);
    esp_alloc::heap_allocator!(size: 36 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    let beacon_config = BeaconConfig::from_overrides(BEACON_NAME, BEACON_PERIOD_MS);
    info!(
        "Beacon '{}', {} ms period",
        beacon_config.device_name, beacon_config.period_ms
    );

    let console = console::open(
        peripherals.UART0,
        peripherals.GPIO21,
        beacon_config.console_baud,
    );

    static ESP_RADIO_CTRL_CELL: StaticCell<Controller<'static>> = StaticCell::new();
    let connector = match esp_radio::init() {
        Ok(radio) => {
            let radio = &*ESP_RADIO_CTRL_CELL.uninit().write(radio);
            match BleConnector::new(radio, peripherals.BT, Default::default()) {
                Ok(connector) => Some(connector),
                Err(e) => {
                    error!("Failed to create BLE connector: {e:?}");
                    None
                }
            }
        }
        Err(e) => {
            error!("Failed to initialize radio controller: {e:?}");
            None
        }
    };
    if connector.is_none() {
        SERIAL_LINK.mark_unavailable();
    }

    let bluetooth = async {
        if let Some(connector) = connector {
            ble::run(connector, &SERIAL_LINK).await;
        }
    };
    let beacon = Beacon::new(beacon_config, console, SERIAL_LINK.writer(), Delay);

    let _ = join(bluetooth, beacon.run()).await;

    #[allow(clippy::empty_loop)]
    loop {}
}
