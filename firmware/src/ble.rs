//! Nordic UART Service peripheral
//!
//! Backs the Bluetooth serial link: advertises under the device name once the
//! link is started, accepts one peer at a time, notifies queued frames on the
//! TX characteristic and logs the lines the peer writes to RX.

use bt_beacon_common::line::LineBuffer;
use bt_beacon_common::serial_link::{FRAME_LEN, Frame, SerialLink};
use bt_hci::controller::ExternalController;
use embassy_futures::join::join;
use embassy_futures::select::select;
use embassy_time::{Duration, Timer};
use esp_radio::ble::controller::BleConnector;
use log::{debug, error, info, warn};
use static_cell::StaticCell;
use trouble_host::prelude::*;
use trouble_host::types::gatt_traits::{AsGatt, FromGatt, FromGattError};

const CONNECTIONS_MAX: usize = 1;
const L2CAP_CHANNELS_MAX: usize = 2;
const CONTROLLER_SLOTS: usize = 20;
const RX_LINE_LEN: usize = 128;

/// 6E400001-B5A3-F393-E0A9-E50E24DCCA9E, little-endian as it goes on air.
const NUS_SERVICE_UUID_LE: [u8; 16] = [
    0x9e, 0xca, 0xdc, 0x24, 0x0e, 0xe5, 0xa9, 0xe0, 0x93, 0xf3, 0xa3, 0xb5, 0x01, 0x00, 0x40, 0x6e,
];

/// Variable-length characteristic value, at most one frame long.
#[derive(Clone, Default)]
pub struct SerialChunk(pub Frame);

impl AsGatt for SerialChunk {
    const MIN_SIZE: usize = 0;
    const MAX_SIZE: usize = FRAME_LEN;

    fn as_gatt(&self) -> &[u8] {
        &self.0
    }
}

impl FromGatt for SerialChunk {
    fn from_gatt(data: &[u8]) -> Result<Self, FromGattError> {
        Frame::from_slice(data)
            .map(Self)
            .map_err(|_| FromGattError::InvalidLength)
    }
}

#[gatt_service(uuid = "6e400001-b5a3-f393-e0a9-e50e24dcca9e")]
pub struct NordicUartService {
    /// Peer to device.
    #[characteristic(uuid = "6e400002-b5a3-f393-e0a9-e50e24dcca9e", write, write_without_response)]
    pub rx: SerialChunk,

    /// Device to peer.
    #[characteristic(uuid = "6e400003-b5a3-f393-e0a9-e50e24dcca9e", notify)]
    pub tx: SerialChunk,
}

#[gatt_server]
pub struct SerialServer {
    pub nus: NordicUartService,
}

/// Encodes the advertising and scan response payloads.
///
/// The name goes into the advertisement so scanners list the device, the
/// 128-bit service UUID does not fit next to it and goes into the scan response.
fn encode_advertisement(
    name: &str,
    adv_data: &mut [u8],
    scan_data: &mut [u8],
) -> Option<(usize, usize)> {
    let adv_len = AdStructure::encode_slice(
        &[
            AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
            AdStructure::CompleteLocalName(name.as_bytes()),
        ],
        adv_data,
    )
    .ok()?;
    let scan_len = AdStructure::encode_slice(
        &[AdStructure::ServiceUuids128(&[NUS_SERVICE_UUID_LE])],
        scan_data,
    )
    .ok()?;
    Some((adv_len, scan_len))
}

fn log_peer_line(line: &[u8]) {
    match core::str::from_utf8(line) {
        Ok(text) => info!("Received from peer: {text}"),
        Err(_) => info!("Received from peer: {line:02x?}"),
    }
}

async fn handle_events(conn: &GattConnection<'_, '_, DefaultPacketPool>, server: &SerialServer<'_>) {
    let mut lines = LineBuffer::<RX_LINE_LEN>::new();
    loop {
        match conn.next().await {
            GattConnectionEvent::Disconnected { reason } => {
                info!("GATT disconnected: {reason:?}");
                break;
            }
            GattConnectionEvent::Gatt { event } => {
                if let GattEvent::Write(write_event) = event {
                    if write_event.handle() == server.nus.rx.handle {
                        lines.feed(write_event.data(), log_peer_line);
                    }
                }
            }
            _ => {}
        }
    }
    if !lines.pending().is_empty() {
        log_peer_line(lines.pending());
    }
}

async fn forward_frames(
    conn: &GattConnection<'_, '_, DefaultPacketPool>,
    server: &SerialServer<'_>,
    link: &SerialLink,
) {
    loop {
        let frame = link.next_frame().await;
        let len = frame.len();
        if let Err(e) = server.nus.tx.notify(conn, &SerialChunk(frame)).await {
            warn!("Failed to notify {len} bytes: {e:?}");
            break;
        }
        debug!("Notified {len} bytes");
    }
}

/// Runs the BLE host and serves the link until the host stops.
pub async fn run(connector: BleConnector<'static>, link: &'static SerialLink) {
    let controller: ExternalController<_, CONTROLLER_SLOTS> = ExternalController::new(connector);

    static HOST_RESOURCES: StaticCell<
        HostResources<DefaultPacketPool, CONNECTIONS_MAX, L2CAP_CHANNELS_MAX>,
    > = StaticCell::new();
    let host_resources = HOST_RESOURCES.init(HostResources::new());

    let stack = trouble_host::new(controller, host_resources);
    let Host {
        mut peripheral,
        mut runner,
        ..
    } = stack.build();

    info!("BLE stack initialized");

    let runner_task = async {
        if let Err(e) = runner.run().await {
            error!("BLE host stopped: {e:?}");
        }
    };

    let serial_task = async {
        let name = link.started().await;

        static SERVER: StaticCell<SerialServer> = StaticCell::new();
        let server = match SerialServer::new_with_config(GapConfig::Peripheral(PeripheralConfig {
            name,
            appearance: &appearance::sensor::GENERIC_SENSOR,
        })) {
            Ok(server) => SERVER.init(server),
            Err(e) => {
                error!("Failed to create GATT server: {e}");
                return;
            }
        };

        let mut adv_data = [0u8; 31];
        let mut scan_data = [0u8; 31];
        let (adv_len, scan_len) = match encode_advertisement(name, &mut adv_data, &mut scan_data)
        {
            Some(lens) => lens,
            None => {
                error!("Advertisement for '{name}' does not fit in 31 bytes");
                return;
            }
        };

        loop {
            let advertiser = match peripheral
                .advertise(
                    &Default::default(),
                    Advertisement::ConnectableScannableUndirected {
                        adv_data: &adv_data[..adv_len],
                        scan_data: &scan_data[..scan_len],
                    },
                )
                .await
            {
                Ok(advertiser) => advertiser,
                Err(e) => {
                    warn!("Advertising error: {e:?}");
                    Timer::after(Duration::from_secs(1)).await;
                    continue;
                }
            };

            info!("Advertising as '{name}', waiting for connection...");

            let conn = match advertiser.accept().await {
                Ok(conn) => match conn.with_attribute_server(server) {
                    Ok(gatt_conn) => gatt_conn,
                    Err(e) => {
                        warn!("Failed to create GATT connection: {e:?}");
                        continue;
                    }
                },
                Err(e) => {
                    warn!("Connection accept error: {e:?}");
                    continue;
                }
            };

            link.connect();
            select(
                handle_events(&conn, server),
                forward_frames(&conn, server, link),
            )
            .await;
            link.disconnect();

            let dropped = link.dropped_frames();
            if dropped > 0 {
                warn!("{dropped} frames dropped so far, peer too slow");
            }
        }
    };

    join(runner_task, serial_task).await;
}
