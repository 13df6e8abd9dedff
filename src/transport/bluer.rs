//! BlueZ D-Bus GATT backend for the sensing unit.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.
//!
//! The device exposes one custom service with a single characteristic used in
//! both directions: commands are written to it and readings arrive as
//! notifications.

use super::{
    EVENT_CHANNEL_BUFFER_SIZE, Link, Transport, TransportError, TransportEvent, TransportFuture,
    encode_command,
};
use crate::device::{DEFAULT_DEVICE_NAME, DeviceFilter};
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, AdapterEvent, Address, Device, DeviceEvent, DeviceProperty, Session, Uuid};
use futures::{Stream, StreamExt, pin_mut};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Primary service of the sensing unit firmware.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);

/// Characteristic carrying commands and readings.
pub const CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);

/// Poll period while waiting for BlueZ to resolve remote services.
const SERVICE_RESOLVE_POLL: Duration = Duration::from_millis(200);

impl From<bluer::Error> for TransportError {
    fn from(err: bluer::Error) -> Self {
        match err.kind {
            bluer::ErrorKind::AuthenticationCanceled => TransportError::Cancelled,
            _ => TransportError::Bluetooth(err.to_string()),
        }
    }
}

/// State that must stay alive for the duration of a connection.
struct ActiveLink {
    _session: Session,
    device: Device,
    characteristic: Characteristic,
    pump: JoinHandle<()>,
}

/// GATT client transport.
pub struct BluerTransport {
    filter: DeviceFilter,
    scan_timeout: Duration,
    link: Option<ActiveLink>,
}

impl BluerTransport {
    pub fn new(filter: DeviceFilter, scan_timeout: Duration) -> Self {
        Self {
            filter,
            scan_timeout,
            link: None,
        }
    }

    async fn open(&self) -> Result<(ActiveLink, Link), TransportError> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;

        info!("Scanning for sensing unit on {}", adapter.name());
        let address = tokio::time::timeout(self.scan_timeout, find_device(&adapter, &self.filter))
            .await
            .map_err(|_| TransportError::DeviceNotFound)??;

        let device = adapter.device(address)?;
        let connected_here = !device.is_connected().await?;
        if connected_here {
            info!("Connecting to {}", address);
            device.connect().await?;
        }

        let device_ref = &device;
        let (characteristic, pump, link) = cleanup_on_error(self.attach(&device).await, || async move {
            // Leave the device the way it was found.
            if connected_here && let Err(err) = device_ref.disconnect().await {
                warn!("Failed to disconnect {} after setup error: {}", address, err);
            }
        })
        .await?;

        info!("Connected to {} ({})", link.device_name, address);
        Ok((
            ActiveLink {
                _session: session,
                device,
                characteristic,
                pump,
            },
            link,
        ))
    }

    /// Resolve the characteristic on a connected device and start forwarding events.
    async fn attach(
        &self,
        device: &Device,
    ) -> Result<(Characteristic, JoinHandle<()>, Link), TransportError> {
        let device_name = device
            .name()
            .await?
            .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string());

        let characteristic = tokio::time::timeout(self.scan_timeout, find_characteristic(device))
            .await
            .map_err(|_| TransportError::Timeout("service discovery".to_string()))??;

        let notifications = characteristic.notify().await?;
        let device_events = device.events().await?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER_SIZE);
        let pump = tokio::spawn(pump_events(notifications, device_events, tx));

        Ok((
            characteristic,
            pump,
            Link {
                device_name,
                events: rx,
            },
        ))
    }
}

impl Transport for BluerTransport {
    fn connect(&mut self) -> TransportFuture<'_, Link> {
        Box::pin(async move {
            if self.link.is_some() {
                return Err(TransportError::AlreadyConnected);
            }
            let (active, link) = self.open().await?;
            self.link = Some(active);
            Ok(link)
        })
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let Some(active) = self.link.take() else {
                return Ok(());
            };
            active.pump.abort();
            if active.device.is_connected().await.unwrap_or(false) {
                active.device.disconnect().await?;
            }
            Ok(())
        })
    }

    fn send(&mut self, command: String) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            let active = self.link.as_ref().ok_or(TransportError::NotConnected)?;
            debug!("Writing command {:?}", command);
            active
                .characteristic
                .write(&encode_command(&command))
                .await?;
            Ok(())
        })
    }
}

/// Await `cleanup` when `result` is an error, then hand the result back unchanged.
async fn cleanup_on_error<T, F, Fut>(
    result: Result<T, TransportError>,
    cleanup: F,
) -> Result<T, TransportError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    if result.is_err() {
        cleanup().await;
    }
    result
}

/// Watch discovery events until a device passes the filter.
async fn find_device(adapter: &Adapter, filter: &DeviceFilter) -> Result<Address, TransportError> {
    let events = adapter.discover_devices().await?;
    pin_mut!(events);

    while let Some(event) = events.next().await {
        if let AdapterEvent::DeviceAdded(address) = event
            && device_matches(adapter, address, filter).await
        {
            return Ok(address);
        }
    }

    Err(TransportError::DeviceNotFound)
}

async fn device_matches(adapter: &Adapter, address: Address, filter: &DeviceFilter) -> bool {
    let Ok(device) = adapter.device(address) else {
        return false;
    };
    // Devices can vanish between discovery and the property read.
    let name = device.name().await.ok().flatten();
    let has_service = device
        .uuids()
        .await
        .ok()
        .flatten()
        .is_some_and(|uuids| uuids.contains(&SERVICE_UUID));
    filter.matches(address.into(), name.as_deref(), has_service)
}

async fn find_characteristic(device: &Device) -> Result<Characteristic, TransportError> {
    while !device.is_services_resolved().await? {
        tokio::time::sleep(SERVICE_RESOLVE_POLL).await;
    }

    for service in device.services().await? {
        if service.uuid().await? != SERVICE_UUID {
            continue;
        }
        for characteristic in service.characteristics().await? {
            if characteristic.uuid().await? == CHARACTERISTIC_UUID {
                return Ok(characteristic);
            }
        }
    }

    Err(TransportError::ServiceNotFound)
}

/// Forward notifications until the device disconnects, then report it once.
async fn pump_events(
    notifications: impl Stream<Item = Vec<u8>>,
    device_events: impl Stream<Item = DeviceEvent>,
    tx: mpsc::Sender<TransportEvent>,
) {
    pin_mut!(notifications);
    pin_mut!(device_events);

    loop {
        tokio::select! {
            value = notifications.next() => match value {
                Some(chunk) => {
                    if tx.send(TransportEvent::Data(chunk)).await.is_err() {
                        return;
                    }
                }
                None => break,
            },
            event = device_events.next() => match event {
                Some(DeviceEvent::PropertyChanged(DeviceProperty::Connected(false))) | None => break,
                Some(_) => {}
            },
        }
    }

    let _ = tx.send(TransportEvent::Disconnected).await;
}
