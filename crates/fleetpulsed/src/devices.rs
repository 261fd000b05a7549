//! `device` subcommands — registry writes against the shared store file.

use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use fleetpulse_state::{Device, DeviceStatus, StateResult};

use crate::registry::SharedStore;

/// Fields accepted by `device add`.
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub id: String,
    pub name: Option<String>,
    pub ip: IpAddr,
    pub port: u16,
    pub owner_id: u64,
}

/// Register a device, or update the address of an existing one.
///
/// Re-adding keeps the current status and registration time; only a
/// check cycle changes status.
pub async fn add_device(shared: &SharedStore, new: NewDevice) -> StateResult<Device> {
    let device = shared
        .with_store(|store| {
            let existing = store.get_device(&new.id)?;
            let device = Device {
                name: new.name.clone().unwrap_or_else(|| new.id.clone()),
                ip: new.ip.to_string(),
                port: new.port,
                owner_id: new.owner_id,
                status: existing
                    .as_ref()
                    .map(|d| d.status)
                    .unwrap_or(DeviceStatus::Offline),
                created_at: existing
                    .as_ref()
                    .map(|d| d.created_at)
                    .unwrap_or_else(epoch_secs),
                id: new.id.clone(),
            };
            store.put_device(&device)?;
            Ok(device)
        })
        .await?;
    info!(device_id = %device.id, address = %device.address(), "device registered");
    Ok(device)
}

/// Remove a device. Its check history is kept.
pub async fn remove_device(shared: &SharedStore, device_id: &str) -> StateResult<bool> {
    let existed = shared
        .with_store(|store| store.delete_device(device_id))
        .await?;
    if existed {
        info!(%device_id, "device removed");
    }
    Ok(existed)
}

pub async fn list_devices(shared: &SharedStore) -> StateResult<Vec<Device>> {
    shared.with_store(|store| store.list_devices()).await
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
