//! CPAL-based device enumeration
//!
//! cpal identifies devices by name, so the device name doubles as its id.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait};
use soundboard_core::domain::audio::{
    AudioEnumerator, AudioError, DeviceId, DeviceInfo, DeviceType, Result,
};
use tracing::{debug, info, instrument, warn};

/// CPAL-based audio enumerator
///
/// cpal hosts are not `Send` on every platform, so only the host id is kept
/// and the host is reopened on a blocking thread for each query.
#[derive(Debug, Clone, Copy)]
pub struct CpalEnumerator {
    host_id: cpal::HostId,
}

impl Default for CpalEnumerator {
    fn default() -> Self {
        info!("Initializing CPAL enumerator");
        Self::new()
    }
}

impl CpalEnumerator {
    pub fn new() -> Self {
        let host_id = cpal::default_host().id();
        debug!("Using audio host: {:?}", host_id);
        Self { host_id }
    }

    pub fn host_id(&self) -> cpal::HostId {
        self.host_id
    }

    fn host(&self) -> Result<cpal::Host> {
        cpal::host_from_id(self.host_id).map_err(|e| AudioError::OsError(e.to_string()))
    }

    fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
        let host = self.host()?;
        let cpal_devices = host
            .devices()
            .map_err(|e| AudioError::OsError(e.to_string()))?;

        let mut devices = Vec::new();
        for device in cpal_devices {
            let Some(device_type) = determine_device_type(&device) else {
                continue;
            };

            match device_name(&device) {
                Ok(name) => {
                    debug!(name = %name, ?device_type, "Found device");
                    devices.push(DeviceInfo::new(name.clone(), name, device_type));
                }
                Err(e) => warn!("Skipping device due to error: {}", e),
            }
        }

        info!("Found {} audio devices", devices.len());
        Ok(devices)
    }

    fn default_output(&self) -> Result<Option<DeviceId>> {
        let host = self.host()?;
        match host.default_output_device() {
            Some(device) => device_name(&device).map(|name| Some(DeviceId::new(name))),
            None => Ok(None),
        }
    }

    /// Open the cpal output device with the given id
    pub(crate) fn open_output(&self, id: &DeviceId) -> Result<cpal::Device> {
        let host = self.host()?;
        host.output_devices()
            .map_err(|e| AudioError::OsError(e.to_string()))?
            .find(|d| device_name(d).ok().as_deref() == Some(id.as_str()))
            .ok_or_else(|| AudioError::DeviceNotFound(id.to_string()))
    }
}

#[async_trait]
impl AudioEnumerator for CpalEnumerator {
    #[instrument(skip(self))]
    async fn devices(&self) -> Result<Vec<DeviceInfo>> {
        let this = *self;
        tokio::task::spawn_blocking(move || this.enumerate())
            .await
            .map_err(|e| AudioError::OsError(e.to_string()))?
    }

    async fn default_output_device(&self) -> Result<Option<DeviceId>> {
        let this = *self;
        tokio::task::spawn_blocking(move || this.default_output())
            .await
            .map_err(|e| AudioError::OsError(e.to_string()))?
    }
}

fn device_name(device: &cpal::Device) -> Result<String> {
    #[allow(deprecated)]
    device.name().map_err(|e| AudioError::OsError(e.to_string()))
}

/// Convert CPAL device capabilities to our domain type
fn determine_device_type(device: &cpal::Device) -> Option<DeviceType> {
    let has_input = device
        .supported_input_configs()
        .map(|mut c| c.next().is_some())
        .unwrap_or(false);
    let has_output = device
        .supported_output_configs()
        .map(|mut c| c.next().is_some())
        .unwrap_or(false);

    match (has_input, has_output) {
        (true, true) => Some(DeviceType::Duplex),
        (true, false) => Some(DeviceType::Input),
        (false, true) => Some(DeviceType::Output),
        (false, false) => None,
    }
}
