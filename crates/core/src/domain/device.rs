//! Device resolution for the two output slots
//!
//! Every sound is played twice: once through slot 1 (usually the speakers or
//! headphones) and once through slot 2 (usually a virtual cable feeding voice
//! chat or streaming software). This module keeps the canonical map of output
//! endpoints and decides which device backs each slot.

use crate::domain::audio::{AudioEnumerator, DeviceId, DeviceInfo, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// Label fragment identifying a VB-Audio style virtual cable input
pub const VIRTUAL_CABLE_LABEL: &str = "CABLE Input";

/// One of the two output destinations every track is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputSlot {
    Slot1,
    Slot2,
}

impl OutputSlot {
    pub const ALL: [OutputSlot; 2] = [OutputSlot::Slot1, OutputSlot::Slot2];

    /// 1-based slot number, as shown to users
    pub fn number(&self) -> u8 {
        match self {
            OutputSlot::Slot1 => 1,
            OutputSlot::Slot2 => 2,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(OutputSlot::Slot1),
            2 => Some(OutputSlot::Slot2),
            _ => None,
        }
    }
}

impl fmt::Display for OutputSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output {}", self.number())
    }
}

/// Output-capable devices keyed by id, in enumeration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMap {
    devices: IndexMap<DeviceId, DeviceInfo>,
    default_device: Option<DeviceId>,
}

impl DeviceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from raw endpoints.
    ///
    /// Non-output endpoints are dropped. Duplicate ids collapse onto the
    /// first occurrence, which keeps its position.
    pub fn from_devices<I>(devices: I, default_device: Option<DeviceId>) -> Self
    where
        I: IntoIterator<Item = DeviceInfo>,
    {
        let mut map = IndexMap::new();
        for device in devices {
            if !device.device_type.is_output() {
                continue;
            }
            map.entry(device.id.clone()).or_insert(device);
        }

        Self {
            devices: map,
            default_device,
        }
    }

    pub fn get(&self, id: &DeviceId) -> Option<&DeviceInfo> {
        self.devices.get(id)
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceInfo> {
        self.devices.values()
    }

    /// The OS default output, if it is part of this map
    pub fn default_device(&self) -> Option<&DeviceId> {
        self.default_device
            .as_ref()
            .filter(|id| self.devices.contains_key(*id))
    }

    /// First device whose label marks it as a virtual cable input
    fn virtual_cable(&self, exclude: Option<&DeviceId>) -> Option<&DeviceId> {
        self.devices
            .values()
            .find(|d| d.label.contains(VIRTUAL_CABLE_LABEL) && Some(&d.id) != exclude)
            .map(|d| &d.id)
    }

    fn first_other_than(&self, exclude: Option<&DeviceId>) -> Option<&DeviceId> {
        self.devices.keys().find(|id| Some(*id) != exclude)
    }
}

/// Which device backs each output slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputAssignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot1: Option<DeviceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot2: Option<DeviceId>,
}

impl OutputAssignment {
    pub fn new(slot1: Option<DeviceId>, slot2: Option<DeviceId>) -> Self {
        Self { slot1, slot2 }
    }

    pub fn get(&self, slot: OutputSlot) -> Option<&DeviceId> {
        match slot {
            OutputSlot::Slot1 => self.slot1.as_ref(),
            OutputSlot::Slot2 => self.slot2.as_ref(),
        }
    }

    pub fn set(&mut self, slot: OutputSlot, device: Option<DeviceId>) {
        match slot {
            OutputSlot::Slot1 => self.slot1 = device,
            OutputSlot::Slot2 => self.slot2 = device,
        }
    }

    /// Both slots reference a device
    pub fn is_resolved(&self) -> bool {
        self.slot1.is_some() && self.slot2.is_some()
    }
}

/// Enumerate output-capable devices, keyed by id
///
/// Enumeration failures propagate untouched; callers keep their previous map.
/// Failing to look up the OS default is tolerated and only loses the default
/// designation.
#[instrument(skip(enumerator))]
pub async fn list_output_devices(enumerator: &dyn AudioEnumerator) -> Result<DeviceMap> {
    let devices = enumerator.devices().await?;

    let default_device = match enumerator.default_output_device().await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "Could not query default output device");
            None
        }
    };

    let map = DeviceMap::from_devices(devices, default_device);
    debug!(count = map.len(), "Listed output devices");
    Ok(map)
}

/// Resolve a best-effort assignment for both slots.
///
/// A previously assigned device that is still present is always kept, so an
/// unchanged device set resolves to the same assignment. Otherwise slot 1
/// falls back to the OS default, then the first device; slot 2 falls back to
/// a virtual cable input, then the first device other than slot 1's. With a
/// single device both slots share it.
pub fn resolve_defaults(map: &DeviceMap, previous: &OutputAssignment) -> OutputAssignment {
    let still_present = |slot: Option<&DeviceId>| slot.filter(|id| map.contains(id)).cloned();

    let slot1 = still_present(previous.slot1.as_ref()).or_else(|| {
        map.default_device()
            .or_else(|| map.first_other_than(None))
            .cloned()
    });

    let slot2 = still_present(previous.slot2.as_ref()).or_else(|| {
        map.virtual_cable(slot1.as_ref())
            .or_else(|| map.first_other_than(slot1.as_ref()))
            .or(slot1.as_ref())
            .cloned()
    });

    let resolved = OutputAssignment { slot1, slot2 };
    if &resolved != previous {
        info!(
            slot1 = ?resolved.slot1.as_ref().map(DeviceId::as_str),
            slot2 = ?resolved.slot2.as_ref().map(DeviceId::as_str),
            "Resolved output assignment"
        );
    }
    resolved
}
