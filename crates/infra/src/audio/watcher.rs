//! Device change notifications
//!
//! cpal has no hot-plug callback, so the watcher re-enumerates on an interval
//! and fires when the set of output devices changes.

use soundboard_core::domain::audio::{AudioEnumerator, DeviceInfo};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Polls an enumerator and broadcasts `()` whenever the output devices change.
///
/// Polling stops when the watcher is dropped.
pub struct DeviceWatcher {
    task: JoinHandle<()>,
    change_tx: broadcast::Sender<()>,
}

impl DeviceWatcher {
    /// Start watching. Must be called inside a tokio runtime.
    pub fn start(enumerator: Arc<dyn AudioEnumerator>, interval: Duration) -> Self {
        let (change_tx, _change_rx) = broadcast::channel(8);
        let tx = change_tx.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut known: Option<Vec<(String, String)>> = None;

            loop {
                ticker.tick().await;

                let devices = match enumerator.devices().await {
                    Ok(devices) => fingerprint(&devices),
                    Err(e) => {
                        debug!(error = %e, "Device poll failed");
                        continue;
                    }
                };

                match &known {
                    Some(previous) if previous != &devices => {
                        info!(devices = devices.len(), "Output devices changed");
                        if tx.send(()).is_err() {
                            debug!("No device change subscribers");
                        }
                    }
                    Some(_) => {}
                    None => debug!(devices = devices.len(), "Device baseline recorded"),
                }
                known = Some(devices);
            }
        });

        info!(interval_ms = interval.as_millis() as u64, "Device watcher started");
        Self { task, change_tx }
    }

    /// Subscribe to device change events
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.change_tx.subscribe()
    }
}

impl Drop for DeviceWatcher {
    fn drop(&mut self) {
        self.task.abort();
        if !self.task.is_finished() {
            debug!("Device watcher stopped");
        }
    }
}

/// Sorted (id, label) pairs of the output-capable devices
fn fingerprint(devices: &[DeviceInfo]) -> Vec<(String, String)> {
    let mut pairs: Vec<_> = devices
        .iter()
        .filter(|d| d.device_type.is_output())
        .map(|d| (d.id.to_string(), d.label.clone()))
        .collect();
    pairs.sort();
    pairs.dedup();
    pairs
}
