//! Global key hook
//!
//! rdev's listener runs on a dedicated thread for the life of the process and
//! cannot be unregistered. The [`KeyHook`] guard gates forwarding instead:
//! once it is dropped no further events reach the session.

use crate::input::keymap::key_code;
use crate::input::Result;
use rdev::{Event, EventType};
use soundboard_core::domain::hotkey::KeyEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

/// Keeps key presses flowing to a channel until dropped
pub struct KeyHook {
    active: Arc<AtomicBool>,
}

impl KeyHook {
    /// Register the global hook and forward key-down events to `events`
    pub fn start(events: mpsc::UnboundedSender<KeyEvent>) -> Result<Self> {
        let active = Arc::new(AtomicBool::new(true));
        let forwarding = active.clone();

        std::thread::Builder::new()
            .name("key hook".to_string())
            .spawn(move || {
                let mut callback = forwarder(events, forwarding);
                if let Err(e) = rdev::listen(move |event| callback(event)) {
                    error!("Global key hook failed: {:?}", e);
                }
            })?;

        info!("Global key hook registered");
        Ok(Self { active })
    }
}

impl Drop for KeyHook {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        debug!("Global key hook released");
    }
}

/// Build the per-event callback. Only key presses are forwarded.
fn forwarder(
    events: mpsc::UnboundedSender<KeyEvent>,
    active: Arc<AtomicBool>,
) -> impl FnMut(Event) {
    let mut events = Some(events);
    move |event: Event| {
        if !active.load(Ordering::SeqCst) {
            // drop the sender so the session sees the hook close
            events = None;
            return;
        }
        let EventType::KeyPress(key) = event.event_type else {
            return;
        };
        let Some(code) = key_code(key) else {
            trace!(?key, "Unmapped key");
            return;
        };
        let Some(sender) = &events else {
            return;
        };

        let raw_code = match key {
            rdev::Key::Unknown(raw) => raw,
            _ => code.value() as u32,
        };
        if sender.send(KeyEvent { code, raw_code }).is_err() {
            active.store(false, Ordering::SeqCst);
        }
    }
}
