//! Capability negotiation and the per-session display capability state.

use crate::types::{HmdCaps, SensorCaps};
use crate::{HmdError, Result};
use std::sync::Mutex;

/// Negotiate a sensor capability request against the device's declared set.
///
/// Required capabilities missing from `available` fail the whole request
/// atomically. Supported-but-unavailable bits are silently dropped; the
/// hardware may come online later and is then enabled opportunistically,
/// visible through the enabled-caps getter rather than a callback.
pub fn negotiate(
    supported: SensorCaps,
    required: SensorCaps,
    available: SensorCaps,
) -> Result<SensorCaps> {
    if !available.contains(required) {
        return Err(HmdError::UnsupportedRequired(required - available));
    }
    Ok((supported | required) & available)
}

/// Display capability bits for one session: the declared superset is
/// fixed at creation, the enabled subset is mutable within the writable
/// mask.
///
/// Invariant: `enabled ⊆ writable ⊆ declared` at all times.
pub struct CapState {
    declared: HmdCaps,
    writable: HmdCaps,
    enabled: Mutex<HmdCaps>,
}

impl CapState {
    pub fn new(declared: HmdCaps) -> Self {
        Self {
            declared,
            writable: declared & HmdCaps::WRITABLE_MASK,
            enabled: Mutex::new(HmdCaps::empty()),
        }
    }

    /// Capabilities the device declared available.
    pub fn declared(&self) -> HmdCaps {
        self.declared
    }

    pub fn writable(&self) -> HmdCaps {
        self.writable
    }

    /// Capabilities currently enabled.
    pub fn enabled(&self) -> HmdCaps {
        match self.enabled.lock() {
            Ok(cur) => *cur,
            Err(_) => HmdCaps::empty(),
        }
    }

    /// Set the enabled capability bits. Bits outside the writable mask are
    /// ignored, not errors; read-only flags such as `PRESENT` cannot be
    /// toggled. Returns the resulting enabled set.
    pub fn set_enabled(&self, requested: HmdCaps) -> HmdCaps {
        let next = requested & self.writable;
        if let Ok(mut cur) = self.enabled.lock() {
            *cur = next;
        }
        next
    }
}
