//! Device discovery seam.
//!
//! Hardware transports live behind [`DeviceScanner`]; the crate itself
//! ships a scanner that finds nothing (headless hosts) and a fixed-list
//! scanner for simulation and tests.

use crate::session::HmdDesc;
use crate::types::HmdType;

/// Enumerates attached head-mounted displays. `detect()` re-runs the scan
/// each time; index-to-device mappings may change between scans.
pub trait DeviceScanner: Send {
    fn scan(&mut self) -> Vec<HmdDesc>;
}

/// Default scanner: no hardware transport compiled in, nothing detected.
pub struct NullScanner;

impl DeviceScanner for NullScanner {
    fn scan(&mut self) -> Vec<HmdDesc> {
        Vec::new()
    }
}

/// Scanner over a preset descriptor list, for simulation and tests.
pub struct FixedScanner {
    descs: Vec<HmdDesc>,
}

impl FixedScanner {
    pub fn new<I: IntoIterator<Item = HmdType>>(types: I) -> Self {
        Self {
            descs: types.into_iter().map(HmdDesc::for_type).collect(),
        }
    }
}

impl DeviceScanner for FixedScanner {
    fn scan(&mut self) -> Vec<HmdDesc> {
        self.descs.clone()
    }
}
