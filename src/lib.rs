//! # hmdcore - HMD session and stereo frame runtime
//!
//! Session lifecycle, capability negotiation, sensor/pose tracking and
//! the per-frame render synchronization protocol for head-mounted
//! displays. Provides:
//! - Device detection and session creation, including hardware-free
//!   debug sessions for headless development
//! - Thread-safe pose sampling with second-order prediction
//! - The begin/end-frame and begin/end-eye-render protocol with frame
//!   timing records
//! - An optional latency measurement probe
//!
//! ## Quick Start
//! ```no_run
//! use hmdcore::{Eye, EyeTexture, HmdType, SensorCaps};
//!
//! hmdcore::initialize().unwrap();
//! let hmd = if hmdcore::detect().unwrap() > 0 {
//!     hmdcore::create(0).unwrap()
//! } else {
//!     hmdcore::create_debug(HmdType::Dk2).unwrap()
//! };
//!
//! hmd.configure_tracking(SensorCaps::ORIENTATION | SensorCaps::POSITION, SensorCaps::empty())
//!     .unwrap();
//! let state = hmd.sensor_state(0.0).unwrap();
//! println!("pose: {:?}", state.predicted.pose);
//!
//! hmd.destroy().unwrap();
//! hmdcore::shutdown();
//! ```
//!
//! Frame calls (`begin_frame` through `end_frame`) must stay on one
//! render thread per session; tracking and the latency probe are safe
//! from any thread.

pub mod caps;
pub mod error;
pub mod frame;
pub mod latency;
pub mod runtime;
pub mod scan;
pub mod session;
pub mod time;
pub mod tracking;
pub mod types;

pub use error::HmdError;
pub use frame::{HeadlessBackend, RenderBackend};
pub use runtime::{
    create, create_debug, detect, get_last_error, initialize, initialize_with, shutdown,
    version_string, Hmd,
};
pub use scan::{DeviceScanner, FixedScanner, NullScanner};
pub use session::HmdDesc;
pub use time::{now_seconds, wait_till_time, MonotonicClock, SimulatedClock, TimeSource};
pub use types::*;

/// Result type alias for hmdcore operations.
pub type Result<T> = std::result::Result<T, HmdError>;
