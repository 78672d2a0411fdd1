//! Process-wide runtime bracket, device detection, and the opaque session
//! handle.
//!
//! Every operation is only valid between [`initialize`] and [`shutdown`];
//! outside the bracket everything fails with `NotInitialized`. Handles
//! are cheap copies resolved through the session registry, so operations
//! on a destroyed handle fail with `InvalidHandle` instead of touching
//! freed state.

use crate::error::LastError;
use crate::frame::RenderBackend;
use crate::scan::{DeviceScanner, NullScanner};
use crate::session::{HmdDesc, Session};
use crate::time::{MonotonicClock, SimulatedClock, TimeSource};
use crate::types::{
    DistortionCaps, Eye, EyeRenderDesc, EyeTexture, FovPort, FrameTiming, HmdCaps, HmdType, Pose,
    RenderConfig, Rgb, SensorCaps, SensorState, Size2,
};
use crate::{HmdError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

static RUNTIME: Mutex<Option<Runtime>> = Mutex::new(None);
static GLOBAL_ERROR: LastError = LastError::new();

struct Runtime {
    scanner: Box<dyn DeviceScanner>,
    detected: Vec<HmdDesc>,
    sessions: HashMap<u64, Arc<Session>>,
    next_id: u64,
}

impl Runtime {
    fn new(scanner: Box<dyn DeviceScanner>) -> Self {
        Self {
            scanner,
            detected: Vec::new(),
            sessions: HashMap::new(),
            next_id: 1,
        }
    }
}

fn with_runtime<T>(f: impl FnOnce(&mut Runtime) -> Result<T>) -> Result<T> {
    let mut guard = match RUNTIME.lock() {
        Ok(g) => g,
        Err(e) => e.into_inner(),
    };
    match guard.as_mut() {
        Some(rt) => f(rt),
        None => {
            GLOBAL_ERROR.set(&HmdError::NotInitialized);
            Err(HmdError::NotInitialized)
        }
    }
}

fn resolve(id: u64) -> Result<Arc<Session>> {
    with_runtime(|rt| {
        rt.sessions.get(&id).cloned().ok_or_else(|| {
            GLOBAL_ERROR.set(&HmdError::InvalidHandle);
            HmdError::InvalidHandle
        })
    })
}

/// Initialize the process-wide runtime with the default (null) device
/// scanner. Must be balanced by [`shutdown`].
pub fn initialize() -> Result<()> {
    initialize_with(Box::new(NullScanner))
}

/// Initialize with a custom device scanner, e.g. a
/// [`FixedScanner`](crate::scan::FixedScanner) for simulated devices.
pub fn initialize_with(scanner: Box<dyn DeviceScanner>) -> Result<()> {
    let mut guard = match RUNTIME.lock() {
        Ok(g) => g,
        Err(e) => e.into_inner(),
    };
    if guard.is_some() {
        GLOBAL_ERROR.set(&HmdError::AlreadyInitialized);
        return Err(HmdError::AlreadyInitialized);
    }
    *guard = Some(Runtime::new(scanner));
    GLOBAL_ERROR.clear();
    log::info!("hmdcore {} initialized", version_string());
    Ok(())
}

/// Shut the runtime down, forcibly closing any sessions still bound.
/// Safe to call when not initialized.
pub fn shutdown() {
    let runtime = match RUNTIME.lock() {
        Ok(mut g) => g.take(),
        Err(e) => e.into_inner().take(),
    };
    if let Some(rt) = runtime {
        let open = rt.sessions.len();
        if open > 0 {
            log::warn!("shutdown with {} session(s) still bound", open);
        }
        for session in rt.sessions.values() {
            session.close();
        }
        log::info!("hmdcore shut down");
    }
}

/// Runtime library version.
pub fn version_string() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Last global error message, empty if none. Per-handle errors are
/// queried through [`Hmd::last_error`].
pub fn get_last_error() -> String {
    GLOBAL_ERROR.get()
}

/// Re-scan for connected devices and return the count. Idempotent; does
/// not bind anything. Index-to-device mappings may change between calls.
pub fn detect() -> Result<usize> {
    with_runtime(|rt| {
        rt.detected = rt.scanner.scan();
        log::debug!("detected {} device(s)", rt.detected.len());
        Ok(rt.detected.len())
    })
}

/// Bind a session to the device at `index` (0-based, bounded by the last
/// [`detect`] count). Each device index can be bound at most once.
pub fn create(index: usize) -> Result<Hmd> {
    with_runtime(|rt| {
        if index >= rt.detected.len() {
            let err = HmdError::IndexOutOfRange {
                index,
                detected: rt.detected.len(),
            };
            GLOBAL_ERROR.set(&err);
            return Err(err);
        }
        if rt
            .sessions
            .values()
            .any(|s| s.device_index == Some(index))
        {
            let err = HmdError::AlreadyBound(index);
            GLOBAL_ERROR.set(&err);
            return Err(err);
        }

        let desc = rt.detected[index].clone();
        let id = rt.next_id;
        rt.next_id += 1;
        let clock: Arc<dyn TimeSource> = Arc::new(MonotonicClock::new());
        let session = Session::new(id, Some(index), desc, clock, false);
        rt.sessions.insert(id, session);
        Ok(Hmd(id))
    })
}

/// Create a synthetic session for the requested device type, with no
/// hardware involved. Supports the full tracking and frame protocol with
/// simulated values and a virtual clock, so vsync waits do not sleep.
pub fn create_debug(hmd_type: HmdType) -> Result<Hmd> {
    with_runtime(|rt| {
        let id = rt.next_id;
        rt.next_id += 1;
        let clock: Arc<dyn TimeSource> = Arc::new(SimulatedClock::new());
        let session = Session::new(id, None, HmdDesc::for_type(hmd_type), clock, true);
        rt.sessions.insert(id, session);
        log::info!("debug session created for {:?}", hmd_type);
        Ok(Hmd(id))
    })
}

/// Opaque handle to a bound HMD session.
///
/// Copyable; all methods resolve through the runtime registry and fail
/// with `InvalidHandle` once the session is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hmd(u64);

impl Hmd {
    fn session(&self) -> Result<Arc<Session>> {
        resolve(self.0)
    }

    fn record<T>(session: &Session, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            session.last_error.set(err);
        }
        result
    }

    /// Destroy the session. The handle and all its copies become invalid.
    pub fn destroy(self) -> Result<()> {
        let session = with_runtime(|rt| {
            rt.sessions.remove(&self.0).ok_or_else(|| {
                GLOBAL_ERROR.set(&HmdError::InvalidHandle);
                HmdError::InvalidHandle
            })
        })?;
        session.close();
        Ok(())
    }

    /// Immutable display descriptor captured at session creation.
    pub fn desc(&self) -> Result<HmdDesc> {
        Ok(self.session()?.desc.clone())
    }

    /// Last error recorded against this handle, empty if none. For a
    /// destroyed or invalid handle this falls back to the global error.
    pub fn last_error(&self) -> String {
        match self.session() {
            Ok(session) => session.last_error.get(),
            Err(_) => GLOBAL_ERROR.get(),
        }
    }

    // -- Capability interface --

    /// Capability bits enabled right now; a subset of the writable mask.
    /// Distinct from the declared superset in the descriptor.
    pub fn enabled_caps(&self) -> Result<HmdCaps> {
        Ok(self.session()?.caps.enabled())
    }

    /// Toggle writable capability bits. Bits outside the writable mask
    /// are ignored. Returns the resulting enabled set.
    pub fn set_enabled_caps(&self, caps: HmdCaps) -> Result<HmdCaps> {
        Ok(self.session()?.caps.set_enabled(caps))
    }

    // -- Tracking interface (thread-safe) --

    /// Enable tracking. `supported` caps are best-effort and may come
    /// online later; `required` caps fail the call if unavailable.
    pub fn configure_tracking(&self, supported: SensorCaps, required: SensorCaps) -> Result<()> {
        let session = self.session()?;
        Self::record(&session, session.tracking.configure(supported, required))
    }

    /// Re-center the tracking origin on the current pose.
    pub fn reset_tracking(&self) -> Result<()> {
        let session = self.session()?;
        session.tracking.reset();
        Ok(())
    }

    /// Stop tracking and release sampling resources.
    pub fn stop_tracking(&self) -> Result<()> {
        let session = self.session()?;
        session.tracking.stop();
        Ok(())
    }

    /// Sensor state at an absolute time; 0.0 requests the most recent
    /// reading (predicted == recorded). Degraded tracking is reported in
    /// the status flags, never as an error.
    pub fn sensor_state(&self, abs_time: f64) -> Result<SensorState> {
        Ok(self.session()?.tracking.sample(abs_time))
    }

    /// Human-readable sensor description while tracking is configured.
    pub fn sensor_description(&self) -> Result<Option<String>> {
        Ok(self.session()?.tracking.description())
    }

    // -- Frame interface (render-thread affine) --

    /// Swap the render backend. Only valid before rendering is
    /// configured.
    pub fn set_render_backend(&self, backend: Box<dyn RenderBackend>) -> Result<()> {
        let session = self.session()?;
        let mut frame = lock_frame(&session)?;
        Self::record(&session, frame.set_backend(backend))
    }

    /// Configure rendering from a backend configuration and per-eye FOV.
    /// Passing `None` tears rendering down and returns `Ok(None)`.
    /// Re-entrant from the idle frame state.
    pub fn configure_rendering(
        &self,
        config: Option<&RenderConfig>,
        distortion_caps: DistortionCaps,
        eye_fov: [FovPort; 2],
    ) -> Result<Option<[EyeRenderDesc; 2]>> {
        let session = self.session()?;
        let mut frame = lock_frame(&session)?;
        Self::record(
            &session,
            frame.configure_rendering(config, distortion_caps, eye_fov),
        )
    }

    /// Open a frame; returns its timing record. Pass 0 if not tracking
    /// frame indices yourself.
    pub fn begin_frame(&self, frame_index: u64) -> Result<FrameTiming> {
        let session = self.session()?;
        let mut frame = lock_frame(&session)?;
        Self::record(&session, frame.begin_frame(frame_index))
    }

    /// Open an eye render; returns the pose predicted for that eye's
    /// scan-out time.
    pub fn begin_eye_render(&self, eye: Eye) -> Result<Pose> {
        let session = self.session()?;
        let mut frame = lock_frame(&session)?;
        Self::record(&session, frame.begin_eye_render(eye, &session.tracking))
    }

    /// Close an eye render, submitting its texture and render pose.
    pub fn end_eye_render(&self, eye: Eye, pose: Pose, texture: EyeTexture) -> Result<()> {
        let session = self.session()?;
        let mut frame = lock_frame(&session)?;
        Self::record(&session, frame.end_eye_render(eye, pose, texture))
    }

    /// Close the frame and present. Blocks on vsync unless the `NO_VSYNC`
    /// capability is enabled.
    pub fn end_frame(&self) -> Result<()> {
        let session = self.session()?;
        let no_vsync = session.caps.enabled().contains(HmdCaps::NO_VSYNC);
        let mut frame = lock_frame(&session)?;
        Self::record(&session, frame.end_frame(no_vsync))
    }

    /// Recommended texture size for one eye and FOV cone.
    pub fn fov_texture_size(
        &self,
        eye: Eye,
        fov: FovPort,
        pixels_per_display_pixel: f32,
    ) -> Result<Size2> {
        let session = self.session()?;
        Ok(session
            .desc
            .fov_texture_size(eye, fov, pixels_per_display_pixel))
    }

    // -- Latency probe (thread-safe) --

    /// Per-frame latency probe poll. `Ok(Some(color))` means this frame
    /// must be cleared to that color. Requires the `LATENCY_TEST`
    /// capability to be enabled to ever return a color.
    pub fn process_latency_test(&self) -> Result<Option<Rgb>> {
        let session = self.session()?;
        let enabled = session.caps.enabled().contains(HmdCaps::LATENCY_TEST);
        Ok(session.latency.process(enabled))
    }

    /// Blocking: waits for a measurement cycle to complete and returns
    /// its report. The frame loop must keep polling
    /// [`process_latency_test`](Self::process_latency_test) elsewhere.
    pub fn latency_test_result(&self) -> Result<String> {
        let session = self.session()?;
        let enabled = session.caps.enabled().contains(HmdCaps::LATENCY_TEST);
        Self::record(&session, session.latency.result(enabled))
    }

    /// Last measured latency in seconds, or -1.0 when unavailable. Never
    /// an error, including on invalid handles.
    pub fn measured_latency_seconds(&self) -> f64 {
        match self.session() {
            Ok(session) => {
                let enabled = session.caps.enabled().contains(HmdCaps::LATENCY_TEST);
                session.latency.measured_seconds(enabled)
            }
            Err(_) => -1.0,
        }
    }
}

fn lock_frame(session: &Session) -> Result<std::sync::MutexGuard<'_, crate::frame::FrameCoordinator>> {
    session
        .frame
        .lock()
        .map_err(|_| HmdError::ProtocolViolation("frame state poisoned by a panic"))
}
