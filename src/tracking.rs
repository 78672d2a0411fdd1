//! Sensor state sampling and pose prediction.
//!
//! Every operation here is safe to call from any thread; the shared
//! sensor history sits behind a reader/writer lock with a single writer
//! (the sampler thread) and any number of concurrent readers, so
//! `sample` stays cheap for physics threads decoupled from rendering.

use crate::caps;
use crate::time::TimeSource;
use crate::types::{Pose, PoseState, Quaternion, SensorCaps, SensorState, StatusFlags, Vector3};
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

const SAMPLE_INTERVAL: Duration = Duration::from_millis(5);
const DEFAULT_TEMPERATURE_C: f32 = 24.5;

/// Rolling sensor state shared between the sampler thread and readers.
#[derive(Debug, Clone, Copy)]
struct TrackerShared {
    enabled: SensorCaps,
    running: bool,
    latest: PoseState,
    status: StatusFlags,
    temperature: f32,
    /// Phase origin for the synthetic motion model; moved by `reset`.
    reset_time: f64,
}

struct Sampler {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// Tracking subsystem for one session.
pub(crate) struct Tracker {
    shared: Arc<RwLock<TrackerShared>>,
    sampler: Mutex<Option<Sampler>>,
    clock: Arc<dyn TimeSource>,
    declared: SensorCaps,
    synthetic: bool,
}

impl Tracker {
    pub fn new(declared: SensorCaps, clock: Arc<dyn TimeSource>, synthetic: bool) -> Self {
        Self {
            shared: Arc::new(RwLock::new(TrackerShared {
                enabled: SensorCaps::empty(),
                running: false,
                latest: PoseState::default(),
                status: StatusFlags::empty(),
                temperature: DEFAULT_TEMPERATURE_C,
                reset_time: 0.0,
            })),
            sampler: Mutex::new(None),
            clock,
            declared,
            synthetic,
        }
    }

    /// Enable tracking with the given capability request. This is the sole
    /// entry point for starting sensor sampling; there is no separate
    /// start call. Re-entrant: a second call renegotiates capabilities on
    /// the already-running sampler.
    pub fn configure(&self, supported: SensorCaps, required: SensorCaps) -> Result<()> {
        let enabled = caps::negotiate(supported, required, self.declared)?;

        let needs_sampler = {
            let mut shared = match self.shared.write() {
                Ok(s) => s,
                Err(e) => e.into_inner(),
            };
            shared.enabled = enabled;
            shared.status = status_for(enabled);
            let was_running = shared.running;
            shared.running = true;
            if !was_running {
                shared.reset_time = self.clock.now();
                shared.latest = PoseState {
                    time_s: self.clock.now(),
                    ..PoseState::default()
                };
            }
            !was_running
        };

        if needs_sampler {
            self.spawn_sampler()?;
        }

        log::info!("tracking configured: enabled={:?}", enabled);
        Ok(())
    }

    /// Re-center the pose: the current orientation and position become the
    /// new origin.
    pub fn reset(&self) {
        let mut shared = match self.shared.write() {
            Ok(s) => s,
            Err(e) => e.into_inner(),
        };
        let now = self.clock.now();
        shared.reset_time = now;
        shared.latest = PoseState {
            time_s: now,
            ..PoseState::default()
        };
        log::debug!("tracking reset at t={:.3}", now);
    }

    /// Stop sampling and release sampler resources. Later `sample` calls
    /// report a disconnected state instead of stale data.
    pub fn stop(&self) {
        let sampler = match self.sampler.lock() {
            Ok(mut slot) => slot.take(),
            Err(e) => e.into_inner().take(),
        };
        if let Some(mut sampler) = sampler {
            sampler.stop.store(true, Ordering::Relaxed);
            if let Some(thread) = sampler.thread.take() {
                let _ = thread.join();
            }
        }

        let mut shared = match self.shared.write() {
            Ok(s) => s,
            Err(e) => e.into_inner(),
        };
        if shared.running {
            log::info!("tracking stopped");
        }
        shared.running = false;
        shared.enabled = SensorCaps::empty();
        shared.status = StatusFlags::empty();
    }

    /// Sensor state at the requested absolute time.
    ///
    /// `abs_time == 0.0` is the sentinel for "most recent reading": both
    /// fields hold the same recorded sample. A positive time extrapolates
    /// the recorded sample with second-order kinematics; the extrapolation
    /// distance is unbounded, callers are expected to request near-future
    /// times only.
    pub fn sample(&self, abs_time: f64) -> SensorState {
        let shared = match self.shared.read() {
            Ok(s) => *s,
            Err(e) => *e.into_inner(),
        };

        if !shared.running {
            // Flagged disconnected rather than stale data.
            return SensorState {
                predicted: PoseState::default(),
                recorded: PoseState::default(),
                temperature: shared.temperature,
                status: StatusFlags::empty(),
            };
        }

        let recorded = shared.latest;
        let predicted = if abs_time == 0.0 {
            recorded
        } else {
            predict(&recorded, abs_time - recorded.time_s)
        };

        SensorState {
            predicted,
            recorded,
            temperature: shared.temperature,
            status: shared.status,
        }
    }

    /// Human-readable sensor description, available while tracking runs.
    pub fn description(&self) -> Option<String> {
        let shared = match self.shared.read() {
            Ok(s) => *s,
            Err(e) => *e.into_inner(),
        };
        if !shared.running {
            return None;
        }
        let source = if self.synthetic {
            "synthetic 9-axis IMU"
        } else {
            "9-axis IMU"
        };
        let mut parts = Vec::new();
        if shared.enabled.contains(SensorCaps::ORIENTATION) {
            parts.push("orientation");
        }
        if shared.enabled.contains(SensorCaps::YAW_CORRECTION) {
            parts.push("yaw correction");
        }
        if shared.enabled.contains(SensorCaps::POSITION) {
            parts.push("position");
        }
        Some(format!("{} ({})", source, parts.join(", ")))
    }

    fn spawn_sampler(&self) -> Result<()> {
        let stop = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(&self.shared);
        let clock = Arc::clone(&self.clock);
        let stop_clone = Arc::clone(&stop);
        let synthetic = self.synthetic;

        let thread = std::thread::Builder::new()
            .name("hmd-sampler".into())
            .spawn(move || {
                sampler_loop(shared, clock, stop_clone, synthetic);
            })
            .map_err(|e| {
                log::warn!("failed to spawn sampler thread: {}", e);
                crate::HmdError::Disconnected
            })?;

        if let Ok(mut slot) = self.sampler.lock() {
            *slot = Some(Sampler {
                stop,
                thread: Some(thread),
            });
        }
        Ok(())
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Single-writer sampler loop. Real transports would push hardware
/// readings here; without one we synthesize smooth head motion so the
/// downstream prediction and rendering paths behave like the real thing.
fn sampler_loop(
    shared: Arc<RwLock<TrackerShared>>,
    clock: Arc<dyn TimeSource>,
    stop: Arc<AtomicBool>,
    synthetic: bool,
) {
    log::info!("sampler thread started");
    loop {
        if stop.load(Ordering::Relaxed) {
            log::info!("sampler thread stopping (stop flag set)");
            break;
        }

        let now = clock.now();
        let mut guard = match shared.write() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        };
        let phase = now - guard.reset_time;
        guard.latest = if synthetic {
            synthetic_reading(phase, now, guard.enabled)
        } else {
            // Hardware transport is out of scope; hold the last reading
            // with a fresh timestamp so prediction deltas stay small.
            PoseState {
                time_s: now,
                ..guard.latest
            }
        };
        drop(guard);

        std::thread::sleep(SAMPLE_INTERVAL);
    }
}

/// Smooth sinusoidal head motion used by debug sessions.
fn synthetic_reading(phase: f64, now: f64, enabled: SensorCaps) -> PoseState {
    let yaw_amp = 0.15f64;
    let yaw_rate = 0.8f64;
    let sway_amp = 0.05f64;
    let sway_rate = 0.5f64;

    let yaw = yaw_amp * (yaw_rate * phase).sin();
    let yaw_vel = yaw_amp * yaw_rate * (yaw_rate * phase).cos();
    let yaw_acc = -yaw_amp * yaw_rate * yaw_rate * (yaw_rate * phase).sin();

    let orientation = if enabled.contains(SensorCaps::ORIENTATION) {
        let half = (yaw / 2.0) as f32;
        Quaternion::new(0.0, half.sin(), 0.0, half.cos())
    } else {
        Quaternion::IDENTITY
    };

    let (position, linear_velocity, linear_acceleration) =
        if enabled.contains(SensorCaps::POSITION) {
            let x = sway_amp * (sway_rate * phase).sin();
            let vx = sway_amp * sway_rate * (sway_rate * phase).cos();
            let ax = -sway_amp * sway_rate * sway_rate * (sway_rate * phase).sin();
            (
                Vector3::new(x as f32, 0.0, 0.0),
                Vector3::new(vx as f32, 0.0, 0.0),
                Vector3::new(ax as f32, 0.0, 0.0),
            )
        } else {
            (Vector3::ZERO, Vector3::ZERO, Vector3::ZERO)
        };

    PoseState {
        pose: Pose {
            orientation,
            position,
        },
        angular_velocity: Vector3::new(0.0, yaw_vel as f32, 0.0),
        linear_velocity,
        angular_acceleration: Vector3::new(0.0, yaw_acc as f32, 0.0),
        linear_acceleration,
        time_s: now,
    }
}

fn status_for(enabled: SensorCaps) -> StatusFlags {
    let mut status = StatusFlags::HMD_CONNECTED;
    if enabled.contains(SensorCaps::ORIENTATION) {
        status |= StatusFlags::ORIENTATION_TRACKED;
    }
    if enabled.contains(SensorCaps::POSITION) {
        status |= StatusFlags::POSITION_CONNECTED | StatusFlags::POSITION_TRACKED;
    }
    status
}

/// Second-order kinematic extrapolation of a recorded reading by `dt`
/// seconds: constant velocity plus half the acceleration term, and
/// first-order quaternion integration of the angular rate.
pub(crate) fn predict(recorded: &PoseState, dt: f64) -> PoseState {
    let dtf = dt as f32;
    let half_dt2 = 0.5 * dtf * dtf;

    let p = recorded.pose.position;
    let v = recorded.linear_velocity;
    let a = recorded.linear_acceleration;
    let position = Vector3::new(
        p.x + v.x * dtf + a.x * half_dt2,
        p.y + v.y * dtf + a.y * half_dt2,
        p.z + v.z * dtf + a.z * half_dt2,
    );

    let w = recorded.angular_velocity;
    let alpha = recorded.angular_acceleration;
    // Effective rate over the interval includes half the angular
    // acceleration, mirroring the positional term.
    let rate = Vector3::new(
        w.x + 0.5 * alpha.x * dtf,
        w.y + 0.5 * alpha.y * dtf,
        w.z + 0.5 * alpha.z * dtf,
    );
    let orientation = integrate_rotation(recorded.pose.orientation, rate, dtf);

    PoseState {
        pose: Pose {
            orientation,
            position,
        },
        angular_velocity: Vector3::new(w.x + alpha.x * dtf, w.y + alpha.y * dtf, w.z + alpha.z * dtf),
        linear_velocity: Vector3::new(v.x + a.x * dtf, v.y + a.y * dtf, v.z + a.z * dtf),
        angular_acceleration: alpha,
        linear_acceleration: a,
        time_s: recorded.time_s + dt,
    }
}

/// Rotate `q` by the axis-angle given by an angular rate applied for `dt`.
fn integrate_rotation(q: Quaternion, rate: Vector3, dt: f32) -> Quaternion {
    let mag = (rate.x * rate.x + rate.y * rate.y + rate.z * rate.z).sqrt();
    if mag * dt.abs() < 1e-9 {
        return q;
    }
    let (ax, ay, az) = (rate.x / mag, rate.y / mag, rate.z / mag);
    let half = 0.5 * mag * dt;
    let (s, c) = half.sin_cos();
    let r = Quaternion::new(ax * s, ay * s, az * s, c);
    normalize(mul(r, q))
}

fn mul(a: Quaternion, b: Quaternion) -> Quaternion {
    Quaternion::new(
        a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
        a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
        a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
        a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
    )
}

fn normalize(q: Quaternion) -> Quaternion {
    let mag = (q.x * q.x + q.y * q.y + q.z * q.z + q.w * q.w).sqrt();
    if mag < 1e-12 {
        return Quaternion::IDENTITY;
    }
    Quaternion::new(q.x / mag, q.y / mag, q.z / mag, q.w / mag)
}
