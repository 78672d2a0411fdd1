//! Frame coordination: the begin/end-frame and begin/end-eye-render
//! protocol, per-frame timing, and the render backend seam.
//!
//! All calls here are render-thread affine. The first frame call pins the
//! calling thread; debug builds assert that every later call arrives on
//! the same thread. Violations are caller bugs, not recoverable errors.

use crate::time::TimeSource;
use crate::tracking::Tracker;
use crate::types::{
    DistortionCaps, Eye, EyeRenderDesc, EyeTexture, FovPort, FrameTiming, Pose, Rect,
    RenderConfig, Size2, Vector2, Vector3,
};
use crate::{HmdError, Result};
use std::sync::Arc;
use std::thread::ThreadId;

/// Delta-time ceiling; prevents animation spikes after loading stalls.
const MAX_DELTA_SECONDS: f32 = 0.1;

/// Half the interpupillary distance, meters. Applied as the per-eye view
/// translation along x.
const HALF_IPD_M: f32 = 0.032;

/// Where inside the frame interval the timewarp IMU sample is taken,
/// as a fraction counted back from the next frame start.
const TIMEWARP_FRACTION: f64 = 0.2;

/// Backend collaborator that owns the actual graphics surface. The
/// coordinator routes configurations and submitted eye textures through
/// this seam without interpreting platform payloads.
pub trait RenderBackend: Send {
    /// Bind a surface for the given configuration. `configure_rendering`
    /// only succeeds if this returns true.
    fn bind(&mut self, config: &RenderConfig) -> bool;

    /// Present the submitted eye content. Called once per `end_frame`.
    fn present(&mut self, eyes: &[Option<EyeTexture>; 2]);

    /// Release the surface. Called on teardown and session close.
    fn unbind(&mut self);
}

/// Backend that accepts everything and draws nothing. Default for debug
/// sessions and headless hosts.
pub struct HeadlessBackend;

impl RenderBackend for HeadlessBackend {
    fn bind(&mut self, config: &RenderConfig) -> bool {
        log::debug!(
            "headless backend bound: api={:?} rt={}x{} msaa={}",
            config.api,
            config.rt_size.width,
            config.rt_size.height,
            config.multisample
        );
        true
    }

    fn present(&mut self, _eyes: &[Option<EyeTexture>; 2]) {}

    fn unbind(&mut self) {}
}

struct RenderSetup {
    eye_desc: [EyeRenderDesc; 2],
    #[allow(dead_code)]
    distortion_caps: DistortionCaps,
}

struct OpenFrame {
    timing: FrameTiming,
    eye_open: [bool; 2],
    submitted: [Option<EyeTexture>; 2],
    render_pose: [Option<Pose>; 2],
}

/// Per-session frame state machine: Idle -> FrameOpen -> Idle, with
/// independently opened eyes inside an open frame.
pub(crate) struct FrameCoordinator {
    clock: Arc<dyn TimeSource>,
    backend: Box<dyn RenderBackend>,
    frame_interval: f64,
    eye_render_order: [Eye; 2],
    render_thread: Option<ThreadId>,
    setup: Option<RenderSetup>,
    open: Option<OpenFrame>,
    /// Self-tracked index used when callers pass the 0 sentinel.
    next_frame_index: u64,
    last_frame_start: Option<f64>,
    /// Committed start of the next frame; `begin_frame` picks it up so
    /// that NextFrame(n) == ThisFrame(n + 1) exactly.
    next_frame_start: Option<f64>,
}

impl FrameCoordinator {
    pub fn new(desc: &crate::session::HmdDesc, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            clock,
            backend: Box::new(HeadlessBackend),
            frame_interval: 1.0 / desc.refresh_rate_hz,
            eye_render_order: desc.eye_render_order,
            render_thread: None,
            setup: None,
            open: None,
            next_frame_index: 1,
            last_frame_start: None,
            next_frame_start: None,
        }
    }

    /// Swap in a non-default backend. Must happen before rendering is
    /// configured.
    pub fn set_backend(&mut self, backend: Box<dyn RenderBackend>) -> Result<()> {
        if self.setup.is_some() {
            return Err(HmdError::ProtocolViolation(
                "backend swap while rendering is configured",
            ));
        }
        self.backend = backend;
        Ok(())
    }

    /// Configure (or reconfigure) rendering. `None` tears down rendering
    /// resources and returns `Ok(None)`. Valid only while no frame is
    /// open.
    pub fn configure_rendering(
        &mut self,
        config: Option<&RenderConfig>,
        distortion_caps: DistortionCaps,
        eye_fov: [FovPort; 2],
    ) -> Result<Option<[EyeRenderDesc; 2]>> {
        self.check_render_thread();
        if self.open.is_some() {
            return Err(HmdError::ProtocolViolation(
                "configure_rendering inside an open frame",
            ));
        }

        let config = match config {
            Some(config) => config,
            None => {
                if self.setup.take().is_some() {
                    self.backend.unbind();
                    log::info!("rendering torn down");
                }
                return Ok(None);
            }
        };

        if !self.backend.bind(config) {
            log::warn!("render backend refused configuration ({:?})", config.api);
            return Err(HmdError::Unsupported);
        }

        let eye_desc = compute_eye_descs(config.rt_size, eye_fov);
        self.setup = Some(RenderSetup {
            eye_desc,
            distortion_caps,
        });
        log::info!(
            "rendering configured: api={:?} rt={}x{} distortion={:?}",
            config.api,
            config.rt_size.width,
            config.rt_size.height,
            distortion_caps
        );
        Ok(Some(eye_desc))
    }

    /// Open a frame and return its timing record. `frame_index == 0`
    /// means the caller does not track indices; the coordinator counts
    /// for it.
    pub fn begin_frame(&mut self, frame_index: u64) -> Result<FrameTiming> {
        self.check_render_thread();
        if self.setup.is_none() {
            return Err(HmdError::ProtocolViolation(
                "begin_frame before configure_rendering",
            ));
        }
        if self.open.is_some() {
            return Err(HmdError::ProtocolViolation(
                "begin_frame while a frame is already open",
            ));
        }

        let index = if frame_index == 0 {
            self.next_frame_index
        } else {
            frame_index
        };
        self.next_frame_index = index + 1;

        let this_frame = self
            .next_frame_start
            .unwrap_or_else(|| self.clock.now());
        let next_frame = this_frame + self.frame_interval;
        let delta = match self.last_frame_start {
            Some(last) => ((this_frame - last) as f32).clamp(0.0, MAX_DELTA_SECONDS),
            None => self.frame_interval as f32,
        };

        // Scan-out runs across the following interval; the first eye in
        // render order reaches the panel before the midpoint, the second
        // after.
        let midpoint = next_frame + 0.5 * self.frame_interval;
        let mut eye_scanout = [0.0f64; 2];
        eye_scanout[self.eye_render_order[0].index()] = next_frame + 0.25 * self.frame_interval;
        eye_scanout[self.eye_render_order[1].index()] = next_frame + 0.75 * self.frame_interval;

        let timing = FrameTiming {
            delta_seconds: delta,
            this_frame_seconds: this_frame,
            timewarp_point_seconds: next_frame - TIMEWARP_FRACTION * self.frame_interval,
            next_frame_seconds: next_frame,
            scanout_midpoint_seconds: midpoint,
            eye_scanout_seconds: eye_scanout,
        };

        self.last_frame_start = Some(this_frame);
        self.next_frame_start = Some(next_frame);
        self.open = Some(OpenFrame {
            timing,
            eye_open: [false; 2],
            submitted: [None, None],
            render_pose: [None, None],
        });
        log::trace!("frame {} open at t={:.4}", index, this_frame);
        Ok(timing)
    }

    /// Open an eye render and return the pose predicted for that eye's
    /// scan-out time. Both eyes may be open at once; left and right may
    /// see slightly different predictions.
    pub fn begin_eye_render(&mut self, eye: Eye, tracker: &Tracker) -> Result<Pose> {
        self.check_render_thread();
        let open = self.open.as_mut().ok_or(HmdError::ProtocolViolation(
            "begin_eye_render outside an open frame",
        ))?;
        if open.eye_open[eye.index()] {
            return Err(HmdError::ProtocolViolation(
                "begin_eye_render for an eye that is already open",
            ));
        }
        open.eye_open[eye.index()] = true;

        let scanout = open.timing.eye_scanout_seconds[eye.index()];
        Ok(tracker.sample(scanout).predicted.pose)
    }

    /// Close an eye render and submit its content. The pose may be the
    /// one returned by `begin_eye_render` or a caller-substituted one,
    /// but it must be supplied. Content is displayed no later than the
    /// enclosing `end_frame`.
    pub fn end_eye_render(&mut self, eye: Eye, pose: Pose, texture: EyeTexture) -> Result<()> {
        self.check_render_thread();
        let open = self.open.as_mut().ok_or(HmdError::ProtocolViolation(
            "end_eye_render outside an open frame",
        ))?;
        if !open.eye_open[eye.index()] {
            return Err(HmdError::ProtocolViolation(
                "end_eye_render without a matching begin_eye_render",
            ));
        }
        open.eye_open[eye.index()] = false;
        open.submitted[eye.index()] = Some(texture);
        open.render_pose[eye.index()] = Some(pose);
        Ok(())
    }

    /// Close the frame and present. Blocks until the next frame start
    /// (vsync) unless `no_vsync` is set. Eyes left open are invalidated
    /// and surfaced as a protocol violation after the frame state is
    /// cleaned up, so the next frame starts fresh.
    pub fn end_frame(&mut self, no_vsync: bool) -> Result<()> {
        self.check_render_thread();
        let open = self.open.take().ok_or(HmdError::ProtocolViolation(
            "end_frame without begin_frame",
        ))?;

        self.backend.present(&open.submitted);
        if !no_vsync {
            self.clock.wait_until(open.timing.next_frame_seconds);
        }

        if open.eye_open.iter().any(|&o| o) {
            log::warn!("frame ended with an unclosed eye render");
            return Err(HmdError::ProtocolViolation(
                "frame ended with an unclosed eye render",
            ));
        }
        Ok(())
    }

    /// Computed eye descriptors from the last successful configuration.
    pub fn eye_render_descs(&self) -> Option<[EyeRenderDesc; 2]> {
        self.setup.as_ref().map(|s| s.eye_desc)
    }

    /// Drop any frame-scoped and render state; used on session close.
    pub fn teardown(&mut self) {
        self.open = None;
        if self.setup.take().is_some() {
            self.backend.unbind();
        }
    }

    fn check_render_thread(&mut self) {
        let current = std::thread::current().id();
        match self.render_thread {
            None => self.render_thread = Some(current),
            Some(pinned) => {
                debug_assert_eq!(
                    pinned, current,
                    "frame coordinator calls must stay on one render thread"
                );
            }
        }
    }
}

/// Per-eye viewport, pixel density, and view translation for a render
/// target split vertically between the eyes.
fn compute_eye_descs(rt_size: Size2, eye_fov: [FovPort; 2]) -> [EyeRenderDesc; 2] {
    let eye_width = rt_size.width / 2;
    Eye::BOTH.map(|eye| {
        let fov = eye_fov[eye.index()];
        let viewport = Rect::new(eye.index() as i32 * eye_width, 0, eye_width, rt_size.height);
        let view_adjust_x = match eye {
            Eye::Left => HALF_IPD_M,
            Eye::Right => -HALF_IPD_M,
        };
        EyeRenderDesc {
            eye,
            fov,
            distorted_viewport: viewport,
            pixels_per_tan_angle_at_center: Vector2::new(
                eye_width as f32 / (fov.left_tan + fov.right_tan),
                rt_size.height as f32 / (fov.up_tan + fov.down_tan),
            ),
            view_adjust: Vector3::new(view_adjust_x, 0.0, 0.0),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::HmdDesc;
    use crate::time::SimulatedClock;
    use crate::types::{HmdType, SensorCaps};

    fn debug_coordinator() -> (FrameCoordinator, Arc<SimulatedClock>, Tracker) {
        let desc = HmdDesc::for_type(HmdType::Dk2);
        let clock = Arc::new(SimulatedClock::new());
        let coordinator = FrameCoordinator::new(&desc, clock.clone());
        let tracker = Tracker::new(desc.sensor_caps, clock.clone(), true);
        (coordinator, clock, tracker)
    }

    fn configured() -> (FrameCoordinator, Arc<SimulatedClock>, Tracker) {
        let (mut fc, clock, tracker) = debug_coordinator();
        let config = RenderConfig {
            rt_size: Size2::new(1920, 1080),
            ..RenderConfig::default()
        };
        let desc = HmdDesc::for_type(HmdType::Dk2);
        fc.configure_rendering(
            Some(&config),
            DistortionCaps::TIME_WARP,
            desc.default_eye_fov,
        )
        .unwrap()
        .unwrap();
        (fc, clock, tracker)
    }

    #[test]
    fn begin_frame_requires_configuration() {
        let (mut fc, _clock, _tracker) = debug_coordinator();
        let err = fc.begin_frame(0).unwrap_err();
        assert!(matches!(err, HmdError::ProtocolViolation(_)));
    }

    #[test]
    fn double_begin_frame_is_a_protocol_violation() {
        let (mut fc, _clock, _tracker) = configured();
        fc.begin_frame(0).unwrap();
        let err = fc.begin_frame(0).unwrap_err();
        assert!(matches!(err, HmdError::ProtocolViolation(_)));
        // Still recoverable: the open frame can be closed normally.
        fc.end_frame(true).unwrap();
    }

    #[test]
    fn end_eye_without_begin_is_a_protocol_violation() {
        let (mut fc, _clock, _tracker) = configured();
        fc.begin_frame(0).unwrap();
        let err = fc
            .end_eye_render(Eye::Left, Pose::IDENTITY, EyeTexture::default())
            .unwrap_err();
        assert!(matches!(err, HmdError::ProtocolViolation(_)));
        fc.end_frame(true).unwrap();
    }

    #[test]
    fn double_open_same_eye_is_rejected() {
        let (mut fc, _clock, tracker) = configured();
        tracker
            .configure(SensorCaps::ORIENTATION, SensorCaps::empty())
            .unwrap();
        fc.begin_frame(0).unwrap();
        fc.begin_eye_render(Eye::Left, &tracker).unwrap();
        let err = fc.begin_eye_render(Eye::Left, &tracker).unwrap_err();
        assert!(matches!(err, HmdError::ProtocolViolation(_)));
        tracker.stop();
    }

    #[test]
    fn unclosed_eye_is_surfaced_at_end_frame_and_recoverable() {
        let (mut fc, _clock, tracker) = configured();
        fc.begin_frame(0).unwrap();
        fc.begin_eye_render(Eye::Right, &tracker).unwrap();
        let err = fc.end_frame(true).unwrap_err();
        assert!(matches!(err, HmdError::ProtocolViolation(_)));
        // Next frame starts clean.
        fc.begin_frame(0).unwrap();
        fc.end_frame(true).unwrap();
    }

    #[test]
    fn both_eyes_may_be_open_before_either_closes() {
        let (mut fc, _clock, tracker) = configured();
        fc.begin_frame(0).unwrap();
        let left = fc.begin_eye_render(Eye::Left, &tracker).unwrap();
        let _right = fc.begin_eye_render(Eye::Right, &tracker).unwrap();
        fc.end_eye_render(Eye::Right, left, EyeTexture::default())
            .unwrap();
        fc.end_eye_render(Eye::Left, left, EyeTexture::default())
            .unwrap();
        fc.end_frame(false).unwrap();
    }

    #[test]
    fn timing_ordering_holds_for_1000_frames() {
        let (mut fc, _clock, tracker) = configured();
        let mut prev_next: Option<f64> = None;

        for _ in 0..1000 {
            let t = fc.begin_frame(0).unwrap();
            assert!(t.this_frame_seconds <= t.timewarp_point_seconds);
            assert!(t.timewarp_point_seconds <= t.next_frame_seconds);
            let first = t.eye_scanout_seconds[Eye::Left.index()];
            let second = t.eye_scanout_seconds[Eye::Right.index()];
            assert!(t.next_frame_seconds <= first);
            assert!(first <= t.scanout_midpoint_seconds);
            assert!(t.scanout_midpoint_seconds <= second);
            if let Some(prev) = prev_next {
                assert_eq!(prev, t.this_frame_seconds);
            }
            assert!(t.delta_seconds <= 0.1);
            prev_next = Some(t.next_frame_seconds);

            let pose = fc.begin_eye_render(Eye::Left, &tracker).unwrap();
            fc.end_eye_render(Eye::Left, pose, EyeTexture::default())
                .unwrap();
            let pose = fc.begin_eye_render(Eye::Right, &tracker).unwrap();
            fc.end_eye_render(Eye::Right, pose, EyeTexture::default())
                .unwrap();
            fc.end_frame(false).unwrap();
        }
    }

    #[test]
    fn null_config_tears_down_rendering() {
        let (mut fc, _clock, _tracker) = configured();
        assert!(fc.eye_render_descs().is_some());
        let out = fc
            .configure_rendering(None, DistortionCaps::empty(), [FovPort::default(); 2])
            .unwrap();
        assert!(out.is_none());
        assert!(fc.eye_render_descs().is_none());
        // Frames cannot start without a configuration.
        assert!(fc.begin_frame(0).is_err());
    }

    #[test]
    fn eye_descs_split_the_render_target() {
        let descs = compute_eye_descs(Size2::new(1600, 1000), [FovPort::symmetric(1.0, 1.0); 2]);
        assert_eq!(descs[0].distorted_viewport, Rect::new(0, 0, 800, 1000));
        assert_eq!(descs[1].distorted_viewport, Rect::new(800, 0, 800, 1000));
        assert_eq!(descs[0].view_adjust.x, -descs[1].view_adjust.x);
        assert!((descs[0].pixels_per_tan_angle_at_center.x - 400.0).abs() < 1e-3);
    }

    #[test]
    fn eye_poses_track_their_scanout_times() {
        let (mut fc, clock, tracker) = configured();
        clock.advance(0.5);
        tracker
            .configure(
                SensorCaps::ORIENTATION | SensorCaps::POSITION,
                SensorCaps::empty(),
            )
            .unwrap();

        // Give the sampler a moment to publish a synthetic reading.
        std::thread::sleep(std::time::Duration::from_millis(30));
        clock.advance(0.1);

        fc.begin_frame(0).unwrap();
        let left = fc.begin_eye_render(Eye::Left, &tracker).unwrap();
        let right = fc.begin_eye_render(Eye::Right, &tracker).unwrap();
        // Different scan-out targets give (slightly) different predictions.
        assert_ne!(left, right);
        fc.end_eye_render(Eye::Left, left, EyeTexture::default())
            .unwrap();
        fc.end_eye_render(Eye::Right, right, EyeTexture::default())
            .unwrap();
        fc.end_frame(true).unwrap();
        tracker.stop();
    }
}
