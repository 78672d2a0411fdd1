//! Display descriptors and the per-session state bundle.

use crate::caps::CapState;
use crate::error::LastError;
use crate::frame::FrameCoordinator;
use crate::latency::LatencyProbe;
use crate::time::TimeSource;
use crate::tracking::Tracker;
use crate::types::{
    DistortionCaps, Eye, FovPort, HmdCaps, HmdType, Point2, SensorCaps, Size2,
};
use std::sync::{Arc, Mutex};

/// Immutable snapshot of a device taken at session creation.
#[derive(Debug, Clone, PartialEq)]
pub struct HmdDesc {
    pub hmd_type: HmdType,
    pub product_name: String,
    pub manufacturer: String,
    /// Declared capability supersets; what can be enabled, not what is.
    pub display_caps: HmdCaps,
    pub sensor_caps: SensorCaps,
    pub distortion_caps: DistortionCaps,
    /// Full screen resolution across both eyes.
    pub resolution: Size2,
    pub window_pos: Point2,
    pub default_eye_fov: [FovPort; 2],
    pub max_eye_fov: [FovPort; 2],
    /// Preferred eye render order; rendering the first eye first reduces
    /// perceived latency on sideways-scanned panels.
    pub eye_render_order: [Eye; 2],
    pub display_device_name: String,
    pub display_id: i32,
    pub refresh_rate_hz: f64,
}

impl HmdDesc {
    /// Descriptor defaults for a known device model.
    pub fn for_type(hmd_type: HmdType) -> Self {
        let base_display_caps = HmdCaps::PRESENT | HmdCaps::AVAILABLE | HmdCaps::LOW_PERSISTENCE;
        match hmd_type {
            HmdType::Dk1 => Self {
                hmd_type,
                product_name: "Rift DK1".into(),
                manufacturer: "Oculus VR".into(),
                display_caps: base_display_caps | HmdCaps::LATENCY_TEST | HmdCaps::NO_VSYNC,
                sensor_caps: SensorCaps::ORIENTATION | SensorCaps::YAW_CORRECTION,
                distortion_caps: DistortionCaps::CHROMATIC | DistortionCaps::VIGNETTE,
                resolution: Size2::new(1280, 800),
                window_pos: Point2::default(),
                default_eye_fov: [FovPort::symmetric(1.0, 1.1); 2],
                max_eye_fov: [FovPort::symmetric(1.2, 1.3); 2],
                eye_render_order: [Eye::Left, Eye::Right],
                display_device_name: String::new(),
                display_id: 0,
                refresh_rate_hz: 60.0,
            },
            HmdType::Dk2 => Self {
                hmd_type,
                product_name: "Rift DK2".into(),
                manufacturer: "Oculus VR".into(),
                display_caps: base_display_caps
                    | HmdCaps::LATENCY_TEST
                    | HmdCaps::DYNAMIC_PREDICTION
                    | HmdCaps::NO_VSYNC,
                sensor_caps: SensorCaps::ORIENTATION
                    | SensorCaps::YAW_CORRECTION
                    | SensorCaps::POSITION,
                distortion_caps: DistortionCaps::CHROMATIC
                    | DistortionCaps::TIME_WARP
                    | DistortionCaps::VIGNETTE,
                resolution: Size2::new(1920, 1080),
                window_pos: Point2::default(),
                default_eye_fov: [FovPort::symmetric(1.1, 1.2); 2],
                max_eye_fov: [FovPort::symmetric(1.3, 1.4); 2],
                eye_render_order: [Eye::Left, Eye::Right],
                display_device_name: String::new(),
                display_id: 0,
                refresh_rate_hz: 75.0,
            },
            HmdType::Dkhd => Self {
                hmd_type,
                product_name: "Rift DK HD".into(),
                resolution: Size2::new(1920, 1080),
                ..Self::for_type(HmdType::Dk1)
            },
            HmdType::None | HmdType::Other => Self {
                hmd_type,
                product_name: "Generic HMD".into(),
                manufacturer: String::new(),
                display_caps: base_display_caps,
                sensor_caps: SensorCaps::ORIENTATION,
                distortion_caps: DistortionCaps::empty(),
                resolution: Size2::new(1280, 800),
                window_pos: Point2::default(),
                default_eye_fov: [FovPort::symmetric(1.0, 1.0); 2],
                max_eye_fov: [FovPort::symmetric(1.0, 1.0); 2],
                eye_render_order: [Eye::Left, Eye::Right],
                display_device_name: String::new(),
                display_id: 0,
                refresh_rate_hz: 60.0,
            },
        }
    }

    /// Recommended render-target size for one eye and FOV cone. Larger
    /// FOVs need larger textures to hold pixel density at the center;
    /// `pixels_per_display_pixel` below 1.0 trades quality for speed.
    pub fn fov_texture_size(
        &self,
        eye: Eye,
        fov: FovPort,
        pixels_per_display_pixel: f32,
    ) -> Size2 {
        let default = self.default_eye_fov[eye.index()];
        let eye_width = self.resolution.width as f32 / 2.0;
        let ppt_x = eye_width / (default.left_tan + default.right_tan);
        let ppt_y = self.resolution.height as f32 / (default.up_tan + default.down_tan);
        let scale = pixels_per_display_pixel.max(0.0);
        Size2::new(
            (ppt_x * (fov.left_tan + fov.right_tan) * scale).ceil() as i32,
            (ppt_y * (fov.up_tan + fov.down_tan) * scale).ceil() as i32,
        )
    }
}

/// Everything owned by one bound session. Dropped when the handle is
/// destroyed or the runtime shuts down.
pub(crate) struct Session {
    pub id: u64,
    /// Physical device index for real sessions, `None` for debug sessions.
    pub device_index: Option<usize>,
    pub desc: HmdDesc,
    pub caps: CapState,
    pub tracking: Tracker,
    pub frame: Mutex<FrameCoordinator>,
    pub latency: LatencyProbe,
    pub last_error: LastError,
    pub clock: Arc<dyn TimeSource>,
}

impl Session {
    pub fn new(
        id: u64,
        device_index: Option<usize>,
        desc: HmdDesc,
        clock: Arc<dyn TimeSource>,
        synthetic: bool,
    ) -> Arc<Self> {
        let caps = CapState::new(desc.display_caps);
        let tracking = Tracker::new(desc.sensor_caps, Arc::clone(&clock), synthetic);
        let frame = Mutex::new(FrameCoordinator::new(&desc, Arc::clone(&clock)));
        let latency = LatencyProbe::new(Arc::clone(&clock));

        log::info!(
            "session {} bound: {} ({:?}), {}x{} @ {} Hz",
            id,
            desc.product_name,
            desc.hmd_type,
            desc.resolution.width,
            desc.resolution.height,
            desc.refresh_rate_hz
        );

        Arc::new(Self {
            id,
            device_index,
            desc,
            caps,
            tracking,
            frame,
            latency,
            last_error: LastError::new(),
            clock,
        })
    }

    /// Release session-owned resources. Safe to call once; the handle
    /// registry guarantees no further calls arrive afterwards.
    pub fn close(&self) {
        self.tracking.stop();
        if let Ok(mut frame) = self.frame.lock() {
            frame.teardown();
        }
        log::info!("session {} closed", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dk2_descriptor_declares_positional_tracking() {
        let desc = HmdDesc::for_type(HmdType::Dk2);
        assert!(desc.sensor_caps.contains(SensorCaps::POSITION));
        assert!(desc.distortion_caps.contains(DistortionCaps::TIME_WARP));
        assert_eq!(desc.resolution, Size2::new(1920, 1080));
        assert_eq!(desc.refresh_rate_hz, 75.0);
    }

    #[test]
    fn dk1_has_no_positional_tracking() {
        let desc = HmdDesc::for_type(HmdType::Dk1);
        assert!(!desc.sensor_caps.contains(SensorCaps::POSITION));
        assert_eq!(desc.refresh_rate_hz, 60.0);
    }

    #[test]
    fn dkhd_descriptor_reports_its_own_type() {
        // DKHD shares DK1 defaults apart from the panel, but the
        // descriptor must still name the requested model.
        let desc = HmdDesc::for_type(HmdType::Dkhd);
        assert_eq!(desc.hmd_type, HmdType::Dkhd);
        assert_eq!(desc.resolution, Size2::new(1920, 1080));
        assert_eq!(desc.refresh_rate_hz, 60.0);
    }

    #[test]
    fn fov_texture_size_grows_with_fov() {
        let desc = HmdDesc::for_type(HmdType::Dk2);
        let small = desc.fov_texture_size(Eye::Left, FovPort::symmetric(0.8, 0.9), 1.0);
        let large = desc.fov_texture_size(Eye::Left, FovPort::symmetric(1.2, 1.3), 1.0);
        assert!(large.width > small.width);
        assert!(large.height > small.height);

        // Default FOV at density 1.0 recovers the panel size per eye,
        // modulo float rounding in the tangent ratio.
        let default = desc.fov_texture_size(Eye::Left, desc.default_eye_fov[0], 1.0);
        assert!((default.width - desc.resolution.width / 2).abs() <= 1);
        assert!((default.height - desc.resolution.height).abs() <= 1);
    }

    #[test]
    fn fov_texture_size_scales_with_pixel_density() {
        let desc = HmdDesc::for_type(HmdType::Dk1);
        let full = desc.fov_texture_size(Eye::Right, desc.default_eye_fov[1], 1.0);
        let half = desc.fov_texture_size(Eye::Right, desc.default_eye_fov[1], 0.5);
        assert!((half.width * 2 - full.width).abs() <= 2);
    }
}
