//! Value types shared across the runtime: math primitives, capability
//! bitmaps, pose/timing records and the render-API plumbing structs.

/// 2D vector. Plain value type, no behavior beyond field access.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// 3D vector. Plain value type, no behavior beyond field access.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Unit quaternion describing an orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Quaternion::IDENTITY
    }
}

/// Column-major 4x4 matrix, indexed `m[row][col]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix4 {
    pub m: [[f32; 4]; 4],
}

impl Matrix4 {
    pub const IDENTITY: Matrix4 = Matrix4 {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };
}

impl Default for Matrix4 {
    fn default() -> Self {
        Matrix4::IDENTITY
    }
}

/// 2D point in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point2 {
    pub x: i32,
    pub y: i32,
}

impl Point2 {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// 2D size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size2 {
    pub width: i32,
    pub height: i32,
}

impl Size2 {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// Pixel rectangle: position plus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub pos: Point2,
    pub size: Size2,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            pos: Point2 { x, y },
            size: Size2 { width, height },
        }
    }
}

/// Flat 8-bit RGB color, used by the latency probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Which eye is being rendered. There is deliberately no "mono" variant;
/// this is an HMD-centered API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left = 0,
    Right = 1,
}

impl Eye {
    pub const COUNT: usize = 2;
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    /// Array index for per-eye storage.
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Known head-mounted display models. Discriminants match the device
/// type codes reported by the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmdType {
    None = 0,
    Dk1 = 3,
    Dkhd = 4,
    Dk2 = 6,
    Other = 7,
}

/// Render API tag used to route backend-specific payloads. The runtime
/// never interprets the payloads, only matches on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderApi {
    #[default]
    None,
    OpenGl,
    AndroidGles,
    D3d9,
    D3d10,
    D3d11,
}

bitflags::bitflags! {
    /// Display capability bits declared by a device.
    ///
    /// `PRESENT` and `AVAILABLE` are read-only; only bits inside
    /// `WRITABLE_MASK` can be toggled through `set_enabled_caps`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HmdCaps: u32 {
        const PRESENT            = 0x0001;
        const AVAILABLE          = 0x0002;
        const LOW_PERSISTENCE    = 0x0080;
        const LATENCY_TEST       = 0x0100;
        const DYNAMIC_PREDICTION = 0x0200;
        const NO_VSYNC           = 0x1000;
        const NO_RESTORE         = 0x4000;
        /// Bits that `set_enabled_caps` may modify.
        const WRITABLE_MASK      = 0x1380;
    }
}

bitflags::bitflags! {
    /// Sensor capability bits used in tracking negotiation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SensorCaps: u32 {
        const ORIENTATION    = 0x0010;
        const YAW_CORRECTION = 0x0020;
        const POSITION       = 0x0040;
    }
}

bitflags::bitflags! {
    /// Distortion capability bits requested at render configuration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DistortionCaps: u32 {
        const CHROMATIC = 0x01;
        const TIME_WARP = 0x02;
        const VIGNETTE  = 0x08;
    }
}

bitflags::bitflags! {
    /// Live tracking status. Degraded tracking is reported here instead of
    /// failing the sample call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusFlags: u32 {
        const ORIENTATION_TRACKED = 0x0001;
        const POSITION_TRACKED    = 0x0002;
        const POSITION_CONNECTED  = 0x0020;
        const HMD_CONNECTED       = 0x0080;
    }
}

/// Field of view expressed as tangents of the half-angles in each
/// direction from the view axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FovPort {
    pub up_tan: f32,
    pub down_tan: f32,
    pub left_tan: f32,
    pub right_tan: f32,
}

impl FovPort {
    pub const fn new(up_tan: f32, down_tan: f32, left_tan: f32, right_tan: f32) -> Self {
        Self {
            up_tan,
            down_tan,
            left_tan,
            right_tan,
        }
    }

    /// Symmetric FOV with equal tangents up/down and left/right.
    pub const fn symmetric(vertical_tan: f32, horizontal_tan: f32) -> Self {
        Self {
            up_tan: vertical_tan,
            down_tan: vertical_tan,
            left_tan: horizontal_tan,
            right_tan: horizontal_tan,
        }
    }
}

/// Orientation + position of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub orientation: Quaternion,
    pub position: Vector3,
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        orientation: Quaternion::IDENTITY,
        position: Vector3::ZERO,
    };
}

/// Full rigid body state with first and second derivatives, stamped with
/// the absolute sample time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoseState {
    pub pose: Pose,
    pub angular_velocity: Vector3,
    pub linear_velocity: Vector3,
    pub angular_acceleration: Vector3,
    pub linear_acceleration: Vector3,
    pub time_s: f64,
}

/// Sensor reading at a requested absolute time.
///
/// `recorded` is the most recent physical sample; `predicted` is that
/// sample extrapolated to the requested time. When the requested time is
/// the sentinel 0.0 the two are identical.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorState {
    pub predicted: PoseState,
    pub recorded: PoseState,
    pub temperature: f32,
    pub status: StatusFlags,
}

/// Per-frame timing record produced by `begin_frame`.
///
/// The following ordering holds across a session, with `eye_scanout`
/// indexed by `Eye` and ordered by the descriptor's eye render order:
/// `this_frame <= timewarp_point <= next_frame <= first eye scan-out
/// <= scanout_midpoint <= second eye scan-out`, and `next_frame` of
/// frame `n` equals `this_frame` of frame `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameTiming {
    /// Seconds since the previous frame start, clamped to 0.1 to avoid
    /// animation spikes after stalls.
    pub delta_seconds: f32,
    pub this_frame_seconds: f64,
    pub timewarp_point_seconds: f64,
    pub next_frame_seconds: f64,
    pub scanout_midpoint_seconds: f64,
    pub eye_scanout_seconds: [f64; 2],
}

/// Computed rendering parameters for one eye, filled in by
/// `configure_rendering`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeRenderDesc {
    pub eye: Eye,
    pub fov: FovPort,
    pub distorted_viewport: Rect,
    /// Display pixels that fit in tan(angle) = 1 at the distortion center.
    pub pixels_per_tan_angle_at_center: Vector2,
    /// Translation to apply to the view matrix for this eye.
    pub view_adjust: Vector3,
}

/// Platform-independent render backend configuration. The platform
/// payload slots are opaque to the runtime and routed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderConfig {
    pub api: RenderApi,
    pub rt_size: Size2,
    pub multisample: i32,
    pub platform_data: [usize; 8],
}

/// API-specific texture payload. The runtime routes these without
/// interpreting them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureHandle {
    #[default]
    None,
    OpenGl {
        tex_id: u32,
    },
    AndroidGles {
        tex_id: u32,
    },
    D3d9 {
        texture: usize,
    },
    D3d10 {
        texture: usize,
        sr_view: usize,
    },
    D3d11 {
        texture: usize,
        sr_view: usize,
    },
}

impl TextureHandle {
    /// Render API tag matching this payload.
    pub const fn api(&self) -> RenderApi {
        match self {
            TextureHandle::None => RenderApi::None,
            TextureHandle::OpenGl { .. } => RenderApi::OpenGl,
            TextureHandle::AndroidGles { .. } => RenderApi::AndroidGles,
            TextureHandle::D3d9 { .. } => RenderApi::D3d9,
            TextureHandle::D3d10 { .. } => RenderApi::D3d10,
            TextureHandle::D3d11 { .. } => RenderApi::D3d11,
        }
    }
}

/// Eye content submitted through `end_eye_render`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EyeTexture {
    pub size: Size2,
    /// Pixel viewport within the texture that holds the eye image.
    /// May change per frame.
    pub viewport: Rect,
    pub handle: TextureHandle,
}

/// Projection matrix for the given FOV cone and depth range.
pub fn projection(fov: FovPort, znear: f32, zfar: f32, right_handed: bool) -> Matrix4 {
    let x_scale = 2.0 / (fov.left_tan + fov.right_tan);
    let x_offset = (fov.left_tan - fov.right_tan) * x_scale * 0.5;
    let y_scale = 2.0 / (fov.up_tan + fov.down_tan);
    let y_offset = (fov.up_tan - fov.down_tan) * y_scale * 0.5;
    let handedness = if right_handed { -1.0 } else { 1.0 };

    let mut m = [[0.0f32; 4]; 4];
    m[0][0] = x_scale;
    m[0][2] = handedness * x_offset;
    m[1][1] = y_scale;
    m[1][2] = handedness * -y_offset;
    m[2][2] = handedness * zfar / (znear - zfar);
    m[2][3] = (zfar * znear) / (znear - zfar);
    m[3][2] = handedness;
    Matrix4 { m }
}

/// Orthographic sub-projection for 2D overlays (Y is down), derived from
/// a projection matrix returned by [`projection`].
pub fn ortho_sub_projection(
    projection: Matrix4,
    ortho_scale: Vector2,
    ortho_distance: f32,
    eye_view_adjust_x: f32,
) -> Matrix4 {
    let horizontal_offset = eye_view_adjust_x / ortho_distance;
    let p = &projection.m;

    let mut m = [[0.0f32; 4]; 4];
    m[0][0] = p[0][0] * ortho_scale.x;
    m[0][3] = -p[0][2] + horizontal_offset * p[0][0];
    m[1][1] = -p[1][1] * ortho_scale.y;
    m[1][3] = p[1][2];
    m[2][2] = 0.0;
    m[3][3] = 1.0;
    Matrix4 { m }
}
