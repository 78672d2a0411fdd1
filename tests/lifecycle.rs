//! End-to-end lifecycle tests driving the public API.
//!
//! The runtime bracket is process-wide, so every test serializes on one
//! lock and brackets its own initialize/shutdown pair.

use hmdcore::{
    DistortionCaps, Eye, EyeTexture, FixedScanner, HmdCaps, HmdError, HmdType, RenderConfig,
    SensorCaps, Size2,
};
use std::sync::{Mutex, MutexGuard};

static SERIAL: Mutex<()> = Mutex::new(());

struct Bracket(#[allow(dead_code)] MutexGuard<'static, ()>);

impl Bracket {
    fn headless() -> Self {
        let guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        hmdcore::initialize().unwrap();
        Bracket(guard)
    }

    fn with_devices(types: &[HmdType]) -> Self {
        let guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        hmdcore::initialize_with(Box::new(FixedScanner::new(types.iter().copied()))).unwrap();
        Bracket(guard)
    }
}

impl Drop for Bracket {
    fn drop(&mut self) {
        hmdcore::shutdown();
    }
}

#[test]
fn operations_fail_outside_the_bracket() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    assert_eq!(hmdcore::detect().unwrap_err(), HmdError::NotInitialized);
    assert_eq!(hmdcore::create(0).unwrap_err(), HmdError::NotInitialized);
    assert_eq!(
        hmdcore::create_debug(HmdType::Dk2).unwrap_err(),
        HmdError::NotInitialized
    );
    // Shutdown without initialize is a no-op.
    hmdcore::shutdown();
}

#[test]
fn double_initialize_is_rejected() {
    let _bracket = Bracket::headless();
    assert_eq!(
        hmdcore::initialize().unwrap_err(),
        HmdError::AlreadyInitialized
    );
}

#[test]
fn create_with_zero_detected_devices_is_out_of_range() {
    let _bracket = Bracket::headless();
    assert_eq!(hmdcore::detect().unwrap(), 0);
    let err = hmdcore::create(0).unwrap_err();
    assert_eq!(
        err,
        HmdError::IndexOutOfRange {
            index: 0,
            detected: 0
        }
    );
    assert!(!hmdcore::get_last_error().is_empty());
}

#[test]
fn each_device_index_binds_at_most_once() {
    let _bracket = Bracket::with_devices(&[HmdType::Dk2]);
    assert_eq!(hmdcore::detect().unwrap(), 1);

    let first = hmdcore::create(0).unwrap();
    assert_eq!(hmdcore::create(0).unwrap_err(), HmdError::AlreadyBound(0));

    first.destroy().unwrap();
    // Released indices can be re-bound.
    let second = hmdcore::create(0).unwrap();
    second.destroy().unwrap();
}

#[test]
fn destroyed_handle_fails_every_operation_category() {
    let _bracket = Bracket::headless();
    let hmd = hmdcore::create_debug(HmdType::Dk2).unwrap();
    hmd.destroy().unwrap();

    // Lifecycle.
    assert_eq!(hmd.destroy().unwrap_err(), HmdError::InvalidHandle);
    assert_eq!(hmd.desc().unwrap_err(), HmdError::InvalidHandle);
    // Capabilities.
    assert_eq!(hmd.enabled_caps().unwrap_err(), HmdError::InvalidHandle);
    assert_eq!(
        hmd.set_enabled_caps(HmdCaps::NO_VSYNC).unwrap_err(),
        HmdError::InvalidHandle
    );
    // Tracking.
    assert_eq!(
        hmd.configure_tracking(SensorCaps::ORIENTATION, SensorCaps::empty())
            .unwrap_err(),
        HmdError::InvalidHandle
    );
    assert_eq!(hmd.sensor_state(0.0).unwrap_err(), HmdError::InvalidHandle);
    assert_eq!(hmd.stop_tracking().unwrap_err(), HmdError::InvalidHandle);
    // Frame protocol.
    assert_eq!(hmd.begin_frame(0).unwrap_err(), HmdError::InvalidHandle);
    assert_eq!(
        hmd.begin_eye_render(Eye::Left).unwrap_err(),
        HmdError::InvalidHandle
    );
    assert_eq!(hmd.end_frame().unwrap_err(), HmdError::InvalidHandle);
    // Latency probe keeps its sentinel contract even on dead handles.
    assert_eq!(hmd.process_latency_test().unwrap_err(), HmdError::InvalidHandle);
    assert_eq!(hmd.measured_latency_seconds(), -1.0);
}

#[test]
fn debug_session_supports_the_full_protocol_without_hardware() {
    let _bracket = Bracket::headless();
    assert_eq!(hmdcore::detect().unwrap(), 0);

    let hmd = hmdcore::create_debug(HmdType::Dk2).unwrap();
    let desc = hmd.desc().unwrap();
    assert_eq!(desc.hmd_type, HmdType::Dk2);
    assert!(desc.display_caps.contains(HmdCaps::PRESENT));

    assert!(hmd
        .configure_tracking(
            SensorCaps::ORIENTATION | SensorCaps::POSITION | SensorCaps::YAW_CORRECTION,
            SensorCaps::empty(),
        )
        .is_ok());
    assert!(hmd.sensor_description().unwrap().is_some());

    let config = RenderConfig {
        rt_size: Size2::new(1920, 1080),
        multisample: 1,
        ..RenderConfig::default()
    };
    let descs = hmd
        .configure_rendering(Some(&config), DistortionCaps::TIME_WARP, desc.default_eye_fov)
        .unwrap()
        .unwrap();
    assert_eq!(descs[0].eye, Eye::Left);
    assert_eq!(descs[1].eye, Eye::Right);

    let timing = hmd.begin_frame(0).unwrap();
    assert!(timing.this_frame_seconds <= timing.timewarp_point_seconds);
    assert!(timing.timewarp_point_seconds <= timing.next_frame_seconds);

    let left_pose = hmd.begin_eye_render(Eye::Left).unwrap();
    hmd.end_eye_render(Eye::Left, left_pose, EyeTexture::default())
        .unwrap();
    let right_pose = hmd.begin_eye_render(Eye::Right).unwrap();
    hmd.end_eye_render(Eye::Right, right_pose, EyeTexture::default())
        .unwrap();
    hmd.end_frame().unwrap();

    hmd.destroy().unwrap();
}

#[test]
fn tracking_is_usable_from_a_worker_thread() {
    let _bracket = Bracket::headless();
    let hmd = hmdcore::create_debug(HmdType::Dk2).unwrap();
    hmd.configure_tracking(SensorCaps::ORIENTATION, SensorCaps::empty())
        .unwrap();

    let worker = std::thread::spawn(move || {
        let mut states = Vec::new();
        for _ in 0..50 {
            states.push(hmd.sensor_state(0.0).unwrap());
        }
        states
    });
    let states = worker.join().unwrap();
    assert_eq!(states.len(), 50);
    for state in states {
        assert_eq!(state.predicted, state.recorded);
    }
    hmd.destroy().unwrap();
}

#[test]
fn required_caps_beyond_the_device_fail_tracking_configuration() {
    let _bracket = Bracket::headless();
    // DK1 has no positional tracking.
    let hmd = hmdcore::create_debug(HmdType::Dk1).unwrap();
    let err = hmd
        .configure_tracking(SensorCaps::empty(), SensorCaps::POSITION)
        .unwrap_err();
    assert_eq!(err, HmdError::UnsupportedRequired(SensorCaps::POSITION));
    assert!(hmd.last_error().contains("required sensor capabilities"));
    // Nothing was partially enabled.
    let state = hmd.sensor_state(0.0).unwrap();
    assert!(state.status.is_empty());
    hmd.destroy().unwrap();
}

#[test]
fn shutdown_forcibly_closes_bound_sessions() {
    let hmd = {
        let _bracket = Bracket::headless();
        let hmd = hmdcore::create_debug(HmdType::Dk2).unwrap();
        hmd
        // Bracket drop shuts the runtime down with the session bound.
    };
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    hmdcore::initialize().unwrap();
    // The old handle does not survive the next bracket.
    assert_eq!(hmd.desc().unwrap_err(), HmdError::InvalidHandle);
    hmdcore::shutdown();
}

#[test]
fn latency_probe_reports_through_the_handle() {
    let _bracket = Bracket::headless();
    let hmd = hmdcore::create_debug(HmdType::Dk2).unwrap();

    // Probe is inert until the capability is enabled.
    assert_eq!(hmd.process_latency_test().unwrap(), None);
    assert_eq!(hmd.measured_latency_seconds(), -1.0);
    assert_eq!(hmd.latency_test_result().unwrap_err(), HmdError::Unsupported);

    hmd.set_enabled_caps(HmdCaps::LATENCY_TEST).unwrap();
    let mut cleared = 0;
    for _ in 0..400 {
        if hmd.process_latency_test().unwrap().is_some() {
            cleared += 1;
        }
    }
    assert!(cleared > 0);
    assert!(hmd.measured_latency_seconds() >= 0.0);
    let report = hmd.latency_test_result().unwrap();
    assert!(report.contains("latency"));

    hmd.destroy().unwrap();
}
