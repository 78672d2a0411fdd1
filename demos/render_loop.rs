//! Drive the full stereo frame protocol against a debug session and
//! print the resulting frame timing and eye poses.
//!
//! Usage: cargo run --example render_loop

use hmdcore::{
    DistortionCaps, EyeTexture, HmdType, RenderConfig, SensorCaps, Size2,
};

const FRAMES: u64 = 300;

fn main() {
    env_logger::init();

    if let Err(e) = hmdcore::initialize() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let hmd = match hmdcore::create_debug(HmdType::Dk2) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Failed to create session: {}", e);
            hmdcore::shutdown();
            std::process::exit(1);
        }
    };
    let desc = hmd.desc().expect("fresh handle");
    println!(
        "{} {}x{} @ {} Hz",
        desc.product_name, desc.resolution.width, desc.resolution.height, desc.refresh_rate_hz
    );

    hmd.configure_tracking(
        SensorCaps::ORIENTATION | SensorCaps::POSITION | SensorCaps::YAW_CORRECTION,
        SensorCaps::empty(),
    )
    .expect("debug sessions accept any supported set");
    if let Ok(Some(sensor)) = hmd.sensor_description() {
        println!("Sensor: {}", sensor);
    }

    let rt_size = hmd
        .fov_texture_size(hmdcore::Eye::Left, desc.default_eye_fov[0], 1.0)
        .expect("fresh handle");
    let config = RenderConfig {
        rt_size: Size2::new(rt_size.width * 2, rt_size.height),
        multisample: 1,
        ..RenderConfig::default()
    };
    let eye_descs = hmd
        .configure_rendering(Some(&config), desc.distortion_caps & DistortionCaps::TIME_WARP, desc.default_eye_fov)
        .expect("idle session")
        .expect("config was provided");
    for d in &eye_descs {
        println!(
            "{:?}: viewport {}x{} at ({}, {})",
            d.eye,
            d.distorted_viewport.size.width,
            d.distorted_viewport.size.height,
            d.distorted_viewport.pos.x,
            d.distorted_viewport.pos.y
        );
    }

    for frame_index in 0..FRAMES {
        let timing = hmd.begin_frame(frame_index).expect("frame protocol");

        for &eye in &desc.eye_render_order {
            let pose = hmd.begin_eye_render(eye).expect("frame protocol");
            // A real renderer would draw the eye here.
            hmd.end_eye_render(eye, pose, EyeTexture::default())
                .expect("frame protocol");

            if frame_index % 60 == 0 {
                let p = pose.position;
                println!(
                    "frame {:>4} {:?}: pos=[{:+.4}, {:+.4}, {:+.4}]",
                    frame_index, eye, p.x, p.y, p.z
                );
            }
        }

        if frame_index % 60 == 0 {
            println!(
                "frame {:>4}: this={:.4} next={:.4} delta={:.4}",
                frame_index,
                timing.this_frame_seconds,
                timing.next_frame_seconds,
                timing.delta_seconds
            );
        }

        hmd.end_frame().expect("frame protocol");
    }

    println!("Rendered {} frames", FRAMES);
    let _ = hmd.destroy();
    hmdcore::shutdown();
}
