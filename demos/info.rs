//! Print descriptor and capability info for the first detected HMD,
//! falling back to a DK2 debug session when no hardware is present.

use hmdcore::HmdType;

fn main() {
    env_logger::init();

    if let Err(e) = hmdcore::initialize() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    println!("Runtime:  {}", hmdcore::version_string());

    let detected = hmdcore::detect().unwrap_or(0);
    println!("Detected: {} device(s)", detected);

    let hmd = if detected > 0 {
        hmdcore::create(0)
    } else {
        println!("No hardware, creating a debug session");
        hmdcore::create_debug(HmdType::Dk2)
    };
    let hmd = match hmd {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Error: {}", e);
            hmdcore::shutdown();
            std::process::exit(1);
        }
    };

    match hmd.desc() {
        Ok(desc) => {
            println!("Product:      {}", desc.product_name);
            println!("Manufacturer: {}", desc.manufacturer);
            println!("Type:         {:?}", desc.hmd_type);
            println!(
                "Resolution:   {}x{} @ {} Hz",
                desc.resolution.width, desc.resolution.height, desc.refresh_rate_hz
            );
            println!("Display caps: {:?}", desc.display_caps);
            println!("Sensor caps:  {:?}", desc.sensor_caps);
            println!("Distortion:   {:?}", desc.distortion_caps);
            println!("Render order: {:?}", desc.eye_render_order);
        }
        Err(e) => eprintln!("Error: {}", e),
    }

    let _ = hmd.destroy();
    hmdcore::shutdown();
}
