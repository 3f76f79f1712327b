use clap::Parser;
use ds2480::{Ds2480Builder, Speed};
use onewire::{Adapter, BusSearch};

mod serial;

/// Enumerate the devices on a DS2480B-bridged 1-Wire bus.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the bridge's serial port (e.g., /dev/ttyUSB0)
    #[arg(short, long)]
    path: String,
    /// Bus timing generation: standard, flexible or overdrive
    #[arg(long, default_value_t = Speed::Standard)]
    speed: Speed,
    /// Pull-down slew rate in mV/us
    #[arg(long, default_value_t = 1370)]
    slew_rate: u32,
    /// Write-1 low time in us
    #[arg(long, default_value_t = 10)]
    write_one_low: u32,
    /// Write-0 recovery time in us
    #[arg(long, default_value_t = 8)]
    write_zero_recovery: u32,
    /// Desired bus baud rate in bit/s
    #[arg(long, default_value_t = 9600)]
    baud: u32,
    /// Arm the strong pull-up
    #[arg(long)]
    strong_pullup: bool,
}

fn main() {
    // Initialize the logger
    env_logger::init();
    // Parse command line arguments
    let args = Args::parse();
    // Open the serial port at the chip's wake-up baseline
    let transport =
        serial::SerialTransport::open(&args.path).expect("Failed to open the serial port");
    // Validate the configuration and create the adapter
    let mut adapter = Ds2480Builder::default()
        .with_speed(args.speed)
        .with_slew_rate(args.slew_rate)
        .with_write_one_low(args.write_one_low)
        .with_write_zero_recovery(args.write_zero_recovery)
        .with_baud(args.baud)
        .with_strong_pullup(args.strong_pullup)
        .build(transport)
        .expect("Unsupported adapter configuration");
    // Synchronize with the bridge chip
    let present = adapter
        .detect()
        .expect("Serial link to the bridge failed");
    if !present {
        log::error!("no DS2480-class bridge answered on {}", args.path);
        std::process::exit(1);
    }
    // Walk the bus and print every ROM code found
    let devices = BusSearch::new(&mut adapter)
        .enumerate()
        .expect("Bus enumeration failed");
    log::info!("Found {} devices", devices.len());
    for device in &devices {
        println!("{device}");
    }
}
