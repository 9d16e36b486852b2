use std::env;
use std::fs::File;
use std::net::TcpStream;

use caen_r8033dm::config::{BenchConfig, Grade};
use caen_r8033dm::hv::R8033dm;
use caen_r8033dm::monitor::{ChannelSample, ScanPoint};
use caen_r8033dm::session::Session;
use caen_r8033dm::setup::{ChannelSetupBuilder, CurrentRange, PowerDown};
use fugit::MillisDurationU32;
use inquire::Text;
use log::info;
use serde::Serialize;

// Configuration constants - adjust these for your setup
const PORT: u16 = 4242;
const CHANNELS: [u8; 2] = [0, 8];
const SCAN_STEP_V: f64 = 10.0;
const SCAN_MAX_V: f64 = 120.0;
const SCAN_DWELL_MS: u32 = 5000;
const CURRENT_LIMIT_UA: f64 = 50.0;
const RAMP_RATE_V_S: f64 = 50.0;
const MONITOR_ROUNDS: u32 = 10;
const MONITOR_INTERVAL_MS: u32 = 1000;

pub struct StreamWrapper(TcpStream);

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::ConnectionRefused => embedded_io::ErrorKind::ConnectionRefused,
            std::io::ErrorKind::ConnectionReset => embedded_io::ErrorKind::ConnectionReset,
            std::io::ErrorKind::ConnectionAborted => embedded_io::ErrorKind::ConnectionAborted,
            std::io::ErrorKind::NotConnected => embedded_io::ErrorKind::NotConnected,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for StreamWrapper {
    type Error = IoError;
}

impl embedded_io::Read for StreamWrapper {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(IoError)
    }
}

impl embedded_io::Write for StreamWrapper {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

#[derive(Serialize)]
struct Report {
    name: String,
    max_current_ua: Option<f64>,
    leakage: Option<Grade>,
    scan: Vec<ScanPoint>,
    samples: Vec<ChannelSample>,
}

fn main() {
    env_logger::init();

    let config_path = env::args().nth(1).unwrap_or_else(|| "bench.toml".to_owned());
    let config = BenchConfig::load(&config_path).expect("Failed to load configuration");
    info!("Loaded configuration from {config_path}");

    let name = Text::new("Name of this run:")
        .with_default("hv_scan")
        .prompt()
        .expect("Failed to read run name");

    let stream = TcpStream::connect((config.hv.address.as_str(), PORT))
        .expect("Failed to connect to the controller");
    let stream = StreamWrapper(stream);

    // Discovers every parameter and checks the board interlock before returning
    let mut hv: R8033dm<Session<StreamWrapper>> =
        R8033dm::connect(stream, &config.hv).expect("Failed to open the controller");
    println!("Board control: {:?}", hv.get_board_control().unwrap());

    let setup = ChannelSetupBuilder::new()
        .with_voltage(0.0)
        .with_current_limit(CURRENT_LIMIT_UA)
        .with_current_range(CurrentRange::Low)
        .with_ramp(RAMP_RATE_V_S, RAMP_RATE_V_S)
        .with_power_down(PowerDown::Ramp)
        .build()
        .unwrap();
    setup.apply(&mut hv, CHANNELS).unwrap();

    hv.turn_on(CHANNELS).unwrap();
    println!("Channels {CHANNELS:?} are on");

    // Step up to the top of the scan, then hold there while monitoring
    let steps = (SCAN_MAX_V / SCAN_STEP_V) as u32;
    let setpoints: Vec<f64> = (0..=steps).map(|i| i as f64 * SCAN_STEP_V).collect();
    let scan = hv
        .scan(
            CHANNELS,
            &setpoints,
            MillisDurationU32::millis(SCAN_DWELL_MS),
        )
        .unwrap();
    for point in &scan {
        println!(
            "{:>6.1} V -> channel {}: {:?} V, {:?} µA",
            point.setpoint, point.sample.channel, point.sample.voltage, point.sample.current
        );
    }

    let samples = hv
        .monitor(
            CHANNELS,
            MONITOR_ROUNDS,
            MillisDurationU32::millis(MONITOR_INTERVAL_MS),
        )
        .unwrap();

    // Turn off before anything else can fail
    hv.turn_off(CHANNELS).unwrap();
    hv.close().unwrap();
    println!("Channels {CHANNELS:?} are off");

    let max_current_ua = samples
        .iter()
        .filter_map(|s| s.current)
        .reduce(f64::max);
    let leakage = config
        .threshold("leakage_current")
        .zip(max_current_ua)
        .map(|(threshold, current)| threshold.grade(current));
    println!("Max current: {max_current_ua:?} µA, leakage: {leakage:?}");

    let report = Report {
        name: name.clone(),
        max_current_ua,
        leakage,
        scan,
        samples,
    };
    let file = File::create(format!("{name}.json")).expect("Failed to create report");
    serde_json::to_writer_pretty(file, &report).unwrap();
    println!("Wrote {name}.json");
}
