use std::env;

use inquire::Select;
use serialport::{ClearBuffer, SerialPort};
use solar_inverter::{
    config::{DeviceProfile, Parity, RetryPolicy, SerialSettings},
    identify::identify,
    poll::poll,
    transport::Transport,
};

pub struct PortWrapper(Box<dyn SerialPort>);

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
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
            std::io::ErrorKind::OutOfMemory => embedded_io::ErrorKind::OutOfMemory,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for PortWrapper {
    type Error = IoError;
}

impl embedded_io::Read for PortWrapper {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(IoError)
    }
}

impl embedded_io::Write for PortWrapper {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

impl Transport for PortWrapper {
    fn close(&mut self) {
        // The port itself closes when dropped; just discard anything left unread.
        if let Err(e) = self.0.clear(ClearBuffer::All) {
            log::warn!("Failed to clear serial buffers: {}", e);
        }
    }
}

fn open_port(port_name: &str, settings: &SerialSettings, policy: &RetryPolicy) -> Option<PortWrapper> {
    let data_bits = match settings.data_bits {
        5 => serialport::DataBits::Five,
        6 => serialport::DataBits::Six,
        7 => serialport::DataBits::Seven,
        _ => serialport::DataBits::Eight,
    };
    let stop_bits = match settings.stop_bits {
        2 => serialport::StopBits::Two,
        _ => serialport::StopBits::One,
    };
    let parity = match settings.parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    };

    match serialport::new(port_name, settings.baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .timeout(std::time::Duration::from_millis(u64::from(
            policy.read_timeout.to_millis(),
        )))
        .open()
    {
        Ok(port) => Some(PortWrapper(port)),
        Err(e) => {
            log::error!("Error opening serial port {}: {}", port_name, e);
            None
        }
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let identify_only = args.iter().any(|a| a == "--identify");
    let profile = if args.iter().any(|a| a == "--soladin") {
        DeviceProfile::soladin600()
    } else {
        DeviceProfile::bls3000()
    };

    // Get serial port from command line arg or interactive selection
    let port_name = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| {
            let ports = serialport::available_ports().expect("Failed to enumerate serial ports");

            if ports.is_empty() {
                eprintln!("No serial ports found!");
                std::process::exit(1);
            }

            let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

            Select::new("Select a serial port:", port_names)
                .prompt()
                .expect("Failed to select port")
        });

    println!("Using port: {} for {}", port_name, profile.name());

    let settings = SerialSettings::default();
    let policy = RetryPolicy::default();
    let port = open_port(&port_name, &settings, &policy);

    if identify_only {
        let Some(port) = port else {
            eprintln!("Cannot open serial port, exiting...");
            std::process::exit(1);
        };
        match identify(port, &profile) {
            Ok(identity) => println!("{:#?}", identity),
            Err(e) => {
                eprintln!("Identification failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let sample = poll(port, &profile, &policy);
    if sample.success {
        println!("Status: {}", sample.status);
        for (field, value) in sample.values() {
            println!("{:>12}: {}", field, value);
        }
        println!("Raw: {}", sample.raw_hex);
    } else {
        println!(
            "Inverter off, no data after {} attempt(s) ({:?})",
            sample.attempts, sample.last_error
        );
    }
}
