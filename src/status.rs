//! Inverter status codes and their display labels.

use strum_macros::{Display, EnumIter};

/// BLS3000 run state, as held in its `Status2` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[repr(u16)]
pub enum BlsStatus {
    #[strum(to_string = "Inverter not running")]
    NotRunning = 0,
    #[strum(to_string = "Inverter in operation")]
    InOperation = 1,
}

impl TryFrom<u16> for BlsStatus {
    type Error = ();
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            s if s == BlsStatus::NotRunning as u16 => Ok(BlsStatus::NotRunning),
            s if s == BlsStatus::InOperation as u16 => Ok(BlsStatus::InOperation),
            _ => Err(()),
        }
    }
}

/// Soladin 600 status flags.
///
/// Normal operation is reported as no flag being set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[repr(u16)]
pub enum SoladinFlag {
    #[strum(to_string = "Solar input voltage too high")]
    SolarVoltageHigh = 0x001,
    #[strum(to_string = "Solar input voltage too low")]
    SolarVoltageLow = 0x002,
    #[strum(to_string = "No input from mains")]
    NoMains = 0x004,
    #[strum(to_string = "Mains voltage too high")]
    MainsVoltageHigh = 0x008,
    #[strum(to_string = "Mains voltage too low")]
    MainsVoltageLow = 0x010,
    #[strum(to_string = "Mains frequency too high")]
    MainsFrequencyHigh = 0x020,
    #[strum(to_string = "Mains frequency too low")]
    MainsFrequencyLow = 0x040,
    #[strum(to_string = "Temperature error")]
    OverTemperature = 0x080,
    #[strum(to_string = "Hardware error")]
    HardwareFault = 0x100,
    #[strum(to_string = "Starting up")]
    StartingUp = 0x200,
    #[strum(to_string = "Max solar output")]
    MaxSolarOutput = 0x400,
    #[strum(to_string = "Max output")]
    MaxOutput = 0x800,
}

/// Order in which Soladin flags are tested. When several are set, the first one listed wins.
pub static SOLADIN_PRECEDENCE: [SoladinFlag; 12] = [
    SoladinFlag::SolarVoltageHigh,
    SoladinFlag::SolarVoltageLow,
    SoladinFlag::NoMains,
    SoladinFlag::MainsVoltageHigh,
    SoladinFlag::MainsVoltageLow,
    SoladinFlag::MainsFrequencyHigh,
    SoladinFlag::MainsFrequencyLow,
    SoladinFlag::OverTemperature,
    SoladinFlag::HardwareFault,
    SoladinFlag::StartingUp,
    SoladinFlag::MaxSolarOutput,
    SoladinFlag::MaxOutput,
];

/// Label shown when no Soladin flag is set.
pub const SOLADIN_IN_OPERATION: &str = "Inverter in operation";

impl SoladinFlag {
    pub const fn mask(self) -> u16 {
        self as u16
    }

    /// The highest precedence flag set in `bits`, if any.
    pub fn first_set(bits: u16) -> Option<SoladinFlag> {
        SOLADIN_PRECEDENCE
            .iter()
            .copied()
            .find(|flag| bits & flag.mask() != 0)
    }
}

fn unknown(code: u16) -> String {
    format!("unknown: {code}")
}

/// Label for a BLS3000 `Status2` value.
pub fn classify_bls(code: u16) -> String {
    match BlsStatus::try_from(code) {
        Ok(status) => status.to_string(),
        Err(()) => unknown(code),
    }
}

/// Label for a Soladin status bitmask.
pub fn classify_soladin(bits: u16) -> String {
    if bits == 0 {
        return SOLADIN_IN_OPERATION.to_string();
    }
    match SoladinFlag::first_set(bits) {
        Some(flag) => flag.to_string(),
        None => unknown(bits),
    }
}
