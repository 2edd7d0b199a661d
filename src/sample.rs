//! Decoded telemetry, as handed to the caller for persistence.

use crate::{
    error::{DecodeError, ErrorKind},
    register::{Field, RegisterValues},
};

/// One BLS3000 telemetry read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlsReadings {
    pub volts_pv1: f64,
    pub volts_pv2: f64,
    pub current_pv1: f64,
    pub current_pv2: f64,
    pub volts_ac1: f64,
    pub volts_ac2: f64,
    pub volts_ac3: f64,
    pub current_ac1: f64,
    pub current_ac2: f64,
    pub current_ac3: f64,
    pub frequency_ac: f64,
    pub power_ac: f64,
    pub energy_today: f64,
    pub energy_total: f64,
    pub min_today: f64,
    pub hrs_total: f64,
    pub temperature: f64,
    pub iac_shift: f64,
    pub dci: f64,
    pub status1: f64,
    pub status2: f64,
}

impl BlsReadings {
    /// Collect every field from a decoded register block.
    pub fn from_registers(values: &RegisterValues) -> Result<Self, DecodeError> {
        Ok(Self {
            volts_pv1: values.require(Field::VoltsPv1)?,
            volts_pv2: values.require(Field::VoltsPv2)?,
            current_pv1: values.require(Field::CurrentPv1)?,
            current_pv2: values.require(Field::CurrentPv2)?,
            volts_ac1: values.require(Field::VoltsAc1)?,
            volts_ac2: values.require(Field::VoltsAc2)?,
            volts_ac3: values.require(Field::VoltsAc3)?,
            current_ac1: values.require(Field::CurrentAc1)?,
            current_ac2: values.require(Field::CurrentAc2)?,
            current_ac3: values.require(Field::CurrentAc3)?,
            frequency_ac: values.require(Field::FrequencyAc)?,
            power_ac: values.require(Field::PowerAc)?,
            energy_today: values.require(Field::EnergyToday)?,
            energy_total: values.require(Field::EnergyTotal)?,
            min_today: values.require(Field::MinToday)?,
            hrs_total: values.require(Field::HrsTotal)?,
            temperature: values.require(Field::Temperature)?,
            iac_shift: values.require(Field::IacShift)?,
            dci: values.require(Field::Dci)?,
            status1: values.require(Field::Status1)?,
            status2: values.require(Field::Status2)?,
        })
    }

    /// Raw run state, as fed to [`classify_bls`](crate::status::classify_bls).
    pub fn status_code(&self) -> u16 {
        self.status2 as u16
    }

    pub fn values(&self) -> [(Field, f64); 21] {
        [
            (Field::VoltsPv1, self.volts_pv1),
            (Field::VoltsPv2, self.volts_pv2),
            (Field::CurrentPv1, self.current_pv1),
            (Field::CurrentPv2, self.current_pv2),
            (Field::VoltsAc1, self.volts_ac1),
            (Field::VoltsAc2, self.volts_ac2),
            (Field::VoltsAc3, self.volts_ac3),
            (Field::CurrentAc1, self.current_ac1),
            (Field::CurrentAc2, self.current_ac2),
            (Field::CurrentAc3, self.current_ac3),
            (Field::FrequencyAc, self.frequency_ac),
            (Field::PowerAc, self.power_ac),
            (Field::EnergyToday, self.energy_today),
            (Field::EnergyTotal, self.energy_total),
            (Field::MinToday, self.min_today),
            (Field::HrsTotal, self.hrs_total),
            (Field::Temperature, self.temperature),
            (Field::IacShift, self.iac_shift),
            (Field::Dci, self.dci),
            (Field::Status1, self.status1),
            (Field::Status2, self.status2),
        ]
    }
}

/// One Soladin 600 poll: stats, max-power and history exchanges combined.
///
/// The Soladin has a single PV string and a single mains phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoladinReadings {
    pub status_bits: u16,
    pub volts_pv1: f64,
    pub current_pv1: f64,
    pub frequency_ac: f64,
    pub volts_ac1: f64,
    pub power_ac: f64,
    pub energy_total: f64,
    pub temperature: f64,
    pub hrs_total: f64,
    pub max_power: f64,
    pub min_today: f64,
    pub energy_today: f64,
}

impl SoladinReadings {
    /// Stored in the same columns as BLS readings; the status bits go under `Status2`.
    pub fn values(&self) -> [(Field, f64); 13] {
        [
            (Field::VoltsPv1, self.volts_pv1),
            (Field::CurrentPv1, self.current_pv1),
            (Field::VoltsAc1, self.volts_ac1),
            (Field::FrequencyAc, self.frequency_ac),
            (Field::PowerAc, self.power_ac),
            (Field::EnergyToday, self.energy_today),
            (Field::EnergyTotal, self.energy_total),
            (Field::MinToday, self.min_today),
            (Field::HrsTotal, self.hrs_total),
            (Field::Temperature, self.temperature),
            (Field::Status1, 0.0),
            (Field::Status2, f64::from(self.status_bits)),
            (Field::MaxPower, self.max_power),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Readings {
    Bls3000(BlsReadings),
    Soladin600(SoladinReadings),
}

impl Readings {
    /// Every decoded quantity with its field, for persistence.
    pub fn values(&self) -> Vec<(Field, f64)> {
        match self {
            Readings::Bls3000(readings) => readings.values().to_vec(),
            Readings::Soladin600(readings) => readings.values().to_vec(),
        }
    }

    pub fn get(&self, field: Field) -> Option<f64> {
        self.values()
            .into_iter()
            .find(|(f, _)| *f == field)
            .map(|(_, value)| value)
    }
}

/// Outcome of one poll cycle. Ownership passes to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    /// Name of the device profile polled.
    pub device: &'static str,
    pub success: bool,
    /// Human readable status; empty on failure.
    pub status: String,
    /// `None` on failure.
    pub readings: Option<Readings>,
    /// Payload(s) as spaced hex, for auditing.
    pub raw_hex: String,
    /// Attempts made, including the successful one.
    pub attempts: u8,
    /// What ended the last failed attempt, if any.
    pub last_error: Option<ErrorKind>,
}

impl TelemetrySample {
    pub fn succeeded(
        device: &'static str,
        status: String,
        readings: Readings,
        raw_hex: String,
        attempts: u8,
        last_error: Option<ErrorKind>,
    ) -> Self {
        Self {
            device,
            success: true,
            status,
            readings: Some(readings),
            raw_hex,
            attempts,
            last_error,
        }
    }

    pub fn failed(device: &'static str, attempts: u8, last_error: Option<ErrorKind>) -> Self {
        Self {
            device,
            success: false,
            status: String::new(),
            readings: None,
            raw_hex: String::new(),
            attempts,
            last_error,
        }
    }

    /// Every decoded quantity; empty for a failed sample.
    pub fn values(&self) -> Vec<(Field, f64)> {
        self.readings
            .as_ref()
            .map(Readings::values)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::{decode_registers, BLS_REGISTERS, BLS_TELEMETRY_BASE};
    use strum::IntoEnumIterator;

    fn soladin() -> SoladinReadings {
        SoladinReadings {
            status_bits: 0x200,
            volts_pv1: 61.3,
            current_pv1: 2.13,
            frequency_ac: 49.98,
            volts_ac1: 231.0,
            power_ac: 120.0,
            energy_total: 1234.56,
            temperature: 35.0,
            hrs_total: 100.0,
            max_power: 140.0,
            min_today: 60.0,
            energy_today: 1.0,
        }
    }

    #[test]
    fn bls_readings_from_full_block() {
        let payload: Vec<u8> = (0..31u16).flat_map(|w| w.to_be_bytes()).collect();
        let values = decode_registers(&BLS_REGISTERS, BLS_TELEMETRY_BASE, &payload).unwrap();
        let readings = BlsReadings::from_registers(&values).unwrap();
        // Word n holds n, register 0x0A + n.
        assert_eq!(readings.volts_pv1, 0.0);
        assert_eq!(readings.volts_pv2, 0.1);
        assert_eq!(readings.frequency_ac, 0.1);
        assert_eq!(readings.power_ac, (11.0 + 12.0) / 10.0);
        assert_eq!(readings.status2, 30.0);
        assert_eq!(readings.status_code(), 30);

        let fields: Vec<Field> = readings.values().iter().map(|(f, _)| *f).collect();
        for field in Field::iter().filter(|f| *f != Field::MaxPower) {
            assert!(fields.contains(&field), "{field} missing");
        }
    }

    #[test]
    fn bls_readings_missing_field() {
        // Only the first two registers.
        let values =
            decode_registers(&BLS_REGISTERS, BLS_TELEMETRY_BASE, &[0x00, 0x01, 0x00, 0x02])
                .unwrap();
        assert_eq!(
            BlsReadings::from_registers(&values),
            Err(DecodeError::MissingField {
                field: Field::CurrentPv1
            })
        );
    }

    #[test]
    fn soladin_values() {
        let readings = Readings::Soladin600(soladin());
        assert_eq!(readings.get(Field::Status2), Some(512.0));
        assert_eq!(readings.get(Field::Status1), Some(0.0));
        assert_eq!(readings.get(Field::MaxPower), Some(140.0));
        assert_eq!(readings.get(Field::VoltsPv2), None);
    }

    #[test]
    fn failed_sample_has_no_values() {
        let sample = TelemetrySample::failed("BLS3000", 3, Some(ErrorKind::NoResponse));
        assert!(!sample.success);
        assert!(sample.values().is_empty());
        assert!(sample.status.is_empty());
        assert_eq!(sample.attempts, 3);
    }

    #[test]
    fn succeeded_sample() {
        let sample = TelemetrySample::succeeded(
            "Soladin600",
            "Starting up".to_string(),
            Readings::Soladin600(soladin()),
            "00 $ 00 $ 00".to_string(),
            1,
            None,
        );
        assert!(sample.success);
        assert_eq!(sample.values().len(), 13);
    }
}
