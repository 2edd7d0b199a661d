//! One-shot device identification, used when first commissioning an inverter.
//!
//! Unlike [`poll`](crate::poll::poll) this makes a single pass and reports the first error.

use crate::{
    config::DeviceProfile,
    error::{DecodeError, Result},
    mastervolt::{self, SoladinCommand, HOST_ADDRESS, DISCOVERY_ADDRESS},
    modbus::{BlsCommand, BROADCAST_ADDRESS},
    transport::{format_hex, Transport, TransportHandle, DEFAULT_BUFFER_LEN, UNTIL_SILENT},
};

/// What an inverter says about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// The profile to poll this device with, carrying the address it answered from.
    pub profile: DeviceProfile,
    /// Bus address as hex, e.g. `02` or `11 00`.
    pub bus_address: String,
    pub serial_number: String,
    pub model: String,
    pub firmware_version: String,
    pub vendor: &'static str,
    pub rated_power: &'static str,
}

/// Identify the inverter family `profile` names. The configured address is ignored: the
/// device is found by a broadcast or discovery request first.
pub fn identify<S: Transport>(transport: S, profile: &DeviceProfile) -> Result<DeviceIdentity, S::Error> {
    let mut handle = TransportHandle::new(transport);
    let identity = match profile {
        DeviceProfile::Bls3000 { .. } => identify_bls(&mut handle)?,
        DeviceProfile::Soladin600 { source_address, .. } => {
            identify_soladin(&mut handle, *source_address)?
        }
    };
    log::info!(
        "Identified {} at {}: serial {}, model {}, firmware {}",
        identity.profile.name(),
        identity.bus_address,
        identity.serial_number,
        identity.model,
        identity.firmware_version
    );
    Ok(identity)
}

fn word(payload: &[u8], index: usize) -> core::result::Result<u16, DecodeError> {
    let start = index * 2;
    payload
        .get(start..start + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(DecodeError::PayloadTooShort {
            expected: start + 2,
            received: payload.len(),
        })
}

fn bls_read<S: Transport>(
    handle: &mut TransportHandle<S>,
    command: BlsCommand,
    slave_address: u8,
) -> Result<heapless::Vec<u8, DEFAULT_BUFFER_LEN>, S::Error> {
    let raw = handle.exchange::<DEFAULT_BUFFER_LEN>(
        &command.request(slave_address)?,
        command.spec().response_len(),
    )?;
    let payload = command.parse_reply(slave_address, &raw)?.payload;
    // The payload is a slice of `raw`, so it always fits.
    Ok(heapless::Vec::from_slice(payload).unwrap_or_default())
}

fn identify_bls<S: Transport>(handle: &mut TransportHandle<S>) -> Result<DeviceIdentity, S::Error> {
    let bus = bls_read(handle, BlsCommand::BusQuery, BROADCAST_ADDRESS)?;
    let slave_address = *bus.get(1).ok_or(DecodeError::PayloadTooShort {
        expected: 2,
        received: bus.len(),
    })?;
    log::info!("Using bus query response as slave address: {:02X}", slave_address);

    let serial = bls_read(handle, BlsCommand::SerialNumber, slave_address)?;
    let serial_number = format_hex(&serial).replace(' ', "");

    let model_version = bls_read(handle, BlsCommand::ModelVersion, slave_address)?;
    let model = f64::from(word(&model_version, 0)?) / 10.0;
    let firmware = f64::from(word(&model_version, 1)?) / 100.0;

    Ok(DeviceIdentity {
        profile: DeviceProfile::Bls3000 { slave_address },
        bus_address: format_hex(&[slave_address]),
        serial_number,
        model: format!("{model:.1}kW"),
        firmware_version: format!("{firmware:.2}"),
        vendor: "KLNE",
        rated_power: "3000W",
    })
}

fn soladin_read<S: Transport>(
    handle: &mut TransportHandle<S>,
    command: SoladinCommand,
    destination: mastervolt::Address,
    source: mastervolt::Address,
) -> Result<heapless::Vec<u8, DEFAULT_BUFFER_LEN>, S::Error> {
    handle.exchange::<DEFAULT_BUFFER_LEN>(&command.request(destination, source), UNTIL_SILENT)
}

fn identify_soladin<S: Transport>(
    handle: &mut TransportHandle<S>,
    source_address: mastervolt::Address,
) -> Result<DeviceIdentity, S::Error> {
    let raw = soladin_read(handle, SoladinCommand::Discover, DISCOVERY_ADDRESS, HOST_ADDRESS)?;
    let slave_address = mastervolt::parse_response(&raw, SoladinCommand::Discover.code())?.source;
    log::info!(
        "Using discovery response as slave address: {}",
        format_hex(&slave_address)
    );

    let raw = soladin_read(handle, SoladinCommand::Firmware, slave_address, source_address)?;
    let data = mastervolt::parse_response(&raw, SoladinCommand::Firmware.code())?.data;
    let byte = |index: usize| {
        data.get(index).copied().ok_or(DecodeError::PayloadTooShort {
            expected: index + 1,
            received: data.len(),
        })
    };
    // No serial number is exposed; the firmware id and date stand in for one.
    let firmware_id = format_hex(&[byte(11)?, byte(10)?]).replace(' ', "");
    let firmware_date = format_hex(&[byte(13)?, byte(12)?]).replace(' ', "");
    let serial_number = format!("{firmware_id}_{firmware_date}");

    Ok(DeviceIdentity {
        profile: DeviceProfile::Soladin600 {
            slave_address,
            source_address,
        },
        bus_address: format_hex(&slave_address),
        firmware_version: serial_number.clone(),
        serial_number,
        model: "600".to_string(),
        vendor: "Soladin",
        rated_power: "600W",
    })
}
