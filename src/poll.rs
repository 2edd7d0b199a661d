//! The polling state machine.
//!
//! A poll cycle runs `Idle → Sending → AwaitingResponse → Decoding` once per exchange and
//! ends in `Success` or `Failed`, passing through `Retrying` after every failed attempt that
//! still has budget left. A Soladin attempt is three exchanges (stats, max-power, history);
//! any of them failing throws away the whole attempt.

use std::time::Duration;

use strum::EnumCount;
use strum_macros::Display;

use crate::{
    config::{DeviceProfile, RetryPolicy},
    error::{DecodeError, ErrorKind, Result},
    mastervolt::{self, Address, SoladinCommand},
    modbus::BlsCommand,
    register::{
        decode_bytes, decode_registers, ByteField, Field, BLS_REGISTERS, BLS_TELEMETRY_BASE,
        SOLADIN_HISTORY, SOLADIN_MAX_POWER, SOLADIN_STATS, SOLADIN_STATUS,
    },
    sample::{BlsReadings, Readings, SoladinReadings, TelemetrySample},
    status::{classify_bls, classify_soladin},
    transport::{format_hex, Transport, TransportHandle, DEFAULT_BUFFER_LEN, UNTIL_SILENT},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PollState {
    Idle,
    Sending,
    AwaitingResponse,
    Decoding,
    Retrying,
    Success,
    Failed,
}

/// Retry budget of a single poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// Attempts still allowed.
    pub remaining: u8,
    pub last_error: Option<ErrorKind>,
}

impl RetryState {
    pub fn new(attempts: u8) -> Self {
        Self {
            remaining: attempts,
            last_error: None,
        }
    }

    /// Record a failed attempt. Returns whether another attempt may be made.
    ///
    /// A non-retryable error ends the cycle without spending budget.
    pub fn record(&mut self, kind: ErrorKind) -> bool {
        self.last_error = Some(kind);
        if !kind.is_retryable() {
            return false;
        }
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining > 0
    }
}

/// What a successful attempt produced.
struct Decoded {
    readings: Readings,
    status: String,
    raw_hex: String,
}

/// Poll `profile` once over `transport`, retrying per `policy`.
///
/// Never fails: every outcome, including a missing transport, is reported as a
/// [`TelemetrySample`]. The transport is closed before this returns.
pub fn poll<S: Transport>(
    transport: Option<S>,
    profile: &DeviceProfile,
    policy: &RetryPolicy,
) -> TelemetrySample {
    let Some(transport) = transport else {
        log::error!(
            "No serial port available for {}, aborting data query",
            profile.name()
        );
        return TelemetrySample::failed(profile.name(), 0, Some(ErrorKind::NoTransport));
    };
    Poller::<S, DEFAULT_BUFFER_LEN>::new(transport, *profile, *policy).run()
}

/// One poll cycle in progress. `L` is the receive buffer capacity.
pub struct Poller<S: Transport, const L: usize = DEFAULT_BUFFER_LEN> {
    handle: TransportHandle<S>,
    profile: DeviceProfile,
    policy: RetryPolicy,
    state: PollState,
    retry: RetryState,
    attempts: u8,
}

impl<S: Transport, const L: usize> Poller<S, L> {
    pub fn new(transport: S, profile: DeviceProfile, policy: RetryPolicy) -> Self {
        Self {
            handle: TransportHandle::new(transport),
            profile,
            policy,
            state: PollState::Idle,
            retry: RetryState::new(policy.attempts),
            attempts: 0,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn retry_state(&self) -> RetryState {
        self.retry
    }

    /// Drive the cycle to `Success` or `Failed`. Dropping the poller closes the transport.
    pub fn run(mut self) -> TelemetrySample {
        let device = self.profile.name();
        while self.retry.remaining > 0 {
            self.attempts += 1;
            let profile = self.profile;
            let result = match profile {
                DeviceProfile::Bls3000 { slave_address } => self.attempt_bls(slave_address),
                DeviceProfile::Soladin600 {
                    slave_address,
                    source_address,
                } => self.attempt_soladin(slave_address, source_address),
            };

            match result {
                Ok(decoded) => {
                    self.transition(PollState::Success);
                    log::info!(
                        "{} in state '{}' after {} attempt(s): {}",
                        device,
                        decoded.status,
                        self.attempts,
                        decoded.raw_hex
                    );
                    return TelemetrySample::succeeded(
                        device,
                        decoded.status,
                        decoded.readings,
                        decoded.raw_hex,
                        self.attempts,
                        self.retry.last_error,
                    );
                }
                Err(err) => {
                    let kind = err.kind();
                    if !self.retry.record(kind) {
                        break;
                    }
                    self.transition(PollState::Retrying);
                    log::warn!(
                        "{} attempt {} failed ({}); retries left: {}",
                        device,
                        self.attempts,
                        err,
                        self.retry.remaining
                    );
                    self.backoff(kind);
                }
            }
        }

        self.transition(PollState::Failed);
        log::error!(
            "{} poll failed after {} attempt(s), last error: {:?}",
            device,
            self.attempts,
            self.retry.last_error
        );
        TelemetrySample::failed(device, self.attempts, self.retry.last_error)
    }

    fn transition(&mut self, next: PollState) {
        log::debug!("{} -> {}", self.state, next);
        self.state = next;
    }

    fn backoff(&self, kind: ErrorKind) {
        let millis = self.policy.backoff_for(kind).to_millis();
        if millis > 0 {
            std::thread::sleep(Duration::from_millis(u64::from(millis)));
        }
    }

    /// Send one request and collect its reply.
    fn exchange(&mut self, request: &[u8], expected: usize) -> Result<heapless::Vec<u8, L>, S::Error> {
        self.transition(PollState::Sending);
        self.handle.send(request)?;
        self.transition(PollState::AwaitingResponse);
        let raw = self.handle.receive::<L>(expected)?;
        self.transition(PollState::Decoding);
        Ok(raw)
    }

    fn attempt_bls(&mut self, slave_address: u8) -> Result<Decoded, S::Error> {
        let command = BlsCommand::Telemetry;
        let raw = self.exchange(
            &command.request(slave_address)?,
            command.spec().response_len(),
        )?;
        // A valid frame holding fewer registers than requested is Incomplete, and retried.
        let response = command.parse_reply(slave_address, &raw)?;
        let values = decode_registers(&BLS_REGISTERS, BLS_TELEMETRY_BASE, response.payload)?;
        let readings = BlsReadings::from_registers(&values)?;
        Ok(Decoded {
            status: classify_bls(readings.status_code()),
            readings: Readings::Bls3000(readings),
            raw_hex: format_hex(response.payload),
        })
    }

    /// Exchange `command` and decode `fields` out of its data. Returns the data as hex.
    fn soladin_exchange(
        &mut self,
        destination: Address,
        source: Address,
        command: SoladinCommand,
        fields: &[ByteField],
        values: &mut [Option<f64>; Field::COUNT],
        status_bits: Option<&mut u16>,
    ) -> Result<String, S::Error> {
        let raw = self.exchange(&command.request(destination, source), UNTIL_SILENT)?;
        let response = mastervolt::parse_response(&raw, command.code())?;
        decode_bytes(fields, response.data, values)?;
        if let Some(bits) = status_bits {
            *bits = SOLADIN_STATUS
                .raw(response.data)
                .ok_or(DecodeError::PayloadTooShort {
                    expected: SOLADIN_STATUS.offset + SOLADIN_STATUS.width,
                    received: response.data.len(),
                })? as u16;
        }
        Ok(format_hex(response.data))
    }

    fn attempt_soladin(&mut self, destination: Address, source: Address) -> Result<Decoded, S::Error> {
        let mut values = [None; Field::COUNT];
        let mut status_bits = 0u16;

        let stats = self.soladin_exchange(
            destination,
            source,
            SoladinCommand::Stats,
            &SOLADIN_STATS,
            &mut values,
            Some(&mut status_bits),
        )?;
        let max_power = self.soladin_exchange(
            destination,
            source,
            SoladinCommand::MaxPower,
            &SOLADIN_MAX_POWER,
            &mut values,
            None,
        )?;
        let history = self.soladin_exchange(
            destination,
            source,
            SoladinCommand::History,
            &SOLADIN_HISTORY,
            &mut values,
            None,
        )?;

        let take = |field: Field| -> core::result::Result<f64, DecodeError> {
            values[field as usize].ok_or(DecodeError::MissingField { field })
        };
        let readings = SoladinReadings {
            status_bits,
            volts_pv1: take(Field::VoltsPv1)?,
            current_pv1: take(Field::CurrentPv1)?,
            frequency_ac: take(Field::FrequencyAc)?,
            volts_ac1: take(Field::VoltsAc1)?,
            power_ac: take(Field::PowerAc)?,
            energy_total: take(Field::EnergyTotal)?,
            temperature: take(Field::Temperature)?,
            hrs_total: take(Field::HrsTotal)?,
            max_power: take(Field::MaxPower)?,
            min_today: take(Field::MinToday)?,
            energy_today: take(Field::EnergyToday)?,
        };

        Ok(Decoded {
            status: classify_soladin(status_bits),
            readings: Readings::Soladin600(readings),
            raw_hex: [stats, max_power, history].join(" $ "),
        })
    }
}
