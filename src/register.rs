//! This module is used to define the register and byte-field maps of both inverter families,
//! and to decode payloads through them.

use strum::EnumCount;
use strum_macros::{Display, EnumCount as EnumCountMacro, EnumIter, IntoStaticStr};

use crate::error::DecodeError;

/// Every telemetry quantity either inverter reports.
///
/// The string form matches the column names the readings are persisted under.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr, EnumIter, EnumCountMacro,
)]
pub enum Field {
    /// Solar string 1 voltage, V.
    #[strum(to_string = "VoltsPV1")]
    VoltsPv1,
    /// Solar string 2 voltage, V.
    #[strum(to_string = "VoltsPV2")]
    VoltsPv2,
    /// Solar string 1 current, A.
    #[strum(to_string = "CurrentPV1")]
    CurrentPv1,
    /// Solar string 2 current, A.
    #[strum(to_string = "CurrentPV2")]
    CurrentPv2,
    /// Mains phase voltages, V.
    #[strum(to_string = "VoltsAC1")]
    VoltsAc1,
    #[strum(to_string = "VoltsAC2")]
    VoltsAc2,
    #[strum(to_string = "VoltsAC3")]
    VoltsAc3,
    /// Mains phase currents, A.
    #[strum(to_string = "CurrentAC1")]
    CurrentAc1,
    #[strum(to_string = "CurrentAC2")]
    CurrentAc2,
    #[strum(to_string = "CurrentAC3")]
    CurrentAc3,
    /// Mains frequency, Hz.
    #[strum(to_string = "FrequencyAC")]
    FrequencyAc,
    /// Delivered power, W.
    #[strum(to_string = "PowerAC")]
    PowerAc,
    /// Energy delivered today, kWh.
    EnergyToday,
    /// Lifetime energy delivered, kWh.
    EnergyTotal,
    /// Minutes in operation today.
    MinToday,
    /// Lifetime hours in operation.
    HrsTotal,
    /// Heatsink temperature, °C.
    Temperature,
    #[strum(to_string = "Iac-Shift")]
    IacShift,
    /// DC injection, mA.
    #[strum(to_string = "DCI")]
    Dci,
    Status1,
    Status2,
    /// Highest power delivered today, W.
    MaxPower,
}

/// How a register contributes to a [`Field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Register slot with no known meaning; skipped.
    Blank,
    /// A complete value, or the first word of a two-register value.
    Simple(Field),
    /// Second word of a two-register value, folded into the field's first word.
    ContinuationOf(Field),
}

/// One slot in a Modbus-style register table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub register: u16,
    pub kind: FieldKind,
    /// Raw values are divided by this to get engineering units.
    pub scale: u16,
}

impl FieldSpec {
    const fn simple(register: u16, field: Field, scale: u16) -> Self {
        Self {
            register,
            kind: FieldKind::Simple(field),
            scale,
        }
    }

    const fn continuation(register: u16, field: Field, scale: u16) -> Self {
        Self {
            register,
            kind: FieldKind::ContinuationOf(field),
            scale,
        }
    }

    const fn blank(register: u16) -> Self {
        Self {
            register,
            kind: FieldKind::Blank,
            scale: 1,
        }
    }
}

/// First input register of the BLS3000 telemetry block.
pub const BLS_TELEMETRY_BASE: u16 = 0x0A;

/// __R__ - BLS3000 input registers `0x0A` - `0x28`, in register order.
pub static BLS_REGISTERS: [FieldSpec; 31] = [
    FieldSpec::simple(0x0A, Field::VoltsPv1, 10),
    FieldSpec::simple(0x0B, Field::VoltsPv2, 10),
    FieldSpec::simple(0x0C, Field::CurrentPv1, 10),
    FieldSpec::simple(0x0D, Field::CurrentPv2, 10),
    FieldSpec::simple(0x0E, Field::VoltsAc1, 10),
    FieldSpec::simple(0x0F, Field::VoltsAc2, 10),
    FieldSpec::simple(0x10, Field::VoltsAc3, 10),
    FieldSpec::simple(0x11, Field::CurrentAc1, 10),
    FieldSpec::simple(0x12, Field::CurrentAc2, 10),
    FieldSpec::simple(0x13, Field::CurrentAc3, 10),
    FieldSpec::simple(0x14, Field::FrequencyAc, 100),
    FieldSpec::simple(0x15, Field::PowerAc, 10),
    FieldSpec::continuation(0x16, Field::PowerAc, 10),
    FieldSpec::simple(0x17, Field::EnergyToday, 10),
    FieldSpec::simple(0x18, Field::EnergyTotal, 10),
    FieldSpec::continuation(0x19, Field::EnergyTotal, 10),
    FieldSpec::simple(0x1A, Field::MinToday, 1),
    FieldSpec::continuation(0x1B, Field::MinToday, 1),
    FieldSpec::simple(0x1C, Field::HrsTotal, 1),
    FieldSpec::continuation(0x1D, Field::HrsTotal, 1),
    FieldSpec::simple(0x1E, Field::Temperature, 10),
    FieldSpec::simple(0x1F, Field::IacShift, 1),
    FieldSpec::blank(0x20),
    FieldSpec::blank(0x21),
    FieldSpec::simple(0x22, Field::Dci, 1),
    FieldSpec::blank(0x23),
    FieldSpec::blank(0x24),
    FieldSpec::blank(0x25),
    FieldSpec::blank(0x26),
    FieldSpec::simple(0x27, Field::Status1, 1),
    FieldSpec::simple(0x28, Field::Status2, 1),
];

/// Look up the table entry for `register`.
pub fn field_spec(table: &[FieldSpec], register: u16) -> Option<&FieldSpec> {
    table.iter().find(|spec| spec.register == register)
}

/// Values decoded from a register block, indexed by [`Field`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterValues {
    /// Accumulated raw register sums; kept unscaled so that continuations stay exact.
    raw: [Option<(u32, u16)>; Field::COUNT],
}

impl Default for RegisterValues {
    fn default() -> Self {
        Self {
            raw: [None; Field::COUNT],
        }
    }
}

impl RegisterValues {
    /// Scaled value of `field`, if it was decoded.
    pub fn get(&self, field: Field) -> Option<f64> {
        self.raw[field as usize].map(|(raw, scale)| f64::from(raw) / f64::from(scale))
    }

    /// Raw (unscaled) value of `field`, if it was decoded.
    pub fn raw(&self, field: Field) -> Option<u32> {
        self.raw[field as usize].map(|(raw, _)| raw)
    }

    /// Scaled value of `field`, or a [`DecodeError::MissingField`].
    pub fn require(&self, field: Field) -> Result<f64, DecodeError> {
        self.get(field).ok_or(DecodeError::MissingField { field })
    }

    fn set(&mut self, field: Field, raw: u32, scale: u16) {
        self.raw[field as usize] = Some((raw, scale));
    }

    /// Fold a continuation word into an already decoded field.
    ///
    /// With `v` the field's current scaled value this computes `(v * scale + word) / scale`,
    /// done on the raw sum so no precision is lost.
    fn extend(&mut self, field: Field, word: u16) -> Result<(), DecodeError> {
        match &mut self.raw[field as usize] {
            Some((raw, _)) => {
                *raw += u32::from(word);
                Ok(())
            }
            None => Err(DecodeError::OrphanContinuation { field }),
        }
    }
}

/// Decode a Modbus-style register payload starting at register `base`.
///
/// Each big-endian 16-bit word is mapped through `table`. Blank entries are skipped and a
/// continuation entry is folded into its field's earlier word.
pub fn decode_registers(
    table: &[FieldSpec],
    base: u16,
    payload: &[u8],
) -> Result<RegisterValues, DecodeError> {
    if payload.len() % 2 != 0 {
        return Err(DecodeError::OddPayloadLength { len: payload.len() });
    }

    let mut values = RegisterValues::default();
    for (offset, word) in payload.chunks_exact(2).enumerate() {
        let register = base.wrapping_add(offset as u16);
        let word = u16::from_be_bytes([word[0], word[1]]);
        let spec = field_spec(table, register).ok_or(DecodeError::UnmappedRegister { register })?;
        match spec.kind {
            FieldKind::Blank => {}
            FieldKind::Simple(field) => values.set(field, u32::from(word), spec.scale),
            FieldKind::ContinuationOf(field) => values.extend(field, word)?,
        }
    }
    Ok(values)
}

/// Scaling applied to a raw Soladin byte field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Divide(u32),
    Multiply(u32),
}

impl Scale {
    pub fn apply(&self, raw: u32) -> f64 {
        match *self {
            Scale::Divide(divisor) => f64::from(raw) / f64::from(divisor),
            Scale::Multiply(factor) => f64::from(raw) * f64::from(factor),
        }
    }
}

/// A little-endian integer of 1 to 3 bytes at a fixed offset in a Soladin data payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteField {
    pub field: Field,
    pub offset: usize,
    pub width: usize,
    pub scale: Scale,
}

impl ByteField {
    const fn new(field: Field, offset: usize, width: usize, scale: Scale) -> Self {
        Self {
            field,
            offset,
            width,
            scale,
        }
    }

    /// Unscaled value, or `None` when the payload does not reach this field.
    pub fn raw(&self, data: &[u8]) -> Option<u32> {
        data.get(self.offset..self.offset + self.width)
            .map(little_endian)
    }

    /// Scaled value, or `None` when the payload does not reach this field.
    pub fn decode(&self, data: &[u8]) -> Option<f64> {
        self.raw(data).map(|raw| self.scale.apply(raw))
    }

    const fn end(&self) -> usize {
        self.offset + self.width
    }
}

/// Unsigned little-endian value of up to 4 bytes: byte `i` has weight `256^i`.
pub fn little_endian(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .rev()
        .fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}

/// Status bitmask in the Soladin stats payload.
pub const SOLADIN_STATUS: ByteField = ByteField::new(Field::Status2, 1, 2, Scale::Divide(1));

/// Telemetry in the Soladin stats payload (`B6`).
pub static SOLADIN_STATS: [ByteField; 8] = [
    ByteField::new(Field::VoltsPv1, 3, 2, Scale::Divide(10)),
    ByteField::new(Field::CurrentPv1, 5, 2, Scale::Divide(100)),
    ByteField::new(Field::FrequencyAc, 7, 2, Scale::Divide(100)),
    ByteField::new(Field::VoltsAc1, 9, 2, Scale::Divide(1)),
    ByteField::new(Field::PowerAc, 13, 2, Scale::Divide(1)),
    ByteField::new(Field::EnergyTotal, 15, 3, Scale::Divide(100)),
    ByteField::new(Field::Temperature, 18, 1, Scale::Divide(1)),
    // Minutes on the wire, hours once scaled.
    ByteField::new(Field::HrsTotal, 19, 3, Scale::Divide(60)),
];

/// Today's peak power in the Soladin max-power payload (`B9`).
pub static SOLADIN_MAX_POWER: [ByteField; 1] =
    [ByteField::new(Field::MaxPower, 19, 2, Scale::Divide(1))];

/// Today's totals in the Soladin history payload (`9A`).
pub static SOLADIN_HISTORY: [ByteField; 2] = [
    // Counted in 5 minute steps.
    ByteField::new(Field::MinToday, 0, 1, Scale::Multiply(5)),
    ByteField::new(Field::EnergyToday, 1, 1, Scale::Divide(100)),
];

/// Minimum payload length needed to decode every entry in `fields`.
pub fn required_len(fields: &[ByteField]) -> usize {
    fields.iter().map(ByteField::end).max().unwrap_or(0)
}

/// Decode `fields` out of `data` into `values`.
///
/// Fails without touching `values` if `data` is too short for any of them.
pub fn decode_bytes(
    fields: &[ByteField],
    data: &[u8],
    values: &mut [Option<f64>; Field::COUNT],
) -> Result<(), DecodeError> {
    let expected = required_len(fields);
    if data.len() < expected {
        return Err(DecodeError::PayloadTooShort {
            expected,
            received: data.len(),
        });
    }
    for spec in fields {
        values[spec.field as usize] = spec.decode(data);
    }
    Ok(())
}
