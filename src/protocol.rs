//! Record layouts of the Danfoss Eco radiator valve.
//!
//! Each property the valve exposes is a fixed size record. All of them except
//! the battery level are obfuscated with [`Xxtea`] and the per-word byte flip
//! from [`crate::wire`].
//!
//! | Record      | Bytes | Layout                                                              |
//! |-------------|-------|---------------------------------------------------------------------|
//! | Temperature | 8     | `target*2, room*2, pad x6`                                          |
//! | Settings    | 16    | `flags, min*2, max*2, frost*2, mode, vacation*2, from:u32be, to:u32be, pad x2` |
//! | Errors      | 8     | `errors:u16be, pad x6`                                              |
//! | Battery     | 1     | `percent` (plain)                                                   |

use crate::error::{DecodeError, EncodeError};
use crate::wire;
use crate::xxtea::Xxtea;
use std::fmt;
use std::ops::RangeInclusive;

/// Plausible range for configured temperatures in °C.
pub const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=50.0;
/// Plausible range for the measured room temperature in °C.
pub const ROOM_TEMPERATURE_RANGE: RangeInclusive<f32> = -20.0..=60.0;
pub const BATTERY_LEVEL_MAX: u8 = 100;

/// Identifies a property, and with it the record the link has to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PropertyKind {
    Temperature,
    Settings,
    Errors,
    Battery,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyKind::Temperature => "temperature",
            PropertyKind::Settings => "settings",
            PropertyKind::Errors => "errors",
            PropertyKind::Battery => "battery",
        };
        f.write_str(name)
    }
}

/// A typed view over one record read from the valve.
pub trait Record: Sized + Clone + fmt::Debug + Send + 'static {
    const KIND: PropertyKind;
    /// Record length in bytes.
    const LEN: usize;

    /// Decodes a record exactly as it arrived from the link.
    fn decode(cipher: &Xxtea, raw: &[u8]) -> Result<Self, DecodeError>;
}

/// A record that can be written back to the valve.
pub trait WritableRecord: Record {
    /// Serializes and encrypts the record, ready for the link.
    fn encode(&self, cipher: &Xxtea) -> Result<Vec<u8>, EncodeError>;
}

fn check_len(kind: PropertyKind, expected: usize, raw: &[u8]) -> Result<(), DecodeError> {
    if raw.len() < expected {
        return Err(DecodeError::Truncated {
            expected,
            actual: raw.len(),
        });
    }
    if raw.len() > expected {
        log::warn!(
            "{kind} record has {} bytes, ignoring everything after {expected}",
            raw.len()
        );
    }
    Ok(())
}

fn decrypt<const N: usize>(
    kind: PropertyKind,
    cipher: &Xxtea,
    raw: &[u8],
) -> Result<[u8; N], DecodeError> {
    check_len(kind, N, raw)?;
    let mut plain = [0u8; N];
    plain.copy_from_slice(&raw[..N]);
    wire::decrypt_record(cipher, &mut plain)?;
    Ok(plain)
}

/// Converts a half degree byte into °C.
pub fn half_degree_decode(value: u8) -> f32 {
    value as f32 / 2.0
}

/// Converts °C into a half degree byte, rounding to the nearest half degree.
pub fn half_degree_encode(
    field: &'static str,
    value: f32,
    range: &RangeInclusive<f32>,
) -> Result<u8, EncodeError> {
    let scaled = (value * 2.0).round();
    if !range.contains(&value) || !(0.0..=u8::MAX as f32).contains(&scaled) {
        return Err(EncodeError::OutOfRange { field, value });
    }
    Ok(scaled as u8)
}

fn checked(
    field: &'static str,
    value: f32,
    range: &RangeInclusive<f32>,
) -> Result<f32, DecodeError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(DecodeError::OutOfRange { field, value })
    }
}

fn bit(value: u16, pos: u8) -> bool {
    value & (1 << pos) != 0
}

fn set_bit(value: &mut u8, pos: u8, state: bool) {
    if state {
        *value |= 1 << pos;
    } else {
        *value &= !(1 << pos);
    }
}

/// Target and measured room temperature.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Temperature {
    pub target_temperature: f32,
    pub room_temperature: f32,
}

impl Record for Temperature {
    const KIND: PropertyKind = PropertyKind::Temperature;
    const LEN: usize = 8;

    fn decode(cipher: &Xxtea, raw: &[u8]) -> Result<Self, DecodeError> {
        let plain: [u8; 8] = decrypt(Self::KIND, cipher, raw)?;
        let target = half_degree_decode(plain[0]);
        let room = half_degree_decode(plain[1]);
        log::trace!(
            "TEMP BYTES: {:02x} {:02x} -> target={target:.1} room={room:.1}",
            plain[0],
            plain[1]
        );
        Ok(Self {
            target_temperature: checked("target temperature", target, &TEMPERATURE_RANGE)?,
            room_temperature: checked("room temperature", room, &ROOM_TEMPERATURE_RANGE)?,
        })
    }
}

impl WritableRecord for Temperature {
    fn encode(&self, cipher: &Xxtea) -> Result<Vec<u8>, EncodeError> {
        let mut buf = vec![0u8; Self::LEN];
        buf[0] = half_degree_encode(
            "target temperature",
            self.target_temperature,
            &TEMPERATURE_RANGE,
        )?;
        buf[1] = half_degree_encode(
            "room temperature",
            self.room_temperature,
            &ROOM_TEMPERATURE_RANGE,
        )?;
        wire::encrypt_record(cipher, &mut buf)?;
        Ok(buf)
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "target {:.1} °C, room {:.1} °C",
            self.target_temperature, self.room_temperature
        )
    }
}

/// Schedule mode as stored by the valve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DeviceMode {
    Manual = 0,
    Scheduled = 1,
    Vacation = 3,
    Hold = 5,
}

impl TryFrom<u8> for DeviceMode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DeviceMode::Manual),
            1 => Ok(DeviceMode::Scheduled),
            3 => Ok(DeviceMode::Vacation),
            5 => Ok(DeviceMode::Hold),
            _ => Err(DecodeError::UnknownMode(value)),
        }
    }
}

impl DeviceMode {
    pub fn climate_mode(self) -> ClimateMode {
        match self {
            DeviceMode::Manual | DeviceMode::Hold => ClimateMode::Heat,
            DeviceMode::Scheduled | DeviceMode::Vacation => ClimateMode::Auto,
        }
    }

    /// Picks the wire mode for `mode`, keeping `previous` while it still
    /// matches so Vacation and Hold survive a round trip.
    pub fn resolve(mode: ClimateMode, previous: DeviceMode) -> DeviceMode {
        if previous.climate_mode() == mode {
            return previous;
        }
        match mode {
            ClimateMode::Heat => DeviceMode::Manual,
            ClimateMode::Auto => DeviceMode::Scheduled,
        }
    }
}

/// The two modes the valve is controlled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClimateMode {
    /// Keep the target temperature.
    Heat,
    /// Follow the schedule on the valve.
    Auto,
}

const ADAPTABLE_REGULATION_BIT: u8 = 0;
const VERTICAL_INSTALLATION_BIT: u8 = 2;
const DISPLAY_FLIP_BIT: u8 = 3;
const SLOW_REGULATION_BIT: u8 = 4;
const VALVE_INSTALLED_BIT: u8 = 6;
const LOCK_CONTROL_BIT: u8 = 7;

/// Valve configuration.
///
/// Keeps a copy of the plain record it was decoded from. Encoding patches the
/// known fields into that copy, so reserved bytes and unknown flag bits reach
/// the valve unchanged.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Settings {
    pub adaptable_regulation: bool,
    pub vertical_installation: bool,
    pub display_flip: bool,
    pub slow_regulation: bool,
    pub valve_installed: bool,
    pub lock_control: bool,
    pub temperature_min: f32,
    pub temperature_max: f32,
    pub frost_protection_temperature: f32,
    pub vacation_temperature: f32,
    pub device_mode: ClimateMode,
    /// Start of a planned vacation, UNIX seconds UTC.
    pub vacation_from: u32,
    /// End of a planned vacation, UNIX seconds UTC.
    pub vacation_to: u32,
    wire_mode: DeviceMode,
    raw: [u8; 16],
}

impl Settings {
    /// Builds settings from an already decrypted record.
    pub fn from_plain(plain: [u8; 16]) -> Result<Self, DecodeError> {
        let flags = plain[0] as u16;
        let wire_mode = DeviceMode::try_from(plain[4])?;

        let temperature_min = checked(
            "minimum temperature",
            half_degree_decode(plain[1]),
            &TEMPERATURE_RANGE,
        )?;
        let temperature_max = checked(
            "maximum temperature",
            half_degree_decode(plain[2]),
            &TEMPERATURE_RANGE,
        )?;
        if temperature_min >= temperature_max {
            return Err(DecodeError::InvalidRange {
                min: temperature_min,
                max: temperature_max,
            });
        }

        let settings = Self {
            adaptable_regulation: bit(flags, ADAPTABLE_REGULATION_BIT),
            vertical_installation: bit(flags, VERTICAL_INSTALLATION_BIT),
            display_flip: bit(flags, DISPLAY_FLIP_BIT),
            slow_regulation: bit(flags, SLOW_REGULATION_BIT),
            valve_installed: bit(flags, VALVE_INSTALLED_BIT),
            lock_control: bit(flags, LOCK_CONTROL_BIT),
            temperature_min,
            temperature_max,
            frost_protection_temperature: checked(
                "frost protection temperature",
                half_degree_decode(plain[3]),
                &TEMPERATURE_RANGE,
            )?,
            vacation_temperature: checked(
                "vacation temperature",
                half_degree_decode(plain[5]),
                &TEMPERATURE_RANGE,
            )?,
            device_mode: wire_mode.climate_mode(),
            vacation_from: u32::from_be_bytes([plain[6], plain[7], plain[8], plain[9]]),
            vacation_to: u32::from_be_bytes([plain[10], plain[11], plain[12], plain[13]]),
            wire_mode,
            raw: plain,
        };
        log::trace!("PARSED SETTINGS: {settings:?}");
        Ok(settings)
    }

    /// Serializes into plain record bytes without encrypting.
    pub fn to_plain(&self) -> Result<[u8; 16], EncodeError> {
        if self.temperature_min >= self.temperature_max {
            return Err(EncodeError::InvalidRange {
                min: self.temperature_min,
                max: self.temperature_max,
            });
        }

        let mut buf = self.raw;
        let flags = &mut buf[0];
        set_bit(flags, ADAPTABLE_REGULATION_BIT, self.adaptable_regulation);
        set_bit(flags, VERTICAL_INSTALLATION_BIT, self.vertical_installation);
        set_bit(flags, DISPLAY_FLIP_BIT, self.display_flip);
        set_bit(flags, SLOW_REGULATION_BIT, self.slow_regulation);
        set_bit(flags, VALVE_INSTALLED_BIT, self.valve_installed);
        set_bit(flags, LOCK_CONTROL_BIT, self.lock_control);

        buf[1] = half_degree_encode(
            "minimum temperature",
            self.temperature_min,
            &TEMPERATURE_RANGE,
        )?;
        buf[2] = half_degree_encode(
            "maximum temperature",
            self.temperature_max,
            &TEMPERATURE_RANGE,
        )?;
        buf[3] = half_degree_encode(
            "frost protection temperature",
            self.frost_protection_temperature,
            &TEMPERATURE_RANGE,
        )?;
        buf[4] = self.wire_mode() as u8;
        buf[5] = half_degree_encode(
            "vacation temperature",
            self.vacation_temperature,
            &TEMPERATURE_RANGE,
        )?;
        buf[6..10].copy_from_slice(&self.vacation_from.to_be_bytes());
        buf[10..14].copy_from_slice(&self.vacation_to.to_be_bytes());
        Ok(buf)
    }

    /// The schedule mode that will be written, derived from `device_mode`.
    pub fn wire_mode(&self) -> DeviceMode {
        DeviceMode::resolve(self.device_mode, self.wire_mode)
    }

    /// Selects a specific schedule mode, e.g. [`DeviceMode::Vacation`].
    pub fn set_wire_mode(&mut self, mode: DeviceMode) {
        self.wire_mode = mode;
        self.device_mode = mode.climate_mode();
    }

    /// The plain record these settings were decoded from.
    pub fn raw(&self) -> &[u8; 16] {
        &self.raw
    }
}

impl Record for Settings {
    const KIND: PropertyKind = PropertyKind::Settings;
    const LEN: usize = 16;

    fn decode(cipher: &Xxtea, raw: &[u8]) -> Result<Self, DecodeError> {
        Self::from_plain(decrypt(Self::KIND, cipher, raw)?)
    }
}

impl WritableRecord for Settings {
    fn encode(&self, cipher: &Xxtea) -> Result<Vec<u8>, EncodeError> {
        let mut buf = self.to_plain()?;
        log::trace!("SETTINGS PACK: {}", hex::encode(buf));
        wire::encrypt_record(cipher, &mut buf)?;
        Ok(buf.to_vec())
    }
}

const VALVE_DOES_NOT_CLOSE_BIT: u8 = 8;
const INVALID_TIME_BIT: u8 = 9;
const LOW_BATTERY_BIT: u8 = 13;
const VERY_LOW_BATTERY_BIT: u8 = 14;

/// Fault flags reported by the valve. Read only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Errors {
    /// E9
    pub valve_does_not_close: bool,
    /// E10
    pub invalid_time: bool,
    /// E14
    pub low_battery: bool,
    /// E15
    pub very_low_battery: bool,
}

impl Errors {
    pub fn from_bits(errors: u16) -> Self {
        Self {
            valve_does_not_close: bit(errors, VALVE_DOES_NOT_CLOSE_BIT),
            invalid_time: bit(errors, INVALID_TIME_BIT),
            low_battery: bit(errors, LOW_BATTERY_BIT),
            very_low_battery: bit(errors, VERY_LOW_BATTERY_BIT),
        }
    }

    /// Whether the valve reports any problem.
    pub fn any(&self) -> bool {
        self.valve_does_not_close || self.invalid_time || self.low_battery || self.very_low_battery
    }
}

impl Record for Errors {
    const KIND: PropertyKind = PropertyKind::Errors;
    const LEN: usize = 8;

    fn decode(cipher: &Xxtea, raw: &[u8]) -> Result<Self, DecodeError> {
        let plain: [u8; 8] = decrypt(Self::KIND, cipher, raw)?;
        Ok(Self::from_bits(u16::from_be_bytes([plain[0], plain[1]])))
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<&str> = [
            (self.valve_does_not_close, "E9 valve does not close"),
            (self.invalid_time, "E10 invalid time"),
            (self.low_battery, "E14 low battery"),
            (self.very_low_battery, "E15 very low battery"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect();
        if codes.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&codes.join(", "))
        }
    }
}

/// Battery charge in percent, read from the standard battery service.
///
/// This record is not encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatteryLevel(u8);

impl BatteryLevel {
    pub fn new(percent: u8) -> Option<Self> {
        (percent <= BATTERY_LEVEL_MAX).then_some(Self(percent))
    }
}

impl std::ops::Deref for BatteryLevel {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Record for BatteryLevel {
    const KIND: PropertyKind = PropertyKind::Battery;
    const LEN: usize = 1;

    fn decode(_cipher: &Xxtea, raw: &[u8]) -> Result<Self, DecodeError> {
        check_len(Self::KIND, Self::LEN, raw)?;
        Self::new(raw[0]).ok_or(DecodeError::OutOfRange {
            field: "battery level",
            value: raw[0] as f32,
        })
    }
}

impl fmt::Display for BatteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}
