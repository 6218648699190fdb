use crate::config::Config;
use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use danfoss_eco_lib::{protocol as proto, xxtea::Key};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

fn parse_key(s: &str) -> Result<Key, String> {
    s.parse::<Key>().map_err(|e| e.to_string())
}

/// A raw record given as hex string on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord(pub Vec<u8>);

fn parse_record(s: &str) -> Result<HexRecord, String> {
    let cleaned: String = s.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    hex::decode(&cleaned)
        .map(HexRecord)
        .map_err(|e| format!("Invalid hex record: {e}"))
}

fn parse_celsius(
    s: &str,
    field: &'static str,
    range: &RangeInclusive<f32>,
) -> Result<f32, String> {
    let value = s
        .parse::<f32>()
        .map_err(|e| format!("Invalid temperature value format: {e}"))?;
    proto::half_degree_encode(field, value, range)
        .map(|_| value)
        .map_err(|e| e.to_string())
}

/// A measured room temperature.
fn parse_room_celsius(s: &str) -> Result<f32, String> {
    parse_celsius(s, "room temperature", &proto::ROOM_TEMPERATURE_RANGE)
}

/// A temperature the valve regulates to.
fn parse_setpoint_celsius(s: &str) -> Result<f32, String> {
    parse_celsius(s, "set temperature", &proto::TEMPERATURE_RANGE)
}

fn parse_timestamp(s: &str) -> Result<u32, String> {
    clap_num::maybe_hex::<u32>(s).map_err(|e| format!("Invalid UNIX timestamp: {e}"))
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Temperature,
    Settings,
    Errors,
    Battery,
}

impl From<RecordKind> for proto::PropertyKind {
    fn from(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Temperature => proto::PropertyKind::Temperature,
            RecordKind::Settings => proto::PropertyKind::Settings,
            RecordKind::Errors => proto::PropertyKind::Errors,
            RecordKind::Battery => proto::PropertyKind::Battery,
        }
    }
}

/// Device modes accepted on the command line.
/// `heat` and `auto` keep a vacation or hold mode where it still applies.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliMode {
    Heat,
    Auto,
    Manual,
    Scheduled,
    Vacation,
    Hold,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Decode a record exactly as it was read from the valve and print its values.
    Decode {
        /// The kind of record.
        #[arg(value_enum)]
        kind: RecordKind,
        /// The raw record as hex string, e.g. "a1b2c3d4e5f60718".
        #[arg(value_parser = parse_record)]
        record: HexRecord,
    },

    /// Encode a temperature record ready to be written to the valve.
    EncodeTemperature {
        /// Target temperature in °C, rounded to half degrees.
        #[arg(long, value_parser = parse_setpoint_celsius)]
        target: f32,
        /// Room temperature in °C, usually the last reported value.
        #[arg(long, value_parser = parse_room_celsius)]
        room: f32,
    },

    /// Patch a settings record read from the valve and print the encoded result.
    /// Fields not given on the command line, and all reserved bytes, are kept.
    #[clap(verbatim_doc_comment)]
    EncodeSettings {
        /// The settings record as read from the valve, as hex string.
        #[arg(value_parser = parse_record)]
        record: HexRecord,
        /// Minimum temperature in °C.
        #[arg(long, value_parser = parse_setpoint_celsius)]
        min: Option<f32>,
        /// Maximum temperature in °C.
        #[arg(long, value_parser = parse_setpoint_celsius)]
        max: Option<f32>,
        /// Frost protection temperature in °C.
        #[arg(long, value_parser = parse_setpoint_celsius)]
        frost: Option<f32>,
        /// Vacation temperature in °C.
        #[arg(long, value_parser = parse_setpoint_celsius)]
        vacation: Option<f32>,
        /// Device mode.
        #[arg(long, value_enum)]
        mode: Option<CliMode>,
        /// Vacation start as UNIX timestamp (decimal or hex).
        #[arg(long, value_parser = parse_timestamp)]
        vacation_from: Option<u32>,
        /// Vacation end as UNIX timestamp (decimal or hex).
        #[arg(long, value_parser = parse_timestamp)]
        vacation_to: Option<u32>,
        /// Lock the buttons on the valve.
        #[arg(long)]
        lock_control: Option<bool>,
        /// Flip the display.
        #[arg(long)]
        display_flip: Option<bool>,
    },

    /// Run a refresh and write cycle against a simulated valve.
    /// Shows the command queue and the record codec working together without hardware.
    #[clap(verbatim_doc_comment)]
    Simulate {
        /// Target temperature in °C to write after the first refresh.
        #[arg(long, value_parser = parse_setpoint_celsius)]
        target: Option<f32>,

        /// How long a producer waits for a free queue slot.
        /// Overrides the config file. Without it a full queue rejects commands.
        /// Examples: "100ms", "2s".
        #[arg(long, value_parser = humantime::parse_duration, verbatim_doc_comment)]
        push_timeout: Option<Duration>,
    },
}

const fn about_text() -> &'static str {
    "Danfoss Eco CLI - Decode, encode and simulate Danfoss Eco radiator valve records."
}

#[derive(Parser, Debug)]
#[command(name="ecoctl", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is off.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// The 16 byte valve key as 32 hex digits.
    /// Overrides the key from the config file.
    #[arg(global = true, long, value_parser = parse_key, verbatim_doc_comment)]
    pub key: Option<Key>,

    /// YAML configuration file.
    #[arg(global = true, long, default_value = Config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: CliCommands,
}
