//! Danfoss Eco CLI
//!
//! A command-line interface (CLI) application for working with the encrypted
//! records of Danfoss Eco radiator valves.
//!
//! This tool allows users to:
//! - Decode records captured from a valve into readable values.
//! - Encode temperature records ready to be written to a valve.
//! - Patch settings records while keeping every reserved byte.
//! - Run a refresh and write cycle against a simulated valve through the
//!   command queue.
//!
//! The link to a real valve (discovery, pairing, characteristics) is out of
//! scope, the CLI works on hex strings instead.

use anyhow::{Context, Result, bail};
use clap::Parser;
use danfoss_eco_lib::{
    device::Device,
    link::MemoryLink,
    protocol::{self as proto, DeviceMode, PropertyKind, Record, WritableRecord},
    queue::{CommandQueue, PushPolicy},
    wire,
    xxtea::{Key, Xxtea},
};
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use std::panic;
use std::sync::Arc;

mod commandline;
mod config;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

fn print_yaml<T: serde::Serialize>(title: &str, value: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(value).with_context(|| format!("Cannot format {title}"))?;
    println!("{title}:");
    for line in yaml.lines() {
        println!("  {line}");
    }
    Ok(())
}

fn handle_decode(cipher: &Xxtea, kind: PropertyKind, raw: &[u8]) -> Result<()> {
    info!("Executing: Decode {kind} record");
    match kind {
        PropertyKind::Temperature => {
            let temperature = proto::Temperature::decode(cipher, raw)
                .context("Cannot decode temperature record")?;
            print_yaml("Temperature", &temperature)?;
        }
        PropertyKind::Settings => {
            let settings =
                proto::Settings::decode(cipher, raw).context("Cannot decode settings record")?;
            print_yaml("Settings", &settings)?;
        }
        PropertyKind::Errors => {
            let errors =
                proto::Errors::decode(cipher, raw).context("Cannot decode errors record")?;
            print_yaml("Errors", &errors)?;
            println!("Problems: {errors}");
        }
        PropertyKind::Battery => {
            let battery = proto::BatteryLevel::decode(cipher, raw)
                .context("Cannot decode battery record")?;
            println!("Battery level: {battery}");
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_encode_settings(
    cipher: &Xxtea,
    raw: &[u8],
    min: Option<f32>,
    max: Option<f32>,
    frost: Option<f32>,
    vacation: Option<f32>,
    mode: Option<commandline::CliMode>,
    vacation_from: Option<u32>,
    vacation_to: Option<u32>,
    lock_control: Option<bool>,
    display_flip: Option<bool>,
) -> Result<()> {
    info!("Executing: Encode settings record");
    let mut settings =
        proto::Settings::decode(cipher, raw).context("Cannot decode settings record")?;

    if let Some(min) = min {
        settings.temperature_min = min;
    }
    if let Some(max) = max {
        settings.temperature_max = max;
    }
    if let Some(frost) = frost {
        settings.frost_protection_temperature = frost;
    }
    if let Some(vacation) = vacation {
        settings.vacation_temperature = vacation;
    }
    if let Some(from) = vacation_from {
        settings.vacation_from = from;
    }
    if let Some(to) = vacation_to {
        settings.vacation_to = to;
    }
    if let Some(lock) = lock_control {
        settings.lock_control = lock;
    }
    if let Some(flip) = display_flip {
        settings.display_flip = flip;
    }
    match mode {
        Some(commandline::CliMode::Heat) => settings.device_mode = proto::ClimateMode::Heat,
        Some(commandline::CliMode::Auto) => settings.device_mode = proto::ClimateMode::Auto,
        Some(commandline::CliMode::Manual) => settings.set_wire_mode(DeviceMode::Manual),
        Some(commandline::CliMode::Scheduled) => settings.set_wire_mode(DeviceMode::Scheduled),
        Some(commandline::CliMode::Vacation) => settings.set_wire_mode(DeviceMode::Vacation),
        Some(commandline::CliMode::Hold) => settings.set_wire_mode(DeviceMode::Hold),
        None => {}
    }

    let encoded = settings
        .encode(cipher)
        .context("Cannot encode settings record")?;
    println!("{}", hex::encode(encoded));
    Ok(())
}

/// Builds a simulated valve with plausible factory-like records.
fn simulated_valve(cipher: &Xxtea) -> Result<MemoryLink> {
    let seal = |plain: &[u8]| -> Result<Vec<u8>> {
        let mut buf = plain.to_vec();
        wire::encrypt_record(cipher, &mut buf)?;
        Ok(buf)
    };

    let mut settings = [0u8; 16];
    settings[0] = 0b0100_0001; // adaptable regulation, valve installed
    settings[1] = 10; // 5.0 °C
    settings[2] = 56; // 28.0 °C
    settings[3] = 12; // 6.0 °C
    settings[4] = DeviceMode::Scheduled as u8;
    settings[5] = 34; // 17.0 °C

    Ok(MemoryLink::new()
        .with_record(PropertyKind::Battery, [87])
        .with_record(
            PropertyKind::Temperature,
            seal(&[42, 41, 0, 0, 0, 0, 0, 0])?,
        )
        .with_record(PropertyKind::Settings, seal(&settings)?)
        .with_record(PropertyKind::Errors, seal(&[0; 8])?))
}

fn print_device(device: &Device) -> Result<()> {
    if let Some(battery) = device.battery.value() {
        println!("Battery level: {battery}");
    }
    if let Some(temperature) = device.temperature.value() {
        println!("Temperature: {temperature}");
    }
    if let Some(settings) = device.settings.value() {
        print_yaml("Settings", &settings)?;
    }
    if let Some(errors) = device.errors.value() {
        println!("Problems: {errors}");
    }
    Ok(())
}

fn handle_simulate(
    cipher: Arc<Xxtea>,
    queue_config: &config::QueueConfig,
    policy: PushPolicy,
    target: Option<f32>,
) -> Result<()> {
    info!("Executing: Simulate (queue capacity {})", queue_config.capacity);
    let device = Device::with_cipher(cipher.clone());
    let queue = CommandQueue::with_capacity(queue_config.capacity);
    let mut link = simulated_valve(&cipher)?;

    device
        .refresh(&queue, policy)
        .context("Cannot queue refresh")?;
    let mut report = queue.drain(&mut link);
    info!("Refresh: {} completed, {} failed", report.completed, report.failed);
    print_device(&device)?;

    if let Some(target) = target {
        println!();
        println!("Setting target temperature to {target:.1} °C");
        device
            .set_target_temperature(&queue, policy, target)
            .context("Cannot queue target temperature")?;
        device
            .refresh(&queue, policy)
            .context("Cannot queue refresh")?;
        report = queue.drain(&mut link);
        info!("Write and refresh: {} completed, {} failed", report.completed, report.failed);
        if let Some((_, raw)) = link.writes().last() {
            println!("Written record: {}", hex::encode(raw));
        }
        print_device(&device)?;
    }

    if report.failed > 0 {
        bail!("{} commands failed", report.failed);
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    // 1. Initialize logging as early as possible
    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "Danfoss Eco CLI started. Log level: {}",
        args.verbose.log_level_filter()
    );

    run(&args)
}

fn run(args: &commandline::CliArgs) -> Result<()> {
    // 2. Configuration, the command line wins over the file
    let config = config::Config::load(&args.config)?;
    let key: Option<Key> = match args.key {
        Some(key) => Some(key),
        None => config.key()?,
    };
    let cipher = || -> Result<Xxtea> {
        match &key {
            Some(key) => Ok(Xxtea::with_key(key)),
            None => bail!("No key given, use --key or set `key` in the config file"),
        }
    };

    // 3. Execute the command
    match &args.command {
        commandline::CliCommands::Decode { kind, record } => {
            let kind = PropertyKind::from(*kind);
            let cipher = if kind == PropertyKind::Battery {
                Xxtea::new()
            } else {
                cipher()?
            };
            handle_decode(&cipher, kind, &record.0)?;
        }
        commandline::CliCommands::EncodeTemperature { target, room } => {
            info!("Executing: Encode temperature record");
            let temperature = proto::Temperature {
                target_temperature: *target,
                room_temperature: *room,
            };
            let encoded = temperature
                .encode(&cipher()?)
                .context("Cannot encode temperature record")?;
            println!("{}", hex::encode(encoded));
        }
        commandline::CliCommands::EncodeSettings {
            record,
            min,
            max,
            frost,
            vacation,
            mode,
            vacation_from,
            vacation_to,
            lock_control,
            display_flip,
        } => {
            handle_encode_settings(
                &cipher()?,
                &record.0,
                *min,
                *max,
                *frost,
                *vacation,
                *mode,
                *vacation_from,
                *vacation_to,
                *lock_control,
                *display_flip,
            )?;
        }
        commandline::CliCommands::Simulate {
            target,
            push_timeout,
        } => {
            let policy = push_timeout.map_or(config.queue.push_policy(), PushPolicy::Block);
            // Without a configured key the simulation runs on an all zero key.
            let cipher = match &key {
                Some(_) => cipher()?,
                None => Xxtea::with_key(&Key::new([0; 16])),
            };
            handle_simulate(Arc::new(cipher), &config.queue, policy, *target)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_with(args: &[&str]) -> Result<()> {
        let mut argv = vec!["ecoctl", "--key", "000102030405060708090a0b0c0d0e0f"];
        argv.extend_from_slice(args);
        run(&commandline::CliArgs::parse_from(argv))
    }

    #[test]
    fn encode_commands_run_with_key() {
        run_with(&["encode-temperature", "--target", "21.5", "--room", "19"]).unwrap();

        let link = simulated_valve(&Xxtea::with_key(&Key::new([
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
            0x0e, 0x0f,
        ])))
        .unwrap();
        let settings = hex::encode(link.record(PropertyKind::Settings).unwrap());
        run_with(&["encode-settings", &settings, "--mode", "hold", "--max", "26"]).unwrap();
        run_with(&["decode", "settings", &settings]).unwrap();
    }

    #[test]
    fn encode_without_key_fails() {
        let args = commandline::CliArgs::parse_from([
            "ecoctl",
            "encode-temperature",
            "--target",
            "21",
            "--room",
            "20",
        ]);
        assert!(run(&args).is_err());
    }

    #[test]
    fn simulated_valve_decodes() {
        let cipher = Xxtea::with_key(&Key::new([0x21; 16]));
        let mut link = simulated_valve(&cipher).unwrap();
        let device = Device::with_cipher(Arc::new(cipher));
        let queue = CommandQueue::new();
        device.refresh(&queue, PushPolicy::Reject).unwrap();
        assert_eq!(queue.drain(&mut link).failed, 0);
        assert_eq!(device.temperature.value().unwrap().target_temperature, 21.0);
        assert_eq!(device.problems(), Some(false));
    }

    #[test]
    fn simulate_with_target() {
        let cipher = Arc::new(Xxtea::with_key(&Key::new([0x21; 16])));
        let queue_config = config::QueueConfig::default();
        handle_simulate(cipher, &queue_config, PushPolicy::Reject, Some(23.5)).unwrap();
    }

    #[test]
    fn encode_settings_roundtrip() {
        let cipher = Xxtea::with_key(&Key::new([0x21; 16]));
        let link = simulated_valve(&cipher).unwrap();
        let raw = link.record(PropertyKind::Settings).unwrap();
        handle_encode_settings(
            &cipher,
            raw,
            Some(7.0),
            None,
            None,
            None,
            Some(commandline::CliMode::Vacation),
            None,
            None,
            Some(true),
            None,
        )
        .unwrap();
    }
}
