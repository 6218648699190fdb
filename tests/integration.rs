use danfoss_eco_lib::{
    command::Command,
    device::Device,
    error::LinkError,
    link::MemoryLink,
    protocol::{ClimateMode, DeviceMode, PropertyKind, Record, Settings, WritableRecord},
    queue::{CommandQueue, PushPolicy},
    wire,
    xxtea::{Key, Xxtea},
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const KEY: &str = "8aa5a5be2b54bb3c5e2a3d8e0f9b01c7";

fn sealed(cipher: &Xxtea, plain: &[u8]) -> Vec<u8> {
    let mut buf = plain.to_vec();
    wire::encrypt_record(cipher, &mut buf).unwrap();
    buf
}

fn valve(cipher: &Xxtea) -> MemoryLink {
    let mut settings = [0u8; 16];
    settings[0] = 0b1000_0101;
    settings[1] = 10;
    settings[2] = 56;
    settings[3] = 12;
    settings[4] = DeviceMode::Hold as u8;
    settings[5] = 34;
    settings[14] = 0xAB;
    MemoryLink::new()
        .with_record(PropertyKind::Battery, [55])
        .with_record(
            PropertyKind::Temperature,
            sealed(cipher, &[20, 44, 0, 0, 0, 0, 0, 0]),
        )
        .with_record(PropertyKind::Settings, sealed(cipher, &settings))
        .with_record(
            PropertyKind::Errors,
            sealed(cipher, &[0x01, 0x00, 0, 0, 0, 0, 0, 0]),
        )
}

#[test]
fn producers_and_drain_on_separate_threads() {
    let key: Key = KEY.parse().unwrap();
    let cipher = Arc::new(Xxtea::with_key(&key));
    let device = Device::with_cipher(cipher.clone());
    let queue = Arc::new(CommandQueue::with_capacity(2));
    let policy = PushPolicy::Block(Duration::from_secs(5));

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let device = device.clone();
            let queue = queue.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    device.refresh(&queue, policy).unwrap();
                }
            })
        })
        .collect();

    let mut link = valve(&cipher);
    let mut completed = 0;
    while completed < 4 * 5 * 4 {
        match queue.execute_next(&mut link) {
            Some((_, result)) => {
                result.unwrap();
                completed += 1;
            }
            None => thread::sleep(Duration::from_millis(1)),
        }
    }
    for producer in producers {
        producer.join().unwrap();
    }

    assert!(queue.is_empty());
    assert_eq!(link.requests(), 80);
    assert_eq!(*device.battery.value().unwrap(), 55);
    let temperature = device.temperature.value().unwrap();
    assert_eq!(temperature.target_temperature, 10.0);
    assert_eq!(temperature.room_temperature, 22.0);
    assert_eq!(device.problems(), Some(true));
}

#[test]
fn settings_changes_keep_reserved_bytes() {
    let cipher = Arc::new(Xxtea::with_key(&KEY.parse().unwrap()));
    let device = Device::with_cipher(cipher.clone());
    let queue = CommandQueue::new();
    let mut link = valve(&cipher);

    device.refresh(&queue, PushPolicy::Reject).unwrap();
    assert_eq!(queue.drain(&mut link).failed, 0);

    let settings = device.settings.value().unwrap();
    assert!(settings.adaptable_regulation);
    assert!(settings.vertical_installation);
    assert!(settings.lock_control);
    assert!(!settings.display_flip);
    assert_eq!(settings.device_mode, ClimateMode::Heat);

    device
        .set_mode(&queue, PushPolicy::Reject, ClimateMode::Auto)
        .unwrap();
    assert_eq!(queue.drain(&mut link).completed, 1);

    let written = Settings::decode(&cipher, link.record(PropertyKind::Settings).unwrap()).unwrap();
    assert_eq!(written.wire_mode(), DeviceMode::Scheduled);
    assert_eq!(written.raw()[14], 0xAB);
    assert_eq!(written.temperature_max, 28.0);

    // Writing back what was read gives the same record
    let again = written.encode(&cipher).unwrap();
    assert_eq!(again, link.record(PropertyKind::Settings).unwrap());
}

#[test]
fn failed_link_leaves_values_untouched() {
    let cipher = Arc::new(Xxtea::with_key(&KEY.parse().unwrap()));
    let device = Device::with_cipher(cipher.clone());
    let queue = CommandQueue::new();
    let mut link = valve(&cipher);

    queue.push(Command::read(&device.battery)).unwrap();
    link.fail_next(LinkError::Timeout);
    let report = queue.drain(&mut link);
    assert_eq!(report.failed, 1);
    assert_eq!(device.battery.value(), None);

    queue.push(Command::read(&device.battery)).unwrap();
    assert_eq!(queue.drain(&mut link).completed, 1);
    assert_eq!(*device.battery.value().unwrap(), 55);
}
