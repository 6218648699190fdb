//! All properties of one valve, sharing the session cipher.

use crate::command::{Command, Property};
use crate::error::{CommandError, DecodeError, Error, PushError};
use crate::protocol::{
    self as proto, BatteryLevel, ClimateMode, Errors, PropertyKind, Settings, Temperature,
};
use crate::queue::{CommandQueue, PushPolicy};
use crate::xxtea::{Key, Xxtea};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Device {
    pub temperature: Property<Temperature>,
    pub settings: Property<Settings>,
    pub errors: Property<Errors>,
    pub battery: Property<BatteryLevel>,
}

impl Device {
    pub fn new(key: &Key) -> Self {
        Self::with_cipher(Arc::new(Xxtea::with_key(key)))
    }

    pub fn with_cipher(cipher: Arc<Xxtea>) -> Self {
        Self {
            temperature: Property::new(cipher.clone()),
            settings: Property::new(cipher.clone()),
            errors: Property::new(cipher.clone()),
            battery: Property::new(cipher),
        }
    }

    /// Queues a read of every property.
    pub fn refresh(&self, queue: &CommandQueue, policy: PushPolicy) -> Result<(), PushError> {
        queue.push_with(Command::read(&self.battery), policy)?;
        queue.push_with(Command::read(&self.temperature), policy)?;
        queue.push_with(Command::read(&self.settings), policy)?;
        queue.push_with(Command::read(&self.errors), policy)
    }

    /// Changes the target temperature and queues the write.
    ///
    /// The temperature has to be read once before, the room temperature is
    /// sent back as last reported.
    pub fn set_target_temperature(
        &self,
        queue: &CommandQueue,
        policy: PushPolicy,
        celsius: f32,
    ) -> Result<(), Error> {
        proto::half_degree_encode("target temperature", celsius, &proto::TEMPERATURE_RANGE)?;
        self.temperature
            .modify(|t| t.target_temperature = celsius)
            .ok_or(CommandError::NoValue(PropertyKind::Temperature))?;
        queue.push_with(Command::write(&self.temperature), policy)?;
        Ok(())
    }

    /// Switches between manual heating and the valve's schedule and queues the write.
    pub fn set_mode(
        &self,
        queue: &CommandQueue,
        policy: PushPolicy,
        mode: ClimateMode,
    ) -> Result<(), Error> {
        self.settings
            .modify(|s| s.device_mode = mode)
            .ok_or(CommandError::NoValue(PropertyKind::Settings))?;
        queue.push_with(Command::write(&self.settings), policy)?;
        Ok(())
    }

    /// Routes an unsolicited record from the link to its property.
    pub fn handle_notification(&self, kind: PropertyKind, raw: &[u8]) -> Result<(), DecodeError> {
        match kind {
            PropertyKind::Temperature => self.temperature.handle_notification(raw),
            PropertyKind::Settings => self.settings.handle_notification(raw),
            PropertyKind::Errors => self.errors.handle_notification(raw),
            PropertyKind::Battery => self.battery.handle_notification(raw),
        }
    }

    /// Whether the valve reports a problem, `None` before errors were read.
    pub fn problems(&self) -> Option<bool> {
        self.errors.value().map(|errors| errors.any())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use crate::link::MemoryLink;
    use crate::protocol::{DeviceMode, Record};
    use crate::wire;
    use assert_matches::assert_matches;

    fn sealed(key: &Key, plain: &[u8]) -> Vec<u8> {
        let mut buf = plain.to_vec();
        wire::encrypt_record(&Xxtea::with_key(key), &mut buf).unwrap();
        buf
    }

    fn valve(key: &Key) -> MemoryLink {
        let mut settings = [0u8; 16];
        settings[1] = 10;
        settings[2] = 56;
        settings[3] = 12;
        settings[4] = DeviceMode::Vacation as u8;
        settings[5] = 30;
        MemoryLink::new()
            .with_record(PropertyKind::Battery, [72])
            .with_record(
                PropertyKind::Temperature,
                sealed(key, &[40, 41, 0, 0, 0, 0, 0, 0]),
            )
            .with_record(PropertyKind::Settings, sealed(key, &settings))
            .with_record(PropertyKind::Errors, sealed(key, &[0, 0, 0, 0, 0, 0, 0, 0]))
    }

    #[test]
    fn refresh_reads_everything() {
        let key = Key::new([0x11; 16]);
        let device = Device::new(&key);
        let queue = CommandQueue::new();
        device.refresh(&queue, PushPolicy::Reject).unwrap();
        assert_eq!(queue.len(), 4);

        let report = queue.drain(&mut valve(&key));
        assert_eq!(report.completed, 4);
        assert_eq!(*device.battery.value().unwrap(), 72);
        assert_eq!(device.temperature.value().unwrap().room_temperature, 20.5);
        assert_eq!(device.settings.value().unwrap().device_mode, ClimateMode::Auto);
        assert_eq!(device.problems(), Some(false));
    }

    #[test]
    fn set_target_temperature_requires_read() {
        let device = Device::new(&Key::new([0x11; 16]));
        let queue = CommandQueue::new();
        assert_matches!(
            device.set_target_temperature(&queue, PushPolicy::Reject, 21.0),
            Err(Error::Command(CommandError::NoValue(PropertyKind::Temperature)))
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn set_target_temperature_writes() {
        let key = Key::new([0x11; 16]);
        let device = Device::new(&key);
        let queue = CommandQueue::new();
        let mut link = valve(&key);
        device.refresh(&queue, PushPolicy::Reject).unwrap();
        queue.drain(&mut link);

        assert_matches!(
            device.set_target_temperature(&queue, PushPolicy::Reject, 55.0),
            Err(Error::Encode(..))
        );
        device
            .set_target_temperature(&queue, PushPolicy::Reject, 22.5)
            .unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain(&mut link).completed, 1);

        let written = Temperature::decode(
            &Xxtea::with_key(&key),
            link.record(PropertyKind::Temperature).unwrap(),
        )
        .unwrap();
        assert_eq!(written.target_temperature, 22.5);
        assert_eq!(written.room_temperature, 20.5);
    }

    #[test]
    fn set_mode_keeps_vacation_until_changed() {
        let key = Key::new([0x11; 16]);
        let device = Device::new(&key);
        let queue = CommandQueue::new();
        let mut link = valve(&key);
        device.refresh(&queue, PushPolicy::Reject).unwrap();
        queue.drain(&mut link);

        device.set_mode(&queue, PushPolicy::Reject, ClimateMode::Auto).unwrap();
        let cmd = queue.pop().unwrap();
        assert_eq!(cmd.kind(), CommandKind::Write);
        assert_eq!(device.settings.value().unwrap().wire_mode(), DeviceMode::Vacation);

        device.set_mode(&queue, PushPolicy::Reject, ClimateMode::Heat).unwrap();
        queue.drain(&mut link);
        let written = Settings::decode(
            &Xxtea::with_key(&key),
            link.record(PropertyKind::Settings).unwrap(),
        )
        .unwrap();
        assert_eq!(written.wire_mode(), DeviceMode::Manual);
    }

    #[test]
    fn notifications_are_routed() {
        let key = Key::new([0x11; 16]);
        let device = Device::new(&key);
        device
            .handle_notification(
                PropertyKind::Errors,
                &sealed(&key, &[0b0100_0000, 0, 0, 0, 0, 0, 0, 0]),
            )
            .unwrap();
        assert!(device.errors.value().unwrap().very_low_battery);
        assert_eq!(device.problems(), Some(true));

        assert_matches!(
            device.handle_notification(PropertyKind::Battery, &[150]),
            Err(DecodeError::OutOfRange { .. })
        );
        assert_eq!(device.battery.value(), None);
    }
}
