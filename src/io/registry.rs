/*
 * Device Registry
 *
 * Ordered list of the devices an environment knows about. Built once at
 * startup, read-only afterwards. Lookups scan in registration order.
 */

use heapless::Vec;

use super::device::{DevId, Device, Errno};
use super::fd::EnvId;

/// Most devices a single registry can hold
pub const MAX_DEVICES: usize = 8;

/// Registered devices, in lookup order
pub struct DeviceRegistry<'d> {
    devices: Vec<&'d dyn Device, MAX_DEVICES>,
}

impl<'d> DeviceRegistry<'d> {
    /// Create an empty registry
    pub const fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    /// Build a registry from `devices`, in order
    pub fn from_devices(devices: &[&'d dyn Device]) -> Result<Self, Errno> {
        let mut registry = Self::new();
        for &dev in devices {
            registry.register(dev)?;
        }
        Ok(registry)
    }

    /// Append a device
    ///
    /// Ids must be unique: EEXIST if the id is taken, ENOMEM if the
    /// registry is full.
    pub fn register(&mut self, dev: &'d dyn Device) -> Result<(), Errno> {
        if self.find(dev.id()).is_some() {
            return Err(Errno::EEXIST);
        }
        self.devices.push(dev).map_err(|_| Errno::ENOMEM)?;
        log::debug!("registered device {} ({})", dev.name(), dev.id());
        Ok(())
    }

    /// First device with `dev_id`, if any
    pub fn find(&self, dev_id: DevId) -> Option<&'d dyn Device> {
        self.devices.iter().copied().find(|dev| dev.id() == dev_id)
    }

    /// Resolve the device owning a descriptor
    ///
    /// An unknown id is a protocol error: it is reported against `env` and
    /// EINVAL is returned.
    pub fn lookup(&self, env: EnvId, dev_id: DevId) -> Result<&'d dyn Device, Errno> {
        self.find(dev_id).ok_or_else(|| {
            log::warn!("{} unknown device type {}", env, dev_id);
            Errno::EINVAL
        })
    }

    /// Registered devices in lookup order
    pub fn iter(&self) -> impl Iterator<Item = &'d dyn Device> + '_ {
        self.devices.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl Default for DeviceRegistry<'_> {
    fn default() -> Self {
        Self::new()
    }
}
