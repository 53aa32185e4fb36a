//! Static camera registry: serial number to logical name and defaults.

use std::collections::HashMap;

pub use trigcam_common::config::CameraDescriptor;
use trigcam_common::error::{TrigcamError, TrigcamResult};

use crate::source::DeviceInfo;

/// Immutable lookup table built once from configuration.
#[derive(Debug, Clone, Default)]
pub struct CameraRegistry {
    descriptors: Vec<CameraDescriptor>,
    by_serial: HashMap<String, usize>,
}

/// A discovered device matched to its registry entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCamera {
    /// Position in the registry; fixes the polling order.
    pub index: usize,
    pub device: DeviceInfo,
    pub descriptor: CameraDescriptor,
}

impl CameraRegistry {
    /// Build a registry, rejecting duplicate serials.
    pub fn new(descriptors: Vec<CameraDescriptor>) -> TrigcamResult<Self> {
        let mut by_serial = HashMap::with_capacity(descriptors.len());
        for (idx, descriptor) in descriptors.iter().enumerate() {
            if by_serial.insert(descriptor.serial.clone(), idx).is_some() {
                return Err(TrigcamError::configuration(format!(
                    "duplicate camera serial {} in registry",
                    descriptor.serial
                )));
            }
        }
        Ok(Self {
            descriptors,
            by_serial,
        })
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptors(&self) -> &[CameraDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, serial: &str) -> Option<&CameraDescriptor> {
        self.by_serial.get(serial).map(|idx| &self.descriptors[*idx])
    }

    pub fn find_by_name(&self, name: &str) -> Option<&CameraDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Match every discovered device to a registry entry.
    ///
    /// Any unknown serial is a configuration error. The result is ordered by
    /// registry position so polling order does not depend on enumeration order.
    pub fn resolve(&self, devices: &[DeviceInfo]) -> TrigcamResult<Vec<ResolvedCamera>> {
        if devices.is_empty() {
            return Err(TrigcamError::configuration("no camera present"));
        }

        let mut resolved = Vec::with_capacity(devices.len());
        for device in devices {
            let index = *self.by_serial.get(&device.serial).ok_or_else(|| {
                TrigcamError::configuration(format!(
                    "camera with serial number {} has no registry entry; add it to the camera list",
                    device.serial
                ))
            })?;
            if resolved.iter().any(|r: &ResolvedCamera| r.index == index) {
                return Err(TrigcamError::configuration(format!(
                    "camera with serial number {} was enumerated twice",
                    device.serial
                )));
            }
            resolved.push(ResolvedCamera {
                index,
                device: device.clone(),
                descriptor: self.descriptors[index].clone(),
            });
        }
        resolved.sort_by_key(|r| r.index);

        for (index, descriptor) in self.descriptors.iter().enumerate() {
            if !resolved.iter().any(|r| r.index == index) {
                tracing::warn!(
                    name = %descriptor.name,
                    serial = %descriptor.serial,
                    "Registered camera not present"
                );
            }
        }
        Ok(resolved)
    }
}
