use std::fmt;
use std::str::FromStr;

use candle_core::Device;

use super::types::ModelError;

/// Compute devices a model can be placed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
    Cuda,
    Metal,
}

impl DeviceKind {
    fn compiled_in(self) -> bool {
        match self {
            DeviceKind::Cpu => true,
            DeviceKind::Cuda => cfg!(feature = "cuda"),
            DeviceKind::Metal => cfg!(feature = "metal"),
        }
    }

    /// Initialize ordinal 0 of this device
    pub fn open(self) -> Result<Device, ModelError> {
        if !self.compiled_in() {
            return Err(ModelError::ConfigError(format!(
                "{self} requested but mealway was built without the '{self}' feature"
            )));
        }

        let device = match self {
            DeviceKind::Cpu => Ok(Device::Cpu),
            DeviceKind::Cuda => Device::new_cuda(0),
            DeviceKind::Metal => Device::new_metal(0),
        };

        device.map_err(|e| ModelError::ConfigError(format!("failed to initialize {self}: {e}")))
    }
}

impl FromStr for DeviceKind {
    type Err = ModelError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "cpu" => Ok(DeviceKind::Cpu),
            "cuda" => Ok(DeviceKind::Cuda),
            "metal" => Ok(DeviceKind::Metal),
            other => Err(ModelError::ConfigError(format!("unknown device '{other}'"))),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Cuda => write!(f, "cuda"),
            DeviceKind::Metal => write!(f, "metal"),
        }
    }
}

pub struct DeviceSelector;

impl DeviceSelector {
    /// First accelerator that initializes (CUDA, then Metal), else CPU
    pub fn auto_select() -> Device {
        for kind in [DeviceKind::Cuda, DeviceKind::Metal] {
            if !kind.compiled_in() {
                continue;
            }

            match kind.open() {
                Ok(device) => {
                    log::info!("selected {kind} device");
                    return device;
                }
                Err(e) => log::debug!("{kind} unavailable: {e}"),
            }
        }

        log::info!("no accelerator available, running on cpu");
        Device::Cpu
    }
}

/// Honor an explicit `MEALWAY_DEVICE` preference, otherwise auto-detect.
///
/// A forced device that fails to initialize is an error; an unrecognized
/// preference is logged and ignored.
pub fn select_device(preference: Option<&str>) -> Result<Device, ModelError> {
    let Some(preference) = preference else {
        return Ok(DeviceSelector::auto_select());
    };

    match preference.parse::<DeviceKind>() {
        Ok(kind) => {
            log::info!("device forced by MEALWAY_DEVICE: {kind}");
            kind.open()
        }
        Err(e) => {
            log::warn!("ignoring MEALWAY_DEVICE ({e}); auto-detecting");
            Ok(DeviceSelector::auto_select())
        }
    }
}
