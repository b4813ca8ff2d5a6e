use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;
use uuid::Uuid;

/// Identifies one configured account entry on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A named, timestamped value reported by a boiler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: String,
    /// Epoch seconds of the last change reported by the server.
    pub timestamp: Option<i64>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, ts: i64) -> Self {
        self.timestamp = Some(ts);
        self
    }

    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    }

    pub fn is_on(&self) -> bool {
        value_is_on(&self.value)
    }
}

/// Heating circuit as listed in the device configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Circuit {
    pub title: String,
    pub dbindex: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Device {
    pub serial: String,
    /// Firmware family, e.g. `peltec2`, `cmpelet`, `biopl`.
    pub kind: String,
    pub product: String,
    pub parameters: BTreeMap<String, Parameter>,
    pub circuits: Vec<Circuit>,
}

impl Device {
    pub fn new(serial: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    pub fn get_or_create_parameter(&mut self, name: &str) -> &mut Parameter {
        if !self.parameters.contains_key(name) {
            debug!(
                serial = %self.serial,
                parameter = name,
                "parameter does not exist, creating one"
            );
        }
        self.parameters
            .entry(name.to_string())
            .or_insert_with(|| Parameter::new(name, ""))
    }

    pub fn set_parameter(&mut self, param: Parameter) {
        self.parameters.insert(param.name.clone(), param);
    }

    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.parameters
            .values()
            .filter_map(Parameter::timestamp_utc)
            .max()
    }
}

/// All devices of one account, keyed by serial.
#[derive(Debug, Clone, Default)]
pub struct DeviceCollection {
    devices: BTreeMap<String, Device>,
}

impl DeviceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, device: Device) {
        self.devices.insert(device.serial.clone(), device);
    }

    pub fn get(&self, serial: &str) -> Option<&Device> {
        self.devices.get(serial)
    }

    pub fn get_mut(&mut self, serial: &str) -> Option<&mut Device> {
        self.devices.get_mut(serial)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Most recent parameter timestamp across every device.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.devices.values().filter_map(Device::latest_timestamp).max()
    }
}

impl FromIterator<Device> for DeviceCollection {
    fn from_iter<I: IntoIterator<Item = Device>>(iter: I) -> Self {
        let mut collection = DeviceCollection::new();
        for device in iter {
            collection.insert(device);
        }
        collection
    }
}

/// Interprets a boiler command/state value as on or off.
///
/// Unknown strings such as `CLEANING` count as on: only an explicit off
/// token (or zero) reads as off.
pub fn value_is_on(value: &str) -> bool {
    match value.trim() {
        "1" | "ON" | "On" | "on" | "TRUE" | "True" | "true" => return true,
        "0" | "OFF" | "Off" | "off" | "FALSE" | "False" | "false" => return false,
        _ => {}
    }
    match value.trim().parse::<i64>() {
        Ok(1) => true,
        Ok(0) => false,
        _ => value != "OFF",
    }
}
