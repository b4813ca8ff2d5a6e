//! Read-only entities: one sensor per known boiler parameter and a
//! connectivity status per device.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::client::is_connected;
use crate::session::SessionController;
use crate::types::{Device, Parameter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    /// Raw parameter value.
    Generic,
    /// 0/1-style value shown as `ON` / `OFF`.
    OnOff,
}

/// How one boiler parameter is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorDescriptor {
    pub param: &'static str,
    pub unit: Option<&'static str>,
    pub description: &'static str,
    pub kind: SensorKind,
}

const fn on_off(param: &'static str, description: &'static str) -> SensorDescriptor {
    SensorDescriptor {
        param,
        unit: None,
        description,
        kind: SensorKind::OnOff,
    }
}

const fn generic(
    param: &'static str,
    unit: Option<&'static str>,
    description: &'static str,
) -> SensorDescriptor {
    SensorDescriptor {
        param,
        unit,
        description,
        kind: SensorKind::Generic,
    }
}

/// Claimed first, so these never also appear as raw sensors.
pub const ON_OFF_SENSORS: &[SensorDescriptor] = &[
    on_off("B_CMD", "Command Active"),
    on_off("B_Ppwm", "PWM Pump"),
    on_off("B_P1", "Hot Water Flow"),
    on_off("B_gri", "Electric Heater"),
    on_off("B_fan01", "Fan Active"),
    on_off("K1B_onOff", "DHW Pump Demand"),
    on_off("K1B_P", "DHW Pump State"),
];

pub const COMMON_SENSORS: &[SensorDescriptor] = &[
    generic("B_STATE", None, "Boiler State"),
    generic("B_CMD", None, "Command Active"),
    generic("B_BRAND", None, "Brand"),
    generic("B_INST", None, "Installation"),
    generic("B_PRODNAME", None, "Product Name"),
    generic("B_VER", None, "Firmware Version"),
    generic("B_sng", None, "Nominal Power"),
];

/// Extra measurements reported by PelTec II boilers only.
pub const PELTEC_SENSORS: &[SensorDescriptor] = &[
    generic("B_Tak1_1", Some("°C"), "Buffer Tank Temperature Up"),
    generic("B_Tak2_1", Some("°C"), "Buffer Tank Temperature Down"),
    generic("B_Tdpl1", Some("°C"), "Flue Gas"),
    generic("B_Tpov1", Some("°C"), "Mixer Temperature"),
    generic("B_Tk1", Some("°C"), "Boiler Temperature"),
    generic("B_Ths1", Some("°C"), "Hydraulic Crossover Temperature"),
    generic("B_Tkm1", Some("°C"), "DHW Temperature"),
    generic("CNT_0", Some("min"), "Burner Work"),
    generic("CNT_1", None, "Number of Burner Start"),
    generic("CNT_2", Some("min"), "Feeder Screw Work"),
];

const PELTEC_KIND: &str = "peltec2";

/// Maps a 0/1-style value to `ON` / `OFF`; anything else is passed through.
pub fn normalize_on_off(value: &str) -> String {
    let normalized = match value.trim() {
        "1" | "ON" | "On" | "on" | "TRUE" | "True" | "true" => Some("ON"),
        "0" | "OFF" | "Off" | "off" | "FALSE" | "False" | "false" => Some("OFF"),
        other => match other.parse::<i64>() {
            Ok(1) => Some("ON"),
            Ok(0) => Some("OFF"),
            _ => None,
        },
    };
    normalized.map_or_else(|| value.to_string(), str::to_string)
}

pub struct ParameterSensor {
    session: Arc<SessionController>,
    serial: String,
    descriptor: SensorDescriptor,
    name: String,
    unique_id: String,
}

impl ParameterSensor {
    pub fn new(
        session: Arc<SessionController>,
        device: &Device,
        descriptor: SensorDescriptor,
    ) -> Self {
        let name = format!(
            "{}{} {}",
            session.prefix(),
            device.product,
            descriptor.description
        );
        Self {
            unique_id: format!("{}-{}", device.serial, descriptor.param),
            serial: device.serial.clone(),
            session,
            descriptor,
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn param(&self) -> &str {
        self.descriptor.param
    }

    pub fn unit(&self) -> Option<&'static str> {
        self.descriptor.unit
    }

    pub fn kind(&self) -> SensorKind {
        self.descriptor.kind
    }

    pub fn value(&self) -> Option<String> {
        let devices = self.session.client().devices();
        let param = devices.get(&self.serial)?.parameter(self.descriptor.param)?;
        Some(match self.descriptor.kind {
            SensorKind::Generic => param.value.clone(),
            SensorKind::OnOff => normalize_on_off(&param.value),
        })
    }

    pub fn available(&self) -> bool {
        is_connected(self.session.client().as_ref())
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        let devices = self.session.client().devices();
        devices
            .get(&self.serial)?
            .parameter(self.descriptor.param)?
            .timestamp_utc()
    }

    fn tag(&self) -> String {
        format!("{}-generic", self.unique_id)
    }

    pub fn watch(&self, callback: impl Fn(&Device, &Parameter) + Send + Sync + 'static) {
        self.session
            .fanout()
            .subscribe(&self.serial, self.descriptor.param, &self.tag(), callback);
    }

    pub fn unwatch(&self) {
        self.session
            .fanout()
            .unsubscribe(&self.serial, self.descriptor.param, &self.tag());
    }
}

/// Whether the account's push channel is up, one entity per device.
pub struct ConnectionStatus {
    session: Arc<SessionController>,
    name: String,
    unique_id: String,
}

impl ConnectionStatus {
    pub fn new(session: Arc<SessionController>, device: &Device) -> Self {
        let name = format!("{}Centrometal Boiler System connection", session.prefix());
        Self {
            unique_id: format!("{}_websocket_status", device.serial),
            session,
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn is_on(&self) -> bool {
        is_connected(self.session.client().as_ref())
    }
}

fn descriptors_for(device: &Device) -> impl Iterator<Item = &'static SensorDescriptor> {
    let peltec: &[SensorDescriptor] = if device.kind == PELTEC_KIND {
        PELTEC_SENSORS
    } else {
        &[]
    };
    ON_OFF_SENSORS
        .iter()
        .chain(COMMON_SENSORS)
        .chain(peltec)
}

/// Builds a sensor for every described parameter the device reports. The
/// first descriptor to claim a parameter wins; later ones are skipped, and
/// any repeated unique id is dropped.
pub fn sensors_for(session: &Arc<SessionController>) -> Vec<ParameterSensor> {
    let mut sensors = Vec::new();
    for device in session.client().devices().iter() {
        let mut claimed = HashSet::new();
        for descriptor in descriptors_for(device) {
            if device.parameter(descriptor.param).is_none() || !claimed.insert(descriptor.param) {
                continue;
            }
            sensors.push(ParameterSensor::new(Arc::clone(session), device, *descriptor));
        }
    }

    let sensors = dedupe_by(sensors, |s| s.unique_id().to_string());
    debug!(
        account = %session.username(),
        count = sensors.len(),
        "adding boiler parameters as sensors"
    );
    sensors
}

pub fn connection_status_for(session: &Arc<SessionController>) -> Vec<ConnectionStatus> {
    session
        .client()
        .devices()
        .iter()
        .map(|device| ConnectionStatus::new(Arc::clone(session), device))
        .collect()
}

/// Keeps the first item for every key, in order.
fn dedupe_by<T>(items: Vec<T>, key: impl Fn(&T) -> String) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let id = key(item);
            if seen.insert(id.clone()) {
                true
            } else {
                debug!("skipping duplicate entity with unique_id {id}");
                false
            }
        })
        .collect()
}
