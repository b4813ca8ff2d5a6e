//! Command surfaces for the boiler's power and heating circuits.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::client::is_connected;
use crate::session::SessionController;
use crate::types::{Circuit, Device, Parameter, value_is_on};
use crate::{Error, Result};

/// Device families that accept a power command.
pub const POWER_SWITCH_KINDS: &[&str] = &["peltec2", "cmpelet", "biopl"];

const PARAM_CMD: &str = "B_CMD";
const PARAM_STATE: &str = "B_STATE";

fn present(param: Option<&Parameter>) -> Option<&Parameter> {
    param.filter(|p| !p.value.is_empty())
}

/// Main boiler on/off.
pub struct PowerSwitch {
    session: Arc<SessionController>,
    serial: String,
    name: String,
}

impl PowerSwitch {
    pub fn new(session: Arc<SessionController>, device: &Device) -> Self {
        let name = format!("{}{} Boiler Switch", session.prefix(), device.product);
        Self {
            session,
            serial: device.serial.clone(),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_id(&self) -> &str {
        &self.serial
    }

    /// On/off as commanded (`B_CMD`), or from the reported state when no
    /// command value is known.
    pub fn is_on(&self) -> bool {
        let devices = self.session.client().devices();
        let Some(device) = devices.get(&self.serial) else {
            return false;
        };
        if let Some(cmd) = present(device.parameter(PARAM_CMD)) {
            return value_is_on(&cmd.value);
        }
        present(device.parameter(PARAM_STATE)).is_some_and(|state| state.value != "OFF")
    }

    pub fn available(&self) -> bool {
        is_connected(self.session.client().as_ref())
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        let devices = self.session.client().devices();
        let device = devices.get(&self.serial)?;
        [PARAM_CMD, PARAM_STATE]
            .iter()
            .filter_map(|name| device.parameter(name))
            .find_map(Parameter::timestamp_utc)
    }

    /// Sends the command, refreshes, and re-publishes every parameter so
    /// watchers see the new state without waiting for a push. The refresh
    /// runs even when the command is refused; the refusal is reported after.
    pub async fn turn(&self, on: bool) -> Result<()> {
        let client = self.session.client();
        let accepted = client.turn(&self.serial, on).await?;
        if !accepted {
            warn!(serial = %self.serial, on, "boiler power command refused");
        }
        if client.refresh().await? {
            self.session.fanout().notify_all(&client.devices());
        }
        if !accepted {
            return Err(Error::Command(format!("turn {} {}", self.serial, on)));
        }
        Ok(())
    }

    /// Calls `callback` whenever the command or state parameter changes.
    pub fn watch(&self, callback: impl Fn(&Device, &Parameter) + Send + Sync + 'static) {
        let callback = Arc::new(callback);
        for name in [PARAM_CMD, PARAM_STATE] {
            let cb = Arc::clone(&callback);
            self.session
                .fanout()
                .subscribe(&self.serial, name, "switch", move |d, p| cb(d, p));
        }
    }

    pub fn unwatch(&self) {
        for name in [PARAM_CMD, PARAM_STATE] {
            self.session.fanout().unsubscribe(&self.serial, name, "switch");
        }
    }
}

/// One heating circuit's on/off, driven by its `PVAL`/`PMAX` parameter pair.
pub struct CircuitSwitch {
    session: Arc<SessionController>,
    serial: String,
    dbindex: u32,
    name: String,
    unique_id: String,
}

impl CircuitSwitch {
    pub fn new(session: Arc<SessionController>, device: &Device, circuit: &Circuit) -> Self {
        let name = format!("{}{}", session.prefix(), circuit.title);
        Self {
            unique_id: format!("{}_switch_{}", device.serial, circuit.dbindex),
            session,
            serial: device.serial.clone(),
            dbindex: circuit.dbindex,
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn param_names(&self) -> [String; 4] {
        let i = self.dbindex;
        [
            format!("PDEF_{i}_0"),
            format!("PVAL_{i}_0"),
            format!("PMIN_{i}_0"),
            format!("PMAX_{i}_0"),
        ]
    }

    fn tag(&self) -> String {
        format!("table_{}_switch", self.dbindex)
    }

    /// On when the current value equals the circuit's "on" value; anything
    /// unparsable reads as off.
    pub fn is_on(&self) -> bool {
        let devices = self.session.client().devices();
        let Some(device) = devices.get(&self.serial) else {
            return false;
        };
        let int_value = |name: String| {
            device
                .parameter(&name)
                .and_then(|p| p.value.trim().parse::<i64>().ok())
        };
        let state = int_value(format!("PVAL_{}_0", self.dbindex));
        let on_value = int_value(format!("PMAX_{}_0", self.dbindex));
        matches!((state, on_value), (Some(s), Some(on)) if s == on)
    }

    pub fn available(&self) -> bool {
        is_connected(self.session.client().as_ref())
    }

    /// A refused or failed command triggers a session relogin.
    pub async fn turn(&self, on: bool) -> Result<()> {
        let accepted = match self
            .session
            .client()
            .turn_circuit(&self.serial, self.dbindex, on)
            .await
        {
            Ok(ok) => ok,
            Err(e) => {
                debug!(serial = %self.serial, dbindex = self.dbindex, "circuit command failed: {e}");
                false
            }
        };
        if accepted {
            return Ok(());
        }
        warn!(serial = %self.serial, dbindex = self.dbindex, on, "circuit command refused, relogin");
        self.session.relogin().await?;
        Err(Error::Command(format!(
            "turn circuit {} of {} {}",
            self.dbindex, self.serial, on
        )))
    }

    pub fn watch(&self, callback: impl Fn(&Device, &Parameter) + Send + Sync + 'static) {
        let callback = Arc::new(callback);
        let tag = self.tag();
        for name in self.param_names() {
            let cb = Arc::clone(&callback);
            self.session
                .fanout()
                .subscribe(&self.serial, &name, &tag, move |d, p| cb(d, p));
        }
    }

    pub fn unwatch(&self) {
        let tag = self.tag();
        for name in self.param_names() {
            self.session.fanout().unsubscribe(&self.serial, &name, &tag);
        }
    }
}

pub enum Switch {
    Power(PowerSwitch),
    Circuit(CircuitSwitch),
}

impl Switch {
    pub fn name(&self) -> &str {
        match self {
            Switch::Power(s) => s.name(),
            Switch::Circuit(s) => s.name(),
        }
    }

    pub fn unique_id(&self) -> &str {
        match self {
            Switch::Power(s) => s.unique_id(),
            Switch::Circuit(s) => s.unique_id(),
        }
    }

    pub fn is_on(&self) -> bool {
        match self {
            Switch::Power(s) => s.is_on(),
            Switch::Circuit(s) => s.is_on(),
        }
    }

    pub fn available(&self) -> bool {
        match self {
            Switch::Power(s) => s.available(),
            Switch::Circuit(s) => s.available(),
        }
    }

    pub async fn turn(&self, on: bool) -> Result<()> {
        match self {
            Switch::Power(s) => s.turn(on).await,
            Switch::Circuit(s) => s.turn(on).await,
        }
    }

    pub fn unwatch(&self) {
        match self {
            Switch::Power(s) => s.unwatch(),
            Switch::Circuit(s) => s.unwatch(),
        }
    }
}

/// Power switch for supported boiler families plus one switch per circuit.
pub fn switches_for(session: &Arc<SessionController>) -> Vec<Switch> {
    let mut switches = Vec::new();
    for device in session.client().devices().iter() {
        if POWER_SWITCH_KINDS.contains(&device.kind.as_str()) {
            switches.push(Switch::Power(PowerSwitch::new(Arc::clone(session), device)));
        }
        for circuit in &device.circuits {
            switches.push(Switch::Circuit(CircuitSwitch::new(
                Arc::clone(session),
                device,
                circuit,
            )));
        }
    }
    debug!(
        account = %session.username(),
        count = switches.len(),
        "adding boiler controls as switches"
    );
    switches
}
