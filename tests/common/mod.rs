#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use centrometal_boiler::{
    Circuit, Clock, Device, DeviceCollection, EntryId, Error, Host, Parameter, RemoteClient,
    Result, UpdateCallback,
};
use chrono::{DateTime, Duration, TimeZone, Utc};

pub const T0: i64 = 1_700_000_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(start)))
    }

    pub fn advance(&self, secs: i64) {
        *self.0.lock().unwrap() += Duration::seconds(secs);
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Scripted answers for `FakeClient`. `None` for `connected` makes the
/// connectivity read fail.
pub struct Script {
    pub login: bool,
    pub configuration: bool,
    pub refresh: bool,
    pub relogin: bool,
    pub connected: Option<bool>,
    pub websocket_fails: bool,
    pub turn: bool,
    pub turn_circuit: bool,
    /// How long `relogin` stays suspended before answering.
    pub relogin_delay: StdDuration,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            login: true,
            configuration: true,
            refresh: true,
            relogin: true,
            connected: Some(false),
            websocket_fails: false,
            turn: true,
            turn_circuit: true,
            relogin_delay: StdDuration::ZERO,
        }
    }
}

#[derive(Default)]
pub struct FakeClient {
    pub script: Mutex<Script>,
    devices: Mutex<DeviceCollection>,
    calls: Mutex<Vec<String>>,
    callback: Mutex<Option<UpdateCallback>>,
}

impl FakeClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_devices(devices: impl IntoIterator<Item = Device>) -> Arc<Self> {
        let client = Self::default();
        *client.devices.lock().unwrap() = devices.into_iter().collect();
        Arc::new(client)
    }

    pub fn script(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.script.lock().unwrap());
    }

    pub fn connected(&self) -> Option<bool> {
        self.script.lock().unwrap().connected
    }

    pub fn set_connected(&self, connected: bool) {
        self.script.lock().unwrap().connected = Some(connected);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than connectivity reads.
    pub fn actions(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c != "is_websocket_connected")
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == name).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn set_parameter(&self, serial: &str, param: Parameter) {
        let mut devices = self.devices.lock().unwrap();
        if let Some(device) = devices.get_mut(serial) {
            device.set_parameter(param);
        }
    }

    /// Simulates a websocket push through the registered callback.
    pub fn push(&self, serial: &str, param: Parameter) {
        self.set_parameter(serial, param.clone());
        let device = self.devices.lock().unwrap().get(serial).cloned().unwrap();
        let callback = self.callback.lock().unwrap().clone();
        if let Some(cb) = callback {
            cb(&device, &param, false);
        }
    }

    fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }
}

#[async_trait]
impl RemoteClient for FakeClient {
    async fn login(&self, _username: &str, _password: &str) -> Result<bool> {
        self.record("login");
        Ok(self.script.lock().unwrap().login)
    }

    async fn get_configuration(&self) -> Result<bool> {
        self.record("get_configuration");
        Ok(self.script.lock().unwrap().configuration)
    }

    fn devices(&self) -> DeviceCollection {
        self.devices.lock().unwrap().clone()
    }

    async fn start_websocket(&self, on_update: UpdateCallback) -> Result<()> {
        self.record("start_websocket");
        let mut script = self.script.lock().unwrap();
        if script.websocket_fails {
            return Err(Error::Transport("websocket refused".into()));
        }
        script.connected = Some(true);
        *self.callback.lock().unwrap() = Some(on_update);
        Ok(())
    }

    async fn close_websocket(&self) -> Result<()> {
        self.record("close_websocket");
        self.script.lock().unwrap().connected = Some(false);
        Ok(())
    }

    async fn refresh(&self) -> Result<bool> {
        self.record("refresh");
        Ok(self.script.lock().unwrap().refresh)
    }

    async fn relogin(&self) -> Result<bool> {
        self.record("relogin");
        let delay = self.script.lock().unwrap().relogin_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.script.lock().unwrap().relogin)
    }

    fn is_websocket_connected(&self) -> Result<bool> {
        self.record("is_websocket_connected");
        self.script
            .lock()
            .unwrap()
            .connected
            .ok_or(Error::NotConnected)
    }

    async fn close_session(&self) -> Result<()> {
        self.record("close_session");
        Ok(())
    }

    async fn turn(&self, serial: &str, on: bool) -> Result<bool> {
        self.record(&format!("turn {serial} {on}"));
        Ok(self.script.lock().unwrap().turn)
    }

    async fn turn_circuit(&self, serial: &str, dbindex: u32, on: bool) -> Result<bool> {
        self.record(&format!("turn_circuit {serial} {dbindex} {on}"));
        Ok(self.script.lock().unwrap().turn_circuit)
    }
}

#[derive(Default)]
pub struct RecordingHost {
    reloads: Mutex<Vec<EntryId>>,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reloads(&self) -> Vec<EntryId> {
        self.reloads.lock().unwrap().clone()
    }

    /// Lets spawned reload tasks run.
    pub async fn settle(&self) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl Host for RecordingHost {
    async fn reload_entry(&self, entry_id: EntryId) -> Result<()> {
        self.reloads.lock().unwrap().push(entry_id);
        Ok(())
    }
}

pub fn peltec() -> Device {
    let mut device = Device::new("PT-1001", "peltec2");
    device.product = "PelTec II".into();
    device.circuits.push(Circuit {
        title: "Radiators".into(),
        dbindex: 1,
    });
    device.set_parameter(Parameter::new("B_CMD", "1").with_timestamp(T0));
    device.set_parameter(Parameter::new("B_STATE", "ON").with_timestamp(T0 - 30));
    device.set_parameter(Parameter::new("PVAL_1_0", "1"));
    device.set_parameter(Parameter::new("PMIN_1_0", "0"));
    device.set_parameter(Parameter::new("PMAX_1_0", "1"));
    device
}

pub fn boiler_account() -> centrometal_boiler::AccountConfig {
    centrometal_boiler::AccountConfig::new("owner@example.com", "secret").prefix("Cellar")
}
