mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use centrometal_boiler::{
    CircuitSwitch, Device, Error, Parameter, PowerSwitch, SessionController, Switch, switches_for,
};
use common::{FakeClient, ManualClock, T0, at, boiler_account, peltec};

fn session(client: &Arc<FakeClient>) -> Arc<SessionController> {
    SessionController::builder(boiler_account(), client.clone())
        .clock(ManualClock::new(at(T0)))
        .build()
}

#[test]
fn power_switch_reads_command_then_state() {
    let client = FakeClient::with_devices([peltec()]);
    let session = session(&client);
    let device = peltec();
    let switch = PowerSwitch::new(session, &device);

    assert_eq!(switch.name(), "Cellar PelTec II Boiler Switch");
    assert_eq!(switch.unique_id(), "PT-1001");
    assert!(switch.is_on());
    assert_eq!(switch.last_updated(), Some(at(T0)));

    client.set_parameter("PT-1001", Parameter::new("B_CMD", "OFF"));
    assert!(!switch.is_on());

    // Empty command value falls back to the reported state.
    client.set_parameter("PT-1001", Parameter::new("B_CMD", ""));
    assert!(switch.is_on());
    client.set_parameter("PT-1001", Parameter::new("B_STATE", "OFF"));
    assert!(!switch.is_on());
}

#[test]
fn power_switch_unknown_device_is_off() {
    let client = FakeClient::new();
    let switch = PowerSwitch::new(session(&client), &peltec());
    assert!(!switch.is_on());
    assert!(!switch.available());
    assert!(switch.last_updated().is_none());
}

#[tokio::test]
async fn power_turn_refreshes_and_renotifies() {
    let client = FakeClient::with_devices([peltec()]);
    client.set_connected(true);
    let switch = PowerSwitch::new(session(&client), &peltec());
    assert!(switch.available());

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = hits.clone();
    switch.watch(move |_, _| {
        hits_clone.fetch_add(1, Ordering::SeqCst);
    });

    switch.turn(false).await.unwrap();
    assert_eq!(client.actions(), vec!["turn PT-1001 false", "refresh"]);
    // B_CMD and B_STATE both re-published.
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    switch.unwatch();
    switch.turn(true).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn refused_power_command_still_refreshes() {
    let client = FakeClient::with_devices([peltec()]);
    client.script(|s| s.turn = false);
    let switch = PowerSwitch::new(session(&client), &peltec());

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = hits.clone();
    switch.watch(move |_, _| {
        hits_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert!(matches!(switch.turn(true).await, Err(Error::Command(_))));
    assert_eq!(client.actions(), vec!["turn PT-1001 true", "refresh"]);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn circuit_switch_compares_value_with_on_value() {
    let client = FakeClient::with_devices([peltec()]);
    let device = peltec();
    let switch = CircuitSwitch::new(session(&client), &device, &device.circuits[0]);

    assert_eq!(switch.name(), "Cellar Radiators");
    assert_eq!(switch.unique_id(), "PT-1001_switch_1");
    assert!(switch.is_on());

    client.set_parameter("PT-1001", Parameter::new("PVAL_1_0", "0"));
    assert!(!switch.is_on());

    client.set_parameter("PT-1001", Parameter::new("PVAL_1_0", "n/a"));
    assert!(!switch.is_on());
}

#[tokio::test]
async fn circuit_command_dispatch() {
    let client = FakeClient::with_devices([peltec()]);
    let device = peltec();
    let switch = CircuitSwitch::new(session(&client), &device, &device.circuits[0]);

    switch.turn(false).await.unwrap();
    assert_eq!(client.actions(), vec!["turn_circuit PT-1001 1 false"]);
}

#[tokio::test]
async fn refused_circuit_command_relogs() {
    let client = FakeClient::with_devices([peltec()]);
    client.script(|s| s.turn_circuit = false);
    let device = peltec();
    let session = session(&client);
    let switch = CircuitSwitch::new(session.clone(), &device, &device.circuits[0]);

    assert!(switch.turn(true).await.is_err());
    assert_eq!(client.count("relogin"), 1);
    assert_eq!(session.last_relogin(), at(T0));
}

#[test]
fn switches_for_supported_devices() {
    let mut heater = Device::new("BX-7", "biopl");
    heater.product = "BioPlex".into();
    let mut other = Device::new("ZZ-1", "unknown");
    other.product = "Other".into();
    let client = FakeClient::with_devices([peltec(), heater, other]);

    let switches = switches_for(&session(&client));
    let ids: Vec<_> = switches.iter().map(Switch::unique_id).collect();
    assert_eq!(ids, vec!["BX-7", "PT-1001", "PT-1001_switch_1"]);
    assert!(matches!(switches[2], Switch::Circuit(_)));
}
