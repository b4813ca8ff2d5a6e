//! Routes pushed parameter updates to the entities watching them.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::client::UpdateCallback;
use crate::logger::ParameterLogger;
use crate::types::{Device, DeviceCollection, Parameter};

pub type EntityCallback = Arc<dyn Fn(&Device, &Parameter) + Send + Sync>;

type Key = (String, String);

pub struct UpdateFanout {
    account: String,
    subscribers: Mutex<HashMap<Key, BTreeMap<String, EntityCallback>>>,
    logger: Mutex<Option<ParameterLogger>>,
}

impl UpdateFanout {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            subscribers: Mutex::new(HashMap::new()),
            logger: Mutex::new(None),
        }
    }

    pub fn set_logger(&self, logger: ParameterLogger) {
        *self.logger.lock().unwrap_or_else(PoisonError::into_inner) = Some(logger);
    }

    /// Registers `callback` for one parameter. A second subscription with the
    /// same tag replaces the first.
    pub fn subscribe(
        &self,
        serial: &str,
        name: &str,
        tag: &str,
        callback: impl Fn(&Device, &Parameter) + Send + Sync + 'static,
    ) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((serial.to_string(), name.to_string()))
            .or_default()
            .insert(tag.to_string(), Arc::new(callback));
    }

    pub fn unsubscribe(&self, serial: &str, name: &str, tag: &str) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (serial.to_string(), name.to_string());
        if let Some(tags) = subscribers.get_mut(&key) {
            tags.remove(tag);
            if tags.is_empty() {
                subscribers.remove(&key);
            }
        }
    }

    pub fn clear(&self) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    pub fn on_parameter_updated(&self, device: &Device, param: &Parameter, create: bool) {
        let action = if create { "Create" } else { "update" };
        info!(
            account = %self.account,
            "{action} {} {} = {}",
            device.serial,
            param.name,
            param.value
        );

        if let Some(logger) = self
            .logger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            logger.log_update(device, param, create);
        }

        // Callbacks run outside the lock so they may (un)subscribe.
        let callbacks: Vec<EntityCallback> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(device.serial.clone(), param.name.clone()))
            .map(|tags| tags.values().cloned().collect())
            .unwrap_or_default();
        for cb in callbacks {
            cb(device, param);
        }
    }

    /// Re-dispatches every known parameter, e.g. after a command and refresh.
    pub fn notify_all(&self, devices: &DeviceCollection) {
        for device in devices.iter() {
            for param in device.parameters.values() {
                self.on_parameter_updated(device, param, false);
            }
        }
    }

    /// Callback to hand to `RemoteClient::start_websocket`.
    pub fn callback(self: &Arc<Self>) -> UpdateCallback {
        let fanout = Arc::clone(self);
        Arc::new(move |device: &Device, param: &Parameter, create: bool| {
            fanout.on_parameter_updated(device, param, create)
        })
    }
}
