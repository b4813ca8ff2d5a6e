use std::sync::Arc;

use tracing::{debug, error};

use crate::client::RemoteClient;
use crate::config::{AccountConfig, Settings};
use crate::fanout::UpdateFanout;
use crate::host::{Host, ShutdownEvent};
use crate::logger::ParameterLogger;
use crate::sensor::{ConnectionStatus, ParameterSensor, connection_status_for, sensors_for};
use crate::session::{SessionController, SessionState};
use crate::switch::{Switch, switches_for};
use crate::types::{Clock, EntryId, SystemClock};
use crate::watchdog::{Watchdog, WatchdogRegistry};

/// Everything that belongs to one configured account while it is loaded.
pub struct AccountEntry {
    entry_id: EntryId,
    session: Arc<SessionController>,
    watchdog: Option<Arc<Watchdog>>,
    switches: Vec<Switch>,
    sensors: Vec<ParameterSensor>,
    connection: Vec<ConnectionStatus>,
}

impl AccountEntry {
    pub fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    pub fn username(&self) -> &str {
        self.session.username()
    }

    pub fn session(&self) -> &Arc<SessionController> {
        &self.session
    }

    pub fn watchdog(&self) -> Option<&Arc<Watchdog>> {
        self.watchdog.as_ref()
    }

    pub fn switches(&self) -> &[Switch] {
        &self.switches
    }

    pub fn sensors(&self) -> &[ParameterSensor] {
        &self.sensors
    }

    pub fn connection_status(&self) -> &[ConnectionStatus] {
        &self.connection
    }

    pub fn is_started(&self) -> bool {
        !matches!(
            self.session.state(),
            SessionState::Unstarted | SessionState::Failed
        )
    }

    /// Host shutdown hook. Timers go first so neither the tick nor the
    /// watchdog can reconnect the account after the websocket is closed.
    pub async fn on_shutdown(&self, event: ShutdownEvent) {
        if let Some(watchdog) = &self.watchdog {
            watchdog.cancel();
        }
        self.session.cancel_tick();
        if let Err(e) = self.session.stop(Some(event)).await {
            debug!(account = %self.username(), "stop on shutdown failed: {e}");
        }
    }
}

/// Integration-wide context: the host, tunables, and the watchdog records
/// shared by every account entry.
pub struct Integration {
    host: Arc<dyn Host>,
    settings: Settings,
    clock: Arc<dyn Clock>,
    watchdogs: WatchdogRegistry,
}

impl Integration {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            settings: Settings::default(),
            clock: Arc::new(SystemClock),
            watchdogs: WatchdogRegistry::new(),
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn watchdogs(&self) -> &WatchdogRegistry {
        &self.watchdogs
    }

    pub async fn setup_entry(
        &self,
        entry_id: EntryId,
        account: AccountConfig,
        client: Arc<dyn RemoteClient>,
    ) -> AccountEntry {
        self.setup_entry_with_log(entry_id, account, client, None).await
    }

    /// Starts the session; only a successful start gets a tick, a watchdog
    /// and entities. A failed start is reported once and not retried.
    pub async fn setup_entry_with_log(
        &self,
        entry_id: EntryId,
        account: AccountConfig,
        client: Arc<dyn RemoteClient>,
        parameter_log: Option<ParameterLogger>,
    ) -> AccountEntry {
        debug!(account = %account.email, "setting up web boiler system");

        let fanout = Arc::new(UpdateFanout::new(account.email.clone()));
        if let Some(logger) = parameter_log {
            fanout.set_logger(logger);
        }
        let session = SessionController::builder(account, Arc::clone(&client))
            .config(self.settings.session)
            .clock(Arc::clone(&self.clock))
            .fanout(fanout)
            .build();

        if !session.start().await {
            error!(
                account = %session.username(),
                "setup of web boiler system failed"
            );
            return AccountEntry {
                entry_id,
                session,
                watchdog: None,
                switches: Vec::new(),
                sensors: Vec::new(),
                connection: Vec::new(),
            };
        }

        session.start_tick();
        let watchdog = Watchdog::start(
            &self.watchdogs,
            session.username(),
            entry_id,
            client,
            Arc::clone(&self.host),
            self.settings.watchdog,
            Arc::clone(&self.clock),
        );
        let switches = switches_for(&session);
        let sensors = sensors_for(&session);
        let connection = connection_status_for(&session);

        debug!(account = %session.username(), "web boiler system setup finished");
        AccountEntry {
            entry_id,
            session,
            watchdog: Some(watchdog),
            switches,
            sensors,
            connection,
        }
    }

    /// Stops timers before closing the session so no callback reaches a
    /// torn-down entry. Teardown errors are logged and ignored.
    pub async fn unload_entry(&self, entry: AccountEntry) -> bool {
        if let Some(watchdog) = &entry.watchdog {
            watchdog.cancel();
        }
        entry.session.cancel_tick();
        if let Err(e) = entry.session.stop(None).await {
            debug!(account = %entry.username(), "stop during unload failed: {e}");
        }
        for switch in &entry.switches {
            switch.unwatch();
        }
        for sensor in &entry.sensors {
            sensor.unwatch();
        }
        entry.session.fanout().clear();
        true
    }

    /// Unloads and also forgets the account's watchdog history.
    pub async fn remove_entry(&self, entry: AccountEntry) -> bool {
        let username = entry.username().to_string();
        let unloaded = self.unload_entry(entry).await;
        self.watchdogs.remove(&username);
        unloaded
    }
}
