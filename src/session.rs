use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::client::{RemoteClient, is_connected};
use crate::config::{AccountConfig, SessionConfig};
use crate::fanout::UpdateFanout;
use crate::host::{ShutdownEvent, TimerHandle, track_interval};
use crate::types::{Clock, SystemClock};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unstarted,
    /// `start()` returned false.
    Failed,
    Connected,
    Disconnected,
    /// Terminal.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unstarted,
    Failed,
    Running,
    Stopped,
}

struct Timestamps {
    last_relogin: DateTime<Utc>,
    last_refresh: DateTime<Utc>,
}

pub struct SessionControllerBuilder {
    account: AccountConfig,
    client: Arc<dyn RemoteClient>,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    fanout: Option<Arc<UpdateFanout>>,
}

impl SessionControllerBuilder {
    pub fn new(account: AccountConfig, client: Arc<dyn RemoteClient>) -> Self {
        Self {
            account,
            client,
            config: SessionConfig::default(),
            clock: Arc::new(SystemClock),
            fanout: None,
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn fanout(mut self, fanout: Arc<UpdateFanout>) -> Self {
        self.fanout = Some(fanout);
        self
    }

    pub fn build(self) -> Arc<SessionController> {
        let now = self.clock.now();
        let fanout = self
            .fanout
            .unwrap_or_else(|| Arc::new(UpdateFanout::new(self.account.email.clone())));
        Arc::new(SessionController {
            prefix: self.account.display_prefix(),
            account: self.account,
            client: self.client,
            config: self.config,
            clock: self.clock,
            fanout,
            timestamps: Mutex::new(Timestamps {
                last_relogin: now,
                last_refresh: now,
            }),
            phase: Mutex::new(Phase::Unstarted),
            tick: Mutex::new(None),
        })
    }
}

/// Supervises the remote session of one account: initial start, the
/// one-second tick that refreshes or reconnects, and shutdown.
pub struct SessionController {
    account: AccountConfig,
    prefix: String,
    client: Arc<dyn RemoteClient>,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    fanout: Arc<UpdateFanout>,
    timestamps: Mutex<Timestamps>,
    phase: Mutex<Phase>,
    tick: Mutex<Option<TimerHandle>>,
}

impl SessionController {
    pub fn builder(account: AccountConfig, client: Arc<dyn RemoteClient>) -> SessionControllerBuilder {
        SessionControllerBuilder::new(account, client)
    }

    pub fn username(&self) -> &str {
        &self.account.email
    }

    /// Name prefix for entities of this account (empty or ending in a space).
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn client(&self) -> &Arc<dyn RemoteClient> {
        &self.client
    }

    pub fn fanout(&self) -> &Arc<UpdateFanout> {
        &self.fanout
    }

    pub fn last_relogin(&self) -> DateTime<Utc> {
        self.timestamps().last_relogin
    }

    pub fn last_refresh(&self) -> DateTime<Utc> {
        self.timestamps().last_refresh
    }

    pub fn state(&self) -> SessionState {
        match *self.phase() {
            Phase::Unstarted => SessionState::Unstarted,
            Phase::Failed => SessionState::Failed,
            Phase::Stopped => SessionState::Stopped,
            Phase::Running if is_connected(self.client.as_ref()) => SessionState::Connected,
            Phase::Running => SessionState::Disconnected,
        }
    }

    pub fn is_ticking(&self) -> bool {
        self.tick_slot()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Login, configuration, push channel, initial refresh. The first failing
    /// step aborts the rest; anything opened after login is closed again.
    pub async fn start(&self) -> bool {
        debug!(account = %self.account.email, "starting web boiler session");
        match self.try_start().await {
            Ok(()) => {
                *self.phase() = Phase::Running;
                true
            }
            Err(e) => {
                error!(account = %self.account.email, "authentication failed: {e}");
                *self.phase() = Phase::Failed;
                false
            }
        }
    }

    async fn try_start(&self) -> Result<()> {
        let username = &self.account.email;
        if !self.client.login(username, &self.account.password).await? {
            return Err(Error::Authentication(username.clone()));
        }
        if let Err(e) = self.open_channel().await {
            self.close_transport().await;
            return Err(e);
        }
        Ok(())
    }

    async fn open_channel(&self) -> Result<()> {
        let username = &self.account.email;
        if !self.client.get_configuration().await? {
            return Err(Error::Configuration(username.clone()));
        }
        if self.client.devices().is_empty() {
            return Err(Error::NoDevices(username.clone()));
        }

        self.client.start_websocket(self.fanout.callback()).await?;

        match self.client.refresh().await {
            Ok(true) => {}
            Ok(false) => warn!(account = %username, "initial refresh was refused"),
            Err(e) => warn!(account = %username, "initial refresh failed: {e}"),
        }
        self.timestamps().last_refresh = self.clock.now();
        Ok(())
    }

    /// Installs the periodic tick, replacing any previous one. Errors from a
    /// tick are logged and never stop the timer.
    pub fn start_tick(self: &Arc<Self>) {
        self.cancel_tick();

        let session: Weak<SessionController> = Arc::downgrade(self);
        let handle = track_interval(self.config.tick_period, move || {
            let session = session.clone();
            async move {
                let Some(session) = session.upgrade() else {
                    return false;
                };
                if let Err(e) = session.tick().await {
                    warn!(account = %session.account.email, "tick raised: {e}");
                }
                true
            }
        });
        *self.tick_slot() = Some(handle);
    }

    pub fn cancel_tick(&self) {
        if let Some(handle) = self.tick_slot().take() {
            handle.cancel();
        }
    }

    /// One supervision step: reconnect while offline, refresh while online.
    pub async fn tick(&self) -> Result<()> {
        if self.is_stopped() {
            return Ok(());
        }
        let now = self.clock.now();

        if !is_connected(self.client.as_ref()) {
            let last_relogin = self.timestamps().last_relogin;
            if exceeds(now, last_relogin, self.config.login_retry_interval) {
                info!(account = %self.account.email, "trying to relogin");
                self.relogin().await?;
            }
            return Ok(());
        }

        let refresh_due = {
            let mut ts = self.timestamps();
            if exceeds(now, ts.last_refresh, self.config.refresh_interval) {
                ts.last_refresh = now;
                true
            } else {
                false
            }
        };
        if !refresh_due {
            return Ok(());
        }

        info!(account = %self.account.email, "refresh data");
        let refreshed = match self.client.refresh().await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(account = %self.account.email, "refresh failed: {e}");
                false
            }
        };
        if !refreshed && !self.is_stopped() {
            self.relogin().await?;
        }
        Ok(())
    }

    /// Tears the session down and logs in again. The attempt is timestamped
    /// before any network call so the tick does not retry within the
    /// login-retry interval. Returns whether the relogin succeeded. A
    /// session stopped while the relogin is in flight stays closed.
    pub async fn relogin(&self) -> Result<bool> {
        self.timestamps().last_relogin = self.clock.now();

        self.close_transport().await;

        let relogged = match self.client.relogin().await {
            Ok(ok) => ok,
            Err(e) => {
                debug!(account = %self.account.email, "relogin call failed: {e}");
                false
            }
        };
        if self.is_stopped() {
            debug!(account = %self.account.email, "session stopped during relogin");
            return Ok(false);
        }
        if !relogged {
            warn!(account = %self.account.email, "failed to relogin");
            return Ok(false);
        }

        self.client
            .start_websocket(self.fanout.callback())
            .await
            .map_err(|e| Error::Relogin(format!("{}: {e}", self.account.email)))?;
        if self.is_stopped() {
            debug!(account = %self.account.email, "session stopped during relogin");
            self.close_transport().await;
            return Ok(false);
        }

        let refreshed = self
            .client
            .refresh()
            .await
            .map_err(|e| Error::Refresh(format!("{}: {e}", self.account.email)))?;
        if refreshed {
            self.timestamps().last_refresh = self.clock.now();
        }
        Ok(true)
    }

    /// Closes the push channel. Takes the host's shutdown event so it can be
    /// registered as a shutdown hook directly.
    pub async fn stop(&self, _event: Option<ShutdownEvent>) -> Result<()> {
        debug!(account = %self.account.email, "stopping web boiler session");
        *self.phase() = Phase::Stopped;
        self.client.close_websocket().await
    }

    async fn close_transport(&self) {
        if let Err(e) = self.client.close_websocket().await {
            debug!(account = %self.account.email, "closing websocket failed: {e}");
        }
        if let Err(e) = self.client.close_session().await {
            debug!(account = %self.account.email, "closing http session failed: {e}");
        }
    }

    fn is_stopped(&self) -> bool {
        *self.phase() == Phase::Stopped
    }

    fn timestamps(&self) -> MutexGuard<'_, Timestamps> {
        self.timestamps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tick_slot(&self) -> MutexGuard<'_, Option<TimerHandle>> {
        self.tick.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// True when strictly more than `interval` has passed since `since`.
pub(crate) fn exceeds(now: DateTime<Utc>, since: DateTime<Utc>, interval: Duration) -> bool {
    (now - since)
        .to_std()
        .is_ok_and(|elapsed| elapsed > interval)
}
