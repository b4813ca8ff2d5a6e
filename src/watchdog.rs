//! Coarse health check that reloads an account entry when its session has
//! been disconnected or silent for too long.
//!
//! The session's own tick retries relogin every few seconds, but a relogin
//! can report success without data ever flowing again. The watchdog looks
//! only at the outcome (connectivity and parameter timestamps) and asks the
//! host to rebuild the whole entry, at most once per cooldown window.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::client::{RemoteClient, is_connected};
use crate::config::WatchdogConfig;
use crate::host::{Host, TimerHandle, track_interval};
use crate::session::exceeds;
use crate::types::{Clock, EntryId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadReason {
    Disconnected,
    NoTimestamps,
    Stale { age: Duration, limit: Duration },
}

impl fmt::Display for ReloadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadReason::Disconnected => write!(f, "websocket disconnected"),
            ReloadReason::NoTimestamps => write!(f, "no timestamps available"),
            ReloadReason::Stale { age, limit } => write!(
                f,
                "stale data ({}s > {}s)",
                age.as_secs(),
                limit.as_secs()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Healthy,
    /// A reload was due but the previous one is too recent.
    Suppressed { reason: ReloadReason, remaining: Duration },
    Reloading(ReloadReason),
}

/// Decides whether the account needs a reload, ignoring cooldown.
pub fn reload_reason(
    connected: bool,
    latest_timestamp: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
    config: &WatchdogConfig,
) -> Option<ReloadReason> {
    if !connected {
        return Some(ReloadReason::Disconnected);
    }
    match latest_timestamp {
        None if exceeds(now, started_at, config.no_timestamp_grace()) => {
            Some(ReloadReason::NoTimestamps)
        }
        None => None,
        Some(latest) if exceeds(now, latest, config.stale_after) => Some(ReloadReason::Stale {
            age: (now - latest).to_std().unwrap_or_default(),
            limit: config.stale_after,
        }),
        Some(_) => None,
    }
}

/// Per-account watchdog state. Outlives the entry so the reload cooldown
/// holds across the unload/setup cycle a reload performs.
#[derive(Debug)]
pub struct WatchdogRecord {
    timer: Option<TimerHandle>,
    /// Bumped on every start; identifies the watchdog owning `timer`.
    generation: u64,
    started_at: DateTime<Utc>,
    last_reload: Option<DateTime<Utc>>,
}

impl WatchdogRecord {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            timer: None,
            generation: 0,
            started_at: now,
            last_reload: None,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_reload(&self) -> Option<DateTime<Utc>> {
        self.last_reload
    }

    pub fn is_running(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    fn owned_by(&self, generation: u64) -> bool {
        self.generation == generation
    }
}

/// Watchdog records keyed by account username.
#[derive(Default)]
pub struct WatchdogRegistry {
    records: Mutex<HashMap<String, Arc<Mutex<WatchdogRecord>>>>,
}

impl WatchdogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, account: &str, now: DateTime<Utc>) -> Arc<Mutex<WatchdogRecord>> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(account.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(WatchdogRecord::new(now))))
            .clone()
    }

    pub fn is_running(&self, account: &str) -> bool {
        self.with_record(account, WatchdogRecord::is_running)
            .unwrap_or(false)
    }

    pub fn last_reload(&self, account: &str) -> Option<DateTime<Utc>> {
        self.with_record(account, WatchdogRecord::last_reload)
            .flatten()
    }

    /// Cancels the account's watchdog and forgets its reload history.
    pub fn remove(&self, account: &str) {
        let removed = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(account);
        if let Some(record) = removed {
            record
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .cancel_timer();
        }
    }

    fn with_record<T>(&self, account: &str, f: impl FnOnce(&WatchdogRecord) -> T) -> Option<T> {
        let record = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(account)
            .cloned()?;
        let guard = record.lock().unwrap_or_else(PoisonError::into_inner);
        Some(f(&*guard))
    }
}

pub struct Watchdog {
    account: String,
    entry_id: EntryId,
    client: Arc<dyn RemoteClient>,
    host: Arc<dyn Host>,
    config: WatchdogConfig,
    clock: Arc<dyn Clock>,
    record: Arc<Mutex<WatchdogRecord>>,
    generation: u64,
}

impl Watchdog {
    /// Starts the account's watchdog, cancelling and replacing any running
    /// one. The "started" timestamp is reset; reload history is kept.
    pub fn start(
        registry: &WatchdogRegistry,
        account: &str,
        entry_id: EntryId,
        client: Arc<dyn RemoteClient>,
        host: Arc<dyn Host>,
        config: WatchdogConfig,
        clock: Arc<dyn Clock>,
    ) -> Arc<Watchdog> {
        let now = clock.now();
        let record = registry.record(account, now);
        let generation = {
            let mut record = record.lock().unwrap_or_else(PoisonError::into_inner);
            record.cancel_timer();
            record.generation += 1;
            record.started_at = now;
            record.generation
        };
        let watchdog = Arc::new(Watchdog {
            account: account.to_string(),
            entry_id,
            client,
            host,
            config,
            clock,
            record,
            generation,
        });

        let weak: Weak<Watchdog> = Arc::downgrade(&watchdog);
        let mut record = watchdog.record();
        record.timer = Some(track_interval(config.check_period, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(watchdog) => {
                        watchdog.check();
                        true
                    }
                    None => false,
                }
            }
        }));
        drop(record);

        debug!(account, "watchdog started");
        watchdog
    }

    /// True while this watchdog's own timer runs; a replaced watchdog is
    /// never running.
    pub fn is_running(&self) -> bool {
        let record = self.record();
        record.owned_by(self.generation) && record.is_running()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.record().started_at
    }

    pub fn last_reload(&self) -> Option<DateTime<Utc>> {
        self.record().last_reload
    }

    /// Stops this watchdog. A replacement started for the same account
    /// since then is left alone.
    pub fn cancel(&self) {
        let mut record = self.record();
        if record.owned_by(self.generation) {
            record.cancel_timer();
        }
    }

    /// One watchdog period. A due reload is submitted to the host as its own
    /// task; this never waits for it, since the reload replaces this watchdog.
    pub fn check(&self) -> CheckOutcome {
        let now = self.clock.now();
        let connected = is_connected(self.client.as_ref());
        let latest = if connected {
            self.client.devices().latest_timestamp()
        } else {
            None
        };

        let mut record = self.record();
        let Some(reason) = reload_reason(connected, latest, record.started_at, now, &self.config)
        else {
            return CheckOutcome::Healthy;
        };

        if let Some(last) = record.last_reload {
            let since = (now - last).to_std().unwrap_or_default();
            if since < self.config.reload_cooldown {
                let remaining = self.config.reload_cooldown - since;
                warn!(
                    account = %self.account,
                    "would reload ({reason}) but in cooldown ({}s remaining)",
                    remaining.as_secs()
                );
                return CheckOutcome::Suppressed { reason, remaining };
            }
        }

        record.last_reload = Some(now);
        if record.owned_by(self.generation) {
            record.cancel_timer();
        }
        drop(record);

        warn!(account = %self.account, "reloading config entry due to {reason}");
        let host = Arc::clone(&self.host);
        let entry_id = self.entry_id;
        let account = self.account.clone();
        tokio::spawn(async move {
            if let Err(e) = host.reload_entry(entry_id).await {
                warn!(account = %account, "reload of entry {entry_id} failed: {e}");
            }
        });
        CheckOutcome::Reloading(reason)
    }

    fn record(&self) -> MutexGuard<'_, WatchdogRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
