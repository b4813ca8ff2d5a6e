use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::Result;
use crate::types::EntryId;

/// Shutdown notification delivered by the host; carries nothing we use.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShutdownEvent;

/// The automation platform the integration runs inside.
#[async_trait]
pub trait Host: Send + Sync + 'static {
    /// Unloads and sets up the account entry again. Implementations are
    /// expected to go through `Integration::unload_entry` and
    /// `Integration::setup_entry`.
    async fn reload_entry(&self, entry_id: EntryId) -> Result<()>;
}

/// Cancellation handle for a periodic callback. Dropping it does not stop
/// the timer; call `cancel`.
#[derive(Debug)]
pub struct TimerHandle(JoinHandle<()>);

impl TimerHandle {
    pub fn cancel(&self) {
        self.0.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

/// Runs `callback` every `period`, first after one full period. The next
/// invocation is not started before the previous one has completed.
/// Returning `false` from the callback ends the timer.
pub(crate) fn track_interval<F, Fut>(period: Duration, mut callback: F) -> TimerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    TimerHandle(tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !callback().await {
                break;
            }
        }
    }))
}
