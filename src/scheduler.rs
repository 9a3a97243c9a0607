//! Location refresh scheduler
//!
//! Re-acquires the local actor's position on a fixed interval and publishes it
//! to `users/{actorId}`. The schedule belongs to one session: once stopped it
//! never fires again and any refresh still in flight is abandoned unwritten.
//!
//! ```text
//! Idle ──> Acquiring ──> Published ──(wait)──> Acquiring ──> ...
//!   any state ──stop──> Stopped
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{HeartwaveError, Result};
use crate::models::{now_millis, ActorId, PositionRecord, USERS};
use crate::position::PositionSource;
use crate::store::DocumentStore;

/// Where the refresh cycle currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// Nothing published yet, or the last attempt failed
    Idle,
    /// Waiting for a position fix or the store write
    Acquiring,
    /// Latest fix written
    Published,
    /// Torn down; terminal
    Stopped,
}

/// The acquire-and-publish step, shared by the timer loop and manual refreshes.
struct Refresher {
    actor: ActorId,
    positions: Arc<dyn PositionSource>,
    store: Arc<dyn DocumentStore>,
    state: watch::Sender<RefreshState>,
}

impl Refresher {
    fn is_stopped(&self) -> bool {
        *self.state.borrow() == RefreshState::Stopped
    }

    /// Move to `next` unless already stopped.
    fn transition(&self, next: RefreshState) {
        self.state.send_if_modified(|current| {
            if *current == RefreshState::Stopped || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn stop(&self) {
        self.state.send_replace(RefreshState::Stopped);
    }

    async fn refresh_once(&self) -> Result<PositionRecord> {
        if self.is_stopped() {
            return Err(HeartwaveError::InvalidState(
                "location refresh already stopped".into(),
            ));
        }
        self.transition(RefreshState::Acquiring);

        let mut state_rx = self.state.subscribe();
        let published = tokio::select! {
            biased;
            _ = wait_stopped(&mut state_rx) => {
                return Err(HeartwaveError::InvalidState(
                    "location refresh abandoned: scheduler stopped".into(),
                ));
            }
            result = self.acquire_and_publish() => result,
        };

        match published {
            Ok(record) => {
                self.transition(RefreshState::Published);
                Ok(record)
            }
            Err(e) => {
                self.transition(RefreshState::Idle);
                Err(e)
            }
        }
    }

    async fn acquire_and_publish(&self) -> Result<PositionRecord> {
        let fix = self.positions.current_position().await?;
        if self.is_stopped() {
            return Err(HeartwaveError::InvalidState(
                "location refresh abandoned: scheduler stopped".into(),
            ));
        }

        let record = PositionRecord::new(self.actor.clone(), fix, now_millis());
        self.store
            .put(USERS, self.actor.as_str(), record.to_fields(), true)
            .await?;
        debug!(
            actor = %self.actor,
            latitude = record.latitude,
            longitude = record.longitude,
            "Position published"
        );
        Ok(record)
    }
}

async fn wait_stopped(rx: &mut watch::Receiver<RefreshState>) {
    let _ = rx.wait_for(|s| *s == RefreshState::Stopped).await;
}

/// Periodic position refresh for one actor.
///
/// Dropping the scheduler stops it.
pub struct LocationRefreshScheduler {
    refresher: Arc<Refresher>,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl LocationRefreshScheduler {
    pub fn new(
        actor: ActorId,
        positions: Arc<dyn PositionSource>,
        store: Arc<dyn DocumentStore>,
        interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(RefreshState::Idle);
        Self {
            refresher: Arc::new(Refresher {
                actor,
                positions,
                store,
                state,
            }),
            interval,
            task: None,
        }
    }

    /// Start the timer. The first scheduled refresh happens one interval from
    /// now; starting twice is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.refresher.is_stopped() {
            return Err(HeartwaveError::InvalidState(
                "cannot restart a stopped location refresh".into(),
            ));
        }
        if self.task.is_some() {
            return Ok(());
        }

        let refresher = self.refresher.clone();
        let period = self.interval;
        self.task = Some(tokio::spawn(run_schedule(refresher, period)));
        info!(
            actor = %self.refresher.actor,
            interval_secs = self.interval.as_secs(),
            "Location refresh started"
        );
        Ok(())
    }

    /// Acquire and publish right away, outside the schedule. The timer keeps
    /// its cadence.
    pub async fn refresh_now(&self) -> Result<PositionRecord> {
        self.refresher.refresh_once().await
    }

    pub fn state(&self) -> RefreshState {
        *self.refresher.state.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<RefreshState> {
        self.refresher.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some() && !self.refresher.is_stopped()
    }

    /// Cancel the timer and any refresh in flight.
    pub fn stop(&mut self) {
        if self.refresher.is_stopped() {
            return;
        }
        self.refresher.stop();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        info!(actor = %self.refresher.actor, "Location refresh stopped");
    }
}

impl Drop for LocationRefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_schedule(refresher: Arc<Refresher>, period: Duration) {
    let mut state_rx = refresher.state.subscribe();
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = wait_stopped(&mut state_rx) => break,
            _ = tick.tick() => {
                match refresher.refresh_once().await {
                    Ok(_) => {}
                    Err(HeartwaveError::InvalidState(_)) => break,
                    // Fixed cadence: the next tick simply tries again
                    Err(e) => warn!(actor = %refresher.actor, error = %e, "Scheduled location refresh failed"),
                }
            }
        }
    }
    debug!(actor = %refresher.actor, "Location refresh loop exited");
}
