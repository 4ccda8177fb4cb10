//! Liveness monitoring for channels.
//!
//! [`LivenessMonitor`] watches the time a controller last accepted a state
//! and reports the channel as stale when no update has been accepted for
//! more than twice the check interval. It only observes: it never closes,
//! retries or touches channel state.
//!
//! The acceptance time comes from a `watch` channel rather than the event
//! feed. A burst of rejected packages can overflow the event feed, but it
//! can never move the acceptance time.

use std::time::Duration;

use relaypay_lib::{ChannelError, ChannelId, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Starts liveness checks for a channel.
pub struct LivenessMonitor;

impl LivenessMonitor {
    /// Watch `last_accepted` and call `on_stale(channel_id, elapsed)` on
    /// every check where more than `2 * interval` has passed since the last
    /// accepted update.
    ///
    /// Checks run every `interval`, starting one interval after this call.
    /// The clock starts now, so a channel that never sees an update is
    /// reported once `2 * interval` has passed. Reports repeat on each
    /// check until an update is accepted.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Config`] if `interval` is zero or too large.
    pub fn start<F>(
        channel_id: ChannelId,
        interval: Duration,
        last_accepted: watch::Receiver<Option<Instant>>,
        on_stale: F,
    ) -> Result<LivenessHandle>
    where
        F: Fn(&ChannelId, Duration) + Send + 'static,
    {
        if interval.is_zero() {
            return Err(ChannelError::Config(
                "liveness interval must be positive".into(),
            ));
        }
        let threshold = interval
            .checked_mul(2)
            .ok_or_else(|| ChannelError::Config("liveness interval too large".into()))?;

        let started_at = Instant::now();
        let first_check = started_at.checked_add(interval).ok_or_else(|| {
            ChannelError::Config("liveness interval too large".into())
        })?;
        let watched = channel_id.clone();
        let feed = last_accepted.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_check, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let elapsed = latest(&feed, started_at).elapsed();
                if elapsed > threshold {
                    tracing::warn!(channel_id = %watched, ?elapsed, "channel is stale");
                    on_stale(&watched, elapsed);
                }
            }
        });

        Ok(LivenessHandle {
            channel_id,
            threshold,
            started_at,
            last_accepted,
            task,
        })
    }
}

/// Latest acceptance, never earlier than the monitor's start.
fn latest(feed: &watch::Receiver<Option<Instant>>, started_at: Instant) -> Instant {
    match *feed.borrow() {
        Some(accepted) => accepted.max(started_at),
        None => started_at,
    }
}

/// Handle to a running liveness monitor.
///
/// The periodic check stops on [`stop`](Self::stop) or when the handle is
/// dropped.
#[must_use = "dropping the handle stops the monitor"]
#[derive(Debug)]
pub struct LivenessHandle {
    channel_id: ChannelId,
    threshold: Duration,
    started_at: Instant,
    last_accepted: watch::Receiver<Option<Instant>>,
    task: JoinHandle<()>,
}

impl LivenessHandle {
    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// When the last accepted update happened (or the monitor started).
    pub fn last_accepted_at(&self) -> Instant {
        latest(&self.last_accepted, self.started_at)
    }

    /// Silence longer than this is reported.
    pub fn stale_threshold(&self) -> Duration {
        self.threshold
    }

    /// Whether the channel is stale right now, independent of check ticks.
    pub fn is_stale(&self) -> bool {
        self.last_accepted_at().elapsed() > self.threshold
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the periodic check.
    pub fn stop(self) {
        // Drop aborts the task
    }
}

impl Drop for LivenessHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
