//! Notification dispatch scheduler.
//!
//! One background task per process. Every `frequency` it loads the pending
//! notifications under a fresh `timeout`-bounded deadline, hands each to the
//! sender and marks the ones that went out. A failed send leaves the
//! notification pending for the next tick; a send whose mark-sent write fails
//! will be sent again, so delivery is at-least-once.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::repo::NotificationRepo;
use crate::sender::Sender;
use crate::store::Deadline;

/// Outcome of a single tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub fetched: usize,
    pub sent: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct NotificationScheduler {
    notifications: Arc<dyn NotificationRepo>,
    sender: Arc<dyn Sender>,
}

impl NotificationScheduler {
    pub fn new(notifications: Arc<dyn NotificationRepo>, sender: Arc<dyn Sender>) -> Self {
        Self {
            notifications,
            sender,
        }
    }

    /// Spawns the dispatch loop. Cancelling `stop` (or calling
    /// [`SchedulerHandle::stop`]) ends it before the next tick starts.
    /// Both periods must be non-zero.
    pub fn start(
        self,
        stop: CancellationToken,
        frequency: Duration,
        timeout: Duration,
    ) -> Result<SchedulerHandle> {
        if frequency.is_zero() {
            return Err(Error::validation("notification frequency must be non-zero"));
        }
        if timeout.is_zero() {
            return Err(Error::validation("notification timeout must be non-zero"));
        }
        let token = stop.clone();
        let join = tokio::spawn(async move { self.run(stop, frequency, timeout).await });
        Ok(SchedulerHandle { token, join })
    }

    pub async fn run(&self, stop: CancellationToken, frequency: Duration, timeout: Duration) {
        log::info!(
            "notification scheduler: started, every {:?} with {:?} per tick",
            frequency,
            timeout
        );

        let mut ticker = interval_at(Instant::now() + frequency, frequency);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.tick(timeout).await {
                Ok(report) if report.fetched > 0 => log::info!(
                    "notification scheduler: {} pending, {} sent, {} failed",
                    report.fetched,
                    report.sent,
                    report.failed
                ),
                Ok(_) => {}
                Err(e) => log::warn!("notification scheduler: tick failed: {}", e),
            }
        }

        log::info!("notification scheduler: stopped");
    }

    /// Runs one dispatch pass. Only a failure to load the batch is an error;
    /// per-notification failures are counted in the report.
    pub async fn tick(&self, timeout: Duration) -> Result<TickReport> {
        let deadline = Deadline::after(timeout);
        let pending = self
            .notifications
            .pending(&deadline)
            .await
            .map_err(|e| Error::store("notification scheduler: load pending", e))?;

        let mut report = TickReport {
            fetched: pending.len(),
            ..TickReport::default()
        };
        for notification in &pending {
            let id = notification.notification_id;
            if let Err(e) = self
                .sender
                .send(&deadline, &notification.mail, &notification.payload)
                .await
            {
                log::warn!(
                    "notification scheduler: send {} to {} failed: {}",
                    id,
                    notification.mail,
                    e
                );
                report.failed += 1;
                continue;
            }

            match self.notifications.mark_sent(&deadline, id, Utc::now()).await {
                Ok(true) => report.sent += 1,
                Ok(false) => {
                    log::info!("notification scheduler: {} was already marked sent", id);
                    report.sent += 1;
                }
                Err(e) => {
                    log::warn!(
                        "notification scheduler: mark {} sent failed, will resend: {}",
                        id,
                        e
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

/// Handle to a running scheduler task.
pub struct SchedulerHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signals the loop and waits for the current tick, if any, to finish.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.join.await {
            log::error!("notification scheduler: task ended abnormally: {}", e);
        }
    }
}
