//! Reservation expiry sweeper
//!
//! Periodically expires active holds past their deadline. The sweep is a
//! single guarded statement in the store, so a webhook settling a call
//! at the same moment either wins the status flip or sees the hold
//! already expired; funds are never double-released.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use vocalis_core::{
    traits::{Clock, ReservationRepository},
    AppResult,
};

/// Expires stale credit reservations on an interval
pub struct ReservationExpirySweeper<R> {
    reservations: Arc<R>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<R> ReservationExpirySweeper<R>
where
    R: ReservationRepository + 'static,
{
    pub fn new(reservations: Arc<R>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            reservations,
            clock,
            interval,
            handle: Mutex::new(None),
        }
    }

    /// Expire every active hold past its deadline; returns the count
    pub async fn run_once(&self) -> AppResult<u64> {
        let now = self.clock.now();
        let expired = self.reservations.expire_due(now).await?;
        if expired > 0 {
            info!("Expired {} stale reservations", expired);
        } else {
            debug!("No reservations due for expiry");
        }
        Ok(expired)
    }

    /// Start sweeping on the configured interval
    pub fn start(self: Arc<Self>) {
        let sweeper = Arc::clone(&self);
        info!("Starting reservation sweeper (every {:?})", self.interval);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweeper.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = sweeper.run_once().await {
                    error!("Reservation sweep failed: {}", e);
                }
            }
        });

        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Stop the sweep loop
    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
            info!("Reservation sweeper stopped");
        }
    }
}

impl<R> Drop for ReservationExpirySweeper<R> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}
