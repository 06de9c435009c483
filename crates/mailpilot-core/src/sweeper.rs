//! Sweep driver - fixed-interval timers invoking the engine's sweeps
//!
//! Polling is deliberate: delivery latency is bounded by the tick interval
//! and no queue infrastructure is needed. The two loops are independent
//! tasks; each sweep kind is serialized against itself inside the engine.

use crate::engine::MailEngine;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::info;

/// Drives the two engine sweeps on a fixed cadence
pub struct SweepDriver {
    engine: Arc<MailEngine>,
    interval_secs: u64,
}

impl SweepDriver {
    pub fn new(engine: Arc<MailEngine>, interval_secs: u64) -> Self {
        Self {
            engine,
            interval_secs,
        }
    }

    /// Run the due-scheduled-message loop. Never returns; spawn it.
    pub async fn run_message_sweep(&self) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs));
        info!(interval_secs = self.interval_secs, "scheduled mail sweep started");

        loop {
            ticker.tick().await;
            self.engine.process_due_messages().await;
        }
    }

    /// Run the due-recurring-mail loop. Never returns; spawn it.
    pub async fn run_recurring_sweep(&self) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs));
        info!(interval_secs = self.interval_secs, "recurring mail sweep started");

        loop {
            ticker.tick().await;
            self.engine.process_due_recurring().await;
        }
    }
}
