use super::birds_nest::BirdsNest;
use super::config::SerializeIntervalType;
use super::traits::TxFilter;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Reason for a serialize request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializeSignal {
    Height,
    Timed,
    Exit,
}

impl BirdsNest {
    /// Consumes serialize signals and sealed-filter notifications until the
    /// nest is cancelled, then flushes once more.
    pub(super) async fn serialize_monitor(
        self: Arc<Self>,
        mut signals: mpsc::Receiver<SerializeSignal>,
    ) {
        info!("birds nest {} serialize monitor started", self.config.chain_id);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.sealed_notify.notified() => {
                    for index in self.take_sealed() {
                        self.serialize_in_background(Some(index)).await;
                    }
                }
                signal = signals.recv() => match signal {
                    Some(SerializeSignal::Exit) | None => break,
                    Some(signal) => self.handle_signal(signal).await,
                },
            }
        }

        let nest = Arc::clone(&self);
        if let Err(e) = tokio::task::spawn_blocking(move || nest.flush_on_exit()).await {
            warn!("birds nest exit flush panicked: {e}");
        }
        info!("birds nest {} serialize monitor stopped", self.config.chain_id);
    }

    /// Emits `Timed` every `timed` seconds while the nest runs. Does nothing
    /// unless the nest is configured for timed serialization.
    pub(super) async fn serialize_timed(self: Arc<Self>) {
        let snapshot = &self.config.snapshot;
        if snapshot.serialize_type != SerializeIntervalType::Timed {
            return;
        }

        let mut ticker = interval(Duration::from_secs(snapshot.timed));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.signals.try_send(SerializeSignal::Timed) {
                        debug!("timed signal dropped: {e}");
                    }
                }
            }
        }
    }

    async fn handle_signal(self: &Arc<Self>, signal: SerializeSignal) {
        if signal == SerializeSignal::Height {
            let height = self.height();
            let durable = self.durable_height.load(Ordering::Acquire);
            if height.saturating_sub(durable) < self.config.snapshot.block_height {
                return;
            }
        }
        self.serialize_in_background(None).await;
    }

    /// Runs a serialize off the async workers. `None` means the active filter.
    async fn serialize_in_background(self: &Arc<Self>, index: Option<usize>) {
        let nest = Arc::clone(self);
        let result = tokio::task::spawn_blocking(move || match index {
            Some(index) => nest.serialize(index),
            None => nest.serialize_current(),
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("birds nest serialize failed: {e}"),
            Err(e) => warn!("birds nest serialize task panicked: {e}"),
        }
    }
}
