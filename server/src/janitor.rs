use crate::relay::Relay;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Periodically evict idle sessions until `shutdown` flips to true or its
/// sender is dropped.
pub async fn run_janitor(relay: Arc<Relay>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut sweep_interval = tokio::time::interval(period);
    sweep_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately; nothing can be idle yet.
    sweep_interval.tick().await;

    loop {
        tokio::select! {
            tick = sweep_interval.tick() => {
                let evicted = relay.sweep(tick);
                if evicted > 0 {
                    tracing::info!(
                        "Janitor evicted {} sessions, {} remain",
                        evicted,
                        relay.registry().len()
                    );
                }
            }

            changed = shutdown.changed() => {
                let stop = changed.is_err() || *shutdown.borrow();
                if stop {
                    break;
                }
            }
        }
    }

    tracing::info!("Janitor stopped");
}
