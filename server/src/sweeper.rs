//! Background liveness sweeper.
//!
//! Wakes on a fixed period and runs one sweep over the registry: players
//! that answered since the last round get a fresh PING, players that did
//! not are evicted. Every connection therefore gets one full period to
//! answer a probe before it is dropped. Besides the reactor, this is the
//! only mutator of the registry.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::registry::Registry;

/// Spawns the sweeper task with the given period.
pub fn spawn(registry: Arc<Mutex<Registry>>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick fires immediately; skip it so every player gets a
        // full period before the first probe.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let mut registry = registry.lock().await;
            let evicted = registry.sweep();
            if evicted > 0 {
                warn!("evicted {} unresponsive player(s)", evicted);
            } else {
                debug!("liveness sweep: {} active player(s)", registry.active_players());
            }
        }
    })
}
