//! Background eviction of idle upload sessions

use crate::chunk::SessionRegistry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Periodic sweep task over a [`SessionRegistry`]
pub struct Sweeper {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn the sweep loop on the current runtime
    pub fn spawn(registry: Arc<SessionRegistry>, every: Duration) -> Self {
        let shutdown = Arc::new(Notify::new());
        let signal = shutdown.clone();

        info!(
            "Starting session sweeper (interval: {}s, idle timeout: {}s)",
            every.as_secs(),
            registry.limits().idle_timeout.as_secs()
        );

        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = signal.notified() => break,
                    _ = ticker.tick() => {
                        let evicted = registry.sweep(Instant::now());
                        if evicted > 0 {
                            info!(
                                "Swept {} idle upload sessions, {} active",
                                evicted,
                                registry.len()
                            );
                        } else {
                            debug!("Session sweep: {} active", registry.len());
                        }
                    }
                }
            }

            debug!("Session sweeper stopped");
        });

        Sweeper { shutdown, handle }
    }

    /// Stop the loop and wait for it to exit
    pub async fn stop(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.handle.await {
            debug!("Sweeper task ended abnormally: {}", e);
        }
    }
}
