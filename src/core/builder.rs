use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    error::SchedulerError,
    events::{Bus, Event, EventKind},
    subscribers::{Subscribe, SubscriberSet},
};

use super::{config::Config, pool::WorkerPool, registry::Registry};

/// Builder for constructing a [`Registry`] with optional subscribers.
pub struct RegistryBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl RegistryBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (registrations, evictions, faults,
    /// ticks) through dedicated threads with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the registry.
    ///
    /// Initializes, in order:
    /// - the event bus
    /// - the shared worker pool
    /// - subscriber threads and the listener forwarding bus events to them
    pub fn build(self) -> Result<Registry, SchedulerError> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let prefix = self.cfg.thread_prefix.clone();
        let pool = WorkerPool::new(self.cfg.pool_size_clamped(), &prefix, bus.clone())?;

        let listener = if self.subscribers.is_empty() {
            None
        } else {
            let rx = bus.subscribe();
            let set = SubscriberSet::new(self.subscribers, bus.clone(), &prefix)?;
            Some(spawn_listener(rx, set, &prefix)?)
        };

        Ok(Registry::from_parts(self.cfg, pool, bus, listener))
    }
}

/// Forwards bus events to the subscriber set until shutdown completes.
fn spawn_listener(
    mut rx: broadcast::Receiver<Event>,
    set: SubscriberSet,
    prefix: &str,
) -> Result<JoinHandle<()>, SchedulerError> {
    let name = format!("{prefix}-events");
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            loop {
                match rx.blocking_recv() {
                    Ok(ev) => {
                        set.emit(&ev);
                        if ev.kind == EventKind::ShutdownCompleted {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            let failed = set.shutdown();
            if failed > 0 {
                tracing::warn!(failed, "subscriber set stopped with dead workers");
            }
        })
        .map_err(|source| SchedulerError::Spawn { name, source })
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<EventKind>>);

    impl Subscribe for Recorder {
        fn on_event(&self, ev: &Event) {
            self.0.lock().push(ev.kind);
        }
    }

    #[test]
    fn test_build_without_subscribers() {
        let registry = RegistryBuilder::new(Config::default()).build().unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.tick_count(), 0);
    }

    #[test]
    fn test_subscribers_see_shutdown() {
        let rec = Arc::new(Recorder::default());
        let registry = RegistryBuilder::new(Config::default())
            .with_subscribers(vec![rec.clone() as Arc<dyn Subscribe>])
            .build()
            .unwrap();
        registry.run_all_tasks().unwrap();
        drop(registry);

        let seen = rec.0.lock();
        assert!(seen.contains(&EventKind::TickCompleted));
        assert!(seen.contains(&EventKind::ShutdownRequested));
        assert_eq!(seen.last(), Some(&EventKind::ShutdownCompleted));
    }
}
