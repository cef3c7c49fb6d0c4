//! Periodic task scheduling
//!
//! A small registry over tokio interval timers. The services never depend
//! on it; unit tests drive `run_cycle()` and friends directly, and the
//! scheduler only decides *when* the same entry points fire.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

pub struct Scheduler {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Register a periodic task under `name`. Re-registering a name cancels
    /// the previous task. Ticks that fall behind are delayed, not bunched.
    pub fn register<F, Fut>(&self, name: &str, period: Duration, task: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so cadence N means
            // "first run after N".
            interval.tick().await;
            loop {
                interval.tick().await;
                debug!("Scheduled task {} firing", task_name);
                task().await;
            }
        });

        let mut tasks = self.tasks.lock().unwrap();
        if let Some(previous) = tasks.insert(name.to_string(), handle) {
            previous.abort();
        }
        info!("Registered periodic task {} every {:?}", name, period);
    }

    /// Cancel a registered task. Returns false if the name is unknown.
    pub fn cancel(&self, name: &str) -> bool {
        match self.tasks.lock().unwrap().remove(name) {
            Some(handle) => {
                handle.abort();
                info!("Cancelled periodic task {}", name);
                true
            }
            None => false,
        }
    }

    /// Abort every registered task.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        for (name, handle) in tasks.drain() {
            debug!("Stopping task {}", name);
            handle.abort();
        }
        info!("Scheduler shut down");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_task_fires_on_cadence() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();

        scheduler.register("tick", Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(55)).await;
        scheduler.shutdown();
        let count = fired.load(Ordering::SeqCst);
        assert!(count >= 2, "expected at least 2 firings, got {}", count);
    }

    #[tokio::test]
    async fn test_cancel_stops_task() {
        let scheduler = Scheduler::new();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();

        scheduler.register("tick", Duration::from_millis(5), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert!(scheduler.cancel("tick"));
        assert!(!scheduler.cancel("tick"));

        let before = fired.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), before);
    }
}
