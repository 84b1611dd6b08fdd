use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub interval_ms: u64,
    pub no_event_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            no_event_timeout_ms: 15_000,
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn no_event_timeout(&self) -> Duration {
        Duration::from_millis(self.no_event_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Stopped,
    Healthy,
    /// The timeout fired on this check.
    TimedOut,
    /// The timeout already fired and no ack has arrived since.
    AwaitingReconnect,
}

pub type HealthCallback = Arc<dyn Fn() + Send + Sync>;

struct Liveness {
    generation: u64,
    running: bool,
    last_ack: Instant,
    fired: bool,
}

/// Liveness detector for one signaling connection.
///
/// While running, `on_check` is invoked every `interval` and `on_timeout`
/// once per episode in which no [`ack`](Self::ack) arrived for
/// `no_event_timeout`. Callbacks run while the monitor's lock is held and
/// must not call back into the monitor; after [`stop`](Self::stop) returns
/// neither callback runs again.
pub struct HealthMonitor {
    config: HealthConfig,
    liveness: Arc<Mutex<Liveness>>,
    task: Mutex<Option<JoinHandle<()>>>,
    on_check: HealthCallback,
    on_timeout: HealthCallback,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig, on_check: HealthCallback, on_timeout: HealthCallback) -> Self {
        Self {
            config,
            liveness: Arc::new(Mutex::new(Liveness {
                generation: 0,
                running: false,
                last_ack: Instant::now(),
                fired: false,
            })),
            task: Mutex::new(None),
            on_check,
            on_timeout,
        }
    }

    pub fn start(&self) {
        let generation = {
            let mut liveness = self.lock();
            liveness.generation += 1;
            liveness.running = true;
            liveness.last_ack = Instant::now();
            liveness.fired = false;
            liveness.generation
        };

        let liveness = self.liveness.clone();
        let config = self.config.clone();
        let on_check = self.on_check.clone();
        let on_timeout = self.on_timeout.clone();
        let handle = tokio::spawn(async move {
            let period = config.interval();
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let status = run_check(&liveness, generation, &config, &on_check, &on_timeout);
                if status == HealthStatus::Stopped {
                    debug!(target: "Sfu/Health", "Monitor generation {generation} retired");
                    return;
                }
            }
        });

        if let Some(previous) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle)
        {
            previous.abort();
        }
        debug!(target: "Sfu/Health", "Health monitor started");
    }

    pub fn stop(&self) {
        let was_running = {
            let mut liveness = self.lock();
            liveness.generation += 1;
            std::mem::replace(&mut liveness.running, false)
        };
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        if was_running {
            debug!(target: "Sfu/Health", "Health monitor stopped");
        }
    }

    /// Records proof of life. Called for every inbound frame.
    pub fn ack(&self) {
        let mut liveness = self.lock();
        if liveness.fired {
            info!(target: "Sfu/Health", "Connection is alive again");
        }
        liveness.last_ack = Instant::now();
        liveness.fired = false;
    }

    /// Evaluates liveness now, invoking the same callbacks a periodic tick would.
    pub fn check(&self) -> HealthStatus {
        let generation = self.lock().generation;
        run_check(
            &self.liveness,
            generation,
            &self.config,
            &self.on_check,
            &self.on_timeout,
        )
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Liveness> {
        self.liveness.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(task) = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

fn run_check(
    liveness: &Mutex<Liveness>,
    generation: u64,
    config: &HealthConfig,
    on_check: &HealthCallback,
    on_timeout: &HealthCallback,
) -> HealthStatus {
    let mut liveness = liveness.lock().unwrap_or_else(PoisonError::into_inner);
    if !liveness.running || liveness.generation != generation {
        return HealthStatus::Stopped;
    }
    if liveness.fired {
        return HealthStatus::AwaitingReconnect;
    }
    let silent_for = liveness.last_ack.elapsed();
    if silent_for >= config.no_event_timeout() {
        liveness.fired = true;
        warn!(
            target: "Sfu/Health",
            "No events for {}ms, forcing reconnect",
            silent_for.as_millis()
        );
        on_timeout();
        HealthStatus::TimedOut
    } else {
        on_check();
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    struct Counters {
        checks: Arc<AtomicUsize>,
        timeouts: Arc<AtomicUsize>,
    }

    impl Counters {
        fn checks(&self) -> usize {
            self.checks.load(Ordering::SeqCst)
        }

        fn timeouts(&self) -> usize {
            self.timeouts.load(Ordering::SeqCst)
        }
    }

    fn monitor() -> (HealthMonitor, Counters) {
        let checks = Arc::new(AtomicUsize::new(0));
        let timeouts = Arc::new(AtomicUsize::new(0));
        let c = checks.clone();
        let t = timeouts.clone();
        let monitor = HealthMonitor::new(
            HealthConfig::default(),
            Arc::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
            Arc::new(move || {
                t.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (monitor, Counters { checks, timeouts })
    }

    #[tokio::test(start_paused = true)]
    async fn test_checks_on_every_interval() {
        let (monitor, counters) = monitor();
        monitor.start();
        sleep(Duration::from_millis(11_000)).await;
        assert_eq!(counters.checks(), 2);
        assert_eq!(counters.timeouts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_once_per_episode() {
        let (monitor, counters) = monitor();
        monitor.start();
        sleep(Duration::from_millis(16_000)).await;
        assert_eq!(counters.timeouts(), 1);

        sleep(Duration::from_millis(20_000)).await;
        assert_eq!(counters.timeouts(), 1);
        assert_eq!(monitor.check(), HealthStatus::AwaitingReconnect);

        monitor.ack();
        sleep(Duration::from_millis(20_000)).await;
        assert_eq!(counters.timeouts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_postpones_timeout() {
        let (monitor, counters) = monitor();
        monitor.start();
        sleep(Duration::from_millis(12_000)).await;
        monitor.ack();
        sleep(Duration::from_millis(14_000)).await;
        assert_eq!(counters.timeouts(), 0);
        sleep(Duration::from_millis(5_000)).await;
        assert_eq!(counters.timeouts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_callbacks_after_stop() {
        let (monitor, counters) = monitor();
        monitor.start();
        sleep(Duration::from_millis(6_000)).await;
        assert_eq!(counters.checks(), 1);

        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());
        sleep(Duration::from_millis(60_000)).await;
        assert_eq!(counters.checks(), 1);
        assert_eq!(counters.timeouts(), 0);
        assert_eq!(monitor.check(), HealthStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_liveness() {
        let (monitor, counters) = monitor();
        monitor.start();
        sleep(Duration::from_millis(14_000)).await;
        monitor.start();
        sleep(Duration::from_millis(14_000)).await;
        assert_eq!(counters.timeouts(), 0);
    }
}
