use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Rolling window for the per-minute call ceiling
pub const CALL_WINDOW: Duration = Duration::from_secs(60);

/// Start waiting when this close to the per-minute ceiling
pub const CALL_MARGIN: u32 = 5;

#[derive(Debug, Default)]
struct Window {
    calls: VecDeque<Instant>,
    total: u64,
}

impl Window {
    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.calls.front() {
            if now.saturating_duration_since(*oldest) >= CALL_WINDOW {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    fn wait(&mut self, now: Instant, calls_per_minute: u32) -> Option<Duration> {
        self.prune(now);
        let in_window = self.calls.len() as u32;
        if in_window == 0 || in_window + CALL_MARGIN < calls_per_minute {
            return None;
        }
        self.calls
            .front()
            .map(|oldest| (*oldest + CALL_WINDOW).saturating_duration_since(now))
            .filter(|wait| !wait.is_zero())
    }

    fn push(&mut self, now: Instant) {
        self.calls.push_back(now);
        self.total += 1;
    }
}

/// Calls-per-minute window shared by every remote caller in a run.
///
/// Clones share one window, so content fetches and judge calls running
/// concurrently are bounded together.
#[derive(Debug, Clone)]
pub struct CallLimiter {
    calls_per_minute: u32,
    window: Arc<Mutex<Window>>,
}

impl CallLimiter {
    pub fn new(calls_per_minute: u32) -> Self {
        Self {
            calls_per_minute,
            window: Arc::new(Mutex::new(Window::default())),
        }
    }

    pub fn calls_per_minute(&self) -> u32 {
        self.calls_per_minute
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        // The window holds plain counters; a panic elsewhere leaves it usable
        self.window
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn calls_in_window(&self, now: Instant) -> u32 {
        let mut window = self.lock();
        window.prune(now);
        window.calls.len() as u32
    }

    /// Calls started since the limiter was created
    pub fn total_calls(&self) -> u64 {
        self.lock().total
    }

    /// How long the next call would have to wait, if at all
    pub fn wait_time(&self, now: Instant) -> Option<Duration> {
        self.lock().wait(now, self.calls_per_minute)
    }

    /// Take a slot now, or return how long to wait before trying again
    pub fn try_acquire(&self, now: Instant) -> Result<(), Duration> {
        let mut window = self.lock();
        match window.wait(now, self.calls_per_minute) {
            Some(wait) => Err(wait),
            None => {
                window.push(now);
                Ok(())
            }
        }
    }

    /// Record a call that was not gated
    pub fn register(&self, now: Instant) {
        let mut window = self.lock();
        window.prune(now);
        window.push(now);
    }

    /// Wait until the window has room, then take a slot. `on_wait` sees each
    /// wait before it starts. Returns the total time spent waiting.
    pub async fn acquire(&self, mut on_wait: impl FnMut(Duration)) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            match self.try_acquire(Instant::now()) {
                Ok(()) => return waited,
                Err(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "Call window full");
                    on_wait(wait);
                    tokio::time::sleep(wait).await;
                    waited += wait;
                }
            }
        }
    }
}
