use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

/// Delay schedule between WebSocket reconnect attempts.
///
/// Attempt `n` (zero-based) waits `base * multiplier^n`, capped at `max`,
/// then spread by `±jitter` of itself. `max_attempts = None` retries forever.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 3_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: 0.2,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Constant delay, no growth, no jitter.
    pub fn fixed(delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self {
            base_delay_ms: ms,
            max_delay_ms: ms,
            multiplier: 1.0,
            jitter: 0.0,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }

    /// Delay before `attempt` without jitter.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64;
        let grown = base * self.multiplier.max(1.0).powi(attempt.min(32) as i32);
        let capped = grown.min(self.max_delay_ms.max(self.base_delay_ms) as f64);
        Duration::from_millis(capped as u64)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return nominal;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
        nominal.mul_f64(factor)
    }
}

struct ScheduledTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Owns the single reconnect timer and the attempt counter.
pub struct ReconnectController {
    policy: ReconnectPolicy,
    attempts: AtomicU32,
    generation: AtomicU64,
    slot: Arc<Mutex<Option<ScheduledTimer>>>,
}

impl ReconnectController {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_scheduled(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .is_some_and(|timer| !timer.handle.is_finished())
    }

    /// Arms the timer unless one is already pending or the policy is exhausted.
    /// The slot is cleared before `attempt` runs, so a failed attempt may
    /// schedule the next one itself.
    pub fn schedule<F, Fut>(&self, attempt: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if slot
            .as_ref()
            .is_some_and(|timer| !timer.handle.is_finished())
        {
            tracing::debug!("Reconnect already scheduled; ignoring duplicate request");
            return false;
        }

        let n = self.attempts.load(Ordering::SeqCst);
        if !self.policy.allows(n) {
            tracing::warn!("Reconnect attempts exhausted after {} tries", n);
            return false;
        }
        self.attempts.store(n + 1, Ordering::SeqCst);

        let delay = self.policy.delay_for(n);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let slot_ref = Arc::clone(&self.slot);
        tracing::info!("Reconnecting in {:?} (attempt {})", delay, n + 1);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut current = slot_ref.lock();
                if current
                    .as_ref()
                    .is_some_and(|timer| timer.generation == generation)
                {
                    *current = None;
                }
            }
            attempt().await;
        });
        *slot = Some(ScheduledTimer { generation, handle });
        true
    }

    /// Successful open: next outage starts from the base delay again.
    pub fn reset(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }

    pub fn cancel(&self) -> bool {
        match self.slot.lock().take() {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for ReconnectController {
    fn drop(&mut self) {
        self.cancel();
    }
}
