use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use warden_core::types::TimestampUs;
use warden_core::MICROS_PER_SEC;
use warden_engine::RateLimitObserver;

/// In-memory sliding-window counter implementing the engine's observe seam.
///
/// The service records one event per standard key per decision; `observe`
/// answers with the count inside the window. The engine treats the answer as
/// an input, so this sidecar owns the clock for windowing.
pub struct MemoryCounters {
    window_secs: u32,
    events: Mutex<HashMap<String, VecDeque<TimestampUs>>>,
}

impl MemoryCounters {
    pub fn new(window_secs: u32) -> Self {
        Self {
            window_secs,
            events: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, key: &str, now_us: TimestampUs) {
        let mut events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        let queue = events.entry(key.to_string()).or_default();
        queue.push_back(now_us);
        Self::evict(queue, now_us, self.window_secs);
    }

    fn evict(queue: &mut VecDeque<TimestampUs>, now_us: TimestampUs, window_secs: u32) {
        let horizon = now_us - window_secs as i64 * MICROS_PER_SEC;
        while queue.front().is_some_and(|t| *t < horizon) {
            queue.pop_front();
        }
    }

    fn observe_at(&self, key: &str, now_us: TimestampUs) -> u64 {
        let mut events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        match events.get_mut(key) {
            Some(queue) => {
                Self::evict(queue, now_us, self.window_secs);
                queue.len() as u64
            }
            None => 0,
        }
    }
}

impl RateLimitObserver for MemoryCounters {
    fn observe(&self, key: &str) -> u64 {
        self.observe_at(key, chrono::Utc::now().timestamp_micros())
    }
}
