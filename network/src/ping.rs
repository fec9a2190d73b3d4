//! Ping acceptance and latency sampling.
//!
//! A ping carries the sender's wall clock. With the scaled window
//! `F = ping_interval × (fanout / 3 + 1)` a ping stamped `dt` from origin `o`
//! is accepted iff
//!
//! 1. `now − F ≤ dt ≤ now + F` (clock skew and transit tolerance),
//! 2. `dt` is strictly newer than the last accepted stamp from `o`,
//! 3. the last accepted stamp from `o` is at least `F` old (one ping per
//!    window per peer).

use std::collections::{HashMap, VecDeque};

use shroud_types::PublicKey;

/// Latency samples at or above this are discarded as clock noise.
pub const MAX_LATENCY_SAMPLE_MS: u64 = 60_000;

/// Scaled acceptance window for a fan-out of `fanout` peers.
pub fn ping_window(ping_interval_ms: u64, fanout: usize) -> u64 {
    ping_interval_ms.saturating_mul(fanout as u64 / 3 + 1)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PingRejection {
    OutsideWindow,
    NotNewer,
    RateLimited,
}

#[derive(Debug, Default)]
pub struct PingTracker {
    last: HashMap<PublicKey, u64>,
}

impl PingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a ping and record it on acceptance.
    pub fn accept(
        &mut self,
        origin: &PublicKey,
        dt: u64,
        now: u64,
        window: u64,
    ) -> Result<(), PingRejection> {
        if dt < now.saturating_sub(window) || dt > now.saturating_add(window) {
            return Err(PingRejection::OutsideWindow);
        }
        if let Some(&last) = self.last.get(origin) {
            if last >= dt {
                return Err(PingRejection::NotNewer);
            }
            if last > now.saturating_sub(window) {
                return Err(PingRejection::RateLimited);
            }
        }
        self.last.insert(*origin, dt);
        Ok(())
    }

    pub fn last_seen(&self, origin: &PublicKey) -> Option<u64> {
        self.last.get(origin).copied()
    }
}

/// Rolling latency samples. Grows to `3 × fanout`, then is summarized into
/// an average and cut back to the newest `2 × fanout` samples.
#[derive(Debug, Default)]
pub struct LatencyWindow {
    samples: VecDeque<u64>,
    average: Option<u64>,
}

impl LatencyWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a one-way latency sample. Returns the new average when the
    /// window was pruned.
    pub fn push(&mut self, sample_ms: u64, fanout: usize) -> Option<u64> {
        if sample_ms == 0 || sample_ms >= MAX_LATENCY_SAMPLE_MS {
            return None;
        }
        self.samples.push_back(sample_ms);
        let fanout = fanout.max(1);
        if self.samples.len() <= 3 * fanout {
            return None;
        }
        let avg = self.samples.iter().sum::<u64>() / self.samples.len() as u64;
        while self.samples.len() > 2 * fanout {
            self.samples.pop_front();
        }
        self.average = Some(avg);
        Some(avg)
    }

    pub fn average(&self) -> Option<u64> {
        self.average
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
