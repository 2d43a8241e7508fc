//! Metrics collection for the mining driver

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Metrics collector for assembly and mining
#[derive(Debug, Default)]
pub struct MinerMetrics {
    /// Blocks found (PoW solution or signed PoS block)
    pub blocks_found: AtomicU64,

    /// Blocks accepted by the submitter
    pub blocks_submitted: AtomicU64,

    /// Blocks rejected as stale or by the submitter
    pub blocks_rejected: AtomicU64,

    /// Templates assembled
    pub templates_built: AtomicU64,

    /// Assembly attempts that produced no template
    pub templates_abandoned: AtomicU64,

    /// Transactions in the last template (coinbase/coinstake excluded)
    pub last_block_tx: AtomicU64,

    /// Size of the last template as accounted by the selector
    pub last_block_size: AtomicU64,

    /// Header hashes computed
    pub hashes: AtomicU64,

    /// Hash rate in milli-hashes per second
    pub hash_rate_milli: AtomicU64,
}

impl MinerMetrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an assembled template
    pub fn record_template(&self, tx_count: usize, block_size: usize) {
        self.templates_built.fetch_add(1, Ordering::Relaxed);
        self.last_block_tx.store(tx_count as u64, Ordering::Relaxed);
        self.last_block_size
            .store(block_size as u64, Ordering::Relaxed);
    }

    /// Record an assembly attempt that yielded nothing
    pub fn record_abandoned(&self) {
        self.templates_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a found block and whether it was accepted
    pub fn record_block_found(&self, accepted: bool) {
        self.blocks_found.fetch_add(1, Ordering::Relaxed);
        if accepted {
            self.blocks_submitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.blocks_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record hashes done
    pub fn record_hashes(&self, count: u64) {
        self.hashes.fetch_add(count, Ordering::Relaxed);
    }

    /// Current hash rate in hashes per second
    pub fn hash_rate(&self) -> f64 {
        self.hash_rate_milli.load(Ordering::Relaxed) as f64 / 1000.0
    }

    /// Get blocks accepted
    pub fn get_blocks_submitted(&self) -> u64 {
        self.blocks_submitted.load(Ordering::Relaxed)
    }
}

/// Rolling hash-rate meter shared by all workers.
///
/// Hashes accumulate until the window elapses; the rate is then published to
/// [`MinerMetrics`] and the window restarts.
#[derive(Debug)]
pub struct HashMeter {
    window: Duration,
    log_interval: Duration,
    state: parking_lot::Mutex<MeterState>,
}

#[derive(Debug)]
struct MeterState {
    window_start: Option<Instant>,
    hashes: u64,
    last_log: Option<Instant>,
}

impl HashMeter {
    /// Meter with a 4 second window.
    pub fn new(log_interval: Duration) -> Self {
        Self::with_window(Duration::from_secs(4), log_interval)
    }

    /// Meter with an explicit window.
    pub fn with_window(window: Duration, log_interval: Duration) -> Self {
        Self {
            window,
            log_interval,
            state: parking_lot::Mutex::new(MeterState {
                window_start: None,
                hashes: 0,
                last_log: None,
            }),
        }
    }

    /// Count `hashes` done at `now`; returns the new rate when a window closes.
    pub fn record(&self, hashes: u64, now: Instant, metrics: &MinerMetrics) -> Option<f64> {
        metrics.record_hashes(hashes);
        let mut state = self.state.lock();

        let Some(start) = state.window_start else {
            state.window_start = Some(now);
            state.hashes = 0;
            return None;
        };

        state.hashes += hashes;
        let elapsed = now.saturating_duration_since(start);
        if elapsed <= self.window {
            return None;
        }

        let rate = state.hashes as f64 / elapsed.as_secs_f64();
        metrics
            .hash_rate_milli
            .store((rate * 1000.0) as u64, Ordering::Relaxed);
        state.window_start = Some(now);
        state.hashes = 0;

        let due = state
            .last_log
            .map_or(true, |last| now.saturating_duration_since(last) > self.log_interval);
        if due {
            state.last_log = Some(now);
            tracing::info!("[miner] hashmeter {:6.0} khash/s", rate / 1000.0);
        }
        Some(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_counters() {
        let metrics = MinerMetrics::new();
        metrics.record_block_found(true);
        metrics.record_block_found(false);
        metrics.record_template(12, 4_000);
        metrics.record_abandoned();

        assert_eq!(metrics.blocks_found.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.get_blocks_submitted(), 1);
        assert_eq!(metrics.blocks_rejected.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.last_block_tx.load(Ordering::Relaxed), 12);
        assert_eq!(metrics.templates_abandoned.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_hash_meter_publishes_after_window() {
        let metrics = MinerMetrics::new();
        let meter = HashMeter::new(Duration::from_secs(1800));
        let start = Instant::now();

        assert_eq!(meter.record(100, start, &metrics), None);
        assert_eq!(meter.record(4_000, start + Duration::from_secs(2), &metrics), None);
        let rate = meter
            .record(4_000, start + Duration::from_secs(5), &metrics)
            .unwrap();

        assert!((rate - 1_600.0).abs() < 1e-6);
        assert!((metrics.hash_rate() - 1_600.0).abs() < 1e-3);
        assert_eq!(metrics.hashes.load(Ordering::Relaxed), 8_100);
    }
}
