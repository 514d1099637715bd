//! Performance metrics and statistics tracking for the inference service.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for scoring activity
pub struct ServiceMetrics {
    /// Total prediction requests served
    pub requests_served: AtomicU64,
    /// Total transaction rows scored
    pub rows_scored: AtomicU64,
    /// Rows flagged as fraudulent
    pub fraud_flagged: AtomicU64,
    /// Per-request scoring times (in microseconds)
    scoring_times: RwLock<Vec<u64>>,
    /// Fraud probability distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ServiceMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            requests_served: AtomicU64::new(0),
            rows_scored: AtomicU64::new(0),
            fraud_flagged: AtomicU64::new(0),
            scoring_times: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record one served request scoring `rows` rows, `fraud_rows` of
    /// which were flagged.
    pub fn record_request(&self, rows: usize, fraud_rows: usize, scoring_time: Duration) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
        self.rows_scored.fetch_add(rows as u64, Ordering::Relaxed);
        self.fraud_flagged.fetch_add(fraud_rows as u64, Ordering::Relaxed);

        if let Ok(mut times) = self.scoring_times.write() {
            times.push(scoring_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Record one fraud probability into the distribution buckets.
    pub fn record_probability(&self, fraud_probability: f64) {
        let bucket = (fraud_probability.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
        if let Ok(mut buckets) = self.probability_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Get scoring time statistics
    pub fn get_scoring_stats(&self) -> ScoringStats {
        let times = self.scoring_times.read().unwrap();
        if times.is_empty() {
            return ScoringStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ScoringStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: *sorted.last().unwrap_or(&0),
        }
    }

    /// Get current throughput (rows per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.rows_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get fraud probability distribution
    pub fn get_probability_distribution(&self) -> [u64; 10] {
        *self.probability_buckets.read().unwrap()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let requests = self.requests_served.load(Ordering::Relaxed);
        let rows = self.rows_scored.load(Ordering::Relaxed);
        let fraud = self.fraud_flagged.load(Ordering::Relaxed);
        let fraud_rate = if rows > 0 {
            (fraud as f64 / rows as f64) * 100.0
        } else {
            0.0
        };

        let scoring = self.get_scoring_stats();
        let throughput = self.get_throughput();
        let distribution = self.get_probability_distribution();

        info!(
            requests = requests,
            rows = rows,
            fraud = fraud,
            fraud_rate = format!("{:.1}%", fraud_rate),
            throughput = format!("{:.1} rows/s", throughput),
            "Scoring summary"
        );
        info!(
            mean_us = scoring.mean_us,
            p50_us = scoring.p50_us,
            p95_us = scoring.p95_us,
            p99_us = scoring.p99_us,
            "Scoring time (per request)"
        );

        let total: u64 = distribution.iter().sum();
        if total > 0 {
            for (i, &count) in distribution.iter().enumerate() {
                let pct = (count as f64 / total as f64) * 100.0;
                info!(
                    "Fraud probability {:.1}-{:.1}: {} ({:.1}%)",
                    i as f64 / 10.0,
                    (i + 1) as f64 / 10.0,
                    count,
                    pct
                );
            }
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoring time statistics
#[derive(Debug, Default)]
pub struct ScoringStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: std::sync::Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: std::sync::Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
