//! Lock-free tick counters and periodic reporting
//!
//! Uses atomics so the publish loop and control listener never contend on
//! a lock just to bump a counter. `report()` swaps the per-interval counters
//! to zero and returns a summary.
//!
//! NOTE: All atomics use Relaxed ordering intentionally; these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Lock-free metrics collector
pub struct Metrics {
    /// Events handed to the publisher successfully (monotonic)
    published_total: AtomicU64,
    /// Publishes since last report (reset on report)
    published_since_report: AtomicU64,
    /// Failed publishes (monotonic)
    publish_failures_total: AtomicU64,
    /// Ticks skipped because sensor id / capacity were unset (monotonic)
    skipped_total: AtomicU64,
    /// Desired-property updates received (monotonic)
    desired_updates_total: AtomicU64,
    /// Desired-property fields rejected as malformed (monotonic)
    desired_field_errors_total: AtomicU64,
    /// SetCustomerCount commands received (monotonic)
    commands_total: AtomicU64,
    /// Most recently published customer count (gauge)
    customer_count: AtomicU64,
    /// Last report time for rate calculation
    last_report: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            published_total: AtomicU64::new(0),
            published_since_report: AtomicU64::new(0),
            publish_failures_total: AtomicU64::new(0),
            skipped_total: AtomicU64::new(0),
            desired_updates_total: AtomicU64::new(0),
            desired_field_errors_total: AtomicU64::new(0),
            commands_total: AtomicU64::new(0),
            customer_count: AtomicU64::new(0),
            last_report: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_published(&self, customer_count: u32) {
        self.published_total.fetch_add(1, Ordering::Relaxed);
        self.published_since_report.fetch_add(1, Ordering::Relaxed);
        self.customer_count.store(u64::from(customer_count), Ordering::Relaxed);
    }

    #[inline]
    pub fn record_publish_failure(&self) {
        self.publish_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_skipped(&self) {
        self.skipped_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_desired_update(&self, field_errors: usize) {
        self.desired_updates_total.fetch_add(1, Ordering::Relaxed);
        self.desired_field_errors_total.fetch_add(field_errors as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_command(&self) {
        self.commands_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn published_total(&self) -> u64 {
        self.published_total.load(Ordering::Relaxed)
    }

    pub fn publish_failures_total(&self) -> u64 {
        self.publish_failures_total.load(Ordering::Relaxed)
    }

    pub fn skipped_total(&self) -> u64 {
        self.skipped_total.load(Ordering::Relaxed)
    }

    /// Build a summary and reset the per-interval counters
    pub fn report(&self) -> MetricsSummary {
        let now = Instant::now();
        let elapsed_secs = {
            let mut last = self.last_report.lock();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *last = now;
            elapsed
        };

        let published_interval = self.published_since_report.swap(0, Ordering::Relaxed);
        let publish_rate =
            if elapsed_secs > 0.0 { published_interval as f64 / elapsed_secs } else { 0.0 };

        MetricsSummary {
            published_total: self.published_total.load(Ordering::Relaxed),
            published_per_min: publish_rate * 60.0,
            publish_failures_total: self.publish_failures_total.load(Ordering::Relaxed),
            skipped_total: self.skipped_total.load(Ordering::Relaxed),
            desired_updates_total: self.desired_updates_total.load(Ordering::Relaxed),
            desired_field_errors_total: self.desired_field_errors_total.load(Ordering::Relaxed),
            commands_total: self.commands_total.load(Ordering::Relaxed),
            customer_count: self.customer_count.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics for reporting
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub published_total: u64,
    pub published_per_min: f64,
    pub publish_failures_total: u64,
    pub skipped_total: u64,
    pub desired_updates_total: u64,
    pub desired_field_errors_total: u64,
    pub commands_total: u64,
    pub customer_count: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            published_total = %self.published_total,
            published_per_min = %format!("{:.1}", self.published_per_min),
            publish_failures_total = %self.publish_failures_total,
            skipped_total = %self.skipped_total,
            desired_updates_total = %self.desired_updates_total,
            desired_field_errors_total = %self.desired_field_errors_total,
            commands_total = %self.commands_total,
            customer_count = %self.customer_count,
            "metrics"
        );
    }
}
