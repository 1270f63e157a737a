//! Sliding-window rate estimation over a monotonic byte counter

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// One throughput observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Observation time
    pub timestamp: DateTime<Utc>,

    /// Bytes per second over the interval since the previous observation
    #[serde(rename = "throughput_units_per_sec")]
    pub rate: f64,
}

/// Throughput tracker over a cumulative output-byte counter.
///
/// The first observation after construction or [`Tracker::reset`] seeds the
/// internal counters and reports rate 0. The baseline stays 0 until
/// `baseline_window` has elapsed since the first observation, then freezes at
/// the mean rate over that window; once set it only changes through
/// [`Tracker::restore_baseline`] or [`Tracker::reset`].
pub struct Tracker {
    inner: Mutex<Inner>,
    throughput_window: Duration,
    baseline_window: Duration,
}

#[derive(Default)]
struct Inner {
    samples: Vec<Sample>,
    last_total: u64,
    last_sample_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    baseline: f64,
    baseline_ready: bool,
}

impl Tracker {
    /// Create a tracker retaining samples for `throughput_window` and
    /// learning its baseline over `baseline_window`.
    pub fn new(throughput_window: Duration, baseline_window: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            throughput_window,
            baseline_window,
        }
    }

    /// Clear the window, counters, and baseline-ready flag
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = Inner::default();
    }

    /// Record the cumulative byte counter at `now` and return the resulting
    /// sample.
    ///
    /// A non-positive time delta or a counter that moved backwards yields
    /// rate 0.
    pub fn add(&self, total_units: u64, now: DateTime<Utc>) -> Sample {
        let mut inner = self.lock();

        if inner.started_at.is_none() {
            inner.started_at = Some(now);
            inner.last_sample_at = Some(now);
            inner.last_total = total_units;
            let sample = Sample {
                timestamp: now,
                rate: 0.0,
            };
            inner.samples.push(sample);
            return sample;
        }

        let delta_t = inner
            .last_sample_at
            .map(|prev| (now - prev).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);
        let mut rate = 0.0;
        if delta_t > 0.0 && total_units >= inner.last_total {
            rate = (total_units - inner.last_total) as f64 / delta_t;
        }
        inner.last_sample_at = Some(now);
        inner.last_total = total_units;

        let sample = Sample {
            timestamp: now,
            rate,
        };
        inner.samples.push(sample);
        self.drop_old_samples(&mut inner, now);
        self.update_baseline(&mut inner, now);

        sample
    }

    /// Ordered copy of the retained samples
    pub fn samples(&self) -> Vec<Sample> {
        self.lock().samples.clone()
    }

    /// Learned (or restored) baseline rate; 0 until the warmup elapses
    pub fn baseline(&self) -> f64 {
        self.lock().baseline
    }

    /// Whether the baseline has been frozen
    pub fn is_baseline_ready(&self) -> bool {
        self.lock().baseline_ready
    }

    /// Seed the baseline without waiting for the warmup, as when continuing
    /// from a checkpoint or profile.
    pub fn restore_baseline(&self, rate: f64) {
        let mut inner = self.lock();
        inner.baseline = rate;
        inner.baseline_ready = rate > 0.0;
    }

    /// Mean rate over samples within `window` of `now`
    pub fn average(&self, window: Duration, now: DateTime<Utc>) -> f64 {
        let inner = self.lock();
        windowed_average(&inner.samples, window, now)
    }

    fn drop_old_samples(&self, inner: &mut Inner, now: DateTime<Utc>) {
        let cutoff = now - self.throughput_window;
        inner.samples.retain(|s| s.timestamp > cutoff);
    }

    fn update_baseline(&self, inner: &mut Inner, now: DateTime<Utc>) {
        if inner.baseline_ready {
            return;
        }
        let started_at = match inner.started_at {
            Some(started_at) => started_at,
            None => return,
        };
        if now - started_at < self.baseline_window {
            return;
        }
        if inner.samples.is_empty() {
            return;
        }
        inner.baseline = windowed_average(&inner.samples, self.baseline_window, now);
        inner.baseline_ready = true;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn windowed_average(samples: &[Sample], window: Duration, now: DateTime<Utc>) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let cutoff = now - window;
    let mut sum = 0.0;
    let mut count = 0usize;
    for sample in samples {
        if sample.timestamp < cutoff {
            continue;
        }
        sum += sample.rate;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    sum / count as f64
}
