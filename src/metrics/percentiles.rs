use hdrhistogram::Histogram;
use serde::Serialize;

/// HdrHistogram range: 1 μs → 1 h, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 3_600_000_000;
const HIST_SIGFIG: u8 = 3;

/// Percentile breakdown of one store's durations, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileSet {
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub p999_ms: f64,
    pub count: u64,
}

impl PercentileSet {
    /// Builds a set from millisecond durations, recorded at μs resolution.
    /// Values are clamped into the histogram range.
    pub fn from_durations<I>(durations: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let Ok(mut hist) = Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        else {
            return Self::empty();
        };
        for ms in durations {
            let us = (ms * 1000.0).round().clamp(HIST_LOW as f64, HIST_HIGH as f64) as u64;
            let _ = hist.record(us);
        }
        Self::from_histogram(&hist)
    }

    /// Returns zeroed values if the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }

        let ms = |us: u64| us as f64 / 1000.0;
        Self {
            min_ms: ms(hist.min()),
            max_ms: ms(hist.max()),
            mean_ms: hist.mean() / 1000.0,
            p50_ms: ms(hist.value_at_percentile(50.0)),
            p95_ms: ms(hist.value_at_percentile(95.0)),
            p99_ms: ms(hist.value_at_percentile(99.0)),
            p999_ms: ms(hist.value_at_percentile(99.9)),
            count: hist.len(),
        }
    }

    /// All-zero placeholder used before any samples are recorded.
    pub fn empty() -> Self {
        Self {
            min_ms: 0.0,
            max_ms: 0.0,
            mean_ms: 0.0,
            p50_ms: 0.0,
            p95_ms: 0.0,
            p99_ms: 0.0,
            p999_ms: 0.0,
            count: 0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}
