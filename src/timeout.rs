//! The `Timeout` trait defines how the per-request timeout of a multi-file upload evolves based
//! on past upload results. A default implementation `TimeoutState` is provided.
use crate::config::TimingConfig;
use crate::RequestReport;
use std::time::Duration;

pub trait Timeout: Send + 'static {
    /// Size is in bytes.
    fn get_timeout(&self, size: u64, attempt: usize) -> Duration;
    /// Update the internal estimate of the extra timeout per byte
    fn update(&mut self, _: &RequestReport);
    /// Current estimate of seconds per byte
    fn get_estimate(&self) -> f64;
}

/// Timeout state for uploads of known size.
pub struct TimeoutState {
    seconds_per_byte_estimate: f64,
    cfg: TimingConfig,
}
impl TimeoutState {
    pub fn new(cfg: TimingConfig) -> TimeoutState {
        TimeoutState {
            seconds_per_byte_estimate: 1.0 / (cfg.expected_upload_speed * 1_000_000.0),
            cfg,
        }
    }
}
impl Timeout for TimeoutState {
    fn get_estimate(&self) -> f64 {
        self.seconds_per_byte_estimate
    }
    fn get_timeout(&self, size: u64, attempt: usize) -> Duration {
        let backoff = self.cfg.backoff.powi(attempt.saturating_sub(1) as i32);
        let time_estimate = (size as f64) * self.seconds_per_byte_estimate * backoff;
        let secs = self.cfg.base_timeout * backoff + self.cfg.timeout_fraction * time_estimate;
        // NaN and negative values become zero, overflow becomes the longest duration
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
    }
    fn update(&mut self, result: &RequestReport) {
        if result.size > self.cfg.avg_min_bytes {
            let target = result.success_time.as_secs_f64() / (result.size as f64);
            self.seconds_per_byte_estimate = self.cfg.avg_power * self.seconds_per_byte_estimate
                + (1.0 - self.cfg.avg_power) * target;
        }
    }
}
