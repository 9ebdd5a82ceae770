use std::sync::atomic::{AtomicU64, Ordering};

use chat_protocol::Frame;
use sysinfo::System;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// EMA smoothing window, per spec: `alpha = 2 / (W + 1)`.
const EMA_WINDOW: f64 = 3.0;
/// Floor on the sampling period so a burst of rapid pings can't blow up the
/// instantaneous rate.
const MIN_PERIOD_SECS: f64 = 0.25;

/// The monitor's view of the server: message-rate EMA plus host metrics,
/// reset whenever the monitor connects or disconnects.
pub struct Telemetry {
    message_volume: AtomicU64,
    mv_timer: Mutex<Instant>,
    ema: Mutex<f64>,
    system: Mutex<System>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            message_volume: AtomicU64::new(0),
            mv_timer: Mutex::new(Instant::now()),
            ema: Mutex::new(0.0),
            system: Mutex::new(System::new()),
        }
    }

    /// Records `count` additional successful per-subscriber broadcast
    /// sends since the last sample.
    pub fn record_sends(&self, count: u64) {
        if count > 0 {
            self.message_volume.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub async fn reset(&self) {
        self.message_volume.store(0, Ordering::Relaxed);
        *self.mv_timer.lock().await = Instant::now();
        *self.ema.lock().await = 0.0;
    }

    /// Samples host metrics and the message-rate EMA, building the reply
    /// frame for a `perf_test` ping. Also rolls the counting window.
    pub async fn sample_and_reply(&self, perf_test_id: u64, active_connections: u32) -> Frame {
        let (cpu_load, memory_usage) = {
            let mut system = self.system.lock().await;
            system.refresh_cpu_usage();
            system.refresh_memory();
            let cpu_load: Vec<f32> = system
                .cpus()
                .iter()
                .map(|cpu| cpu.cpu_usage() / 100.0)
                .collect();
            let memory_usage = if system.total_memory() > 0 {
                system.used_memory() as f32 / system.total_memory() as f32
            } else {
                0.0
            };
            (cpu_load, memory_usage)
        };

        let now = Instant::now();
        let mut mv_timer = self.mv_timer.lock().await;
        let period = now
            .saturating_duration_since(*mv_timer)
            .as_secs_f64()
            .max(MIN_PERIOD_SECS);
        let message_volume = self.message_volume.swap(0, Ordering::Relaxed);
        let instant_rate = message_volume as f64 / period;

        let mut ema = self.ema.lock().await;
        let alpha = 2.0 / (EMA_WINDOW + 1.0);
        *ema = alpha * instant_rate + (1.0 - alpha) * *ema;
        let mv_adjusted = ema.round().max(0.0) as u64;

        *mv_timer = now;

        Frame::perf_test_reply(
            perf_test_id,
            cpu_load,
            memory_usage,
            active_connections,
            message_volume,
            period,
            mv_adjusted,
        )
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_sample_reflects_recorded_sends() {
        let telemetry = Telemetry::new();
        telemetry.record_sends(10);
        let reply = telemetry.sample_and_reply(1, 4).await;
        assert_eq!(reply.perf_test_id, Some(1));
        assert_eq!(reply.message_volume, Some(10));
        assert_eq!(reply.active_connections, Some(4));
        assert!(reply.mv_period.unwrap() >= MIN_PERIOD_SECS);
        assert!(!reply.cpu_load.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_clears_volume_and_ema() {
        let telemetry = Telemetry::new();
        telemetry.record_sends(100);
        let _ = telemetry.sample_and_reply(1, 1).await;
        telemetry.reset().await;
        let reply = telemetry.sample_and_reply(2, 1).await;
        assert_eq!(reply.message_volume, Some(0));
        assert_eq!(reply.mv_adjusted, Some(0));
    }

    #[tokio::test]
    async fn ema_matches_manual_calculation_across_two_samples() {
        let telemetry = Telemetry::new();
        let alpha = 2.0 / (EMA_WINDOW + 1.0);

        telemetry.record_sends(9);
        let first = telemetry.sample_and_reply(1, 1).await;
        let expected_ema1 = alpha * (9.0 / first.mv_period.unwrap());
        assert!((first.mv_adjusted.unwrap() as f64 - expected_ema1).abs() < 1.0);

        telemetry.record_sends(9);
        let second = telemetry.sample_and_reply(2, 1).await;
        let expected_ema2 =
            alpha * (9.0 / second.mv_period.unwrap()) + (1.0 - alpha) * expected_ema1;
        assert!((second.mv_adjusted.unwrap() as f64 - expected_ema2).abs() < 1.0);
    }

    #[tokio::test]
    async fn mv_adjusted_never_negative() {
        let telemetry = Telemetry::new();
        let reply = telemetry.sample_and_reply(1, 0).await;
        assert!(reply.mv_adjusted.unwrap() == 0);
    }
}
