//! Post-run processing of monitor samples: noise filtering, percentile
//! computation, and persistence of the raw samples plus a summary artifact.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::config::CPU_NOISE_FLOOR;
use crate::monitor::PerfSample;

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub sample_count: usize,
    pub filtered_count: usize,
    pub p90_secs: f64,
    pub p95_secs: f64,
    pub p99_secs: f64,
}

/// Filters out samples with no active connections or a peak per-core CPU
/// below the noise floor, per spec.md §4.7.
fn filter_samples(samples: &[PerfSample]) -> Vec<&PerfSample> {
    samples
        .iter()
        .filter(|s| s.active_connections > 0)
        .filter(|s| {
            s.cpu_load
                .iter()
                .cloned()
                .fold(0.0_f32, f32::max)
                >= CPU_NOISE_FLOOR
        })
        .collect()
}

/// Nearest-rank percentile over a pre-sorted ascending slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

pub fn summarize(samples: &[PerfSample]) -> RunSummary {
    let filtered = filter_samples(samples);
    let mut latencies: Vec<f64> = filtered.iter().map(|s| s.latency.as_secs_f64()).collect();
    latencies.sort_by(|a, b| a.partial_cmp(b).expect("latencies are finite"));

    RunSummary {
        sample_count: samples.len(),
        filtered_count: latencies.len(),
        p90_secs: percentile(&latencies, 90.0),
        p95_secs: percentile(&latencies, 95.0),
        p99_secs: percentile(&latencies, 99.0),
    }
}

#[derive(Serialize)]
struct RawSample<'a> {
    perf_test_id: u64,
    latency_secs: f64,
    cpu_load: &'a [f32],
    memory_usage: f32,
    active_connections: i64,
    message_volume: u64,
    mv_period: f64,
    mv_adjusted: u64,
}

/// Writes `samples.json` and `summary.json` into `output_dir`, creating it
/// if necessary.
pub fn persist(
    samples: &[PerfSample],
    summary: &RunSummary,
    output_dir: &Path,
) -> std::io::Result<()> {
    fs::create_dir_all(output_dir)?;

    let raw: Vec<RawSample> = samples
        .iter()
        .map(|s| RawSample {
            perf_test_id: s.perf_test_id,
            latency_secs: s.latency.as_secs_f64(),
            cpu_load: &s.cpu_load,
            memory_usage: s.memory_usage,
            active_connections: s.active_connections,
            message_volume: s.message_volume,
            mv_period: s.mv_period,
            mv_adjusted: s.mv_adjusted,
        })
        .collect();

    fs::write(
        output_dir.join("samples.json"),
        serde_json::to_string_pretty(&raw).expect("samples serialize"),
    )?;
    fs::write(
        output_dir.join("summary.json"),
        serde_json::to_string_pretty(summary).expect("summary serializes"),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample(id: u64, secs: f64, active: i64, cpu_peak: f32) -> PerfSample {
        PerfSample {
            perf_test_id: id,
            latency: Duration::from_secs_f64(secs),
            cpu_load: vec![cpu_peak],
            memory_usage: 0.1,
            active_connections: active,
            message_volume: 0,
            mv_period: 1.0,
            mv_adjusted: 0,
        }
    }

    #[test]
    fn filters_out_zero_connections_and_idle_cpu() {
        let samples = vec![
            sample(1, 0.01, 0, 0.5),
            sample(2, 0.02, 3, 0.01),
            sample(3, 0.03, 3, 0.5),
        ];
        let summary = summarize(&samples);
        assert_eq!(summary.sample_count, 3);
        assert_eq!(summary.filtered_count, 1);
    }

    #[test]
    fn percentiles_are_monotonic() {
        let samples: Vec<PerfSample> = (1..=100)
            .map(|i| sample(i, i as f64 / 1000.0, 3, 0.5))
            .collect();
        let summary = summarize(&samples);
        assert!(summary.p90_secs <= summary.p95_secs);
        assert!(summary.p95_secs <= summary.p99_secs);
        assert!(summary.p99_secs <= 0.1);
    }

    #[test]
    fn empty_samples_yield_zeroed_summary() {
        let summary = summarize(&[]);
        assert_eq!(summary.filtered_count, 0);
        assert_eq!(summary.p90_secs, 0.0);
    }
}
