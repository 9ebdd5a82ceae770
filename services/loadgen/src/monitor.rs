//! Monitor client: a privileged virtual user (`username = "monitor"`) that
//! pings the server once a second and records latency/telemetry samples.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chat_protocol::{Event, Frame};
use tracing::warn;

use crate::ws_client::ChatSession;

/// One round-trip sample for a single `perf_test_id`.
#[derive(Debug, Clone)]
pub struct PerfSample {
    pub perf_test_id: u64,
    pub latency: Duration,
    pub cpu_load: Vec<f32>,
    pub memory_usage: f32,
    pub active_connections: i64,
    pub message_volume: u64,
    pub mv_period: f64,
    pub mv_adjusted: u64,
}

/// Runs the monitor until `stop_rx` fires, then closes its session and
/// returns every sample it collected (in ping order).
pub async fn run_monitor(
    ws_url: String,
    token: String,
    mut stop_rx: tokio::sync::oneshot::Receiver<()>,
) -> Vec<PerfSample> {
    let mut session = match ChatSession::connect(&ws_url, &token).await {
        Ok(session) => session,
        Err(err) => {
            warn!(%err, "monitor failed to connect, no samples will be collected");
            return Vec::new();
        }
    };

    let mut sent_at: HashMap<u64, Instant> = HashMap::new();
    let mut samples: Vec<PerfSample> = Vec::new();
    let mut next_id: u64 = 1;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sent_at.insert(next_id, Instant::now());
                if session.send(&Frame::perf_test(next_id)).await.is_err() {
                    break;
                }
                next_id += 1;
            }
            received = session.recv() => {
                match received {
                    Ok(Some(frame)) if frame.event == Event::PerfTest => {
                        if let Some(sample) = build_sample(&frame, &mut sent_at) {
                            samples.push(sample);
                        }
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(err) => {
                        warn!(%err, "monitor decode error, skipping this reply");
                    }
                }
            }
            _ = &mut stop_rx => break,
        }
    }

    let _ = session.close().await;
    samples
}

fn build_sample(frame: &Frame, sent_at: &mut HashMap<u64, Instant>) -> Option<PerfSample> {
    let perf_test_id = frame.perf_test_id?;
    let started = sent_at.remove(&perf_test_id)?;
    Some(PerfSample {
        perf_test_id,
        latency: started.elapsed(),
        cpu_load: frame.cpu_load.clone().unwrap_or_default(),
        memory_usage: frame.memory_usage.unwrap_or(0.0),
        active_connections: i64::from(frame.active_connections.unwrap_or(0)),
        message_volume: frame.message_volume.unwrap_or(0),
        mv_period: frame.mv_period.unwrap_or(0.0),
        mv_adjusted: frame.mv_adjusted.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_sample_copies_wire_active_connections_unchanged() {
        let mut sent_at = HashMap::new();
        sent_at.insert(7, Instant::now());
        let frame = Frame::perf_test_reply(7, vec![0.1], 0.2, 3, 5, 1.0, 2);
        let sample = build_sample(&frame, &mut sent_at).expect("sample built");
        assert_eq!(sample.perf_test_id, 7);
        assert_eq!(sample.active_connections, 3);
        assert!(!sent_at.contains_key(&7));
    }

    #[test]
    fn build_sample_is_none_for_unknown_ping_id() {
        let mut sent_at = HashMap::new();
        let frame = Frame::perf_test_reply(99, vec![], 0.0, 0, 0, 1.0, 0);
        assert!(build_sample(&frame, &mut sent_at).is_none());
    }
}
