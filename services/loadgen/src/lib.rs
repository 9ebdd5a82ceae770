pub mod accounts;
pub mod config;
pub mod monitor;
pub mod report;
pub mod virtual_user;
pub mod ws_client;

use std::path::Path;

use rand::seq::SliceRandom;
use tokio::task::JoinHandle;
use tracing::info;

use config::{RunConfig, MONITOR_USERNAME};
use monitor::{run_monitor, PerfSample};
use report::RunSummary;

/// Runs one load test: a connect-ramp of virtual users plus a coexisting
/// Monitor, per spec.md §4.6/§4.7. The run completes when every virtual
/// user's action loop has finished; only then is the monitor stopped.
///
/// `accounts` must include a `"monitor"` row (as provisioned by
/// [`accounts::provision_accounts`]) — without it the monitor has no token
/// to authenticate with and the server will never reply to its pings.
pub async fn run_load_generator(
    config: RunConfig,
    accounts: Vec<(String, String)>,
) -> (Vec<PerfSample>, RunSummary) {
    let mut rng = rand::thread_rng();
    let mut pool = accounts;
    let monitor_token = match pool.iter().position(|(username, _)| username == MONITOR_USERNAME) {
        Some(idx) => pool.remove(idx).1,
        None => {
            tracing::warn!(
                "no \"{MONITOR_USERNAME}\" account in the account pool; monitor will not authenticate"
            );
            String::new()
        }
    };
    pool.shuffle(&mut rng);
    let chosen: Vec<(String, String)> = pool.into_iter().take(config.num_users).collect();
    info!(requested = config.num_users, available = chosen.len(), "starting load generator run");

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
    let monitor_handle: JoinHandle<Vec<PerfSample>> = tokio::spawn(run_monitor(
        config.ws_url.clone(),
        monitor_token,
        stop_rx,
    ));

    let mut user_handles = Vec::with_capacity(chosen.len());
    for (username, token) in chosen {
        let ws_url = config.ws_url.clone();
        let test_channels = config.test_channels.clone();
        let num_actions = config.num_actions;
        let delay_before_actions = config.delay_before_actions;
        let delay_between_actions = config.delay_between_actions;
        let max_reconnect_attempts = config.max_reconnect_attempts;
        let reconnect_delay = config.reconnect_delay;

        user_handles.push(tokio::spawn(virtual_user::run_virtual_user(
            ws_url,
            token,
            username,
            test_channels,
            num_actions,
            delay_before_actions,
            delay_between_actions,
            max_reconnect_attempts,
            reconnect_delay,
        )));
        tokio::time::sleep(config.connection_delay).await;
    }

    for handle in user_handles {
        let _ = handle.await;
    }
    info!("all virtual users finished, stopping monitor");

    let _ = stop_tx.send(());
    let samples = monitor_handle.await.unwrap_or_default();
    let summary = report::summarize(&samples);
    (samples, summary)
}

pub fn persist_report(
    samples: &[PerfSample],
    summary: &RunSummary,
    output_dir: &Path,
) -> std::io::Result<()> {
    report::persist(samples, summary, output_dir)
}
