//! Virtual-user action loop: connect, warm up, then run a fixed number of
//! randomly-selected actions spaced `delay_between_actions` apart.
//!
//! Ported directly from `choose_action`/`send_random_message` in the
//! original Python load tester; the action-selection distribution is load-
//! bearing and must not be rebalanced.

use std::collections::HashSet;
use std::time::Duration;

use chat_protocol::Frame;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{error, warn};

use crate::config::{
    MAX_HELD_CHANNELS, MAX_MESSAGE_LENGTH, MIN_HELD_CHANNELS_TO_LEAVE,
};
use crate::ws_client::ChatSession;

const VOCABULARY: &[&str] = &[
    "lap", "split", "chip", "bib", "finish", "corral", "pace", "relay", "timer", "start",
    "gate", "course", "runner", "checkpoint", "results",
];

#[derive(Debug, Clone)]
pub enum Action {
    Bootstrap(Vec<String>),
    Send(String),
    Join(String),
    Leave(String),
    Noop,
}

/// Picks the next action for a user holding `held` channels out of `pool`,
/// per spec.md §4.6's weighted distribution.
pub fn choose_action(held: &[String], pool: &[String], rng: &mut impl Rng) -> Action {
    if held.is_empty() {
        let n = rng.gen_range(2..=6).min(pool.len());
        let chosen: Vec<String> = pool
            .choose_multiple(rng, n)
            .cloned()
            .collect();
        return Action::Bootstrap(chosen);
    }

    let r = rng.gen_range(0..100u32);
    if r >= 6 {
        let channel = held[rng.gen_range(0..held.len())].clone();
        Action::Send(channel)
    } else if (3..=5).contains(&r) && held.len() < pool.len().min(MAX_HELD_CHANNELS) {
        let candidates: Vec<&String> = pool.iter().filter(|c| !held.contains(c)).collect();
        match candidates.choose(rng) {
            Some(channel) => Action::Join((*channel).clone()),
            None => Action::Noop,
        }
    } else if held.len() >= MIN_HELD_CHANNELS_TO_LEAVE {
        let channel = held[rng.gen_range(0..held.len())].clone();
        Action::Leave(channel)
    } else {
        Action::Noop
    }
}

/// Builds a random chat message from a fixed vocabulary, 1..`MAX_MESSAGE_LENGTH` words.
pub fn random_message(rng: &mut impl Rng) -> String {
    let word_count = rng.gen_range(1..=MAX_MESSAGE_LENGTH);
    (0..word_count)
        .map(|_| *VOCABULARY.choose(rng).expect("vocabulary is non-empty"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sends `frame`, retrying through a fresh connection with linear backoff if
/// the send fails. Returns `false` once retries are exhausted, signalling
/// the caller should stop this user without aborting the wider run.
pub async fn send_with_resilience(
    session: &mut ChatSession,
    ws_url: &str,
    token: &str,
    username: &str,
    max_reconnect_attempts: u32,
    reconnect_delay: Duration,
    frame: &Frame,
) -> bool {
    if session.send(frame).await.is_ok() {
        return true;
    }

    for attempt in 1..=max_reconnect_attempts {
        tokio::time::sleep(reconnect_delay * attempt).await;
        match ChatSession::connect(ws_url, token).await {
            Ok(new_session) => {
                *session = new_session;
                if session.send(frame).await.is_ok() {
                    return true;
                }
            }
            Err(err) => {
                warn!(%username, %err, attempt, "virtual user reconnect attempt failed");
            }
        }
    }

    error!(%username, "virtual user exhausted reconnect attempts, exiting");
    false
}

/// Runs one virtual user end to end: connect-with-retry, warm-up, then
/// `num_actions` actions spaced `delay_between_actions` apart.
#[allow(clippy::too_many_arguments)]
pub async fn run_virtual_user(
    ws_url: String,
    token: String,
    username: String,
    test_channels: Vec<String>,
    num_actions: u32,
    delay_before_actions: Duration,
    delay_between_actions: Duration,
    max_reconnect_attempts: u32,
    reconnect_delay: Duration,
) {
    let mut session = match connect_with_retry(
        &ws_url,
        &token,
        &username,
        max_reconnect_attempts,
        reconnect_delay,
    )
    .await
    {
        Some(session) => session,
        None => return,
    };

    tokio::time::sleep(delay_before_actions).await;

    let mut held: Vec<String> = Vec::new();
    let mut held_set: HashSet<String> = HashSet::new();
    let mut rng = rand::thread_rng();

    for _ in 0..num_actions {
        let action = choose_action(&held, &test_channels, &mut rng);
        let ok = match action {
            Action::Bootstrap(channels) => {
                let mut all_ok = true;
                for channel in channels {
                    if held_set.contains(&channel) {
                        continue;
                    }
                    let frame = Frame::add_channel(channel.clone());
                    if !send_with_resilience(
                        &mut session,
                        &ws_url,
                        &token,
                        &username,
                        max_reconnect_attempts,
                        reconnect_delay,
                        &frame,
                    )
                    .await
                    {
                        all_ok = false;
                        break;
                    }
                    held_set.insert(channel.clone());
                    held.push(channel);
                }
                all_ok
            }
            Action::Send(channel) => {
                let frame = Frame::message(channel.clone(), random_message(&mut rng));
                send_with_resilience(
                    &mut session,
                    &ws_url,
                    &token,
                    &username,
                    max_reconnect_attempts,
                    reconnect_delay,
                    &frame,
                )
                .await
            }
            Action::Join(channel) => {
                let frame = Frame::add_channel(channel.clone());
                let sent = send_with_resilience(
                    &mut session,
                    &ws_url,
                    &token,
                    &username,
                    max_reconnect_attempts,
                    reconnect_delay,
                    &frame,
                )
                .await;
                if sent {
                    held_set.insert(channel.clone());
                    held.push(channel);
                }
                sent
            }
            Action::Leave(channel) => {
                let frame = Frame::leave_channel(channel.clone());
                let sent = send_with_resilience(
                    &mut session,
                    &ws_url,
                    &token,
                    &username,
                    max_reconnect_attempts,
                    reconnect_delay,
                    &frame,
                )
                .await;
                if sent {
                    held_set.remove(&channel);
                    held.retain(|c| c != &channel);
                }
                sent
            }
            Action::Noop => true,
        };

        if !ok {
            return;
        }
        tokio::time::sleep(delay_between_actions).await;
    }

    let _ = session.close().await;
}

async fn connect_with_retry(
    ws_url: &str,
    token: &str,
    username: &str,
    max_reconnect_attempts: u32,
    reconnect_delay: Duration,
) -> Option<ChatSession> {
    let mut attempt = 0;
    loop {
        match ChatSession::connect(ws_url, token).await {
            Ok(session) => return Some(session),
            Err(err) => {
                attempt += 1;
                if attempt > max_reconnect_attempts {
                    error!(%username, %err, "virtual user failed to connect, giving up");
                    return None;
                }
                warn!(%username, %err, attempt, "virtual user connect failed, retrying");
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
}
