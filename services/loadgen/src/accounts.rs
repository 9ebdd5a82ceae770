//! Offline account provisioning: create the test-account pool on the server
//! and write a username/token CSV the load generator can read for a run.
//!
//! Grounded on the original `create_accounts_on_server_from_local_file` /
//! `create_bearer_token_csv` pair — account creation and token acquisition
//! run as two steps, with one retry on a failed token request.

use std::path::Path;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::MONITOR_USERNAME;

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server rejected request with status {0}")]
    Status(reqwest::StatusCode),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct AccountRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Creates `count` accounts named `loadtest-user-{i}` plus the reserved
/// `"monitor"` account on the server, and writes their bearer tokens to
/// `output_csv` as `username,token` rows. The monitor row lets
/// [`crate::run_load_generator`] pick the one account the server replies to
/// with telemetry, instead of drawing it from the virtual-user pool.
pub async fn provision_accounts(
    http_url: &str,
    count: usize,
    password: &str,
    output_csv: &Path,
) -> Result<(), ProvisionError> {
    let client = reqwest::Client::new();
    let usernames = std::iter::once(MONITOR_USERNAME.to_owned())
        .chain((0..count).map(|i| format!("loadtest-user-{i}")));
    let tasks = usernames.map(|username| {
        let client = client.clone();
        let http_url = http_url.to_owned();
        let password = password.to_owned();
        async move { provision_one(&client, &http_url, &username, &password).await }
    });

    let results = join_all(tasks).await;

    let mut rows = String::from("username,token\n");
    let mut failures = 0usize;
    for result in results {
        match result {
            Ok((username, token)) => rows.push_str(&format!("{username},{token}\n")),
            Err(err) => {
                warn!(%err, "dropping account that failed provisioning");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        warn!(failures, "some accounts failed provisioning and were skipped");
    }

    std::fs::write(output_csv, rows)?;
    Ok(())
}

async fn provision_one(
    client: &reqwest::Client,
    http_url: &str,
    username: &str,
    password: &str,
) -> Result<(String, String), ProvisionError> {
    create_account(client, http_url, username, password).await?;
    let token = auth_token_with_retry(client, http_url, username, password).await?;
    Ok((username.to_owned(), token))
}

async fn create_account(
    client: &reqwest::Client,
    http_url: &str,
    username: &str,
    password: &str,
) -> Result<(), ProvisionError> {
    let response = client
        .post(format!("{http_url}/create_account"))
        .json(&AccountRequest { username, password })
        .send()
        .await?;
    if response.status().is_success() || response.status() == reqwest::StatusCode::CONFLICT {
        Ok(())
    } else {
        Err(ProvisionError::Status(response.status()))
    }
}

async fn auth_token_with_retry(
    client: &reqwest::Client,
    http_url: &str,
    username: &str,
    password: &str,
) -> Result<String, ProvisionError> {
    match auth_token(client, http_url, username, password).await {
        Ok(token) => Ok(token),
        Err(err) => {
            warn!(%err, %username, "auth token request failed, retrying once");
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            auth_token(client, http_url, username, password).await
        }
    }
}

/// Reads a `username,token` CSV previously written by [`provision_accounts`].
pub fn load_accounts_csv(path: &Path) -> Result<Vec<(String, String)>, ProvisionError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(','))
        .map(|(username, token)| (username.to_owned(), token.to_owned()))
        .collect())
}

async fn auth_token(
    client: &reqwest::Client,
    http_url: &str,
    username: &str,
    password: &str,
) -> Result<String, ProvisionError> {
    let response = client
        .post(format!("{http_url}/auth/token"))
        .json(&AccountRequest { username, password })
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(ProvisionError::Status(response.status()));
    }
    let body: TokenResponse = response.json().await?;
    Ok(body.access_token)
}
