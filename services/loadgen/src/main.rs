use std::path::PathBuf;
use std::time::Duration;

use clap::{Arg, ArgMatches, Command};
use loadgen::config::{default_test_channels, RunConfig};
use tracing::info;

fn validate_u64(value: &str) -> Result<u64, String> {
    value.parse::<u64>().map_err(|_| "must be a non-negative integer".to_owned())
}

fn validate_f64(value: &str) -> Result<f64, String> {
    value.parse::<f64>().map_err(|_| "must be a number".to_owned())
}

fn run_command() -> Command {
    Command::new("run")
        .about("Runs a load test against a live server")
        .arg(
            Arg::new("accounts")
                .long("accounts")
                .help("CSV file of provisioned username,token rows")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("num_users")
                .long("num-users")
                .value_parser(validate_u64)
                .default_value("10"),
        )
        .arg(
            Arg::new("num_actions")
                .long("num-actions")
                .value_parser(validate_u64)
                .default_value("20"),
        )
        .arg(
            Arg::new("connection_delay")
                .long("connection-delay-secs")
                .value_parser(validate_f64)
                .default_value("0.2"),
        )
        .arg(
            Arg::new("delay_before_actions")
                .long("warmup-secs")
                .value_parser(validate_f64)
                .default_value("1.0"),
        )
        .arg(
            Arg::new("delay_between_actions")
                .long("action-delay-secs")
                .value_parser(validate_f64)
                .default_value("2.0"),
        )
        .arg(
            Arg::new("output_dir")
                .long("output-dir")
                .value_parser(clap::value_parser!(PathBuf))
                .default_value("loadgen-results"),
        )
}

fn provision_command() -> Command {
    Command::new("provision-accounts")
        .about("Creates the test-account pool on the server and writes their bearer tokens")
        .arg(
            Arg::new("count")
                .long("count")
                .value_parser(validate_u64)
                .default_value("100"),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .default_value("loadtest-password"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .value_parser(clap::value_parser!(PathBuf))
                .default_value("accounts.csv"),
        )
}

fn secs(matches: &ArgMatches, id: &str) -> Duration {
    Duration::from_secs_f64(*matches.get_one::<f64>(id).expect("has default"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("Load Generator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Chat server load generator and monitor client")
        .subcommand(run_command())
        .subcommand(provision_command())
        .subcommand_required(true)
        .get_matches();

    match matches.subcommand() {
        Some(("run", sub)) => run(sub).await,
        Some(("provision-accounts", sub)) => provision(sub).await,
        _ => unreachable!("clap enforces subcommand_required"),
    }
}

async fn run(matches: &ArgMatches) {
    let (http_url, ws_url) = RunConfig::endpoints_from_env();
    let accounts_path = matches
        .get_one::<PathBuf>("accounts")
        .expect("required")
        .clone();
    let accounts = loadgen::accounts::load_accounts_csv(&accounts_path)
        .unwrap_or_else(|e| panic!("failed to load accounts from {accounts_path:?}: {e}"));

    let config = RunConfig {
        http_url,
        ws_url,
        num_users: *matches.get_one::<u64>("num_users").expect("has default") as usize,
        num_actions: *matches.get_one::<u64>("num_actions").expect("has default") as u32,
        connection_delay: secs(matches, "connection_delay"),
        delay_before_actions: secs(matches, "delay_before_actions"),
        delay_between_actions: secs(matches, "delay_between_actions"),
        max_reconnect_attempts: 5,
        reconnect_delay: Duration::from_secs(1),
        test_channels: default_test_channels(),
    };

    info!(num_users = config.num_users, num_actions = config.num_actions, "run starting");
    let (samples, summary) = loadgen::run_load_generator(config, accounts).await;
    info!(
        sample_count = summary.sample_count,
        filtered_count = summary.filtered_count,
        p90 = summary.p90_secs,
        p95 = summary.p95_secs,
        p99 = summary.p99_secs,
        "run complete"
    );

    let output_dir = matches
        .get_one::<PathBuf>("output_dir")
        .expect("has default");
    if let Err(err) = loadgen::persist_report(&samples, &summary, output_dir) {
        tracing::error!(%err, "failed to persist report");
    }
}

async fn provision(matches: &ArgMatches) {
    let (http_url, _ws_url) = RunConfig::endpoints_from_env();
    let count = *matches.get_one::<u64>("count").expect("has default") as usize;
    let password = matches.get_one::<String>("password").expect("has default");
    let output = matches.get_one::<PathBuf>("output").expect("has default");

    info!(count, "provisioning accounts");
    if let Err(err) = loadgen::accounts::provision_accounts(&http_url, count, password, output).await {
        tracing::error!(%err, "account provisioning failed");
        std::process::exit(1);
    }
    info!(output = ?output, "accounts provisioned");
}
