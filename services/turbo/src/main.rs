//! handle-turbo
//!
//! Single binary for the three cooperating services:
//! 1. `registry`: availability registry (`/check`, `/claim`)
//! 2. `broker`: claim broker owning the actor account pool (`/assign`)
//! 3. `monitor`: concurrent polling loops that claim targets as they free up
//!
//! Usage: `handle-turbo <registry|broker|monitor> [--config PATH]`

mod broker_api;
mod config;
mod error;
mod http;
mod metrics;
mod monitor_api;
mod platform_impl;
mod registry_api;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::error::Error;

/// Which service this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Registry,
    Broker,
    Monitor,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::Registry => "registry",
            Role::Broker => "broker",
            Role::Monitor => "monitor",
        }
    }
}

/// Parsed command line.
#[derive(Debug, PartialEq, Eq)]
struct Cli {
    role: Role,
    config_path: Option<String>,
}

/// Parse `<role> [--config PATH]` (flag may come before or after the role).
fn parse_args(args: &[String]) -> error::Result<Cli> {
    let mut role = None;
    let mut config_path = None;
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter
                    .next()
                    .ok_or_else(|| Error::Usage(": --config needs a path".into()))?;
                config_path = Some(path.clone());
            }
            "registry" => role = Some(Role::Registry),
            "broker" => role = Some(Role::Broker),
            "monitor" => role = Some(Role::Monitor),
            other => return Err(Error::UnknownRole(other.to_string())),
        }
    }

    let role = role.ok_or_else(|| Error::Usage(String::new()))?;
    Ok(Cli { role, config_path })
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, filter from LOG_LEVEL then RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_args(&args)?;
    info!(role = cli.role.as_str(), "starting handle-turbo");

    // Install before any metric is emitted
    let prometheus = metrics::install_recorder().context("failed to install metrics recorder")?;

    let config_path = Config::resolve_path(cli.config_path.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    match cli.role {
        Role::Registry => registry_api::run(&config, prometheus).await,
        Role::Broker => broker_api::run(&config, prometheus).await,
        Role::Monitor => monitor_api::run(&config, prometheus).await,
    }
}
