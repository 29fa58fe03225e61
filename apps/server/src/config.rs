use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use thiserror::Error;
use twelvedata_market_data::provider::twelvedata::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};

pub const LISTEN_ADDRESS_VAR: &str = "EXPORTER_LISTEN_ADDRESS";
pub const LISTEN_PORT_VAR: &str = "EXPORTER_LISTEN_PORT";
pub const SCRAPE_PATH_VAR: &str = "EXPORTER_SCRAPE_PATH";
pub const REQUEST_TIMEOUT_VAR: &str = "EXPORTER_REQUEST_TIMEOUT_MS";
pub const CACHE_FRESH_VAR: &str = "EXPORTER_CACHE_FRESH_SECS";
pub const CACHE_RETENTION_VAR: &str = "EXPORTER_CACHE_RETENTION_SECS";
pub const API_KEY_VAR: &str = "TWELVEDATA_API_KEY";
pub const BASE_URL_VAR: &str = "TWELVEDATA_BASE_URL";
pub const RATE_LIMIT_VAR: &str = "TWELVEDATA_RATE_LIMIT";
pub const RATE_LIMIT_WAIT_VAR: &str = "TWELVEDATA_RATE_LIMIT_WAIT_MS";
pub const UPSTREAM_TIMEOUT_VAR: &str = "TWELVEDATA_TIMEOUT_MS";

pub const DEFAULT_LISTEN_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
pub const DEFAULT_LISTEN_PORT: u16 = 10016;
pub const DEFAULT_SCRAPE_PATH: &str = "/price";

/// Command-line flags. Each one falls back to its environment variable.
#[derive(Parser, Debug, Clone)]
#[command(name = "twelvedata-exporter", version, about = "Fetch quotes from Twelvedata API")]
pub struct Cli {
    /// Set IP address
    #[arg(
        short = 'I',
        long = "web.listen-address",
        env = LISTEN_ADDRESS_VAR,
        default_value_t = DEFAULT_LISTEN_ADDRESS
    )]
    pub listen_address: IpAddr,

    /// Set port number
    #[arg(
        short = 'P',
        long = "web.listen-port",
        env = LISTEN_PORT_VAR,
        default_value_t = DEFAULT_LISTEN_PORT
    )]
    pub listen_port: u16,

    /// Set the path to expose metrics
    #[arg(
        short = 'p',
        long = "web.scrape-path",
        env = SCRAPE_PATH_VAR,
        default_value = DEFAULT_SCRAPE_PATH
    )]
    pub scrape_path: String,

    /// Set key to use twelvedata API
    #[arg(
        short = 'a',
        long = "twelvedata.api-key",
        env = API_KEY_VAR,
        hide_env_values = true
    )]
    pub api_key: Option<String>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("API key missing: pass --twelvedata.api-key or set TWELVEDATA_API_KEY")]
    MissingApiKey,
    #[error("Invalid {var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub scrape_path: String,
    pub request_timeout: Duration,
    pub api_key: String,
    pub base_url: String,
    /// Upstream requests per minute; `0` disables the limiter.
    pub rate_limit: u32,
    pub rate_limit_wait: Duration,
    pub upstream_timeout: Duration,
    pub cache_fresh_for: Duration,
    pub cache_retain_for: Duration,
}

impl Config {
    /// Parse the command line, after loading `.env` so its values can back
    /// the flags. Exits with usage on bad flags.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_cli(Cli::parse(), |var| std::env::var(var).ok())
    }

    /// Build from variables alone, as if no flag had been given.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cli = Cli {
            listen_address: parse_var(&lookup, LISTEN_ADDRESS_VAR, Some(DEFAULT_LISTEN_ADDRESS))?,
            listen_port: parse_var(&lookup, LISTEN_PORT_VAR, Some(DEFAULT_LISTEN_PORT))?,
            scrape_path: lookup(SCRAPE_PATH_VAR).unwrap_or_else(|| DEFAULT_SCRAPE_PATH.into()),
            api_key: lookup(API_KEY_VAR),
        };
        Self::from_cli(cli, lookup)
    }

    /// Combine parsed flags with the variables that have no flag.
    pub fn from_cli<F>(cli: Cli, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = cli
            .api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let listen_addr = SocketAddr::new(cli.listen_address, cli.listen_port);

        let scrape_path = cli.scrape_path;
        if !scrape_path.starts_with('/') || scrape_path.len() < 2 {
            return Err(ConfigError::Invalid {
                var: SCRAPE_PATH_VAR,
                value: scrape_path,
                reason: "must be an absolute path other than '/'".into(),
            });
        }
        if scrape_path == "/metrics" || scrape_path == "/healthz" {
            return Err(ConfigError::Invalid {
                var: SCRAPE_PATH_VAR,
                value: scrape_path,
                reason: "collides with a built-in route".into(),
            });
        }

        let base_url = lookup(BASE_URL_VAR).unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let rate_limit = parse_var(&lookup, RATE_LIMIT_VAR, Some(0))?;
        let rate_limit_wait =
            Duration::from_millis(parse_var(&lookup, RATE_LIMIT_WAIT_VAR, Some(10_000))?);
        let upstream_timeout = Duration::from_millis(parse_var(
            &lookup,
            UPSTREAM_TIMEOUT_VAR,
            Some(DEFAULT_TIMEOUT.as_millis() as u64),
        )?);
        let request_timeout =
            Duration::from_millis(parse_var(&lookup, REQUEST_TIMEOUT_VAR, Some(30_000))?);

        let cache_fresh_for = Duration::from_secs(parse_var(&lookup, CACHE_FRESH_VAR, Some(60))?);
        let cache_retain_for =
            Duration::from_secs(parse_var(&lookup, CACHE_RETENTION_VAR, Some(300))?);
        if cache_retain_for < cache_fresh_for {
            return Err(ConfigError::Invalid {
                var: CACHE_RETENTION_VAR,
                value: cache_retain_for.as_secs().to_string(),
                reason: format!("must not be shorter than {}", CACHE_FRESH_VAR),
            });
        }

        Ok(Self {
            listen_addr,
            scrape_path,
            request_timeout,
            api_key,
            base_url,
            rate_limit,
            rate_limit_wait,
            upstream_timeout,
            cache_fresh_for,
            cache_retain_for,
        })
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: Option<T>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value,
            reason: e.to_string(),
        }),
        None => default.ok_or_else(|| ConfigError::Invalid {
            var,
            value: String::new(),
            reason: "no default".into(),
        }),
    }
}
