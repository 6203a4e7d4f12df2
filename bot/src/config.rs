use crate::commands::UserId;
use crate::monitor::{validate_interval, validate_multiplier};
use reqwest::Url;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DEFAULT_MULTIPLIER: &str = "1.1";
const DEFAULT_INTERVAL: &str = "60";
const DEFAULT_COLLECTION: &str = "chonks";
const DEFAULT_TRAIT: &str = "accessories";
const DEFAULT_CHAIN: &str = "ethereum";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Process-wide settings, read once at startup.
pub struct Config {
    pub opensea_api_key: String,
    pub private_key: String,
    pub rpc_url: Url,
    pub telegram_token: String,
    pub allowed_users: HashSet<UserId>,
    pub max_price_multiplier: Decimal,
    pub check_interval_secs: u64,
    pub collection_slug: String,
    pub trait_name: String,
    pub chain: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("rpc_url", &self.rpc_url.host_str())
            .field("allowed_users", &self.allowed_users)
            .field("max_price_multiplier", &self.max_price_multiplier)
            .field("check_interval_secs", &self.check_interval_secs)
            .field("collection_slug", &self.collection_slug)
            .field("trait_name", &self.trait_name)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let mut missing = Vec::new();
        let mut require = |name: &'static str| {
            get(name).unwrap_or_else(|| {
                missing.push(name);
                String::new()
            })
        };

        let opensea_api_key = require("OPENSEA_API_KEY");
        let private_key = require("ETH_PRIVATE_KEY");
        let rpc_url = require("ETHEREUM_RPC_URL");
        let telegram_token = require("TELEGRAM_TOKEN");
        let allowed_users = require("ALLOWED_USERS");

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let optional =
            |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let multiplier = optional("MAX_PRICE_MULTIPLIER", DEFAULT_MULTIPLIER);
        let max_price_multiplier = validate_multiplier(parse("MAX_PRICE_MULTIPLIER", &multiplier)?)
            .map_err(|e| invalid("MAX_PRICE_MULTIPLIER", e))?;

        let interval = optional("CHECK_INTERVAL", DEFAULT_INTERVAL);
        let check_interval_secs = validate_interval(parse("CHECK_INTERVAL", &interval)?)
            .map_err(|e| invalid("CHECK_INTERVAL", e))?;

        Ok(Self {
            opensea_api_key,
            private_key,
            rpc_url: parse("ETHEREUM_RPC_URL", &rpc_url)?,
            telegram_token,
            allowed_users: parse_users(&allowed_users)?,
            max_price_multiplier,
            check_interval_secs,
            collection_slug: optional("COLLECTION_SLUG", DEFAULT_COLLECTION),
            trait_name: optional("TRAIT_NAME", DEFAULT_TRAIT),
            chain: optional("OPENSEA_CHAIN", DEFAULT_CHAIN),
        })
    }
}

fn invalid(name: &'static str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.to_string(),
    }
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e| invalid(name, e))
}

fn parse_users(value: &str) -> Result<HashSet<UserId>, ConfigError> {
    let users = common::split_list(value)
        .into_iter()
        .map(|id| parse::<i64>("ALLOWED_USERS", id).map(UserId))
        .collect::<Result<HashSet<_>, _>>()?;

    if users.is_empty() {
        return Err(invalid("ALLOWED_USERS", "no user ids given"));
    }
    Ok(users)
}
