// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the [`AppConfig`] read once at
//! startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `WALLET_RPC_URL` | JSON-RPC bridge to the user's wallet | Required |
//! | `REQUIRED_NETWORK` | Network privileged calls must run on | `bellecour` |
//! | `DATAPROTECTOR_API_URL` | Data protector gateway base URL | Required |
//! | `REGISTRY_URL` | Backend user registry base URL | Required |
//! | `MAIL_APP` | Application granted access by default | `web3mail.apps.iexec.eth` |
//! | `MAIL_SENDER_NAME` | Sender name of consumed emails | `Relational` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use crate::blockchain::{resolve_network, NetworkConfig};
use crate::protector::AddressOrEnsName;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const WALLET_RPC_URL_ENV: &str = "WALLET_RPC_URL";
pub const REQUIRED_NETWORK_ENV: &str = "REQUIRED_NETWORK";
pub const DATAPROTECTOR_API_URL_ENV: &str = "DATAPROTECTOR_API_URL";
pub const REGISTRY_URL_ENV: &str = "REGISTRY_URL";
pub const MAIL_APP_ENV: &str = "MAIL_APP";
pub const MAIL_SENDER_NAME_ENV: &str = "MAIL_SENDER_NAME";

/// Logging format selector, read by `main` before anything else.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

/// iExec's web3mail dapp.
pub const DEFAULT_MAIL_APP: &str = "web3mail.apps.iexec.eth";
pub const DEFAULT_MAIL_SENDER_NAME: &str = "Relational";

/// Default `RUST_LOG` filter.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub wallet_rpc_url: String,
    pub network: NetworkConfig,
    pub dataprotector_api_url: String,
    pub registry_url: String,
    pub mail_app: AddressOrEnsName,
    pub mail_sender_name: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let host = env.or_default(HOST_ENV, DEFAULT_HOST);
        let port = match env.optional(PORT_ENV) {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: PORT_ENV.to_string(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let network = resolve_network(env.optional(REQUIRED_NETWORK_ENV).as_deref()).map_err(|reason| {
            ConfigError::Invalid {
                name: REQUIRED_NETWORK_ENV.to_string(),
                reason,
            }
        })?;

        let mail_app = env
            .or_default(MAIL_APP_ENV, DEFAULT_MAIL_APP)
            .parse::<AddressOrEnsName>()
            .map_err(|reason| ConfigError::Invalid {
                name: MAIL_APP_ENV.to_string(),
                reason,
            })?;

        Ok(Self {
            host,
            port,
            wallet_rpc_url: env.required(WALLET_RPC_URL_ENV)?,
            network,
            dataprotector_api_url: env.required(DATAPROTECTOR_API_URL_ENV)?,
            registry_url: env.required(REGISTRY_URL_ENV)?,
            mail_app,
            mail_sender_name: env.or_default(MAIL_SENDER_NAME_ENV, DEFAULT_MAIL_SENDER_NAME),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Trimmed value, `None` when unset or blank.
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.optional(name)
            .ok_or_else(|| ConfigError::Missing(name.to_string()))
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }
}
