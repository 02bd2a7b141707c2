use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use clap::Parser;
use relay_bridge::{
    AttestationError, AttestationPoller, BridgeOrchestrator, ChainDescriptor, ChainRegistry,
    ChainSettings, RegistryError, RpcConnector,
};
use relay_evm::{PollingConfig, SubmissionLocks};
use serde::Deserialize;
use tracing::Level;
use url::Url;

const DEFAULT_ATTESTATION_BASE_URL: &str = "https://cctp-test.circle.com";
const DEFAULT_PAYLINK_BASE_URL: &str = "https://paylink.test";

#[derive(Parser, Debug)]
pub struct Env {
    /// Path to plaintext TOML configuration file
    #[clap(long)]
    pub config: PathBuf,
    /// Path to TOML secrets file
    #[clap(long)]
    pub secrets: PathBuf,
}

/// Non-secret settings deserialized from the plaintext config TOML.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Config {
    #[serde(default)]
    testnet: bool,
    log_level: Option<LogLevel>,
    attestation: Option<AttestationConfig>,
    receipts: Option<PollingSection>,
    paylink: Option<PaylinkConfig>,
    #[serde(default)]
    chains: BTreeMap<String, ChainSettings>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AttestationConfig {
    base_url: Option<Url>,
    poll_interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PollingSection {
    poll_interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PaylinkConfig {
    base_url: Url,
}

/// Secret credentials deserialized from the secrets TOML.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Secrets {
    evm_private_key: B256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        (&log_level).into()
    }
}

impl From<&LogLevel> for Level {
    fn from(log_level: &LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML")]
    Toml(#[from] toml::de::Error),
    #[error("testnet operation must be acknowledged with `testnet = true`")]
    TestnetNotAcknowledged,
    #[error("invalid evm_private_key")]
    InvalidPrivateKey(#[source] alloy::signers::k256::ecdsa::Error),
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("{section}.poll_interval_secs must be greater than 0")]
    ZeroPollInterval { section: &'static str },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to build attestation client")]
    AttestationClient(#[source] AttestationError),
}

/// Everything a command needs, assembled once from the config and secrets
/// files and passed by reference from there on.
#[derive(Clone)]
pub struct Ctx {
    pub log_level: LogLevel,
    pub registry: ChainRegistry,
    pub attestation_base_url: Url,
    pub attestation_polling: PollingConfig,
    pub receipt_polling: PollingConfig,
    pub paylink_base_url: Url,
    signer: PrivateKeySigner,
    /// Shared by every connector built from this context.
    locks: Arc<SubmissionLocks>,
}

impl std::fmt::Debug for Ctx {
    fn fmt(&self, dest: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        dest.debug_struct("Ctx")
            .field("log_level", &self.log_level)
            .field("registry", &self.registry)
            .field("attestation_base_url", &self.attestation_base_url.as_str())
            .field("attestation_polling", &self.attestation_polling)
            .field("receipt_polling", &self.receipt_polling)
            .field("paylink_base_url", &self.paylink_base_url.as_str())
            .field("signer", &self.signer.address())
            .finish_non_exhaustive()
    }
}

impl Ctx {
    pub fn load_files(config: &Path, secrets: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(config)?;
        let secrets_str = std::fs::read_to_string(secrets)?;
        Self::from_toml(&config_str, &secrets_str)
    }

    pub fn from_toml(config_toml: &str, secrets_toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(config_toml)?;
        let secrets: Secrets = toml::from_str(secrets_toml)?;

        if !config.testnet {
            return Err(ConfigError::TestnetNotAcknowledged);
        }

        let signer = PrivateKeySigner::from_bytes(&secrets.evm_private_key)
            .map_err(ConfigError::InvalidPrivateKey)?;

        let (attestation_base_url, attestation_polling) = match config.attestation {
            Some(section) => (
                section.base_url,
                polling(
                    "attestation",
                    section.poll_interval_secs,
                    section.timeout_secs,
                    relay_bridge::attestation::DEFAULT_ATTESTATION_POLLING,
                )?,
            ),
            None => (None, relay_bridge::attestation::DEFAULT_ATTESTATION_POLLING),
        };

        let receipt_polling = match config.receipts {
            Some(section) => polling(
                "receipts",
                section.poll_interval_secs,
                section.timeout_secs,
                PollingConfig::default(),
            )?,
            None => PollingConfig::default(),
        };

        let attestation_base_url = match attestation_base_url {
            Some(url) => url,
            None => Url::parse(DEFAULT_ATTESTATION_BASE_URL)?,
        };

        let paylink_base_url = match config.paylink {
            Some(section) => section.base_url,
            None => Url::parse(DEFAULT_PAYLINK_BASE_URL)?,
        };

        Ok(Self {
            log_level: config.log_level.unwrap_or(LogLevel::Info),
            registry: ChainRegistry::new(config.chains, config.testnet),
            attestation_base_url,
            attestation_polling,
            receipt_polling,
            paylink_base_url,
            signer,
            locks: Arc::default(),
        })
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    pub fn resolve(&self, chain: &str) -> Result<ChainDescriptor, ConfigError> {
        Ok(self.registry.resolve(chain)?)
    }

    pub fn connector(&self) -> RpcConnector {
        RpcConnector::with_locks(self.signer.clone(), Arc::clone(&self.locks))
    }

    pub fn attestation_poller(&self) -> Result<AttestationPoller, ConfigError> {
        AttestationPoller::new(
            self.attestation_base_url.clone(),
            self.attestation_polling,
        )
        .map_err(ConfigError::AttestationClient)
    }

    pub fn orchestrator(&self) -> Result<BridgeOrchestrator<RpcConnector>, ConfigError> {
        Ok(BridgeOrchestrator::new(
            self.registry.clone(),
            self.connector(),
            self.attestation_poller()?,
            self.receipt_polling,
        ))
    }
}

fn polling(
    section: &'static str,
    interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
    defaults: PollingConfig,
) -> Result<PollingConfig, ConfigError> {
    let interval = interval_secs.map_or(defaults.interval, Duration::from_secs);
    let timeout = timeout_secs.map_or(defaults.timeout, Duration::from_secs);

    if interval.is_zero() {
        return Err(ConfigError::ZeroPollInterval { section });
    }

    Ok(PollingConfig::new(interval, timeout))
}

pub fn setup_tracing(log_level: &LogLevel) {
    let level: Level = log_level.into();
    let default_filter =
        format!("cctp_relay={level},relay_bridge={level},relay_evm={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
