//! Allow-listed testnet chains and their CCTP deployment.

use std::collections::BTreeMap;

use alloy::primitives::Address;
use relay_evm::{InvalidAddress, parse_address};
use serde::{Deserialize, Serialize};
use url::Url;

/// Static facts about a chain the relay is allowed to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KnownChain {
    slug: &'static str,
    network_id: u64,
    domain: u32,
    usdc: &'static str,
    token_messenger: &'static str,
    message_transmitter: &'static str,
}

const KNOWN_CHAINS: &[KnownChain] = &[
    KnownChain {
        slug: "base-sepolia",
        network_id: 84532,
        domain: 6,
        usdc: "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
        token_messenger: "0x8FE6B999Dc680CcFDD5Bf7EB0974218be2542DAA",
        message_transmitter: "0x8FE6B999Dc680CcFDD5Bf7EB0974218be2542DAA",
    },
    KnownChain {
        slug: "arbitrum-sepolia",
        network_id: 421_614,
        domain: 3,
        usdc: "0x75faf114eafb1BDbe2F0316DF893fd58CE46AA4d",
        token_messenger: "0x8FE6B999Dc680CcFDD5Bf7EB0974218be2542DAA",
        message_transmitter: "0x8FE6B999Dc680CcFDD5Bf7EB0974218be2542DAA",
    },
];

/// Per-chain settings as they appear in configuration.
///
/// Addresses stay raw strings until [`ChainRegistry::resolve`] so that a bad
/// value is reported against the chain that carries it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainSettings {
    pub rpc_url: Option<String>,
    pub usdc: Option<String>,
    pub token_messenger: Option<String>,
    pub message_transmitter: Option<String>,
}

/// Fully validated connection parameters for one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainDescriptor {
    pub chain: String,
    pub network_id: u64,
    pub domain: u32,
    pub rpc_url: Url,
    #[serde(serialize_with = "relay_evm::checksum::serialize")]
    pub usdc: Address,
    #[serde(serialize_with = "relay_evm::checksum::serialize")]
    pub token_messenger: Address,
    #[serde(serialize_with = "relay_evm::checksum::serialize")]
    pub message_transmitter: Address,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("testnet operation must be acknowledged with `testnet = true`")]
    TestnetNotAcknowledged,
    #[error("unsupported chain {chain:?}, expected one of {supported}")]
    UnknownChain { chain: String, supported: String },
    #[error("chain {chain} is not configured")]
    NotConfigured { chain: String },
    #[error("chain {chain} has no rpc_url")]
    MissingRpcUrl { chain: String },
    #[error("chain {chain} has an invalid rpc_url: {source}")]
    InvalidRpcUrl {
        chain: String,
        #[source]
        source: url::ParseError,
    },
    #[error("chain {chain} has an invalid {field}: {source}")]
    InvalidAddress {
        chain: String,
        field: &'static str,
        #[source]
        source: InvalidAddress,
    },
}

/// Lookup from chain identifier to [`ChainDescriptor`].
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    testnet: bool,
    settings: BTreeMap<String, ChainSettings>,
}

impl ChainRegistry {
    pub fn new(settings: BTreeMap<String, ChainSettings>, testnet: bool) -> Self {
        Self { testnet, settings }
    }

    /// Identifiers of every chain with a configuration section.
    pub fn chains(&self) -> impl Iterator<Item = &str> {
        self.settings.keys().map(String::as_str)
    }

    pub fn resolve(&self, chain: &str) -> Result<ChainDescriptor, RegistryError> {
        if !self.testnet {
            return Err(RegistryError::TestnetNotAcknowledged);
        }

        let known = KNOWN_CHAINS
            .iter()
            .find(|known| known.slug == chain)
            .ok_or_else(|| RegistryError::UnknownChain {
                chain: chain.to_string(),
                supported: supported_chains(),
            })?;

        let settings = self
            .settings
            .get(chain)
            .ok_or_else(|| RegistryError::NotConfigured {
                chain: chain.to_string(),
            })?;

        let raw_url = settings
            .rpc_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| RegistryError::MissingRpcUrl {
                chain: chain.to_string(),
            })?;

        let rpc_url = Url::parse(raw_url.trim()).map_err(|source| RegistryError::InvalidRpcUrl {
            chain: chain.to_string(),
            source,
        })?;

        let address = |field: &'static str, value: Option<&String>, default: &str| {
            let raw = value.map_or(default, String::as_str);
            parse_address(raw).map_err(|source| RegistryError::InvalidAddress {
                chain: chain.to_string(),
                field,
                source,
            })
        };

        Ok(ChainDescriptor {
            chain: known.slug.to_string(),
            network_id: known.network_id,
            domain: known.domain,
            rpc_url,
            usdc: address("usdc", settings.usdc.as_ref(), known.usdc)?,
            token_messenger: address(
                "token_messenger",
                settings.token_messenger.as_ref(),
                known.token_messenger,
            )?,
            message_transmitter: address(
                "message_transmitter",
                settings.message_transmitter.as_ref(),
                known.message_transmitter,
            )?,
        })
    }
}

fn supported_chains() -> String {
    KNOWN_CHAINS
        .iter()
        .map(|known| known.slug)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    fn settings(rpc_url: &str) -> ChainSettings {
        ChainSettings {
            rpc_url: Some(rpc_url.to_string()),
            ..ChainSettings::default()
        }
    }

    fn registry() -> ChainRegistry {
        ChainRegistry::new(
            BTreeMap::from([
                ("base-sepolia".to_string(), settings("https://sepolia.base.org")),
                (
                    "arbitrum-sepolia".to_string(),
                    settings("https://sepolia-rollup.arbitrum.io/rpc"),
                ),
            ]),
            true,
        )
    }

    #[test]
    fn resolves_known_chain_with_defaults() {
        let descriptor = registry().resolve("base-sepolia").unwrap();

        assert_eq!(descriptor.network_id, 84532);
        assert_eq!(descriptor.domain, 6);
        assert_eq!(
            descriptor.usdc,
            address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e")
        );
        assert_eq!(
            descriptor.token_messenger,
            address!("0x8FE6B999Dc680CcFDD5Bf7EB0974218be2542DAA")
        );
        assert_eq!(descriptor.rpc_url.as_str(), "https://sepolia.base.org/");
    }

    #[test]
    fn arbitrum_uses_domain_three() {
        let descriptor = registry().resolve("arbitrum-sepolia").unwrap();
        assert_eq!(descriptor.network_id, 421_614);
        assert_eq!(descriptor.domain, 3);
    }

    #[test]
    fn overrides_are_validated_and_canonicalized() {
        let mut chains = BTreeMap::new();
        chains.insert(
            "base-sepolia".to_string(),
            ChainSettings {
                rpc_url: Some("http://localhost:8545".to_string()),
                usdc: Some("0x1111111111111111111111111111111111111111".to_string()),
                ..ChainSettings::default()
            },
        );

        let descriptor = ChainRegistry::new(chains, true)
            .resolve("base-sepolia")
            .unwrap();

        assert_eq!(
            descriptor.usdc,
            address!("0x1111111111111111111111111111111111111111")
        );
    }

    #[test]
    fn rejects_unknown_chain() {
        let error = registry().resolve("ethereum").unwrap_err();
        assert!(matches!(error, RegistryError::UnknownChain { .. }), "{error:?}");
        assert!(error.to_string().contains("base-sepolia"));
    }

    #[test]
    fn rejects_unconfigured_chain() {
        let registry = ChainRegistry::new(BTreeMap::new(), true);
        assert!(matches!(
            registry.resolve("base-sepolia"),
            Err(RegistryError::NotConfigured { .. })
        ));
    }

    #[test]
    fn rejects_missing_or_bad_rpc_url() {
        let missing = ChainRegistry::new(
            BTreeMap::from([("base-sepolia".to_string(), ChainSettings::default())]),
            true,
        );
        assert!(matches!(
            missing.resolve("base-sepolia"),
            Err(RegistryError::MissingRpcUrl { .. })
        ));

        let bad = ChainRegistry::new(
            BTreeMap::from([("base-sepolia".to_string(), settings("not a url"))]),
            true,
        );
        assert!(matches!(
            bad.resolve("base-sepolia"),
            Err(RegistryError::InvalidRpcUrl { .. })
        ));
    }

    #[test]
    fn rejects_invalid_address_override() {
        let registry = ChainRegistry::new(
            BTreeMap::from([(
                "base-sepolia".to_string(),
                ChainSettings {
                    rpc_url: Some("https://sepolia.base.org".to_string()),
                    token_messenger: Some("0x1234".to_string()),
                    ..ChainSettings::default()
                },
            )]),
            true,
        );

        let error = registry.resolve("base-sepolia").unwrap_err();
        assert!(
            matches!(
                error,
                RegistryError::InvalidAddress {
                    field: "token_messenger",
                    ..
                }
            ),
            "{error:?}"
        );
    }

    #[test]
    fn requires_testnet_acknowledgement() {
        let registry = ChainRegistry::new(
            BTreeMap::from([("base-sepolia".to_string(), settings("https://sepolia.base.org"))]),
            false,
        );

        assert!(matches!(
            registry.resolve("base-sepolia"),
            Err(RegistryError::TestnetNotAcknowledged)
        ));
    }

    #[test]
    fn lists_configured_chains() {
        let registry = registry();
        let chains: Vec<_> = registry.chains().collect();
        assert_eq!(chains, vec!["arbitrum-sepolia", "base-sepolia"]);
    }
}
