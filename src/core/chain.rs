//! Chain selection

use crate::error::{Error, Result};
use bitcoin::{Network, NetworkKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain { #[default] Bitcoin, Testnet, Signet, Regtest }

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self { Chain::Bitcoin => "bitcoin", Chain::Testnet => "testnet", Chain::Signet => "signet", Chain::Regtest => "regtest" }
    }

    pub fn network(&self) -> Network {
        match self { Chain::Bitcoin => Network::Bitcoin, Chain::Testnet => Network::Testnet, Chain::Signet => Network::Signet, Chain::Regtest => Network::Regtest }
    }

    pub fn from_network(network: Network) -> Option<Self> {
        match network {
            Network::Bitcoin => Some(Chain::Bitcoin),
            Network::Testnet => Some(Chain::Testnet),
            Network::Signet => Some(Chain::Signet),
            Network::Regtest => Some(Chain::Regtest),
            _ => None,
        }
    }

    /// Version-byte family used when serializing extended keys.
    pub fn kind(&self) -> NetworkKind { self.network().into() }

    pub fn is_testnet(&self) -> bool { self.kind() == NetworkKind::Test }

    /// BIP44 coin type: 0 on mainnet, 1 on every test chain.
    pub fn coin_type(&self) -> u32 { if self.is_testnet() { 1 } else { 0 } }

    pub fn default_electrum(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "ssl://electrum.blockstream.info:50002",
            Chain::Testnet => "ssl://electrum.blockstream.info:60002",
            Chain::Signet => "ssl://mempool.space:60602",
            Chain::Regtest => "tcp://127.0.0.1:50001",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Chain {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bitcoin" | "mainnet" => Ok(Chain::Bitcoin),
            "testnet" | "testnet3" => Ok(Chain::Testnet),
            "signet" => Ok(Chain::Signet),
            "regtest" => Ok(Chain::Regtest),
            other => Err(Error::ChainMismatch(format!("unknown chain `{}`", other))),
        }
    }
}
