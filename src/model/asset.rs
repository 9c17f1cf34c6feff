//! Imported assets
//!
//! Assets are opaque to the wallet: a genesis string carries a small JSON
//! descriptor, and the asset id commits to its exact bytes.

use super::ids::AssetId;
use crate::bech32::{self, Category, Variant};
use crate::core::{hrp, Chain};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    pub ticker: String,
    pub name: String,
    pub precision: u8,
    pub supply: u64,
    pub chain: Chain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Genesis {
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| Error::from(bech32::Bech32Error::Payload(e.to_string())))
    }

    pub fn to_bech32(&self) -> Result<String> {
        let payload = serde_json::to_vec(self).map_err(|e| Error::Internal(e.to_string()))?;
        Ok(bech32::encode(hrp::rgb::GENESIS, &payload, Variant::Bech32m)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub ticker: String,
    pub name: String,
    pub precision: u8,
    pub supply: u64,
    pub chain: Chain,
    pub genesis: String,
    pub imported_at: DateTime<Utc>,
}

impl Asset {
    pub fn from_genesis(genesis: Genesis, encoded: &str, payload: &[u8]) -> Self {
        Self {
            id: AssetId::commit(payload),
            ticker: genesis.ticker,
            name: genesis.name,
            precision: genesis.precision,
            supply: genesis.supply,
            chain: genesis.chain,
            genesis: encoded.to_ascii_lowercase(),
            imported_at: Utc::now(),
        }
    }

    pub fn parse(encoded: &str) -> Result<Self> {
        let decoded = bech32::decode(encoded)?;
        if decoded.category != Category::RgbGenesis {
            return Err(bech32::Bech32Error::Unsupported(format!("`{}` is not a genesis", decoded.hrp)).into());
        }
        let genesis = Genesis::from_payload(&decoded.payload)?;
        Ok(Self::from_genesis(genesis, encoded, &decoded.payload))
    }
}
