//! Stable identifiers: tagged SHA-256 digests shown as bech32m.

use crate::bech32::{self, Bech32Error, Variant};
use crate::core::hrp;
use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

pub const CONTRACT_TAG: &str = "strongbox:contract";
pub const ASSET_TAG: &str = "strongbox:asset";

/// `sha256(sha256(tag) || sha256(tag) || data)`
pub fn tagged_hash(tag: &str, data: &[u8]) -> [u8; 32] {
    let tag_hash = Sha256::digest(tag.as_bytes());
    let mut engine = Sha256::new();
    engine.update(tag_hash);
    engine.update(tag_hash);
    engine.update(data);
    engine.finalize().into()
}

fn decode_id(s: &str, prefix: &str) -> Result<[u8; 32]> {
    let decoded = bech32::decode(s)?;
    if decoded.hrp != prefix {
        return Err(Bech32Error::Hrp(format!("expected `{}`, got `{}`", prefix, decoded.hrp)).into());
    }
    decoded
        .payload
        .try_into()
        .map_err(|p: Vec<u8>| Error::from(Bech32Error::Payload(format!("identifier must be 32 bytes, got {}", p.len()))))
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContractId([u8; 32]);

impl ContractId {
    pub fn commit(data: &[u8]) -> Self { Self(tagged_hash(CONTRACT_TAG, data)) }
    pub fn as_bytes(&self) -> &[u8; 32] { &self.0 }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = bech32::encode(hrp::lnpbp::ID, &self.0, Variant::Bech32m).map_err(|_| fmt::Error)?;
        f.write_str(&s)
    }
}

impl fmt::Debug for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ContractId({})", self) }
}

impl FromStr for ContractId {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> { decode_id(s, hrp::lnpbp::ID).map(Self) }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetId([u8; 32]);

impl AssetId {
    pub fn commit(data: &[u8]) -> Self { Self(tagged_hash(ASSET_TAG, data)) }
    pub fn as_bytes(&self) -> &[u8; 32] { &self.0 }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = bech32::encode(hrp::rgb::CONTRACT_ID, &self.0, Variant::Bech32m).map_err(|_| fmt::Error)?;
        f.write_str(&s)
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "AssetId({})", self) }
}

impl FromStr for AssetId {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> { decode_id(s, hrp::rgb::CONTRACT_ID).map(Self) }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(ContractId);
string_serde!(AssetId);
