//! Bech32 / bech32m codec
//!
//! Encodes arbitrary byte payloads under a human-readable prefix and decodes
//! them back, reporting which checksum constant validated and what kind of
//! payload the prefix announces.
//!
//! ```text
//! "genesis1qqsz...xyz"
//!  └──┬──┘ │└──┬──┘└┬┘
//!    hrp  sep data  checksum (bech32 or bech32m constant)
//! ```
//!
//! | Status | Meaning |
//! |--------|---------|
//! | 0 | ok |
//! | 1 | malformed human-readable part |
//! | 2 | checksum mismatch (neither or both variants validate) |
//! | 3 | invalid character, mixed case |
//! | 4 | payload length/shape |
//! | 5 | unsupported category |
//! | 6 | internal |
//! | 7 | null input |

use crate::core::hrp;
use ::bech32::primitives::decode::{CheckedHrpstring, UncheckedHrpstring, UncheckedHrpstringError};
use ::bech32::{Bech32, Bech32m, Hrp};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Longest string either checksum is defined for.
pub const MAX_LENGTH: usize = 1023;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Bech32Error {
    #[error("bech32 value must not be null")]
    Null,
    #[error("invalid human-readable part: {0}")]
    Hrp(String),
    #[error("invalid checksum: {0}")]
    Checksum(String),
    #[error("invalid encoding: {0}")]
    Encoding(String),
    #[error("payload format does not match bech32 type: {0}")]
    Payload(String),
    #[error("this kind of bech32 is not supported: {0}")]
    Unsupported(String),
    #[error("bech32 internal failure: {0}")]
    Internal(String),
}

impl Bech32Error {
    /// Wire-visible status code.
    pub fn status(&self) -> u8 {
        match self {
            Bech32Error::Hrp(_) => 1,
            Bech32Error::Checksum(_) => 2,
            Bech32Error::Encoding(_) => 3,
            Bech32Error::Payload(_) => 4,
            Bech32Error::Unsupported(_) => 5,
            Bech32Error::Internal(_) => 6,
            Bech32Error::Null => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Original constant (BIP173).
    Bech32,
    /// Alternate constant (BIP350).
    Bech32m,
}

/// Payload category. Numeric tags are wire-visible and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Unknown,
    Url,
    BcAddress,
    LnBolt11,
    LnpbpId,
    LnpbpData,
    LnpbpZData,
    LnpbpInvoice,
    RgbSchemaId,
    RgbContractId,
    RgbSchema,
    RgbGenesis,
    RgbConsignment,
    Rgb20Asset,
}

impl Category {
    pub fn tag(&self) -> u16 {
        match self {
            Category::Unknown => 0,
            Category::Url => 1,
            Category::BcAddress => 0x0100,
            Category::LnBolt11 => 0x0101,
            Category::LnpbpId => 0x0200,
            Category::LnpbpData => 0x0201,
            Category::LnpbpZData => 0x0202,
            Category::LnpbpInvoice => 0x0210,
            Category::RgbSchemaId => 0x0300,
            Category::RgbContractId => 0x0301,
            Category::RgbSchema => 0x0310,
            Category::RgbGenesis => 0x0311,
            // Consignments and asset descriptors share a tag.
            Category::RgbConsignment | Category::Rgb20Asset => 0x0320,
        }
    }

    /// Category announced by a (lowercase) prefix.
    pub fn from_hrp(prefix: &str) -> Self {
        if hrp::address::ALL.contains(&prefix) {
            return Category::BcAddress;
        }
        if hrp::lightning::ALL.iter().any(|p| prefix.starts_with(p)) {
            return Category::LnBolt11;
        }
        match prefix {
            hrp::lnpbp::URL => Category::Url,
            hrp::lnpbp::ID => Category::LnpbpId,
            hrp::lnpbp::DATA => Category::LnpbpData,
            hrp::lnpbp::ZDATA => Category::LnpbpZData,
            hrp::lnpbp::INVOICE => Category::LnpbpInvoice,
            hrp::rgb::SCHEMA_ID => Category::RgbSchemaId,
            hrp::rgb::CONTRACT_ID => Category::RgbContractId,
            hrp::rgb::SCHEMA => Category::RgbSchema,
            hrp::rgb::GENESIS => Category::RgbGenesis,
            hrp::rgb::CONSIGNMENT => Category::RgbConsignment,
            _ => Category::Unknown,
        }
    }
}

/// Result of a successful decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub hrp: String,
    pub payload: Vec<u8>,
    pub variant: Variant,
    pub category: Category,
}

pub fn encode(prefix: &str, payload: &[u8], variant: Variant) -> Result<String, Bech32Error> {
    let hrp = Hrp::parse(prefix).map_err(|e| Bech32Error::Hrp(e.to_string()))?;
    let encoded = match variant {
        Variant::Bech32 => ::bech32::encode::<Bech32>(hrp, payload),
        Variant::Bech32m => ::bech32::encode::<Bech32m>(hrp, payload),
    };
    encoded.map_err(|e| Bech32Error::Payload(e.to_string()))
}

pub fn decode(s: &str) -> Result<Decoded, Bech32Error> {
    if s.len() > MAX_LENGTH {
        return Err(Bech32Error::Payload(format!("{} characters exceeds {}", s.len(), MAX_LENGTH)));
    }
    if s.chars().any(|c| c.is_ascii_lowercase()) && s.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(Bech32Error::Encoding("mixed case".into()));
    }
    match s.rfind('1') {
        None => return Err(Bech32Error::Hrp("missing separator".into())),
        Some(0) => return Err(Bech32Error::Hrp("empty human-readable part".into())),
        Some(_) => {}
    }

    let unchecked = UncheckedHrpstring::new(s).map_err(|e| match e {
        UncheckedHrpstringError::Hrp(e) => Bech32Error::Hrp(e.to_string()),
        other => Bech32Error::Encoding(other.to_string()),
    })?;
    let variant = match (unchecked.has_valid_checksum::<Bech32>(), unchecked.has_valid_checksum::<Bech32m>()) {
        (true, false) => Variant::Bech32,
        (false, true) => Variant::Bech32m,
        (false, false) => return Err(Bech32Error::Checksum("no checksum variant validates".into())),
        (true, true) => return Err(Bech32Error::Checksum("ambiguous checksum variant".into())),
    };

    let checked = match variant {
        Variant::Bech32 => CheckedHrpstring::new::<Bech32>(s),
        Variant::Bech32m => CheckedHrpstring::new::<Bech32m>(s),
    }
    .map_err(|e| Bech32Error::Internal(e.to_string()))?;

    let hrp = checked.hrp().to_lowercase();
    let payload: Vec<u8> = checked.byte_iter().collect();
    tracing::trace!(hrp = %hrp, len = payload.len(), ?variant, "bech32 decoded");
    Ok(Decoded { category: Category::from_hrp(&hrp), hrp, payload, variant })
}

/// Decoded value plus a structured description of what it carries.
#[derive(Debug, Clone, Serialize)]
pub struct Bech32Info {
    pub category: Category,
    pub tag: u16,
    pub bech32m: bool,
    pub hrp: String,
    pub details: Value,
}

impl Bech32Info {
    fn new(decoded: &Decoded, category: Category, details: Value) -> Self {
        Self { category, tag: category.tag(), bech32m: decoded.variant == Variant::Bech32m, hrp: decoded.hrp.clone(), details }
    }
}

impl fmt::Display for Bech32Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:#06x}) hrp={}", self.category, self.tag, self.hrp)
    }
}

/// Decode and describe any identifier the wallet understands.
pub fn info(s: &str) -> Result<Bech32Info, Bech32Error> {
    let decoded = decode(s)?;
    match decoded.category {
        Category::BcAddress => {
            let unchecked = bitcoin::Address::from_str(s).map_err(|e| Bech32Error::Payload(e.to_string()))?;
            let network = [bitcoin::Network::Bitcoin, bitcoin::Network::Testnet, bitcoin::Network::Regtest]
                .into_iter()
                .find(|n| unchecked.is_valid_for_network(*n))
                .map(|n| n.to_string());
            let address = unchecked.assume_checked();
            let details = json!({
                "address": address.to_string(),
                "network": network,
                "type": address.address_type().map(|t| t.to_string()),
                "script_pubkey": hex::encode(address.script_pubkey().as_bytes()),
            });
            Ok(Bech32Info::new(&decoded, Category::BcAddress, details))
        }
        Category::RgbGenesis => match crate::model::Genesis::from_payload(&decoded.payload) {
            Ok(genesis) => {
                let asset = crate::model::Asset::from_genesis(genesis, s, &decoded.payload);
                let details = serde_json::to_value(&asset).map_err(|e| Bech32Error::Internal(e.to_string()))?;
                Ok(Bech32Info::new(&decoded, Category::Rgb20Asset, details))
            }
            Err(_) => Ok(Bech32Info::new(&decoded, Category::RgbGenesis, json!({ "payload": hex::encode(&decoded.payload) }))),
        },
        Category::LnpbpInvoice => {
            let invoice = crate::model::Invoice::from_payload(&decoded.payload)
                .map_err(|e| Bech32Error::Payload(e.to_string()))?;
            let details = serde_json::to_value(&invoice).map_err(|e| Bech32Error::Internal(e.to_string()))?;
            Ok(Bech32Info::new(&decoded, Category::LnpbpInvoice, details))
        }
        Category::LnpbpId | Category::RgbContractId | Category::RgbSchemaId => {
            if decoded.payload.len() != 32 {
                return Err(Bech32Error::Payload(format!("identifier must be 32 bytes, got {}", decoded.payload.len())));
            }
            Ok(Bech32Info::new(&decoded, decoded.category, json!({ "id": hex::encode(&decoded.payload) })))
        }
        Category::LnpbpData => Ok(Bech32Info::new(&decoded, Category::LnpbpData, json!({ "data": hex::encode(&decoded.payload) }))),
        Category::Url => {
            let url = String::from_utf8(decoded.payload.clone()).map_err(|e| Bech32Error::Payload(e.to_string()))?;
            Ok(Bech32Info::new(&decoded, Category::Url, json!({ "url": url })))
        }
        Category::LnBolt11
        | Category::LnpbpZData
        | Category::RgbSchema
        | Category::RgbConsignment
        | Category::Rgb20Asset
        | Category::Unknown => Err(Bech32Error::Unsupported(format!("prefix `{}`", decoded.hrp))),
    }
}
