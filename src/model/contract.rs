//! Contracts: named wallet accounts bound to a spending policy

use super::address::AddressRecord;
use super::ids::ContractId;
use super::invoice::InvoiceRecord;
use super::operation::{Operation, Utxo};
use crate::core::Chain;
use crate::error::{Error, Result};
use crate::keys::Keychain;
use bitcoin::bip32::KeySource;
use bitcoin::key::{CompressedPublicKey, XOnlyPublicKey};
use bitcoin::opcodes::all::OP_CHECKMULTISIG;
use bitcoin::script::Builder;
use bitcoin::secp256k1::{PublicKey, Secp256k1, Verification};
use bitcoin::hashes::Hash;
use bitcoin::{Address, ScriptBuf, ScriptHash, WScriptHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Outer script category of a contract's addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OuterCategory {
    Bare,
    Hashed,
    SegWit,
    Taproot,
}

impl OuterCategory {
    pub fn as_str(&self) -> &'static str {
        match self { OuterCategory::Bare => "bare", OuterCategory::Hashed => "hashed", OuterCategory::SegWit => "segwit", OuterCategory::Taproot => "taproot" }
    }
}

impl FromStr for OuterCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bare" => Ok(OuterCategory::Bare),
            "hashed" => Ok(OuterCategory::Hashed),
            "segwit" => Ok(OuterCategory::SegWit),
            "taproot" => Ok(OuterCategory::Taproot),
            other => Err(Error::Unsupported(format!("descriptor category `{}`", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    Current,
    Saving,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Policy {
    SingleSig { category: OuterCategory, keychain: Keychain },
    MultiSig { category: OuterCategory, threshold: u8, keychains: Vec<Keychain> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    P2pkh,
    P2shP2wpkh,
    P2wpkh,
    P2tr,
    BareMulti,
    P2shMulti,
    P2wshMulti,
    P2shP2wshMulti,
}

impl ScriptKind {
    pub fn is_witness(&self) -> bool { !matches!(self, ScriptKind::P2pkh | ScriptKind::BareMulti | ScriptKind::P2shMulti) }
}

/// Everything needed to receive to, and later spend from, one derivation index.
#[derive(Debug, Clone)]
pub struct DerivedScript {
    pub kind: ScriptKind,
    pub script_pubkey: ScriptBuf,
    pub redeem_script: Option<ScriptBuf>,
    pub witness_script: Option<ScriptBuf>,
    pub keys: Vec<(PublicKey, KeySource)>,
    pub internal_key: Option<XOnlyPublicKey>,
}

impl DerivedScript {
    pub fn address(&self, chain: Chain) -> Result<Address> {
        Address::from_script(&self.script_pubkey, chain.network())
            .map_err(|_| Error::Unsupported(format!("{:?} outputs have no address form", self.kind)))
    }
}

impl Policy {
    pub fn policy_type(&self) -> PolicyType {
        match self { Policy::SingleSig { .. } => PolicyType::Current, Policy::MultiSig { .. } => PolicyType::Saving }
    }

    pub fn category(&self) -> OuterCategory {
        match self { Policy::SingleSig { category, .. } | Policy::MultiSig { category, .. } => *category }
    }

    pub fn keychains(&self) -> Vec<&Keychain> {
        match self { Policy::SingleSig { keychain, .. } => vec![keychain], Policy::MultiSig { keychains, .. } => keychains.iter().collect() }
    }

    /// Cosigner order does not change the `sortedmulti` scripts, so it must
    /// not change the contract id either.
    pub fn canonical(self) -> Self {
        match self {
            Policy::MultiSig { category, threshold, mut keychains } => {
                keychains.sort_by_cached_key(|k| k.to_string());
                Policy::MultiSig { category, threshold, keychains }
            }
            single => single,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Policy::MultiSig { category, threshold, keychains } = self {
            if *category == OuterCategory::Taproot {
                return Err(Error::Unsupported("taproot multi-signature contracts".into()));
            }
            if *threshold == 0 || usize::from(*threshold) > keychains.len() || keychains.len() > 15 {
                return Err(Error::InvalidState(format!("{}-of-{} multi-signature policy", threshold, keychains.len())));
            }
        }
        Ok(())
    }

    pub fn script_kind(&self, legacy: bool) -> Result<ScriptKind> {
        use OuterCategory::*;
        let kind = match (self, self.category(), legacy) {
            (_, Taproot, true) => return Err(Error::Unsupported("legacy form of taproot addresses".into())),
            (Policy::SingleSig { .. }, Bare, _) => ScriptKind::P2pkh,
            (Policy::SingleSig { .. }, Hashed, _) | (Policy::SingleSig { .. }, SegWit, true) => ScriptKind::P2shP2wpkh,
            (Policy::SingleSig { .. }, SegWit, false) => ScriptKind::P2wpkh,
            (Policy::SingleSig { .. }, Taproot, false) => ScriptKind::P2tr,
            (Policy::MultiSig { .. }, Bare, _) => ScriptKind::BareMulti,
            (Policy::MultiSig { .. }, Hashed, _) => ScriptKind::P2shMulti,
            (Policy::MultiSig { .. }, SegWit, false) => ScriptKind::P2wshMulti,
            (Policy::MultiSig { .. }, SegWit, true) => ScriptKind::P2shP2wshMulti,
            (Policy::MultiSig { .. }, Taproot, false) => return Err(Error::Unsupported("taproot multi-signature contracts".into())),
        };
        Ok(kind)
    }

    pub fn derive<C: Verification>(&self, secp: &Secp256k1<C>, index: u32, legacy: bool) -> Result<DerivedScript> {
        let kind = self.script_kind(legacy)?;
        let mut keys = self
            .keychains()
            .into_iter()
            .map(|chain| Ok((chain.derive_pubkey(secp, index)?, chain.key_source(index)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut derived = DerivedScript { kind, script_pubkey: ScriptBuf::new(), redeem_script: None, witness_script: None, keys: vec![], internal_key: None };
        match kind {
            ScriptKind::P2pkh => derived.script_pubkey = ScriptBuf::new_p2pkh(&CompressedPublicKey(keys[0].0).pubkey_hash()),
            ScriptKind::P2wpkh => derived.script_pubkey = ScriptBuf::new_p2wpkh(&CompressedPublicKey(keys[0].0).wpubkey_hash()),
            ScriptKind::P2shP2wpkh => {
                let inner = ScriptBuf::new_p2wpkh(&CompressedPublicKey(keys[0].0).wpubkey_hash());
                derived.script_pubkey = ScriptBuf::new_p2sh(&ScriptHash::hash(inner.as_bytes()));
                derived.redeem_script = Some(inner);
            }
            ScriptKind::P2tr => {
                let (internal, _) = keys[0].0.x_only_public_key();
                derived.script_pubkey = ScriptBuf::new_p2tr(secp, internal, None);
                derived.internal_key = Some(internal);
            }
            ScriptKind::BareMulti | ScriptKind::P2shMulti | ScriptKind::P2wshMulti | ScriptKind::P2shP2wshMulti => {
                keys.sort_by(|a, b| a.0.serialize().cmp(&b.0.serialize()));
                let multi = self.multisig_script(&keys)?;
                match kind {
                    ScriptKind::BareMulti => derived.script_pubkey = multi,
                    ScriptKind::P2shMulti => {
                        derived.script_pubkey = ScriptBuf::new_p2sh(&ScriptHash::hash(multi.as_bytes()));
                        derived.redeem_script = Some(multi);
                    }
                    ScriptKind::P2wshMulti => {
                        derived.script_pubkey = ScriptBuf::new_p2wsh(&WScriptHash::hash(multi.as_bytes()));
                        derived.witness_script = Some(multi);
                    }
                    _ => {
                        let inner = ScriptBuf::new_p2wsh(&WScriptHash::hash(multi.as_bytes()));
                        derived.script_pubkey = ScriptBuf::new_p2sh(&ScriptHash::hash(inner.as_bytes()));
                        derived.redeem_script = Some(inner);
                        derived.witness_script = Some(multi);
                    }
                }
            }
        }
        derived.keys = keys;
        Ok(derived)
    }

    fn multisig_script(&self, keys: &[(PublicKey, KeySource)]) -> Result<ScriptBuf> {
        let threshold = match self {
            Policy::MultiSig { threshold, .. } => *threshold,
            Policy::SingleSig { .. } => return Err(Error::Internal("multisig script for single-sig policy".into())),
        };
        let mut builder = Builder::new().push_int(i64::from(threshold));
        for (key, _) in keys {
            builder = builder.push_key(&bitcoin::PublicKey::new(*key));
        }
        Ok(builder.push_int(keys.len() as i64).push_opcode(OP_CHECKMULTISIG).into_script())
    }
}

/// Descriptor-like canonical form; the contract id commits to it.
impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::SingleSig { category, keychain } => match category {
                OuterCategory::Bare => write!(f, "pkh({})", keychain),
                OuterCategory::Hashed => write!(f, "sh(wpkh({}))", keychain),
                OuterCategory::SegWit => write!(f, "wpkh({})", keychain),
                OuterCategory::Taproot => write!(f, "tr({})", keychain),
            },
            Policy::MultiSig { category, threshold, keychains } => {
                let keys: Vec<String> = keychains.iter().map(|k| k.to_string()).collect();
                let multi = format!("sortedmulti({},{})", threshold, keys.join(","));
                match category {
                    OuterCategory::Bare => write!(f, "{}", multi),
                    OuterCategory::Hashed => write!(f, "sh({})", multi),
                    OuterCategory::SegWit => write!(f, "wsh({})", multi),
                    OuterCategory::Taproot => write!(f, "tr({})", multi),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub confirmed: u64,
    pub unconfirmed: u64,
    /// Native coin under `btc`; imported assets are opaque and listed at zero.
    pub by_asset: BTreeMap<String, u64>,
    pub unspent: Vec<Utxo>,
}

pub const NATIVE_ASSET: &str = "btc";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub name: String,
    pub chain: Chain,
    pub policy: Policy,
    pub lookup_depth: u8,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub addresses: BTreeMap<u32, AddressRecord>,
    #[serde(default)]
    pub invoices: Vec<InvoiceRecord>,
    #[serde(default)]
    pub unspent: Vec<Utxo>,
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

impl Contract {
    pub fn new(name: impl Into<String>, chain: Chain, policy: Policy, lookup_depth: u8) -> Result<Self> {
        let policy = policy.canonical();
        policy.validate()?;
        for keychain in policy.keychains() {
            if keychain.network_kind() != chain.kind() {
                return Err(Error::ChainMismatch(format!("key chain {} is not for {}", keychain, chain)));
            }
        }
        Ok(Self {
            id: Self::id_for(chain, &policy),
            name: name.into(),
            chain,
            policy,
            lookup_depth,
            created_at: Utc::now(),
            addresses: BTreeMap::new(),
            invoices: Vec::new(),
            unspent: Vec::new(),
            operations: Vec::new(),
            last_sync: None,
        })
    }

    pub fn id_for(chain: Chain, policy: &Policy) -> ContractId {
        ContractId::commit(format!("{}:{}", chain, policy).as_bytes())
    }

    /// Indexes are handed out strictly increasing, never reused.
    pub fn next_index(&self) -> u32 { self.addresses.keys().next_back().map(|i| i + 1).unwrap_or(0) }

    pub fn highest_used(&self) -> Option<u32> { self.addresses.values().filter(|a| a.used).map(|a| a.index).max() }

    pub fn derive<C: Verification>(&self, secp: &Secp256k1<C>, index: u32, legacy: bool) -> Result<DerivedScript> {
        self.policy.derive(secp, index, legacy)
    }

    pub fn allocate<C: Verification>(&mut self, secp: &Secp256k1<C>, mark_used: bool, legacy: bool) -> Result<AddressRecord> {
        let index = self.next_index();
        let address = self.derive(secp, index, legacy)?.address(self.chain)?;
        let record = AddressRecord::new(index, address.to_string(), legacy, mark_used);
        self.addresses.insert(index, record.clone());
        tracing::debug!(contract = %self.id, index, used = mark_used, "address allocated");
        Ok(record)
    }

    pub fn has_references(&self) -> bool {
        !self.invoices.is_empty() || !self.unspent.is_empty() || self.addresses.values().any(|a| a.used)
    }

    pub fn balance(&self) -> Balance {
        let confirmed = self.unspent.iter().filter(|u| u.height.is_some()).map(|u| u.value).sum();
        let unconfirmed = self.unspent.iter().filter(|u| u.height.is_none()).map(|u| u.value).sum();
        let mut by_asset = BTreeMap::new();
        by_asset.insert(NATIVE_ASSET.to_string(), confirmed + unconfirmed);
        Balance { confirmed, unconfirmed, by_asset, unspent: self.unspent.clone() }
    }

    pub fn invoice_mut(&mut self, encoded: &str) -> Result<&mut InvoiceRecord> {
        self.invoices
            .iter_mut()
            .find(|i| i.encoded == encoded)
            .ok_or_else(|| Error::not_found("invoice", encoded))
    }

    pub fn summary(&self) -> ContractSummary {
        ContractSummary {
            id: self.id,
            name: self.name.clone(),
            chain: self.chain,
            policy_type: self.policy.policy_type(),
            category: self.policy.category(),
            descriptor: self.policy.to_string(),
            lookup_depth: self.lookup_depth,
            created_at: self.created_at,
            addresses: self.addresses.len(),
            invoices: self.invoices.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractSummary {
    pub id: ContractId,
    pub name: String,
    pub chain: Chain,
    pub policy_type: PolicyType,
    pub category: OuterCategory,
    pub descriptor: String,
    pub lookup_depth: u8,
    pub created_at: DateTime<Utc>,
    pub addresses: usize,
    pub invoices: usize,
}
