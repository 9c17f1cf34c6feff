//! Account key chains
//!
//! A contract is bound to public key chains of the form
//! `[73c5da0a/84'/0'/0']xpub6.../0/*`: an optional origin (master fingerprint
//! and hardened account path), the account xpub, and an unhardened terminal
//! path under which address `i` is the key at `terminal/i`.

use super::derive::{derive_xpub, parse_xpriv};
use super::path::KeyPath;
use super::with_wipe;
use crate::error::{Error, Result};
use bitcoin::bip32::{ChildNumber, Fingerprint, KeySource, Xpub};
use bitcoin::secp256k1::{PublicKey, Secp256k1, Verification};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOrigin {
    pub fingerprint: Fingerprint,
    pub path: KeyPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keychain {
    pub origin: Option<KeyOrigin>,
    pub xpub: Xpub,
    pub terminal: Vec<u32>,
}

impl Keychain {
    pub fn new(origin: Option<KeyOrigin>, xpub: Xpub, terminal: Vec<u32>) -> Self { Self { origin, xpub, terminal } }

    fn terminal_path(&self, index: u32) -> Result<KeyPath> {
        let mut steps = self
            .terminal
            .iter()
            .map(|i| ChildNumber::from_normal_idx(*i))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        steps.push(ChildNumber::from_normal_idx(index)?);
        Ok(KeyPath::new(steps))
    }

    pub fn derive_pubkey<C: Verification>(&self, secp: &Secp256k1<C>, index: u32) -> Result<PublicKey> {
        Ok(derive_xpub(secp, &self.xpub, &self.terminal_path(index)?)?.public_key)
    }

    /// Fingerprint and full path of the key at `index`, as recorded in PSBTs.
    pub fn key_source(&self, index: u32) -> Result<KeySource> {
        let terminal = self.terminal_path(index)?;
        Ok(match &self.origin {
            Some(origin) => (origin.fingerprint, origin.path.extend(&terminal).to_derivation_path()),
            None => (self.xpub.fingerprint(), terminal.to_derivation_path()),
        })
    }

    pub fn network_kind(&self) -> bitcoin::NetworkKind { self.xpub.network }
}

impl fmt::Display for Keychain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(origin) = &self.origin {
            let path = origin.path.to_string();
            write!(f, "[{}{}]", origin.fingerprint, path.strip_prefix('m').unwrap_or(&path))?;
        }
        write!(f, "{}", self.xpub)?;
        for index in &self.terminal {
            write!(f, "/{}", index)?;
        }
        f.write_str("/*")
    }
}

impl FromStr for Keychain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (origin, rest) = match s.strip_prefix('[') {
            Some(inner) => {
                let (origin, rest) = inner
                    .split_once(']')
                    .ok_or_else(|| Error::InvalidKey("unterminated key origin".into()))?;
                let (fp, path) = origin.split_once('/').unwrap_or((origin, ""));
                let fingerprint = Fingerprint::from_str(fp)
                    .map_err(|e| Error::InvalidKey(format!("origin fingerprint `{}`: {}", fp, e)))?;
                (Some(KeyOrigin { fingerprint, path: KeyPath::from_str(path)? }), rest)
            }
            None => (None, s),
        };

        let rest = rest.strip_suffix("/*").unwrap_or(rest);
        let (xpub, terminal) = rest.split_once('/').unwrap_or((rest, ""));
        let xpub = Xpub::from_str(xpub)?;
        let terminal = KeyPath::from_str(terminal)?.unhardened_indexes()?;
        Ok(Self { origin, xpub, terminal })
    }
}

impl Serialize for Keychain {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Keychain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Keychain::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Derive the hardened account part privately and publish it as a key chain.
///
/// `account` is the path from `master` (e.g. `m/84'/1'/0'`), `terminal` the
/// unhardened suffix addresses hang from (e.g. `0`).
pub fn keychain_create(master: &mut String, account: &str, terminal: &str, wipe: bool) -> Result<Keychain> {
    with_wipe(&mut [master], wipe, |secrets| {
        let secp = Secp256k1::new();
        let account = KeyPath::from_str(account)?;
        let terminal = KeyPath::from_str(terminal)?.unhardened_indexes()?;
        let master = parse_xpriv(secrets[0])?;
        let xpub = master.derive(&secp, &account)?.to_xpub(&secp);
        let origin = KeyOrigin { fingerprint: master.fingerprint(&secp), path: account };
        Ok(Keychain { origin: Some(origin), xpub, terminal })
    })
}
