//! HD key derivation engine (BIP32)
//!
//! Hardened steps need the parent private key; public-only keys can follow
//! unhardened steps only. The hardened check runs before any derivation work,
//! so a rejected path never produces a partial result.

use super::path::KeyPath;
use super::with_wipe;
use crate::error::{Error, Result};
use bitcoin::bip32::{Fingerprint, Xpriv, Xpub};
use bitcoin::secp256k1::{self, Secp256k1, Signing};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Extended private key whose secret is erased on drop.
pub struct ExtendedPrivKey(Xpriv);

impl ExtendedPrivKey {
    pub(crate) fn new(xpriv: Xpriv) -> Self { Self(xpriv) }

    pub fn xpriv(&self) -> &Xpriv { &self.0 }

    pub fn to_xpub<C: Signing>(&self, secp: &Secp256k1<C>) -> Xpub { Xpub::from_priv(secp, &self.0) }

    pub fn fingerprint<C: Signing>(&self, secp: &Secp256k1<C>) -> Fingerprint { self.0.fingerprint(secp) }

    pub fn derive<C: Signing>(&self, secp: &Secp256k1<C>, path: &KeyPath) -> Result<ExtendedPrivKey> {
        Ok(Self(self.0.derive_priv(secp, &path.to_derivation_path())?))
    }

    /// Base58 serialization, wiped when dropped.
    pub fn to_secret_string(&self) -> Zeroizing<String> { Zeroizing::new(self.0.to_string()) }
}

impl Drop for ExtendedPrivKey {
    fn drop(&mut self) { self.0.private_key.non_secure_erase(); }
}

impl fmt::Debug for ExtendedPrivKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedPrivKey")
            .field("network", &self.0.network)
            .field("depth", &self.0.depth)
            .field("child", &self.0.child_number)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug)]
pub enum ExtendedKey {
    Private(ExtendedPrivKey),
    Public(Xpub),
}

impl ExtendedKey {
    pub fn to_xpub<C: Signing>(&self, secp: &Secp256k1<C>) -> Xpub {
        match self {
            ExtendedKey::Private(xpriv) => xpriv.to_xpub(secp),
            ExtendedKey::Public(xpub) => *xpub,
        }
    }
}

pub fn parse_extended_key(s: &str) -> Result<ExtendedKey> {
    let s = s.trim();
    if let Ok(xpriv) = Xpriv::from_str(s) {
        return Ok(ExtendedKey::Private(ExtendedPrivKey(xpriv)));
    }
    Xpub::from_str(s).map(ExtendedKey::Public).map_err(Error::from)
}

pub(crate) fn parse_xpriv(s: &str) -> Result<ExtendedPrivKey> {
    match parse_extended_key(s)? {
        ExtendedKey::Private(xpriv) => Ok(xpriv),
        ExtendedKey::Public(_) => Err(Error::InvalidKey("expected an extended private key".into())),
    }
}

pub fn derive_private(master: &mut String, path: &str, wipe: bool) -> Result<ExtendedPrivKey> {
    with_wipe(&mut [master], wipe, |secrets| {
        let path = KeyPath::from_str(path)?;
        let secp = Secp256k1::signing_only();
        let derived = parse_xpriv(secrets[0])?.derive(&secp, &path)?;
        tracing::debug!(%path, depth = derived.0.depth, "derived private key");
        Ok(derived)
    })
}

/// Derives from either an xpriv (any path) or an xpub (unhardened paths only).
pub fn derive_public(master: &mut String, path: &str, wipe: bool) -> Result<Xpub> {
    with_wipe(&mut [master], wipe, |secrets| {
        let path = KeyPath::from_str(path)?;
        let secp = Secp256k1::new();
        let xpub = match parse_extended_key(secrets[0])? {
            ExtendedKey::Private(xpriv) => xpriv.derive(&secp, &path)?.to_xpub(&secp),
            ExtendedKey::Public(xpub) => derive_xpub(&secp, &xpub, &path)?,
        };
        tracing::debug!(%path, depth = xpub.depth, "derived public key");
        Ok(xpub)
    })
}

pub fn xpriv_to_xpub(xpriv: &mut String, wipe: bool) -> Result<Xpub> {
    with_wipe(&mut [xpriv], wipe, |secrets| {
        let secp = Secp256k1::signing_only();
        Ok(parse_xpriv(secrets[0])?.to_xpub(&secp))
    })
}

pub(crate) fn derive_xpub<C: secp256k1::Verification>(secp: &Secp256k1<C>, xpub: &Xpub, path: &KeyPath) -> Result<Xpub> {
    if path.has_hardened() {
        return Err(Error::HardenedFromPublic);
    }
    Ok(xpub.derive_pub(secp, &path.to_derivation_path())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::keys::mnemonic::derive_master_key;
    use bitcoin::NetworkKind;

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn master() -> String {
        let key = derive_master_key(&mut ABANDON.to_string(), &mut String::new(), false, NetworkKind::Main).unwrap();
        key.to_secret_string().to_string()
    }

    #[test]
    fn bip86_root() {
        assert_eq!(
            master(),
            "xprv9s21ZrQH143K3GJpoapnV8SFfukcVBSfeCficPSGfubmSFDxo1kuHnLisriDvSnRRuL2Qrg5ggqHKNVpxR86QEC8w35uxmGoggxtQTPvfUu"
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_private(&mut master(), "m/84'/0'/0'", false).unwrap();
        let b = derive_private(&mut master(), "m/84h/0h/0h", false).unwrap();
        assert_eq!(a.xpriv(), b.xpriv());
        assert_eq!(a.xpriv().depth, 3);
    }

    #[test]
    fn public_from_private_equals_neutered_private() {
        let secp = Secp256k1::new();
        let xpub = derive_public(&mut master(), "m/44'/0'/0'/0", false).unwrap();
        let xpriv = derive_private(&mut master(), "m/44'/0'/0'/0", false).unwrap();
        assert_eq!(xpub, xpriv.to_xpub(&secp));
    }

    #[test]
    fn public_only_unhardened_matches_private_route() {
        let mut account = derive_public(&mut master(), "m/84'/0'/0'", false).unwrap().to_string();
        let from_pub = derive_public(&mut account, "0/7", false).unwrap();
        let from_priv = derive_public(&mut master(), "m/84'/0'/0'/0/7", false).unwrap();
        assert_eq!(from_pub, from_priv);
    }

    #[test]
    fn hardened_from_public_fails() {
        let mut account = derive_public(&mut master(), "m/84'/0'/0'", false).unwrap().to_string();
        for path in ["0'", "0/1h", "m/5/6/7'"] {
            let err = derive_public(&mut account, path, false).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::HardenedDerivation);
            assert_eq!(err.to_string(), "unable to derive hardened path from a public key");
        }
    }

    #[test]
    fn xpub_cannot_derive_private() {
        let mut account = derive_public(&mut master(), "m/84'/0'/0'", false).unwrap().to_string();
        assert_eq!(derive_private(&mut account, "0", false).unwrap_err().kind(), ErrorKind::InvalidKey);
    }

    #[test]
    fn garbage_key_is_invalid_key() {
        assert_eq!(derive_private(&mut "xprvnope".to_string(), "m/0", false).unwrap_err().kind(), ErrorKind::InvalidKey);
    }

    #[test]
    fn wipe_clears_master() {
        let mut key = master();
        derive_private(&mut key, "m/0'", true).unwrap();
        assert!(key.is_empty());
    }

    #[test]
    fn xpriv_to_xpub_matches() {
        let secp = Secp256k1::new();
        let mut key = master();
        let xpub = xpriv_to_xpub(&mut key, false).unwrap();
        assert_eq!(xpub, parse_xpriv(&key).unwrap().to_xpub(&secp));
    }

    #[test]
    fn debug_is_redacted() {
        let key = parse_xpriv(&master()).unwrap();
        assert!(!format!("{:?}", key).contains("xprv"));
    }
}
