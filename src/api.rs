//! Boundary layer for embedders
//!
//! Arguments arrive the way a foreign caller holds them: possibly absent,
//! possibly not UTF-8. Results leave as [`Outcome`], carrying either a
//! payload or a stable code plus message, never both.
//!
//! | Input | Rule |
//! |-------|------|
//! | `Option<&[u8]>` string | `None` → `null_argument`; NUL byte or bad UTF-8 → `malformed_string` |
//! | `Option<&mut Vec<u8>>` secret | wiped before return when `wipe` is set, on failure too |
//!
//! Structured results are JSON inside [`OwnedString`]. It cannot be cloned
//! and `release` consumes it, so a double release or a use after release
//! does not compile.

use crate::bech32;
use crate::core::Chain;
use crate::error::{Error, Result};
use crate::keys::{self, WordCount};
use crate::model::{InvoiceType, OuterCategory};
use crate::session::{Session, SessionConfig};
use crate::signer;
use crate::wallet::InvoiceRequest;
use bitcoin::NetworkKind;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, Zeroizing};

/// Success payload or a classified failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    Failure { code: u16, message: String },
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool { matches!(self, Outcome::Success(_)) }

    pub fn code(&self) -> u16 {
        match self { Outcome::Success(_) => 0, Outcome::Failure { code, .. } => *code }
    }

    pub fn message(&self) -> Option<&str> {
        match self { Outcome::Success(_) => None, Outcome::Failure { message, .. } => Some(message) }
    }

    pub fn success(self) -> Option<T> {
        match self { Outcome::Success(value) => Some(value), Outcome::Failure { .. } => None }
    }
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(err) => {
                tracing::debug!(code = err.code(), kind = %err.kind(), "boundary call failed");
                Outcome::Failure { code: err.code(), message: err.to_string() }
            }
        }
    }
}

/// String handed to the caller; zeroized when released or dropped.
pub struct OwnedString(Zeroizing<String>);

impl OwnedString {
    pub fn new(value: String) -> Self { Self(Zeroizing::new(value)) }

    pub fn as_str(&self) -> &str { &self.0 }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn release(self) {}
}

impl fmt::Debug for OwnedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "OwnedString({} bytes)", self.0.len()) }
}

fn text<'a>(name: &'static str, value: Option<&'a [u8]>) -> Result<&'a str> {
    let bytes = value.ok_or(Error::NullArgument(name))?;
    if bytes.contains(&0) {
        return Err(Error::MalformedString(format!("`{}` contains a NUL byte", name)));
    }
    std::str::from_utf8(bytes).map_err(|e| Error::MalformedString(format!("`{}`: {}", name, e)))
}

fn optional<'a>(name: &'static str, value: Option<&'a [u8]>) -> Result<Option<&'a str>> {
    value.map(|v| text(name, Some(v))).transpose()
}

/// Copy a secret into an engine-owned buffer the engine always wipes;
/// the caller's buffer is wiped here when asked.
fn with_secret<T>(name: &'static str, buf: Option<&mut Vec<u8>>, wipe: bool, f: impl FnOnce(&mut String) -> Result<T>) -> Result<T> {
    let buf = buf.ok_or(Error::NullArgument(name))?;
    let result = text(name, Some(buf.as_slice())).map(str::to_string).and_then(|mut copy| {
        let out = f(&mut copy);
        copy.zeroize();
        out
    });
    if wipe {
        buf.zeroize();
    }
    result
}

fn json<T: Serialize>(value: &T) -> Result<OwnedString> {
    serde_json::to_string(value).map(OwnedString::new).map_err(|e| Error::Internal(e.to_string()))
}

fn secret(value: Zeroizing<String>) -> OwnedString { OwnedString::new(value.to_string()) }

fn network(testnet: bool) -> NetworkKind { if testnet { NetworkKind::Test } else { NetworkKind::Main } }

// ------------------------------------------------------------------ primitives

pub fn bech32_info(value: Option<&[u8]>) -> Outcome<OwnedString> {
    Outcome::from(text("bech32", value).and_then(|s| Ok(bech32::info(s)?)).and_then(|info| json(&info)))
}

/// `None` entropy means fresh random entropy of the size `words` needs.
pub fn mnemonic_create(entropy: Option<&[u8]>, words: usize) -> Outcome<OwnedString> {
    Outcome::from(WordCount::from_words(words).and_then(|count| match entropy {
        Some(entropy) => keys::create_mnemonic(entropy, count),
        None => keys::random_mnemonic(count),
    }).map(secret))
}

/// Entropy behind a mnemonic, hex.
pub fn mnemonic_entropy(mnemonic: Option<&mut Vec<u8>>, wipe: bool) -> Outcome<OwnedString> {
    let result = with_secret("mnemonic", mnemonic, wipe, |mnemonic| keys::mnemonic_entropy(mnemonic));
    Outcome::from(result.map(|entropy| OwnedString::new(hex::encode(&entropy[..]))))
}

pub fn master_key_derive(mut mnemonic: Option<&mut Vec<u8>>, mut passphrase: Option<&mut Vec<u8>>, wipe: bool, testnet: bool) -> Outcome<OwnedString> {
    // Both buffers are wiped here, after either argument may have failed.
    let result = with_secret("mnemonic", mnemonic.as_deref_mut(), false, |mnemonic| {
        with_secret("passphrase", passphrase.as_deref_mut(), false, |passphrase| {
            keys::derive_master_key(mnemonic, passphrase, true, network(testnet))
        })
    });
    if wipe {
        mnemonic.into_iter().chain(passphrase).for_each(|buf| buf.zeroize());
    }
    Outcome::from(result.map(|key| secret(key.to_secret_string())))
}

pub fn private_key_derive(master: Option<&mut Vec<u8>>, path: Option<&[u8]>, wipe: bool) -> Outcome<OwnedString> {
    let result = with_secret("master", master, wipe, |master| keys::derive_private(master, text("path", path)?, true));
    Outcome::from(result.map(|key| secret(key.to_secret_string())))
}

pub fn public_key_derive(master: Option<&mut Vec<u8>>, path: Option<&[u8]>, wipe: bool) -> Outcome<OwnedString> {
    let result = with_secret("master", master, wipe, |master| keys::derive_public(master, text("path", path)?, true));
    Outcome::from(result.map(|xpub| OwnedString::new(xpub.to_string())))
}

pub fn xpriv_to_xpub(xpriv: Option<&mut Vec<u8>>, wipe: bool) -> Outcome<OwnedString> {
    let result = with_secret("xpriv", xpriv, wipe, |xpriv| keys::xpriv_to_xpub(xpriv, true));
    Outcome::from(result.map(|xpub| OwnedString::new(xpub.to_string())))
}

pub fn keychain_create(master: Option<&mut Vec<u8>>, account: Option<&[u8]>, terminal: Option<&[u8]>, wipe: bool) -> Outcome<OwnedString> {
    let result = with_secret("master", master, wipe, |master| {
        keys::keychain_create(master, text("account", account)?, text("terminal", terminal)?, true)
    });
    Outcome::from(result.map(|chain| OwnedString::new(chain.to_string())))
}

/// Returns the updated PSBT, base64.
pub fn psbt_sign(psbt: Option<&[u8]>, xpriv: Option<&mut Vec<u8>>, wipe: bool) -> Outcome<OwnedString> {
    let result = with_secret("xpriv", xpriv, wipe, |xpriv| signer::sign_psbt(text("psbt", psbt)?, xpriv, true));
    Outcome::from(result.map(|(psbt, _)| OwnedString::new(psbt)))
}

// --------------------------------------------------------------------- session

pub fn session_open(chain: Option<&[u8]>, data_dir: Option<&[u8]>, electrum: Option<&[u8]>) -> Outcome<Session> {
    Outcome::from((|| {
        let mut config = SessionConfig::new(Chain::from_str(text("chain", chain)?)?);
        if let Some(dir) = optional("data_dir", data_dir)? {
            config = config.with_data_dir(dir);
        }
        if let Some(url) = optional("electrum", electrum)? {
            config = config.with_electrum(url);
        }
        Session::open(config)
    })())
}

pub fn session_close(session: &Session) -> Outcome<()> { Outcome::from(session.close()) }

pub fn contract_list(session: &Session) -> Outcome<OwnedString> {
    Outcome::from(session.contract_list().and_then(|list| json(&list)))
}

pub fn single_sig_create(session: &Session, name: Option<&[u8]>, keychain: Option<&[u8]>, category: Option<&[u8]>) -> Outcome<OwnedString> {
    Outcome::from((|| {
        let category = OuterCategory::from_str(text("category", category)?)?;
        json(&session.single_sig_create(text("name", name)?, text("keychain", keychain)?, category)?)
    })())
}

/// `keychains` is a comma-separated list of key chain strings.
pub fn multi_sig_create(session: &Session, name: Option<&[u8]>, threshold: u8, keychains: Option<&[u8]>, category: Option<&[u8]>) -> Outcome<OwnedString> {
    Outcome::from((|| {
        let category = OuterCategory::from_str(text("category", category)?)?;
        let keychains = text("keychains", keychains)?.split(',').map(|k| k.trim().to_string()).collect();
        json(&session.multi_sig_create(text("name", name)?, threshold, keychains, category)?)
    })())
}

pub fn contract_rename(session: &Session, contract: Option<&[u8]>, name: Option<&[u8]>) -> Outcome<OwnedString> {
    Outcome::from((|| json(&session.contract_rename(text("contract", contract)?, text("name", name)?)?))())
}

pub fn contract_delete(session: &Session, contract: Option<&[u8]>, force: bool) -> Outcome<()> {
    Outcome::from(text("contract", contract).and_then(|id| session.contract_delete(id, force)))
}

pub fn contract_balance(session: &Session, contract: Option<&[u8]>, rescan: bool, depth: u8) -> Outcome<OwnedString> {
    Outcome::from((|| json(&session.contract_balance(text("contract", contract)?, rescan, depth)?))())
}

pub fn contract_operations(session: &Session, contract: Option<&[u8]>) -> Outcome<OwnedString> {
    Outcome::from((|| json(&session.contract_operations(text("contract", contract)?)?))())
}

pub fn address_list(session: &Session, contract: Option<&[u8]>, rescan: bool, depth: u8) -> Outcome<OwnedString> {
    Outcome::from((|| json(&session.address_list(text("contract", contract)?, rescan, depth)?))())
}

pub fn address_create(session: &Session, contract: Option<&[u8]>, mark_used: bool, legacy: bool) -> Outcome<OwnedString> {
    Outcome::from((|| json(&session.address_create(text("contract", contract)?, mark_used, legacy)?))())
}

#[allow(clippy::too_many_arguments)]
pub fn invoice_create(
    session: &Session,
    category: u8,
    contract: Option<&[u8]>,
    asset: Option<&[u8]>,
    amount: u64,
    merchant: Option<&[u8]>,
    purpose: Option<&[u8]>,
    unmark: bool,
    legacy: bool,
) -> Outcome<OwnedString> {
    Outcome::from((|| {
        let request = InvoiceRequest {
            category: InvoiceType::from_tag(category)?,
            contract: text("contract", contract)?.parse()?,
            asset: optional("asset", asset)?.map(str::to_string),
            amount,
            merchant: optional("merchant", merchant)?.map(str::to_string),
            purpose: optional("purpose", purpose)?.map(str::to_string),
            unmark,
            legacy,
        };
        json(&session.invoice_create(request)?)
    })())
}

pub fn invoice_list(session: &Session, contract: Option<&[u8]>) -> Outcome<OwnedString> {
    Outcome::from((|| json(&session.invoice_list(text("contract", contract)?)?))())
}

pub fn invoice_pay(session: &Session, contract: Option<&[u8]>, invoice: Option<&[u8]>, fee: u64, giveaway: Option<u64>) -> Outcome<OwnedString> {
    Outcome::from((|| json(&session.invoice_pay(text("contract", contract)?, text("invoice", invoice)?, fee, giveaway)?))())
}

pub fn invoice_accept(session: &Session, contract: Option<&[u8]>, invoice: Option<&[u8]>) -> Outcome<OwnedString> {
    Outcome::from((|| json(&session.invoice_accept(text("contract", contract)?, text("invoice", invoice)?)?))())
}

pub fn invoice_archive(session: &Session, contract: Option<&[u8]>, invoice: Option<&[u8]>) -> Outcome<OwnedString> {
    Outcome::from((|| json(&session.invoice_archive(text("contract", contract)?, text("invoice", invoice)?)?))())
}

pub fn asset_list(session: &Session) -> Outcome<OwnedString> { Outcome::from(session.asset_list().and_then(|a| json(&a))) }

pub fn asset_import(session: &Session, genesis: Option<&[u8]>) -> Outcome<OwnedString> {
    Outcome::from((|| json(&session.asset_import(text("genesis", genesis)?)?))())
}

pub fn psbt_publish(session: &Session, psbt: Option<&[u8]>) -> Outcome<OwnedString> {
    Outcome::from((|| Ok(OwnedString::new(session.psbt_publish(text("psbt", psbt)?)?.to_string())))())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn null_and_malformed_strings() {
        assert_eq!(text("x", None).unwrap_err().kind(), ErrorKind::NullArgument);
        assert_eq!(text("x", Some(&b"a\0b"[..])).unwrap_err().kind(), ErrorKind::MalformedString);
        assert_eq!(text("x", Some(&[0xffu8, 0xfe][..])).unwrap_err().kind(), ErrorKind::MalformedString);
        assert_eq!(text("x", Some(&b"ok"[..])).unwrap(), "ok");
    }

    #[test]
    fn outcome_is_exclusive() {
        let ok: Outcome<u8> = Outcome::from(Ok(1));
        assert!(ok.is_success());
        assert_eq!(ok.code(), 0);
        assert!(ok.message().is_none());
        let failed: Outcome<u8> = Outcome::from(Err(Error::Uninitialized));
        assert!(!failed.is_success());
        assert_eq!(failed.code(), ErrorKind::Uninitialized.code());
        assert!(failed.message().is_some());
    }

    #[test]
    fn secret_wiped_on_failure() {
        let mut words = b"abandon abandon nope".to_vec();
        let mut pass = Vec::new();
        let out = master_key_derive(Some(&mut words), Some(&mut pass), true, true);
        assert_eq!(out.code(), ErrorKind::InvalidMnemonic.code());
        assert!(words.is_empty());
    }

    #[test]
    fn secret_kept_without_wipe() {
        let mut master = b"not a key".to_vec();
        let out = xpriv_to_xpub(Some(&mut master), false);
        assert!(!out.is_success());
        assert_eq!(master, b"not a key");
    }

    #[test]
    fn null_secret() {
        assert_eq!(xpriv_to_xpub(None, true).code(), ErrorKind::NullArgument.code());
    }
}
