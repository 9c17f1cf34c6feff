//! PSBT signing engine
//!
//! ```text
//! base64 PSBT ──decode──► Psbt ──sign(xpriv)──► Psbt' ──encode──► base64
//!                           │
//!             per input:    ├─ spent output (witness_utxo | non_witness_utxo)
//!                           ├─ our key?  bip32_derivation / tap_key_origins,
//!                           │            or the xpriv's own key by hash
//!                           └─ sighash by script type, signature inserted
//! ```
//!
//! Inputs we hold no key for, and signatures already present, are left
//! untouched: signing twice never disturbs what the first pass (or another
//! cosigner) wrote.

pub mod finalize;

pub use finalize::finalize;

use crate::error::{Error, Result};
use crate::keys::derive::parse_xpriv;
use crate::keys::with_wipe;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bitcoin::bip32::{DerivationPath, KeySource, Xpriv};
use bitcoin::hashes::Hash;
use bitcoin::key::{CompressedPublicKey, Keypair, TapTweak};
use bitcoin::psbt::{Input, Psbt};
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, SecretKey, Signing, Verification};
use bitcoin::sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType};
use bitcoin::{ecdsa, taproot, ScriptBuf, TxIn, TxOut};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignReport {
    pub inputs: usize,
    /// Inputs that received a new signature in this pass.
    pub signed: usize,
    /// Inputs that already carried this key's signature.
    pub already_signed: usize,
}

pub fn decode_psbt(s: &str) -> Result<Psbt> {
    let bytes = STANDARD
        .decode(s.trim())
        .map_err(|e| Error::MalformedPsbt(format!("base64: {}", e)))?;
    Psbt::deserialize(&bytes).map_err(|e| Error::MalformedPsbt(e.to_string()))
}

pub fn encode_psbt(psbt: &Psbt) -> String { STANDARD.encode(psbt.serialize()) }

/// Sign a base64 PSBT with an extended private key string.
pub fn sign_psbt(psbt: &str, xpriv: &mut String, wipe: bool) -> Result<(String, SignReport)> {
    with_wipe(&mut [xpriv], wipe, |secrets| {
        let mut psbt = decode_psbt(psbt)?;
        let key = parse_xpriv(secrets[0])?;
        let secp = Secp256k1::new();
        let report = sign(&mut psbt, key.xpriv(), &secp)?;
        Ok((encode_psbt(&psbt), report))
    })
}

pub fn sign<C: Signing + Verification>(psbt: &mut Psbt, root: &Xpriv, secp: &Secp256k1<C>) -> Result<SignReport> {
    let tx = psbt.unsigned_tx.clone();
    if tx.input.len() != psbt.inputs.len() {
        return Err(Error::MalformedPsbt(format!("{} inputs in transaction, {} in map", tx.input.len(), psbt.inputs.len())));
    }
    let spent: Vec<Option<TxOut>> = psbt.inputs.iter().zip(&tx.input).map(|(input, txin)| spent_output(input, txin)).collect();
    let prevouts: Option<Vec<TxOut>> = spent.iter().cloned().collect();

    let mut cache = SighashCache::new(&tx);
    let mut report = SignReport { inputs: tx.input.len(), ..Default::default() };

    for (index, input) in psbt.inputs.iter_mut().enumerate() {
        let Some(utxo) = &spent[index] else {
            tracing::warn!(input = index, "skipping input without spent output data");
            continue;
        };

        let outcome = if utxo.script_pubkey.is_p2tr() {
            let Some(prevouts) = &prevouts else {
                tracing::warn!(input = index, "taproot input needs every spent output");
                continue;
            };
            sign_taproot(secp, root, &mut cache, index, input, prevouts)?
        } else {
            sign_ecdsa(secp, root, &mut cache, index, input, utxo)?
        };
        match outcome {
            Signed::New => report.signed += 1,
            Signed::Present => report.already_signed += 1,
            Signed::NotOurs => {}
        }
    }
    tracing::debug!(inputs = report.inputs, signed = report.signed, "psbt signed");
    Ok(report)
}

enum Signed {
    New,
    Present,
    NotOurs,
}

pub(crate) fn spent_output(input: &Input, txin: &TxIn) -> Option<TxOut> {
    if let Some(out) = &input.witness_utxo {
        return Some(out.clone());
    }
    input
        .non_witness_utxo
        .as_ref()
        .filter(|prev| prev.compute_txid() == txin.previous_output.txid)
        .and_then(|prev| prev.output.get(txin.previous_output.vout as usize).cloned())
}

/// Private key for `source` if `root` can reach it, either as the master the
/// path starts from or as an intermediate key the path passes through.
fn private_for<C: Signing>(secp: &Secp256k1<C>, root: &Xpriv, source: &KeySource) -> Result<Option<SecretKey>> {
    let (fingerprint, path) = source;
    let steps: Vec<_> = path.into_iter().copied().collect();
    let relative = if *fingerprint == root.fingerprint(secp) {
        steps
    } else if root.depth > 0 && steps.len() >= usize::from(root.depth) {
        steps[usize::from(root.depth)..].to_vec()
    } else {
        return Ok(None);
    };
    let derived = root.derive_priv(secp, &DerivationPath::from(relative))?;
    Ok(Some(derived.private_key))
}

fn ecdsa_keys<C: Signing>(secp: &Secp256k1<C>, root: &Xpriv, input: &Input, utxo: &TxOut) -> Result<Vec<(PublicKey, SecretKey)>> {
    let mut keys = Vec::new();
    for (pubkey, source) in &input.bip32_derivation {
        if let Some(secret) = private_for(secp, root, source)? {
            if PublicKey::from_secret_key(secp, &secret) == *pubkey {
                keys.push((*pubkey, secret));
            }
        }
    }
    if keys.is_empty() {
        // No derivation data: try the root's own key against the spent script.
        let pubkey = PublicKey::from_secret_key(secp, &root.private_key);
        let compressed = CompressedPublicKey(pubkey);
        let candidates = [
            ScriptBuf::new_p2pkh(&compressed.pubkey_hash()),
            ScriptBuf::new_p2wpkh(&compressed.wpubkey_hash()),
        ];
        let script = input.redeem_script.as_ref().unwrap_or(&utxo.script_pubkey);
        if candidates.iter().any(|c| c == script) {
            keys.push((pubkey, root.private_key));
        }
    }
    Ok(keys)
}

fn sign_ecdsa<C: Signing + Verification>(
    secp: &Secp256k1<C>,
    root: &Xpriv,
    cache: &mut SighashCache<&bitcoin::Transaction>,
    index: usize,
    input: &mut Input,
    utxo: &TxOut,
) -> Result<Signed> {
    let keys = ecdsa_keys(secp, root, input, utxo)?;
    if keys.is_empty() {
        return Ok(Signed::NotOurs);
    }
    let sighash_type = match input.sighash_type {
        Some(ty) => ty.ecdsa_hash_ty().map_err(|e| Error::Signing(format!("input {}: {}", index, e)))?,
        None => EcdsaSighashType::All,
    };

    let mut outcome = Signed::Present;
    for (pubkey, secret) in keys {
        let key = bitcoin::PublicKey::new(pubkey);
        if input.partial_sigs.contains_key(&key) {
            continue;
        }
        let digest = ecdsa_sighash(cache, index, input, utxo, sighash_type)?;
        let signature = secp.sign_ecdsa(&Message::from_digest(digest), &secret);
        input.partial_sigs.insert(key, ecdsa::Signature { signature, sighash_type });
        outcome = Signed::New;
    }
    Ok(outcome)
}

fn ecdsa_sighash(
    cache: &mut SighashCache<&bitcoin::Transaction>,
    index: usize,
    input: &Input,
    utxo: &TxOut,
    sighash_type: EcdsaSighashType,
) -> Result<[u8; 32]> {
    let signing = |e: &dyn std::fmt::Display| Error::Signing(format!("input {}: {}", index, e));
    if let Some(witness_script) = &input.witness_script {
        let hash = cache.p2wsh_signature_hash(index, witness_script, utxo.value, sighash_type).map_err(|e| signing(&e))?;
        return Ok(hash.to_byte_array());
    }
    let script = input.redeem_script.as_ref().unwrap_or(&utxo.script_pubkey);
    if script.is_p2wpkh() {
        let hash = cache.p2wpkh_signature_hash(index, script, utxo.value, sighash_type).map_err(|e| signing(&e))?;
        return Ok(hash.to_byte_array());
    }
    let hash = cache.legacy_signature_hash(index, script, sighash_type.to_u32()).map_err(|e| signing(&e))?;
    Ok(hash.to_byte_array())
}

fn sign_taproot<C: Signing + Verification>(
    secp: &Secp256k1<C>,
    root: &Xpriv,
    cache: &mut SighashCache<&bitcoin::Transaction>,
    index: usize,
    input: &mut Input,
    prevouts: &[TxOut],
) -> Result<Signed> {
    let Some(internal) = input.tap_internal_key else { return Ok(Signed::NotOurs) };
    let secret = match input.tap_key_origins.get(&internal) {
        Some((_, source)) => private_for(secp, root, source)?,
        None => Some(root.private_key),
    };
    let Some(secret) = secret else { return Ok(Signed::NotOurs) };
    let keypair = Keypair::from_secret_key(secp, &secret);
    if keypair.x_only_public_key().0 != internal {
        return Ok(Signed::NotOurs);
    }
    if input.tap_key_sig.is_some() {
        return Ok(Signed::Present);
    }

    let sighash_type = match input.sighash_type {
        Some(ty) => ty.taproot_hash_ty().map_err(|e| Error::Signing(format!("input {}: {}", index, e)))?,
        None => TapSighashType::Default,
    };
    let hash = cache
        .taproot_key_spend_signature_hash(index, &Prevouts::All(prevouts), sighash_type)
        .map_err(|e| Error::Signing(format!("input {}: {}", index, e)))?;
    let tweaked = keypair.tap_tweak(secp, input.tap_merkle_root).to_keypair();
    let signature = secp.sign_schnorr_no_aux_rand(&Message::from_digest(hash.to_byte_array()), &tweaked);
    input.tap_key_sig = Some(taproot::Signature { signature, sighash_type });
    Ok(Signed::New)
}
