//! Paying invoices: coin selection and PSBT composition
//!
//! Coin selection is largest-first over the cached unspent outputs:
//!
//! ```text
//! sorted desc:  [ 70k ][ 40k ][ 25k ][ 3k ]
//! need 100k+1k  ──────────────► Σ=110k (stop)
//! change = 110k - 100k - 1k = 9k
//!   9k <= giveaway or below dust  → added to the fee
//!   otherwise                     → output to a fresh used address
//! ```

use super::backend::ChainApi;
use crate::error::{Error, Result};
use crate::model::{Beneficiary, Contract, DerivedScript, Invoice, InvoiceType, Operation, ScriptKind, Utxo};
use crate::signer::encode_psbt;
use bitcoin::absolute::LockTime;
use bitcoin::psbt::{Input, Output, Psbt};
use bitcoin::secp256k1::{Secp256k1, Verification};
use bitcoin::transaction::Version;
use bitcoin::{Amount, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreparedPayment {
    pub psbt: String,
    pub txid: Txid,
    pub amount: u64,
    pub fee: u64,
    pub change: u64,
    pub giveaway: u64,
    pub inputs: usize,
    /// Index of the change address, when change was kept.
    pub change_index: Option<u32>,
}

/// Largest-first selection covering `required`. Zero-value outputs are never picked.
///
/// Outputs spent by a prepared but unpublished payment are not reserved: two
/// payments composed before either is published may pick the same outpoints.
/// Whichever is published first wins; the other stays unpublished.
pub fn select_coins(unspent: &[Utxo], required: u64) -> Result<(Vec<Utxo>, u64)> {
    let mut coins: Vec<&Utxo> = unspent.iter().filter(|u| u.value > 0).collect();
    coins.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.outpoint.cmp(&b.outpoint)));

    let mut selected = Vec::new();
    let mut total = 0u64;
    for coin in coins {
        if total >= required {
            break;
        }
        total += coin.value;
        selected.push(coin.clone());
    }
    if total < required {
        let available = unspent.iter().map(|u| u.value).sum();
        return Err(Error::InsufficientFunds { required, available });
    }
    Ok((selected, total))
}

/// Build the unsigned PSBT paying `invoice` from `contract` and record it.
pub fn compose<C: Verification>(
    secp: &Secp256k1<C>,
    contract: &mut Contract,
    backend: &dyn ChainApi,
    invoice: &Invoice,
    encoded: Option<&str>,
    fee: u64,
    giveaway: u64,
) -> Result<PreparedPayment> {
    if invoice.asset.is_some() {
        return Err(Error::Unsupported("paying asset invoices".into()));
    }
    if invoice.category == InvoiceType::Psbt {
        return Err(Error::Unsupported("psbt invoices".into()));
    }
    if invoice.amount == 0 {
        return Err(Error::InvalidState("invoice has no amount".into()));
    }
    let target = invoice.script_pubkey(contract.chain)?;
    let required = invoice
        .amount
        .checked_add(fee)
        .ok_or_else(|| Error::InvalidState("amount plus fee overflows".into()))?;
    let (selected, total) = select_coins(&contract.unspent, required)?;

    let change_index = contract.next_index();
    let change_script = contract.derive(secp, change_index, false)?;
    let change = total - required;
    let dust = change_script.script_pubkey.minimal_non_dust().to_sat();
    let keep_change = change > giveaway && change >= dust;

    let mut output = vec![TxOut { value: Amount::from_sat(invoice.amount), script_pubkey: target.clone() }];
    if keep_change {
        output.push(TxOut { value: Amount::from_sat(change), script_pubkey: change_script.script_pubkey.clone() });
    }
    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: selected
            .iter()
            .map(|u| TxIn { previous_output: u.outpoint, script_sig: ScriptBuf::new(), sequence: Sequence::ENABLE_RBF_NO_LOCKTIME, witness: Witness::new() })
            .collect(),
        output,
    };
    let mut psbt = Psbt::from_unsigned_tx(tx).map_err(|e| Error::Internal(e.to_string()))?;

    for (input, utxo) in psbt.inputs.iter_mut().zip(&selected) {
        let derived = contract.derive(secp, utxo.index, utxo.legacy)?;
        if derived.kind.is_witness() {
            input.witness_utxo = Some(TxOut { value: Amount::from_sat(utxo.value), script_pubkey: derived.script_pubkey.clone() });
        } else {
            input.non_witness_utxo = Some(backend.transaction(&utxo.outpoint.txid)?);
        }
        describe_input(input, &derived);
    }
    if keep_change {
        describe_output(&mut psbt.outputs[1], &change_script);
    }

    let (change, gave, change_at) = if keep_change {
        let record = contract.allocate(secp, true, false)?;
        (change, 0, Some(record.index))
    } else {
        (0, change, None)
    };

    let txid = psbt.unsigned_tx.compute_txid();
    let encoded_psbt = encode_psbt(&psbt);
    let beneficiary = match &invoice.beneficiary {
        Beneficiary::Address(address) => address.clone(),
        Beneficiary::Script(script) => script.clone(),
    };
    contract.operations.push(Operation {
        txid,
        beneficiary,
        amount: invoice.amount,
        fee: fee + gave,
        change,
        giveaway: gave,
        invoice: encoded.map(str::to_string),
        psbt: encoded_psbt.clone(),
        published: false,
        created_at: Utc::now(),
    });
    tracing::info!(contract = %contract.id, %txid, amount = invoice.amount, fee, change, giveaway = gave, "payment prepared");

    Ok(PreparedPayment {
        psbt: encoded_psbt,
        txid,
        amount: invoice.amount,
        fee: fee + gave,
        change,
        giveaway: gave,
        inputs: selected.len(),
        change_index: change_at,
    })
}

fn describe_input(input: &mut Input, derived: &DerivedScript) {
    input.redeem_script = derived.redeem_script.clone();
    input.witness_script = derived.witness_script.clone();
    match (derived.kind, derived.internal_key) {
        (ScriptKind::P2tr, Some(internal)) => {
            input.tap_internal_key = Some(internal);
            for (_, source) in &derived.keys {
                input.tap_key_origins.insert(internal, (Vec::new(), source.clone()));
            }
        }
        _ => input.bip32_derivation = derived.keys.iter().map(|(pk, source)| (*pk, source.clone())).collect(),
    }
}

fn describe_output(output: &mut Output, derived: &DerivedScript) {
    output.redeem_script = derived.redeem_script.clone();
    output.witness_script = derived.witness_script.clone();
    match (derived.kind, derived.internal_key) {
        (ScriptKind::P2tr, Some(internal)) => {
            output.tap_internal_key = Some(internal);
            for (_, source) in &derived.keys {
                output.tap_key_origins.insert(internal, (Vec::new(), source.clone()));
            }
        }
        _ => output.bip32_derivation = derived.keys.iter().map(|(pk, source)| (*pk, source.clone())).collect(),
    }
}
