//! Input finalization
//!
//! | Spent script | script_sig | witness |
//! |--------------|------------|---------|
//! | p2pkh | `<sig> <pk>` | |
//! | p2wpkh | | `<sig> <pk>` |
//! | p2sh-p2wpkh | `<redeem>` | `<sig> <pk>` |
//! | p2tr (key path) | | `<schnorr sig>` |
//! | bare multisig | `0 <sig>..` | |
//! | p2sh multisig | `0 <sig>.. <redeem>` | |
//! | p2wsh multisig | | `<> <sig>.. <script>` |
//! | p2sh-p2wsh multisig | `<redeem>` | `<> <sig>.. <script>` |

use super::spent_output;
use crate::error::{Error, Result};
use bitcoin::opcodes::all::{OP_CHECKMULTISIG, OP_PUSHBYTES_0};
use bitcoin::psbt::{Input, Psbt};
use bitcoin::script::{Builder, Instruction, PushBytesBuf};
use bitcoin::{ecdsa, Script, Witness};

/// Turn partial signatures into final scripts for every input not yet final.
pub fn finalize(psbt: &mut Psbt) -> Result<()> {
    let txins = psbt.unsigned_tx.input.clone();
    for (index, (input, txin)) in psbt.inputs.iter_mut().zip(&txins).enumerate() {
        if input.final_script_sig.is_some() || input.final_script_witness.is_some() {
            continue;
        }
        let utxo = spent_output(input, txin)
            .ok_or_else(|| Error::MalformedPsbt(format!("input {} has no spent output", index)))?;
        finalize_input(index, input, &utxo.script_pubkey)?;
        clear_signing_data(input);
    }
    tracing::debug!(inputs = psbt.inputs.len(), "psbt finalized");
    Ok(())
}

fn finalize_input(index: usize, input: &mut Input, spk: &Script) -> Result<()> {
    if spk.is_p2tr() {
        let sig = input.tap_key_sig.ok_or_else(|| unsigned(index))?;
        input.final_script_witness = Some(Witness::from_slice(&[sig.to_vec()]));
    } else if spk.is_p2pkh() {
        let (pk, sig) = single_sig(index, input)?;
        input.final_script_sig = Some(Builder::new().push_slice(push(sig.to_vec())?).push_key(&pk).into_script());
    } else if spk.is_p2wpkh() {
        let (pk, sig) = single_sig(index, input)?;
        input.final_script_witness = Some(key_witness(&sig, &pk));
    } else if spk.is_p2sh() {
        let redeem = input.redeem_script.clone().ok_or_else(|| missing(index, "redeem script"))?;
        let redeem_push = push(redeem.to_bytes())?;
        if redeem.is_p2wpkh() {
            let (pk, sig) = single_sig(index, input)?;
            input.final_script_witness = Some(key_witness(&sig, &pk));
            input.final_script_sig = Some(Builder::new().push_slice(redeem_push).into_script());
        } else if redeem.is_p2wsh() {
            let witness_script = input.witness_script.clone().ok_or_else(|| missing(index, "witness script"))?;
            input.final_script_witness = Some(multisig_witness(index, input, &witness_script)?);
            input.final_script_sig = Some(Builder::new().push_slice(redeem_push).into_script());
        } else {
            let mut builder = Builder::new().push_opcode(OP_PUSHBYTES_0);
            for sig in ordered_sigs(index, input, &redeem)? {
                builder = builder.push_slice(push(sig.to_vec())?);
            }
            input.final_script_sig = Some(builder.push_slice(redeem_push).into_script());
        }
    } else if spk.is_p2wsh() {
        let witness_script = input.witness_script.clone().ok_or_else(|| missing(index, "witness script"))?;
        input.final_script_witness = Some(multisig_witness(index, input, &witness_script)?);
    } else if spk.as_bytes().last() == Some(&OP_CHECKMULTISIG.to_u8()) {
        let mut builder = Builder::new().push_opcode(OP_PUSHBYTES_0);
        for sig in ordered_sigs(index, input, spk)? {
            builder = builder.push_slice(push(sig.to_vec())?);
        }
        input.final_script_sig = Some(builder.into_script());
    } else {
        return Err(Error::Unsupported(format!("input {} spends an unknown script type", index)));
    }
    Ok(())
}

fn clear_signing_data(input: &mut Input) {
    input.partial_sigs.clear();
    input.bip32_derivation.clear();
    input.tap_key_origins.clear();
    input.tap_key_sig = None;
    input.tap_internal_key = None;
    input.tap_merkle_root = None;
    input.redeem_script = None;
    input.witness_script = None;
    input.sighash_type = None;
}

fn single_sig(index: usize, input: &Input) -> Result<(bitcoin::PublicKey, ecdsa::Signature)> {
    input
        .partial_sigs
        .iter()
        .next()
        .map(|(pk, sig)| (*pk, *sig))
        .ok_or_else(|| unsigned(index))
}

fn key_witness(sig: &ecdsa::Signature, pk: &bitcoin::PublicKey) -> Witness {
    Witness::from_slice(&[sig.to_vec(), pk.to_bytes()])
}

fn multisig_witness(index: usize, input: &Input, script: &Script) -> Result<Witness> {
    let mut items: Vec<Vec<u8>> = vec![Vec::new()];
    items.extend(ordered_sigs(index, input, script)?.into_iter().map(|sig| sig.to_vec()));
    items.push(script.to_bytes());
    Ok(Witness::from_slice(&items))
}

/// Signatures in the key order of `script`, exactly `threshold` of them.
fn ordered_sigs(index: usize, input: &Input, script: &Script) -> Result<Vec<ecdsa::Signature>> {
    let mut instructions = script.instructions();
    let threshold = match instructions.next() {
        Some(Ok(Instruction::Op(op))) if (0x51..=0x60).contains(&op.to_u8()) => usize::from(op.to_u8() - 0x50),
        _ => return Err(Error::Unsupported(format!("input {} script is not a multisig", index))),
    };
    let mut sigs = Vec::with_capacity(threshold);
    for instruction in instructions {
        let Ok(Instruction::PushBytes(bytes)) = instruction else { continue };
        let Ok(key) = bitcoin::PublicKey::from_slice(bytes.as_bytes()) else { continue };
        if let Some(sig) = input.partial_sigs.get(&key) {
            sigs.push(*sig);
            if sigs.len() == threshold {
                return Ok(sigs);
            }
        }
    }
    Err(Error::InvalidState(format!("input {} has {} of {} required signatures", index, sigs.len(), threshold)))
}

fn push(bytes: Vec<u8>) -> Result<PushBytesBuf> {
    PushBytesBuf::try_from(bytes).map_err(|e| Error::Internal(e.to_string()))
}

fn unsigned(index: usize) -> Error { Error::InvalidState(format!("input {} is not signed", index)) }

fn missing(index: usize, what: &str) -> Error { Error::MalformedPsbt(format!("input {} lacks its {}", index, what)) }
