//! Rescan: discover used addresses and refresh the unspent cache
//!
//! ```text
//! index:    0   1   2   3   4   5   6   7   8 ...
//! used:     .   x   .   .   .   .   .   .
//!               └─ frontier moves to 1 + 1 + depth
//! ```
//!
//! Every index below the frontier is looked up exactly once. A used index
//! pushes the frontier to `index + 1 + depth`, so the scan stops after
//! `depth` consecutive unused indexes past the last activity. The scan always
//! covers every handed-out index, even when the address map has gaps.

use super::backend::ChainApi;
use crate::error::Result;
use crate::model::{AddressRecord, Contract, InvoiceState, Utxo};
use bitcoin::secp256k1::{Secp256k1, Verification};
use chrono::Utc;
use serde::Serialize;

const MAX_INDEX: u32 = (1 << 31) - 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RescanReport {
    pub lookups: usize,
    pub used: usize,
    pub unspent: usize,
    /// Invoices that moved to `paid`.
    pub paid: Vec<String>,
}

/// `depth == 0` falls back to the contract's own lookup depth.
pub fn rescan<C: Verification>(secp: &Secp256k1<C>, contract: &mut Contract, backend: &dyn ChainApi, depth: u8) -> Result<RescanReport> {
    let depth = u32::from(if depth == 0 { contract.lookup_depth } else { depth });
    let allocated = contract.next_index();
    let mut frontier = match contract.highest_used() {
        Some(highest) => highest.saturating_add(1).saturating_add(depth),
        None => depth,
    }
    .max(allocated)
    .min(MAX_INDEX);

    let mut report = RescanReport::default();
    let mut unspent = Vec::new();
    let mut index = 0;
    while index < frontier {
        let legacy = contract.addresses.get(&index).map(|a| a.legacy).unwrap_or(false);
        let derived = contract.derive(secp, index, legacy)?;
        let activity = backend.lookup(&derived.script_pubkey)?;
        report.lookups += 1;

        if activity.used {
            report.used += 1;
            frontier = frontier.max(index.saturating_add(1).saturating_add(depth)).min(MAX_INDEX);
            match contract.addresses.get_mut(&index) {
                Some(record) => record.used = true,
                None => {
                    let address = derived.address(contract.chain)?.to_string();
                    contract.addresses.insert(index, AddressRecord::new(index, address, legacy, true));
                }
            }
        }
        unspent.extend(activity.unspent.into_iter().map(|u| Utxo {
            outpoint: u.outpoint,
            value: u.value,
            height: u.height,
            index,
            legacy,
        }));
        index += 1;
    }

    report.unspent = unspent.len();
    contract.unspent = unspent;
    contract.last_sync = Some(Utc::now());

    let received = |index: u32| -> u64 { contract.unspent.iter().filter(|u| u.index == index).map(|u| u.value).sum() };
    let paid: Vec<usize> = contract
        .invoices
        .iter()
        .enumerate()
        .filter(|(_, inv)| inv.state == InvoiceState::Created)
        .filter_map(|(pos, inv)| {
            let funds = received(inv.address_index?);
            (funds > 0 && funds >= inv.invoice.amount).then_some(pos)
        })
        .collect();
    for pos in paid {
        let invoice = &mut contract.invoices[pos];
        if invoice.mark_paid() {
            tracing::info!(contract = %contract.id, invoice = %invoice.encoded, "invoice paid");
            report.paid.push(invoice.encoded.clone());
        }
    }

    tracing::debug!(contract = %contract.id, lookups = report.lookups, used = report.used, unspent = report.unspent, "rescan done");
    Ok(report)
}
