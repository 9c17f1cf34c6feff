//! Wallet - contract, address and invoice state machine
//!
//! # Architecture
//!
//! ```text
//! Wallet
//!     │
//!     ├── state: WalletState ── contracts, assets
//!     │
//!     ├── store: Box<dyn Store>       (FileStore | MemoryStore)
//!     │
//!     └── backend: Box<dyn ChainApi>  (ElectrumBackend | caller supplied)
//!             ▲
//!             └── sync::rescan, pay::compose, psbt_publish
//! ```
//!
//! Every mutation works on a copy of the state and only replaces the live
//! state once the store accepted it, so a failed operation leaves nothing
//! half-applied.
//!
//! # Operations
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | `single_sig_create` / `multi_sig_create` | new contract, `InvalidState` if it exists |
//! | `contract_rename` | name only, id is immutable |
//! | `contract_delete` | `ContractInUse` while referenced, unless forced |
//! | `contract_balance` / `address_list` | cached, or rescan first |
//! | `address_create` | next index, never reused |
//! | `invoice_create` | fresh used address, or reopen the last one (`unmark`) |
//! | `invoice_accept` / `invoice_archive` | lifecycle transitions |
//! | `invoice_pay` | unsigned PSBT, recorded as an operation |
//! | `psbt_publish` | finalize, broadcast, drop spent outputs |
//! | `asset_import` | idempotent per genesis |

pub mod backend;
pub mod pay;
pub mod store;
pub mod sync;

pub use backend::{ChainApi, ScriptActivity, UnspentOutput};
#[cfg(feature = "electrum")]
pub use backend::ElectrumBackend;
pub use pay::PreparedPayment;
pub use store::{FileStore, MemoryStore, Store, WalletState};
pub use sync::RescanReport;

use crate::core::Chain;
use crate::error::{Error, Result};
use crate::keys::Keychain;
use crate::model::{
    AddressRecord, Asset, AssetId, Balance, Beneficiary, Contract, ContractId, ContractSummary, Invoice, InvoiceRecord,
    InvoiceType, Operation, OuterCategory, Policy,
};
use crate::signer::{decode_psbt, finalize};
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::{OutPoint, ScriptBuf, Transaction, Txid, Witness};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// Parameters of `invoice_create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub category: InvoiceType,
    pub contract: ContractId,
    #[serde(default)]
    pub asset: Option<String>,
    pub amount: u64,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub unmark: bool,
    #[serde(default)]
    pub legacy: bool,
}

impl InvoiceRequest {
    pub fn new(contract: ContractId, amount: u64) -> Self {
        Self { category: InvoiceType::AddressUtxo, contract, asset: None, amount, merchant: None, purpose: None, unmark: false, legacy: false }
    }
}

pub struct Wallet {
    chain: Chain,
    lookup_depth: u8,
    state: WalletState,
    store: Box<dyn Store>,
    backend: Box<dyn ChainApi>,
    secp: Secp256k1<All>,
}

impl Wallet {
    pub fn open(chain: Chain, lookup_depth: u8, store: Box<dyn Store>, backend: Box<dyn ChainApi>) -> Result<Self> {
        let state = store.load(chain)?;
        tracing::info!(%chain, contracts = state.contracts.len(), assets = state.assets.len(), "wallet loaded");
        Ok(Self { chain, lookup_depth, state, store, backend, secp: Secp256k1::new() })
    }

    pub fn chain(&self) -> Chain { self.chain }

    /// Drop in-memory state and load it again from the store.
    pub fn reload(&mut self) -> Result<()> {
        self.state = self.store.load(self.chain)?;
        tracing::debug!(contracts = self.state.contracts.len(), "wallet reloaded");
        Ok(())
    }

    fn commit(&mut self, next: WalletState) -> Result<()> {
        if let Err(err) = self.store.save(&next) {
            tracing::error!(error = %err, "failed to persist wallet state");
            return Err(err);
        }
        self.state = next;
        Ok(())
    }

    fn position(&self, id: &ContractId) -> Result<usize> {
        self.state.contracts.iter().position(|c| c.id == *id).ok_or_else(|| Error::not_found("contract", id))
    }

    pub fn contract(&self, id: &ContractId) -> Result<&Contract> { Ok(&self.state.contracts[self.position(id)?]) }

    fn update<T>(&mut self, id: &ContractId, f: impl FnOnce(&mut Contract, &Secp256k1<All>, &dyn ChainApi) -> Result<T>) -> Result<T> {
        let pos = self.position(id)?;
        let mut next = self.state.clone();
        let out = f(&mut next.contracts[pos], &self.secp, self.backend.as_ref())?;
        self.commit(next)?;
        Ok(out)
    }

    // ---------------------------------------------------------------- contracts

    pub fn contract_list(&self) -> Vec<ContractSummary> { self.state.contracts.iter().map(Contract::summary).collect() }

    pub fn single_sig_create(&mut self, name: &str, keychain: &str, category: OuterCategory) -> Result<ContractSummary> {
        let keychain = Keychain::from_str(keychain)?;
        self.insert_contract(name, Policy::SingleSig { category, keychain })
    }

    pub fn multi_sig_create(&mut self, name: &str, threshold: u8, keychains: &[String], category: OuterCategory) -> Result<ContractSummary> {
        let keychains = keychains.iter().map(|k| Keychain::from_str(k)).collect::<Result<Vec<_>>>()?;
        self.insert_contract(name, Policy::MultiSig { category, threshold, keychains })
    }

    fn insert_contract(&mut self, name: &str, policy: Policy) -> Result<ContractSummary> {
        let contract = Contract::new(name, self.chain, policy, self.lookup_depth)?;
        if self.position(&contract.id).is_ok() {
            return Err(Error::InvalidState(format!("contract {} already exists", contract.id)));
        }
        let summary = contract.summary();
        let mut next = self.state.clone();
        next.contracts.push(contract);
        self.commit(next)?;
        tracing::info!(contract = %summary.id, name = %summary.name, descriptor = %summary.descriptor, "contract created");
        Ok(summary)
    }

    pub fn contract_rename(&mut self, id: &ContractId, name: &str) -> Result<ContractSummary> {
        let summary = self.update(id, |contract, _, _| {
            contract.name = name.to_string();
            Ok(contract.summary())
        })?;
        tracing::info!(contract = %id, name, "contract renamed");
        Ok(summary)
    }

    pub fn contract_delete(&mut self, id: &ContractId, force: bool) -> Result<()> {
        let pos = self.position(id)?;
        if self.state.contracts[pos].has_references() && !force {
            return Err(Error::ContractInUse(id.to_string()));
        }
        let mut next = self.state.clone();
        next.contracts.remove(pos);
        self.commit(next)?;
        tracing::info!(contract = %id, force, "contract deleted");
        Ok(())
    }

    pub fn contract_rescan(&mut self, id: &ContractId, depth: u8) -> Result<RescanReport> {
        self.update(id, |contract, secp, backend| sync::rescan(secp, contract, backend, depth))
    }

    pub fn contract_balance(&mut self, id: &ContractId, rescan: bool, depth: u8) -> Result<Balance> {
        if rescan {
            self.contract_rescan(id, depth)?;
        }
        let mut balance = self.contract(id)?.balance();
        for asset in self.state.assets.iter().filter(|a| a.chain == self.chain) {
            balance.by_asset.entry(asset.id.to_string()).or_insert(0);
        }
        Ok(balance)
    }

    pub fn contract_operations(&self, id: &ContractId) -> Result<Vec<Operation>> { Ok(self.contract(id)?.operations.clone()) }

    // ---------------------------------------------------------------- addresses

    pub fn address_list(&mut self, id: &ContractId, rescan: bool, depth: u8) -> Result<Vec<AddressRecord>> {
        if rescan {
            self.contract_rescan(id, depth)?;
        }
        Ok(self.contract(id)?.addresses.values().cloned().collect())
    }

    pub fn address_create(&mut self, id: &ContractId, mark_used: bool, legacy: bool) -> Result<AddressRecord> {
        self.update(id, |contract, secp, _| contract.allocate(secp, mark_used, legacy))
    }

    // ----------------------------------------------------------------- invoices

    pub fn invoice_create(&mut self, request: &InvoiceRequest) -> Result<InvoiceRecord> {
        if request.category == InvoiceType::Psbt {
            return Err(Error::Unsupported("psbt invoices".into()));
        }
        let asset = match &request.asset {
            Some(asset) => {
                let id = AssetId::from_str(asset)?;
                if !self.state.assets.iter().any(|a| a.id == id) {
                    return Err(Error::not_found("asset", asset));
                }
                Some(id)
            }
            None => None,
        };

        let chain = self.chain;
        let record = self.update(&request.contract, |contract, secp, _| {
            let reopened = if request.unmark { contract.addresses.values_mut().next_back() } else { None };
            let address = match reopened {
                Some(address) => {
                    address.used = false;
                    address.clone()
                }
                None => contract.allocate(secp, !request.unmark, request.legacy)?,
            };
            let beneficiary = match request.category {
                InvoiceType::Descriptor => {
                    let script = contract.derive(secp, address.index, address.legacy)?.script_pubkey;
                    Beneficiary::Script(script.to_hex_string())
                }
                _ => Beneficiary::Address(address.address.clone()),
            };
            let invoice = Invoice {
                category: request.category,
                chain: Some(chain),
                beneficiary,
                amount: request.amount,
                asset,
                merchant: request.merchant.clone(),
                purpose: request.purpose.clone(),
            };
            let record = InvoiceRecord::new(invoice, Some(address.index))?;
            if let Ok(existing) = contract.invoice_mut(&record.encoded) {
                return Ok(existing.clone());
            }
            contract.invoices.push(record.clone());
            Ok(record)
        })?;
        tracing::info!(contract = %request.contract, invoice = %record.encoded, "invoice created");
        Ok(record)
    }

    pub fn invoice_list(&self, id: &ContractId) -> Result<Vec<InvoiceRecord>> { Ok(self.contract(id)?.invoices.clone()) }

    pub fn invoice_accept(&mut self, id: &ContractId, invoice: &str) -> Result<InvoiceRecord> {
        let (record, changed) = self.update(id, |contract, _, _| {
            let record = contract.invoice_mut(invoice)?;
            let changed = record.accept()?;
            Ok((record.clone(), changed))
        })?;
        if changed {
            tracing::info!(contract = %id, invoice, "invoice accepted");
        }
        Ok(record)
    }

    pub fn invoice_archive(&mut self, id: &ContractId, invoice: &str) -> Result<InvoiceRecord> {
        self.update(id, |contract, _, _| {
            let record = contract.invoice_mut(invoice)?;
            record.archive();
            Ok(record.clone())
        })
    }

    /// Compose an unsigned PSBT paying `invoice`; nothing is broadcast.
    pub fn invoice_pay(&mut self, id: &ContractId, invoice: &str, fee: u64, giveaway: Option<u64>) -> Result<PreparedPayment> {
        let parsed = Invoice::parse(invoice)?;
        self.update(id, |contract, secp, backend| {
            pay::compose(secp, contract, backend, &parsed, Some(invoice), fee, giveaway.unwrap_or(0))
        })
    }

    // ------------------------------------------------------------------- assets

    pub fn asset_list(&self) -> Vec<Asset> { self.state.assets.clone() }

    pub fn asset_import(&mut self, genesis: &str) -> Result<Asset> {
        let asset = Asset::parse(genesis)?;
        if asset.chain != self.chain {
            return Err(Error::ChainMismatch(format!("asset {} is issued on {}", asset.id, asset.chain)));
        }
        if let Some(existing) = self.state.assets.iter().find(|a| a.id == asset.id) {
            return Ok(existing.clone());
        }
        let mut next = self.state.clone();
        next.assets.push(asset.clone());
        self.commit(next)?;
        tracing::info!(asset = %asset.id, ticker = %asset.ticker, "asset imported");
        Ok(asset)
    }

    // --------------------------------------------------------------------- psbt

    /// Finalize a fully signed PSBT and broadcast it.
    pub fn psbt_publish(&mut self, psbt: &str) -> Result<Txid> {
        let mut psbt = decode_psbt(psbt)?;
        finalize(&mut psbt)?;
        let tx = psbt.extract_tx_unchecked_fee_rate();
        let spent: HashSet<OutPoint> = tx.input.iter().map(|i| i.previous_output).collect();
        let unsigned = unsigned_txid(&tx);
        let txid = self.backend.broadcast(&tx)?;

        let mut next = self.state.clone();
        for contract in &mut next.contracts {
            contract.unspent.retain(|u| !spent.contains(&u.outpoint));
            for op in contract.operations.iter_mut().filter(|op| !op.published && op.txid == unsigned) {
                op.published = true;
                op.txid = txid;
            }
        }
        self.commit(next)?;
        tracing::info!(%txid, inputs = tx.input.len(), "transaction published");
        Ok(txid)
    }
}

/// Txid of `tx` before any input was signed, as recorded when the payment was prepared.
fn unsigned_txid(tx: &Transaction) -> Txid {
    let mut unsigned = tx.clone();
    for input in &mut unsigned.input {
        input.script_sig = ScriptBuf::new();
        input.witness = Witness::new();
    }
    unsigned.compute_txid()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::keys::{derive_master_key, keychain_create};
    use bitcoin::{NetworkKind, Script, Transaction};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Quiet {
        lookups: AtomicUsize,
    }

    impl ChainApi for Quiet {
        fn lookup(&self, _: &Script) -> Result<ScriptActivity> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(ScriptActivity::default())
        }

        fn transaction(&self, txid: &Txid) -> Result<Transaction> { Err(Error::not_found("transaction", txid)) }

        fn broadcast(&self, _: &Transaction) -> Result<Txid> { Err(Error::Network("offline".into())) }
    }

    fn keychain(account: &str) -> String {
        let mut words = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about".to_string();
        let master = derive_master_key(&mut words, &mut String::new(), false, NetworkKind::Test).unwrap();
        keychain_create(&mut master.to_secret_string().to_string(), account, "0", false).unwrap().to_string()
    }

    fn wallet() -> (Wallet, Arc<Quiet>, ContractId) {
        let backend = Arc::new(Quiet::default());
        let mut wallet = Wallet::open(Chain::Testnet, 20, Box::new(MemoryStore::new()), Box::new(backend.clone())).unwrap();
        let id = wallet.single_sig_create("savings", &keychain("m/84'/1'/0'"), OuterCategory::SegWit).unwrap().id;
        (wallet, backend, id)
    }

    #[test]
    fn addresses_are_sequential() {
        let (mut w, _, id) = wallet();
        let a = w.address_create(&id, false, false).unwrap();
        let b = w.address_create(&id, false, false).unwrap();
        assert_eq!((a.index, a.used), (0, false));
        assert_eq!(b.index, 1);
        assert_ne!(a.address, b.address);
    }

    #[test]
    fn rescan_with_no_activity_looks_up_depth_indexes() {
        let (mut w, backend, id) = wallet();
        let addresses = w.address_list(&id, true, 5).unwrap();
        assert_eq!(backend.lookups.load(Ordering::SeqCst), 5);
        assert!(addresses.is_empty());
        assert_eq!(w.contract_balance(&id, false, 0).unwrap().by_asset["btc"], 0);
    }

    #[test]
    fn duplicate_contract_rejected() {
        let (mut w, _, _) = wallet();
        let err = w.single_sig_create("again", &keychain("m/84'/1'/0'"), OuterCategory::SegWit).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn delete_refused_while_referenced() {
        let (mut w, _, id) = wallet();
        w.invoice_create(&InvoiceRequest::new(id, 1_000)).unwrap();
        assert_eq!(w.contract_delete(&id, false).unwrap_err().kind(), ErrorKind::ContractInUse);
        w.contract_delete(&id, true).unwrap();
        assert!(w.contract_list().is_empty());
    }

    #[test]
    fn unmark_reopens_last_address() {
        let (mut w, _, id) = wallet();
        let first = w.invoice_create(&InvoiceRequest::new(id, 1_000)).unwrap();
        assert!(w.contract(&id).unwrap().addresses[&0].used);
        let reopened = w.invoice_create(&InvoiceRequest { unmark: true, ..InvoiceRequest::new(id, 2_000) }).unwrap();
        assert_eq!(reopened.address_index, first.address_index);
        assert!(!w.contract(&id).unwrap().addresses[&0].used);
    }

    #[test]
    fn psbt_invoices_unsupported() {
        let (mut w, _, id) = wallet();
        let request = InvoiceRequest { category: InvoiceType::Psbt, ..InvoiceRequest::new(id, 1) };
        assert_eq!(w.invoice_create(&request).unwrap_err().kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn unknown_contract_is_not_found() {
        let (mut w, _, _) = wallet();
        let other = ContractId::commit(b"nothing");
        assert_eq!(w.address_create(&other, false, false).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn rename_keeps_id() {
        let (mut w, _, id) = wallet();
        let summary = w.contract_rename(&id, "daily").unwrap();
        assert_eq!(summary.id, id);
        assert_eq!(w.contract_list()[0].name, "daily");
    }
}
