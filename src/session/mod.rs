//! Client session: one worker thread owning the wallet
//!
//! ```text
//! Session (Clone) ──┐
//! Session (Clone) ──┼── mpsc<Job> ──► worker thread ──► &mut Wallet
//! Session (Clone) ──┘                    │
//!         ▲                              │ catch_unwind per job,
//!         └────── per-call reply ◄───────┘ reload from store on panic
//! ```
//!
//! Operations are serialized by the worker, so two calls never touch the
//! same contract at once. `close()` drops the job channel for every clone
//! and joins the worker; any later call returns `Uninitialized`.

pub mod config;

pub use config::SessionConfig;

use crate::core::Chain;
use crate::error::{Error, Result};
use crate::model::{AddressRecord, Asset, Balance, ContractId, ContractSummary, InvoiceRecord, Operation, OuterCategory};
use crate::wallet::{ChainApi, FileStore, InvoiceRequest, PreparedPayment, RescanReport, Store, Wallet};
use bitcoin::Txid;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

type Job = Box<dyn FnOnce(&mut Wallet) + Send>;

struct Inner {
    chain: Chain,
    timeout: Option<Duration>,
    jobs: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Open the file store under the configured data dir and connect to Electrum.
    #[cfg(feature = "electrum")]
    pub fn open(config: SessionConfig) -> Result<Self> {
        let store = FileStore::open(config.resolved_data_dir())?;
        let backend = crate::wallet::ElectrumBackend::connect(config.resolved_electrum())?;
        Self::with_parts(config, Box::new(store), Box::new(backend))
    }

    #[cfg(not(feature = "electrum"))]
    pub fn open(config: SessionConfig) -> Result<Self> {
        let _ = FileStore::open(config.resolved_data_dir())?;
        Err(Error::Unsupported("built without the electrum backend; use Session::with_parts".into()))
    }

    pub fn with_parts(config: SessionConfig, store: Box<dyn Store>, backend: Box<dyn ChainApi>) -> Result<Self> {
        let wallet = Wallet::open(config.chain, config.lookup_depth, store, backend)?;
        let (jobs, queue) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name(format!("strongbox-{}", config.chain))
            .spawn(move || run(wallet, queue))
            .map_err(|e| Error::Internal(format!("spawn worker: {}", e)))?;
        tracing::info!(chain = %config.chain, "session opened");
        Ok(Self {
            inner: Arc::new(Inner {
                chain: config.chain,
                timeout: config.timeout,
                jobs: Mutex::new(Some(jobs)),
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    pub fn chain(&self) -> Chain { self.inner.chain }

    pub fn is_open(&self) -> bool { self.inner.jobs.lock().map(|j| j.is_some()).unwrap_or(false) }

    /// Stop the worker. Idempotent; every clone is invalidated.
    pub fn close(&self) -> Result<()> {
        let jobs = self.inner.jobs.lock().map_err(|_| Error::Internal("session lock poisoned".into()))?.take();
        if jobs.is_none() {
            return Ok(());
        }
        drop(jobs);
        let worker = self.inner.worker.lock().map_err(|_| Error::Internal("session lock poisoned".into()))?.take();
        if let Some(worker) = worker {
            worker.join().map_err(|_| Error::Internal("worker thread panicked".into()))?;
        }
        tracing::info!(chain = %self.inner.chain, "session closed");
        Ok(())
    }

    /// Run `f` on the worker and wait for its result.
    pub fn with_wallet<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Wallet) -> Result<T> + Send + 'static,
    {
        let jobs = self
            .inner
            .jobs
            .lock()
            .map_err(|_| Error::Internal("session lock poisoned".into()))?
            .clone()
            .ok_or(Error::Uninitialized)?;
        let (reply, answer) = mpsc::channel();
        let job: Job = Box::new(move |wallet| {
            let _ = reply.send(f(wallet));
        });
        jobs.send(job).map_err(|_| Error::Uninitialized)?;

        let aborted = || Error::Internal("operation aborted; wallet state was reloaded".into());
        match self.inner.timeout {
            Some(timeout) => match answer.recv_timeout(timeout) {
                Ok(result) => result,
                Err(RecvTimeoutError::Timeout) => Err(Error::Network(format!("timed out after {:?}", timeout))),
                Err(RecvTimeoutError::Disconnected) => Err(aborted()),
            },
            None => answer.recv().map_err(|_| aborted())?,
        }
    }

    // ---------------------------------------------------------------- contracts

    pub fn contract_list(&self) -> Result<Vec<ContractSummary>> { self.with_wallet(|w| Ok(w.contract_list())) }

    pub fn single_sig_create(&self, name: &str, keychain: &str, category: OuterCategory) -> Result<ContractSummary> {
        let (name, keychain) = (name.to_string(), keychain.to_string());
        self.with_wallet(move |w| w.single_sig_create(&name, &keychain, category))
    }

    pub fn multi_sig_create(&self, name: &str, threshold: u8, keychains: Vec<String>, category: OuterCategory) -> Result<ContractSummary> {
        let name = name.to_string();
        self.with_wallet(move |w| w.multi_sig_create(&name, threshold, &keychains, category))
    }

    pub fn contract_rename(&self, id: &str, name: &str) -> Result<ContractSummary> {
        let (id, name) = (ContractId::from_str(id)?, name.to_string());
        self.with_wallet(move |w| w.contract_rename(&id, &name))
    }

    pub fn contract_delete(&self, id: &str, force: bool) -> Result<()> {
        let id = ContractId::from_str(id)?;
        self.with_wallet(move |w| w.contract_delete(&id, force))
    }

    pub fn contract_rescan(&self, id: &str, depth: u8) -> Result<RescanReport> {
        let id = ContractId::from_str(id)?;
        self.with_wallet(move |w| w.contract_rescan(&id, depth))
    }

    pub fn contract_balance(&self, id: &str, rescan: bool, depth: u8) -> Result<Balance> {
        let id = ContractId::from_str(id)?;
        self.with_wallet(move |w| w.contract_balance(&id, rescan, depth))
    }

    pub fn contract_operations(&self, id: &str) -> Result<Vec<Operation>> {
        let id = ContractId::from_str(id)?;
        self.with_wallet(move |w| w.contract_operations(&id))
    }

    // ---------------------------------------------------------------- addresses

    pub fn address_list(&self, id: &str, rescan: bool, depth: u8) -> Result<Vec<AddressRecord>> {
        let id = ContractId::from_str(id)?;
        self.with_wallet(move |w| w.address_list(&id, rescan, depth))
    }

    pub fn address_create(&self, id: &str, mark_used: bool, legacy: bool) -> Result<AddressRecord> {
        let id = ContractId::from_str(id)?;
        self.with_wallet(move |w| w.address_create(&id, mark_used, legacy))
    }

    // ----------------------------------------------------------------- invoices

    pub fn invoice_create(&self, request: InvoiceRequest) -> Result<InvoiceRecord> {
        self.with_wallet(move |w| w.invoice_create(&request))
    }

    pub fn invoice_list(&self, id: &str) -> Result<Vec<InvoiceRecord>> {
        let id = ContractId::from_str(id)?;
        self.with_wallet(move |w| w.invoice_list(&id))
    }

    pub fn invoice_pay(&self, id: &str, invoice: &str, fee: u64, giveaway: Option<u64>) -> Result<PreparedPayment> {
        let (id, invoice) = (ContractId::from_str(id)?, invoice.to_string());
        self.with_wallet(move |w| w.invoice_pay(&id, &invoice, fee, giveaway))
    }

    pub fn invoice_accept(&self, id: &str, invoice: &str) -> Result<InvoiceRecord> {
        let (id, invoice) = (ContractId::from_str(id)?, invoice.to_string());
        self.with_wallet(move |w| w.invoice_accept(&id, &invoice))
    }

    pub fn invoice_archive(&self, id: &str, invoice: &str) -> Result<InvoiceRecord> {
        let (id, invoice) = (ContractId::from_str(id)?, invoice.to_string());
        self.with_wallet(move |w| w.invoice_archive(&id, &invoice))
    }

    // ------------------------------------------------------------ assets & psbt

    pub fn asset_list(&self) -> Result<Vec<Asset>> { self.with_wallet(|w| Ok(w.asset_list())) }

    pub fn asset_import(&self, genesis: &str) -> Result<Asset> {
        let genesis = genesis.to_string();
        self.with_wallet(move |w| w.asset_import(&genesis))
    }

    pub fn psbt_publish(&self, psbt: &str) -> Result<Txid> {
        let psbt = psbt.to_string();
        self.with_wallet(move |w| w.psbt_publish(&psbt))
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.take();
        }
    }
}

fn run(mut wallet: Wallet, queue: Receiver<Job>) {
    for job in queue {
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| job(&mut wallet))) {
            tracing::error!(panic = %panic_message(panic.as_ref()), "wallet operation panicked; reloading state");
            if let Err(err) = wallet.reload() {
                tracing::error!(error = %err, "reload after panic failed");
            }
        }
    }
    tracing::debug!(chain = %wallet.chain(), "worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}
