//! Shared fixtures: the BIP39 test mnemonic and a scripted chain backend.

#![allow(dead_code)]

use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{Amount, NetworkKind, OutPoint, Script, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use strongbox::error::{Error, Result};
use strongbox::keys::{derive_master_key, keychain_create};
use strongbox::wallet::{ChainApi, ScriptActivity, UnspentOutput};

// "abandon" x11 + "about" - well-known test vector
pub const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

// BIP84 receive addresses for TEST_MNEMONIC
pub const MAINNET_ADDR_0: &str = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";
pub const TESTNET_ADDR_0: &str = "tb1q6rz28mcfaxtmd6v789l9rrlrusdprr9pqcpvkl";

pub fn master(network: NetworkKind) -> String {
    let mut words = TEST_MNEMONIC.to_string();
    derive_master_key(&mut words, &mut String::new(), false, network)
        .expect("valid mnemonic")
        .to_secret_string()
        .to_string()
}

pub fn keychain(network: NetworkKind, account: &str) -> String {
    keychain_create(&mut master(network), account, "0", false).expect("keychain").to_string()
}

/// Chain backend driven by the test: fund scripts, count lookups, capture broadcasts.
#[derive(Default)]
pub struct MockChain {
    pub lookups: AtomicUsize,
    activity: Mutex<HashMap<ScriptBuf, ScriptActivity>>,
    transactions: Mutex<HashMap<Txid, Transaction>>,
    pub broadcasts: Mutex<Vec<Transaction>>,
    funded: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self { Self::default() }

    /// Confirm a new output paying `value` to `script`.
    pub fn fund(&self, script: &Script, value: u64) -> OutPoint {
        let n = self.funded.fetch_add(1, Ordering::SeqCst) as u32;
        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::from_consensus(n),
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut { value: Amount::from_sat(value), script_pubkey: script.to_owned() }],
        };
        let outpoint = OutPoint::new(tx.compute_txid(), 0);
        self.transactions.lock().unwrap().insert(outpoint.txid, tx);
        let mut activity = self.activity.lock().unwrap();
        let entry = activity.entry(script.to_owned()).or_default();
        entry.used = true;
        entry.unspent.push(UnspentOutput { outpoint, value, height: Some(100 + n) });
        outpoint
    }

    /// Mark a script as seen on chain without leaving an unspent output.
    pub fn touch(&self, script: &Script) {
        self.activity.lock().unwrap().entry(script.to_owned()).or_default().used = true;
    }

    pub fn lookup_count(&self) -> usize { self.lookups.load(Ordering::SeqCst) }

    pub fn reset_lookups(&self) { self.lookups.store(0, Ordering::SeqCst) }
}

impl ChainApi for MockChain {
    fn lookup(&self, script: &Script) -> Result<ScriptActivity> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.activity.lock().unwrap().get(script).cloned().unwrap_or_default())
    }

    fn transaction(&self, txid: &Txid) -> Result<Transaction> {
        self.transactions
            .lock()
            .unwrap()
            .get(txid)
            .cloned()
            .ok_or_else(|| Error::Network(format!("unknown transaction {}", txid)))
    }

    fn broadcast(&self, tx: &Transaction) -> Result<Txid> {
        self.broadcasts.lock().unwrap().push(tx.clone());
        Ok(tx.compute_txid())
    }
}
