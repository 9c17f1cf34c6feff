//! Chain backend: script lookups and transaction broadcast
//!
//! The wallet only needs three things from the outside world, so that is
//! all [`ChainApi`] asks for. The Electrum implementation sits behind the
//! `electrum` feature; tests and embedders can bring their own.

use crate::error::Result;
use bitcoin::{OutPoint, Script, Transaction, Txid};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentOutput {
    pub outpoint: OutPoint,
    pub value: u64,
    pub height: Option<u32>,
}

/// What the chain knows about one output script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptActivity {
    /// Any transaction ever paid to or spent from the script.
    pub used: bool,
    pub unspent: Vec<UnspentOutput>,
}

pub trait ChainApi: Send {
    fn lookup(&self, script: &Script) -> Result<ScriptActivity>;

    fn transaction(&self, txid: &Txid) -> Result<Transaction>;

    fn broadcast(&self, tx: &Transaction) -> Result<Txid>;
}

impl<T: ChainApi + ?Sized> ChainApi for Box<T> {
    fn lookup(&self, script: &Script) -> Result<ScriptActivity> { (**self).lookup(script) }

    fn transaction(&self, txid: &Txid) -> Result<Transaction> { (**self).transaction(txid) }

    fn broadcast(&self, tx: &Transaction) -> Result<Txid> { (**self).broadcast(tx) }
}

impl<T: ChainApi + Sync + ?Sized> ChainApi for Arc<T> {
    fn lookup(&self, script: &Script) -> Result<ScriptActivity> { (**self).lookup(script) }

    fn transaction(&self, txid: &Txid) -> Result<Transaction> { (**self).transaction(txid) }

    fn broadcast(&self, tx: &Transaction) -> Result<Txid> { (**self).broadcast(tx) }
}

#[cfg(feature = "electrum")]
mod electrum {
    use super::*;
    use crate::error::Error;
    use bdk_electrum::electrum_client::{Client, ElectrumApi};

    pub struct ElectrumBackend {
        client: Client,
        url: String,
    }

    impl ElectrumBackend {
        pub fn connect(url: &str) -> Result<Self> {
            let client = Client::new(url).map_err(|e| Error::Network(format!("electrum {}: {}", url, e)))?;
            tracing::info!(%url, "connected to electrum");
            Ok(Self { client, url: url.to_string() })
        }

        fn err(&self, e: impl std::fmt::Display) -> Error { Error::Network(format!("electrum {}: {}", self.url, e)) }
    }

    impl ChainApi for ElectrumBackend {
        fn lookup(&self, script: &Script) -> Result<ScriptActivity> {
            let history = self.client.script_get_history(script).map_err(|e| self.err(e))?;
            if history.is_empty() {
                return Ok(ScriptActivity::default());
            }
            let unspent = self
                .client
                .script_list_unspent(script)
                .map_err(|e| self.err(e))?
                .into_iter()
                .map(|u| UnspentOutput {
                    outpoint: OutPoint::new(u.tx_hash, u.tx_pos as u32),
                    value: u.value,
                    height: (u.height > 0).then_some(u.height as u32),
                })
                .collect();
            Ok(ScriptActivity { used: true, unspent })
        }

        fn transaction(&self, txid: &Txid) -> Result<Transaction> {
            self.client.transaction_get(txid).map_err(|e| self.err(e))
        }

        fn broadcast(&self, tx: &Transaction) -> Result<Txid> {
            self.client.transaction_broadcast(tx).map_err(|e| self.err(e))
        }
    }
}

#[cfg(feature = "electrum")]
pub use electrum::ElectrumBackend;
