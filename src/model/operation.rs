//! Unspent outputs and the contract's payment history

use bitcoin::{OutPoint, Txid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub value: u64,
    /// Confirmation height, `None` while in the mempool.
    pub height: Option<u32>,
    /// Derivation index of the receiving address.
    pub index: u32,
    #[serde(default)]
    pub legacy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub txid: Txid,
    pub beneficiary: String,
    pub amount: u64,
    pub fee: u64,
    pub change: u64,
    pub giveaway: u64,
    pub invoice: Option<String>,
    pub psbt: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}
