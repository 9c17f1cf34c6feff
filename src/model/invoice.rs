//! Invoices: payment requests issued by a contract
//!
//! | Form | When | Example |
//! |------|------|---------|
//! | BIP21 URI | address invoice, native coin | `bitcoin:bc1q...?amount=0.00010000&label=Shop` |
//! | bech32m `i1...` | everything else | JSON payload under the invoice prefix |
//!
//! ```text
//! created ──mark_paid──► paid ──accept──► accepted ──archive──► archived
//!    └──────────────────accept────────────────┘
//! ```

use super::ids::AssetId;
use crate::bech32::{self, Bech32Error, Category, Variant};
use crate::core::{hrp, Chain};
use crate::error::{Error, Result};
use bitcoin::{Amount, Denomination, ScriptBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    AddressUtxo,
    Descriptor,
    Psbt,
}

impl InvoiceType {
    pub fn tag(&self) -> u8 {
        match self { InvoiceType::AddressUtxo => 0, InvoiceType::Descriptor => 1, InvoiceType::Psbt => 2 }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(InvoiceType::AddressUtxo),
            1 => Ok(InvoiceType::Descriptor),
            2 => Ok(InvoiceType::Psbt),
            other => Err(Error::Unsupported(format!("invoice type {}", other))),
        }
    }
}

impl FromStr for InvoiceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "address" | "address_utxo" | "0" => Ok(InvoiceType::AddressUtxo),
            "descriptor" | "1" => Ok(InvoiceType::Descriptor),
            "psbt" | "2" => Ok(InvoiceType::Psbt),
            other => Err(Error::Unsupported(format!("invoice type `{}`", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceState {
    Created,
    Paid,
    Accepted,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Beneficiary {
    Address(String),
    /// Raw output script, hex.
    Script(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub category: InvoiceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<Chain>,
    pub beneficiary: Beneficiary,
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<AssetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

impl Invoice {
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| Error::from(Bech32Error::Payload(e.to_string())))
    }

    pub fn encode(&self) -> Result<String> {
        match (&self.category, &self.beneficiary, &self.asset) {
            (InvoiceType::AddressUtxo, Beneficiary::Address(address), None) => Ok(self.to_uri(address)),
            _ => {
                let payload = serde_json::to_vec(self).map_err(|e| Error::Internal(e.to_string()))?;
                Ok(bech32::encode(hrp::lnpbp::INVOICE, &payload, Variant::Bech32m)?)
            }
        }
    }

    fn to_uri(&self, address: &str) -> String {
        let mut uri = format!("bitcoin:{}", address);
        let mut query = Vec::new();
        if self.amount > 0 {
            query.push(format!("amount={}", format_btc_amount(self.amount)));
        }
        if let Some(label) = &self.merchant {
            query.push(format!("label={}", percent_encode(label)));
        }
        if let Some(message) = &self.purpose {
            query.push(format!("message={}", percent_encode(message)));
        }
        if !query.is_empty() {
            uri.push('?');
            uri.push_str(&query.join("&"));
        }
        uri
    }

    /// Accepts bech32m invoices, BIP21 URIs and bare addresses.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(rest) = s.get(..8).filter(|scheme| scheme.eq_ignore_ascii_case("bitcoin:")).and_then(|_| s.get(8..)) {
            return Self::parse_uri(rest);
        }
        if let Ok(address) = bitcoin::Address::from_str(s) {
            let address = address.assume_checked().to_string();
            return Ok(Self::address(address, 0));
        }
        let decoded = bech32::decode(s)?;
        if decoded.category != Category::LnpbpInvoice {
            return Err(Bech32Error::Unsupported(format!("`{}` is not an invoice", decoded.hrp)).into());
        }
        Self::from_payload(&decoded.payload)
    }

    fn address(address: String, amount: u64) -> Self {
        Self { category: InvoiceType::AddressUtxo, chain: None, beneficiary: Beneficiary::Address(address), amount, asset: None, merchant: None, purpose: None }
    }

    fn parse_uri(rest: &str) -> Result<Self> {
        let (address, query) = rest.split_once('?').unwrap_or((rest, ""));
        let address = bitcoin::Address::from_str(address)
            .map_err(|e| Error::MalformedString(format!("invoice address: {}", e)))?
            .assume_checked()
            .to_string();
        let mut invoice = Self::address(address, 0);
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = percent_decode(value)?;
            match key {
                "amount" => {
                    invoice.amount = Amount::from_str_in(&value, Denomination::Bitcoin)
                        .map_err(|e| Error::MalformedString(format!("invoice amount: {}", e)))?
                        .to_sat()
                }
                "label" => invoice.merchant = Some(value),
                "message" => invoice.purpose = Some(value),
                k if k.starts_with("req-") => return Err(Error::Unsupported(format!("required invoice parameter `{}`", k))),
                _ => {}
            }
        }
        Ok(invoice)
    }

    /// Output script to pay, checked against the paying chain.
    pub fn script_pubkey(&self, chain: Chain) -> Result<ScriptBuf> {
        if let Some(own) = self.chain {
            if own != chain {
                return Err(Error::ChainMismatch(format!("invoice is for {}, contract is on {}", own, chain)));
            }
        }
        match &self.beneficiary {
            Beneficiary::Address(address) => {
                let address = bitcoin::Address::from_str(address).map_err(|e| Error::MalformedString(e.to_string()))?;
                let address = address
                    .require_network(chain.network())
                    .map_err(|_| Error::ChainMismatch(format!("invoice address is not valid on {}", chain)))?;
                Ok(address.script_pubkey())
            }
            Beneficiary::Script(script) => {
                let bytes = hex::decode(script).map_err(|e| Error::MalformedString(format!("invoice script: {}", e)))?;
                Ok(ScriptBuf::from(bytes))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub encoded: String,
    pub invoice: Invoice,
    pub address_index: Option<u32>,
    pub state: InvoiceState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceRecord {
    pub fn new(invoice: Invoice, address_index: Option<u32>) -> Result<Self> {
        let now = Utc::now();
        Ok(Self { encoded: invoice.encode()?, invoice, address_index, state: InvoiceState::Created, created_at: now, updated_at: now })
    }

    fn set(&mut self, state: InvoiceState) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    /// Returns `true` when the state changed.
    pub fn mark_paid(&mut self) -> bool {
        if self.state != InvoiceState::Created {
            return false;
        }
        self.set(InvoiceState::Paid);
        true
    }

    /// Created or paid → accepted. Re-accepting is a no-op.
    pub fn accept(&mut self) -> Result<bool> {
        match self.state {
            InvoiceState::Created | InvoiceState::Paid => {
                self.set(InvoiceState::Accepted);
                Ok(true)
            }
            InvoiceState::Accepted => Ok(false),
            InvoiceState::Archived => Err(Error::InvalidState(format!("invoice {} is archived", self.encoded))),
        }
    }

    pub fn archive(&mut self) -> bool {
        if self.state == InvoiceState::Archived {
            return false;
        }
        self.set(InvoiceState::Archived);
        true
    }
}

fn format_btc_amount(amount_sat: u64) -> String {
    let whole = amount_sat / 100_000_000;
    let frac = amount_sat % 100_000_000;
    format!("{}.{:08}", whole, frac)
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for &b in value.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

fn percent_decode(value: &str) -> Result<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = value.get(i + 1..i + 3).ok_or_else(|| Error::MalformedString("truncated percent escape".into()))?;
                out.push(u8::from_str_radix(hex, 16).map_err(|_| Error::MalformedString(format!("bad percent escape `%{}`", hex)))?);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|e| Error::MalformedString(e.to_string()))
}
