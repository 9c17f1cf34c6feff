//! Strongbox: local HD wallet engine. Keys in, PSBTs out, state on disk.
//!
//! # Architecture
//!
//! ```text
//! api (Outcome + OwnedString, wipe-on-return secrets)
//!   │
//!   ├── keys      mnemonic ─► master xpriv ─► derive ─► keychain
//!   ├── signer    base64 PSBT ─► ECDSA / taproot key-path sigs ─► finalize
//!   ├── bech32    decode + classify any bech32/bech32m string
//!   │
//!   └── Session (worker thread, one per chain)
//!         └── Wallet
//!               ├── Contract ─► AddressRecord, InvoiceRecord, Operation, Utxo
//!               ├── Store     (wallet.json, tmp + rename)
//!               └── ChainApi  (Electrum: lookup, transaction, broadcast)
//! ```
//!
//! # Stateless primitives
//!
//! | Operation | Function |
//! |-----------|----------|
//! | mnemonic from entropy | [`keys::create_mnemonic`] |
//! | entropy from mnemonic | [`keys::mnemonic_entropy`] |
//! | master key | [`keys::derive_master_key`] |
//! | child private / public | [`keys::derive_private`], [`keys::derive_public`] |
//! | account key chain | [`keys::keychain_create`] |
//! | sign PSBT | [`signer::sign_psbt`] |
//! | bech32 info | [`bech32::info`] |
//!
//! # Features
//!
//! - `electrum` (default) - Electrum backend for [`Session::open`]
//!
//! # Usage
//!
//! ```ignore
//! use strongbox::{Chain, Session, SessionConfig};
//! use strongbox::model::OuterCategory;
//!
//! let session = Session::open(SessionConfig::new(Chain::Testnet))?;
//! let contract = session.single_sig_create("daily", &keychain, OuterCategory::SegWit)?;
//! let addresses = session.address_list(&contract.id.to_string(), true, 20)?;
//! session.close()?;
//! ```

pub mod api;
pub mod bech32;
pub mod core;
pub mod error;
pub mod keys;
pub mod logging;
pub mod model;
pub mod session;
pub mod signer;
pub mod wallet;

pub use crate::core::Chain;
pub use error::{Error, ErrorKind, Result};
pub use session::{Session, SessionConfig};
pub use wallet::Wallet;
