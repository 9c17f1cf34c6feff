//! Wallet data model
//!
//! ```text
//! Contract ──► Policy ──► Keychain(s)
//!    ├── addresses   BTreeMap<index, AddressRecord>
//!    ├── invoices    Vec<InvoiceRecord>
//!    ├── unspent     Vec<Utxo>          (cache, replaced on rescan)
//!    └── operations  Vec<Operation>     (composed payments)
//! Asset (imported genesis, wallet-global)
//! ```

mod address;
mod asset;
mod contract;
mod ids;
mod invoice;
mod operation;

pub use address::AddressRecord;
pub use asset::{Asset, Genesis};
pub use contract::{Balance, Contract, ContractSummary, DerivedScript, OuterCategory, Policy, PolicyType, ScriptKind, NATIVE_ASSET};
pub use ids::{tagged_hash, AssetId, ContractId};
pub use invoice::{Beneficiary, Invoice, InvoiceRecord, InvoiceState, InvoiceType};
pub use operation::{Operation, Utxo};
