//! Core vocabulary shared by every engine: which chain we are on and which
//! human-readable prefixes mean what.

pub mod chain;
pub mod hrp;

pub use chain::Chain;
