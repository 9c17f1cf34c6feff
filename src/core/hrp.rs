//! Human-readable prefix registry
//!
//! Centralized list of every bech32 prefix the wallet produces or recognizes,
//! and the payload category each maps to.

/// Chain address prefixes (segwit).
pub mod address {
    pub const BITCOIN: &str = "bc";
    pub const TESTNET: &str = "tb";
    pub const REGTEST: &str = "bcrt";

    pub const ALL: &[&str] = &[BITCOIN, TESTNET, REGTEST];
}

/// Lightning BOLT11 invoice prefixes.
pub mod lightning {
    pub const BITCOIN: &str = "lnbc";
    pub const TESTNET: &str = "lntb";
    pub const SIGNET: &str = "lntbs";
    pub const REGTEST: &str = "lnbcrt";

    pub const ALL: &[&str] = &[REGTEST, SIGNET, BITCOIN, TESTNET];
}

/// Generic identifiers and data containers.
pub mod lnpbp {
    pub const ID: &str = "id";
    pub const DATA: &str = "data";
    pub const ZDATA: &str = "z";
    pub const INVOICE: &str = "i";
    pub const URL: &str = "url";
}

/// Asset protocol identifiers and containers.
pub mod rgb {
    pub const SCHEMA_ID: &str = "sch";
    pub const CONTRACT_ID: &str = "rgb";
    pub const SCHEMA: &str = "schema";
    pub const GENESIS: &str = "genesis";
    pub const CONSIGNMENT: &str = "consignment";
}
