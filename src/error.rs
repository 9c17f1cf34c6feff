//! Error taxonomy
//!
//! Every fallible operation returns [`Error`]. Each error belongs to exactly one
//! [`ErrorKind`], and each kind carries a stable numeric code that crosses the
//! boundary layer unchanged.
//!
//! | Code | Kind |
//! |------|------|
//! | 1 | null_argument |
//! | 2 | malformed_string |
//! | 3 | invalid_mnemonic |
//! | 4 | entropy_length |
//! | 5 | invalid_key |
//! | 6 | invalid_derivation_path |
//! | 7 | hardened_derivation |
//! | 8 | derivation_failure |
//! | 9 | malformed_psbt |
//! | 10 | signing_failure |
//! | 11 | bech32 |
//! | 12 | chain_mismatch |
//! | 13 | storage |
//! | 14 | network |
//! | 15 | unsupported |
//! | 16 | uninitialized |
//! | 17 | not_found |
//! | 18 | contract_in_use |
//! | 19 | insufficient_funds |
//! | 20 | invalid_state |
//! | 255 | internal |

use crate::bech32::Bech32Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NullArgument,
    MalformedString,
    InvalidMnemonic,
    EntropyLength,
    InvalidKey,
    InvalidDerivationPath,
    HardenedDerivation,
    DerivationFailure,
    MalformedPsbt,
    SigningFailure,
    Bech32,
    ChainMismatch,
    Storage,
    Network,
    Unsupported,
    Uninitialized,
    NotFound,
    ContractInUse,
    InsufficientFunds,
    InvalidState,
    Internal,
}

impl ErrorKind {
    pub fn code(&self) -> u16 {
        match self {
            ErrorKind::NullArgument => 1,
            ErrorKind::MalformedString => 2,
            ErrorKind::InvalidMnemonic => 3,
            ErrorKind::EntropyLength => 4,
            ErrorKind::InvalidKey => 5,
            ErrorKind::InvalidDerivationPath => 6,
            ErrorKind::HardenedDerivation => 7,
            ErrorKind::DerivationFailure => 8,
            ErrorKind::MalformedPsbt => 9,
            ErrorKind::SigningFailure => 10,
            ErrorKind::Bech32 => 11,
            ErrorKind::ChainMismatch => 12,
            ErrorKind::Storage => 13,
            ErrorKind::Network => 14,
            ErrorKind::Unsupported => 15,
            ErrorKind::Uninitialized => 16,
            ErrorKind::NotFound => 17,
            ErrorKind::ContractInUse => 18,
            ErrorKind::InsufficientFunds => 19,
            ErrorKind::InvalidState => 20,
            ErrorKind::Internal => 255,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NullArgument => "null_argument",
            ErrorKind::MalformedString => "malformed_string",
            ErrorKind::InvalidMnemonic => "invalid_mnemonic",
            ErrorKind::EntropyLength => "entropy_length",
            ErrorKind::InvalidKey => "invalid_key",
            ErrorKind::InvalidDerivationPath => "invalid_derivation_path",
            ErrorKind::HardenedDerivation => "hardened_derivation",
            ErrorKind::DerivationFailure => "derivation_failure",
            ErrorKind::MalformedPsbt => "malformed_psbt",
            ErrorKind::SigningFailure => "signing_failure",
            ErrorKind::Bech32 => "bech32",
            ErrorKind::ChainMismatch => "chain_mismatch",
            ErrorKind::Storage => "storage",
            ErrorKind::Network => "network",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Uninitialized => "uninitialized",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ContractInUse => "contract_in_use",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("argument `{0}` must not be null")]
    NullArgument(&'static str),
    #[error("malformed string: {0}")]
    MalformedString(String),
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),
    #[error("a {words}-word mnemonic needs {expected} bytes of entropy, got {actual}")]
    EntropyLength { words: usize, expected: usize, actual: usize },
    #[error("wrong extended key: {0}")]
    InvalidKey(String),
    #[error("invalid derivation path: {0}")]
    InvalidPath(String),
    #[error("unable to derive hardened path from a public key")]
    HardenedFromPublic,
    #[error("key derivation failure: {0}")]
    Derivation(String),
    #[error("malformed PSBT: {0}")]
    MalformedPsbt(String),
    #[error("signing failure: {0}")]
    Signing(String),
    #[error(transparent)]
    Bech32(#[from] Bech32Error),
    #[error("chain mismatch: {0}")]
    ChainMismatch(String),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("session is not initialized or already closed")]
    Uninitialized,
    #[error("unknown {what} `{id}`")]
    NotFound { what: &'static str, id: String },
    #[error("contract {0} still has invoices or used addresses; use force to delete")]
    ContractInUse(String),
    #[error("insufficient funds: need {required} sat, have {available} sat")]
    InsufficientFunds { required: u64, available: u64 },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NullArgument(_) => ErrorKind::NullArgument,
            Error::MalformedString(_) => ErrorKind::MalformedString,
            Error::InvalidMnemonic(_) => ErrorKind::InvalidMnemonic,
            Error::EntropyLength { .. } => ErrorKind::EntropyLength,
            Error::InvalidKey(_) => ErrorKind::InvalidKey,
            Error::InvalidPath(_) => ErrorKind::InvalidDerivationPath,
            Error::HardenedFromPublic => ErrorKind::HardenedDerivation,
            Error::Derivation(_) => ErrorKind::DerivationFailure,
            Error::MalformedPsbt(_) => ErrorKind::MalformedPsbt,
            Error::Signing(_) => ErrorKind::SigningFailure,
            Error::Bech32(_) => ErrorKind::Bech32,
            Error::ChainMismatch(_) => ErrorKind::ChainMismatch,
            Error::Storage(_) => ErrorKind::Storage,
            Error::Network(_) => ErrorKind::Network,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Uninitialized => ErrorKind::Uninitialized,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::ContractInUse(_) => ErrorKind::ContractInUse,
            Error::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> u16 { self.kind().code() }

    pub(crate) fn not_found(what: &'static str, id: impl ToString) -> Self {
        Error::NotFound { what, id: id.to_string() }
    }
}

impl From<bip39::Error> for Error {
    fn from(err: bip39::Error) -> Self { Error::InvalidMnemonic(err.to_string()) }
}

impl From<bitcoin::bip32::Error> for Error {
    fn from(err: bitcoin::bip32::Error) -> Self {
        use bitcoin::bip32::Error as Bip32;
        match err {
            Bip32::CannotDeriveFromHardenedKey => Error::HardenedFromPublic,
            Bip32::InvalidChildNumber(_)
            | Bip32::InvalidChildNumberFormat
            | Bip32::InvalidDerivationPathFormat => Error::InvalidPath(err.to_string()),
            Bip32::Base58(_) | Bip32::UnknownVersion(_) | Bip32::WrongExtendedKeyLength(_) => {
                Error::InvalidKey(err.to_string())
            }
            other => Error::Derivation(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self { Error::Storage(err.to_string()) }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self { Error::Storage(err.to_string()) }
}
