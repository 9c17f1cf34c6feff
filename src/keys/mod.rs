//! Keys - mnemonic, seed and HD derivation engines
//!
//! ```text
//! entropy ──create_mnemonic──► mnemonic ──derive_master_key──► master xpriv
//!                                                                 │
//!                                   derive_private / derive_public │ (path)
//!                                                                 ▼
//!                                                      child xpriv / xpub
//!                                                                 │
//!                                                  keychain_create │
//!                                                                 ▼
//!                                         [fp/84'/0'/0']xpub.../0/*  (contract key chain)
//! ```
//!
//! Every function taking a secret as `&mut String` honors a `wipe` flag: when
//! set, the caller's buffer is zeroized before the function returns, on the
//! error path too.

pub mod derive;
pub mod keychain;
pub mod mnemonic;
pub mod path;

pub use derive::{derive_private, derive_public, parse_extended_key, xpriv_to_xpub, ExtendedKey, ExtendedPrivKey};
pub use keychain::{keychain_create, KeyOrigin, Keychain};
pub use mnemonic::{create_mnemonic, derive_master_key, mnemonic_entropy, random_mnemonic, WordCount};
pub use path::KeyPath;

use zeroize::Zeroize;

/// Run `f`, then wipe `secrets` if asked, whatever `f` returned.
pub(crate) fn with_wipe<T>(secrets: &mut [&mut String], wipe: bool, f: impl FnOnce(&[&str]) -> T) -> T {
    let result = {
        let views: Vec<&str> = secrets.iter().map(|s| s.as_str()).collect();
        f(&views)
    };
    if wipe {
        for secret in secrets.iter_mut() {
            secret.zeroize();
        }
    }
    result
}
