//! Wallet state persistence
//!
//! One JSON document per chain: `<data_dir>/wallet.json`. Writes go to a
//! sibling temp file first and are renamed into place, so a crash mid-write
//! leaves the previous state intact. Private keys are never part of it.

use crate::core::Chain;
use crate::error::{Error, Result};
use crate::model::{Asset, Contract};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const STATE_FILE: &str = "wallet.json";
pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletState {
    pub version: u32,
    pub chain: Chain,
    #[serde(default)]
    pub contracts: Vec<Contract>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl WalletState {
    pub fn new(chain: Chain) -> Self { Self { version: STATE_VERSION, chain, contracts: Vec::new(), assets: Vec::new() } }
}

pub trait Store: Send {
    /// Stored state, or a fresh one when nothing was saved yet.
    fn load(&self, chain: Chain) -> Result<WalletState>;

    fn save(&self, state: &WalletState) -> Result<()>;
}

fn check_chain(state: WalletState, chain: Chain) -> Result<WalletState> {
    if state.chain != chain {
        return Err(Error::ChainMismatch(format!("stored wallet is for {}, session is {}", state.chain, chain)));
    }
    if state.version > STATE_VERSION {
        return Err(Error::Storage(format!("wallet format version {} is newer than {}", state.version, STATE_VERSION)));
    }
    Ok(state)
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| Error::Storage(format!("{}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> PathBuf { self.dir.join(STATE_FILE) }
}

impl Store for FileStore {
    fn load(&self, chain: Chain) -> Result<WalletState> {
        let path = self.path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no stored wallet, starting empty");
            return Ok(WalletState::new(chain));
        }
        let data = fs::read(&path)?;
        check_chain(serde_json::from_slice(&data)?, chain)
    }

    fn save(&self, state: &WalletState) -> Result<()> {
        let path = self.path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&tmp, &path)?;
        tracing::debug!(path = %path.display(), contracts = state.contracts.len(), "wallet saved");
        Ok(())
    }
}

/// In-memory store; clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<Option<WalletState>>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn snapshot(&self) -> Option<WalletState> { self.state.lock().ok().and_then(|s| s.clone()) }
}

impl Store for MemoryStore {
    fn load(&self, chain: Chain) -> Result<WalletState> {
        let state = self.state.lock().map_err(|_| Error::Storage("memory store poisoned".into()))?;
        match state.clone() {
            Some(state) => check_chain(state, chain),
            None => Ok(WalletState::new(chain)),
        }
    }

    fn save(&self, state: &WalletState) -> Result<()> {
        let mut slot = self.state.lock().map_err(|_| Error::Storage("memory store poisoned".into()))?;
        *slot = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("nested")).unwrap();
        let fresh = store.load(Chain::Testnet).unwrap();
        assert!(fresh.contracts.is_empty());
        store.save(&fresh).unwrap();
        assert!(store.path().exists());
        assert_eq!(store.load(Chain::Testnet).unwrap().chain, Chain::Testnet);
    }

    #[test]
    fn chain_is_checked_on_load() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.save(&WalletState::new(Chain::Signet)).unwrap();
        assert_eq!(store.load(Chain::Bitcoin).unwrap_err().kind(), ErrorKind::ChainMismatch);
    }

    #[test]
    fn corrupt_file_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        fs::write(store.path(), b"{ not json").unwrap();
        assert_eq!(store.load(Chain::Bitcoin).unwrap_err().kind(), ErrorKind::Storage);
    }

    #[test]
    fn memory_store_shares_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.save(&WalletState::new(Chain::Regtest)).unwrap();
        assert_eq!(other.snapshot().unwrap().chain, Chain::Regtest);
    }
}
