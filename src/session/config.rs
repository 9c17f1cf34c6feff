//! Session configuration - passed from higher layers

use crate::core::Chain;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LOOKUP_DEPTH: u8 = 20;
pub const ROOT_ENV: &str = "STRONGBOX_ROOT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub chain: Chain,
    pub data_dir: Option<PathBuf>,
    pub electrum_url: Option<String>,
    pub lookup_depth: u8,
    /// Upper bound on waiting for one reply from the worker.
    pub timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self { Self::new(Chain::default()) }
}

impl SessionConfig {
    pub fn new(chain: Chain) -> Self {
        Self { chain, data_dir: None, electrum_url: None, lookup_depth: DEFAULT_LOOKUP_DEPTH, timeout: None }
    }
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self { self.data_dir = Some(path.into()); self }
    pub fn with_electrum(mut self, url: impl Into<String>) -> Self { self.electrum_url = Some(url.into()); self }
    pub fn with_lookup_depth(mut self, depth: u8) -> Self { self.lookup_depth = depth; self }
    pub fn with_timeout(mut self, timeout: Duration) -> Self { self.timeout = Some(timeout); self }

    /// `$STRONGBOX_ROOT/<chain>`, else the platform data dir.
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        let root = std::env::var(ROOT_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("strongbox"));
        root.join(self.chain.as_str())
    }

    pub fn resolved_electrum(&self) -> &str { self.electrum_url.as_deref().unwrap_or(self.chain.default_electrum()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::Mutex;

    static ENV: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    #[test]
    fn explicit_dir_wins() {
        let config = SessionConfig::new(Chain::Testnet).with_data_dir("/tmp/x");
        assert_eq!(config.resolved_data_dir(), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn root_env_is_honored() {
        let _guard = ENV.lock().unwrap();
        std::env::set_var(ROOT_ENV, "/srv/strongbox");
        let dir = SessionConfig::new(Chain::Signet).resolved_data_dir();
        std::env::remove_var(ROOT_ENV);
        assert_eq!(dir, PathBuf::from("/srv/strongbox/signet"));
    }

    #[test]
    fn defaults() {
        let config = SessionConfig::new(Chain::Regtest);
        assert_eq!(config.lookup_depth, DEFAULT_LOOKUP_DEPTH);
        assert_eq!(config.resolved_electrum(), "tcp://127.0.0.1:50001");
        assert!(config.timeout.is_none());
    }
}
