//! Address records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub index: u32,
    pub address: String,
    pub legacy: bool,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl AddressRecord {
    pub fn new(index: u32, address: String, legacy: bool, used: bool) -> Self {
        Self { index, address, legacy, used, created_at: Utc::now() }
    }
}
