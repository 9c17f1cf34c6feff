//! Derivation path syntax
//!
//! Accepts `m/84'/0'/0'/0/1`, `84h/0h/0h`, `m`, and a trailing `/*`
//! wildcard (stripped). Hardened markers: `'`, `h`, `H`.

use crate::error::{Error, Result};
use bitcoin::bip32::{ChildNumber, DerivationPath};
use std::fmt;
use std::str::FromStr;

const HARDENED: u32 = 1 << 31;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct KeyPath(Vec<ChildNumber>);

impl KeyPath {
    pub fn new(steps: Vec<ChildNumber>) -> Self { Self(steps) }

    pub fn steps(&self) -> &[ChildNumber] { &self.0 }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn has_hardened(&self) -> bool { self.0.iter().any(|c| c.is_hardened()) }

    /// Position of the first hardened step, if any.
    pub fn first_hardened(&self) -> Option<usize> { self.0.iter().position(|c| c.is_hardened()) }

    pub fn child(&self, index: ChildNumber) -> Self {
        let mut steps = self.0.clone();
        steps.push(index);
        Self(steps)
    }

    pub fn extend(&self, other: &KeyPath) -> Self {
        Self(self.0.iter().chain(other.0.iter()).copied().collect())
    }

    pub fn to_derivation_path(&self) -> DerivationPath { DerivationPath::from(self.0.clone()) }

    /// Unhardened indexes, or `HardenedFromPublic` for the first hardened step.
    pub fn unhardened_indexes(&self) -> Result<Vec<u32>> {
        self.0
            .iter()
            .map(|c| match c {
                ChildNumber::Normal { index } => Ok(*index),
                ChildNumber::Hardened { .. } => Err(Error::HardenedFromPublic),
            })
            .collect()
    }
}

impl From<DerivationPath> for KeyPath {
    fn from(path: DerivationPath) -> Self { Self(path.into_iter().copied().collect()) }
}

impl FromStr for KeyPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s.strip_suffix("/*").unwrap_or(s);
        let body = match s {
            "" | "m" | "M" => return Ok(Self::default()),
            _ => s.strip_prefix("m/").or_else(|| s.strip_prefix("M/")).unwrap_or(s),
        };

        let mut steps = Vec::new();
        for (pos, segment) in body.split('/').enumerate() {
            let (digits, hardened) = match segment.strip_suffix(['\'', 'h', 'H']) {
                Some(digits) => (digits, true),
                None => (segment, false),
            };
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::InvalidPath(format!("step {} `{}` is not an index", pos, segment)));
            }
            let index: u32 = digits
                .parse()
                .map_err(|_| Error::InvalidPath(format!("step {} `{}` is out of range", pos, segment)))?;
            if index >= HARDENED {
                return Err(Error::InvalidPath(format!("step {} index {} must be below 2^31", pos, index)));
            }
            steps.push(if hardened { ChildNumber::Hardened { index } } else { ChildNumber::Normal { index } });
        }
        Ok(Self(steps))
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for step in &self.0 {
            match step {
                ChildNumber::Normal { index } => write!(f, "/{}", index)?,
                ChildNumber::Hardened { index } => write!(f, "/{}'", index)?,
            }
        }
        Ok(())
    }
}
