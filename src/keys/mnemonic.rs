//! Mnemonic & seed engine (BIP39)

use super::derive::ExtendedPrivKey;
use super::with_wipe;
use crate::error::{Error, Result};
use bip39::Mnemonic;
use bitcoin::bip32::Xpriv;
use bitcoin::NetworkKind;
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, Zeroizing};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordCount {
    Words12,
    Words15,
    Words18,
    Words21,
    Words24,
}

impl WordCount {
    pub const ALL: [WordCount; 5] = [WordCount::Words12, WordCount::Words15, WordCount::Words18, WordCount::Words21, WordCount::Words24];

    pub const fn words(self) -> usize {
        match self {
            WordCount::Words12 => 12,
            WordCount::Words15 => 15,
            WordCount::Words18 => 18,
            WordCount::Words21 => 21,
            WordCount::Words24 => 24,
        }
    }

    pub const fn entropy_bytes(self) -> usize { self.words() * 4 / 3 }

    pub fn from_words(words: usize) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|w| w.words() == words)
            .ok_or_else(|| Error::InvalidMnemonic(format!("unsupported word count {}", words)))
    }
}

pub fn create_mnemonic(entropy: &[u8], words: WordCount) -> Result<Zeroizing<String>> {
    if entropy.len() != words.entropy_bytes() {
        return Err(Error::EntropyLength { words: words.words(), expected: words.entropy_bytes(), actual: entropy.len() });
    }
    let mnemonic = Mnemonic::from_entropy(entropy)?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

/// New mnemonic from OS randomness.
pub fn random_mnemonic(words: WordCount) -> Result<Zeroizing<String>> {
    let mut entropy = [0u8; 32];
    let len = words.entropy_bytes();
    OsRng.fill_bytes(&mut entropy[..len]);
    let result = create_mnemonic(&entropy[..len], words);
    entropy.zeroize();
    result
}

pub fn mnemonic_entropy(phrase: &str) -> Result<Zeroizing<Vec<u8>>> {
    let mnemonic = Mnemonic::parse_normalized(phrase)?;
    Ok(Zeroizing::new(mnemonic.to_entropy()))
}

/// Mnemonic + passphrase → BIP39 seed → BIP32 master key.
///
/// `network` only selects the version bytes of the serialized key (`xprv` vs `tprv`).
pub fn derive_master_key(mnemonic: &mut String, passphrase: &mut String, wipe: bool, network: NetworkKind) -> Result<ExtendedPrivKey> {
    with_wipe(&mut [mnemonic, passphrase], wipe, |secrets| {
        let mnemonic = Mnemonic::parse_normalized(secrets[0])?;
        let seed = Zeroizing::new(mnemonic.to_seed(secrets[1]));
        let xpriv = Xpriv::new_master(network, &seed[..]).map_err(|e| Error::Derivation(e.to_string()))?;
        tracing::debug!(words = mnemonic.word_count(), ?network, "master key derived");
        Ok(ExtendedPrivKey::new(xpriv))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn zero_entropy_vector() {
        assert_eq!(create_mnemonic(&[0u8; 16], WordCount::Words12).unwrap().as_str(), ABANDON);
    }

    #[test]
    fn entropy_roundtrip_for_every_size() {
        for words in WordCount::ALL {
            let entropy: Vec<u8> = (0..words.entropy_bytes() as u8).map(|b| b.wrapping_mul(37)).collect();
            let phrase = create_mnemonic(&entropy, words).unwrap();
            assert_eq!(phrase.split_whitespace().count(), words.words());
            assert_eq!(mnemonic_entropy(&phrase).unwrap().as_slice(), entropy.as_slice());
        }
    }

    #[test]
    fn wrong_entropy_length() {
        let err = create_mnemonic(&[0u8; 17], WordCount::Words12).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EntropyLength);
        let err = create_mnemonic(&[0u8; 16], WordCount::Words24).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EntropyLength);
    }

    #[test]
    fn bad_checksum_is_invalid_mnemonic() {
        let mut phrase = ABANDON.replace("about", "abandon");
        let err = derive_master_key(&mut phrase, &mut String::new(), false, NetworkKind::Test).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMnemonic);
    }

    #[test]
    fn wipe_clears_buffers_even_on_error() {
        let mut phrase = String::from("not a mnemonic");
        let mut pass = String::from("secret");
        assert!(derive_master_key(&mut phrase, &mut pass, true, NetworkKind::Main).is_err());
        assert!(phrase.is_empty());
        assert!(pass.is_empty());
    }

    #[test]
    fn random_mnemonic_has_requested_size() {
        let phrase = random_mnemonic(WordCount::Words18).unwrap();
        assert_eq!(mnemonic_entropy(&phrase).unwrap().len(), 24);
    }
}
