//! Published vectors: BIP39 (Trezor set), BIP32 roots, BIP173/BIP350 strings

mod common;

use bitcoin::bip32::Xpriv;
use bitcoin::NetworkKind;
use std::str::FromStr;
use common::{TEST_MNEMONIC, MAINNET_ADDR_0};
use strongbox::bech32::{self, Bech32Error, Category, Variant};
use strongbox::keys::{self, WordCount};
use strongbox::ErrorKind;

#[test]
fn trezor_vector_with_passphrase() {
    let entropy = [0u8; 16];
    let words = keys::create_mnemonic(&entropy, WordCount::Words12).unwrap();
    assert_eq!(words.as_str(), TEST_MNEMONIC);

    let mut phrase = words.to_string();
    let mut passphrase = "TREZOR".to_string();
    let master = keys::derive_master_key(&mut phrase, &mut passphrase, true, NetworkKind::Main).unwrap();
    assert_eq!(
        master.to_secret_string().as_str(),
        "xprv9s21ZrQH143K3h3fDYiay8mocZ3afhfULfb5GX8kCBdno77K4HiA15Tg23wpbeF1pLfs1c5SPmYHrEpTuuRhxMwvKDwqdKiGJS9XFKzUsAF"
    );
    assert!(phrase.is_empty() && passphrase.is_empty());
}

#[test]
fn testnet_master_differs_only_in_version() {
    let main = common::master(NetworkKind::Main);
    let test = common::master(NetworkKind::Test);
    assert_eq!(
        test,
        "tprv8ZgxMBicQKsPe5YMU9gHen4Ez3ApihUfykaqUorj9t6FDqy3nP6eoXiAo2ssvpAjoLroQxHqr3R5nE3a5dU3DHTjTgJDd7zrbniJr6nrCzd"
    );

    let main = Xpriv::from_str(&main).unwrap();
    let test = Xpriv::from_str(&test).unwrap();
    assert_eq!(main.private_key, test.private_key);
    assert_eq!(main.chain_code, test.chain_code);
    assert_eq!(test.network, NetworkKind::Test);
}

#[test]
fn entropy_survives_every_word_count() {
    for (words, bytes) in [(12, 16), (15, 20), (18, 24), (21, 28), (24, 32)] {
        let entropy: Vec<u8> = (0..bytes as u8).map(|b| b.wrapping_mul(37)).collect();
        let phrase = keys::create_mnemonic(&entropy, WordCount::from_words(words).unwrap()).unwrap();
        assert_eq!(phrase.split(' ').count(), words);
        assert_eq!(keys::mnemonic_entropy(&phrase).unwrap().as_slice(), entropy.as_slice());
    }
}

#[test]
fn account_xpub_reaches_the_same_children() {
    let mut account = keys::derive_public(&mut common::master(NetworkKind::Main), "m/84'/0'/0'", false).unwrap().to_string();
    let via_account = keys::derive_public(&mut account.clone(), "m/0/0", false).unwrap();
    let via_master = keys::derive_public(&mut common::master(NetworkKind::Main), "m/84'/0'/0'/0/0", false).unwrap();
    assert_eq!(via_account, via_master);

    assert_eq!(keys::derive_public(&mut account, "m/0'/0", false).unwrap_err().kind(), ErrorKind::HardenedDerivation);
}

#[test]
fn bip173_and_bip350_strings() {
    let plain = bech32::decode("A12UEL5L").unwrap();
    assert_eq!((plain.hrp.as_str(), plain.variant), ("a", Variant::Bech32));
    let modern = bech32::decode("a1lqfn3a").unwrap();
    assert_eq!(modern.variant, Variant::Bech32m);
    assert!(modern.payload.is_empty());

    let upper = bech32::info("BC1QW508D6QEJXTDG4Y5R3ZARVARY0C5XW7KV8F3T4").unwrap();
    assert_eq!(upper.category, Category::BcAddress);
    assert!(!upper.bech32m);
    let taproot = bech32::info("bc1p0xlxvlhemja6c4dqv22uapctqupfhlxm9h8z3k2e72q4k9hcz7vqzk5jj0").unwrap();
    assert!(taproot.bech32m);
    assert_eq!(bech32::info(MAINNET_ADDR_0).unwrap().details["network"], "bitcoin");

    assert!(matches!(bech32::decode("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t5"), Err(Bech32Error::Checksum(_))));
    assert!(matches!(bech32::decode("pzry9x0s0muk"), Err(Bech32Error::Hrp(_))));
    assert!(matches!(bech32::decode("1pzry9x0s0muk"), Err(Bech32Error::Hrp(_))));
}

#[test]
fn ids_roundtrip_through_bech32m() {
    let id = strongbox::model::ContractId::commit(b"vector");
    let text = id.to_string();
    assert!(text.starts_with("id1"));
    assert_eq!(bech32::decode(&text).unwrap().category, Category::LnpbpId);
    assert_eq!(text.parse::<strongbox::model::ContractId>().unwrap(), id);
}
