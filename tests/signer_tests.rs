//! Signing tests over PSBTs composed by the wallet
//!
//! Each script type is funded on a scripted chain, paid out, signed with the
//! master key and published, so the finalizer sees real signer output.

mod common;

use bitcoin::{Address, NetworkKind, ScriptBuf};
use common::{keychain, master, MockChain, TEST_MNEMONIC};
use std::str::FromStr;
use std::sync::Arc;
use strongbox::keys::{derive_master_key, keychain_create};
use strongbox::model::{ContractId, OuterCategory};
use strongbox::wallet::{MemoryStore, Wallet};
use strongbox::{signer, Chain, ErrorKind};

const FOREIGN: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";

fn script(address: &str) -> ScriptBuf { Address::from_str(address).unwrap().assume_checked().script_pubkey() }

fn wallet(chain: &Arc<MockChain>) -> Wallet {
    Wallet::open(Chain::Testnet, 20, Box::new(MemoryStore::new()), Box::new(chain.clone())).unwrap()
}

/// Fund one fresh address of `id` and return the unsigned payment PSBT.
fn funded_payment(wallet: &mut Wallet, chain: &MockChain, id: &ContractId, legacy: bool) -> String {
    let address = wallet.address_create(id, true, legacy).unwrap();
    chain.fund(&script(&address.address), 100_000);
    wallet.contract_rescan(id, 3).unwrap();
    wallet
        .invoice_pay(id, &format!("bitcoin:{}?amount=0.0004", FOREIGN), 2_000, None)
        .unwrap()
        .psbt
}

fn passphrase_master(passphrase: &str) -> String {
    let mut words = TEST_MNEMONIC.to_string();
    let mut passphrase = passphrase.to_string();
    derive_master_key(&mut words, &mut passphrase, false, NetworkKind::Test)
        .unwrap()
        .to_secret_string()
        .to_string()
}

fn single(category: OuterCategory, account: &str) -> (Arc<MockChain>, Wallet, ContractId) {
    let chain = Arc::new(MockChain::new());
    let mut wallet = wallet(&chain);
    let id = wallet.single_sig_create("single", &keychain(NetworkKind::Test, account), category).unwrap().id;
    (chain, wallet, id)
}

#[test]
fn resigning_is_a_no_op() {
    let (chain, mut wallet, id) = single(OuterCategory::SegWit, "m/84'/1'/0'");
    let psbt = funded_payment(&mut wallet, &chain, &id, false);

    let (once, first) = signer::sign_psbt(&psbt, &mut master(NetworkKind::Test), false).unwrap();
    assert_eq!(first.signed, 1);
    let (twice, second) = signer::sign_psbt(&once, &mut master(NetworkKind::Test), false).unwrap();
    assert_eq!((second.signed, second.already_signed), (0, 1));
    assert_eq!(once, twice);
}

#[test]
fn foreign_key_signs_nothing() {
    let (chain, mut wallet, id) = single(OuterCategory::SegWit, "m/84'/1'/0'");
    let psbt = funded_payment(&mut wallet, &chain, &id, false);

    let (out, report) = signer::sign_psbt(&psbt, &mut passphrase_master("other"), false).unwrap();
    assert_eq!((report.inputs, report.signed, report.already_signed), (1, 0, 0));
    assert_eq!(out, psbt);
    assert_eq!(wallet.psbt_publish(&out).unwrap_err().kind(), ErrorKind::InvalidState);
}

#[test]
fn account_key_signs_through_origin() {
    let (chain, mut wallet, id) = single(OuterCategory::SegWit, "m/84'/1'/0'");
    let psbt = funded_payment(&mut wallet, &chain, &id, false);

    let mut account = strongbox::keys::derive_private(&mut master(NetworkKind::Test), "m/84'/1'/0'", false)
        .unwrap()
        .to_secret_string()
        .to_string();
    let (signed, report) = signer::sign_psbt(&psbt, &mut account, true).unwrap();
    assert_eq!(report.signed, 1);
    assert!(account.is_empty());
    wallet.psbt_publish(&signed).unwrap();
}

#[test]
fn wrapped_segwit_input() {
    let (chain, mut wallet, id) = single(OuterCategory::SegWit, "m/49'/1'/0'");
    let psbt = funded_payment(&mut wallet, &chain, &id, true);
    let (signed, _) = signer::sign_psbt(&psbt, &mut master(NetworkKind::Test), false).unwrap();
    wallet.psbt_publish(&signed).unwrap();

    let tx = chain.broadcasts.lock().unwrap()[0].clone();
    assert_eq!(tx.input[0].witness.len(), 2);
    assert!(!tx.input[0].script_sig.is_empty());
}

#[test]
fn legacy_p2pkh_input() {
    let (chain, mut wallet, id) = single(OuterCategory::Bare, "m/44'/1'/0'");
    let psbt = funded_payment(&mut wallet, &chain, &id, false);
    let (signed, report) = signer::sign_psbt(&psbt, &mut master(NetworkKind::Test), false).unwrap();
    assert_eq!(report.signed, 1);
    wallet.psbt_publish(&signed).unwrap();

    let tx = chain.broadcasts.lock().unwrap()[0].clone();
    assert!(tx.input[0].witness.is_empty());
    assert!(!tx.input[0].script_sig.is_empty());
}

#[test]
fn taproot_key_path() {
    let (chain, mut wallet, id) = single(OuterCategory::Taproot, "m/86'/1'/0'");
    let psbt = funded_payment(&mut wallet, &chain, &id, false);
    let (signed, report) = signer::sign_psbt(&psbt, &mut master(NetworkKind::Test), false).unwrap();
    assert_eq!(report.signed, 1);
    let (_, again) = signer::sign_psbt(&signed, &mut master(NetworkKind::Test), false).unwrap();
    assert_eq!(again.already_signed, 1);

    wallet.psbt_publish(&signed).unwrap();
    let tx = chain.broadcasts.lock().unwrap()[0].clone();
    assert_eq!(tx.input[0].witness.len(), 1);
    assert_eq!(tx.input[0].witness.nth(0).map(<[u8]>::len), Some(64));
}

#[test]
fn two_of_two_needs_both_cosigners() {
    let chain = Arc::new(MockChain::new());
    let mut wallet = wallet(&chain);
    let first = keychain(NetworkKind::Test, "m/48'/1'/0'/2'");
    let second = keychain_create(&mut passphrase_master("cosigner"), "m/48'/1'/0'/2'", "0", false).unwrap().to_string();
    let id = wallet.multi_sig_create("vault", 2, &[first, second], OuterCategory::SegWit).unwrap().id;
    let psbt = funded_payment(&mut wallet, &chain, &id, false);

    let (half, report) = signer::sign_psbt(&psbt, &mut master(NetworkKind::Test), false).unwrap();
    assert_eq!(report.signed, 1);
    assert_eq!(wallet.psbt_publish(&half).unwrap_err().kind(), ErrorKind::InvalidState);
    assert!(chain.broadcasts.lock().unwrap().is_empty());

    let (full, report) = signer::sign_psbt(&half, &mut passphrase_master("cosigner"), false).unwrap();
    assert_eq!(report.signed, 1);
    wallet.psbt_publish(&full).unwrap();

    let tx = chain.broadcasts.lock().unwrap()[0].clone();
    // <> <sig> <sig> <witness script>
    assert_eq!(tx.input[0].witness.len(), 4);
}

#[test]
fn malformed_psbt_and_key() {
    assert_eq!(signer::sign_psbt("bm90IGEgcHNidA==", &mut master(NetworkKind::Test), false).unwrap_err().kind(), ErrorKind::MalformedPsbt);

    let (chain, mut wallet, id) = single(OuterCategory::SegWit, "m/84'/1'/0'");
    let psbt = funded_payment(&mut wallet, &chain, &id, false);
    let mut key = "tpubnotakey".to_string();
    assert_eq!(signer::sign_psbt(&psbt, &mut key, true).unwrap_err().kind(), ErrorKind::InvalidKey);
    assert!(key.is_empty());
}
