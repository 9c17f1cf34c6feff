//! Wallet flow tests against a scripted chain backend
//!
//! These tests verify:
//! 1. Contracts derive the BIP84 addresses for the test mnemonic
//! 2. Rescan walks exactly up to the lookup frontier
//! 3. Funding an invoice address marks the invoice paid
//! 4. Paying an invoice produces a PSBT the signer can complete and publish
//! 5. Unpublished payments do not reserve their inputs
//! 6. State survives a reopen from the file store

mod common;

use bitcoin::secp256k1::Secp256k1;
use bitcoin::{Address, NetworkKind, ScriptBuf};
use common::{keychain, master, MockChain, TESTNET_ADDR_0};
use std::str::FromStr;
use std::sync::Arc;
use strongbox::model::{ContractId, InvoiceState, OuterCategory};
use strongbox::wallet::{FileStore, InvoiceRequest, MemoryStore, Wallet};
use strongbox::{signer, Chain, ErrorKind};
use tempfile::TempDir;

// BIP173 P2WPKH test vector, valid on testnet
const FOREIGN: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";

fn script(address: &str) -> ScriptBuf { Address::from_str(address).unwrap().assume_checked().script_pubkey() }

fn open(chain: &Arc<MockChain>) -> (Wallet, ContractId) {
    let mut wallet = Wallet::open(Chain::Testnet, 20, Box::new(MemoryStore::new()), Box::new(chain.clone())).unwrap();
    let id = wallet
        .single_sig_create("daily", &keychain(NetworkKind::Test, "m/84'/1'/0'"), OuterCategory::SegWit)
        .unwrap()
        .id;
    (wallet, id)
}

#[test]
fn first_address_matches_bip84() {
    let chain = Arc::new(MockChain::new());
    let (mut wallet, id) = open(&chain);
    let record = wallet.address_create(&id, false, false).unwrap();
    assert_eq!(record.index, 0);
    assert_eq!(record.address, TESTNET_ADDR_0);
}

#[test]
fn empty_rescan_stops_at_depth() {
    let chain = Arc::new(MockChain::new());
    let (mut wallet, id) = open(&chain);

    let report = wallet.contract_rescan(&id, 5).unwrap();
    assert_eq!(report.lookups, 5);
    assert_eq!(chain.lookup_count(), 5);
    assert_eq!(report.used, 0);

    // depth 0 falls back to the contract's lookup depth
    chain.reset_lookups();
    wallet.contract_rescan(&id, 0).unwrap();
    assert_eq!(chain.lookup_count(), 20);
}

#[test]
fn activity_moves_the_frontier() {
    let chain = Arc::new(MockChain::new());
    let (mut wallet, id) = open(&chain);

    for _ in 0..4 {
        wallet.address_create(&id, false, false).unwrap();
    }
    let third = wallet.contract(&id).unwrap().addresses[&3].address.clone();
    chain.touch(&script(&third));

    let addresses = wallet.address_list(&id, true, 5).unwrap();
    // 0..=3, then 5 more past the used index
    assert_eq!(chain.lookup_count(), 9);
    assert_eq!(addresses.len(), 4);
    assert!(addresses[3].used);
    assert!(!addresses[0].used);
}

#[test]
fn rescan_reaches_addresses_past_a_gap() {
    let chain = Arc::new(MockChain::new());
    let (mut wallet, id) = open(&chain);

    let secp = Secp256k1::verification_only();
    let fifteen = wallet.contract(&id).unwrap().derive(&secp, 15, false).unwrap().script_pubkey;
    chain.touch(&fifteen);
    wallet.contract_rescan(&id, 20).unwrap();
    assert_eq!(wallet.contract(&id).unwrap().addresses.keys().copied().collect::<Vec<_>>(), vec![15]);

    // 16..=40 handed out; the map now holds 26 records but reaches index 40
    for _ in 0..25 {
        wallet.address_create(&id, false, false).unwrap();
    }
    let last = wallet.contract(&id).unwrap().addresses[&40].address.clone();
    chain.fund(&script(&last), 10_000);

    let balance = wallet.contract_balance(&id, true, 5).unwrap();
    assert_eq!(balance.by_asset["btc"], 10_000);
    assert!(wallet.contract(&id).unwrap().addresses[&40].used);
}

#[test]
fn funded_invoice_is_paid_then_spent() {
    let chain = Arc::new(MockChain::new());
    let (mut wallet, id) = open(&chain);

    let invoice = wallet.invoice_create(&InvoiceRequest::new(id, 50_000)).unwrap();
    assert_eq!(invoice.state, InvoiceState::Created);
    assert!(invoice.encoded.starts_with(&format!("bitcoin:{}", TESTNET_ADDR_0)));

    let funding = chain.fund(&script(TESTNET_ADDR_0), 80_000);
    let balance = wallet.contract_balance(&id, true, 5).unwrap();
    assert_eq!(balance.confirmed, 80_000);
    assert_eq!(balance.by_asset["btc"], 80_000);
    assert_eq!(balance.unspent[0].outpoint, funding);
    assert_eq!(wallet.invoice_list(&id).unwrap()[0].state, InvoiceState::Paid);

    let request = format!("bitcoin:{}?amount=0.0003", FOREIGN);
    let payment = wallet.invoice_pay(&id, &request, 1_000, None).unwrap();
    assert_eq!((payment.amount, payment.fee, payment.change), (30_000, 1_000, 49_000));
    assert_eq!(payment.inputs, 1);
    assert_eq!(payment.change_index, Some(1));
    assert!(wallet.contract(&id).unwrap().addresses[&1].used);

    let (signed, report) = signer::sign_psbt(&payment.psbt, &mut master(NetworkKind::Test), true).unwrap();
    assert_eq!((report.inputs, report.signed, report.already_signed), (1, 1, 0));

    let txid = wallet.psbt_publish(&signed).unwrap();
    assert_eq!(txid, payment.txid);
    let broadcast = chain.broadcasts.lock().unwrap();
    assert_eq!(broadcast.len(), 1);
    assert_eq!(broadcast[0].input[0].witness.len(), 2);
    assert_eq!(broadcast[0].output[0].script_pubkey, script(FOREIGN));

    assert!(wallet.contract(&id).unwrap().unspent.is_empty());
    let operations = wallet.contract_operations(&id).unwrap();
    assert_eq!(operations.len(), 1);
    assert!(operations[0].published);
    assert_eq!(operations[0].invoice.as_deref(), Some(request.as_str()));
}

#[test]
fn small_change_goes_to_fee() {
    let chain = Arc::new(MockChain::new());
    let (mut wallet, id) = open(&chain);
    let address = wallet.address_create(&id, true, false).unwrap();
    chain.fund(&script(&address.address), 31_500);
    wallet.contract_rescan(&id, 5).unwrap();

    let payment = wallet
        .invoice_pay(&id, &format!("bitcoin:{}?amount=0.0003", FOREIGN), 1_000, Some(1_000))
        .unwrap();
    assert_eq!(payment.change, 0);
    assert_eq!(payment.giveaway, 500);
    assert_eq!(payment.fee, 1_500);
    assert_eq!(payment.change_index, None);
}

#[test]
fn insufficient_funds_leaves_state_untouched() {
    let chain = Arc::new(MockChain::new());
    let (mut wallet, id) = open(&chain);
    let address = wallet.address_create(&id, true, false).unwrap();
    chain.fund(&script(&address.address), 10_000);
    wallet.contract_rescan(&id, 5).unwrap();

    let err = wallet.invoice_pay(&id, &format!("bitcoin:{}?amount=0.001", FOREIGN), 1_000, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    let contract = wallet.contract(&id).unwrap();
    assert!(contract.operations.is_empty());
    assert_eq!(contract.addresses.len(), 1);
}

#[test]
fn pending_payments_share_inputs_until_published() {
    let chain = Arc::new(MockChain::new());
    let (mut wallet, id) = open(&chain);
    let address = wallet.address_create(&id, true, false).unwrap();
    let funding = chain.fund(&script(&address.address), 80_000);
    wallet.contract_rescan(&id, 5).unwrap();

    let request = format!("bitcoin:{}?amount=0.0003", FOREIGN);
    let first = wallet.invoice_pay(&id, &request, 1_000, None).unwrap();
    let second = wallet.invoice_pay(&id, &request, 2_000, None).unwrap();
    assert_ne!(first.txid, second.txid);
    for payment in [&first, &second] {
        let psbt = signer::decode_psbt(&payment.psbt).unwrap();
        assert_eq!(psbt.unsigned_tx.input[0].previous_output, funding);
    }

    let (signed, _) = signer::sign_psbt(&first.psbt, &mut master(NetworkKind::Test), true).unwrap();
    wallet.psbt_publish(&signed).unwrap();
    let operations = wallet.contract_operations(&id).unwrap();
    assert_eq!(operations.iter().filter(|op| op.published).count(), 1);
    assert_eq!(wallet.invoice_pay(&id, &request, 1_000, None).unwrap_err().kind(), ErrorKind::InsufficientFunds);
}

#[test]
fn cosigner_order_is_one_contract() {
    let chain = Arc::new(MockChain::new());
    let mut wallet = Wallet::open(Chain::Testnet, 20, Box::new(MemoryStore::new()), Box::new(chain)).unwrap();
    let a = keychain(NetworkKind::Test, "m/48'/1'/0'/2'");
    let b = keychain(NetworkKind::Test, "m/48'/1'/1'/2'");

    wallet.multi_sig_create("vault", 2, &[a.clone(), b.clone()], OuterCategory::SegWit).unwrap();
    let err = wallet.multi_sig_create("again", 2, &[b, a], OuterCategory::SegWit).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(wallet.contract_list().len(), 1);
}

#[test]
fn mainnet_invoice_rejected_on_testnet() {
    let chain = Arc::new(MockChain::new());
    let (mut wallet, id) = open(&chain);
    let request = format!("bitcoin:{}?amount=0.0001", common::MAINNET_ADDR_0);
    let err = wallet.invoice_pay(&id, &request, 0, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ChainMismatch);
}

#[test]
fn invoice_lifecycle() {
    let chain = Arc::new(MockChain::new());
    let (mut wallet, id) = open(&chain);
    let created = wallet.invoice_create(&InvoiceRequest { purpose: Some("coffee".into()), ..InvoiceRequest::new(id, 1_000) }).unwrap();

    let accepted = wallet.invoice_accept(&id, &created.encoded).unwrap();
    assert_eq!(accepted.state, InvoiceState::Accepted);
    assert_eq!(wallet.invoice_accept(&id, &created.encoded).unwrap().state, InvoiceState::Accepted);

    let archived = wallet.invoice_archive(&id, &created.encoded).unwrap();
    assert_eq!(archived.state, InvoiceState::Archived);
    assert_eq!(wallet.invoice_accept(&id, &created.encoded).unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(wallet.invoice_archive(&id, "bitcoin:nothing").unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let chain = Arc::new(MockChain::new());
    let id = {
        let store = FileStore::open(dir.path()).unwrap();
        let mut wallet = Wallet::open(Chain::Testnet, 20, Box::new(store), Box::new(chain.clone())).unwrap();
        let id = wallet
            .single_sig_create("daily", &keychain(NetworkKind::Test, "m/84'/1'/0'"), OuterCategory::SegWit)
            .unwrap()
            .id;
        wallet.invoice_create(&InvoiceRequest::new(id, 7_000)).unwrap();
        id
    };

    let store = FileStore::open(dir.path()).unwrap();
    let wallet = Wallet::open(Chain::Testnet, 20, Box::new(store), Box::new(chain)).unwrap();
    assert_eq!(wallet.contract_list()[0].id, id);
    assert_eq!(wallet.invoice_list(&id).unwrap()[0].invoice.amount, 7_000);

    let store = FileStore::open(dir.path()).unwrap();
    let err = Wallet::open(Chain::Bitcoin, 20, Box::new(store), Box::new(MockChain::new())).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::ChainMismatch);
}
