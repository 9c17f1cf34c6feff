//! Strongbox CLI - wallet engine from the command line
//!
//! Key primitives need no session:
//!   strongbox mnemonic --words 24             → {"mnemonic": "..."}
//!   strongbox master <words...> --testnet     → {"xpriv": "tprv..."}
//!   strongbox keychain <xpriv> m/84h/1h/0h    → {"keychain": "[fp/84'/1'/0']tpub.../0/*"}
//!
//! Wallet commands open a session on the chosen chain:
//!   strongbox contract-create daily <keychain> --chain testnet
//!   strongbox addresses <contract> --rescan --depth 5
//!
//! Output is JSON on stdout, pretty-printed on a terminal. Errors go to
//! stderr as {"error", "code", "kind"} with exit status 1.

use anyhow::{anyhow, bail, Context};
use serde_json::{json, Value};
use std::env;
use std::io::IsTerminal;
use std::str::FromStr;
use std::time::Duration;
use strongbox::keys::{self, WordCount};
use strongbox::logging::init_logging;
use strongbox::model::{InvoiceType, OuterCategory};
use strongbox::wallet::InvoiceRequest;
use strongbox::{bech32, signer, Chain, Error, Session, SessionConfig};
use tracing::debug;

fn main() {
    init_logging();
    #[cfg(feature = "electrum")]
    let _ = rustls::crypto::ring::default_provider().install_default();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.help {
        print_usage();
        return;
    }
    if opts.version {
        println!("strongbox {}", env!("CARGO_PKG_VERSION"));
        return;
    }
    let Some(command) = opts.command.clone() else {
        print_usage();
        return;
    };

    debug!(%command, "running command");
    let pretty = opts.pretty || std::io::stdout().is_terminal();
    match run(&command, &opts) {
        Ok(output) => println!("{}", render(&output, pretty)),
        Err(err) => {
            let (code, kind) = match err.downcast_ref::<Error>() {
                Some(e) => (e.code(), e.kind().as_str()),
                None => (255, "cli"),
            };
            let body = json!({"error": format!("{:#}", err), "code": code, "kind": kind});
            eprintln!("{}", render(&body, pretty));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    if pretty {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    } else {
        value.to_string()
    }
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    positional: Vec<String>,
    // Session options
    chain: Option<String>,
    data_dir: Option<String>,
    electrum_url: Option<String>,
    timeout: Option<u64>,
    // Command options
    words: Option<usize>,
    entropy: Option<String>,
    passphrase: Option<String>,
    terminal: Option<String>,
    category: Option<String>,
    invoice_type: Option<String>,
    threshold: Option<u8>,
    depth: Option<u8>,
    amount: Option<u64>,
    fee: Option<u64>,
    giveaway: Option<u64>,
    asset: Option<String>,
    merchant: Option<String>,
    purpose: Option<String>,
    testnet: bool,
    public: bool,
    rescan: bool,
    force: bool,
    mark_used: bool,
    legacy: bool,
    unmark: bool,
    // Output options
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        let value = |i: &mut usize| -> Option<String> {
            if *i + 1 < args.len() {
                *i += 1;
                Some(args[*i].clone())
            } else {
                None
            }
        };

        while i < args.len() {
            let arg = &args[i];
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--pretty" => opts.pretty = true,
                "--testnet" => opts.testnet = true,
                "--public" => opts.public = true,
                "--rescan" => opts.rescan = true,
                "--force" => opts.force = true,
                "--mark-used" => opts.mark_used = true,
                "--legacy" => opts.legacy = true,
                "--unmark" => opts.unmark = true,
                "--chain" | "-c" => opts.chain = value(&mut i),
                "--data-dir" | "-d" => opts.data_dir = value(&mut i),
                "--electrum" | "-e" => opts.electrum_url = value(&mut i),
                "--timeout" => opts.timeout = value(&mut i).and_then(|v| v.parse().ok()),
                "--words" | "-w" => opts.words = value(&mut i).and_then(|v| v.parse().ok()),
                "--entropy" => opts.entropy = value(&mut i),
                "--passphrase" => opts.passphrase = value(&mut i),
                "--terminal" => opts.terminal = value(&mut i),
                "--category" => opts.category = value(&mut i),
                "--type" => opts.invoice_type = value(&mut i),
                "--threshold" => opts.threshold = value(&mut i).and_then(|v| v.parse().ok()),
                "--depth" => opts.depth = value(&mut i).and_then(|v| v.parse().ok()),
                "--amount" => opts.amount = value(&mut i).and_then(|v| v.parse().ok()),
                "--fee" => opts.fee = value(&mut i).and_then(|v| v.parse().ok()),
                "--giveaway" => opts.giveaway = value(&mut i).and_then(|v| v.parse().ok()),
                "--asset" => opts.asset = value(&mut i),
                "--merchant" => opts.merchant = value(&mut i),
                "--purpose" => opts.purpose = value(&mut i),
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        if !positional.is_empty() {
            opts.command = Some(positional.remove(0));
        }
        opts.positional = positional;

        // Environment (lower priority than CLI args)
        if opts.chain.is_none() {
            opts.chain = env::var("STRONGBOX_CHAIN").ok().filter(|s| !s.is_empty());
        }
        if opts.electrum_url.is_none() {
            opts.electrum_url = env::var("STRONGBOX_ELECTRUM").ok().filter(|s| !s.is_empty());
        }
        if opts.data_dir.is_none() {
            opts.data_dir = env::var("STRONGBOX_DATA_DIR").ok().filter(|s| !s.is_empty());
        }
        opts
    }

    fn arg(&self, index: usize, name: &str) -> anyhow::Result<&str> {
        self.positional.get(index).map(String::as_str).ok_or_else(|| anyhow!("missing argument <{}>", name))
    }

    /// Remaining positionals joined with spaces (mnemonic words).
    fn rest(&self, from: usize, name: &str) -> anyhow::Result<String> {
        if self.positional.len() <= from {
            bail!("missing argument <{}>", name);
        }
        Ok(self.positional[from..].join(" "))
    }

    fn session(&self) -> anyhow::Result<Session> {
        let chain = Chain::from_str(self.chain.as_deref().unwrap_or("bitcoin"))?;
        let mut config = SessionConfig::new(chain);
        if let Some(dir) = &self.data_dir {
            config = config.with_data_dir(dir);
        }
        if let Some(url) = &self.electrum_url {
            config = config.with_electrum(url);
        }
        if let Some(secs) = self.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Session::open(config).context("opening session")
    }
}

fn run(command: &str, opts: &ParsedArgs) -> anyhow::Result<Value> {
    match command {
        "mnemonic" => cmd_mnemonic(opts),
        "entropy" => {
            let entropy = keys::mnemonic_entropy(&opts.rest(0, "mnemonic")?)?;
            Ok(json!({"entropy": hex::encode(entropy.as_slice())}))
        }
        "master" => {
            let mut words = opts.rest(0, "mnemonic")?;
            let mut passphrase = opts.passphrase.clone().unwrap_or_default();
            let network = if opts.testnet { bitcoin::NetworkKind::Test } else { bitcoin::NetworkKind::Main };
            let key = keys::derive_master_key(&mut words, &mut passphrase, true, network)?;
            Ok(json!({"xpriv": key.to_secret_string().as_str()}))
        }
        "derive" => {
            let mut key = opts.arg(0, "xkey")?.to_string();
            let path = opts.arg(1, "path")?;
            if opts.public {
                Ok(json!({"xpub": keys::derive_public(&mut key, path, true)?.to_string()}))
            } else {
                Ok(json!({"xpriv": keys::derive_private(&mut key, path, true)?.to_secret_string().as_str()}))
            }
        }
        "xpub" => Ok(json!({"xpub": keys::xpriv_to_xpub(&mut opts.arg(0, "xpriv")?.to_string(), true)?.to_string()})),
        "keychain" => {
            let mut key = opts.arg(0, "xpriv")?.to_string();
            let terminal = opts.terminal.as_deref().unwrap_or("0");
            let chain = keys::keychain_create(&mut key, opts.arg(1, "account")?, terminal, true)?;
            Ok(json!({"keychain": chain.to_string()}))
        }
        "bech32" => Ok(serde_json::to_value(bech32::info(opts.arg(0, "bech32")?).map_err(Error::from)?)?),
        "sign" => {
            let mut key = opts.arg(1, "xpriv")?.to_string();
            let (psbt, report) = signer::sign_psbt(opts.arg(0, "psbt")?, &mut key, true)?;
            Ok(json!({"psbt": psbt, "report": report}))
        }
        _ => run_session(command, opts),
    }
}

fn cmd_mnemonic(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let words = WordCount::from_words(opts.words.unwrap_or(12))?;
    let mnemonic = match &opts.entropy {
        Some(entropy) => keys::create_mnemonic(&hex::decode(entropy).context("entropy must be hex")?, words)?,
        None => keys::random_mnemonic(words)?,
    };
    Ok(json!({"mnemonic": mnemonic.as_str()}))
}

fn run_session(command: &str, opts: &ParsedArgs) -> anyhow::Result<Value> {
    let known = [
        "contracts", "contract-create", "contract-rename", "contract-delete", "balance", "addresses", "address-create",
        "invoice-create", "invoices", "invoice-accept", "invoice-archive", "pay", "publish", "assets", "asset-import",
        "operations",
    ];
    if !known.contains(&command) {
        bail!("Unknown command: {}", command);
    }

    let session = opts.session()?;
    let depth = opts.depth.unwrap_or(0);
    let output = match command {
        "contracts" => serde_json::to_value(session.contract_list()?)?,
        "contract-create" => {
            let name = opts.arg(0, "name")?;
            let keychains: Vec<String> = opts.positional.iter().skip(1).cloned().collect();
            let category = OuterCategory::from_str(opts.category.as_deref().unwrap_or("segwit"))?;
            if keychains.is_empty() {
                bail!("missing argument <keychain>");
            }
            let summary = if keychains.len() == 1 && opts.threshold.is_none() {
                session.single_sig_create(name, &keychains[0], category)?
            } else {
                session.multi_sig_create(name, opts.threshold.unwrap_or(1), keychains, category)?
            };
            serde_json::to_value(summary)?
        }
        "contract-rename" => serde_json::to_value(session.contract_rename(opts.arg(0, "contract")?, opts.arg(1, "name")?)?)?,
        "contract-delete" => {
            session.contract_delete(opts.arg(0, "contract")?, opts.force)?;
            json!({"deleted": opts.arg(0, "contract")?})
        }
        "balance" => serde_json::to_value(session.contract_balance(opts.arg(0, "contract")?, opts.rescan, depth)?)?,
        "addresses" => serde_json::to_value(session.address_list(opts.arg(0, "contract")?, opts.rescan, depth)?)?,
        "address-create" => serde_json::to_value(session.address_create(opts.arg(0, "contract")?, opts.mark_used, opts.legacy)?)?,
        "invoice-create" => {
            let request = InvoiceRequest {
                category: InvoiceType::from_str(opts.invoice_type.as_deref().unwrap_or("address"))?,
                contract: opts.arg(0, "contract")?.parse()?,
                asset: opts.asset.clone(),
                amount: opts.amount.ok_or_else(|| anyhow!("--amount is required"))?,
                merchant: opts.merchant.clone(),
                purpose: opts.purpose.clone(),
                unmark: opts.unmark,
                legacy: opts.legacy,
            };
            serde_json::to_value(session.invoice_create(request)?)?
        }
        "invoices" => serde_json::to_value(session.invoice_list(opts.arg(0, "contract")?)?)?,
        "invoice-accept" => serde_json::to_value(session.invoice_accept(opts.arg(0, "contract")?, opts.arg(1, "invoice")?)?)?,
        "invoice-archive" => serde_json::to_value(session.invoice_archive(opts.arg(0, "contract")?, opts.arg(1, "invoice")?)?)?,
        "pay" => {
            let fee = opts.fee.ok_or_else(|| anyhow!("--fee is required"))?;
            serde_json::to_value(session.invoice_pay(opts.arg(0, "contract")?, opts.arg(1, "invoice")?, fee, opts.giveaway)?)?
        }
        "publish" => json!({"txid": session.psbt_publish(opts.arg(0, "psbt")?)?.to_string()}),
        "assets" => serde_json::to_value(session.asset_list()?)?,
        "asset-import" => serde_json::to_value(session.asset_import(opts.arg(0, "genesis")?)?)?,
        "operations" => serde_json::to_value(session.contract_operations(opts.arg(0, "contract")?)?)?,
        other => bail!("Unknown command: {}", other),
    };
    session.close()?;
    Ok(output)
}

fn print_usage() {
    println!(
        r#"strongbox - local HD wallet engine

USAGE:
    strongbox <command> [args] [options]

KEY COMMANDS (no session):
    mnemonic [--words N] [--entropy HEX]     New BIP39 mnemonic (12/15/18/21/24 words)
    entropy <words...>                       Entropy behind a mnemonic
    master <words...> [--passphrase P] [--testnet]
                                             Master extended private key
    derive <xkey> <path> [--public]          Child xpriv, or xpub with --public
    xpub <xpriv>                             Neuter an extended private key
    keychain <xpriv> <account> [--terminal 0]
                                             Account key chain for contracts
    bech32 <string>                          Decode and classify a bech32 string
    sign <psbt> <xpriv>                      Sign a base64 PSBT

WALLET COMMANDS:
    contracts                                List contracts
    contract-create <name> <keychain...> [--category C] [--threshold N]
    contract-rename <contract> <name>
    contract-delete <contract> [--force]
    balance <contract> [--rescan] [--depth N]
    addresses <contract> [--rescan] [--depth N]
    address-create <contract> [--mark-used] [--legacy]
    invoice-create <contract> --amount SAT [--type address|descriptor]
                   [--asset ID] [--merchant S] [--purpose S] [--unmark] [--legacy]
    invoices <contract>
    invoice-accept <contract> <invoice>
    invoice-archive <contract> <invoice>
    pay <contract> <invoice> --fee SAT [--giveaway SAT]
    publish <psbt>
    assets
    asset-import <genesis>
    operations <contract>

SESSION OPTIONS:
    --chain, -c <chain>      bitcoin|testnet|signet|regtest (env: STRONGBOX_CHAIN)
    --data-dir, -d <path>    Data directory (env: STRONGBOX_DATA_DIR)
    --electrum, -e <url>     Electrum server (env: STRONGBOX_ELECTRUM)
    --timeout <secs>         Per-call reply timeout

OUTPUT OPTIONS:
    --pretty                 Pretty-print JSON (default on a terminal)
    --version, -V            Print version

ENVIRONMENT:
    RUST_LOG                 Log filter (default: info), logs go to stderr
    STRONGBOX_LOG_JSON=1     JSON log lines
    STRONGBOX_ROOT           Root for per-chain data directories"#
    );
}
