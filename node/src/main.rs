use std::fs::create_dir_all;
use std::io::stdin;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, TimeZone};
use console::style;
use dialoguer::Confirm;
use log::{info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use structopt::StructOpt;
use tally_crypto::seal::VaultKey;
use tally_ledger::block::Block;
use tally_ledger::levy::{LevyJob, LevyOutcome, LevyScheduler, Period};
use tally_ledger::transaction::Transaction;
use tally_ledger::Ledger;
use tally_storage::keypair::{find_keypair, read_keypair, store_keypair};
use tally_storage::SledStore;

use crate::cli::{AccountCommand, Command, Opt};

mod cli;

fn main() -> Result<()> {
    let opt = Opt::from_args();

    let level = match opt.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    if let Command::VaultKey = opt.cmd {
        println!("{}", hex::encode(VaultKey::generate_material()));
        return Ok(());
    }

    let ledger = open_ledger(&opt)?;
    match &opt.cmd {
        Command::VaultKey => {}
        Command::Init => {
            let genesis = ledger.block_by_index(0)?;
            println!("Genesis block {}", style(genesis.hash).green());
            println!("Levy collector {}", style(ledger.collector()).green());
        }
        Command::Account(AccountCommand::New) => {
            create_dir_all(&opt.keys_dir)?;
            let (account, keypair) = ledger.open_account()?;
            let path = store_keypair(&keypair, &opt.keys_dir)?;
            println!("Account {}", style(account.address).green());
            println!("Balance {}", ledger.balance(&account.address)?);
            println!("Key file {}", path.display());
        }
        Command::Account(AccountCommand::List) => {
            for account in ledger.accounts()? {
                println!(
                    "{}  {:>12}  created {}",
                    account.address,
                    ledger.balance(&account.address)?,
                    datetime(account.created_at)
                );
            }
        }
        Command::Account(AccountCommand::Import { path }) => {
            let keypair = read_keypair(path)?;
            let account = ledger.account(&keypair.public.into())?;
            create_dir_all(&opt.keys_dir)?;
            let stored = store_keypair(&keypair, &opt.keys_dir)?;
            println!("Imported {} to {}", style(account.address).green(), stored.display());
        }
        Command::Balance { address } => {
            println!("{} {}", address, style(ledger.balance(address)?).bold());
            for output in ledger.outputs(address)? {
                println!("  {}  {:>12}  from {}", output.id, output.amount, output.source_tx);
            }
        }
        Command::Transfer {
            from,
            to,
            amount,
            note,
            yes,
        } => {
            let keypair = find_keypair(from, &opt.keys_dir)
                .with_context(|| format!("no key file for {} in {}", from, opt.keys_dir.display()))?;
            let confirmed = *yes
                || Confirm::new()
                    .with_prompt(format!("Send {} from {} to {}?", amount, from, to))
                    .default(false)
                    .interact()?;
            if !confirmed {
                bail!("transfer cancelled");
            }
            let tx = ledger.transfer(from, to, *amount, note.clone(), &keypair.private)?;
            print_transaction(&tx);
        }
        Command::Mine { miner } => {
            let block = ledger.mine(*miner)?;
            print_block(&block);
        }
        Command::Chain => ledger.chain().iter().for_each(print_block),
        Command::Block { id } => {
            let block = match id.parse::<u64>() {
                Ok(index) => ledger.block_by_index(index)?,
                Err(_) => ledger.block_by_hash(&id.parse().map_err(|_| anyhow!("invalid block id {}", id))?)?,
            };
            print_block(&block);
            print!("{}", style(block.merkle_tree()).dim());
        }
        Command::Tx { hash } => print_transaction(&ledger.transaction(hash)?),
        Command::History { address } => ledger.history(address)?.iter().for_each(print_transaction),
        Command::Pending => ledger.pending().iter().for_each(print_transaction),
        Command::Supply => println!("{}", ledger.total_supply()?),
        Command::Validate => match ledger.verify_chain() {
            Ok(()) => println!(
                "{} {} blocks",
                style("valid").green(),
                ledger.height()
            ),
            Err(e) => bail!("{} {}", style("invalid").red(), e),
        },
        Command::Levy { address, period } => {
            let period = period.unwrap_or_else(Period::current);
            let job = LevyJob::new(&ledger);
            match address {
                Some(address) => match job.deduct(address, period)? {
                    LevyOutcome::Deducted(record) => println!(
                        "Levied {} from {} for {}, balance {}",
                        record.amount, record.address, record.period, record.balance_after
                    ),
                    LevyOutcome::Skipped(reason) => println!("Skipped: {}", reason),
                },
                None => {
                    let report = job.run(period)?;
                    println!(
                        "{} deducted, {} skipped, {} failed",
                        report.succeeded, report.skipped, report.failed
                    );
                }
            }
        }
        Command::Levies { address } => {
            for record in ledger.levies(address)? {
                println!(
                    "{}  {:>10}  {:>12} -> {:<12}  {}",
                    record.period,
                    record.amount,
                    record.balance_before,
                    record.balance_after,
                    record.tx_hash
                );
            }
        }
        Command::Logs { kind, limit } => {
            for event in ledger.events(*kind, *limit)? {
                println!(
                    "{}  {:<20}  {}",
                    datetime(event.timestamp),
                    style(event.kind).cyan(),
                    event.message
                );
                if let Some(address) = event.address {
                    println!("    account {}", address);
                }
                if let Some(tx_hash) = event.tx_hash {
                    println!("    tx {}", tx_hash);
                }
                if let Some(block_hash) = event.block_hash {
                    println!("    block {}", block_hash);
                }
            }
        }
        Command::Run => {
            let ledger = Arc::new(ledger);
            let scheduler = LevyScheduler::spawn(Arc::clone(&ledger));
            info!("Running, close stdin to stop");
            let mut line = String::new();
            while stdin().read_line(&mut line)? > 0 {
                line.clear();
            }
            scheduler.stop();
        }
    }
    Ok(())
}

fn open_ledger(opt: &Opt) -> Result<Ledger<SledStore>> {
    let vault_hex = opt
        .vault_key
        .as_ref()
        .ok_or_else(|| anyhow!("a vault key is required, set TALLY_VAULT_KEY"))?;
    let vault = VaultKey::from_hex(vault_hex)?;
    let store = SledStore::open(&opt.data_dir)
        .with_context(|| format!("cannot open ledger at {}", opt.data_dir.display()))?;
    Ok(Ledger::open(store, opt.ledger.to_config(), vault)?)
}

fn datetime(nanos: i64) -> String {
    Local.timestamp_nanos(nanos).to_rfc2822()
}

fn print_block(block: &Block) {
    println!(
        "{} {}  {}",
        style(format!("#{}", block.index)).bold(),
        style(block.hash).green(),
        datetime(block.timestamp)
    );
    println!(
        "    previous {}  nonce {}  difficulty {}",
        block.previous_hash, block.nonce, block.difficulty
    );
    for tx in &block.transactions {
        println!("    {}", tx);
    }
}

fn print_transaction(tx: &Transaction) {
    println!("{} {}", style(tx.payload.kind).cyan(), tx);
    println!("    status {}", tx.status);
    if let Some(note) = &tx.payload.note {
        println!("    note {}", note);
    }
    if let Some(block_hash) = tx.block_hash {
        println!("    block {}", block_hash);
    }
}
