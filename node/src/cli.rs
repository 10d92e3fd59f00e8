use std::path::PathBuf;

use structopt::StructOpt;
use tally_crypto::Hash;
use tally_ledger::account::Address;
use tally_ledger::event::EventKind;
use tally_ledger::levy::Period;
use tally_ledger::LedgerConfig;

#[derive(StructOpt, Debug)]
#[structopt(name = "tally", about = "Single-node ledger with a monthly levy")]
pub struct Opt {
    /// Verbosity, repeat for more (-v, -vv)
    #[structopt(short, long, parse(from_occurrences))]
    pub verbose: u8,

    /// Directory of the ledger database
    #[structopt(long, env = "TALLY_DATA_DIR", default_value = "tally-data", parse(from_os_str))]
    pub data_dir: PathBuf,

    /// Directory of account key files
    #[structopt(long, env = "TALLY_KEYS_DIR", default_value = "tally-keys", parse(from_os_str))]
    pub keys_dir: PathBuf,

    /// Hex encoded 32-byte key sealing account private keys
    #[structopt(long, env = "TALLY_VAULT_KEY", hide_env_values = true)]
    pub vault_key: Option<String>,

    #[structopt(flatten)]
    pub ledger: LedgerOpt,

    #[structopt(subcommand)]
    pub cmd: Command,
}

#[derive(StructOpt, Debug)]
pub struct LedgerOpt {
    /// Leading zero hex characters required of block hashes
    #[structopt(long, env = "TALLY_DIFFICULTY")]
    pub difficulty: Option<u8>,

    /// Smallest transferable amount
    #[structopt(long, env = "TALLY_MINIMUM_UNIT")]
    pub minimum_unit: Option<u64>,

    /// Monthly levy in percent of the balance
    #[structopt(long, env = "TALLY_LEVY_RATE")]
    pub levy_rate: Option<f64>,

    /// Address receiving levies instead of the genesis collector
    #[structopt(long, env = "TALLY_LEVY_COLLECTOR")]
    pub levy_collector: Option<Address>,

    /// Amount minted to every new account
    #[structopt(long, env = "TALLY_STARTING_BALANCE")]
    pub starting_balance: Option<u64>,

    /// Amount minted to the miner of each block
    #[structopt(long, env = "TALLY_MINING_REWARD")]
    pub mining_reward: Option<u64>,

    /// Seconds after which a mining attempt is abandoned
    #[structopt(long, env = "TALLY_MINING_TIMEOUT")]
    pub mining_timeout: Option<u64>,

    /// Seconds between levy period checks
    #[structopt(long, env = "TALLY_LEVY_INTERVAL")]
    pub levy_interval: Option<u64>,

    /// Accounts levied per batch
    #[structopt(long, env = "TALLY_LEVY_BATCH_SIZE")]
    pub levy_batch_size: Option<usize>,

    /// Milliseconds to pause between levy batches
    #[structopt(long, env = "TALLY_LEVY_BATCH_PAUSE_MS")]
    pub levy_batch_pause_ms: Option<u64>,
}

impl LedgerOpt {
    pub fn to_config(&self) -> LedgerConfig {
        let defaults = LedgerConfig::default();
        LedgerConfig {
            difficulty: self.difficulty.unwrap_or(defaults.difficulty),
            minimum_unit: self.minimum_unit.unwrap_or(defaults.minimum_unit),
            levy_rate_percent: self.levy_rate.unwrap_or(defaults.levy_rate_percent),
            levy_collector: self.levy_collector.or(defaults.levy_collector),
            starting_balance: self.starting_balance.unwrap_or(defaults.starting_balance),
            mining_reward: self.mining_reward.unwrap_or(defaults.mining_reward),
            mining_timeout_secs: self.mining_timeout.or(defaults.mining_timeout_secs),
            levy_check_interval_secs: self
                .levy_interval
                .unwrap_or(defaults.levy_check_interval_secs),
            levy_batch_size: self.levy_batch_size.unwrap_or(defaults.levy_batch_size),
            levy_batch_pause_ms: self
                .levy_batch_pause_ms
                .unwrap_or(defaults.levy_batch_pause_ms),
        }
    }
}

#[derive(StructOpt, Debug)]
pub enum Command {
    /// Print fresh vault key material
    VaultKey,
    /// Create the ledger and its genesis block
    Init,
    /// Manage accounts
    Account(AccountCommand),
    /// Balance and unspent outputs of an address
    Balance { address: Address },
    /// Send value to another account
    Transfer {
        from: Address,
        to: Address,
        amount: u64,
        #[structopt(long)]
        note: Option<String>,
        /// Skip the confirmation prompt
        #[structopt(short, long)]
        yes: bool,
    },
    /// Mine the pending pool into a block
    Mine {
        #[structopt(long)]
        miner: Option<Address>,
    },
    /// Print every block
    Chain,
    /// Print one block by index or hash
    Block { id: String },
    /// Print a transaction
    Tx { hash: Hash },
    /// Transactions of an address, newest first
    History { address: Address },
    /// Pending transactions
    Pending,
    /// Sum of all unspent outputs
    Supply,
    /// Check hash links, proofs of work and Merkle roots
    Validate,
    /// Levy one account, or every account, for a period
    Levy {
        #[structopt(long)]
        address: Option<Address>,
        /// Defaults to the current month
        #[structopt(long)]
        period: Option<Period>,
    },
    /// Levy records of an address
    Levies { address: Address },
    /// Audit events, newest first
    Logs {
        /// mining, validation_failure, levy_deduction, levy_error or integrity_violation
        #[structopt(long)]
        kind: Option<EventKind>,
        #[structopt(long, default_value = "50")]
        limit: usize,
    },
    /// Run the levy scheduler until stdin closes
    Run,
}

#[derive(StructOpt, Debug)]
pub enum AccountCommand {
    /// Provision an account and write its key file
    New,
    /// List accounts with their balances
    List,
    /// Copy a key file into the keys directory
    Import {
        #[structopt(parse(from_os_str))]
        path: PathBuf,
    },
}
