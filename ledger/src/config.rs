use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_powork::MAX_DIFFICULTY;

use crate::account::Address;
use crate::error::{LedgerError, Result};

/// Tunables of a [`crate::Ledger`]. Missing fields deserialize to their
/// defaults.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LedgerConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
    #[serde(default = "default_minimum_unit")]
    pub minimum_unit: u64,
    #[serde(default = "default_levy_rate_percent")]
    pub levy_rate_percent: f64,
    /// Falls back to the collector named by the genesis block.
    #[serde(default)]
    pub levy_collector: Option<Address>,
    #[serde(default = "default_starting_balance")]
    pub starting_balance: u64,
    #[serde(default)]
    pub mining_reward: u64,
    #[serde(default)]
    pub mining_timeout_secs: Option<u64>,
    #[serde(default = "default_levy_check_interval_secs")]
    pub levy_check_interval_secs: u64,
    #[serde(default = "default_levy_batch_size")]
    pub levy_batch_size: usize,
    /// Pause between levy batches, leaving the chain to transfers.
    #[serde(default = "default_levy_batch_pause_ms")]
    pub levy_batch_pause_ms: u64,
}

fn default_difficulty() -> u8 {
    4
}

fn default_minimum_unit() -> u64 {
    1
}

fn default_levy_rate_percent() -> f64 {
    2.5
}

fn default_starting_balance() -> u64 {
    1000
}

fn default_levy_check_interval_secs() -> u64 {
    24 * 60 * 60
}

fn default_levy_batch_size() -> usize {
    64
}

fn default_levy_batch_pause_ms() -> u64 {
    10
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            difficulty: default_difficulty(),
            minimum_unit: default_minimum_unit(),
            levy_rate_percent: default_levy_rate_percent(),
            levy_collector: None,
            starting_balance: default_starting_balance(),
            mining_reward: 0,
            mining_timeout_secs: None,
            levy_check_interval_secs: default_levy_check_interval_secs(),
            levy_batch_size: default_levy_batch_size(),
            levy_batch_pause_ms: default_levy_batch_pause_ms(),
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::InvalidInput(format!(
                "difficulty must be at most {}, found {}",
                MAX_DIFFICULTY, self.difficulty
            )));
        }
        if self.minimum_unit == 0 {
            return Err(LedgerError::InvalidInput(String::from(
                "minimum unit must be positive",
            )));
        }
        if !(0.0..=100.0).contains(&self.levy_rate_percent) {
            return Err(LedgerError::InvalidInput(format!(
                "levy rate must be between 0 and 100 percent, found {}",
                self.levy_rate_percent
            )));
        }
        if self.levy_batch_size == 0 || self.levy_check_interval_secs == 0 {
            return Err(LedgerError::InvalidInput(String::from(
                "levy batch size and check interval must be positive",
            )));
        }
        Ok(())
    }

    /// Levy rate in basis points, rounded to the nearest point.
    pub fn levy_rate_bps(&self) -> u64 {
        (self.levy_rate_percent * 100.0).round() as u64
    }

    /// `balance * rate`, rounded down to whole units.
    pub fn levy_on(&self, balance: u64) -> u64 {
        (balance as u128 * self.levy_rate_bps() as u128 / 10_000) as u64
    }

    pub fn mining_timeout(&self) -> Option<Duration> {
        self.mining_timeout_secs.map(Duration::from_secs)
    }

    pub fn levy_check_interval(&self) -> Duration {
        Duration::from_secs(self.levy_check_interval_secs)
    }

    pub fn levy_batch_pause(&self) -> Duration {
        Duration::from_millis(self.levy_batch_pause_ms)
    }
}
