//! Monthly levy against every account balance, paid to the collector.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use crossbeam_channel::{bounded, select, tick, Sender};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use strum::Display as StrumDisplay;
use tally_crypto::Hash;

use crate::account::Address;
use crate::chain::Ledger;
use crate::error::{LedgerError, Result};
use crate::event::{self, Event, EventKind};
use crate::store::Store;
use crate::transaction::{now, TransactionKind};

/// A calendar month, rendered `YYYY-MM`.
#[derive(
    Serialize, Deserialize, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash, Debug,
)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(LedgerError::InvalidInput(format!(
                "month must be between 1 and 12, found {}",
                month
            )));
        }
        Ok(Period { year, month })
    }

    pub fn of<Tz: TimeZone>(time: &DateTime<Tz>) -> Self {
        Period {
            year: time.year(),
            month: time.month(),
        }
    }

    pub fn current() -> Self {
        Period::of(&Utc::now())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Period {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Period {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || LedgerError::InvalidInput(format!("period must be YYYY-MM, found {:?}", s));
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        Period::new(
            year.parse().map_err(|_| invalid())?,
            month.parse().map_err(|_| invalid())?,
        )
    }
}

/// One applied deduction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LevyRecord {
    pub address: Address,
    pub amount: u64,
    pub balance_before: u64,
    pub balance_after: u64,
    pub tx_hash: Hash,
    pub block_hash: Option<Hash>,
    pub period: Period,
    pub deducted_at: i64,
}

#[derive(StrumDisplay, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum SkipReason {
    Collector,
    AlreadyDeducted,
    NoBalance,
    BelowMinimum,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LevyOutcome {
    Deducted(LevyRecord),
    Skipped(SkipReason),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LevyReport {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct LevyJob<'a, S: Store> {
    ledger: &'a Ledger<S>,
}

impl<'a, S: Store> LevyJob<'a, S> {
    pub fn new(ledger: &'a Ledger<S>) -> Self {
        LevyJob { ledger }
    }

    /// Levies every account for `period`. Failures are logged and counted
    /// per account and never abort the run. Locks are taken per account;
    /// the job yields after each account and pauses after each batch.
    pub fn run(&self, period: Period) -> Result<LevyReport> {
        let config = self.ledger.config();
        let addresses = self
            .ledger
            .accounts()?
            .into_iter()
            .map(|a| a.address)
            .collect::<Vec<Address>>();
        info!("Levy for {} over {} accounts", period, addresses.len());

        let mut report = LevyReport::default();
        let mut batches = addresses.chunks(config.levy_batch_size).peekable();
        while let Some(batch) = batches.next() {
            for address in batch {
                match self.deduct(address, period) {
                    Ok(LevyOutcome::Deducted(_)) => report.succeeded += 1,
                    Ok(LevyOutcome::Skipped(reason)) => {
                        debug!("Levy skipped for {}: {}", address, reason);
                        report.skipped += 1;
                    }
                    Err(e) => {
                        warn!("Levy failed for {}: {}", address, e);
                        event::record(
                            self.ledger.store(),
                            Event::new(EventKind::LevyError, format!("levy {} failed: {}", period, e))
                                .with_address(*address),
                        );
                        report.failed += 1;
                    }
                }
                thread::yield_now();
            }
            if batches.peek().is_some() {
                thread::sleep(config.levy_batch_pause());
            }
        }
        info!(
            "Levy for {} done: {} deducted, {} skipped, {} failed",
            period, report.succeeded, report.skipped, report.failed
        );
        Ok(report)
    }

    /// Levies a single account for `period`.
    pub fn deduct(&self, address: &Address, period: Period) -> Result<LevyOutcome> {
        let _guard = self.ledger.levy_guard();
        let config = self.ledger.config();
        let collector = self.ledger.collector();

        let mut account = self.ledger.account(address)?;
        if account.address == collector {
            return Ok(LevyOutcome::Skipped(SkipReason::Collector));
        }
        let note = format!("levy {}", period);
        if account.levy.last_period == Some(period) || self.has_levy_transaction(address, &note)? {
            return Ok(LevyOutcome::Skipped(SkipReason::AlreadyDeducted));
        }
        let balance = self.ledger.balance(address)?;
        if balance == 0 {
            return Ok(LevyOutcome::Skipped(SkipReason::NoBalance));
        }
        let amount = config.levy_on(balance);
        if amount < config.minimum_unit {
            return Ok(LevyOutcome::Skipped(SkipReason::BelowMinimum));
        }

        let private_key = self.ledger.unseal(&account)?;
        let tx = self.ledger.submit(
            TransactionKind::LevyDeduction,
            address,
            &collector,
            amount,
            Some(note),
            &private_key,
        )?;

        let record = LevyRecord {
            address: *address,
            amount,
            balance_before: balance,
            balance_after: balance - amount,
            tx_hash: tx.hash,
            block_hash: tx.block_hash,
            period,
            deducted_at: now(),
        };
        self.ledger.store().put_levy(&record)?;

        account.levy.last_period = Some(period);
        account.levy.period_deducted = amount;
        account.levy.total_deducted = account
            .levy
            .total_deducted
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        self.ledger.store().put_account(&account)?;

        let mut deducted = Event::new(
            EventKind::LevyDeduction,
            format!("levied {} of {} for {}", amount, balance, period),
        )
        .with_address(*address)
        .with_tx(tx.hash);
        if let Some(block_hash) = tx.block_hash {
            deducted = deducted.with_block(block_hash);
        }
        event::record(self.ledger.store(), deducted);
        info!("Levied {} from {} for {}", amount, address, period);
        Ok(LevyOutcome::Deducted(record))
    }

    /// Whether a levy transaction for the period was already submitted,
    /// even if the bookkeeping that follows it was not stored.
    fn has_levy_transaction(&self, address: &Address, note: &str) -> Result<bool> {
        Ok(self.ledger.history(address)?.iter().any(|tx| {
            tx.payload.kind == TransactionKind::LevyDeduction
                && tx.payload.sender.as_ref() == Some(address)
                && tx.payload.note.as_deref() == Some(note)
        }))
    }
}

/// Background thread that runs the levy whenever the observed period
/// differs from the last one it saw.
pub struct LevyScheduler {
    shutdown: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl LevyScheduler {
    pub fn spawn<S: Store + 'static>(ledger: Arc<Ledger<S>>) -> Self {
        let interval = ledger.config().levy_check_interval();
        Self::spawn_with_clock(ledger, interval, Period::current)
    }

    pub fn spawn_with_clock<S, C>(ledger: Arc<Ledger<S>>, interval: Duration, clock: C) -> Self
    where
        S: Store + 'static,
        C: Fn() -> Period + Send + 'static,
    {
        let (shutdown, stop) = bounded::<()>(1);
        let handle = thread::spawn(move || {
            let ticker = tick(interval);
            let mut seen = clock();
            info!("Levy scheduler started in period {}", seen);
            loop {
                select! {
                    recv(ticker) -> _ => {
                        let period = clock();
                        if period != seen {
                            seen = period;
                            if let Err(e) = LevyJob::new(&*ledger).run(period) {
                                warn!("Levy run for {} aborted: {}", period, e);
                            }
                        }
                    }
                    recv(stop) -> _ => break,
                }
            }
            info!("Levy scheduler stopped");
        });
        LevyScheduler {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        let _ = self.shutdown.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LevyScheduler {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}
