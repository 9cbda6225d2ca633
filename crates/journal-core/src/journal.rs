//! Entry creation, update and deletion flows.
//!
//! Each flow produces a transaction paid for and partially signed by the
//! service; the entry owner completes it with their own signature and
//! submits it themselves.

use std::sync::Arc;

use solana_wire::{Envelope, PartiallySigned, Pubkey, SolInstruction};
use tracing::{info, warn};

use crate::codec::{check_len, MAX_MESSAGE_LEN, MAX_TITLE_LEN};
use crate::composer::TransactionComposer;
use crate::counter::{CounterReading, CounterService};
use crate::error::JournalError;
use crate::program::JournalProgram;

pub const DEFAULT_MAX_COMPOSE_ATTEMPTS: u32 = 3;

/// A transaction ready for the owner's signature.
#[derive(Debug)]
pub struct PreparedTransaction {
    pub envelope: Envelope<PartiallySigned>,
    /// Account the transaction writes the entry to.
    pub entry_address: Pubkey,
    /// Counter value the entry address was derived from.
    pub count: u32,
}

impl PreparedTransaction {
    pub fn to_base64(&self) -> String {
        self.envelope.to_base64()
    }
}

pub struct JournalService {
    program: JournalProgram,
    composer: Arc<TransactionComposer>,
    counter: Arc<CounterService>,
    max_compose_attempts: u32,
}

impl JournalService {
    pub fn new(
        program: JournalProgram,
        composer: Arc<TransactionComposer>,
        counter: Arc<CounterService>,
    ) -> Self {
        Self {
            program,
            composer,
            counter,
            max_compose_attempts: DEFAULT_MAX_COMPOSE_ATTEMPTS,
        }
    }

    pub fn with_max_compose_attempts(mut self, attempts: u32) -> Self {
        self.max_compose_attempts = attempts.max(1);
        self
    }

    /// Prepare a `create_journal_entry` transaction for `signer`.
    ///
    /// The entry address depends on the counter value at execution time. If
    /// simulation fails and a fresh read shows the counter has moved since it
    /// was read, composition is retried against the new value, at most
    /// `max_compose_attempts` times in total. A failure with an unchanged
    /// counter is returned as is.
    pub async fn prepare_create_entry(
        &self,
        signer: &Pubkey,
        title: &str,
        message: &str,
    ) -> Result<PreparedTransaction, JournalError> {
        validate_text(title, message)?;

        let mut count = self.current_count().await?;
        let mut attempt = 1;
        loop {
            let (entry_address, _) = self.program.entry_address(count, signer)?;
            let ix = self
                .program
                .create_journal_entry(signer, &entry_address, title, message)?;

            match self.composer.compose_fresh(&[ix]).await {
                Ok(envelope) => {
                    info!(owner = %signer, entry = %entry_address, count, "entry transaction prepared");
                    return Ok(PreparedTransaction {
                        envelope,
                        entry_address,
                        count,
                    });
                }
                Err(err @ JournalError::EstimationFailed { .. })
                    if attempt < self.max_compose_attempts =>
                {
                    let latest = self.current_count().await?;
                    if latest == count {
                        return Err(err);
                    }
                    warn!(stale = count, latest, attempt, "counter moved during compose, retrying");
                    count = latest;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Prepare an `update_journal_entry` transaction for the entry created at
    /// `count` by `signer`.
    pub async fn prepare_update_entry(
        &self,
        signer: &Pubkey,
        count: u32,
        title: &str,
        message: &str,
    ) -> Result<PreparedTransaction, JournalError> {
        validate_text(title, message)?;
        let ix = self
            .program
            .update_journal_entry(signer, count, title, message)?;
        self.prepare_existing(signer, count, ix).await
    }

    /// Prepare a `delete_journal_entry` transaction for the entry created at
    /// `count` by `signer`.
    pub async fn prepare_delete_entry(
        &self,
        signer: &Pubkey,
        count: u32,
    ) -> Result<PreparedTransaction, JournalError> {
        let ix = self.program.delete_journal_entry(signer, count)?;
        self.prepare_existing(signer, count, ix).await
    }

    async fn prepare_existing(
        &self,
        signer: &Pubkey,
        count: u32,
        ix: SolInstruction,
    ) -> Result<PreparedTransaction, JournalError> {
        let (entry_address, _) = self.program.entry_address(count, signer)?;
        let envelope = self.composer.compose_fresh(&[ix]).await?;
        Ok(PreparedTransaction {
            envelope,
            entry_address,
            count,
        })
    }

    async fn current_count(&self) -> Result<u32, JournalError> {
        match self.counter.read_or_absent().await? {
            CounterReading::Present { state, .. } => Ok(state.count),
            CounterReading::Absent { address } => {
                info!(counter = %address, "counter not initialized");
                Err(JournalError::CounterNotInitialized { counter: address })
            }
        }
    }
}

fn validate_text(title: &str, message: &str) -> Result<(), JournalError> {
    check_len("title", title, MAX_TITLE_LEN)?;
    check_len("message", message, MAX_MESSAGE_LEN)?;
    Ok(())
}
