use std::sync::Arc;

use serde::Serialize;
use solana_wire::Pubkey;
use tracing::info;

use crate::codec::{self, CounterState};
use crate::composer::TransactionComposer;
use crate::error::JournalError;
use crate::program::JournalProgram;

/// The counter account as currently seen on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterReading {
    Present { address: Pubkey, state: CounterState },
    /// Not created yet. A normal state before the first initialization.
    Absent { address: Pubkey },
}

impl CounterReading {
    pub fn address(&self) -> Pubkey {
        match self {
            CounterReading::Present { address, .. } | CounterReading::Absent { address } => {
                *address
            }
        }
    }

    pub fn count(&self) -> Option<u32> {
        match self {
            CounterReading::Present { state, .. } => Some(state.count),
            CounterReading::Absent { .. } => None,
        }
    }
}

/// Result of [`CounterService::initialize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Initialization {
    AlreadyInitialized { counter: Pubkey, count: u32 },
    Initialized { counter: Pubkey, signature: String },
}

impl Initialization {
    pub fn counter(&self) -> Pubkey {
        match self {
            Initialization::AlreadyInitialized { counter, .. }
            | Initialization::Initialized { counter, .. } => *counter,
        }
    }
}

pub struct CounterService {
    program: JournalProgram,
    composer: Arc<TransactionComposer>,
}

impl CounterService {
    pub fn new(program: JournalProgram, composer: Arc<TransactionComposer>) -> Self {
        Self { program, composer }
    }

    pub fn address(&self) -> Result<Pubkey, JournalError> {
        Ok(self.program.counter_address()?.0)
    }

    /// Read the counter, distinguishing a missing account from a bad one.
    pub async fn read_or_absent(&self) -> Result<CounterReading, JournalError> {
        let address = self.address()?;
        match self.composer.gateway().account_bytes(&address).await? {
            None => Ok(CounterReading::Absent { address }),
            Some(data) => Ok(CounterReading::Present {
                address,
                state: codec::decode::<CounterState>(&data)?,
            }),
        }
    }

    /// Create the counter account if it does not exist yet.
    ///
    /// The transaction is signed and paid for by the service alone and is
    /// submitted directly.
    pub async fn initialize(&self) -> Result<Initialization, JournalError> {
        if let CounterReading::Present { address, state } = self.read_or_absent().await? {
            info!(counter = %address, count = state.count, "counter already initialized");
            return Ok(Initialization::AlreadyInitialized {
                counter: address,
                count: state.count,
            });
        }

        let counter = self.address()?;
        let payer = self.composer.service().pubkey();
        let ix = self.program.initialize_counter(&payer)?;

        let signed = self.composer.compose_fresh(&[ix]).await?.finalize()?;
        let signature = self.composer.gateway().submit_and_confirm(&signed).await?;

        info!(counter = %counter, %signature, "counter initialized");
        Ok(Initialization::Initialized { counter, signature })
    }
}
