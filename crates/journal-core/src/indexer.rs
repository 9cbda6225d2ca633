use std::sync::Arc;

use serde::Serialize;
use solana_wire::Pubkey;
use tracing::warn;

use crate::codec::{self, AccountSchema, JournalEntryState, ENTRY_OWNER_OFFSET};
use crate::error::JournalError;
use crate::gateway::{AccountFilter, LedgerGateway};
use crate::program::JournalProgram;

/// A decoded entry together with the account it lives at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedEntry {
    pub address: Pubkey,
    #[serde(flatten)]
    pub entry: JournalEntryState,
}

pub struct EntryIndexer {
    program: JournalProgram,
    gateway: Arc<dyn LedgerGateway>,
}

impl EntryIndexer {
    pub fn new(program: JournalProgram, gateway: Arc<dyn LedgerGateway>) -> Self {
        Self { program, gateway }
    }

    /// Every entry owned by `owner`.
    pub async fn list_by_owner(&self, owner: &Pubkey) -> Result<Vec<IndexedEntry>, JournalError> {
        self.scan(vec![
            AccountFilter::memcmp(0, JournalEntryState::discriminator()),
            AccountFilter::memcmp(ENTRY_OWNER_OFFSET, owner.to_bytes()),
        ])
        .await
    }

    /// Every entry, regardless of owner.
    pub async fn list_all(&self) -> Result<Vec<IndexedEntry>, JournalError> {
        self.scan(vec![AccountFilter::memcmp(
            0,
            JournalEntryState::discriminator(),
        )])
        .await
    }

    async fn scan(&self, filters: Vec<AccountFilter>) -> Result<Vec<IndexedEntry>, JournalError> {
        let accounts = self
            .gateway
            .program_accounts(&self.program.program_id, &filters)
            .await?;

        // A malformed record is skipped, never fatal to the listing.
        Ok(accounts
            .into_iter()
            .filter_map(|account| match codec::decode::<JournalEntryState>(&account.data) {
                Ok(entry) => Some(IndexedEntry {
                    address: account.address,
                    entry,
                }),
                Err(e) => {
                    warn!(address = %account.address, error = %e, "skipping undecodable entry");
                    None
                }
            })
            .collect())
    }
}
