//! Application state

use std::sync::Arc;

use journal_core::{
    CounterService, EntryIndexer, JournalProgram, JournalService, LedgerGateway,
    TransactionComposer,
};
use solana_wire::TransactionSigner;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub journal: Arc<JournalService>,
    pub counter: Arc<CounterService>,
    pub indexer: Arc<EntryIndexer>,
}

impl AppState {
    pub fn new(
        program: JournalProgram,
        gateway: Arc<dyn LedgerGateway>,
        service: Arc<dyn TransactionSigner>,
        max_compose_attempts: u32,
    ) -> Self {
        let composer = Arc::new(TransactionComposer::new(gateway.clone(), service));
        let counter = Arc::new(CounterService::new(program, composer.clone()));
        let journal = JournalService::new(program, composer, counter.clone())
            .with_max_compose_attempts(max_compose_attempts);

        Self {
            journal: Arc::new(journal),
            counter,
            indexer: Arc::new(EntryIndexer::new(program, gateway)),
        }
    }
}
