//! Core of the journal relay: account codec, ledger gateway, transaction
//! composition and the counter, indexing and entry flows built on them.

pub mod codec;
pub mod composer;
pub mod counter;
pub mod error;
pub mod gateway;
pub mod indexer;
pub mod journal;
pub mod mock;
pub mod program;
pub mod rpc;

pub use codec::{CodecError, CounterState, JournalEntryState};
pub use composer::TransactionComposer;
pub use counter::{CounterReading, CounterService, Initialization};
pub use error::{GatewayError, JournalError};
pub use gateway::{AccountFilter, Commitment, KeyedAccount, LedgerGateway, TipMarker};
pub use indexer::{EntryIndexer, IndexedEntry};
pub use journal::{JournalService, PreparedTransaction, DEFAULT_MAX_COMPOSE_ATTEMPTS};
pub use mock::MockLedger;
pub use program::{JournalProgram, DEFAULT_PROGRAM_ID};
pub use rpc::{RpcConfig, RpcGateway};
