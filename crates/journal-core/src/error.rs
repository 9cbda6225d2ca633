use solana_wire::{Pubkey, SolError};
use thiserror::Error;

use crate::codec::CodecError;

/// Failure talking to the ledger.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),

    #[error("Simulation failed: {reason}")]
    SimulationFailed { reason: String, logs: Vec<String> },

    #[error("Transaction {signature} failed: {reason}")]
    TransactionFailed { signature: String, reason: String },

    #[error("Transaction {signature} not confirmed after {attempts} polls")]
    ConfirmationTimeout { signature: String, attempts: u32 },
}

/// Failure in a journal flow.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("Counter not initialized")]
    CounterNotInitialized { counter: Pubkey },

    #[error("Compute estimation failed: {reason}")]
    EstimationFailed { reason: String, logs: Vec<String> },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Account decode failed: {0}")]
    Codec(#[from] CodecError),

    #[error("Ledger wire error: {0}")]
    Wire(#[from] SolError),

    #[error("Gateway error: {0}")]
    Gateway(GatewayError),
}

impl From<GatewayError> for JournalError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::SimulationFailed { reason, logs } => {
                JournalError::EstimationFailed { reason, logs }
            }
            other => JournalError::Gateway(other),
        }
    }
}

impl JournalError {
    /// Absence of the counter is a caller-side precondition, not a fault.
    pub fn is_counter_absent(&self) -> bool {
        matches!(self, JournalError::CounterNotInitialized { .. })
    }
}
