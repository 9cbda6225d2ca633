//! The ledger as seen by the journal core.
//!
//! Every component takes an `Arc<dyn LedgerGateway>` at construction. The
//! production implementation speaks JSON-RPC ([`crate::rpc::RpcGateway`]);
//! tests use the in-memory [`crate::mock::MockLedger`].

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_wire::{Envelope, FullySigned, Pubkey};

use crate::error::GatewayError;

/// Recent blockhash plus the last block height at which it is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TipMarker {
    pub blockhash: [u8; 32],
    pub last_valid_block_height: u64,
}

impl TipMarker {
    pub fn blockhash_base58(&self) -> String {
        bs58::encode(self.blockhash).into_string()
    }
}

/// `memcmp` filter: account data at `offset` must equal `bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountFilter {
    pub offset: usize,
    pub bytes: Vec<u8>,
}

impl AccountFilter {
    pub fn memcmp(offset: usize, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            offset,
            bytes: bytes.into(),
        }
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        data.get(self.offset..self.offset + self.bytes.len())
            .is_some_and(|window| window == self.bytes.as_slice())
    }
}

/// A program account returned by a filtered scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedAccount {
    pub address: Pubkey,
    pub data: Vec<u8>,
}

/// Confirmation level used for reads and confirmation polling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }

    /// Whether a status reported by the ledger satisfies this level.
    pub fn is_satisfied_by(&self, reported: Commitment) -> bool {
        reported.rank() >= self.rank()
    }

    fn rank(self) -> u8 {
        match self {
            Commitment::Processed => 0,
            Commitment::Confirmed => 1,
            Commitment::Finalized => 2,
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(format!("unknown commitment level: {other}")),
        }
    }
}

#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Fetch a fresh tip marker.
    async fn latest_tip(&self) -> Result<TipMarker, GatewayError>;

    /// Raw account data, or `None` if the account does not exist.
    async fn account_bytes(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, GatewayError>;

    /// All accounts owned by `program` whose data matches every filter.
    async fn program_accounts(
        &self,
        program: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<KeyedAccount>, GatewayError>;

    /// Simulate a wire transaction (signatures not verified) and return the
    /// compute units it consumed.
    ///
    /// Fails with [`GatewayError::SimulationFailed`] carrying the program
    /// logs when execution would fail.
    async fn estimate_compute_limit(&self, wire_tx: &[u8]) -> Result<u32, GatewayError>;

    /// Submit a fully signed transaction and wait for confirmation.
    /// Returns the base58 signature.
    async fn submit_and_confirm(
        &self,
        tx: &Envelope<FullySigned>,
    ) -> Result<String, GatewayError>;
}
