//! Solana wire-level primitives for the journal relay.
//!
//! Addresses, program derived addresses, legacy message compilation, the
//! two-party signing envelope and the compute-budget instruction, all
//! implemented by hand on top of `ed25519-dalek`, `curve25519-dalek`, `sha2`
//! and `bs58` instead of pulling in `solana-sdk`.

pub mod address;
pub mod compute_budget;
pub mod error;
pub mod keypair;
pub mod pda;
pub mod transaction;

pub use address::{address_to_bytes, bytes_to_address, Pubkey};
pub use compute_budget::{
    parse_compute_unit_limit, set_compute_unit_limit, COMPUTE_BUDGET_PROGRAM_ID,
    MAX_COMPUTE_UNIT_LIMIT,
};
pub use error::SolError;
pub use keypair::{Keypair, TransactionSigner};
pub use pda::{create_program_address, find_program_address, is_on_curve};
pub use transaction::{
    compile_message, cosign_wire_transaction, decode_compact_u16, encode_compact_u16,
    CompiledInstruction, Envelope, FullySigned, Message, PartiallySigned, SolAccountMeta,
    SolInstruction, Unsigned, SYSTEM_PROGRAM_ID,
};
