//! Compute Budget program instructions.

use crate::address::Pubkey;
use crate::transaction::SolInstruction;

/// Compute Budget Program ID: `ComputeBudget111111111111111111111111111111`
pub const COMPUTE_BUDGET_PROGRAM_ID: Pubkey = Pubkey::new([
    0x03, 0x06, 0x46, 0x6f, 0xe5, 0x21, 0x17, 0x32, 0xff, 0xec, 0xad, 0xba, 0x72, 0xc3, 0x9b,
    0xe7, 0xbc, 0x8c, 0xe5, 0xbb, 0xc5, 0xf7, 0x12, 0x6b, 0x2c, 0x43, 0x9b, 0x3a, 0x40, 0x00,
    0x00, 0x00,
]);

/// Upper bound the runtime accepts for a transaction's compute unit limit.
pub const MAX_COMPUTE_UNIT_LIMIT: u32 = 1_400_000;

/// `SetComputeUnitLimit` instruction tag.
const SET_COMPUTE_UNIT_LIMIT: u8 = 2;

/// Build a `SetComputeUnitLimit` instruction.
///
/// Data: `[2]` followed by the limit as u32 LE. No accounts.
pub fn set_compute_unit_limit(units: u32) -> SolInstruction {
    let mut data = Vec::with_capacity(5);
    data.push(SET_COMPUTE_UNIT_LIMIT);
    data.extend_from_slice(&units.to_le_bytes());

    SolInstruction {
        program_id: COMPUTE_BUDGET_PROGRAM_ID,
        accounts: Vec::new(),
        data,
    }
}

/// Read the limit back out of a `SetComputeUnitLimit` instruction.
pub fn parse_compute_unit_limit(ix: &SolInstruction) -> Option<u32> {
    if ix.program_id != COMPUTE_BUDGET_PROGRAM_ID || ix.data.len() != 5 {
        return None;
    }
    if ix.data[0] != SET_COMPUTE_UNIT_LIMIT {
        return None;
    }
    Some(u32::from_le_bytes([ix.data[1], ix.data[2], ix.data[3], ix.data[4]]))
}
