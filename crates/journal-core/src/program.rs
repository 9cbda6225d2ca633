//! The on-ledger journal program: address scheme and instruction builders.

use sha2::{Digest, Sha256};
use solana_wire::{
    find_program_address, Pubkey, SolAccountMeta, SolError, SolInstruction, SYSTEM_PROGRAM_ID,
};

use crate::codec::{put_string, MAX_MESSAGE_LEN, MAX_TITLE_LEN};
use crate::error::JournalError;

pub const DISCRIMINATOR_LEN: usize = 8;

/// Seed for the singleton counter account.
pub const COUNTER_SEED: &[u8] = b"journal-counter";

/// Leading seed for entry accounts.
pub const ENTRY_SEED: &[u8] = b"journal-entry";

/// Default deployment: `91be9qkpnxDk6vrFc1fpxz7pxB3Ec5aAhgVussaw1VSj`
pub const DEFAULT_PROGRAM_ID: Pubkey = Pubkey::new([
    0x77, 0x04, 0xa9, 0xe2, 0xb9, 0x90, 0x77, 0x95, 0x43, 0x68, 0xd8, 0xd6, 0xf9, 0x3a, 0x36,
    0xb0, 0x6b, 0xd8, 0x07, 0x0e, 0xd5, 0xce, 0xd4, 0x43, 0x77, 0x85, 0x39, 0xaa, 0x58, 0xf9,
    0x9e, 0x44,
]);

/// Anchor discriminator: first 8 bytes of `sha256("<namespace>:<name>")`.
pub fn discriminator(namespace: &str, name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let digest = Sha256::new()
        .chain_update(namespace.as_bytes())
        .chain_update(b":")
        .chain_update(name.as_bytes())
        .finalize();
    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
    out
}

fn instruction_data(name: &str) -> Vec<u8> {
    discriminator("global", name).to_vec()
}

/// A deployed instance of the journal program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalProgram {
    pub program_id: Pubkey,
}

impl Default for JournalProgram {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM_ID)
    }
}

impl JournalProgram {
    pub const fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    /// `PDA(["journal-counter"])`
    pub fn counter_address(&self) -> Result<(Pubkey, u8), SolError> {
        find_program_address(&[COUNTER_SEED], &self.program_id)
    }

    /// `PDA(["journal-entry", count u32 LE, owner])`
    pub fn entry_address(&self, count: u32, owner: &Pubkey) -> Result<(Pubkey, u8), SolError> {
        let count = count.to_le_bytes();
        find_program_address(&[ENTRY_SEED, &count, owner.as_ref()], &self.program_id)
    }

    /// Accounts: `[payer (w, s), counter (w), system]`.
    pub fn initialize_counter(&self, payer: &Pubkey) -> Result<SolInstruction, SolError> {
        let (counter, _) = self.counter_address()?;
        Ok(SolInstruction {
            program_id: self.program_id,
            accounts: vec![
                SolAccountMeta::writable_signer(*payer),
                SolAccountMeta::writable(counter),
                SolAccountMeta::readonly(SYSTEM_PROGRAM_ID),
            ],
            data: instruction_data("initialize_counter"),
        })
    }

    /// Accounts: `[signer (w, s), counter (w), entry (w), system]`.
    ///
    /// `entry` must be the address derived from the counter value the ledger
    /// will see at execution time.
    pub fn create_journal_entry(
        &self,
        signer: &Pubkey,
        entry: &Pubkey,
        title: &str,
        message: &str,
    ) -> Result<SolInstruction, JournalError> {
        let (counter, _) = self.counter_address()?;
        let mut data = instruction_data("create_journal_entry");
        put_string(&mut data, "title", title, MAX_TITLE_LEN)?;
        put_string(&mut data, "message", message, MAX_MESSAGE_LEN)?;

        Ok(SolInstruction {
            program_id: self.program_id,
            accounts: vec![
                SolAccountMeta::writable_signer(*signer),
                SolAccountMeta::writable(counter),
                SolAccountMeta::writable(*entry),
                SolAccountMeta::readonly(SYSTEM_PROGRAM_ID),
            ],
            data,
        })
    }

    /// Accounts: `[signer (w, s), entry (w), system]`.
    pub fn update_journal_entry(
        &self,
        signer: &Pubkey,
        count: u32,
        title: &str,
        message: &str,
    ) -> Result<SolInstruction, JournalError> {
        let (entry, _) = self.entry_address(count, signer)?;
        let mut data = instruction_data("update_journal_entry");
        put_string(&mut data, "title", title, MAX_TITLE_LEN)?;
        put_string(&mut data, "message", message, MAX_MESSAGE_LEN)?;
        data.extend_from_slice(&count.to_le_bytes());

        Ok(SolInstruction {
            program_id: self.program_id,
            accounts: vec![
                SolAccountMeta::writable_signer(*signer),
                SolAccountMeta::writable(entry),
                SolAccountMeta::readonly(SYSTEM_PROGRAM_ID),
            ],
            data,
        })
    }

    /// Accounts: `[signer (w, s), entry (w)]`. The entry's rent goes back
    /// to the signer.
    pub fn delete_journal_entry(
        &self,
        signer: &Pubkey,
        count: u32,
    ) -> Result<SolInstruction, JournalError> {
        let (entry, _) = self.entry_address(count, signer)?;
        let mut data = instruction_data("delete_journal_entry");
        data.extend_from_slice(&count.to_le_bytes());

        Ok(SolInstruction {
            program_id: self.program_id,
            accounts: vec![
                SolAccountMeta::writable_signer(*signer),
                SolAccountMeta::writable(entry),
            ],
            data,
        })
    }
}
