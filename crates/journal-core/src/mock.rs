//! In-memory ledger for tests and local development.
//!
//! Holds program accounts in a map and executes the journal program's four
//! instructions against them, so simulation rejects exactly what the real
//! program would reject for stale counters, missing accounts and duplicate
//! initialization. Failures can also be scripted.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use solana_wire::{Envelope, FullySigned, PartiallySigned, Pubkey, SolInstruction};
use tracing::debug;

use crate::codec::{
    self, ByteReader, CounterState, JournalEntryState, MAX_MESSAGE_LEN, MAX_TITLE_LEN,
};
use crate::error::GatewayError;
use crate::gateway::{AccountFilter, KeyedAccount, LedgerGateway, TipMarker};
use crate::program::{discriminator, JournalProgram, DISCRIMINATOR_LEN};

/// Compute units reported for a successful simulation unless overridden.
pub const DEFAULT_SIMULATED_UNITS: u32 = 25_000;

#[derive(Default)]
struct LedgerState {
    /// address -> (owning program, data)
    accounts: BTreeMap<Pubkey, (Pubkey, Vec<u8>)>,
    scripted_simulations: VecDeque<GatewayError>,
    scripted_failures: VecDeque<GatewayError>,
    simulations: Vec<Vec<u8>>,
    submissions: Vec<Vec<u8>>,
    tip_height: u64,
}

pub struct MockLedger {
    program: JournalProgram,
    units: u32,
    state: Mutex<LedgerState>,
}

impl MockLedger {
    pub fn new(program: JournalProgram) -> Self {
        Self {
            program,
            units: DEFAULT_SIMULATED_UNITS,
            state: Mutex::new(LedgerState {
                tip_height: 1_000,
                ..LedgerState::default()
            }),
        }
    }

    /// Report `units` from every successful simulation.
    pub fn with_simulated_units(mut self, units: u32) -> Self {
        self.units = units;
        self
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store raw account data owned by `owner_program`.
    pub fn set_account(&self, address: Pubkey, owner_program: Pubkey, data: Vec<u8>) {
        self.state().accounts.insert(address, (owner_program, data));
    }

    pub fn remove_account(&self, address: &Pubkey) {
        self.state().accounts.remove(address);
    }

    /// Create or overwrite the counter account.
    pub fn set_counter(&self, count: u32) -> Result<(), GatewayError> {
        let (address, _) = self.program.counter_address().map_err(internal)?;
        let data = codec::encode(&CounterState { count }).map_err(internal)?;
        self.set_account(address, self.program.program_id, data);
        Ok(())
    }

    /// Store an entry at the address derived from `(count, owner)`.
    pub fn insert_entry(&self, count: u32, entry: &JournalEntryState) -> Result<Pubkey, GatewayError> {
        let (address, _) = self
            .program
            .entry_address(count, &entry.owner)
            .map_err(internal)?;
        let data = codec::encode(entry).map_err(internal)?;
        self.set_account(address, self.program.program_id, data);
        Ok(address)
    }

    /// Fail the next simulation with `reason` and `logs`.
    pub fn fail_next_simulation(&self, reason: impl Into<String>, logs: Vec<String>) {
        self.state()
            .scripted_simulations
            .push_back(GatewayError::SimulationFailed {
                reason: reason.into(),
                logs,
            });
    }

    /// Fail the next gateway call of any kind with `error`.
    pub fn fail_next_call(&self, error: GatewayError) {
        self.state().scripted_failures.push_back(error);
    }

    /// Wire bytes of every transaction passed to simulation.
    pub fn simulations(&self) -> Vec<Vec<u8>> {
        self.state().simulations.clone()
    }

    /// Wire bytes of every submitted transaction.
    pub fn submissions(&self) -> Vec<Vec<u8>> {
        self.state().submissions.clone()
    }

    fn scripted_failure(&self) -> Result<(), GatewayError> {
        match self.state().scripted_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Run every journal instruction in the message against a scratch copy
    /// of the account map; commit only when `commit` is set and all succeed.
    fn execute(&self, wire_tx: &[u8], commit: bool) -> Result<(), GatewayError> {
        let envelope = Envelope::<PartiallySigned>::from_wire(wire_tx)
            .map_err(|e| GatewayError::InvalidResponse(format!("undecodable transaction: {e}")))?;
        let instructions = envelope.message().decompile().map_err(internal)?;

        let mut state = self.state();
        let mut scratch = state.accounts.clone();
        let mut logs = Vec::new();

        for ix in instructions
            .iter()
            .filter(|ix| ix.program_id == self.program.program_id)
        {
            if let Err(reason) = self.apply(ix, &mut scratch, &mut logs) {
                logs.push(format!("Program log: {reason}"));
                return Err(GatewayError::SimulationFailed { reason, logs });
            }
        }

        if commit {
            state.accounts = scratch;
        }
        Ok(())
    }

    fn apply(
        &self,
        ix: &SolInstruction,
        accounts: &mut BTreeMap<Pubkey, (Pubkey, Vec<u8>)>,
        logs: &mut Vec<String>,
    ) -> Result<(), String> {
        let program_id = self.program.program_id;
        let (counter_address, _) = self.program.counter_address().map_err(|e| e.to_string())?;
        let signer = ix
            .accounts
            .first()
            .filter(|meta| meta.is_signer)
            .map(|meta| meta.pubkey)
            .ok_or("missing signer account")?;

        let tag = ix.data.get(..DISCRIMINATOR_LEN).ok_or("instruction data too short")?;
        let mut args = ByteReader::new(&ix.data[DISCRIMINATOR_LEN..]);

        let read_count = |accounts: &BTreeMap<Pubkey, (Pubkey, Vec<u8>)>| -> Result<u32, String> {
            let (_, data) = accounts
                .get(&counter_address)
                .ok_or("AccountNotInitialized: journal_entry_counter")?;
            codec::decode::<CounterState>(data)
                .map(|c| c.count)
                .map_err(|e| e.to_string())
        };
        let encode = |record: &JournalEntryState| codec::encode(record).map_err(|e| e.to_string());

        if tag == discriminator("global", "initialize_counter") {
            logs.push("Program log: Instruction: InitializeCounter".into());
            if accounts.contains_key(&counter_address) {
                return Err(format!("Allocate: account {counter_address} already in use"));
            }
            let data = codec::encode(&CounterState { count: 0 }).map_err(|e| e.to_string())?;
            accounts.insert(counter_address, (program_id, data));
        } else if tag == discriminator("global", "create_journal_entry") {
            logs.push("Program log: Instruction: CreateJournalEntry".into());
            let title = args.string("title", MAX_TITLE_LEN).map_err(|e| e.to_string())?;
            let message = args.string("message", MAX_MESSAGE_LEN).map_err(|e| e.to_string())?;
            let count = read_count(&*accounts)?;

            let (expected, _) = self
                .program
                .entry_address(count, &signer)
                .map_err(|e| e.to_string())?;
            let supplied = ix.accounts.get(2).map(|meta| meta.pubkey);
            if supplied != Some(expected) {
                return Err("ConstraintSeeds: journal_entry seeds constraint was violated".into());
            }
            if accounts.contains_key(&expected) {
                return Err(format!("Allocate: account {expected} already in use"));
            }

            let record = JournalEntryState {
                owner: signer,
                title,
                message,
            };
            accounts.insert(expected, (program_id, encode(&record)?));
            let next = count.checked_add(1).ok_or("counter overflow")?;
            let counter = codec::encode(&CounterState { count: next }).map_err(|e| e.to_string())?;
            accounts.insert(counter_address, (program_id, counter));
        } else if tag == discriminator("global", "update_journal_entry") {
            logs.push("Program log: Instruction: UpdateJournalEntry".into());
            let title = args.string("title", MAX_TITLE_LEN).map_err(|e| e.to_string())?;
            let message = args.string("message", MAX_MESSAGE_LEN).map_err(|e| e.to_string())?;
            let count = args.u32("count").map_err(|e| e.to_string())?;
            let address = self.existing_entry(accounts, count, &signer)?;
            let record = JournalEntryState {
                owner: signer,
                title,
                message,
            };
            accounts.insert(address, (program_id, encode(&record)?));
        } else if tag == discriminator("global", "delete_journal_entry") {
            logs.push("Program log: Instruction: DeleteJournalEntry".into());
            let count = args.u32("count").map_err(|e| e.to_string())?;
            let address = self.existing_entry(accounts, count, &signer)?;
            accounts.remove(&address);
        } else {
            return Err("InstructionFallbackNotFound".into());
        }
        Ok(())
    }

    fn existing_entry(
        &self,
        accounts: &BTreeMap<Pubkey, (Pubkey, Vec<u8>)>,
        count: u32,
        owner: &Pubkey,
    ) -> Result<Pubkey, String> {
        let (address, _) = self
            .program
            .entry_address(count, owner)
            .map_err(|e| e.to_string())?;
        if accounts.contains_key(&address) {
            Ok(address)
        } else {
            Err("AccountNotInitialized: journal_entry".into())
        }
    }
}

fn internal(e: impl std::fmt::Display) -> GatewayError {
    GatewayError::InvalidResponse(e.to_string())
}

#[async_trait]
impl LedgerGateway for MockLedger {
    async fn latest_tip(&self) -> Result<TipMarker, GatewayError> {
        self.scripted_failure()?;
        let mut state = self.state();
        state.tip_height += 1;

        let mut blockhash = [0u8; 32];
        blockhash[..8].copy_from_slice(&state.tip_height.to_le_bytes());
        blockhash[31] = 0xb1;
        Ok(TipMarker {
            blockhash,
            last_valid_block_height: state.tip_height + 150,
        })
    }

    async fn account_bytes(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, GatewayError> {
        self.scripted_failure()?;
        Ok(self.state().accounts.get(address).map(|(_, data)| data.clone()))
    }

    async fn program_accounts(
        &self,
        program: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<KeyedAccount>, GatewayError> {
        self.scripted_failure()?;
        Ok(self
            .state()
            .accounts
            .iter()
            .filter(|(_, (owner, data))| owner == program && filters.iter().all(|f| f.matches(data)))
            .map(|(address, (_, data))| KeyedAccount {
                address: *address,
                data: data.clone(),
            })
            .collect())
    }

    async fn estimate_compute_limit(&self, wire_tx: &[u8]) -> Result<u32, GatewayError> {
        self.scripted_failure()?;
        {
            let mut state = self.state();
            state.simulations.push(wire_tx.to_vec());
            if let Some(err) = state.scripted_simulations.pop_front() {
                return Err(err);
            }
        }
        self.execute(wire_tx, false)?;
        Ok(self.units)
    }

    async fn submit_and_confirm(
        &self,
        tx: &Envelope<FullySigned>,
    ) -> Result<String, GatewayError> {
        self.scripted_failure()?;
        let wire = tx.to_wire();
        self.execute(&wire, true).map_err(|err| match err {
            GatewayError::SimulationFailed { reason, .. } => GatewayError::TransactionFailed {
                signature: tx.signature_base58(),
                reason,
            },
            other => other,
        })?;
        self.state().submissions.push(wire);

        let signature = tx.signature_base58();
        debug!(%signature, "mock ledger committed transaction");
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_wire::{compile_message, Keypair, TransactionSigner};

    fn ledger() -> MockLedger {
        MockLedger::new(JournalProgram::default())
    }

    #[tokio::test]
    async fn missing_account_is_none() {
        let ledger = ledger();
        assert!(ledger
            .account_bytes(&Pubkey::new([1; 32]))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn tips_are_fresh_each_call() {
        let ledger = ledger();
        let a = ledger.latest_tip().await.unwrap();
        let b = ledger.latest_tip().await.unwrap();
        assert_ne!(a.blockhash, b.blockhash);
        assert!(b.last_valid_block_height > a.last_valid_block_height);
    }

    #[tokio::test]
    async fn program_accounts_apply_filters_and_owner() {
        let ledger = ledger();
        let program = JournalProgram::default().program_id;
        ledger.set_account(Pubkey::new([1; 32]), program, vec![1, 2, 3]);
        ledger.set_account(Pubkey::new([2; 32]), program, vec![1, 9, 9]);
        ledger.set_account(Pubkey::new([3; 32]), Pubkey::new([5; 32]), vec![1, 2, 3]);

        let hits = ledger
            .program_accounts(&program, &[AccountFilter::memcmp(1, vec![2])])
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].address, Pubkey::new([1; 32]));
    }

    #[tokio::test]
    async fn scripted_failure_is_consumed_once() {
        let ledger = ledger();
        ledger.fail_next_call(GatewayError::Transport("down".into()));
        assert!(ledger.latest_tip().await.is_err());
        assert!(ledger.latest_tip().await.is_ok());
    }

    #[tokio::test]
    async fn initialize_twice_fails_simulation() {
        let ledger = ledger();
        let program = JournalProgram::default();
        let payer = Keypair::from_seed(&[7; 32]);
        ledger.set_counter(0).unwrap();

        let ix = program.initialize_counter(&payer.pubkey()).unwrap();
        let tip = ledger.latest_tip().await.unwrap();
        let message = compile_message(&[ix], &payer.pubkey(), &tip.blockhash).unwrap();
        let wire = Envelope::new(message).to_wire();

        match ledger.estimate_compute_limit(&wire).await.unwrap_err() {
            GatewayError::SimulationFailed { reason, logs } => {
                assert!(reason.contains("already in use"));
                assert!(logs.iter().any(|l| l.contains("InitializeCounter")));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ledger.simulations().len(), 1);
    }
}
