//! End-to-end flows against the in-memory ledger:
//! read counter -> derive entry -> compose -> owner co-signs -> submit -> index.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use journal_core::codec::AccountSchema;
use journal_core::*;
use solana_wire::{
    cosign_wire_transaction, Envelope, FullySigned, Keypair, PartiallySigned, Pubkey,
    TransactionSigner,
};

struct Harness {
    program: JournalProgram,
    ledger: Arc<MockLedger>,
    service: Arc<Keypair>,
    counter: Arc<CounterService>,
    journal: JournalService,
    indexer: EntryIndexer,
}

fn harness_with(gateway: Arc<dyn LedgerGateway>, ledger: Arc<MockLedger>) -> Harness {
    let program = JournalProgram::default();
    let service = Arc::new(Keypair::from_seed(&[7; 32]));
    let composer = Arc::new(TransactionComposer::new(gateway.clone(), service.clone()));
    let counter = Arc::new(CounterService::new(program, composer.clone()));
    let journal = JournalService::new(program, composer, counter.clone());
    let indexer = EntryIndexer::new(program, gateway);
    Harness {
        program,
        ledger,
        service,
        counter,
        journal,
        indexer,
    }
}

fn harness() -> Harness {
    let ledger = Arc::new(MockLedger::new(JournalProgram::default()));
    harness_with(ledger.clone(), ledger)
}

fn user() -> Keypair {
    Keypair::from_seed(&[0x11; 32])
}

/// Owner side: sign the base64 hand-off and promote to fully signed.
fn owner_completes(owner: &Keypair, base64_tx: &str) -> Envelope<FullySigned> {
    Envelope::<PartiallySigned>::from_base64(base64_tx)
        .unwrap()
        .partial_sign(owner)
        .unwrap()
        .finalize()
        .unwrap()
}

// ─── Counter ───────────────────────────────────────────────────────

#[tokio::test]
async fn create_before_initialize_is_counter_not_initialized() {
    let h = harness();
    let err = h
        .journal
        .prepare_create_entry(&user().pubkey(), "Hi", "World")
        .await
        .unwrap_err();

    assert!(err.is_counter_absent());
    assert_eq!(err.to_string(), "Counter not initialized");
    assert!(h.ledger.simulations().is_empty());
}

#[tokio::test]
async fn initialize_then_create_uses_count_zero() {
    let h = harness();
    h.counter.initialize().await.unwrap();

    let owner = user();
    let prepared = h
        .journal
        .prepare_create_entry(&owner.pubkey(), "Hi", "World")
        .await
        .unwrap();

    assert_eq!(prepared.count, 0);
    assert_eq!(
        prepared.entry_address,
        h.program.entry_address(0, &owner.pubkey()).unwrap().0
    );
}

// ─── Create: compose, co-sign, submit, index ───────────────────────

#[tokio::test]
async fn create_entry_partially_signed_by_service() {
    let h = harness();
    h.ledger.set_counter(5).unwrap();
    let owner = Pubkey::new([0x42; 32]);

    let prepared = h
        .journal
        .prepare_create_entry(&owner, "Hi", "World")
        .await
        .unwrap();

    assert_eq!(prepared.count, 5);
    assert_eq!(
        prepared.entry_address.to_string(),
        "GPZBThbo7BQJkugMiqJpV4wQ2w9F6KeLJUQbDbReYQxb"
    );

    let parsed = Envelope::<PartiallySigned>::from_base64(&prepared.to_base64()).unwrap();
    assert_eq!(parsed.message().fee_payer(), Some(&h.service.pubkey()));
    assert!(parsed.signature_of(&h.service.pubkey()).is_some());
    assert_eq!(parsed.missing_signers(), vec![owner]);

    let journal_ix = parsed
        .message()
        .decompile()
        .unwrap()
        .into_iter()
        .find(|ix| ix.program_id == h.program.program_id)
        .unwrap();
    assert_eq!(
        &journal_ix.data[..8],
        &journal_core::program::discriminator("global", "create_journal_entry")
    );
    assert_eq!(journal_ix.accounts[2].pubkey, prepared.entry_address);
    assert!(journal_ix.accounts[2].is_writable);

    assert!(parsed.finalize().is_err());
}

#[tokio::test]
async fn cosigned_entry_lands_and_is_indexed() {
    let h = harness();
    h.counter.initialize().await.unwrap();
    let owner = user();

    let prepared = h
        .journal
        .prepare_create_entry(&owner.pubkey(), "Day one", "Started a journal")
        .await
        .unwrap();
    let signed = owner_completes(&owner, &prepared.to_base64());
    h.ledger.submit_and_confirm(&signed).await.unwrap();

    assert_eq!(h.counter.read_or_absent().await.unwrap().count(), Some(1));

    let entries = h.indexer.list_by_owner(&owner.pubkey()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].address, prepared.entry_address);
    assert_eq!(entries[0].entry.title, "Day one");
    assert_eq!(entries[0].entry.message, "Started a journal");
}

#[tokio::test]
async fn cosign_wire_helper_matches_typed_flow() {
    let h = harness();
    h.counter.initialize().await.unwrap();
    let owner = user();

    let prepared = h
        .journal
        .prepare_create_entry(&owner.pubkey(), "t", "m")
        .await
        .unwrap();
    let wire = cosign_wire_transaction(&owner, &prepared.envelope.to_wire()).unwrap();
    let envelope = Envelope::<PartiallySigned>::from_wire(&wire).unwrap();

    assert!(envelope.missing_signers().is_empty());
    assert!(envelope.finalize().is_ok());
}

#[tokio::test]
async fn second_entry_after_first_lands_uses_next_count() {
    let h = harness();
    h.counter.initialize().await.unwrap();
    let owner = user();

    for (expected, title) in [(0, "one"), (1, "two")] {
        let prepared = h
            .journal
            .prepare_create_entry(&owner.pubkey(), title, "body")
            .await
            .unwrap();
        assert_eq!(prepared.count, expected);
        let signed = owner_completes(&owner, &prepared.to_base64());
        h.ledger.submit_and_confirm(&signed).await.unwrap();
    }

    assert_eq!(h.indexer.list_by_owner(&owner.pubkey()).await.unwrap().len(), 2);
}

// ─── Update / delete ───────────────────────────────────────────────

#[tokio::test]
async fn update_and_delete_existing_entry() {
    let h = harness();
    h.counter.initialize().await.unwrap();
    let owner = user();

    let created = h
        .journal
        .prepare_create_entry(&owner.pubkey(), "draft", "v1")
        .await
        .unwrap();
    h.ledger
        .submit_and_confirm(&owner_completes(&owner, &created.to_base64()))
        .await
        .unwrap();

    let updated = h
        .journal
        .prepare_update_entry(&owner.pubkey(), 0, "final", "v2")
        .await
        .unwrap();
    assert_eq!(updated.entry_address, created.entry_address);
    h.ledger
        .submit_and_confirm(&owner_completes(&owner, &updated.to_base64()))
        .await
        .unwrap();

    let entries = h.indexer.list_by_owner(&owner.pubkey()).await.unwrap();
    assert_eq!(entries[0].entry.title, "final");
    assert_eq!(entries[0].entry.message, "v2");

    let deleted = h
        .journal
        .prepare_delete_entry(&owner.pubkey(), 0)
        .await
        .unwrap();
    h.ledger
        .submit_and_confirm(&owner_completes(&owner, &deleted.to_base64()))
        .await
        .unwrap();
    assert!(h.indexer.list_by_owner(&owner.pubkey()).await.unwrap().is_empty());
}

#[tokio::test]
async fn update_missing_entry_fails_estimation() {
    let h = harness();
    h.counter.initialize().await.unwrap();

    let err = h
        .journal
        .prepare_update_entry(&user().pubkey(), 3, "t", "m")
        .await
        .unwrap_err();
    match err {
        JournalError::EstimationFailed { logs, .. } => {
            assert!(logs.iter().any(|l| l.contains("AccountNotInitialized")));
        }
        other => panic!("unexpected {other:?}"),
    }
}

// ─── Estimation failure and retry ──────────────────────────────────

#[tokio::test]
async fn estimation_failure_surfaces_logs_without_retry_when_counter_unchanged() {
    let h = harness();
    h.ledger.set_counter(2).unwrap();
    h.ledger.fail_next_simulation(
        "InstructionError",
        vec!["Program log: Error: insufficient funds".into()],
    );

    let err = h
        .journal
        .prepare_create_entry(&user().pubkey(), "t", "m")
        .await
        .unwrap_err();
    match err {
        JournalError::EstimationFailed { reason, logs } => {
            assert_eq!(reason, "InstructionError");
            assert_eq!(logs.len(), 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(h.ledger.simulations().len(), 1);
}

/// Advances the counter once, right before the first simulation, the way a
/// concurrent request landing in between would.
struct RacingGateway {
    inner: Arc<MockLedger>,
    raced: AtomicBool,
}

#[async_trait]
impl LedgerGateway for RacingGateway {
    async fn latest_tip(&self) -> Result<TipMarker, GatewayError> {
        self.inner.latest_tip().await
    }

    async fn account_bytes(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, GatewayError> {
        self.inner.account_bytes(address).await
    }

    async fn program_accounts(
        &self,
        program: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<KeyedAccount>, GatewayError> {
        self.inner.program_accounts(program, filters).await
    }

    async fn estimate_compute_limit(&self, wire_tx: &[u8]) -> Result<u32, GatewayError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let count = self
                .inner
                .account_bytes(&JournalProgram::default().counter_address().unwrap().0)
                .await?
                .map(|data| codec::decode::<CounterState>(&data).unwrap().count)
                .unwrap();
            self.inner.set_counter(count + 1).unwrap();
        }
        self.inner.estimate_compute_limit(wire_tx).await
    }

    async fn submit_and_confirm(
        &self,
        tx: &Envelope<FullySigned>,
    ) -> Result<String, GatewayError> {
        self.inner.submit_and_confirm(tx).await
    }
}

#[tokio::test]
async fn stale_counter_is_refreshed_and_retried() {
    let ledger = Arc::new(MockLedger::new(JournalProgram::default()));
    ledger.set_counter(5).unwrap();
    let racing = Arc::new(RacingGateway {
        inner: ledger.clone(),
        raced: AtomicBool::new(false),
    });
    let h = harness_with(racing, ledger);
    let owner = Pubkey::new([0x42; 32]);

    let prepared = h
        .journal
        .prepare_create_entry(&owner, "Hi", "World")
        .await
        .unwrap();

    assert_eq!(prepared.count, 6);
    assert_eq!(
        prepared.entry_address,
        h.program.entry_address(6, &owner).unwrap().0
    );
    assert_eq!(h.ledger.simulations().len(), 2);
}

#[tokio::test]
async fn retry_budget_of_one_returns_first_failure() {
    let ledger = Arc::new(MockLedger::new(JournalProgram::default()));
    ledger.set_counter(5).unwrap();
    let racing = Arc::new(RacingGateway {
        inner: ledger.clone(),
        raced: AtomicBool::new(false),
    });
    let mut h = harness_with(racing.clone(), ledger);
    let composer = Arc::new(TransactionComposer::new(racing, h.service.clone()));
    h.journal = JournalService::new(h.program, composer, h.counter.clone())
        .with_max_compose_attempts(1);

    let err = h
        .journal
        .prepare_create_entry(&Pubkey::new([0x42; 32]), "Hi", "World")
        .await
        .unwrap_err();
    assert!(matches!(err, JournalError::EstimationFailed { .. }));
}

// ─── Indexing ──────────────────────────────────────────────────────

#[tokio::test]
async fn listing_skips_malformed_records() {
    let h = harness();
    let owner = Pubkey::new([0x42; 32]);
    for (count, title) in [(0, "a"), (1, "b")] {
        h.ledger
            .insert_entry(
                count,
                &JournalEntryState {
                    owner,
                    title: title.into(),
                    message: "m".into(),
                },
            )
            .unwrap();
    }
    let mut broken = JournalEntryState::discriminator().to_vec();
    broken.extend_from_slice(owner.as_ref());
    broken.extend_from_slice(&[0xff; 4]);
    h.ledger
        .set_account(Pubkey::new([0xee; 32]), h.program.program_id, broken);

    let entries = h.indexer.list_by_owner(&owner).await.unwrap();
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn gateway_failure_propagates_from_listing() {
    let h = harness();
    h.ledger
        .fail_next_call(GatewayError::Transport("connection refused".into()));
    let err = h.indexer.list_all().await.unwrap_err();
    assert!(matches!(err, JournalError::Gateway(GatewayError::Transport(_))));
}
