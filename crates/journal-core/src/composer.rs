//! Transaction composition: compute-limit estimation and the service's
//! partial signature.

use std::sync::Arc;

use solana_wire::{
    compile_message, set_compute_unit_limit, Envelope, PartiallySigned, SolInstruction,
    TransactionSigner, MAX_COMPUTE_UNIT_LIMIT,
};
use tracing::{debug, error};

use crate::error::{GatewayError, JournalError};
use crate::gateway::{LedgerGateway, TipMarker};

pub struct TransactionComposer {
    gateway: Arc<dyn LedgerGateway>,
    service: Arc<dyn TransactionSigner>,
}

impl TransactionComposer {
    pub fn new(gateway: Arc<dyn LedgerGateway>, service: Arc<dyn TransactionSigner>) -> Self {
        Self { gateway, service }
    }

    pub fn service(&self) -> &dyn TransactionSigner {
        self.service.as_ref()
    }

    pub fn gateway(&self) -> &Arc<dyn LedgerGateway> {
        &self.gateway
    }

    /// Build a transaction paying from the service identity and carrying only
    /// its signature.
    ///
    /// A `SetComputeUnitLimit` is prepended at the runtime maximum, the
    /// message is simulated, and the limit is replaced with the units the
    /// simulation consumed before signing. Any other signer referenced by
    /// `instructions` is left with an empty slot.
    pub async fn compose(
        &self,
        instructions: &[SolInstruction],
        tip: &TipMarker,
    ) -> Result<Envelope<PartiallySigned>, JournalError> {
        let fee_payer = self.service.pubkey();

        let probe = with_limit(MAX_COMPUTE_UNIT_LIMIT, instructions);
        let probe = Envelope::new(compile_message(&probe, &fee_payer, &tip.blockhash)?);

        let units = match self.gateway.estimate_compute_limit(&probe.to_wire()).await {
            Ok(units) => units,
            Err(GatewayError::SimulationFailed { reason, logs }) => {
                error!(%reason, ?logs, "compute estimation failed");
                return Err(JournalError::EstimationFailed { reason, logs });
            }
            Err(other) => return Err(other.into()),
        };
        debug!(units, "compute limit estimated");

        let final_ixs = with_limit(units, instructions);
        let message = compile_message(&final_ixs, &fee_payer, &tip.blockhash)?;
        Ok(Envelope::new(message).partial_sign(self.service.as_ref())?)
    }

    /// [`compose`](Self::compose) against a tip fetched just now.
    pub async fn compose_fresh(
        &self,
        instructions: &[SolInstruction],
    ) -> Result<Envelope<PartiallySigned>, JournalError> {
        let tip = self.gateway.latest_tip().await?;
        self.compose(instructions, &tip).await
    }
}

fn with_limit(units: u32, instructions: &[SolInstruction]) -> Vec<SolInstruction> {
    let mut out = Vec::with_capacity(instructions.len() + 1);
    out.push(set_compute_unit_limit(units));
    out.extend_from_slice(instructions);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockLedger, DEFAULT_SIMULATED_UNITS};
    use crate::program::JournalProgram;
    use solana_wire::{parse_compute_unit_limit, Keypair, Pubkey};

    fn setup() -> (Arc<MockLedger>, TransactionComposer, Arc<Keypair>) {
        let ledger = Arc::new(MockLedger::new(JournalProgram::default()).with_simulated_units(4321));
        let service = Arc::new(Keypair::from_seed(&[7; 32]));
        let composer = TransactionComposer::new(ledger.clone(), service.clone());
        (ledger, composer, service)
    }

    #[tokio::test]
    async fn limit_replaced_by_simulated_units() {
        let (ledger, composer, service) = setup();
        let ix = JournalProgram::default()
            .initialize_counter(&service.pubkey())
            .unwrap();

        let envelope = composer.compose_fresh(&[ix]).await.unwrap();
        let decompiled = envelope.message().decompile().unwrap();
        assert_eq!(parse_compute_unit_limit(&decompiled[0]), Some(4321));

        // The probe carried the maximum.
        let probe = Envelope::<PartiallySigned>::from_wire(&ledger.simulations()[0]).unwrap();
        let probe_ixs = probe.message().decompile().unwrap();
        assert_eq!(parse_compute_unit_limit(&probe_ixs[0]), Some(MAX_COMPUTE_UNIT_LIMIT));
        assert!(probe.missing_signers().contains(&service.pubkey()));
    }

    #[tokio::test]
    async fn service_is_fee_payer_and_only_signer_present() {
        let (ledger, composer, service) = setup();
        ledger.set_counter(0).unwrap();
        let user = Pubkey::new([0x42; 32]);
        let program = JournalProgram::default();
        let (entry, _) = program.entry_address(0, &user).unwrap();
        let ix = program
            .create_journal_entry(&user, &entry, "Hi", "World")
            .unwrap();

        let envelope = composer.compose_fresh(&[ix]).await.unwrap();
        assert_eq!(envelope.message().fee_payer(), Some(&service.pubkey()));
        assert!(envelope.signature_of(&service.pubkey()).is_some());
        assert_eq!(envelope.missing_signers(), vec![user]);
        assert!(envelope.finalize().is_err());
    }

    #[tokio::test]
    async fn simulation_failure_is_estimation_failed_with_logs() {
        let (ledger, composer, service) = setup();
        ledger.fail_next_simulation("custom program error: 0x1", vec!["Program log: nope".into()]);
        let ix = JournalProgram::default()
            .initialize_counter(&service.pubkey())
            .unwrap();

        match composer.compose_fresh(&[ix]).await.unwrap_err() {
            JournalError::EstimationFailed { reason, logs } => {
                assert_eq!(reason, "custom program error: 0x1");
                assert_eq!(logs, vec!["Program log: nope".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_failure_is_not_estimation_failure() {
        let (ledger, composer, service) = setup();
        let ix = JournalProgram::default()
            .initialize_counter(&service.pubkey())
            .unwrap();
        let tip = ledger.latest_tip().await.unwrap();
        ledger.fail_next_call(GatewayError::Transport("reset".into()));

        let err = composer.compose(&[ix], &tip).await.unwrap_err();
        assert!(matches!(err, JournalError::Gateway(GatewayError::Transport(_))));
    }

    #[tokio::test]
    async fn default_units_used_without_override() {
        let ledger = Arc::new(MockLedger::new(JournalProgram::default()));
        let service = Arc::new(Keypair::from_seed(&[3; 32]));
        let composer = TransactionComposer::new(ledger, service.clone());
        let ix = JournalProgram::default()
            .initialize_counter(&service.pubkey())
            .unwrap();

        let envelope = composer.compose_fresh(&[ix]).await.unwrap();
        let ixs = envelope.message().decompile().unwrap();
        assert_eq!(parse_compute_unit_limit(&ixs[0]), Some(DEFAULT_SIMULATED_UNITS));
    }
}
