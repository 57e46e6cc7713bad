use std::{path::Path, sync::Arc, time::Duration};

use crate::{
    commit::{CommitOutcome, CommitWaiter},
    config::CoordinatorConfig,
    endorsement::{EndorsementCollector, EndorsementResponse, PeerResponse},
    error::{TransportError, TxError, TxResult},
    identity::Identity,
    transaction::{Proposal, ProposalBuilder, ProposalKind, TransactionId},
    transport::{Endorser, EventHub, Orderer},
};

/// Function called by instantiate, matching the chaincode's `Init` entrypoint.
pub const INIT_FUNCTION: &str = "init";

/// Lifecycle of a single transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Building,
    Endorsing,
    Submitting,
    AwaitingCommit,
    Committed,
    Rejected,
    TimedOut,
    Failed,
}

impl TxState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TxState::Committed | TxState::Rejected | TxState::TimedOut | TxState::Failed
        )
    }

    pub fn can_advance_to(&self, next: TxState) -> bool {
        use TxState::*;
        match (self, next) {
            (Building, Endorsing) | (Endorsing, Submitting) | (Submitting, AwaitingCommit) => true,
            // Queries and installs finish right after endorsement.
            (Endorsing, Committed) => true,
            (AwaitingCommit, Committed | Rejected | TimedOut) => true,
            (state, Failed) => !state.is_terminal(),
            _ => false,
        }
    }
}

/// Tracks the state of one transaction and traces every transition.
struct Lifecycle {
    tx_id: Option<TransactionId>,
    state: TxState,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            tx_id: None,
            state: TxState::Building,
        }
    }

    fn advance(&mut self, next: TxState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {next:?}",
            self.state
        );
        tracing::debug!(
            tx_id = self.tx_id.as_ref().map(TransactionId::as_str).unwrap_or_default(),
            from = ?self.state,
            to = ?next,
            "transaction state changed"
        );
        self.state = next;
    }

    fn fail(&mut self, error: TxError) -> TxError {
        self.advance(match error {
            TxError::Rejected { .. } => TxState::Rejected,
            TxError::TimedOut { .. } => TxState::TimedOut,
            _ => TxState::Failed,
        });
        tracing::warn!(
            tx_id = self.tx_id.as_ref().map(TransactionId::as_str).unwrap_or_default(),
            %error,
            "transaction failed"
        );
        error
    }
}

/// Successful result of a transaction that went through ordering and commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub tx_id: TransactionId,
    pub block_number: Option<u64>,
    /// Chaincode result returned by the first endorser.
    pub payload: Vec<u8>,
}

enum FirstDone {
    Submitted(Result<(), TransportError>),
    Notified(CommitOutcome),
}

/// Drives proposals through endorsement, ordering and commit for one channel
/// and chaincode. Transport handles are shared and safe to use from
/// concurrent transactions.
pub struct TransactionCoordinator {
    identity: Arc<Identity>,
    collector: EndorsementCollector,
    orderer: Arc<dyn Orderer>,
    waiter: CommitWaiter,
    config: CoordinatorConfig,
}

impl TransactionCoordinator {
    pub fn new(
        identity: Arc<Identity>,
        endorser: Arc<dyn Endorser>,
        orderer: Arc<dyn Orderer>,
        event_hub: Arc<dyn EventHub>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            identity,
            collector: EndorsementCollector::new(endorser).with_timeout(config.endorsement_timeout),
            orderer,
            waiter: CommitWaiter::new(event_hub),
            config,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// A proposal builder preset with the configured channel, chaincode and targets.
    pub fn proposal_builder(&self) -> TxResult<ProposalBuilder> {
        Ok(ProposalBuilder::new(self.identity.clone())
            .with_channel_name(self.config.channel_name.clone())?
            .with_chaincode_id(self.config.chaincode_id.clone())?
            .with_chaincode_version(self.config.chaincode_version.clone())?
            .with_chaincode_type(self.config.chaincode_type)
            .with_targets(self.config.targets.clone())?)
    }

    /// Installs the chaincode package found at `package_path` on every target.
    /// Without a path the chaincode is installed in development mode.
    /// Install is not ordered, so there is no commit wait.
    pub async fn install(&self, package_path: Option<&Path>) -> TxResult<Vec<EndorsementResponse>> {
        let code_package = match package_path {
            Some(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|source| TxError::PackageUnreadable {
                        path: path.display().to_string(),
                        source,
                    })?
            }
            None => {
                tracing::info!(chaincode = %self.config.chaincode_id, "installing in development mode");
                vec![]
            }
        };
        let mut lifecycle = Lifecycle::new();
        let proposal = self
            .proposal_builder()
            .and_then(|builder| {
                Ok(builder
                    .with_function_name(INIT_FUNCTION)?
                    .with_kind(ProposalKind::Install { code_package })
                    .build()?)
            })
            .map_err(|err| lifecycle.fail(err))?;
        lifecycle.tx_id = Some(proposal.transaction_id().clone());

        lifecycle.advance(TxState::Endorsing);
        let endorsed = self
            .collector
            .collect(&proposal)
            .await
            .map_err(|err| lifecycle.fail(err))?;
        lifecycle.advance(TxState::Committed);
        tracing::info!(
            tx_id = %proposal.transaction_id(),
            peers = endorsed.responses().len(),
            "chaincode installed"
        );
        Ok(endorsed.responses().to_vec())
    }

    /// Deploys the chaincode on the channel and waits for the deployment to
    /// commit, within the instantiate deadline.
    pub async fn instantiate(&self, args: Vec<Vec<u8>>) -> TxResult<CommitReceipt> {
        let proposal = self
            .proposal_builder()?
            .with_function_name(INIT_FUNCTION)?
            .with_function_args(args)?
            .with_kind(ProposalKind::Instantiate)
            .build()?;
        self.submit(proposal, self.config.instantiate_timeout).await
    }

    /// Submits a transaction calling `function` and waits for it to commit,
    /// within the invoke deadline.
    pub async fn invoke(&self, function: &str, args: Vec<Vec<u8>>) -> TxResult<CommitReceipt> {
        let proposal = self
            .proposal_builder()?
            .with_function_name(function)?
            .with_function_args(args)?
            .build()?;
        self.submit(proposal, self.config.invoke_timeout).await
    }

    /// Evaluates `function` on the endorsers without ordering it and returns
    /// the first good result.
    pub async fn query(&self, function: &str, args: Vec<Vec<u8>>) -> TxResult<Vec<u8>> {
        let mut lifecycle = Lifecycle::new();
        let proposal = self
            .proposal_builder()
            .and_then(|builder| {
                Ok(builder
                    .with_function_name(function)?
                    .with_function_args(args)?
                    .build()?)
            })
            .map_err(|err| lifecycle.fail(err))?;
        lifecycle.tx_id = Some(proposal.transaction_id().clone());

        lifecycle.advance(TxState::Endorsing);
        let responses = self.collector.collect_responses(&proposal).await;
        let payload = responses
            .iter()
            .filter(|response| response.is_good())
            .find_map(PeerResponse::response)
            .and_then(|response| response.payload.clone());
        match payload {
            Some(payload) => {
                lifecycle.advance(TxState::Committed);
                Ok(payload)
            }
            None => Err(lifecycle.fail(TxError::EndorsementRejected {
                tx_id: proposal.transaction_id().clone(),
                responses,
            })),
        }
    }

    /// Runs the full pipeline for an already built proposal: endorsement,
    /// subscription, ordering and commit wait.
    ///
    /// A `TimedOut` error with `ordered` set means the orderer accepted the
    /// transaction but no commit event arrived in time. The transaction may
    /// still commit later; this call cannot tell.
    pub async fn submit(&self, proposal: Proposal, deadline: Duration) -> TxResult<CommitReceipt> {
        let tx_id = proposal.transaction_id().clone();
        let mut lifecycle = Lifecycle::new();
        lifecycle.tx_id = Some(tx_id.clone());

        lifecycle.advance(TxState::Endorsing);
        let endorsed = self
            .collector
            .collect(&proposal)
            .await
            .map_err(|err| lifecycle.fail(err))?;

        lifecycle.advance(TxState::Submitting);
        // Subscribe before the orderer sees the transaction.
        let pending = self.waiter.subscribe(&tx_id).map_err(|cause| {
            lifecycle.fail(TxError::TransportFailed {
                tx_id: tx_id.clone(),
                cause,
            })
        })?;

        let expires = tokio::time::Instant::now() + deadline;
        let submission = self.orderer.submit(&endorsed);
        let notification = pending.wait(deadline);
        tokio::pin!(submission);
        tokio::pin!(notification);
        lifecycle.advance(TxState::AwaitingCommit);

        let first = tokio::select! {
            submitted = &mut submission => FirstDone::Submitted(submitted),
            outcome = &mut notification => FirstDone::Notified(outcome),
        };
        let (ordered, outcome) = match first {
            FirstDone::Submitted(Ok(())) => {
                tracing::debug!(%tx_id, "orderer accepted transaction");
                (true, notification.await)
            }
            FirstDone::Submitted(Err(cause)) => (false, CommitOutcome::TransportFailed(cause)),
            // The deadline bounds the whole exchange, a pending submission is abandoned.
            FirstDone::Notified(CommitOutcome::TimedOut) => (false, CommitOutcome::TimedOut),
            FirstDone::Notified(outcome) => {
                match tokio::time::timeout_at(expires, &mut submission).await {
                    Ok(Ok(())) => (true, outcome),
                    Ok(Err(cause)) => (false, CommitOutcome::TransportFailed(cause)),
                    // The block carrying the transaction is proof it was ordered.
                    Err(_) => {
                        tracing::warn!(%tx_id, "orderer did not reply before the deadline, keeping the commit event");
                        (true, outcome)
                    }
                }
            }
        };

        match outcome {
            CommitOutcome::Committed { block_number } => {
                lifecycle.advance(TxState::Committed);
                tracing::info!(%tx_id, ?block_number, "transaction committed");
                Ok(CommitReceipt {
                    tx_id,
                    block_number,
                    payload: endorsed.result(),
                })
            }
            CommitOutcome::Rejected(reason) => {
                Err(lifecycle.fail(TxError::Rejected { tx_id, reason }))
            }
            CommitOutcome::TimedOut => Err(lifecycle.fail(TxError::TimedOut {
                tx_id,
                deadline,
                ordered,
            })),
            CommitOutcome::TransportFailed(cause) => {
                Err(lifecycle.fail(TxError::TransportFailed { tx_id, cause }))
            }
        }
    }
}
