use std::{sync::Arc, time::Duration};

use tokio::sync::oneshot;

use crate::{
    error::TransportError,
    transaction::TransactionId,
    transport::{CommitEvent, EventHub},
};

/// Terminal result of waiting for a transaction to commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { block_number: Option<u64> },
    /// The transaction was written to a block but marked invalid.
    Rejected(String),
    TimedOut,
    TransportFailed(TransportError),
}

impl From<CommitEvent> for CommitOutcome {
    fn from(event: CommitEvent) -> Self {
        if event.is_valid() {
            CommitOutcome::Committed {
                block_number: event.block_number,
            }
        } else {
            CommitOutcome::Rejected(event.validation_reason())
        }
    }
}

#[derive(Clone)]
pub struct CommitWaiter {
    event_hub: Arc<dyn EventHub>,
}

impl CommitWaiter {
    pub fn new(event_hub: Arc<dyn EventHub>) -> Self {
        Self { event_hub }
    }

    /// Registers the commit listener. This must happen before the transaction
    /// reaches the orderer, or the event can fire with nobody listening.
    pub fn subscribe(&self, tx_id: &TransactionId) -> Result<PendingCommit, TransportError> {
        let receiver = self.event_hub.subscribe(tx_id)?;
        tracing::debug!(%tx_id, "subscribed to commit event");
        Ok(PendingCommit {
            tx_id: tx_id.clone(),
            receiver,
            event_hub: self.event_hub.clone(),
        })
    }

    pub async fn wait_for_commit(&self, tx_id: &TransactionId, deadline: Duration) -> CommitOutcome {
        match self.subscribe(tx_id) {
            Ok(pending) => pending.wait(deadline).await,
            Err(cause) => CommitOutcome::TransportFailed(cause),
        }
    }
}

/// A registered commit listener. The listener is unregistered when this value
/// is dropped, whichever way the wait ends.
pub struct PendingCommit {
    tx_id: TransactionId,
    receiver: oneshot::Receiver<CommitEvent>,
    event_hub: Arc<dyn EventHub>,
}

impl PendingCommit {
    pub fn tx_id(&self) -> &TransactionId {
        &self.tx_id
    }

    /// Races the commit notification against `deadline`. The timer is dropped
    /// as soon as the notification arrives.
    pub async fn wait(mut self, deadline: Duration) -> CommitOutcome {
        let outcome = match tokio::time::timeout(deadline, &mut self.receiver).await {
            Ok(Ok(event)) => CommitOutcome::from(event),
            Ok(Err(_)) => CommitOutcome::TransportFailed(TransportError::Closed),
            Err(_) => CommitOutcome::TimedOut,
        };
        tracing::debug!(tx_id = %self.tx_id, ?outcome, "commit wait finished");
        outcome
    }
}

impl Drop for PendingCommit {
    fn drop(&mut self) {
        self.event_hub.unsubscribe(&self.tx_id);
    }
}
