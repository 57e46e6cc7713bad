//! Contracts of the network collaborators used by the coordinator.
//!
//! The coordinator never talks to the network directly. Peers are reached
//! through an [`Endorser`], the ordering service through an [`Orderer`] and
//! commit notifications arrive through an [`EventHub`]. The `grpc` module
//! provides implementations backed by tonic channels.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{
    endorsement::EndorsementResponse,
    error::TransportError,
    protos::peer::TxValidationCode,
    transaction::{EndorsedTransaction, Proposal, TransactionId},
};

/// An endorsing peer, identified by its address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Peer {
    name: String,
}

impl Peer {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

#[async_trait]
pub trait Endorser: Send + Sync {
    /// Sends the signed proposal to a single peer for simulation and endorsement.
    async fn send_proposal(
        &self,
        peer: &Peer,
        proposal: &Proposal,
    ) -> Result<EndorsementResponse, TransportError>;
}

#[async_trait]
pub trait Orderer: Send + Sync {
    /// Hands the endorsed transaction to the ordering service.
    async fn submit(&self, transaction: &EndorsedTransaction) -> Result<(), TransportError>;
}

/// Source of commit notifications.
///
/// Both methods are synchronous so a listener can be released from `Drop`.
pub trait EventHub: Send + Sync {
    /// Registers interest in the commit of `tx_id`. The receiver resolves at
    /// most once.
    fn subscribe(
        &self,
        tx_id: &TransactionId,
    ) -> Result<oneshot::Receiver<CommitEvent>, TransportError>;

    fn unsubscribe(&self, tx_id: &TransactionId);
}

/// Notification that a transaction's block was validated and appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEvent {
    pub tx_id: TransactionId,
    pub block_number: Option<u64>,
    pub validation_code: i32,
}

impl CommitEvent {
    pub fn is_valid(&self) -> bool {
        self.validation_code == TxValidationCode::Valid as i32
    }

    pub fn validation_reason(&self) -> String {
        match TxValidationCode::try_from(self.validation_code) {
            Ok(code) => code.as_str_name().to_string(),
            Err(_) => format!("validation code {}", self.validation_code),
        }
    }
}

/// Per-transaction commit listeners.
#[derive(Default)]
pub struct TxListeners {
    inner: Mutex<ListenerState>,
}

#[derive(Default)]
struct ListenerState {
    senders: HashMap<TransactionId, oneshot::Sender<CommitEvent>>,
    closed: bool,
}

impl TxListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        tx_id: &TransactionId,
    ) -> Result<oneshot::Receiver<CommitEvent>, TransportError> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        if state.senders.contains_key(tx_id) {
            return Err(TransportError::DuplicateListener(tx_id.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        state.senders.insert(tx_id.clone(), tx);
        Ok(rx)
    }

    pub fn unregister(&self, tx_id: &TransactionId) -> bool {
        self.inner.lock().senders.remove(tx_id).is_some()
    }

    /// Delivers the event to its listener, if any. The listener is removed
    /// so a transaction is resolved only once.
    pub fn notify(&self, event: CommitEvent) -> bool {
        let sender = self.inner.lock().senders.remove(&event.tx_id);
        match sender {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Drops every pending listener and refuses new ones. Waiters observe a
    /// closed channel.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        state.closed = true;
        state.senders.clear();
    }

    pub fn is_registered(&self, tx_id: &TransactionId) -> bool {
        self.inner.lock().senders.contains_key(tx_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
