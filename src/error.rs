use std::time::Duration;

use thiserror::Error;

use crate::{endorsement::PeerResponse, transaction::TransactionId};

/// Result of a coordinator operation.
pub type TxResult<T> = Result<T, TxError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuilderError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Missing parameter: {0}")]
    MissingParameter(String),
    #[error("Signing failed: {0}")]
    Signing(#[from] SignError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),
}

/// Failure talking to a peer, an orderer or an event source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("node unavailable: {0}")]
    Unavailable(String),
    #[error("rpc failed: {0}")]
    Rpc(String),
    #[error("no connection registered for peer {0}")]
    UnknownPeer(String),
    #[error("request rejected with status {status}: {info}")]
    Rejected { status: i32, info: String },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("stream closed")]
    Closed,
    #[error("cannot prepare request: {0}")]
    InvalidRequest(String),
    #[error("a listener is already registered for transaction {0}")]
    DuplicateListener(String),
}

impl From<tonic::Status> for TransportError {
    fn from(status: tonic::Status) -> Self {
        TransportError::Rpc(format!("{:?}: {}", status.code(), status.message()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EnrollError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("enrollment of {principal} failed: {source}")]
    EnrollmentFailed {
        principal: String,
        source: EnrollError,
    },
    #[error("identity store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    #[error("enrolled identity is invalid: {0}")]
    InvalidEnrollment(#[from] BuilderError),
}

/// Terminal failure of a single transaction.
#[derive(Debug, Error)]
pub enum TxError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] BuilderError),
    #[error("chaincode package {path} is unreadable: {source}")]
    PackageUnreadable {
        path: String,
        source: std::io::Error,
    },
    #[error("endorsement rejected for {tx_id}: {}", rejected_peers(.responses))]
    EndorsementRejected {
        tx_id: TransactionId,
        responses: Vec<PeerResponse>,
    },
    #[error("transport failed for {tx_id}: {cause}")]
    TransportFailed {
        tx_id: TransactionId,
        cause: TransportError,
    },
    #[error("transaction {tx_id} was rejected at commit: {reason}")]
    Rejected { tx_id: TransactionId, reason: String },
    /// The commit event did not arrive within the deadline. When `ordered` is
    /// true the orderer accepted the envelope and the transaction may still
    /// commit later.
    #[error("no commit event for {tx_id} within {deadline:?} (ordered: {ordered})")]
    TimedOut {
        tx_id: TransactionId,
        deadline: Duration,
        ordered: bool,
    },
}

impl TxError {
    pub fn tx_id(&self) -> Option<&TransactionId> {
        match self {
            TxError::InvalidRequest(_) | TxError::PackageUnreadable { .. } => None,
            TxError::EndorsementRejected { tx_id, .. }
            | TxError::TransportFailed { tx_id, .. }
            | TxError::Rejected { tx_id, .. }
            | TxError::TimedOut { tx_id, .. } => Some(tx_id),
        }
    }
}

fn rejected_peers(responses: &[PeerResponse]) -> String {
    let rejected = responses
        .iter()
        .filter(|response| !response.is_good())
        .map(|response| format!("{} ({})", response.peer(), response.reason()))
        .collect::<Vec<String>>();
    format!(
        "{} of {} peers did not endorse: {}",
        rejected.len(),
        responses.len(),
        rejected.join(", ")
    )
}
