use std::{sync::Arc, time::Duration};

use futures_util::future::join_all;

use crate::{
    error::{TransportError, TxError, TxResult},
    transaction::{EndorsedTransaction, Proposal},
    transport::{Endorser, Peer},
};

/// Status code of a successful endorsement.
pub const STATUS_SUCCESS: i32 = 200;

/// The endorser's signature over the proposal response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndorserSignature {
    pub endorser: Vec<u8>,
    pub signature: Vec<u8>,
}

/// What one peer answered to a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndorsementResponse {
    pub peer: Peer,
    pub status: i32,
    pub message: String,
    /// Chaincode result. `None` when the peer produced no signed result.
    pub payload: Option<Vec<u8>>,
    /// Signed proposal response payload that ends up in the transaction.
    pub response_payload: Vec<u8>,
    pub endorsement: Option<EndorserSignature>,
}

impl EndorsementResponse {
    pub fn is_good(&self) -> bool {
        self.status == STATUS_SUCCESS && self.payload.is_some()
    }
}

/// Result of sending the proposal to a single target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerResponse {
    Endorsed(EndorsementResponse),
    Failed { peer: Peer, cause: TransportError },
}

impl PeerResponse {
    pub fn peer(&self) -> &Peer {
        match self {
            PeerResponse::Endorsed(response) => &response.peer,
            PeerResponse::Failed { peer, .. } => peer,
        }
    }

    pub fn is_good(&self) -> bool {
        matches!(self, PeerResponse::Endorsed(response) if response.is_good())
    }

    pub fn response(&self) -> Option<&EndorsementResponse> {
        match self {
            PeerResponse::Endorsed(response) => Some(response),
            PeerResponse::Failed { .. } => None,
        }
    }

    /// Short description of why the response is or is not usable.
    pub fn reason(&self) -> String {
        match self {
            PeerResponse::Endorsed(response) if response.payload.is_none() => {
                format!("status {} without payload", response.status)
            }
            PeerResponse::Endorsed(response) if response.message.is_empty() => {
                format!("status {}", response.status)
            }
            PeerResponse::Endorsed(response) => {
                format!("status {}: {}", response.status, response.message)
            }
            PeerResponse::Failed { cause, .. } => cause.to_string(),
        }
    }
}

/// Fans a proposal out to all of its targets and enforces unanimous endorsement.
#[derive(Clone)]
pub struct EndorsementCollector {
    endorser: Arc<dyn Endorser>,
    timeout: Option<Duration>,
}

impl EndorsementCollector {
    pub fn new(endorser: Arc<dyn Endorser>) -> Self {
        Self {
            endorser,
            timeout: None,
        }
    }

    /// Bounds every single peer call. A peer that does not answer in time is
    /// recorded as a failed endorsement.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends the proposal to every target concurrently and waits for all of
    /// them, in target order.
    pub async fn collect_responses(&self, proposal: &Proposal) -> Vec<PeerResponse> {
        let requests = proposal
            .targets()
            .iter()
            .map(|peer| self.endorse(peer, proposal));
        join_all(requests).await
    }

    /// Collects endorsements and builds the endorsed transaction if every
    /// target endorsed it.
    pub async fn collect(&self, proposal: &Proposal) -> TxResult<EndorsedTransaction> {
        let responses = self.collect_responses(proposal).await;
        if responses.is_empty() || !responses.iter().all(PeerResponse::is_good) {
            for response in responses.iter().filter(|response| !response.is_good()) {
                tracing::warn!(
                    tx_id = %proposal.transaction_id(),
                    peer = %response.peer(),
                    reason = %response.reason(),
                    "endorsement rejected"
                );
            }
            return Err(TxError::EndorsementRejected {
                tx_id: proposal.transaction_id().clone(),
                responses,
            });
        }
        let responses = responses
            .into_iter()
            .filter_map(|response| match response {
                PeerResponse::Endorsed(response) => Some(response),
                PeerResponse::Failed { .. } => None,
            })
            .collect::<Vec<EndorsementResponse>>();
        Ok(EndorsedTransaction::new(proposal.clone(), responses))
    }

    async fn endorse(&self, peer: &Peer, proposal: &Proposal) -> PeerResponse {
        tracing::debug!(tx_id = %proposal.transaction_id(), %peer, "sending proposal");
        let result = match self.timeout {
            Some(timeout) => {
                match tokio::time::timeout(timeout, self.endorser.send_proposal(peer, proposal))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::Timeout(timeout)),
                }
            }
            None => self.endorser.send_proposal(peer, proposal).await,
        };
        match result {
            Ok(response) => PeerResponse::Endorsed(response),
            Err(cause) => PeerResponse::Failed {
                peer: peer.clone(),
                cause,
            },
        }
    }
}
