use std::collections::HashMap;

use async_trait::async_trait;
use tonic::transport::Channel;

use crate::{
    endorsement::{EndorsementResponse, EndorserSignature},
    error::TransportError,
    network::Connection,
    protos::peer::{ProposalResponse, endorser_client::EndorserClient},
    transaction::Proposal,
    transport::{Endorser, Peer},
};

/// Endorser reaching every peer through its own tonic channel.
#[derive(Default, Clone)]
pub struct GrpcEndorser {
    peers: HashMap<Peer, EndorserClient<Channel>>,
}

impl GrpcEndorser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peer(mut self, peer: Peer, channel: Channel) -> Self {
        self.peers.insert(peer, EndorserClient::new(channel));
        self
    }

    /// Connects to every node. Each peer is named after its authority.
    pub async fn connect(connections: &[Connection]) -> Result<Self, TransportError> {
        let mut endorser = Self::new();
        for connection in connections {
            let channel = connection.connect().await?;
            endorser = endorser.with_peer(Peer::new(connection.authority()), channel);
        }
        Ok(endorser)
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.peers.keys().cloned().collect()
    }
}

#[async_trait]
impl Endorser for GrpcEndorser {
    async fn send_proposal(
        &self,
        peer: &Peer,
        proposal: &Proposal,
    ) -> Result<EndorsementResponse, TransportError> {
        // Clients share the channel, a clone per call is cheap.
        let mut client = self
            .peers
            .get(peer)
            .ok_or_else(|| TransportError::UnknownPeer(peer.to_string()))?
            .clone();
        let response = client
            .process_proposal(proposal.signed_proposal().clone())
            .await?
            .into_inner();
        Ok(endorsement_response(peer, response))
    }
}

pub(crate) fn endorsement_response(peer: &Peer, response: ProposalResponse) -> EndorsementResponse {
    let (status, message, result) = match response.response {
        Some(result) => (result.status, result.message, Some(result.payload)),
        None => (0, String::new(), None),
    };
    // Without a signed response payload there is nothing to put in the transaction.
    let payload = if response.payload.is_empty() {
        None
    } else {
        result
    };
    EndorsementResponse {
        peer: peer.clone(),
        status,
        message,
        payload,
        response_payload: response.payload,
        endorsement: response.endorsement.map(|endorsement| EndorserSignature {
            endorser: endorsement.endorser,
            signature: endorsement.signature,
        }),
    }
}
