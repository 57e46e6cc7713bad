use async_trait::async_trait;
use tonic::transport::Channel;

use crate::{
    error::TransportError,
    protos::{
        common::Status,
        orderer::{BroadcastResponse, atomic_broadcast_client::AtomicBroadcastClient},
    },
    transaction::EndorsedTransaction,
    transport::Orderer,
};

/// Submits envelopes through the orderer's `AtomicBroadcast` service.
#[derive(Clone)]
pub struct GrpcOrderer {
    client: AtomicBroadcastClient<Channel>,
}

impl GrpcOrderer {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: AtomicBroadcastClient::new(channel),
        }
    }
}

#[async_trait]
impl Orderer for GrpcOrderer {
    async fn submit(&self, transaction: &EndorsedTransaction) -> Result<(), TransportError> {
        let envelope = transaction
            .to_envelope()
            .map_err(|err| TransportError::InvalidRequest(err.to_string()))?;
        let mut responses = self
            .client
            .clone()
            .broadcast(futures_util::stream::iter(vec![envelope]))
            .await?
            .into_inner();
        // One envelope was sent, the first answer is its verdict.
        match responses.message().await? {
            Some(response) => broadcast_result(response),
            None => Err(TransportError::Closed),
        }
    }
}

pub(crate) fn broadcast_result(response: BroadcastResponse) -> Result<(), TransportError> {
    if response.status == Status::Success as i32 {
        Ok(())
    } else {
        Err(TransportError::Rejected {
            status: response.status,
            info: response.info,
        })
    }
}
