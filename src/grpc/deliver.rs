use std::sync::Arc;

use futures_util::StreamExt;
use prost::Message;
use tokio::{sync::oneshot, task::JoinHandle};
use tonic::{Streaming, transport::Channel};

use crate::{
    error::TransportError,
    identity::Identity,
    protos::{
        common::{ChannelHeader, Envelope, Header, HeaderType, Payload, SignatureHeader},
        orderer::{
            SeekInfo, SeekNewest, SeekPosition, SeekSpecified, seek_info::SeekBehavior,
            seek_position,
        },
        peer::{DeliverResponse, FilteredBlock, deliver_client::DeliverClient, deliver_response},
    },
    transaction::{TransactionId, create_transaction_id, generate_nonce},
    transport::{CommitEvent, EventHub, TxListeners},
};

/// Commit events from a peer's filtered block stream.
///
/// The stream starts at the newest block and stays open until the hub is
/// dropped. When the peer closes it, pending waiters observe a closed
/// channel and new subscriptions are refused.
pub struct GrpcEventHub {
    listeners: Arc<TxListeners>,
    task: JoinHandle<()>,
}

impl GrpcEventHub {
    pub async fn connect(
        channel: Channel,
        channel_name: &str,
        identity: &Identity,
    ) -> Result<Self, TransportError> {
        let envelope = seek_envelope(channel_name, identity)?;
        // The request side stays open; the peer stops delivering once it ends.
        let requests = futures_util::stream::iter(vec![envelope])
            .chain(futures_util::stream::pending());
        let responses = DeliverClient::new(channel)
            .deliver_filtered(requests)
            .await?
            .into_inner();

        let listeners = Arc::new(TxListeners::new());
        let task = tokio::spawn(dispatch(responses, listeners.clone()));
        tracing::info!(channel = channel_name, "listening for commit events");
        Ok(Self { listeners, task })
    }

    pub fn pending_listeners(&self) -> usize {
        self.listeners.len()
    }
}

impl EventHub for GrpcEventHub {
    fn subscribe(
        &self,
        tx_id: &TransactionId,
    ) -> Result<oneshot::Receiver<CommitEvent>, TransportError> {
        self.listeners.register(tx_id)
    }

    fn unsubscribe(&self, tx_id: &TransactionId) {
        self.listeners.unregister(tx_id);
    }
}

impl Drop for GrpcEventHub {
    fn drop(&mut self) {
        self.task.abort();
        self.listeners.close();
    }
}

async fn dispatch(mut responses: Streaming<DeliverResponse>, listeners: Arc<TxListeners>) {
    loop {
        match responses.message().await {
            Ok(Some(DeliverResponse {
                r#type: Some(deliver_response::Type::FilteredBlock(block)),
            })) => {
                dispatch_block(&listeners, block);
            }
            Ok(Some(DeliverResponse {
                r#type: Some(deliver_response::Type::Status(status)),
            })) => {
                tracing::warn!(status, "deliver stream ended by peer");
                break;
            }
            Ok(Some(_)) => continue,
            Ok(None) => {
                tracing::warn!("deliver stream closed");
                break;
            }
            Err(status) => {
                tracing::warn!(error = %status, "deliver stream failed");
                break;
            }
        }
    }
    listeners.close();
}

/// Notifies the listeners of every transaction in the block. Returns how many
/// were waiting.
pub(crate) fn dispatch_block(listeners: &TxListeners, block: FilteredBlock) -> usize {
    let number = block.number;
    block
        .filtered_transactions
        .into_iter()
        .map(|transaction| {
            listeners.notify(CommitEvent {
                tx_id: TransactionId::from(transaction.txid.as_str()),
                block_number: Some(number),
                validation_code: transaction.tx_validation_code,
            })
        })
        .filter(|notified| *notified)
        .count()
}

/// Signed request to stream filtered blocks from the newest one on.
pub(crate) fn seek_envelope(
    channel_name: &str,
    identity: &Identity,
) -> Result<Envelope, TransportError> {
    let creator = identity.serialize();
    let nonce = generate_nonce();
    let channel_header = ChannelHeader {
        r#type: HeaderType::DeliverSeekInfo.into(),
        version: 0,
        timestamp: Some(std::time::SystemTime::now().into()),
        channel_id: channel_name.to_string(),
        tx_id: create_transaction_id(&nonce, &creator),
        epoch: 0,
        extension: vec![],
        tls_cert_hash: vec![],
    };
    let seek_info = SeekInfo {
        start: Some(SeekPosition {
            r#type: Some(seek_position::Type::Newest(SeekNewest {})),
        }),
        stop: Some(SeekPosition {
            r#type: Some(seek_position::Type::Specified(SeekSpecified { number: u64::MAX })),
        }),
        behavior: SeekBehavior::BlockUntilReady.into(),
    };
    let payload = Payload {
        header: Some(Header {
            channel_header: channel_header.encode_to_vec(),
            signature_header: SignatureHeader {
                creator,
                nonce: nonce.to_vec(),
            }
            .encode_to_vec(),
        }),
        data: seek_info.encode_to_vec(),
    }
    .encode_to_vec();
    let signature = identity
        .signer()
        .sign_message(&payload)
        .map_err(|err| TransportError::InvalidRequest(err.to_string()))?;
    Ok(Envelope { payload, signature })
}
