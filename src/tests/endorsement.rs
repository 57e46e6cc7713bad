#[cfg(test)]
mod endorsement_test {
    use std::{sync::Arc, time::Duration};

    use crate::{
        endorsement::{EndorsementCollector, PeerResponse},
        error::{TransportError, TxError},
        tests::mock::{MockNetwork, PeerBehavior, test_identity},
        transaction::{Proposal, ProposalBuilder},
        transport::Peer,
    };

    fn proposal(targets: Vec<Peer>) -> Proposal {
        ProposalBuilder::new(test_identity())
            .with_channel_name("testchainid")
            .unwrap()
            .with_chaincode_id("mycc")
            .unwrap()
            .with_targets(targets)
            .unwrap()
            .with_function_name("invoke")
            .unwrap()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn collects_every_endorsement() {
        let network = Arc::new(
            MockNetwork::new()
                .with_peer("peer0", PeerBehavior::Endorse(b"100".to_vec()))
                .with_peer("peer1", PeerBehavior::Endorse(b"100".to_vec())),
        );
        let collector = EndorsementCollector::new(network.clone());

        let endorsed = collector.collect(&proposal(network.peers())).await.unwrap();
        assert_eq!(endorsed.responses().len(), 2);
        assert_eq!(endorsed.responses()[0].peer, Peer::new("peer0"));
        assert_eq!(endorsed.responses()[1].peer, Peer::new("peer1"));
        assert_eq!(endorsed.result(), b"100");
        assert_eq!(network.endorse_count(), 2);
    }

    #[tokio::test]
    async fn one_bad_status_rejects_the_proposal() {
        let network = Arc::new(
            MockNetwork::new()
                .with_peer("peer0", PeerBehavior::Endorse(b"100".to_vec()))
                .with_peer("peer1", PeerBehavior::Status(500)),
        );
        let collector = EndorsementCollector::new(network.clone());
        let proposal = proposal(network.peers());

        match collector.collect(&proposal).await {
            Err(TxError::EndorsementRejected { tx_id, responses }) => {
                assert_eq!(&tx_id, proposal.transaction_id());
                assert_eq!(responses.len(), 2);
                assert!(responses[0].is_good());
                assert!(!responses[1].is_good());
                assert_eq!(responses[1].reason(), "status 500: chaincode error");
            }
            other => panic!("expected an endorsement rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_payload_is_not_an_endorsement() {
        let network = Arc::new(MockNetwork::new().with_peer("peer0", PeerBehavior::Empty));
        let collector = EndorsementCollector::new(network.clone());

        let err = collector
            .collect(&proposal(network.peers()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TxError::EndorsementRejected { .. }));
        assert!(err.to_string().contains("without payload"));
    }

    #[tokio::test]
    async fn transport_failure_is_recorded_per_peer() {
        let network = Arc::new(
            MockNetwork::new()
                .with_peer("peer0", PeerBehavior::Endorse(b"100".to_vec()))
                .with_peer(
                    "peer1",
                    PeerBehavior::Fail(TransportError::Unavailable("connection refused".into())),
                ),
        );
        let collector = EndorsementCollector::new(network.clone());

        let responses = collector
            .collect_responses(&proposal(network.peers()))
            .await;
        assert_eq!(responses.len(), 2);
        assert!(responses[0].is_good());
        assert_eq!(
            responses[1],
            PeerResponse::Failed {
                peer: Peer::new("peer1"),
                cause: TransportError::Unavailable("connection refused".into()),
            }
        );
        assert!(responses[1].response().is_none());
    }

    #[tokio::test]
    async fn unknown_target_fails_without_aborting_the_others() {
        let network = Arc::new(
            MockNetwork::new().with_peer("peer0", PeerBehavior::Endorse(b"100".to_vec())),
        );
        let collector = EndorsementCollector::new(network.clone());

        let responses = collector
            .collect_responses(&proposal(vec![Peer::new("peer0"), Peer::new("peer9")]))
            .await;
        assert!(responses[0].is_good());
        assert!(matches!(
            &responses[1],
            PeerResponse::Failed {
                cause: TransportError::UnknownPeer(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn hanging_peer_times_out() {
        let network = Arc::new(
            MockNetwork::new()
                .with_peer("peer0", PeerBehavior::Endorse(b"100".to_vec()))
                .with_peer("peer1", PeerBehavior::Hang),
        );
        let timeout = Duration::from_millis(50);
        let collector = EndorsementCollector::new(network.clone()).with_timeout(Some(timeout));

        match collector.collect(&proposal(network.peers())).await {
            Err(TxError::EndorsementRejected { responses, .. }) => {
                assert!(responses[0].is_good());
                assert_eq!(
                    responses[1],
                    PeerResponse::Failed {
                        peer: Peer::new("peer1"),
                        cause: TransportError::Timeout(timeout),
                    }
                );
            }
            other => panic!("expected an endorsement rejection, got {other:?}"),
        }
    }
}
