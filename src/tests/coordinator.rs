#[cfg(test)]
mod coordinator_test {
    use std::{sync::Arc, time::Duration};

    use crate::{
        coordinator::{INIT_FUNCTION, TransactionCoordinator, TxState},
        error::{TransportError, TxError},
        tests::mock::{CommitBehavior, MockNetwork, PeerBehavior, coordinator, test_config},
        transaction::ProposalKind,
    };

    fn two_peers() -> MockNetwork {
        MockNetwork::new()
            .with_peer("peer0", PeerBehavior::Endorse(b"moved 10".to_vec()))
            .with_peer("peer1", PeerBehavior::Endorse(b"moved 10".to_vec()))
    }

    fn args(values: &[&str]) -> Vec<Vec<u8>> {
        values.iter().map(|value| value.as_bytes().to_vec()).collect()
    }

    #[tokio::test]
    async fn invoke_commits() {
        let network = Arc::new(two_peers().with_commit(CommitBehavior::Commit { block: 12 }));
        let coordinator = coordinator(&network, Duration::from_secs(5));

        let receipt = coordinator
            .invoke("move", args(&["a", "b", "10"]))
            .await
            .unwrap();
        assert_eq!(receipt.block_number, Some(12));
        assert_eq!(receipt.payload, b"moved 10");
        assert_eq!(network.endorse_count(), 2);
        assert_eq!(network.submit_count(), 1);

        let submitted = network.submitted.lock();
        assert_eq!(submitted[0].transaction_id(), &receipt.tx_id);
        assert_eq!(submitted[0].responses().len(), 2);
        assert_eq!(submitted[0].proposal().function_name(), "move");
        assert!(network.listeners.is_empty());
    }

    #[tokio::test]
    async fn listener_is_registered_before_submission() {
        let network = Arc::new(two_peers());
        let coordinator = coordinator(&network, Duration::from_secs(5));

        for _ in 0..3 {
            coordinator.invoke("move", args(&["a", "b", "1"])).await.unwrap();
        }
        assert_eq!(*network.subscribed_at_submit.lock(), vec![true, true, true]);
    }

    #[tokio::test]
    async fn endorsement_rejection_never_reaches_the_orderer() {
        let network = Arc::new(
            MockNetwork::new()
                .with_peer("peer0", PeerBehavior::Endorse(b"ok".to_vec()))
                .with_peer("peer1", PeerBehavior::Status(500)),
        );
        let coordinator = coordinator(&network, Duration::from_secs(5));

        let err = coordinator.invoke("move", vec![]).await.err().unwrap();
        match &err {
            TxError::EndorsementRejected { responses, .. } => {
                assert_eq!(responses.len(), 2);
                assert!(!responses[1].is_good());
            }
            other => panic!("expected an endorsement rejection, got {other:?}"),
        }
        assert!(err.tx_id().is_some());
        assert_eq!(network.submit_count(), 0);
        assert_eq!(network.subscribe_count(), 0);
    }

    #[tokio::test]
    async fn missing_commit_event_times_out() {
        let network = Arc::new(two_peers().with_commit(CommitBehavior::Never));
        let deadline = Duration::from_millis(100);
        let coordinator = coordinator(&network, deadline);

        let started = tokio::time::Instant::now();
        let err = coordinator.invoke("move", vec![]).await.err().unwrap();
        assert!(started.elapsed() >= deadline);
        match err {
            TxError::TimedOut {
                deadline: reported,
                ordered,
                ..
            } => {
                assert_eq!(reported, deadline);
                assert!(ordered);
            }
            other => panic!("expected a timeout, got {other:?}"),
        }
        assert!(network.listeners.is_empty());
    }

    #[tokio::test]
    async fn slow_orderer_counts_against_the_deadline() {
        let network = Arc::new(
            two_peers()
                .with_commit(CommitBehavior::Never)
                .with_order_delay(Duration::from_secs(10)),
        );
        let deadline = Duration::from_millis(50);
        let coordinator = coordinator(&network, deadline);

        let err = coordinator.invoke("move", vec![]).await.err().unwrap();
        assert!(matches!(err, TxError::TimedOut { ordered: false, .. }));
        assert!(network.listeners.is_empty());
    }

    #[tokio::test]
    async fn commit_without_orderer_reply_ends_at_deadline() {
        let network = Arc::new(
            two_peers()
                .with_commit(CommitBehavior::Commit { block: 3 })
                .with_stalled_reply(),
        );
        let deadline = Duration::from_millis(100);
        let coordinator = coordinator(&network, deadline);

        let started = tokio::time::Instant::now();
        let receipt = tokio::time::timeout(
            Duration::from_secs(2),
            coordinator.invoke("move", args(&["a", "b", "1"])),
        )
        .await
        .expect("invoke must not outlive its deadline")
        .unwrap();
        assert!(started.elapsed() >= deadline);
        assert_eq!(receipt.block_number, Some(3));
        assert_eq!(network.submit_count(), 1);
        assert!(network.listeners.is_empty());
    }

    #[tokio::test]
    async fn invalid_transaction_is_rejected() {
        let network = Arc::new(two_peers().with_commit(CommitBehavior::Invalidate(11)));
        let coordinator = coordinator(&network, Duration::from_secs(5));

        let err = coordinator.invoke("move", vec![]).await.err().unwrap();
        match err {
            TxError::Rejected { reason, .. } => assert_eq!(reason, "MVCC_READ_CONFLICT"),
            other => panic!("expected a rejection, got {other:?}"),
        }
        assert!(network.listeners.is_empty());
    }

    #[tokio::test]
    async fn orderer_refusal_is_a_transport_failure() {
        let network = Arc::new(two_peers().with_order_result(Err(TransportError::Rejected {
            status: 503,
            info: "no leader".into(),
        })));
        let coordinator = coordinator(&network, Duration::from_secs(5));

        let err = coordinator.invoke("move", vec![]).await.err().unwrap();
        assert!(matches!(
            err,
            TxError::TransportFailed {
                cause: TransportError::Rejected { status: 503, .. },
                ..
            }
        ));
        assert!(network.listeners.is_empty());
    }

    #[tokio::test]
    async fn closed_event_stream_is_a_transport_failure() {
        let network = Arc::new(two_peers().with_commit(CommitBehavior::CloseStream));
        let coordinator = coordinator(&network, Duration::from_secs(5));

        let err = coordinator.invoke("move", vec![]).await.err().unwrap();
        assert!(matches!(
            err,
            TxError::TransportFailed {
                cause: TransportError::Closed,
                ..
            }
        ));
        assert!(network.listeners.is_empty());

        // The hub refuses new subscriptions, nothing is submitted any more.
        let err = coordinator.invoke("move", vec![]).await.err().unwrap();
        assert!(matches!(err, TxError::TransportFailed { .. }));
        assert_eq!(network.submit_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_invocations_resolve_independently() {
        let network = Arc::new(two_peers());
        let coordinator = Arc::new(coordinator(&network, Duration::from_secs(5)));

        let handles = (0..8)
            .map(|i| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    coordinator
                        .invoke("move", vec![i.to_string().into_bytes()])
                        .await
                })
            })
            .collect::<Vec<_>>();
        let mut tx_ids = vec![];
        for handle in handles {
            tx_ids.push(handle.await.unwrap().unwrap().tx_id);
        }
        tx_ids.sort();
        tx_ids.dedup();
        assert_eq!(tx_ids.len(), 8);
        assert!(network.listeners.is_empty());
    }

    #[tokio::test]
    async fn query_is_not_ordered() {
        let network = Arc::new(
            MockNetwork::new().with_peer("peer0", PeerBehavior::Endorse(b"90".to_vec())),
        );
        let coordinator = coordinator(&network, Duration::from_secs(5));

        let payload = coordinator.query("query", args(&["a"])).await.unwrap();
        assert_eq!(payload, b"90");
        assert_eq!(network.submit_count(), 0);
        assert_eq!(network.subscribe_count(), 0);
    }

    #[tokio::test]
    async fn query_uses_the_first_good_answer() {
        let network = Arc::new(
            MockNetwork::new()
                .with_peer("peer0", PeerBehavior::Status(500))
                .with_peer("peer1", PeerBehavior::Endorse(b"90".to_vec())),
        );
        let coordinator = coordinator(&network, Duration::from_secs(5));
        assert_eq!(coordinator.query("query", vec![]).await.unwrap(), b"90");

        let network = Arc::new(MockNetwork::new().with_peer("peer0", PeerBehavior::Empty));
        let coordinator = self::coordinator(&network, Duration::from_secs(5));
        let err = coordinator.query("query", vec![]).await.err().unwrap();
        assert!(matches!(err, TxError::EndorsementRejected { .. }));
    }

    #[tokio::test]
    async fn blank_function_is_an_invalid_request() {
        let network = Arc::new(two_peers());
        let coordinator = coordinator(&network, Duration::from_secs(5));

        let err = coordinator.invoke(" ", vec![]).await.err().unwrap();
        assert!(matches!(err, TxError::InvalidRequest(_)));
        assert!(err.tx_id().is_none());
        assert_eq!(network.endorse_count(), 0);
    }

    #[tokio::test]
    async fn instantiate_deploys_with_init() {
        let network = Arc::new(two_peers());
        let coordinator = coordinator(&network, Duration::from_secs(5));

        coordinator
            .instantiate(args(&["a", "100", "b", "200"]))
            .await
            .unwrap();
        let submitted = network.submitted.lock();
        let proposal = submitted[0].proposal();
        assert_eq!(proposal.kind(), &ProposalKind::Instantiate);
        assert_eq!(proposal.function_name(), INIT_FUNCTION);
        assert_eq!(proposal.function_args().len(), 4);
    }

    #[tokio::test]
    async fn instantiate_waits_longer_than_invoke() {
        let network = Arc::new(two_peers().with_commit(CommitBehavior::Never));
        let coordinator = TransactionCoordinator::new(
            crate::tests::mock::test_identity(),
            network.clone(),
            network.clone(),
            network.clone(),
            test_config(network.peers(), Duration::from_millis(40)),
        );
        assert_eq!(
            coordinator.config().instantiate_timeout,
            Duration::from_millis(80)
        );

        match coordinator.instantiate(vec![]).await {
            Err(TxError::TimedOut { deadline, .. }) => {
                assert_eq!(deadline, Duration::from_millis(80))
            }
            other => panic!("expected a timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn install_in_development_mode() {
        let network = Arc::new(two_peers());
        let coordinator = coordinator(&network, Duration::from_secs(5));

        let responses = coordinator.install(None).await.unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(network.submit_count(), 0);
        assert_eq!(network.subscribe_count(), 0);
    }

    #[tokio::test]
    async fn install_reads_the_package() {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("mycc.car");
        std::fs::write(&package, b"package bytes").unwrap();

        let network = Arc::new(two_peers());
        let coordinator = coordinator(&network, Duration::from_secs(5));
        assert_eq!(coordinator.install(Some(package.as_path())).await.unwrap().len(), 2);

        let err = coordinator
            .install(Some(dir.path().join("missing.car").as_path()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TxError::PackageUnreadable { .. }));
        assert_eq!(network.endorse_count(), 2);
    }

    #[test]
    fn state_transitions() {
        use TxState::*;

        assert!(Building.can_advance_to(Endorsing));
        assert!(Endorsing.can_advance_to(Submitting));
        assert!(Submitting.can_advance_to(AwaitingCommit));
        assert!(AwaitingCommit.can_advance_to(Committed));
        assert!(AwaitingCommit.can_advance_to(Rejected));
        assert!(AwaitingCommit.can_advance_to(TimedOut));
        assert!(Endorsing.can_advance_to(Committed));
        assert!(Submitting.can_advance_to(Failed));

        assert!(!Building.can_advance_to(Submitting));
        assert!(!Submitting.can_advance_to(Committed));
        assert!(!Committed.can_advance_to(Failed));
        assert!(!TimedOut.can_advance_to(Committed));
        assert!(!Endorsing.can_advance_to(TimedOut));

        for state in [Committed, Rejected, TimedOut, Failed] {
            assert!(state.is_terminal());
        }
        assert!(!AwaitingCommit.is_terminal());
    }
}
