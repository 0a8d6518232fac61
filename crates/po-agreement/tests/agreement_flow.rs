//! # Agreement Flow Integration Tests
//!
//! Full two-party handshakes over the in-memory network, notary and
//! ledgers.
//!
//! ## Test Categories
//!
//! 1. **Happy path** - both ledgers hold the same notarised transaction
//! 2. **Contract rejection** - on the proposer and on the counterparty side
//! 3. **Tampering** - bad signatures, substituted content, stretched windows,
//!    corrupt payloads
//! 4. **Notary failures** - conflict and timeout, nothing recorded
//! 5. **Transport** - receive timeout, lost final forward
//! 6. **Concurrency** - independent sessions on one node

mod common;

use async_trait::async_trait;
use chrono::Utc;
use common::{order, uk_order, wait_for_record, Harness};
use po_agreement::algorithms::{build_proposal, build_unsigned, derive_unsigned, finalize, sign};
use po_agreement::domain::invariants::reasons;
use po_agreement::{
    channel_pair, AgreementApi, AgreementConfig, ChannelError, CounterpartyFlow, DigitalSignature,
    FailureKind, FlowError, FlowMessage, MessageChannel, MessageNetwork, NotaryRejection,
    NotarySelection, NotaryService, PartiallySignedTransaction, Party, PublicKey,
    PurchaseOrderState, SessionId, StateRef, TimeWindow, TransactionId,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// TEST HELPERS
// =============================================================================

fn window_length() -> chrono::Duration {
    chrono::Duration::seconds(30)
}

/// Notary that reports every request as a double spend.
struct ConflictingNotary {
    party: Party,
}

#[async_trait]
impl NotaryService for ConflictingNotary {
    fn identity(&self) -> &Party {
        &self.party
    }

    async fn request_signature(
        &self,
        _stx: &PartiallySignedTransaction,
        _window: TimeWindow,
    ) -> Result<DigitalSignature, NotaryRejection> {
        Err(NotaryRejection::Conflict {
            consumed: vec![StateRef {
                txhash: TransactionId([7; 32]),
                index: 0,
            }],
            consuming_tx: TransactionId([8; 32]),
        })
    }
}

// =============================================================================
// HAPPY PATH
// =============================================================================

#[tokio::test]
async fn test_happy_path_commits_same_transaction_on_both_sides() {
    let h = Harness::new();
    let buyer = h.node("PartyA", 1);
    let seller = h.node("PartyB", 2);
    let _responder = seller.service.spawn_responder();

    let tx_id = buyer.service.initiate(uk_order(1), "PartyB").await.unwrap();

    let ours = buyer.ledger.transaction_ids();
    assert_eq!(ours, vec![tx_id]);
    let ftx = wait_for_record(&buyer.ledger, &tx_id).await.unwrap();
    assert_eq!(ftx.signature_count(), 3);
    assert_eq!(ftx.notary_signature().by, h.notary.identity().owning_key);
    assert_eq!(
        ftx.signers(),
        BTreeSet::from([
            buyer.party.owning_key,
            seller.party.owning_key,
            h.notary.identity().owning_key
        ])
    );
    assert_eq!(ftx.outputs()[0].po.total_quantity(), 60);

    let theirs = wait_for_record(&seller.ledger, &tx_id)
        .await
        .expect("seller records the forwarded transaction");
    assert_eq!(theirs, ftx);

    assert_eq!(h.notary.request_count(), 1);
    assert!(buyer.checkpoints.is_empty());
}

#[tokio::test]
async fn test_purchase_orders_are_visible_to_both_parties_only() {
    let h = Harness::new();
    let buyer = h.node("PartyA", 1);
    let seller = h.node("PartyB", 2);
    let bystander = h.node("PartyC", 3);
    let _responder = seller.service.spawn_responder();

    let tx_id = buyer.service.initiate(uk_order(42), "PartyB").await.unwrap();
    wait_for_record(&seller.ledger, &tx_id).await.unwrap();

    let mine = buyer.service.purchase_orders().await.unwrap();
    let theirs = seller.service.purchase_orders().await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine, theirs);
    assert_eq!(mine[0].reference(), Some("42"));
    assert!(bystander.service.purchase_orders().await.unwrap().is_empty());

    let peers: Vec<String> = buyer.service.peers().into_iter().map(|p| p.name).collect();
    assert_eq!(peers, vec!["PartyB".to_string(), "PartyC".to_string()]);
}

// =============================================================================
// CONTRACT REJECTION
// =============================================================================

#[tokio::test]
async fn test_non_uk_delivery_fails_validation_and_records_nothing() {
    let h = Harness::new();
    let buyer = h.node("PartyA", 1);
    let seller = h.node("PartyB", 2);
    let _responder = seller.service.spawn_responder();

    let err = buyer
        .service
        .initiate(order(2, "US", &[10, 20, 30]), "PartyB")
        .await
        .unwrap_err();

    match &err {
        FlowError::ValidationFailure(failure) => {
            assert!(failure.mentions(reasons::DELIVERY_REGION), "{}", failure)
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(buyer.ledger.is_empty());
    assert!(seller.ledger.is_empty());
    assert_eq!(h.notary.request_count(), 0);
    assert!(buyer.checkpoints.is_empty());
}

#[tokio::test]
async fn test_quantity_over_limit_is_rejected() {
    let h = Harness::new();
    let buyer = h.node("PartyA", 1);
    let seller = h.node("PartyB", 2);
    let _responder = seller.service.spawn_responder();

    let err = buyer
        .service
        .initiate(order(3, "UK", &[60, 41]), "PartyB")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::ValidationFailure);
    assert!(err.to_string().contains(reasons::QUANTITY_LIMIT));
    assert!(buyer.ledger.is_empty());
}

#[tokio::test]
async fn test_counterparty_rejects_finalized_transaction_breaking_contract() {
    let h = Harness::new();
    let seller = h.node("PartyB", 2);
    let mallory = h.raw("Mallory", 7);
    let me = mallory.identity.party().clone();

    let state = PurchaseOrderState::new(order(5, "US", &[5]), me.clone(), seller.party.clone());
    let proposal = build_proposal(
        state,
        me.clone(),
        seller.party.clone(),
        h.notary.identity().clone(),
    );

    let script = async {
        let channel = mallory
            .endpoint
            .open(&seller.party, SessionId::new())
            .await
            .unwrap();
        channel.send(FlowMessage::Proposal(proposal)).await.unwrap();
        let mut stx = channel
            .receive()
            .await
            .unwrap()
            .into_partially_signed()
            .unwrap();
        sign(&mut stx, mallory.identity.keypair()).unwrap();
        let window = stx.tx().time_window.unwrap();
        let notary_sig = h.notary.request_signature(&stx, window).await.unwrap();
        let ftx = finalize(stx, notary_sig).unwrap();
        channel.send(FlowMessage::Finalized(ftx)).await.unwrap();
        channel
    };
    let (result, _channel) = tokio::join!(seller.service.respond(), script);

    match result {
        Err(FlowError::ValidationFailure(failure)) => {
            assert!(failure.mentions(reasons::DELIVERY_REGION))
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
    assert!(seller.ledger.is_empty());
    assert!(seller.checkpoints.is_empty());
}

// =============================================================================
// TAMPERING
// =============================================================================

#[tokio::test]
async fn test_tampered_countersignature_is_rejected() {
    let h = Harness::new();
    let buyer = h.node("PartyA", 1);
    let seller = h.raw("PartyB", 2);

    let script = async {
        let channel = seller.endpoint.accept().await.unwrap();
        let proposal = channel.receive().await.unwrap().into_proposal().unwrap();
        let mut stx =
            PartiallySignedTransaction::new(build_unsigned(&proposal, Utc::now(), window_length()));
        sign(&mut stx, seller.identity.keypair()).unwrap();

        // last byte belongs to the seller's signature
        let mut bytes = bincode::serialize(&stx).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered: PartiallySignedTransaction = bincode::deserialize(&bytes).unwrap();

        channel
            .send(FlowMessage::PartiallySigned(tampered))
            .await
            .unwrap();
        channel
    };
    let (result, _channel) = tokio::join!(buyer.service.initiate(uk_order(6), "PartyB"), script);

    assert_eq!(result.unwrap_err().kind(), FailureKind::SignatureInvalid);
    assert!(buyer.ledger.is_empty());
    assert_eq!(h.notary.request_count(), 0);
}

#[tokio::test]
async fn test_substituted_transaction_is_rejected() {
    let h = Harness::new();
    let buyer = h.node("PartyA", 1);
    let seller = h.raw("PartyB", 2);

    let script = async {
        let channel = seller.endpoint.accept().await.unwrap();
        let mut proposal = channel.receive().await.unwrap().into_proposal().unwrap();
        proposal.state.po.items[0].amount = 11;
        let mut stx =
            PartiallySignedTransaction::new(build_unsigned(&proposal, Utc::now(), window_length()));
        sign(&mut stx, seller.identity.keypair()).unwrap();
        channel
            .send(FlowMessage::PartiallySigned(stx))
            .await
            .unwrap();
        channel
    };
    let (result, _channel) = tokio::join!(buyer.service.initiate(uk_order(7), "PartyB"), script);

    assert_eq!(result.unwrap_err().kind(), FailureKind::SignatureInvalid);
    assert!(buyer.ledger.is_empty());
    assert_eq!(h.notary.request_count(), 0);
}

#[tokio::test]
async fn test_stretched_time_window_is_rejected() {
    let h = Harness::new();
    let buyer = h.node("PartyA", 1);
    let seller = h.raw("PartyB", 2);

    // delivery already past; only a window reaching back weeks would let
    // its midpoint fall before it
    let mut po = uk_order(9);
    po.delivery_date = Utc::now() - chrono::Duration::days(1);

    let script = async {
        let channel = seller.endpoint.accept().await.unwrap();
        let proposal = channel.receive().await.unwrap().into_proposal().unwrap();
        let now = Utc::now();
        let window = TimeWindow {
            not_before: now - chrono::Duration::days(20),
            not_after: now + chrono::Duration::seconds(5),
        };
        let mut stx = PartiallySignedTransaction::new(derive_unsigned(&proposal, window));
        sign(&mut stx, seller.identity.keypair()).unwrap();
        channel
            .send(FlowMessage::PartiallySigned(stx))
            .await
            .unwrap();
        channel
    };
    let (result, _channel) = tokio::join!(buyer.service.initiate(po, "PartyB"), script);

    match result {
        Err(FlowError::ValidationFailure(failure)) => {
            assert_eq!(failure.clause, "Timestamped");
            assert!(failure.mentions("Time window"), "{}", failure);
        }
        other => panic!("expected validation failure, got {:?}", other),
    }
    assert!(buyer.ledger.is_empty());
    assert_eq!(h.notary.request_count(), 0);
}

#[tokio::test]
async fn test_corrupt_finalized_payload_is_malformed() {
    let h = Harness::new();
    let seller = h.node("PartyB", 2);
    let mallory = h.raw("Mallory", 7);
    let me = mallory.identity.party().clone();

    let (mallory_end, seller_end) = channel_pair(SessionId::new(), me.clone(), seller.party.clone());
    let flow = CounterpartyFlow::new(seller.service.context().clone(), Box::new(seller_end));

    let state = PurchaseOrderState::new(uk_order(8), me.clone(), seller.party.clone());
    let proposal = build_proposal(state, me, seller.party.clone(), h.notary.identity().clone());

    let script = async {
        mallory_end
            .send(FlowMessage::Proposal(proposal))
            .await
            .unwrap();
        let mut stx = mallory_end
            .receive()
            .await
            .unwrap()
            .into_partially_signed()
            .unwrap();
        sign(&mut stx, mallory.identity.keypair()).unwrap();
        let window = stx.tx().time_window.unwrap();
        let notary_sig = h.notary.request_signature(&stx, window).await.unwrap();
        let ftx = finalize(stx, notary_sig).unwrap();

        // last byte belongs to the notary signature
        let mut bytes = bincode::serialize(&FlowMessage::Finalized(ftx)).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        mallory_end.send_raw(bytes).unwrap();
    };
    let (result, ()) = tokio::join!(flow.respond(), script);

    assert!(matches!(
        result,
        Err(FlowError::Channel(ChannelError::Malformed(_)))
    ));
    assert!(seller.ledger.is_empty());
}

// =============================================================================
// NOTARY FAILURES
// =============================================================================

#[tokio::test]
async fn test_notary_conflict_records_nothing() {
    let mut h = Harness::new();
    h.add_notary(Arc::new(ConflictingNotary {
        party: Party::new("Stub", PublicKey([0x55; 32])),
    }));
    let buyer = h.node_with(
        "PartyA",
        1,
        AgreementConfig {
            notary_selection: NotarySelection::Named("Stub".into()),
            ..AgreementConfig::default()
        },
    );
    let seller = h.node("PartyB", 2);
    let _responder = seller.service.spawn_responder();

    let err = buyer.service.initiate(uk_order(9), "PartyB").await.unwrap_err();

    match err {
        FlowError::NotaryRejected(NotaryRejection::Conflict { consuming_tx, .. }) => {
            assert_eq!(consuming_tx, TransactionId([8; 32]))
        }
        other => panic!("expected conflict, got {:?}", other),
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(buyer.ledger.is_empty());
    assert!(seller.ledger.is_empty());
}

#[tokio::test]
async fn test_notary_timeout_is_not_retried() {
    let h = Harness::new();
    h.notary.set_latency(Some(Duration::from_secs(5)));
    let buyer = h.node_with(
        "PartyA",
        1,
        AgreementConfig {
            notary_timeout: Duration::from_millis(100),
            ..AgreementConfig::default()
        },
    );
    let seller = h.node("PartyB", 2);
    let _responder = seller.service.spawn_responder();

    let err = buyer.service.initiate(uk_order(10), "PartyB").await.unwrap_err();

    assert_eq!(err, FlowError::NotaryRejected(NotaryRejection::TimedOut));
    assert_eq!(h.notary.request_count(), 1);
    assert!(buyer.ledger.is_empty());
    assert!(seller.ledger.is_empty());
}

// =============================================================================
// TRANSPORT
// =============================================================================

#[tokio::test]
async fn test_silent_counterparty_times_out() {
    let h = Harness::new();
    let buyer = h.node_with(
        "PartyA",
        1,
        AgreementConfig {
            receive_timeout: Duration::from_millis(100),
            ..AgreementConfig::default()
        },
    );
    let seller = h.raw("PartyB", 2);

    let script = async {
        let channel = seller.endpoint.accept().await.unwrap();
        let _ = channel.receive().await.unwrap();
        channel
    };
    let (result, _channel) = tokio::join!(buyer.service.initiate(uk_order(11), "PartyB"), script);

    assert_eq!(result, Err(FlowError::Channel(ChannelError::Timeout)));
    assert!(buyer.ledger.is_empty());
}

#[tokio::test]
async fn test_lost_final_forward_keeps_local_commit() {
    let h = Harness::new();
    let buyer = h.node("PartyA", 1);
    let seller = h.raw("PartyB", 2);

    let script = async {
        let channel = seller.endpoint.accept().await.unwrap();
        let proposal = channel.receive().await.unwrap().into_proposal().unwrap();
        let mut stx =
            PartiallySignedTransaction::new(build_unsigned(&proposal, Utc::now(), window_length()));
        sign(&mut stx, seller.identity.keypair()).unwrap();
        channel
            .send(FlowMessage::PartiallySigned(stx))
            .await
            .unwrap();
        drop(channel);
    };
    let (result, ()) = tokio::join!(buyer.service.initiate(uk_order(12), "PartyB"), script);

    let tx_id = result.unwrap();
    assert_eq!(buyer.ledger.transaction_ids(), vec![tx_id]);
    assert_eq!(h.notary.request_count(), 1);
}

// =============================================================================
// CONCURRENCY
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_are_independent() {
    let h = Harness::new();
    let buyer = h.node("PartyA", 1);
    let seller = h.node("PartyB", 2);
    let _responder = seller.service.spawn_responder();

    let mut handles = Vec::new();
    for n in 0..5u32 {
        let service = buyer.service.clone();
        handles.push(tokio::spawn(async move {
            service.initiate(uk_order(100 + n), "PartyB").await
        }));
    }

    let mut ids = BTreeSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap().unwrap());
    }
    assert_eq!(ids.len(), 5);
    assert_eq!(buyer.ledger.len(), 5);
    for id in &ids {
        wait_for_record(&seller.ledger, id).await.unwrap();
    }
    assert_eq!(seller.service.purchase_orders().await.unwrap().len(), 5);
}
