//! End-to-end deal lifecycle through the public repository API.

use std::sync::Arc;

use escrowfold::{
    Actor, Buyer, CommandContext, Deal, DealCommand, DealError, DealPayload, DealRepository,
    DealStatus, DocumentKind, ExecuteError, FileStore, Handover, HandoverAction, HandoverVerifier,
    InvoiceIndex, ManualClock, PickupCenter, SequentialIds, StoreError, TransitionPolicy,
    VerifyOutcome, project,
};
use tempfile::TempDir;

fn hub_akwa() -> PickupCenter {
    PickupCenter {
        id: "hub-akwa".into(),
        name: "Akwa Pickup Hub".into(),
        address: "12 Rue Joss, Douala".into(),
    }
}

fn mouse() -> DealPayload {
    DealPayload {
        title: "Mouse".into(),
        quantity: 2,
        unit_price: 12_500,
        buyer: Buyer {
            name: "Amina Njoya".into(),
            phone: "+237 650 000 111".into(),
            email: "amina@example.com".into(),
        },
        handover: Handover::Centre(hub_akwa()),
        notes: Some("Black".into()),
        images: vec!["a.jpg".into()],
    }
}

fn repo(policy: TransitionPolicy) -> DealRepository {
    DealRepository::builder()
        .clock(Arc::new(ManualClock::starting_at(1_700_000_000_000)))
        .ids(SequentialIds::new())
        .policy(policy)
        .build()
}

fn ctx() -> CommandContext {
    CommandContext::default()
}

/// Invariants that must hold after every successful operation.
fn assert_well_formed(deal: &Deal) {
    assert_eq!(deal.total(), u64::from(deal.quantity) * deal.unit_price);
    assert_eq!(project(deal).total, deal.total());
    assert!(!deal.events.is_empty(), "log must never be empty");
    assert!(
        deal.events.windows(2).all(|w| w[0].at <= w[1].at),
        "log must be ordered by timestamp"
    );
    assert_eq!(
        deal.credential.qr_payload,
        format!("{}:{}", deal.id, deal.credential.otp)
    );
    assert!(deal.check_consistency().is_ok(), "log must replay to the deal");
}

async fn scenario_b(repo: &DealRepository) -> Deal {
    let deal = repo.create(mouse(), ctx()).await.expect("create");
    repo.generate_quotation(&deal.id, ctx())
        .await
        .expect("quotation")
        .expect("exists");
    repo.send_to_buyer(&deal.id, ctx())
        .await
        .expect("send")
        .expect("exists")
}

#[tokio::test]
async fn scenario_a_create_draft() {
    let repo = repo(TransitionPolicy::Guarded);
    let deal = repo.create(mouse(), ctx()).await.expect("create");

    assert_eq!(deal.status, DealStatus::Draft);
    assert_eq!(project(&deal).total, 25_000);
    assert_eq!(deal.events.len(), 1);
    assert_eq!(deal.events[0].actor, Actor::Dealer);
    assert_eq!(deal.events[0].action(), "Deal created");
    assert_eq!(deal.pickup_center(), Some(&hub_akwa()));
    assert_well_formed(&deal);
}

#[tokio::test]
async fn scenario_b_quote_and_send() {
    let repo = repo(TransitionPolicy::Guarded);
    let deal = scenario_b(&repo).await;

    assert_eq!(deal.status, DealStatus::Sent);
    assert!(deal.quotation_no.is_some());
    assert!(deal.invoice_no.is_none());
    assert_eq!(project(&deal).kind, DocumentKind::Quotation);
    assert_well_formed(&deal);
}

#[tokio::test]
async fn scenario_c_payment_assigns_stable_identifiers() {
    for policy in [TransitionPolicy::Guarded, TransitionPolicy::Recorded] {
        let repo = repo(policy);
        let sent = scenario_b(&repo).await;
        let paid = repo
            .pay_success(&sent.id, ctx())
            .await
            .expect("pay")
            .expect("exists");

        assert_eq!(paid.status, DealStatus::EscrowHeld);
        let invoice_no = paid.invoice_no.clone().expect("invoice number assigned");
        let order_id = paid.order_id.clone().expect("order id assigned");

        // A repeated payment signal is rejected (guarded) or recorded
        // (permissive); the identifiers never change either way.
        let repeated = repo.pay_success(&sent.id, ctx()).await;
        let after = repo.get(&sent.id).await.expect("get").expect("exists");
        match policy {
            TransitionPolicy::Guarded => {
                assert!(
                    matches!(
                        repeated,
                        Err(ExecuteError::Domain(DealError::InvalidTransition {
                            from: DealStatus::EscrowHeld,
                            command: DealCommand::PaySuccess,
                        }))
                    ),
                    "unexpected outcome: {repeated:?}"
                );
                assert_eq!(after.events, paid.events);
            }
            TransitionPolicy::Recorded => {
                let repaid = repeated.expect("recorded").expect("exists");
                assert_eq!(repaid.events.len(), paid.events.len() + 1);
                assert_eq!(repaid, after);
            }
        }
        assert_eq!(after.invoice_no.as_deref(), Some(invoice_no.as_str()));
        assert_eq!(after.order_id.as_deref(), Some(order_id.as_str()));
        assert_eq!(after.status, DealStatus::EscrowHeld);
        assert_well_formed(&after);
    }
}

#[tokio::test]
async fn scenario_d_unknown_otp_matches_nothing() {
    let repo = repo(TransitionPolicy::Guarded);
    scenario_b(&repo).await;
    let verifier = HandoverVerifier::new(repo);

    let found = verifier.lookup("000000").await.expect("lookup is not an error");
    assert!(found.is_empty());
}

#[tokio::test]
async fn scenario_e_failed_payment_returns_to_sent() {
    let repo = repo(TransitionPolicy::Guarded);
    let sent = scenario_b(&repo).await;
    let paid = repo
        .confirm_by_buyer(&sent.id, ctx())
        .await
        .expect("confirm")
        .expect("exists");
    assert_eq!(paid.status, DealStatus::Paid);

    let failed = repo
        .pay_fail(&sent.id, ctx())
        .await
        .expect("pay_fail")
        .expect("exists");
    assert_eq!(failed.status, DealStatus::Sent);

    let view = project(&failed);
    assert_eq!(view.total, paid.total());
    let last = view.timeline.last().expect("timeline is never empty");
    assert_eq!(last.action, "Payment failed");
    assert_eq!(last.actor, Actor::Buyer);
    assert_eq!(view.timeline.len(), paid.events.len() + 1);
    assert_well_formed(&failed);
}

#[tokio::test]
async fn full_happy_path_through_handover_verification() {
    let repo = repo(TransitionPolicy::Guarded);
    let sent = scenario_b(&repo).await;
    repo.pay_success(&sent.id, ctx()).await.expect("pay");
    let ready = repo
        .mark_ready(&sent.id, ctx())
        .await
        .expect("ready")
        .expect("exists");

    // Release is refused until the handover is confirmed.
    let err = repo.mark_released(&sent.id, ctx()).await.unwrap_err();
    assert!(
        matches!(err, ExecuteError::Domain(DealError::HandoverNotVerified)),
        "unexpected error: {err}"
    );

    let view = project(&ready);
    let pickup = view.pickup.expect("pickup payload once the order exists");
    assert_eq!(pickup.center, hub_akwa());

    let verifier = HandoverVerifier::new(repo.clone());
    let matches = verifier.lookup(&pickup.otp).await.expect("lookup");
    assert_eq!(matches.len(), 1);

    let outcome = verifier
        .confirm(&sent.id, &pickup.otp, HandoverAction::Release, ctx())
        .await
        .expect("confirm");
    let VerifyOutcome::Confirmed(released) = outcome else {
        panic!("expected Confirmed, got {outcome:?}");
    };
    assert_eq!(released.status, DealStatus::Released);
    assert_eq!(released.events.len(), ready.events.len() + 2);
    assert_well_formed(&released);

    // Terminal: nothing leaves Released under the guarded policy. A
    // repeated quotation request is the one accepted no-op.
    for command in DealCommand::ALL {
        if command == DealCommand::GenerateQuotation {
            continue;
        }
        assert!(
            repo.execute(&sent.id, command, ctx()).await.is_err(),
            "{command} should be rejected after release"
        );
    }
    let unchanged = repo.get(&sent.id).await.expect("get").expect("exists");
    assert_eq!(unchanged, released);
}

#[tokio::test]
async fn guarded_second_send_is_rejected_and_log_unchanged() {
    let repo = repo(TransitionPolicy::Guarded);
    let sent = scenario_b(&repo).await;

    let err = repo.send_to_buyer(&sent.id, ctx()).await.unwrap_err();
    assert!(
        matches!(
            err,
            ExecuteError::Domain(DealError::InvalidTransition {
                from: DealStatus::Sent,
                command: DealCommand::SendToBuyer,
            })
        ),
        "unexpected error: {err}"
    );
    let after = repo.get(&sent.id).await.expect("get").expect("exists");
    assert_eq!(after.events, sent.events);
}

#[tokio::test]
async fn recorded_second_send_appends_both() {
    let repo = repo(TransitionPolicy::Recorded);
    let deal = repo.create(mouse(), ctx()).await.expect("create");

    let first = repo
        .send_to_buyer(&deal.id, ctx())
        .await
        .expect("first send")
        .expect("exists");
    let second = repo
        .send_to_buyer(&deal.id, ctx())
        .await
        .expect("second send")
        .expect("exists");

    assert_eq!(first.status, DealStatus::Sent);
    assert_eq!(second.status, DealStatus::Sent);
    assert_eq!(second.events.len(), deal.events.len() + 2);
    assert_eq!(&second.events[..first.events.len()], &first.events[..]);
}

#[tokio::test]
async fn each_transition_appends_exactly_one_event() {
    let repo = repo(TransitionPolicy::Guarded);
    let mut deal = repo.create(mouse(), ctx()).await.expect("create");
    for command in [
        DealCommand::GenerateQuotation,
        DealCommand::SendToBuyer,
        DealCommand::ConfirmByBuyer,
        DealCommand::PaySuccess,
        DealCommand::MarkReady,
        DealCommand::ConfirmHandover,
        DealCommand::MarkReleased,
    ] {
        let next = repo
            .execute(&deal.id, command, ctx())
            .await
            .expect("legal step")
            .expect("exists");
        assert_eq!(next.events.len(), deal.events.len() + 1, "{command}");
        assert_eq!(&next.events[..deal.events.len()], &deal.events[..]);
        assert_well_formed(&next);
        deal = next;
    }
}

#[tokio::test]
async fn quotation_round_trip_preserves_buyer() {
    let repo = repo(TransitionPolicy::Guarded);
    let deal = repo.create(mouse(), ctx()).await.expect("create");
    let quoted = repo
        .generate_quotation(&deal.id, ctx())
        .await
        .expect("quotation")
        .expect("exists");

    let view = project(&quoted);
    assert_eq!(view.buyer, mouse().buyer);
    assert_eq!(view.title, "Mouse");
    assert_eq!(view.quantity, 2);
    assert_eq!(view.unit_price, 12_500);

    // A second request is a no-op.
    let again = repo
        .generate_quotation(&deal.id, ctx())
        .await
        .expect("no-op")
        .expect("exists");
    assert_eq!(again, quoted);
}

#[tokio::test]
async fn refund_returns_held_funds() {
    let repo = repo(TransitionPolicy::Guarded);
    let sent = scenario_b(&repo).await;
    repo.pay_success(&sent.id, ctx()).await.expect("pay");

    let refunded = repo
        .refund(&sent.id, ctx())
        .await
        .expect("refund")
        .expect("exists");
    assert_eq!(refunded.status, DealStatus::Refunded);
    assert_eq!(refunded.events.last().map(|e| e.actor), Some(Actor::Agent));

    // Invoice identifiers outlive the refund.
    let index = InvoiceIndex::compute(&repo.list().await.expect("list"));
    assert_eq!(index.len(), 1);
    assert_eq!(index.records[0].status, DealStatus::Refunded);
}

#[tokio::test]
async fn cancel_and_expire_only_before_payment() {
    let repo = repo(TransitionPolicy::Guarded);
    let a = repo.create(mouse(), ctx()).await.expect("create");
    let cancelled = repo
        .cancel(&a.id, ctx())
        .await
        .expect("cancel")
        .expect("exists");
    assert_eq!(cancelled.status, DealStatus::Cancelled);

    let b = scenario_b(&repo).await;
    let expired = repo
        .expire(&b.id, ctx())
        .await
        .expect("expire")
        .expect("exists");
    assert_eq!(expired.status, DealStatus::Expired);

    let c = scenario_b(&repo).await;
    repo.pay_success(&c.id, ctx()).await.expect("pay");
    assert!(repo.cancel(&c.id, ctx()).await.is_err());
}

#[tokio::test]
async fn otp_collisions_return_every_match() {
    let repo = DealRepository::builder()
        .ids(SequentialIds::with_otps(vec![
            "555555".into(),
            "555555".into(),
            "121212".into(),
        ]))
        .build();
    let a = repo.create(mouse(), ctx()).await.expect("a");
    let b = repo.create(mouse(), ctx()).await.expect("b");
    repo.create(mouse(), ctx()).await.expect("c");

    let verifier = HandoverVerifier::new(repo);
    let mut ids: Vec<String> = verifier
        .lookup("555555")
        .await
        .expect("lookup")
        .into_iter()
        .map(|d| d.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec![a.id, b.id]);
}

#[tokio::test]
async fn file_store_survives_reopen() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    let id = {
        let repo = DealRepository::builder()
            .store(Arc::new(FileStore::new(tmp.path())))
            .ids(SequentialIds::new())
            .build();
        let deal = scenario_b(&repo).await;
        repo.pay_success(&deal.id, ctx()).await.expect("pay");
        deal.id
    };

    let reopened = DealRepository::builder()
        .store(Arc::new(FileStore::new(tmp.path())))
        .build();
    let deal = reopened.get(&id).await.expect("get").expect("persisted");
    assert_eq!(deal.status, DealStatus::EscrowHeld);
    assert_eq!(deal.events.len(), 4);
    assert_well_formed(&deal);

    let on_disk = tmp.path().join("deals").join(format!("{id}.json"));
    assert!(on_disk.exists(), "document should live at deals/<id>.json");
}

#[tokio::test]
async fn tampered_document_is_rejected_on_load() {
    let tmp = TempDir::new().expect("failed to create temp dir");
    let repo = DealRepository::builder()
        .store(Arc::new(FileStore::new(tmp.path())))
        .ids(SequentialIds::new())
        .build();
    let deal = repo.create(mouse(), ctx()).await.expect("create");

    let path = tmp.path().join("deals").join(format!("{}.json", deal.id));
    let mut doc: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("parse");
    doc["status"] = serde_json::json!("RELEASED");
    std::fs::write(&path, serde_json::to_vec(&doc).expect("encode")).expect("write");

    // A fresh repository has no cached actor and must read the file.
    let fresh = DealRepository::builder()
        .store(Arc::new(FileStore::new(tmp.path())))
        .build();
    let err = fresh.get(&deal.id).await.unwrap_err();
    assert!(
        matches!(err, escrowfold::StateError::Store(StoreError::Corrupt { .. })),
        "unexpected error: {err}"
    );
}
