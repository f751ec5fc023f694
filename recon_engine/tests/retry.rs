//! Retry job dispatch, the consecutive-failure counter and hard-error escalation.
mod support;

use std::sync::Arc;

use chrono::Utc;
use recon_engine::{
    db_types::{OrderStatus, PaymentStage, RetryAction},
    faults::{codes, FaultLog, MAX_RETRIES},
    jobs::{OrdersJob, RetryJob},
    traits::ReconciliationStore,
};
use support::*;
use tpr_common::Flag;

#[tokio::test]
async fn transient_counter_increments_on_identical_faults_and_resets_on_new_ones() {
    let store = memory_store().await;
    seed_order(&store, "100", "100", OrderStatus::Completed).await;
    let faults = FaultLog::new(store.clone());
    let id = oid("100");

    faults.record_transient(&id, RetryAction::SyncOrder, codes::SETTLE_CALL_FAILED, "timeout").await.unwrap();
    assert_eq!(store.fetch_meta(&id).await.unwrap().transient_error_count, 0);

    faults.record_transient(&id, RetryAction::SyncOrder, codes::SETTLE_CALL_FAILED, "timeout").await.unwrap();
    faults.record_transient(&id, RetryAction::SyncOrder, codes::SETTLE_CALL_FAILED, "timeout").await.unwrap();
    assert_eq!(store.fetch_meta(&id).await.unwrap().transient_error_count, 2);

    // A different (code, action) pair resets the counter and takes over the slot.
    faults.record_transient(&id, RetryAction::SyncOrder, codes::ORDERS_COLLISION, "deferred").await.unwrap();
    let meta = store.fetch_meta(&id).await.unwrap();
    assert_eq!(meta.transient_error_count, 0);
    assert_eq!(meta.transient_error_code.as_deref(), Some(codes::ORDERS_COLLISION));

    // Clearing removes the transient state entirely.
    faults.clear(&id).await.unwrap();
    let meta = store.fetch_meta(&id).await.unwrap();
    assert!(meta.transient_error.is_none());
    assert!(meta.retry_action.is_none());
    assert_eq!(meta.transient_error_count, 0);
}

#[tokio::test]
async fn gateway_rejections_classify_as_hard_and_outages_as_transient() {
    let store = memory_store().await;
    seed_order(&store, "150", "100", OrderStatus::Completed).await;
    seed_order(&store, "151", "100", OrderStatus::Completed).await;
    let faults = FaultLog::new(store.clone());

    faults.record(&oid("150"), RetryAction::Settle, codes::SETTLE_CALL_FAILED, &unavailable()).await.unwrap();
    let meta = store.fetch_meta(&oid("150")).await.unwrap();
    assert_eq!(meta.transient_error, Some(Flag::Yes));
    assert!(meta.hard_error.is_none());

    let rejection = gateway_client::GatewayApiError::QueryError { status: 400, message: "bad token".to_string() };
    faults.record(&oid("151"), RetryAction::Settle, codes::SETTLE_CALL_FAILED, &rejection).await.unwrap();
    let meta = store.fetch_meta(&oid("151")).await.unwrap();
    assert_eq!(meta.hard_error, Some(Flag::Yes));
    assert!(meta.transient_error.is_none());
}

#[tokio::test]
async fn fault_recording_for_an_unknown_order_is_a_noop() {
    let store = memory_store().await;
    let faults = FaultLog::new(store.clone());
    let ghost = oid("does-not-exist");
    faults.record_transient(&ghost, RetryAction::SyncOrder, codes::SETTLE_CALL_FAILED, "timeout").await.unwrap();
    faults.record_hard(&ghost, None, codes::REFUND_OP_FAILED, "boom").await.unwrap();
    let meta = store.fetch_meta(&ghost).await.unwrap();
    assert!(meta.transient_error.is_none());
    assert!(meta.hard_error.is_none());
}

#[tokio::test]
async fn retry_budget_exhaustion_escalates_and_stops() {
    let store = memory_store().await;
    seed_order(&store, "200", "100", OrderStatus::Completed).await;
    let faults = FaultLog::new(store.clone());
    let id = oid("200");
    for _ in 0..=(MAX_RETRIES + 1) {
        faults.record_transient(&id, RetryAction::SyncOrder, codes::SETTLE_CALL_FAILED, "timeout").await.unwrap();
    }
    assert_eq!(store.fetch_meta(&id).await.unwrap().transient_error_count, MAX_RETRIES + 1);

    // Escalation happens in the retry job, which then must not dispatch the action: an empty
    // mock turns any gateway call into a test failure.
    let job = RetryJob::new(store.clone(), Arc::new(MockGateway::new()), test_config());
    job.execute().await.expect("retry pass");

    let meta = store.fetch_meta(&id).await.unwrap();
    assert_eq!(meta.hard_error, Some(Flag::Yes));
    assert_eq!(meta.hard_error_code.as_deref(), Some(codes::RETRY_EXCEEDED));
    // The order no longer qualifies for automatic retries.
    assert!(store.retryable_orders().await.unwrap().is_empty());
    job.execute().await.expect("second retry pass is a no-op");
}

#[tokio::test]
async fn unknown_retry_action_is_dead_lettered() {
    let store = memory_store().await;
    seed_order(&store, "300", "100", OrderStatus::Completed).await;
    sqlx::query("UPDATE order_meta SET transient_error = 'yes', retry_action = 'reticulateSplines' WHERE order_id = $1")
        .bind("300")
        .execute(store.pool())
        .await
        .unwrap();

    let job = RetryJob::new(store.clone(), Arc::new(MockGateway::new()), test_config());
    job.execute().await.expect("retry pass");
    let meta = store.fetch_meta(&oid("300")).await.unwrap();
    assert!(meta.hard_error.is_none(), "dead-lettering is not an escalation");
}

#[tokio::test]
async fn failed_settle_is_redriven_directly() {
    let store = memory_store().await;
    seed_order(&store, "400", "100", OrderStatus::Completed).await;

    let mut gw = MockGateway::new();
    let ts = Utc::now().timestamp();
    let paid = payment("400", ts, &[("ethereum", "mainnet", "0xUSD", "100")]);
    gw.expect_get_payment().returning(move |_| Ok(paid.clone()));
    gw.expect_list_tokens().returning(|| Ok(xusd_tokens()));
    gw.expect_settle_payment().times(1).returning(|_, _, _| Ok(submitted("op-1")));
    // The settle operation resolves as failed on the gateway...
    gw.expect_get_payment_operation().times(1).returning(|_, _| Ok(operation(Some(Flag::No))));
    // ...and the retry job re-settles without re-entering the guard chain.
    gw.expect_settle_payment().times(1).returning(|_, _, _| Ok(submitted("op-2")));
    let gw = Arc::new(gw);

    let orders_job = OrdersJob::new(store.clone(), gw.clone(), test_config());
    orders_job.execute().await.expect("orders pass");
    let meta = store.fetch_meta(&oid("400")).await.unwrap();
    assert_eq!(meta.payment_status, Some(PaymentStage::SettleFailed));
    assert_eq!(meta.transient_error, Some(Flag::Yes));
    assert_eq!(meta.transient_error_code.as_deref(), Some(codes::SETTLE_OP_FAILED));
    assert_eq!(meta.retry_action.as_deref(), Some("settle"));

    let retry_job = RetryJob::new(store.clone(), gw, test_config());
    retry_job.execute().await.expect("retry pass");
    let meta = store.fetch_meta(&oid("400")).await.unwrap();
    assert_eq!(meta.payment_status, Some(PaymentStage::SettleInProgress));
    assert_eq!(meta.txid.as_deref(), Some("op-2"));
    assert!(meta.transient_error.is_none(), "a successful re-drive clears the fault");
}

#[tokio::test]
async fn deferred_payment_sync_is_replayed_by_the_retry_job() {
    let store = memory_store().await;
    seed_order(&store, "500", "100", OrderStatus::Pending).await;
    let faults = FaultLog::new(store.clone());
    faults.record_transient(&oid("500"), RetryAction::SyncPayment, codes::PAYMENTS_COLLISION, "deferred").await.unwrap();

    let mut gw = MockGateway::new();
    let ts = Utc::now().timestamp();
    let paid = payment("500", ts, &[("ethereum", "mainnet", "0xUSD", "100")]);
    // The retry path has no payment object in hand, so it refetches.
    gw.expect_get_payment().times(1).returning(move |_| Ok(paid.clone()));
    gw.expect_list_tokens().returning(|| Ok(xusd_tokens()));

    let job = RetryJob::new(store.clone(), Arc::new(gw), test_config());
    job.execute().await.expect("retry pass");

    let order = store.fetch_order(&oid("500")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    let meta = store.fetch_meta(&oid("500")).await.unwrap();
    assert_eq!(meta.payment_status, Some(PaymentStage::PaymentReceived));
}
