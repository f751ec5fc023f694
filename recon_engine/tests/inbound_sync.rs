//! Inbound sync: payment paging, funds detection, multi-token handling and the guard chain.
mod support;

use std::sync::Arc;

use chrono::Utc;
use recon_engine::{
    db_types::{DataSource, HardFault, OrderStatus, PaymentStage},
    jobs::PaymentsJob,
    traits::ReconciliationStore,
};
use support::*;
use tpr_common::Flag;

#[tokio::test]
async fn sufficient_funds_move_the_order_to_processing() {
    let store = memory_store().await;
    seed_order(&store, "100", "100", OrderStatus::Pending).await;

    let ts = Utc::now().timestamp();
    let mut gw = MockGateway::new();
    let paid = payment("100", ts, &[("ethereum", "mainnet", "0xUSD", "100")]);
    gw.expect_list_payments().times(1).returning(move |_, _| Ok(page(vec![paid.clone()])));
    gw.expect_list_payments().times(1).returning(|_, _| Ok(page(vec![])));
    gw.expect_list_tokens().returning(|| Ok(xusd_tokens()));

    let job = PaymentsJob::new(store.clone(), Arc::new(gw), test_config());
    job.execute().await.expect("payments pass");

    let order = store.fetch_order(&oid("100")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    let meta = store.fetch_meta(&oid("100")).await.unwrap();
    assert_eq!(meta.payment_status, Some(PaymentStage::PaymentReceived));
    assert_eq!(meta.processing_completed, Some(Flag::No));
    assert_eq!(meta.data_source, Some(DataSource::Payments));
    assert!(meta.addresses.is_some(), "the payment's address map should be persisted");

    // Cursor lands at max(updated_at) + 1 s, and an empty follow-up run leaves it alone.
    let cursors = store.cursors().await.unwrap();
    assert_eq!(cursors.payment_updated_at.timestamp(), ts + 1);
    job.execute().await.expect("empty payments pass");
    assert_eq!(store.cursors().await.unwrap().payment_updated_at.timestamp(), ts + 1);
}

#[tokio::test]
async fn partial_funds_leave_the_order_pending() {
    let store = memory_store().await;
    seed_order(&store, "200", "100", OrderStatus::Pending).await;

    let ts = Utc::now().timestamp();
    let mut gw = MockGateway::new();
    let short = payment("200", ts, &[("ethereum", "mainnet", "0xUSD", "50")]);
    gw.expect_list_payments().returning(move |_, _| Ok(page(vec![short.clone()])));
    gw.expect_list_tokens().returning(|| Ok(xusd_tokens()));

    let job = PaymentsJob::new(store.clone(), Arc::new(gw), test_config());
    job.execute().await.expect("payments pass");

    let order = store.fetch_order(&oid("200")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    let meta = store.fetch_meta(&oid("200")).await.unwrap();
    assert!(meta.payment_status.is_none());
}

#[tokio::test]
async fn multi_token_payment_needs_manual_resolution() {
    let store = memory_store().await;
    seed_order(&store, "300", "100", OrderStatus::Pending).await;

    let ts = Utc::now().timestamp();
    let mut gw = MockGateway::new();
    let split = payment("300", ts, &[("ethereum", "mainnet", "0xUSD", "60"), ("ethereum", "goerli", "0xUSDTEST", "50")]);
    gw.expect_list_payments().returning(move |_, _| Ok(page(vec![split.clone()])));
    gw.expect_list_tokens().returning(|| Ok(xusd_tokens()));

    let job = PaymentsJob::new(store.clone(), Arc::new(gw), test_config());
    job.execute().await.expect("payments pass");

    let order = store.fetch_order(&oid("300")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::MultiToken);
    // No funds confirmation happened.
    let meta = store.fetch_meta(&oid("300")).await.unwrap();
    assert!(meta.payment_status.is_none());
}

#[tokio::test]
async fn asa_payment_with_algo_dust_is_not_ambiguous() {
    let store = memory_store().await;
    seed_order(&store, "350", "3", OrderStatus::Pending).await;

    let ts = Utc::now().timestamp();
    let mut gw = MockGateway::new();
    let paid = payment("350", ts, &[("algorand", "alg_mainnet", "ALGO", "5"), ("algorand", "alg_mainnet", "ASA1", "3")]);
    gw.expect_list_payments().returning(move |_, _| Ok(page(vec![paid.clone()])));
    gw.expect_list_tokens().returning(|| Ok(xusd_tokens()));

    let job = PaymentsJob::new(store.clone(), Arc::new(gw), test_config());
    job.execute().await.expect("payments pass");

    // The ASA balance is authoritative; the native ALGO balance is ignored, so the order is
    // paid in exactly one token and proceeds.
    let order = store.fetch_order(&oid("350")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
}

#[tokio::test]
async fn payment_without_an_open_order_is_skipped() {
    let store = memory_store().await;
    seed_order(&store, "400", "100", OrderStatus::Completed).await;

    let ts = Utc::now().timestamp();
    let mut gw = MockGateway::new();
    let paid = payment("400", ts, &[("ethereum", "mainnet", "0xUSD", "100")]);
    gw.expect_list_payments().returning(move |_, _| Ok(page(vec![paid.clone()])));
    // No token lookup happens for an order that is past pre-settlement.

    let job = PaymentsJob::new(store.clone(), Arc::new(gw), test_config());
    job.execute().await.expect("payments pass");
    let order = store.fetch_order(&oid("400")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
}

#[tokio::test]
async fn hard_error_blocks_the_inbound_sync() {
    let store = memory_store().await;
    seed_order(&store, "500", "100", OrderStatus::Pending).await;
    let fault = HardFault { code: "E907".to_string(), message: "retry exceeded".to_string(), action: None };
    store.record_hard_fault(&oid("500"), &fault).await.unwrap();

    let ts = Utc::now().timestamp();
    let mut gw = MockGateway::new();
    let paid = payment("500", ts, &[("ethereum", "mainnet", "0xUSD", "100")]);
    gw.expect_list_payments().returning(move |_, _| Ok(page(vec![paid.clone()])));

    let job = PaymentsJob::new(store.clone(), Arc::new(gw), test_config());
    job.execute().await.expect("payments pass");
    let order = store.fetch_order(&oid("500")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    let meta = store.fetch_meta(&oid("500")).await.unwrap();
    assert!(meta.payment_status.is_none());
}

#[tokio::test]
async fn collision_with_orders_job_defers_the_payment() {
    let store = memory_store().await;
    seed_order(&store, "600", "100", OrderStatus::Pending).await;
    store.set_data_source(&oid("600"), DataSource::Orders).await.unwrap();

    let ts = Utc::now().timestamp();
    let mut gw = MockGateway::new();
    let paid = payment("600", ts, &[("ethereum", "mainnet", "0xUSD", "100")]);
    gw.expect_list_payments().returning(move |_, _| Ok(page(vec![paid.clone()])));

    let job = PaymentsJob::new(store.clone(), Arc::new(gw), test_config());
    job.execute().await.expect("payments pass");

    let meta = store.fetch_meta(&oid("600")).await.unwrap();
    assert_eq!(meta.transient_error, Some(Flag::Yes));
    assert_eq!(meta.transient_error_code.as_deref(), Some("E102"));
    assert_eq!(meta.retry_action.as_deref(), Some("syncPayment"));
    let order = store.fetch_order(&oid("600")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn in_flight_gateway_operation_blocks_the_inbound_sync() {
    let store = memory_store().await;
    seed_order(&store, "700", "100", OrderStatus::Pending).await;
    store.set_payment_stage(&oid("700"), PaymentStage::SettleInProgress).await.unwrap();

    let ts = Utc::now().timestamp();
    let mut gw = MockGateway::new();
    let paid = payment("700", ts, &[("ethereum", "mainnet", "0xUSD", "100")]);
    gw.expect_list_payments().returning(move |_, _| Ok(page(vec![paid.clone()])));

    let job = PaymentsJob::new(store.clone(), Arc::new(gw), test_config());
    job.execute().await.expect("payments pass");
    let order = store.fetch_order(&oid("700")).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn page_failure_aborts_without_advancing_the_cursor() {
    let store = memory_store().await;
    let before = store.cursors().await.unwrap();

    let mut gw = MockGateway::new();
    gw.expect_list_payments().returning(|_, _| Err(unavailable()));

    let job = PaymentsJob::new(store.clone(), Arc::new(gw), test_config());
    assert!(job.execute().await.is_err());
    assert_eq!(store.cursors().await.unwrap(), before);
}
