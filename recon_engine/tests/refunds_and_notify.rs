use std::{str::FromStr, time::Duration};

use recon_engine::{
    config::AsyncRefundConfig,
    db_types::{Amount, ExceptionStep, NotifyStatus, OrderNo, PayStatus, ReconStatus, RefundStatus, SplitStatus},
    recon_objects::{
        NotifyReconRequest,
        OrderKey,
        OrderReconRequest,
        RefundReconRequest,
        RefundSplitDetail,
        SplitDetail,
    },
    test_utils::alarms::AlarmRecorder,
    MemoryDatabase,
    ReconApi,
    ReconConfig,
    ReconError,
    ReconQueries,
    ReconRepository,
    RefundDispatcher,
};

const URL: &str = "https://merchant.example.com/notify";

fn amt(s: &str) -> Amount {
    Amount::from_str(s).unwrap()
}

/// Creates an API with one pending order, ORD-100, paid to merchant M1 and split between S1 and S2.
async fn setup() -> (ReconApi<MemoryDatabase>, AlarmRecorder) {
    let _ = env_logger::try_init();
    let alarms = AlarmRecorder::new();
    let api = ReconApi::new(MemoryDatabase::new(), ReconConfig::default(), alarms.service());
    let request = OrderReconRequest::new("ORD-100", amt("100.00"))
        .with_merchant("M1", None)
        .with_merchant_order_no("MO-1")
        .with_split(SplitDetail::new("S1", amt("60.00")).with_sub_order_no("SUB-1"))
        .with_split(SplitDetail::new("S2", amt("40.00")).with_sub_order_no("SUB-2"))
        .with_statuses(PayStatus::Success, SplitStatus::Success, NotifyStatus::Processing);
    let outcome = api.reconcile_order(request).await.expect("Error creating order");
    assert_eq!(outcome.recon_status, ReconStatus::Pending);
    (api, alarms)
}

fn order_no() -> OrderNo {
    OrderNo::from("ORD-100")
}

#[tokio::test]
async fn all_keys_resolve_to_the_same_order() {
    let (api, _) = setup().await;
    let direct = api.resolve(&OrderKey::from(order_no())).await.unwrap();
    let by_sub_order = api.resolve(&OrderKey::sub_order("S1", "SUB-1")).await.unwrap();
    let by_merchant_order = api.resolve(&OrderKey::merchant_order("M1", "MO-1")).await.unwrap();
    assert_eq!(direct.order_no, order_no());
    assert_eq!(by_sub_order.order_no, order_no());
    assert_eq!(by_sub_order.sub_order_no.as_deref(), Some("SUB-1"));
    assert_eq!(by_merchant_order.order_no, order_no());
    assert_eq!(by_merchant_order.merchant_order_no.as_deref(), Some("MO-1"));

    let err = api.resolve(&OrderKey::sub_order("S2", "SUB-1")).await.unwrap_err();
    assert!(matches!(err, ReconError::SubOrderNotFound { .. }));
    let err = api.resolve(&OrderKey::merchant_order("M2", "MO-1")).await.unwrap_err();
    assert!(matches!(err, ReconError::MerchantOrderNotFound { .. }));
    assert!(err.is_business_failure());
}

#[tokio::test]
async fn successful_notify_closes_pending_order() {
    let (api, _) = setup().await;
    let request = NotifyReconRequest::new(OrderKey::sub_order("S1", "SUB-1"), "S1", URL, NotifyStatus::Success)
        .with_result("OK");
    let outcome = api.reconcile_notify(request).await.expect("notify should succeed");
    assert!(outcome.status_advanced);

    let order = api.db().fetch_order(&order_no()).await.unwrap().unwrap();
    assert_eq!(order.recon_status, ReconStatus::Success);
    assert_eq!(order.notify_status, NotifyStatus::Success);
    assert!(order.recon_time.is_some());

    let splits = api.db().fetch_split_subs(&order_no()).await.unwrap();
    let sub_1 = splits.iter().find(|s| s.sub_order_no.as_deref() == Some("SUB-1")).unwrap();
    assert_eq!(sub_1.notify_status, NotifyStatus::Success);
    assert_eq!(sub_1.notify_result.as_deref(), Some("OK"));
    let sub_2 = splits.iter().find(|s| s.sub_order_no.as_deref() == Some("SUB-2")).unwrap();
    assert_eq!(sub_2.notify_status, NotifyStatus::Processing);

    let logs = api.db().fetch_notify_logs(&order_no()).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].id, outcome.log_id);
    assert_eq!(logs[0].sub_order_no.as_deref(), Some("SUB-1"));

    // The order is no longer pending, so a second notify only adds a log
    let request = NotifyReconRequest::new(order_no(), "M1", URL, NotifyStatus::Success);
    let outcome = api.reconcile_notify(request).await.unwrap();
    assert!(!outcome.status_advanced);
    assert_eq!(api.db().fetch_notify_logs(&order_no()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn failed_notify_is_only_logged() {
    let (api, _) = setup().await;
    let request = NotifyReconRequest::new(OrderKey::merchant_order("M1", "MO-1"), "M1", URL, NotifyStatus::Failure)
        .with_result("HTTP 500");
    let outcome = api.reconcile_notify(request).await.unwrap();
    assert!(!outcome.status_advanced);
    let order = api.db().fetch_order(&order_no()).await.unwrap().unwrap();
    assert_eq!(order.recon_status, ReconStatus::Pending);
    assert_eq!(order.notify_status, NotifyStatus::Processing);
    let logs = api.db().fetch_notify_logs(&order_no()).await.unwrap();
    assert_eq!(logs[0].notify_status, NotifyStatus::Failure);
    assert_eq!(logs[0].notify_result.as_deref(), Some("HTTP 500"));
}

#[tokio::test]
async fn notify_for_unknown_sub_order_fails() {
    let (api, _) = setup().await;
    let request = NotifyReconRequest::new(OrderKey::sub_order("S1", "SUB-404"), "S1", URL, NotifyStatus::Success);
    let err = api.reconcile_notify(request).await.unwrap_err();
    assert!(matches!(err, ReconError::SubOrderNotFound { .. }));
    assert!(api.db().fetch_notify_logs(&order_no()).await.unwrap().is_empty());
}

#[tokio::test]
async fn refund_by_merchant_order_is_allocated_to_that_merchant() {
    let (api, _) = setup().await;
    let request = RefundReconRequest::new(OrderKey::merchant_order("M1", "MO-1"), amt("30.00"));
    let outcome = api.reconcile_refund(request).await.expect("refund should succeed");
    assert_eq!(outcome.order_no, order_no());
    assert_eq!(outcome.splits_recorded, 1);

    let order = api.db().fetch_order(&order_no()).await.unwrap().unwrap();
    assert_eq!(order.refund_amount, Some(amt("30.00")));
    assert_eq!(order.refund_status, Some(RefundStatus::Success));
    assert!(order.refund_time.is_some());
    assert_eq!(order.recon_status, ReconStatus::Pending, "refunds never change the reconciliation status");

    let refunds = api.db().fetch_refund_split_subs(&order_no()).await.unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].merchant_id, "M1");
    assert_eq!(refunds[0].merchant_order_no.as_deref(), Some("MO-1"));
    assert_eq!(refunds[0].refund_split_amount, amt("30.00"));
}

#[tokio::test]
async fn refund_splits_are_recorded() {
    let (api, _) = setup().await;
    let request = RefundReconRequest::new(order_no(), amt("30.00"))
        .with_split(RefundSplitDetail::new("S1", amt("20.00")).with_sub_order_no("SUB-1"))
        .with_split(RefundSplitDetail::new("S2", amt("10.00")).with_sub_order_no("SUB-2"));
    let outcome = api.reconcile_refund(request).await.unwrap();
    assert_eq!(outcome.splits_recorded, 2);
    let refunds = api.db().fetch_refund_split_subs(&order_no()).await.unwrap();
    let total: Amount = refunds.iter().map(|r| r.refund_split_amount).sum();
    assert_eq!(total, amt("30.00"));
    assert!(refunds.iter().all(|r| r.merchant_order_no.as_deref() == Some("MO-1")));
}

#[tokio::test]
async fn excessive_refunds_are_rejected() {
    let (api, alarms) = setup().await;
    let too_much = RefundReconRequest::new(order_no(), amt("100.01"));
    let err = api.reconcile_refund(too_much).await.unwrap_err();
    assert_eq!(err.exception_step(), Some(ExceptionStep::AmountMismatch));

    let over_allocated = RefundReconRequest::new(order_no(), amt("10.00"))
        .with_split(RefundSplitDetail::new("S1", amt("6.00")))
        .with_split(RefundSplitDetail::new("S2", amt("5.00")));
    let err = api.reconcile_refund(over_allocated).await.unwrap_err();
    assert_eq!(err.exception_step(), Some(ExceptionStep::AmountMismatch));

    assert_eq!(api.db().fetch_exceptions(&order_no()).await.unwrap().len(), 2);
    assert_eq!(alarms.count_containing("ORD-100"), 2);
    let order = api.db().fetch_order(&order_no()).await.unwrap().unwrap();
    assert!(order.refund_amount.is_none());
    assert!(api.db().fetch_refund_split_subs(&order_no()).await.unwrap().is_empty());
}

#[tokio::test]
async fn refund_for_missing_order() {
    let (api, alarms) = setup().await;
    let request = RefundReconRequest::new(OrderNo::from("ORD-404"), amt("1.00"));
    let err = api.reconcile_refund(request).await.unwrap_err();
    assert!(matches!(err, ReconError::OrderNotFound(_)));
    assert!(api.db().fetch_exceptions(&OrderNo::from("ORD-404")).await.unwrap().is_empty());
    assert!(alarms.messages().is_empty());
}

#[tokio::test]
async fn async_refunds_are_processed_in_the_background() {
    let (api, alarms) = setup().await;
    let db = api.db().clone();
    let (dispatcher, handle) = RefundDispatcher::spawn(api, &AsyncRefundConfig::default());
    dispatcher.reconcile_refund_async(RefundReconRequest::new(OrderKey::sub_order("S2", "SUB-2"), amt("40.00")));
    dispatcher.reconcile_refund_async(RefundReconRequest::new(OrderNo::from("ORD-404"), amt("1.00")));
    drop(dispatcher);
    tokio::time::timeout(Duration::from_secs(5), handle).await.expect("queue did not drain").unwrap();

    let refunds = db.fetch_refund_split_subs(&order_no()).await.unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].merchant_id, "S2");
    assert_eq!(refunds[0].sub_order_no.as_deref(), Some("SUB-2"));
    let failures = alarms.messages().into_iter().filter(|m| m.starts_with("[ASYNC]")).collect::<Vec<_>>();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("ORD-404"));
}

#[tokio::test]
async fn full_queue_is_reported_as_an_alarm() {
    let (api, alarms) = setup().await;
    let config = AsyncRefundConfig { queue_size: 1, workers: 1 };
    let (dispatcher, queue) = RefundDispatcher::new(api, &config);
    dispatcher.reconcile_refund_async(RefundReconRequest::new(order_no(), amt("1.00")));
    dispatcher.reconcile_refund_async(RefundReconRequest::new(order_no(), amt("2.00")));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(alarms.count_containing("[ASYNC]"), 1);
    assert_eq!(alarms.count_containing("full"), 1);
    drop(queue);
}
