use std::str::FromStr;

use chrono::Utc;
use cucumber::{then, when};
use recon_engine::{
    db_types::{Amount, NotifyStatus, OrderNo, PayStatus, ReconStatus, SplitStatus},
    recon_objects::{NotifyReconRequest, OrderKey, OrderReconRequest, RefundReconRequest, SplitDetail},
    ReconQueries,
    ReconRepository,
};

use crate::cucumber::ReconWorld;

const NOTIFY_URL: &str = "https://merchant.example.com/notify";

fn amount(s: &str) -> Amount {
    Amount::from_str(s).expect("Not a valid amount")
}

/// Splits `200.00,100.00` into one split per amount. Beneficiaries are named B1, B2, ... and sub-orders
/// `<order_no>-S1`, `<order_no>-S2`, ...
fn splits(order_no: &str, amounts: &str) -> Vec<SplitDetail> {
    amounts
        .split(',')
        .enumerate()
        .map(|(i, a)| {
            SplitDetail::new(format!("B{}", i + 1), amount(a)).with_sub_order_no(format!("{order_no}-S{}", i + 1))
        })
        .collect()
}

async fn reconcile(world: &mut ReconWorld, request: OrderReconRequest) {
    let result = world.api().reconcile_order(request).await;
    world.system().last_error = result.err();
}

#[when(expr = "order {word} for {word} is reconciled with splits {word}")]
async fn reconcile_order(world: &mut ReconWorld, order_no: String, pay: String, split_amounts: String) {
    let request = OrderReconRequest::new(order_no.as_str(), amount(&pay)).with_splits(splits(&order_no, &split_amounts));
    reconcile(world, request).await;
}

#[when(expr = "order {word} for {word} is reconciled with splits {word} while the notify is processing")]
async fn reconcile_order_processing(world: &mut ReconWorld, order_no: String, pay: String, split_amounts: String) {
    let request = OrderReconRequest::new(order_no.as_str(), amount(&pay))
        .with_splits(splits(&order_no, &split_amounts))
        .with_statuses(PayStatus::Success, SplitStatus::Success, NotifyStatus::Processing);
    reconcile(world, request).await;
}

#[when(expr = "order {word} for {word} with pay status {word} is reconciled")]
async fn reconcile_order_with_pay_status(world: &mut ReconWorld, order_no: String, pay: String, status: String) {
    let pay_status = PayStatus::from_str(&status).expect("Not a valid pay status");
    let request = OrderReconRequest::new(order_no.as_str(), amount(&pay))
        .with_income_and_fee(amount(&pay), Amount::ZERO)
        .with_statuses(pay_status, SplitStatus::Success, NotifyStatus::Success);
    reconcile(world, request).await;
}

#[when(expr = "beneficiary {word} reports a successful notify for sub-order {word}")]
async fn notify_sub_order(world: &mut ReconWorld, merchant_id: String, sub_order_no: String) {
    let key = OrderKey::sub_order(merchant_id.as_str(), sub_order_no.as_str());
    let request = NotifyReconRequest::new(key, merchant_id, NOTIFY_URL, NotifyStatus::Success).with_result("OK");
    world.api().reconcile_notify(request).await.expect("Error processing notify");
}

#[when(expr = "order {word} is refunded {word}")]
async fn refund_order(world: &mut ReconWorld, order_no: String, refund: String) {
    let request = RefundReconRequest::new(OrderNo::from(order_no), amount(&refund));
    let result = world.api().reconcile_refund(request).await;
    world.system().last_error = result.err();
}

#[when(expr = "the payment platform marks order {word} as notified")]
async fn mark_notified(world: &mut ReconWorld, order_no: String) {
    let order_no = OrderNo::from(order_no);
    let updated =
        world.api().db().update_notify_status(&order_no, NotifyStatus::Success).await.expect("Error updating order");
    assert!(updated, "Order does not exist");
}

#[when("the timing sweep runs for today")]
async fn run_sweep(world: &mut ReconWorld) {
    let today = Utc::now().date_naive();
    world.system().timing.run_daily_sweep(today).await.expect("Error running sweep");
}

#[then(expr = "order {word} has reconciliation status {word}")]
async fn check_recon_status(world: &mut ReconWorld, order_no: String, status: String) {
    let expected = ReconStatus::from_str(&status).expect("Not a valid reconciliation status");
    let order = world.api().db().fetch_order(&OrderNo::from(order_no)).await.expect("Error fetching order");
    let order = order.expect("Order does not exist");
    assert_eq!(order.recon_status, expected);
}

#[then(expr = "order {word} was not saved")]
async fn check_order_missing(world: &mut ReconWorld, order_no: String) {
    let order = world.api().db().fetch_order(&OrderNo::from(order_no)).await.expect("Error fetching order");
    assert!(order.is_none(), "Order should not exist");
}

#[then(expr = "the request is rejected at step {int}")]
async fn check_rejected(world: &mut ReconWorld, step_no: i32) {
    let err = world.system().last_error.take().expect("The request was not rejected");
    let actual = err.exception_step().expect("The request failed, but was not rejected by a rule");
    assert_eq!(actual.code(), step_no);
}

#[then("the request succeeds")]
async fn check_success(world: &mut ReconWorld) {
    if let Some(e) = world.system().last_error.take() {
        panic!("The request failed: {e}");
    }
}

#[then(expr = "the number of exceptions for order {word} is {int}")]
async fn check_exception_count(world: &mut ReconWorld, order_no: String, count: usize) {
    let exceptions =
        world.api().db().fetch_exceptions(&OrderNo::from(order_no)).await.expect("Error fetching exceptions");
    assert_eq!(exceptions.len(), count);
}

#[then(expr = "the number of alarms raised for order {word} is {int}")]
async fn check_alarm_count(world: &mut ReconWorld, order_no: String, count: usize) {
    let needle = format!("order: {order_no},");
    assert_eq!(world.system().alarms.count_containing(&needle), count);
}

#[then(expr = "order {word} has a refund of {word}")]
async fn check_refund(world: &mut ReconWorld, order_no: String, refund: String) {
    let order_no = OrderNo::from(order_no);
    let order = world.api().db().fetch_order(&order_no).await.expect("Error fetching order").expect("No order");
    assert_eq!(order.refund_amount, Some(amount(&refund)));
}
