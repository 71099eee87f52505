use chrono::Utc;
use log::*;

use super::{
    errors::ReconError,
    realtime_api::ReconApi,
    recon_objects::{RefundOutcome, RefundReconRequest, ResolvedOrder},
    rules,
};
use crate::{
    db::traits::ReconRepository,
    db_types::{ExceptionStep, NewRefundSplitSub, Order, RefundUpdate},
};

impl<B> ReconApi<B>
where B: ReconRepository
{
    /// Records a refund against an existing order.
    ///
    /// The refund may not exceed the amount paid, and its split allocations may not add up to more than the refund
    /// itself. Violations are recorded as amount mismatch exceptions.
    ///
    /// The refund status, amount and time are written to the order, and every split allocation is appended to the
    /// refund log. When the order was identified by a sub-order or merchant order and no allocations are given, the
    /// whole refund is allocated to that merchant.
    ///
    /// Refunds never change the order's reconciliation status.
    pub async fn reconcile_refund(&self, request: RefundReconRequest) -> Result<RefundOutcome, ReconError> {
        self.ensure_enabled()?;
        let resolved = self.resolve(&request.key).await?;
        let order_no = resolved.order_no.clone();
        let order = match self.db().fetch_order(&order_no).await {
            Ok(Some(order)) => order,
            Ok(None) => return Err(ReconError::OrderNotFound(order_no)),
            Err(e) => {
                let err = ReconError::database(e);
                let merchant_id = resolved.merchant_id.as_deref().unwrap_or_default();
                return Err(self.persistence_failure(&order_no, merchant_id, err).await);
            },
        };
        trace!("⚖️ Reconciling a refund of {} for order {order_no}", request.refund_amount);
        if request.refund_amount > order.actual_amount {
            let message =
                format!("refund amount {} exceeds the paid amount {}", request.refund_amount, order.actual_amount);
            return Err(self.reject(&order_no, &order.merchant_id, ExceptionStep::AmountMismatch, message).await);
        }
        let allocated = match rules::split_total(request.splits.iter().map(|s| s.amount)) {
            Ok(total) => total,
            Err(e) => {
                let message = format!("refund split amounts cannot be totalled. {e}");
                return Err(self.reject(&order_no, &order.merchant_id, ExceptionStep::AmountMismatch, message).await);
            },
        };
        if allocated > request.refund_amount {
            let message =
                format!("refund splits total {allocated}, which exceeds the refund amount {}", request.refund_amount);
            return Err(self.reject(&order_no, &order.merchant_id, ExceptionStep::AmountMismatch, message).await);
        }
        let update = RefundUpdate {
            refund_status: request.refund_status,
            refund_amount: request.refund_amount,
            refund_time: request.refund_time,
        };
        match self.db().update_refund(&order_no, update).await {
            Ok(true) => trace!("⚖️ Refund details saved on order {order_no}"),
            Ok(false) => {
                let err = ReconError::WriteRejected(format!("refund details of order {order_no} were not saved"));
                return Err(self.persistence_failure(&order_no, &order.merchant_id, err).await);
            },
            Err(e) => {
                let err = ReconError::database(e);
                return Err(self.persistence_failure(&order_no, &order.merchant_id, err).await);
            },
        }
        let records = refund_records(&request, &resolved, &order);
        if !records.is_empty() {
            match self.db().save_refund_split_subs(&records).await {
                Ok(n) if n == records.len() => {},
                Ok(n) => {
                    let err = ReconError::WriteRejected(format!(
                        "only {n} of {} refund split records were saved for order {order_no}",
                        records.len()
                    ));
                    return Err(self.persistence_failure(&order_no, &order.merchant_id, err).await);
                },
                Err(e) => {
                    let err = ReconError::database(e);
                    return Err(self.persistence_failure(&order_no, &order.merchant_id, err).await);
                },
            }
        }
        info!("⚖️ Refund of {} for order {order_no} recorded as {}", request.refund_amount, request.refund_status);
        Ok(RefundOutcome { order_no, refund_status: request.refund_status, splits_recorded: records.len() })
    }
}

fn refund_records(request: &RefundReconRequest, resolved: &ResolvedOrder, order: &Order) -> Vec<NewRefundSplitSub> {
    let now = Utc::now();
    let merchant_order_no = resolved.merchant_order_no.clone().or_else(|| order.merchant_order_no.clone());
    if request.splits.is_empty() {
        return match &resolved.merchant_id {
            Some(merchant_id) => vec![NewRefundSplitSub {
                order_no: order.order_no.clone(),
                sub_order_no: resolved.sub_order_no.clone(),
                merchant_id: merchant_id.clone(),
                merchant_order_no,
                refund_split_amount: request.refund_amount,
                created_at: now,
            }],
            None => Vec::new(),
        };
    }
    request
        .splits
        .iter()
        .map(|split| NewRefundSplitSub {
            order_no: order.order_no.clone(),
            sub_order_no: split.sub_order_no.clone().or_else(|| resolved.sub_order_no.clone()),
            merchant_id: split.merchant_id.clone(),
            merchant_order_no: merchant_order_no.clone(),
            refund_split_amount: split.amount,
            created_at: now,
        })
        .collect()
}
