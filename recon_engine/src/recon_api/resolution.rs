//! Maps the different ways of identifying an order onto the canonical order number.
use log::*;

use super::{
    errors::ReconError,
    recon_objects::{OrderKey, ResolvedOrder},
};
use crate::db::traits::ReconRepository;

/// Resolves `key` to an order number.
///
/// An [`OrderKey::OrderNo`] resolves to itself without touching the database, so the order it names may not exist.
/// The other keys are looked up, and fail with a "not found" error if there is no match.
pub async fn resolve_order_key<B>(db: &B, key: &OrderKey) -> Result<ResolvedOrder, ReconError>
where B: ReconRepository {
    match key {
        OrderKey::OrderNo(order_no) => Ok(ResolvedOrder::new(order_no.clone())),
        OrderKey::SubOrder { merchant_id, sub_order_no } => {
            let split = db
                .fetch_split_sub_by_sub_order_no(merchant_id, sub_order_no)
                .await
                .map_err(ReconError::database)?
                .ok_or_else(|| ReconError::SubOrderNotFound {
                    merchant_id: merchant_id.clone(),
                    sub_order_no: sub_order_no.clone(),
                })?;
            trace!("⚖️ Sub-order {sub_order_no} ({merchant_id}) resolves to order {}", split.order_no);
            Ok(ResolvedOrder {
                order_no: split.order_no,
                merchant_id: Some(merchant_id.clone()),
                sub_order_no: Some(sub_order_no.clone()),
                merchant_order_no: None,
            })
        },
        OrderKey::MerchantOrder { merchant_id, merchant_order_no } => {
            let order = db
                .fetch_order_by_merchant_order_no(merchant_id, merchant_order_no)
                .await
                .map_err(ReconError::database)?
                .ok_or_else(|| ReconError::MerchantOrderNotFound {
                    merchant_id: merchant_id.clone(),
                    merchant_order_no: merchant_order_no.clone(),
                })?;
            trace!("⚖️ Merchant order {merchant_order_no} ({merchant_id}) resolves to order {}", order.order_no);
            Ok(ResolvedOrder {
                order_no: order.order_no,
                merchant_id: Some(merchant_id.clone()),
                sub_order_no: None,
                merchant_order_no: Some(merchant_order_no.clone()),
            })
        },
    }
}
