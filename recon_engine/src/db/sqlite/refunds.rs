use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::splits::INSERT_CHUNK_SIZE;
use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{NewRefundSplitSub, OrderNo, RefundSplitSub},
};

pub async fn insert_refund_split_subs(
    refunds: &[NewRefundSplitSub],
    conn: &mut SqliteConnection,
) -> Result<usize, SqliteDatabaseError> {
    let mut count = 0;
    for chunk in refunds.chunks(INSERT_CHUNK_SIZE) {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "INSERT INTO recon_order_refund_split_sub (order_no, sub_order_no, merchant_id, merchant_order_no, \
             refund_split_amount, created_at, updated_at) ",
        );
        builder.push_values(chunk, |mut row, refund| {
            row.push_bind(refund.order_no.as_str())
                .push_bind(refund.sub_order_no.as_deref())
                .push_bind(refund.merchant_id.as_str())
                .push_bind(refund.merchant_order_no.as_deref())
                .push_bind(refund.refund_split_amount)
                .push_bind(refund.created_at)
                .push_bind(refund.created_at);
        });
        let result = builder.build().execute(&mut *conn).await?;
        count += result.rows_affected() as usize;
    }
    Ok(count)
}

pub async fn fetch_refund_split_subs(
    order_no: &OrderNo,
    conn: &mut SqliteConnection,
) -> Result<Vec<RefundSplitSub>, SqliteDatabaseError> {
    let refunds = sqlx::query_as::<_, RefundSplitSub>(
        r#"
            SELECT id, order_no, sub_order_no, merchant_id, merchant_order_no, refund_split_amount, created_at, updated_at
            FROM recon_order_refund_split_sub
            WHERE order_no = $1
            ORDER BY id ASC
        "#,
    )
    .bind(order_no.as_str())
    .fetch_all(conn)
    .await?;
    Ok(refunds)
}
