use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{NewNotifyLog, NotifyLog, OrderNo},
};

pub async fn insert_notify_log(log: NewNotifyLog, conn: &mut SqliteConnection) -> Result<i64, SqliteDatabaseError> {
    let id: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO recon_notify_log (
                order_no,
                sub_order_no,
                merchant_id,
                notify_url,
                notify_status,
                notify_result,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id;
        "#,
    )
    .bind(log.order_no.as_str())
    .bind(log.sub_order_no)
    .bind(log.merchant_id)
    .bind(log.notify_url)
    .bind(log.notify_status)
    .bind(log.notify_result)
    .bind(log.created_at)
    .bind(log.created_at)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn fetch_notify_logs(order_no: &OrderNo, conn: &mut SqliteConnection) -> Result<Vec<NotifyLog>, SqliteDatabaseError> {
    let logs = sqlx::query_as::<_, NotifyLog>(
        r#"
            SELECT id, order_no, sub_order_no, merchant_id, notify_url, notify_status, notify_result, created_at,
                   updated_at
            FROM recon_notify_log
            WHERE order_no = $1
            ORDER BY id ASC
        "#,
    )
    .bind(order_no.as_str())
    .fetch_all(conn)
    .await?;
    Ok(logs)
}
