use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{NewSplitSub, NotifyStatus, OrderNo, SplitSub},
};

/// Rows per INSERT statement, keeping well clear of SQLite's bound parameter limit.
pub(crate) const INSERT_CHUNK_SIZE: usize = 100;

const SPLIT_COLUMNS: &str = r#"
    id, order_no, sub_order_no, merchant_id, split_amount, status, notify_status, notify_result, created_at, updated_at
"#;

/// Inserts the split records. This is not atomic; wrap the call in a transaction if all the records must be saved
/// together.
pub async fn insert_split_subs(splits: &[NewSplitSub], conn: &mut SqliteConnection) -> Result<usize, SqliteDatabaseError> {
    let mut count = 0;
    for chunk in splits.chunks(INSERT_CHUNK_SIZE) {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "INSERT INTO recon_order_split_sub (order_no, sub_order_no, merchant_id, split_amount, status, \
             notify_status, notify_result, created_at, updated_at) ",
        );
        builder.push_values(chunk, |mut row, split| {
            row.push_bind(split.order_no.as_str())
                .push_bind(split.sub_order_no.as_deref())
                .push_bind(split.merchant_id.as_str())
                .push_bind(split.split_amount)
                .push_bind(split.status)
                .push_bind(split.notify_status)
                .push_bind(split.notify_result.as_deref())
                .push_bind(split.created_at)
                .push_bind(split.created_at);
        });
        let result = builder.build().execute(&mut *conn).await?;
        count += result.rows_affected() as usize;
    }
    Ok(count)
}

pub async fn fetch_split_subs(order_no: &OrderNo, conn: &mut SqliteConnection) -> Result<Vec<SplitSub>, SqliteDatabaseError> {
    let splits = sqlx::query_as::<_, SplitSub>(&format!(
        "SELECT {SPLIT_COLUMNS} FROM recon_order_split_sub WHERE order_no = $1 ORDER BY id ASC"
    ))
    .bind(order_no.as_str())
    .fetch_all(conn)
    .await?;
    Ok(splits)
}

pub async fn fetch_split_sub_by_sub_order_no(
    merchant_id: &str,
    sub_order_no: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<SplitSub>, SqliteDatabaseError> {
    let split = sqlx::query_as::<_, SplitSub>(&format!(
        "SELECT {SPLIT_COLUMNS} FROM recon_order_split_sub WHERE merchant_id = $1 AND sub_order_no = $2 ORDER BY id \
         LIMIT 1"
    ))
    .bind(merchant_id)
    .bind(sub_order_no)
    .fetch_optional(conn)
    .await?;
    Ok(split)
}

pub async fn update_notify(
    order_no: &OrderNo,
    merchant_id: &str,
    sub_order_no: &str,
    status: NotifyStatus,
    result: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            UPDATE recon_order_split_sub
            SET notify_status = $1, notify_result = $2, updated_at = $3
            WHERE order_no = $4 AND merchant_id = $5 AND sub_order_no = $6
        "#,
    )
    .bind(status)
    .bind(result)
    .bind(Utc::now())
    .bind(order_no.as_str())
    .bind(merchant_id)
    .bind(sub_order_no)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
