use chrono::{NaiveDate, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::to_i64;
use crate::{
    db::{sqlite::SqliteDatabaseError, traits::InsertOrderResult},
    db_types::{NewOrder, NotifyStatus, Order, OrderNo, ReconStatus, RefundUpdate},
};

const ORDER_COLUMNS: &str = r#"
    id, order_no, merchant_id, merchant_name, merchant_order_no, order_amount, actual_amount, platform_income,
    pay_fee, split_total_amount, pay_status, split_status, notify_status, recon_status, refund_status, refund_amount,
    refund_time, order_time, pay_time, recon_time, created_at, updated_at
"#;

/// Inserts the order, unless an order with the same order number already exists.
///
/// The existence check and the unique constraint on `order_no` both guard against duplicates, so a concurrent insert
/// of the same order number also reports [`InsertOrderResult::AlreadyExists`].
pub async fn idempotent_insert(
    order: NewOrder,
    conn: &mut SqliteConnection,
) -> Result<InsertOrderResult, SqliteDatabaseError> {
    if let Some(id) = order_exists(&order.order_no, conn).await? {
        return Ok(InsertOrderResult::AlreadyExists(id));
    }
    let order_no = order.order_no.clone();
    match insert_order(order, conn).await {
        Ok(id) => Ok(InsertOrderResult::Inserted(id)),
        Err(SqliteDatabaseError::DriverError(sqlx::Error::Database(e))) if e.is_unique_violation() => {
            debug!("🗃️ Order {order_no} was inserted concurrently");
            let id = order_exists(&order_no, conn).await?.unwrap_or_default();
            Ok(InsertOrderResult::AlreadyExists(id))
        },
        Err(e) => Err(e),
    }
}

/// Inserts a new order into the database using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<i64, SqliteDatabaseError> {
    let id: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO recon_order_main (
                order_no,
                merchant_id,
                merchant_name,
                merchant_order_no,
                order_amount,
                actual_amount,
                platform_income,
                pay_fee,
                split_total_amount,
                pay_status,
                split_status,
                notify_status,
                recon_status,
                order_time,
                pay_time,
                recon_time,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING id;
        "#,
    )
    .bind(order.order_no.as_str())
    .bind(order.merchant_id)
    .bind(order.merchant_name)
    .bind(order.merchant_order_no)
    .bind(order.order_amount)
    .bind(order.actual_amount)
    .bind(order.platform_income)
    .bind(order.pay_fee)
    .bind(order.split_total_amount)
    .bind(order.pay_status)
    .bind(order.split_status)
    .bind(order.notify_status)
    .bind(order.recon_status)
    .bind(order.order_time)
    .bind(order.pay_time)
    .bind(order.recon_time)
    .bind(order.created_at)
    .bind(order.created_at)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn fetch_order_by_order_no(
    order_no: &OrderNo,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let order = sqlx::query_as::<_, Order>(&format!("SELECT {ORDER_COLUMNS} FROM recon_order_main WHERE order_no = $1"))
        .bind(order_no.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_order_by_merchant_order_no(
    merchant_id: &str,
    merchant_order_no: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM recon_order_main WHERE merchant_id = $1 AND merchant_order_no = $2 ORDER BY id \
         LIMIT 1"
    ))
    .bind(merchant_id)
    .bind(merchant_order_no)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Checks whether the order with the given `OrderNo` already exists in the database. If it does exist, the `id` of the
/// order is returned. If it does not exist, `None` is returned.
pub async fn order_exists(order_no: &OrderNo, conn: &mut SqliteConnection) -> Result<Option<i64>, SqliteDatabaseError> {
    let id: Option<i64> = sqlx::query_scalar("SELECT id FROM recon_order_main WHERE order_no = $1")
        .bind(order_no.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(id)
}

pub async fn fetch_pending_orders(
    date: NaiveDate,
    after_id: i64,
    limit: usize,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, SqliteDatabaseError> {
    let orders = sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM recon_order_main WHERE date(order_time) = $1 AND recon_status = $2 AND id > $3 \
         ORDER BY id ASC LIMIT $4"
    ))
    .bind(date)
    .bind(ReconStatus::Pending)
    .bind(after_id)
    .bind(to_i64(limit))
    .fetch_all(conn)
    .await?;
    trace!("🗃️ {} pending orders fetched for {date} after id {after_id}", orders.len());
    Ok(orders)
}

#[derive(Debug, Clone, Default)]
pub struct OrderQueryFilter {
    order_date: Option<NaiveDate>,
    merchant_id: Option<String>,
    recon_status: Option<ReconStatus>,
    offset: Option<usize>,
    limit: Option<usize>,
}

impl OrderQueryFilter {
    pub fn with_order_date(mut self, date: NaiveDate) -> Self {
        self.order_date = Some(date);
        self
    }

    pub fn with_merchant_id<S: Into<String>>(mut self, merchant_id: S) -> Self {
        self.merchant_id = Some(merchant_id.into());
        self
    }

    pub fn with_recon_status(mut self, status: ReconStatus) -> Self {
        self.recon_status = Some(status);
        self
    }

    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order_date.is_none() && self.merchant_id.is_none() && self.recon_status.is_none()
    }
}

fn push_order_filter(builder: &mut QueryBuilder<'_, Sqlite>, query: &OrderQueryFilter) {
    if query.is_empty() {
        return;
    }
    builder.push("WHERE ");
    let mut where_clause = builder.separated(" AND ");
    if let Some(date) = query.order_date {
        where_clause.push("date(order_time) = ");
        where_clause.push_bind_unseparated(date);
    }
    if let Some(merchant_id) = &query.merchant_id {
        where_clause.push("merchant_id = ");
        where_clause.push_bind_unseparated(merchant_id.clone());
    }
    if let Some(status) = query.recon_status {
        where_clause.push("recon_status = ");
        where_clause.push_bind_unseparated(status);
    }
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `id` in ascending order
pub async fn fetch_orders(
    query: OrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, SqliteDatabaseError> {
    let mut builder = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM recon_order_main "));
    push_order_filter(&mut builder, &query);
    builder.push(" ORDER BY id ASC");
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(to_i64(limit));
        builder.push(" OFFSET ");
        builder.push_bind(to_i64(query.offset.unwrap_or_default()));
    }
    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of fetch_orders: {:?}", orders.len());
    Ok(orders)
}

/// Counts the orders matching the criteria in the `OrderQueryFilter`. Paging is ignored.
pub async fn count_orders(query: &OrderQueryFilter, conn: &mut SqliteConnection) -> Result<u64, SqliteDatabaseError> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM recon_order_main ");
    push_order_filter(&mut builder, query);
    let count: i64 = builder.build_query_scalar().fetch_one(conn).await?;
    Ok(u64::try_from(count).unwrap_or_default())
}

/// Conditionally moves the order from the `expected` recon status to `status`. Returns `true` if a row was updated.
pub async fn update_recon_status(
    order_no: &OrderNo,
    expected: ReconStatus,
    status: ReconStatus,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let now = Utc::now();
    let recon_time = status.is_terminal().then_some(now);
    let result = sqlx::query(
        r#"
            UPDATE recon_order_main
            SET recon_status = $1, recon_time = COALESCE($2, recon_time), updated_at = $3
            WHERE order_no = $4 AND recon_status = $5
        "#,
    )
    .bind(status)
    .bind(recon_time)
    .bind(now)
    .bind(order_no.as_str())
    .bind(expected)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn update_notify_status(
    order_no: &OrderNo,
    status: NotifyStatus,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query("UPDATE recon_order_main SET notify_status = $1, updated_at = $2 WHERE order_no = $3")
        .bind(status)
        .bind(Utc::now())
        .bind(order_no.as_str())
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn update_refund(
    order_no: &OrderNo,
    refund: RefundUpdate,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"
            UPDATE recon_order_main
            SET refund_status = $1, refund_amount = $2, refund_time = $3, updated_at = $4
            WHERE order_no = $5
        "#,
    )
    .bind(refund.refund_status)
    .bind(refund.refund_amount)
    .bind(refund.refund_time)
    .bind(Utc::now())
    .bind(order_no.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
