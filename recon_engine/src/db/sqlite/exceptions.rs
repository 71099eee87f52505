use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use log::trace;

use super::{splits::INSERT_CHUNK_SIZE, to_i64};
use crate::{
    db::{sqlite::SqliteDatabaseError, traits::ExceptionQueryFilter},
    db_types::{NewReconException, OrderNo, ReconException},
};

const EXCEPTION_COLUMNS: &str =
    "id, order_no, merchant_id, exception_type, exception_msg, exception_step, created_at, updated_at";

pub async fn insert_exception(
    exception: NewReconException,
    conn: &mut SqliteConnection,
) -> Result<i64, SqliteDatabaseError> {
    let id: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO recon_exception (
                order_no,
                merchant_id,
                exception_type,
                exception_msg,
                exception_step,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id;
        "#,
    )
    .bind(exception.order_no.as_str())
    .bind(exception.merchant_id)
    .bind(exception.exception_type)
    .bind(exception.exception_msg)
    .bind(exception.exception_step)
    .bind(exception.created_at)
    .bind(exception.created_at)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub async fn insert_exceptions(
    exceptions: &[NewReconException],
    conn: &mut SqliteConnection,
) -> Result<usize, SqliteDatabaseError> {
    let mut count = 0;
    for chunk in exceptions.chunks(INSERT_CHUNK_SIZE) {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "INSERT INTO recon_exception (order_no, merchant_id, exception_type, exception_msg, exception_step, \
             created_at, updated_at) ",
        );
        builder.push_values(chunk, |mut row, exception| {
            row.push_bind(exception.order_no.as_str())
                .push_bind(exception.merchant_id.as_str())
                .push_bind(exception.exception_type)
                .push_bind(exception.exception_msg.as_str())
                .push_bind(exception.exception_step)
                .push_bind(exception.created_at)
                .push_bind(exception.created_at);
        });
        let result = builder.build().execute(&mut *conn).await?;
        count += result.rows_affected() as usize;
    }
    Ok(count)
}

pub async fn fetch_exceptions(
    order_no: &OrderNo,
    conn: &mut SqliteConnection,
) -> Result<Vec<ReconException>, SqliteDatabaseError> {
    let exceptions = sqlx::query_as::<_, ReconException>(&format!(
        "SELECT {EXCEPTION_COLUMNS} FROM recon_exception WHERE order_no = $1 ORDER BY id ASC"
    ))
    .bind(order_no.as_str())
    .fetch_all(conn)
    .await?;
    Ok(exceptions)
}

fn push_exception_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &ExceptionQueryFilter) {
    if filter.is_empty() {
        return;
    }
    builder.push("WHERE ");
    let mut where_clause = builder.separated(" AND ");
    if let Some(merchant_id) = &filter.merchant_id {
        where_clause.push("merchant_id = ");
        where_clause.push_bind_unseparated(merchant_id.clone());
    }
    if let Some(since) = filter.since {
        where_clause.push("date(created_at) >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = filter.until {
        where_clause.push("date(created_at) <= ");
        where_clause.push_bind_unseparated(until);
    }
    if let Some(step) = filter.step {
        where_clause.push("exception_step = ");
        where_clause.push_bind_unseparated(step);
    }
}

/// Fetches a page of the exceptions matching the filter, newest first.
pub async fn fetch_exceptions_filtered(
    filter: &ExceptionQueryFilter,
    offset: usize,
    limit: usize,
    conn: &mut SqliteConnection,
) -> Result<Vec<ReconException>, SqliteDatabaseError> {
    let mut builder = QueryBuilder::new(format!("SELECT {EXCEPTION_COLUMNS} FROM recon_exception "));
    push_exception_filter(&mut builder, filter);
    builder.push(" ORDER BY id DESC LIMIT ");
    builder.push_bind(to_i64(limit));
    builder.push(" OFFSET ");
    builder.push_bind(to_i64(offset));
    trace!("🗃️ Executing query: {}", builder.sql());
    let exceptions = builder.build_query_as::<ReconException>().fetch_all(conn).await?;
    Ok(exceptions)
}

pub async fn count_exceptions(
    filter: &ExceptionQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<u64, SqliteDatabaseError> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM recon_exception ");
    push_exception_filter(&mut builder, filter);
    let count: i64 = builder.build_query_scalar().fetch_one(conn).await?;
    Ok(u64::try_from(count).unwrap_or_default())
}
