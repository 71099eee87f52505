use chrono::{NaiveDate, Utc};
use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{NewReconSummary, ReconSummary},
};

/// Inserts the summary for the date, or overwrites the totals if one already exists.
pub async fn upsert_summary(summary: NewReconSummary, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    let now = Utc::now();
    sqlx::query(
        r#"
            INSERT INTO recon_summary (
                summary_date,
                total_orders,
                success_count,
                fail_count,
                init_count,
                total_amount,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (summary_date) DO UPDATE SET
                total_orders = excluded.total_orders,
                success_count = excluded.success_count,
                fail_count = excluded.fail_count,
                init_count = excluded.init_count,
                total_amount = excluded.total_amount,
                updated_at = excluded.updated_at
        "#,
    )
    .bind(summary.summary_date)
    .bind(summary.total_orders)
    .bind(summary.success_count)
    .bind(summary.fail_count)
    .bind(summary.init_count)
    .bind(summary.total_amount)
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_summary(date: NaiveDate, conn: &mut SqliteConnection) -> Result<Option<ReconSummary>, SqliteDatabaseError> {
    let summary = sqlx::query_as::<_, ReconSummary>(
        r#"
            SELECT id, summary_date, total_orders, success_count, fail_count, init_count, total_amount, created_at,
                   updated_at
            FROM recon_summary
            WHERE summary_date = $1
        "#,
    )
    .bind(date)
    .fetch_optional(conn)
    .await?;
    Ok(summary)
}
