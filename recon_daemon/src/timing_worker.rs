use chrono::{DateTime, NaiveDate, Utc};
use log::*;
use recon_engine::{
    AlarmService,
    ReconConfig,
    ReconQueries,
    ReconQueryApi,
    ReconRepository,
    SqliteDatabase,
    TimingReconApi,
};
use tokio::task::JoinHandle;

/// Starts the timing reconciliation worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// The first run happens immediately, and then once every configured interval.
pub fn start_timing_worker(db: SqliteDatabase, config: ReconConfig, alarms: AlarmService) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = config.timing.interval;
        let mut timer = tokio::time::interval(interval);
        let timing = TimingReconApi::new(db.clone(), config, alarms);
        let queries = ReconQueryApi::new(db);
        info!("🕰️ Timing reconciliation worker started. Running every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            let date = previous_day(Utc::now());
            run_timing_job(&timing, &queries, date).await;
        }
    })
}

/// Sweeps the pending orders for `date`, then writes that date's summary. Errors are logged; the sweep has already
/// raised an alarm for them.
pub async fn run_timing_job<B>(timing: &TimingReconApi<B>, queries: &ReconQueryApi<B>, date: NaiveDate)
where B: ReconRepository + ReconQueries {
    info!("🕰️ Running timing reconciliation for {date}");
    match timing.run_daily_sweep(date).await {
        Ok(report) => debug!("🕰️ {report}"),
        Err(e) => error!("🕰️ Timing reconciliation for {date} failed. {e}"),
    }
    match queries.generate_daily_summary(date).await {
        Ok(summary) => debug!("🕰️ Summary for {date} saved with {} orders", summary.total_orders),
        Err(e) => error!("🕰️ Could not generate the summary for {date}. {e}"),
    }
}

pub fn previous_day(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    today.pred_opt().unwrap_or(today)
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;
    use recon_common::Amount;
    use recon_engine::{
        db_types::{NewOrder, NotifyStatus, OrderNo, PayStatus, ReconStatus, SplitStatus},
        MemoryDatabase,
    };

    use super::*;

    #[test]
    fn previous_day_crosses_month_boundaries() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 30, 0).unwrap();
        assert_eq!(previous_day(now), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[tokio::test]
    async fn job_sweeps_then_summarises() {
        let db = MemoryDatabase::new();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let order_time = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let order = NewOrder::new(OrderNo::from("D-1"), "M1", Amount::from(20), order_time)
            .with_statuses(PayStatus::Success, SplitStatus::Success, NotifyStatus::Success)
            .with_income_and_fee(Amount::from(20), Amount::ZERO);
        db.insert_order(order).await.unwrap();

        let timing = TimingReconApi::new(db.clone(), ReconConfig::default(), AlarmService::log_only());
        let queries = ReconQueryApi::new(db.clone());
        run_timing_job(&timing, &queries, date).await;

        let order = db.fetch_order(&OrderNo::from("D-1")).await.unwrap().unwrap();
        assert_eq!(order.recon_status, ReconStatus::Success);
        let summary = db.fetch_summary(date).await.unwrap().expect("summary was not written");
        assert_eq!(summary.total_orders, 1);
        assert_eq!(summary.success_count, 1);
    }
}
