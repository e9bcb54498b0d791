//! Daily trigger for the drift job.

use std::future::Future;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::{error, info};

use crate::error::{DriftError, Result};

/// Hour of day (UTC) the job runs at unless configured otherwise.
pub const DEFAULT_RUN_HOUR_UTC: u32 = 17;

/// The next instant at `hour:00:00` UTC strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, hour_utc: u32) -> Result<DateTime<Utc>> {
    let at = NaiveTime::from_hms_opt(hour_utc, 0, 0)
        .ok_or_else(|| DriftError::Config(format!("schedule hour out of range: {hour_utc}")))?;
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        Ok(today)
    } else {
        Ok(today + Duration::days(1))
    }
}

/// Run `job` once a day at `hour_utc`, forever.
///
/// A failed run is logged and the loop waits for the next tick.
pub async fn run_daily<F, Fut, T>(hour_utc: u32, mut job: F) -> Result<()>
where
    F: FnMut(DateTime<Utc>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    loop {
        let now = Utc::now();
        let next = next_run_after(now, hour_utc)?;
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next_run = %next, wait_secs = wait.as_secs(), "waiting for next drift run");
        tokio::time::sleep(wait).await;

        if let Err(err) = job(Utc::now()).await {
            error!(error = %err, "scheduled drift run failed");
        }
    }
}
