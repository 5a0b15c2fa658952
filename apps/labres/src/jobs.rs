//! # Background jobs
//!
//! Periodic calibration refresh, return reminders and the currency rate
//! fetch. A failed run is retried after the short error interval; a
//! successful run goes back to the regular interval.

use crate::api::SharedSession;
use crate::config::JobsConfig;
use crate::error::AppResult;
use chrono::{Duration as ChronoDuration, Local};
use labres_core::ExchangeRate;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    pub error_interval: Duration,
}

impl Schedule {
    #[must_use]
    pub fn new(interval_secs: u64, error_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs),
            error_interval: Duration::from_secs(error_secs),
        }
    }

    /// Delay before the run following one that ended with `ok`.
    #[must_use]
    pub fn next_delay(&self, ok: bool) -> Duration {
        if ok { self.interval } else { self.error_interval }
    }
}

/// Run `job` forever on `schedule`. The first run happens immediately.
pub async fn run_periodic<F, Fut>(name: &'static str, schedule: Schedule, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<()>>,
{
    loop {
        let ok = match job().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(job = name, error = %e, "job failed, retrying soon");
                false
            }
        };
        tokio::time::sleep(schedule.next_delay(ok)).await;
    }
}

pub async fn refresh_calibrations(session: &SharedSession) -> AppResult<()> {
    let today = Local::now().date_naive();
    let updated = session.write().await.refresh_calibrations(today)?;
    tracing::info!(updated, %today, "calibration due status refreshed");
    Ok(())
}

pub async fn remind_returns(session: &SharedSession, lead: ChronoDuration) -> AppResult<()> {
    let now = Local::now().naive_local();
    let reminders = session.write().await.remind_returns(now, lead)?;
    for reminder in &reminders {
        tracing::info!(borrow = %reminder.record(), "{}", reminder);
    }
    tracing::debug!(sent = reminders.len(), "return reminders checked");
    Ok(())
}

/// Rate table body: units of each currency per one CNY.
#[derive(Debug, Deserialize)]
pub struct RatesResponse {
    pub conversion_rates: BTreeMap<String, serde_json::Number>,
}

impl RatesResponse {
    /// Rates that parse as positive fixed-point values. Others are skipped.
    pub fn rates(&self) -> BTreeMap<String, ExchangeRate> {
        self.conversion_rates
            .iter()
            .filter_map(|(code, value)| match value.to_string().parse::<ExchangeRate>() {
                Ok(rate) => Some((code.clone(), rate)),
                Err(e) => {
                    tracing::warn!(currency = %code, error = %e, "skipping unusable rate");
                    None
                }
            })
            .collect()
    }
}

pub fn http_client(timeout: Duration) -> AppResult<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

pub async fn fetch_rates(client: &Client, url: &str) -> AppResult<BTreeMap<String, ExchangeRate>> {
    let body: RatesResponse = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(body.rates())
}

/// Fetch the rate table and write it to the known currencies.
pub async fn refresh_currency_rates(session: &SharedSession, client: &Client, url: &str) -> AppResult<()> {
    let rates = fetch_rates(client, url).await?;
    let now = Local::now().naive_local();
    let updated = session.write().await.update_currency_rates(&rates, now)?;
    tracing::info!(updated, fetched = rates.len(), "currency rates refreshed");
    Ok(())
}

/// Spawn every job. Returns no handles when jobs are disabled.
pub fn spawn_all(session: SharedSession, config: &JobsConfig) -> Vec<JoinHandle<()>> {
    if !config.enabled {
        tracing::info!("background jobs disabled");
        return Vec::new();
    }

    let calibration = {
        let session = session.clone();
        let schedule = Schedule::new(config.calibration_refresh_secs, config.error_retry_secs);
        tokio::spawn(async move {
            run_periodic("refresh_calibrations", schedule, || refresh_calibrations(&session)).await;
        })
    };

    let reminders = {
        let session = session.clone();
        let lead = config.reminder_lead();
        let schedule = Schedule::new(config.remind_interval_secs, config.error_retry_secs);
        tokio::spawn(async move {
            run_periodic("remind_returns", schedule, || remind_returns(&session, lead)).await;
        })
    };

    let mut handles = vec![calibration, reminders];
    let Some(url) = config.currency_rates_url.clone() else {
        return handles;
    };
    match http_client(Duration::from_secs(config.http_timeout_secs)) {
        Ok(client) => {
            let schedule = Schedule::new(config.currency_refresh_secs, config.error_retry_secs);
            handles.push(tokio::spawn(async move {
                run_periodic("refresh_currency_rates", schedule, || {
                    refresh_currency_rates(&session, &client, &url)
                })
                .await;
            }));
        }
        Err(e) => tracing::error!(error = %e, "currency rate job not started"),
    }
    handles
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use axum::Router;
    use axum::routing::get;
    use labres_core::{RedbStore, Session, WorkCalendar, WorkDay};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    const RATES_BODY: &str = r#"{
        "result": "success",
        "base_code": "CNY",
        "conversion_rates": {"CNY": 1, "USD": 0.1385, "JPY": 20.71234567, "XXX": 0}
    }"#;

    /// Serve `RATES_BODY` on `/latest/CNY` and return the base url.
    async fn rate_server() -> (String, JoinHandle<()>) {
        let app = Router::new().route(
            "/latest/CNY",
            get(|| async { ([("content-type", "application/json")], RATES_BODY) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), handle)
    }

    #[test]
    fn rate_table_skips_unusable_values() {
        let body: RatesResponse = serde_json::from_str(RATES_BODY).unwrap();
        let rates = body.rates();
        assert_eq!(rates.len(), 3);
        assert_eq!(rates["CNY"].to_string(), "1.00000");
        assert_eq!(rates["USD"].to_string(), "0.13850");
        // rounded half up to five decimals
        assert_eq!(rates["JPY"].to_string(), "20.71235");
        assert!(!rates.contains_key("XXX"));
    }

    #[tokio::test]
    async fn fetch_reads_the_endpoint() {
        let (base, server) = rate_server().await;
        let client = http_client(Duration::from_secs(5)).unwrap();

        let rates = fetch_rates(&client, &format!("{}/latest/CNY", base)).await.unwrap();
        assert_eq!(rates["USD"].to_string(), "0.13850");

        let missing = fetch_rates(&client, &format!("{}/latest/EUR", base)).await;
        assert!(matches!(missing, Err(AppError::Http(_))));
        server.abort();
    }

    #[tokio::test]
    async fn refresh_writes_known_currencies() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("lab.redb")).unwrap();
        let calendar = WorkCalendar::new(WorkDay::default());
        let session: SharedSession = Arc::new(RwLock::new(Session::new(store, calendar)));
        let before = Local::now().naive_local();
        {
            let mut guard = session.write().await;
            guard.upsert_currency("US Dollar", "USD", None, before).unwrap();
            guard.upsert_currency("Euro", "EUR", None, before).unwrap();
        }

        let (base, server) = rate_server().await;
        let client = http_client(Duration::from_secs(5)).unwrap();
        refresh_currency_rates(&session, &client, &format!("{}/latest/CNY", base))
            .await
            .unwrap();
        server.abort();

        let guard = session.read().await;
        let usd = guard.currency("USD").unwrap();
        assert_eq!(usd.exchange_rate.unwrap().to_string(), "0.13850");
        assert!(usd.updated_at.is_some());
        // not in the table, left without a rate
        assert!(guard.currency("EUR").unwrap().exchange_rate.is_none());
    }

    #[test]
    fn failure_switches_to_error_interval() {
        let schedule = Schedule::new(3600, 60);
        assert_eq!(schedule.next_delay(true), Duration::from_secs(3600));
        assert_eq!(schedule.next_delay(false), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_after_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let schedule = Schedule::new(3600, 60);
        let handle = tokio::spawn(run_periodic("test", schedule, move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(AppError::Server("boom".into()))
                } else {
                    Ok(())
                }
            }
        }));

        // first run fails at t=0, retry at t=60, then the hourly interval
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        tokio::time::sleep(Duration::from_secs(3000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        handle.abort();
    }
}
