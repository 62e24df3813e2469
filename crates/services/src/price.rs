use chrono::Utc;
use models::{IcpPriceData, PriceSettings};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::{Result, ServiceError};
use crate::scope::TaskScope;

pub const PRICE_API_KEY_ENV: &str = "PRICE_API_KEY";
const PRICE_API_KEY_HEADER: &str = "x-cg-demo-api-key";
const ASSET_KEY: &str = "internet-computer";

/// Live ICP/USD price, shared by every screen.
///
/// A failed refresh keeps the last good price and records the error, so
/// callers can show a degraded state instead of failing.
pub struct PriceService {
    http: Client,
    api_url: String,
    state: RwLock<IcpPriceData>,
    in_flight: AtomicUsize,
}

/// Counts one fetch in flight; released even if the fetch is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn start(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Reads `{"internet-computer": {"usd": .., "usd_24h_change": ..}}`.
/// Returns `(price, change_percent_24h)`.
pub fn parse_price_payload(payload: &Value) -> std::result::Result<(f64, f64), String> {
    let asset = payload
        .get(ASSET_KEY)
        .ok_or_else(|| "ICP price data not found in response".to_string())?;
    let price = asset
        .get("usd")
        .and_then(Value::as_f64)
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| "ICP price missing or invalid".to_string())?;
    let change = asset
        .get("usd_24h_change")
        .and_then(Value::as_f64)
        .filter(|c| c.is_finite())
        .unwrap_or(0.0);
    Ok((price, change))
}

/// Absolute 24h move implied by the current price and the percentage change.
pub fn absolute_change(price: f64, change_percent: f64) -> f64 {
    let previous = price / (1.0 + change_percent / 100.0);
    if previous.is_finite() {
        price - previous
    } else {
        0.0
    }
}

impl PriceService {
    pub fn new(settings: &PriceSettings, api_key: Option<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let mut value = HeaderValue::from_str(&key)
                .map_err(|_| ServiceError::Price(format!("{PRICE_API_KEY_ENV} is not a valid header value")))?;
            value.set_sensitive(true);
            headers.insert(PRICE_API_KEY_HEADER, value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::Price(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_url: settings.api_url.clone(),
            state: RwLock::new(IcpPriceData::default()),
            in_flight: AtomicUsize::new(0),
        })
    }

    pub async fn current(&self) -> IcpPriceData {
        let mut data = self.state.read().await.clone();
        data.is_loading = self.in_flight.load(Ordering::SeqCst) > 0;
        data
    }

    /// Last known price; 0 until the first successful fetch.
    pub async fn price(&self) -> f64 {
        self.state.read().await.price
    }

    /// USD display string for an ICP amount at the live price.
    pub async fn format_usd(&self, icp_amount: f64) -> String {
        utils::format_usd(icp_amount, self.price().await)
    }

    async fn fetch(&self) -> Result<(f64, f64)> {
        let payload: Value = self
            .http
            .get(&self.api_url)
            .send()
            .await
            .map_err(|e| ServiceError::Price(format!("GET {} failed: {e}", self.api_url)))?
            .error_for_status()
            .map_err(|e| ServiceError::Price(format!("price API returned an error: {e}")))?
            .json()
            .await
            .map_err(|e| ServiceError::Price(format!("price API returned invalid JSON: {e}")))?;

        parse_price_payload(&payload).map_err(ServiceError::Price)
    }

    /// Fetches a fresh price. Never fails: on error the previous price stays
    /// and `error` is set.
    pub async fn refresh_price(&self) -> IcpPriceData {
        let result = {
            let _loading = InFlight::start(&self.in_flight);
            self.fetch().await
        };

        let mut state = self.state.write().await;
        match result {
            Ok((price, change_percent)) => {
                state.price = price;
                state.change_percent_24h = change_percent;
                state.change_24h = absolute_change(price, change_percent);
                state.last_updated = Some(Utc::now());
                state.error = None;
                tracing::debug!(price, change_percent, "ICP price refreshed");
            }
            Err(err) => {
                tracing::warn!(error = %err, last_price = state.price, "ICP price refresh failed");
                state.error = Some(err.to_string());
            }
        }
        drop(state);
        self.current().await
    }

    /// Refreshes only when the price is older than `max_age` (or missing).
    pub async fn ensure_fresh(&self, max_age: Duration) -> IcpPriceData {
        let stale = {
            let state = self.state.read().await;
            match state.last_updated {
                Some(at) => chrono::Duration::from_std(max_age)
                    .map(|age| Utc::now() - at > age)
                    .unwrap_or(true),
                None => true,
            }
        };
        if stale {
            self.refresh_price().await
        } else {
            self.current().await
        }
    }

    /// Keeps the price fresh in the background until `scope` shuts down.
    pub fn spawn_refresher(self: &Arc<Self>, scope: &TaskScope, every: Duration) {
        let service = Arc::clone(self);
        scope.spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                service.refresh_price().await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_parse_price_payload() {
        let payload = json!({ "internet-computer": { "usd": 8.5, "usd_24h_change": -2.5 } });
        assert_eq!(parse_price_payload(&payload), Ok((8.5, -2.5)));

        let payload = json!({ "internet-computer": { "usd": 8.5 } });
        assert_eq!(parse_price_payload(&payload), Ok((8.5, 0.0)));

        assert!(parse_price_payload(&json!({ "bitcoin": { "usd": 1.0 } })).is_err());
        assert!(parse_price_payload(&json!({ "internet-computer": {} })).is_err());
    }

    #[test]
    fn test_absolute_change() {
        assert!((absolute_change(11.0, 10.0) - 1.0).abs() < 1e-9);
        assert_eq!(absolute_change(5.0, 0.0), 0.0);
    }

    /// Price endpoint that can be switched into failure mode.
    async fn serve(fail: Arc<AtomicBool>) -> String {
        let app = Router::new()
            .route(
                "/price",
                get(|State(fail): State<Arc<AtomicBool>>| async move {
                    if fail.load(Ordering::SeqCst) {
                        Err(StatusCode::TOO_MANY_REQUESTS)
                    } else {
                        Ok(Json(json!({ "internet-computer": { "usd": 10.0, "usd_24h_change": 4.0 } })))
                    }
                }),
            )
            .with_state(fail);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/price")
    }

    /// Price endpoint that never answers in time.
    async fn serve_hanging() -> String {
        let app = Router::new().route(
            "/price",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Json(json!({ "internet-computer": { "usd": 1.0 } }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/price")
    }

    fn service(api_url: String) -> PriceService {
        PriceService::new(
            &PriceSettings {
                api_url,
                ..PriceSettings::default()
            },
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_last_price() {
        let fail = Arc::new(AtomicBool::new(false));
        let prices = service(serve(Arc::clone(&fail)).await);

        let data = prices.refresh_price().await;
        assert_eq!(data.price, 10.0);
        assert_eq!(data.change_percent_24h, 4.0);
        assert!(data.error.is_none());
        assert!(data.last_updated.is_some());
        assert_eq!(prices.format_usd(150.0).await, "1,500");

        fail.store(true, Ordering::SeqCst);
        let data = prices.refresh_price().await;
        assert_eq!(data.price, 10.0);
        assert!(data.error.is_some());
        assert!(!data.is_loading);
    }

    #[tokio::test]
    async fn test_ensure_fresh_skips_recent_price() {
        let fail = Arc::new(AtomicBool::new(false));
        let prices = service(serve(Arc::clone(&fail)).await);
        prices.refresh_price().await;

        fail.store(true, Ordering::SeqCst);
        let data = prices.ensure_fresh(Duration::from_secs(60)).await;
        assert!(data.error.is_none());

        let data = prices.ensure_fresh(Duration::ZERO).await;
        assert!(data.error.is_some());
    }

    #[tokio::test]
    async fn test_abandoned_refresh_clears_loading() {
        let prices = service(serve_hanging().await);

        let pending = tokio::time::timeout(Duration::from_millis(100), prices.refresh_price()).await;
        assert!(pending.is_err());

        let data = prices.current().await;
        assert!(!data.is_loading);
        assert_eq!(data.price, 0.0);
    }

    #[tokio::test]
    async fn test_unreachable_api_sets_error() {
        let prices = service("http://127.0.0.1:9/price".to_string());
        let data = prices.refresh_price().await;
        assert_eq!(data.price, 0.0);
        assert!(data.error.is_some());
    }
}
