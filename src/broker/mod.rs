//! Broker integration (OANDA v20 REST)
//!
//! Exposes the three collaborator seams the trading core depends on:
//! - `PositionStore`: net exposure reads plus open / close mutations
//! - `MarketData`: candle history for the signal provider
//! - `AccountHistory`: closed trades for performance stats
//!
//! `OandaClient` implements all three. `PaperPositionStore` wraps any store
//! for dry runs: reads pass through, mutations are only logged.

pub mod types;

pub use types::{ClosedTrade, OrderAck};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, RequestBuilder, Response, StatusCode,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{TradeError, TradeResult};
use crate::types::{Candle, Granularity, OpenPosition};
use types::{
    CandlesResponse, ClosePositionRequest, OrderRequest, OrderResponse, PositionResponse,
    TradesResponse,
};

/// Result of a close-all request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Position existed and the close was accepted
    Closed { long_units: i64, short_units: i64 },
    /// Already flat at the venue
    NothingToClose,
}

/// Position store: the only component allowed to mutate exposure
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// All open positions on the account
    async fn get_open_positions(&self) -> TradeResult<Vec<OpenPosition>>;

    /// Submit a market order for `signed_units` (positive buys, negative sells)
    async fn open(&self, instrument: &str, signed_units: i64) -> TradeResult<OrderAck>;

    /// Close every unit held on `instrument`
    async fn close_all(&self, instrument: &str) -> TradeResult<CloseOutcome>;
}

/// Candle history source
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn get_candles(
        &self,
        instrument: &str,
        granularity: Granularity,
        count: usize,
    ) -> TradeResult<Vec<Candle>>;
}

/// Closed trade history source
#[async_trait]
pub trait AccountHistory: Send + Sync {
    async fn get_closed_trades(&self) -> TradeResult<Vec<ClosedTrade>>;
}

/// REST client for the OANDA v20 API
pub struct OandaClient {
    client: Client,
    base_url: String,
    account_id: String,
}

impl OandaClient {
    /// Create a new REST client
    pub fn new(
        base_url: &str,
        account_id: &str,
        api_key: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .context("Invalid OANDA_API_KEY header value")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            account_id: account_id.to_string(),
        })
    }

    fn account_url(&self, path: &str) -> String {
        format!("{}/accounts/{}/{}", self.base_url, self.account_id, path)
    }

    /// Send and map non-success statuses to `TradeError::Transport`
    async fn send(&self, request: RequestBuilder, what: &str) -> TradeResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TradeError::transport(
            Some(status.as_u16()),
            format!("{} failed: {}", what, body),
        ))
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: Response, what: &str) -> TradeResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| TradeError::Data(format!("{} response malformed: {}", what, e)))
    }

    /// Current position for `instrument`, `None` on 404
    async fn get_position(&self, instrument: &str) -> TradeResult<Option<PositionResponse>> {
        let url = self.account_url(&format!("positions/{}", instrument));
        let response = self.client.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TradeError::transport(
                Some(status.as_u16()),
                format!("get position failed: {}", body),
            ));
        }
        Ok(Some(Self::parse(response, "position").await?))
    }
}

#[async_trait]
impl PositionStore for OandaClient {
    async fn get_open_positions(&self) -> TradeResult<Vec<OpenPosition>> {
        let url = self.account_url("openTrades");
        let response = self
            .send(self.client.get(&url), "get open trades")
            .await?;
        let trades: TradesResponse = Self::parse(response, "openTrades").await?;
        trades
            .trades
            .iter()
            .map(|t| t.to_open_position())
            .collect()
    }

    async fn open(&self, instrument: &str, signed_units: i64) -> TradeResult<OrderAck> {
        if signed_units == 0 {
            return Err(TradeError::Data("refusing to submit a zero-unit order".to_string()));
        }
        let url = self.account_url("orders");
        let body = OrderRequest::market(instrument, signed_units);
        info!(instrument = %instrument, units = signed_units, "Submitting market order");

        let response = self
            .send(self.client.post(&url).json(&body), "open trade")
            .await?;
        let order: OrderResponse = Self::parse(response, "order").await?;
        let ack = order.into_ack(signed_units)?;
        debug!(
            instrument = %instrument,
            transaction_id = ?ack.transaction_id,
            fill_price = ?ack.fill_price,
            "Order acknowledged"
        );
        Ok(ack)
    }

    async fn close_all(&self, instrument: &str) -> TradeResult<CloseOutcome> {
        let position = match self.get_position(instrument).await? {
            Some(p) => p.position,
            None => {
                info!(instrument = %instrument, "No open position to close");
                return Ok(CloseOutcome::NothingToClose);
            }
        };

        let (long_units, short_units) = position.side_units()?;
        let body = match ClosePositionRequest::close_all(long_units, short_units) {
            Some(body) => body,
            None => {
                info!(instrument = %instrument, "Nothing to close");
                return Ok(CloseOutcome::NothingToClose);
            }
        };

        let url = self.account_url(&format!("positions/{}/close", instrument));
        self.send(self.client.put(&url).json(&body), "close position")
            .await?;
        info!(
            instrument = %instrument,
            long_units,
            short_units,
            "Position closed"
        );
        Ok(CloseOutcome::Closed {
            long_units,
            short_units,
        })
    }
}

#[async_trait]
impl MarketData for OandaClient {
    async fn get_candles(
        &self,
        instrument: &str,
        granularity: Granularity,
        count: usize,
    ) -> TradeResult<Vec<Candle>> {
        let url = format!("{}/instruments/{}/candles", self.base_url, instrument);
        let params = [
            ("count", count.to_string()),
            ("granularity", granularity.as_str().to_string()),
            ("price", "M".to_string()),
        ];
        let response = self
            .send(self.client.get(&url).query(&params), "fetch candles")
            .await?;
        let candles: CandlesResponse = Self::parse(response, "candles").await?;
        let candles = candles.into_candles()?;
        debug!(
            instrument = %instrument,
            granularity = %granularity,
            count = candles.len(),
            "Fetched candles"
        );
        Ok(candles)
    }
}

#[async_trait]
impl AccountHistory for OandaClient {
    async fn get_closed_trades(&self) -> TradeResult<Vec<ClosedTrade>> {
        let url = self.account_url("trades");
        let response = self
            .send(
                self.client.get(&url).query(&[("state", "CLOSED")]),
                "fetch closed trades",
            )
            .await?;
        let trades: TradesResponse = Self::parse(response, "trades").await?;
        trades
            .trades
            .iter()
            .map(|t| t.to_closed_trade())
            .collect()
    }
}

/// Dry-run wrapper: reads hit the inner store, mutations are logged only
pub struct PaperPositionStore {
    inner: Arc<dyn PositionStore>,
}

impl PaperPositionStore {
    pub fn new(inner: Arc<dyn PositionStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl PositionStore for PaperPositionStore {
    async fn get_open_positions(&self) -> TradeResult<Vec<OpenPosition>> {
        self.inner.get_open_positions().await
    }

    async fn open(&self, instrument: &str, signed_units: i64) -> TradeResult<OrderAck> {
        warn!(instrument = %instrument, units = signed_units, "[DRY RUN] open skipped");
        Ok(OrderAck {
            transaction_id: None,
            fill_price: None,
            units: signed_units,
        })
    }

    async fn close_all(&self, instrument: &str) -> TradeResult<CloseOutcome> {
        warn!(instrument = %instrument, "[DRY RUN] close_all skipped");
        Ok(CloseOutcome::NothingToClose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_paper_store_never_mutates_inner() {
        let mut inner = MockPositionStore::new();
        inner.expect_open().times(0);
        inner.expect_close_all().times(0);
        inner.expect_get_open_positions().times(1).returning(|| {
            Ok(vec![OpenPosition {
                instrument: "GBP_USD".to_string(),
                signed_units: 1000,
            }])
        });

        let paper = PaperPositionStore::new(Arc::new(inner));
        let positions = paper.get_open_positions().await.unwrap();
        assert_eq!(positions.len(), 1);

        let ack = paper.open("GBP_USD", -1000).await.unwrap();
        assert_eq!(ack.units, -1000);
        assert_eq!(
            paper.close_all("GBP_USD").await.unwrap(),
            CloseOutcome::NothingToClose
        );
    }

    #[test]
    fn test_account_urls_are_rooted_at_account() {
        let client = OandaClient::new(
            "https://api-fxpractice.oanda.com/v3/",
            "101-004-1",
            "key",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.account_url("openTrades"),
            "https://api-fxpractice.oanda.com/v3/accounts/101-004-1/openTrades"
        );
    }
}
