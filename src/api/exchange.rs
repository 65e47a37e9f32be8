use crate::models::{Candle, OrderSide, Position, Side};
use crate::Result;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use thiserror::Error;

use super::{MarketInfo, OrderAck, TradeExecution};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("exchange API error: {0}")]
    Api(String),
    #[error("exchange returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("unsupported timeframe: {0}")]
    Timeframe(String),
    #[error("no {0} balance entry in wallet response")]
    MissingBalance(String),
}

/// REST client for an FTX-style futures exchange
///
/// Every response is an envelope `{ success, result }`; raw wire structs are
/// deserialized here and converted into the crate's model types.
#[derive(Clone)]
pub struct ExchangeClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    subaccount: Option<String>,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    result: T,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandleRaw {
    /// Epoch milliseconds of the bar's open
    time: f64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRaw {
    future: String,
    net_size: f64,
    #[serde(default)]
    entry_price: Option<f64>,
    #[serde(default)]
    recent_average_open_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketRaw {
    name: String,
    price_increment: f64,
    size_increment: f64,
    last: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceRaw {
    coin: String,
    available_without_borrow: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderRaw {
    id: u64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FillRaw {
    market: String,
    side: OrderSide,
    price: f64,
    size: f64,
    time: DateTime<Utc>,
}

// ============== Conversions ==============

impl From<CandleRaw> for Candle {
    fn from(raw: CandleRaw) -> Self {
        Candle {
            timestamp: DateTime::from_timestamp_millis(raw.time as i64).unwrap_or_default(),
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
        }
    }
}

impl From<FillRaw> for TradeExecution {
    fn from(raw: FillRaw) -> Self {
        TradeExecution {
            symbol: raw.market,
            timestamp: raw.time,
            side: raw.side,
            price: raw.price,
            size: raw.size,
        }
    }
}

impl PositionRaw {
    /// Net size sign decides the side: positive long, negative short,
    /// zero flat
    fn into_position(self) -> Option<Position> {
        if self.net_size == 0.0 {
            return None;
        }
        let side = if self.net_size > 0.0 {
            Side::Long
        } else {
            Side::Short
        };
        let avg_open = self.recent_average_open_price.unwrap_or_default();
        Some(Position {
            symbol: self.future,
            side,
            size: self.net_size.abs(),
            entry_price: self.entry_price.unwrap_or(avg_open),
            recent_avg_open_price: avg_open,
        })
    }
}

/// Map the configured timeframe onto the exchange's resolution parameter,
/// which is also the bar length in seconds
pub fn resolution_secs(timeframe: &str) -> Result<u64> {
    match timeframe {
        "1m" => Ok(60),
        "3m" => Ok(180),
        "5m" => Ok(300),
        "15m" => Ok(900),
        "1h" => Ok(3600),
        other => Err(ExchangeError::Timeframe(other.to_string()).into()),
    }
}

// ============== Implementation ==============

impl ExchangeClient {
    pub fn new(
        base_url: &str,
        api_key: String,
        api_secret: String,
        subaccount: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
            subaccount,
        }
    }

    /// HMAC-SHA256 over `{ts}{method}{path}{body}`, hex-encoded. `path`
    /// includes the query string.
    fn sign(&self, method: &str, path: &str, body: &str) -> Result<(i64, String)> {
        let ts = Utc::now().timestamp_millis();
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())?;
        mac.update(format!("{}{}{}{}", ts, method, path, body).as_bytes());
        Ok((ts, hex::encode(mac.finalize().into_bytes())))
    }

    fn auth_headers(
        &self,
        mut req: reqwest::RequestBuilder,
        ts: i64,
        signature: String,
    ) -> reqwest::RequestBuilder {
        req = req
            .header("FTX-KEY", &self.api_key)
            .header("FTX-TS", ts.to_string())
            .header("FTX-SIGN", signature);
        if let Some(sub) = &self.subaccount {
            req = req.header("FTX-SUBACCOUNT", sub);
        }
        req
    }

    fn get(&self, path: &str) -> Result<reqwest::RequestBuilder> {
        let (ts, signature) = self.sign("GET", path, "")?;
        let req = self.client.get(format!("{}{}", self.base_url, path));
        Ok(self.auth_headers(req, ts, signature))
    }

    /// The signed payload covers the exact body bytes, so the body is
    /// serialized once and sent verbatim
    fn post(&self, path: &str, body: &serde_json::Value) -> Result<reqwest::RequestBuilder> {
        let body_str = body.to_string();
        let (ts, signature) = self.sign("POST", path, &body_str)?;
        let req = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body_str);
        Ok(self.auth_headers(req, ts, signature))
    }

    async fn unwrap_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            return Err(ExchangeError::Status(response.status()).into());
        }
        let envelope: Envelope<T> = response.json().await?;
        if !envelope.success {
            return Err(ExchangeError::Api(
                envelope.error.unwrap_or_else(|| "success=false".to_string()),
            )
            .into());
        }
        Ok(envelope.result)
    }

    async fn fetch_candles_impl(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let resolution = resolution_secs(timeframe)?;
        let path = format!(
            "/api/markets/{}/candles?resolution={}&limit={}",
            symbol, resolution, limit
        );
        let raw: Vec<CandleRaw> = Self::unwrap_envelope(self.get(&path)?.send().await?).await?;
        Ok(raw.into_iter().map(Candle::from).collect())
    }

    async fn fetch_position_impl(&self, symbol: &str) -> Result<Option<Position>> {
        let raw: Vec<PositionRaw> =
            Self::unwrap_envelope(self.get("/api/positions")?.send().await?).await?;
        Ok(raw
            .into_iter()
            .find(|p| p.future == symbol)
            .and_then(PositionRaw::into_position))
    }

    async fn fetch_market_impl(&self, symbol: &str) -> Result<MarketInfo> {
        let path = format!("/api/markets/{}", symbol);
        let raw: MarketRaw = Self::unwrap_envelope(self.get(&path)?.send().await?).await?;
        Ok(MarketInfo {
            symbol: raw.name,
            price_increment: raw.price_increment,
            size_increment: raw.size_increment,
            last_price: raw.last,
        })
    }

    async fn fetch_balance_impl(&self) -> Result<f64> {
        let raw: Vec<BalanceRaw> =
            Self::unwrap_envelope(self.get("/api/wallet/balances")?.send().await?).await?;
        raw.into_iter()
            .find(|b| b.coin == "USD")
            .map(|b| b.available_without_borrow)
            .ok_or_else(|| ExchangeError::MissingBalance("USD".to_string()).into())
    }

    async fn submit_market_order_impl(
        &self,
        symbol: &str,
        side: OrderSide,
        size: f64,
    ) -> Result<OrderAck> {
        let body = json!({
            "market": symbol,
            "side": match side {
                OrderSide::Buy => "buy",
                OrderSide::Sell => "sell",
            },
            "type": "market",
            "size": size,
            "price": null,
        });
        let raw: OrderRaw =
            Self::unwrap_envelope(self.post("/api/orders", &body)?.send().await?).await?;
        Ok(OrderAck {
            id: raw.id.to_string(),
            created_at: raw.created_at,
        })
    }

    async fn fetch_trades_since_impl(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<TradeExecution>> {
        let path = format!(
            "/api/fills?market={}&start_time={}",
            symbol,
            since.timestamp()
        );
        let raw: Vec<FillRaw> = Self::unwrap_envelope(self.get(&path)?.send().await?).await?;
        Ok(raw
            .into_iter()
            .filter(|f| f.market == symbol && f.time >= since)
            .map(TradeExecution::from)
            .collect())
    }

    async fn set_leverage_impl(&self, leverage: u32) -> Result<()> {
        let body = json!({ "leverage": leverage });
        let _: serde_json::Value = Self::unwrap_envelope(
            self.post("/api/account/leverage", &body)?
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl super::Exchange for ExchangeClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        self.fetch_candles_impl(symbol, timeframe, limit).await
    }

    async fn fetch_position(&self, symbol: &str) -> Result<Option<Position>> {
        self.fetch_position_impl(symbol).await
    }

    async fn fetch_market(&self, symbol: &str) -> Result<MarketInfo> {
        self.fetch_market_impl(symbol).await
    }

    async fn fetch_balance(&self) -> Result<f64> {
        self.fetch_balance_impl().await
    }

    async fn submit_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        size: f64,
    ) -> Result<OrderAck> {
        self.submit_market_order_impl(symbol, side, size).await
    }

    async fn fetch_trades_since(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<TradeExecution>> {
        self.fetch_trades_since_impl(symbol, since).await
    }

    async fn set_leverage(&self, leverage: u32) -> Result<()> {
        self.set_leverage_impl(leverage).await
    }
}
