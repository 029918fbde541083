// ===============================
// src/gateway_binance.rs
// ===============================
use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::binance::{
    encode_query, kline_open, next_trade_id, sign_query, timestamp_ms, trade_page_params, AccountInfo,
    MyTrade, RawOpenOrder, RawTransfer, TickerPrice, MY_TRADES_PAGE_LIMIT,
};
use crate::config::{Args, Credentials};
use crate::domain::{Balance, Fill, OpenOrder, Transfer};
use crate::gateway::{ExchangeGateway, GatewayError};

const HOUR_MS: i64 = 3_600_000;

/// Binance Spot gateway (REST, read-only).
/// Public endpoints are plain GETs; account endpoints are HMAC-signed.
pub struct BinanceGateway {
    http: reqwest::Client,
    rest_base: String,
    credentials: Option<Credentials>,
    recv_window: u64,
}

impl BinanceGateway {
    pub fn new(args: &Args) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder().timeout(args.http_timeout).build()?;
        Ok(Self {
            http,
            rest_base: args.binance_rest_url.trim_end_matches('/').to_string(),
            credentials: args.credentials.clone(),
            recv_window: args.recv_window,
        })
    }

    async fn read<T: DeserializeOwned>(&self, rsp: reqwest::Response, path: &str) -> Result<T, GatewayError> {
        let status = rsp.status();
        if !status.is_success() {
            let body = rsp.text().await.unwrap_or_default();
            tracing::warn!(%path, code = %status, %body, "binance request failed");
            return Err(GatewayError::Api { status: status.as_u16(), body });
        }
        let body = rsp.text().await?;
        serde_json::from_str(&body).map_err(|e| GatewayError::Decode(format!("{path}: {e}")))
    }

    async fn public_get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T, GatewayError> {
        let url = format!("{}{}?{}", self.rest_base, path, encode_query(params));
        let rsp = self.http.get(url).send().await?;
        self.read(rsp, path).await
    }

    async fn signed_get<T: DeserializeOwned>(&self, path: &str, params: Vec<(&str, String)>) -> Result<T, GatewayError> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or(GatewayError::MissingCredentials("BINANCE_API_KEY / BINANCE_API_SECRET"))?;

        let mut params = params;
        params.push(("recvWindow", self.recv_window.to_string()));
        params.push(("timestamp", timestamp_ms().to_string()));
        let query = encode_query(&params);
        let sig = sign_query(&creds.api_secret, &query);
        let url = format!("{}{}?{}&signature={}", self.rest_base, path, query, sig);

        let rsp = self.http.get(url).header("X-MBX-APIKEY", &creds.api_key).send().await?;
        self.read(rsp, path).await
    }

    async fn transfers(&self, path: &str, asset: &str, start_ms: i64, end_ms: i64) -> Result<Vec<Transfer>, GatewayError> {
        let raw: Vec<RawTransfer> = self
            .signed_get(
                path,
                vec![
                    ("coin", asset.to_string()),
                    ("startTime", start_ms.to_string()),
                    ("endTime", end_ms.to_string()),
                ],
            )
            .await?;
        raw.into_iter().map(RawTransfer::into_transfer).collect()
    }
}

#[async_trait]
impl ExchangeGateway for BinanceGateway {
    /// Full trade history for `symbol`, oldest first, paged by trade id.
    async fn fills(&self, symbol: &str) -> Result<Vec<Fill>, GatewayError> {
        let mut fills = Vec::new();
        let mut from_id = 0;
        loop {
            let page: Vec<MyTrade> = self
                .signed_get("/api/v3/myTrades", trade_page_params(symbol, from_id, MY_TRADES_PAGE_LIMIT))
                .await?;
            let next = next_trade_id(&page, MY_TRADES_PAGE_LIMIT);
            for t in page {
                fills.push(t.into_fill()?);
            }
            match next {
                Some(id) => from_id = id,
                None => break,
            }
        }
        tracing::debug!(%symbol, fills = fills.len(), "trade history loaded");
        Ok(fills)
    }

    async fn ticker_price(&self, symbol: &str) -> Result<f64, GatewayError> {
        let t: TickerPrice = self
            .public_get("/api/v3/ticker/price", &[("symbol", symbol.to_ascii_uppercase())])
            .await?;
        t.value()
    }

    async fn balance(&self, asset: &str) -> Result<Balance, GatewayError> {
        let acct: AccountInfo = self.signed_get("/api/v3/account", vec![]).await?;
        match acct.balances.iter().find(|b| b.asset.eq_ignore_ascii_case(asset)) {
            Some(b) => {
                let (free, locked) = b.amounts()?;
                Ok(Balance { free, locked })
            }
            // Binance omits zero balances on some accounts
            None => Ok(Balance::default()),
        }
    }

    async fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<OpenOrder>, GatewayError> {
        let params = match symbol {
            Some(s) => vec![("symbol", s.to_ascii_uppercase())],
            None => vec![],
        };
        let raw: Vec<RawOpenOrder> = self.signed_get("/api/v3/openOrders", params).await?;
        raw.into_iter().map(RawOpenOrder::into_order).collect()
    }

    async fn deposit_history(&self, asset: &str, start_ms: i64, end_ms: i64) -> Result<Vec<Transfer>, GatewayError> {
        self.transfers("/sapi/v1/capital/deposit/hisrec", asset, start_ms, end_ms).await
    }

    async fn withdrawal_history(&self, asset: &str, start_ms: i64, end_ms: i64) -> Result<Vec<Transfer>, GatewayError> {
        self.transfers("/sapi/v1/capital/withdraw/history", asset, start_ms, end_ms).await
    }

    async fn hourly_open_price(&self, symbol: &str, day_start_ms: i64) -> Result<Option<f64>, GatewayError> {
        let rows: Vec<Vec<serde_json::Value>> = self
            .public_get(
                "/api/v3/klines",
                &[
                    ("symbol", symbol.to_ascii_uppercase()),
                    ("interval", "1h".to_string()),
                    ("startTime", day_start_ms.to_string()),
                    ("endTime", (day_start_ms + HOUR_MS).to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        kline_open(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Cli, MarketMode};

    fn args_without_credentials() -> Args {
        let mut args = crate::config::load(&Cli::default());
        args.venue_mode = MarketMode::BinanceSandbox;
        args.credentials = None;
        args
    }

    #[tokio::test]
    async fn signed_calls_require_credentials() {
        let gw = BinanceGateway::new(&args_without_credentials()).unwrap();
        let err = gw.fills("XRPUSDT").await.unwrap_err();
        assert!(matches!(err, GatewayError::MissingCredentials(_)));
    }
}
