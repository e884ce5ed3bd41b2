// src/ingest/market.rs
//! Finnhub quote fetcher and the markdown table the prompt embeds.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinSet;

pub const DEFAULT_FINNHUB_URL: &str = "https://finnhub.io/api/v1";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub current: f64,
    pub change: f64,
    pub change_percent: f64,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn failed(symbol: &str, error: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_ascii_uppercase(),
            current: 0.0,
            change: 0.0,
            change_percent: 0.0,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Anything that can produce quotes for a watchlist.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quotes(&self, symbols: &[String]) -> Vec<Quote>;
}

#[derive(Clone)]
pub struct MarketDataClient {
    api_key: Option<String>,
    base_url: String,
    http: reqwest::Client,
}

impl MarketDataClient {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("market-digest/0.1")
            .timeout(Duration::from_secs(10))
            .build()
            .context("building finnhub http client")?;
        Ok(Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: DEFAULT_FINNHUB_URL.to_string(),
            http,
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    async fn fetch_one(&self, symbol: String, token: String) -> Quote {
        let url = format!("{}/quote", self.base_url);
        let resp = match self
            .http
            .get(&url)
            .query(&[("symbol", symbol.as_str()), ("token", token.as_str())])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, %symbol, "finnhub request failed");
                return Quote::failed(&symbol, e.to_string());
            }
        };
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(%symbol, status = status.as_u16(), "finnhub returned error status");
            return Quote::failed(&symbol, format!("HTTP {}", status.as_u16()));
        }
        match resp.json::<serde_json::Value>().await {
            Ok(payload) => quote_from_payload(&symbol, &payload),
            Err(e) => Quote::failed(&symbol, e.to_string()),
        }
    }
}

#[async_trait]
impl QuoteSource for MarketDataClient {
    async fn fetch_quotes(&self, symbols: &[String]) -> Vec<Quote> {
        let Some(token) = self.api_key.clone() else {
            tracing::warn!("FINNHUB_API_KEY not configured; market data disabled");
            return Vec::new();
        };

        let mut set = JoinSet::new();
        for (idx, symbol) in symbols.iter().enumerate() {
            let client = self.clone();
            let symbol = symbol.clone();
            let token = token.clone();
            set.spawn(async move { (idx, client.fetch_one(symbol, token).await) });
        }

        let mut out: Vec<(usize, Quote)> = Vec::with_capacity(symbols.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(pair) => out.push(pair),
                Err(e) => tracing::error!(error = %e, "quote task panicked"),
            }
        }
        out.sort_by_key(|(idx, _)| *idx);
        out.into_iter().map(|(_, q)| q).collect()
    }
}

/// Map a Finnhub `/quote` payload (`c`, `d`, `dp`) to a [`Quote`].
pub fn quote_from_payload(symbol: &str, payload: &serde_json::Value) -> Quote {
    let Some(current) = payload.get("c").and_then(|v| v.as_f64()) else {
        return Quote::failed(symbol, "No data");
    };
    let num = |key: &str| payload.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0);
    Quote {
        symbol: symbol.to_ascii_uppercase(),
        current,
        change: num("d"),
        change_percent: num("dp"),
        error: None,
        timestamp: Utc::now(),
    }
}

/// Render quotes as the markdown table embedded in the prompt.
pub fn format_market_data(quotes: &[Quote]) -> String {
    if quotes.is_empty() {
        return String::new();
    }
    let mut lines = vec![
        "| Symbol | Price | Change | % |".to_string(),
        "| --- | ---: | ---: | ---: |".to_string(),
    ];
    for q in quotes {
        if let Some(err) = &q.error {
            lines.push(format!("| {} | N/A | {} | |", q.symbol, err));
            continue;
        }
        let sign = if q.change >= 0.0 { "+" } else { "-" };
        lines.push(format!(
            "| {} | ${:.2} | {}{:.2} | {}{:.2}% |",
            q.symbol,
            q.current,
            sign,
            q.change.abs(),
            sign,
            q.change_percent.abs()
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_without_price_is_no_data() {
        let q = quote_from_payload("aapl", &json!({ "d": 1.0 }));
        assert_eq!(q.symbol, "AAPL");
        assert_eq!(q.error.as_deref(), Some("No data"));
    }

    #[test]
    fn table_renders_signs_and_errors() {
        let up = quote_from_payload("SPY", &json!({ "c": 512.3, "d": 1.2, "dp": 0.98 }));
        let down = quote_from_payload("QQQ", &json!({ "c": 430.0, "d": -2.5, "dp": -0.58 }));
        let bad = Quote::failed("xyz", "HTTP 429");
        let table = format_market_data(&[up, down, bad]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "| Symbol | Price | Change | % |");
        assert_eq!(lines[2], "| SPY | $512.30 | +1.20 | +0.98% |");
        assert_eq!(lines[3], "| QQQ | $430.00 | -2.50 | -0.58% |");
        assert_eq!(lines[4], "| XYZ | N/A | HTTP 429 | |");
    }

    #[test]
    fn empty_quotes_render_empty() {
        assert_eq!(format_market_data(&[]), "");
    }

    #[tokio::test]
    async fn missing_key_disables_fetch() {
        let client = MarketDataClient::new(None).unwrap();
        assert!(client.fetch_quotes(&["SPY".to_string()]).await.is_empty());
    }
}
