use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Settings;

/// Client for the brapi-style quote API.
#[derive(Clone)]
pub struct MarketDataClient {
    http: Client,
    base_url: String,
    token: String,
}

impl MarketDataClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: Client::new(),
            base_url: settings.market_data_api_url.trim_end_matches('/').to_string(),
            token: settings.market_data_token.clone(),
        }
    }

    fn has_key(&self) -> bool {
        !self.token.trim().is_empty()
    }

    pub async fn quotes(&self, tickers: &[String]) -> Result<Vec<Quote>, String> {
        if !self.has_key() {
            return Err("MARKET_DATA_TOKEN is missing in .env".to_string());
        }
        if tickers.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/quote/{}", self.base_url, tickers.join(","));
        let res = self
            .http
            .get(&url)
            .query(&[("token", self.token.as_str())])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("quote request failed: {status} {body}"));
        }

        let body = res.json::<QuoteResponse>().await.map_err(|e| e.to_string())?;
        Ok(body.results)
    }

    pub async fn quote(&self, ticker: &str) -> Result<Option<Quote>, String> {
        let sym = ticker.to_uppercase();
        let quotes = self.quotes(std::slice::from_ref(&sym)).await?;
        Ok(quotes.into_iter().find(|q| q.symbol.eq_ignore_ascii_case(&sym)))
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct QuoteResponse {
    #[serde(default)]
    pub results: Vec<Quote>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,

    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub long_name: Option<String>,

    #[serde(default)]
    pub regular_market_price: Option<f64>,
    // percent, e.g. -1.37
    #[serde(default)]
    pub regular_market_change_percent: Option<f64>,
    #[serde(default)]
    pub regular_market_time: Option<String>,
}

impl Quote {
    pub fn display_name(&self) -> String {
        self.long_name
            .as_deref()
            .or(self.short_name.as_deref())
            .unwrap_or(&self.symbol)
            .trim()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quote_payload() {
        let raw = r#"{
            "results": [{
                "symbol": "HGLG11",
                "shortName": "FII CSHG LOG",
                "longName": "CSHG Logística FII",
                "regularMarketPrice": 158.9,
                "regularMarketChangePercent": -1.37,
                "regularMarketTime": "2026-10-15T20:07:00.000Z"
            }],
            "requestedAt": "2026-10-15T20:10:00.000Z"
        }"#;

        let parsed: QuoteResponse = serde_json::from_str(raw).unwrap();
        let q = &parsed.results[0];
        assert_eq!(q.symbol, "HGLG11");
        assert_eq!(q.regular_market_change_percent, Some(-1.37));
        assert_eq!(q.display_name(), "CSHG Logística FII");
    }

    #[test]
    fn display_name_falls_back_to_symbol() {
        let q: Quote = serde_json::from_str(r#"{ "symbol": "XPML11" }"#).unwrap();
        assert_eq!(q.display_name(), "XPML11");
        assert!(q.regular_market_price.is_none());
    }
}
