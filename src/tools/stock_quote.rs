//! Stock quote tool backed by the Stooq CSV quote endpoint

use super::{Tool, ToolOutput};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Stock quote tool
pub struct StockQuoteTool {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct StockQuoteInput {
    symbol: String,
}

/// A parsed quote row
#[derive(Debug, Clone, PartialEq)]
struct Quote {
    symbol: String,
    date: String,
    time: String,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

impl StockQuoteTool {
    pub fn new() -> Self {
        Self::with_base_url("https://stooq.com")
    }

    /// Point the tool at a different host (tests)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn quote(&self, symbol: &str) -> Result<String, String> {
        let response = self
            .client
            .get(format!("{}/q/l/", self.base_url))
            .query(&[("s", symbol), ("f", "sd2t2ohlcv"), ("h", ""), ("e", "csv")])
            .send()
            .await
            .map_err(|e| format!("Quote request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("Quote API returned HTTP {status}"));
        }

        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read quote response: {e}"))?;

        let quote = parse_quote_csv(&body)?;
        Ok(format_quote(&quote))
    }
}

impl Default for StockQuoteTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for StockQuoteTool {
    fn name(&self) -> &str {
        "stock_quote"
    }

    fn description(&self) -> String {
        "Look up a stock quote by ticker symbol (e.g. aapl.us, msft.us). Returns date, open/high/low/close and volume for the most recent session.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["symbol"],
            "properties": {
                "symbol": {
                    "type": "string",
                    "description": "Ticker symbol with market suffix, e.g. aapl.us"
                }
            }
        })
    }

    async fn run(&self, input: Value) -> ToolOutput {
        let input: StockQuoteInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolOutput::error(format!("Invalid input: {e}")),
        };

        let symbol = input.symbol.trim().to_lowercase();
        if symbol.is_empty() {
            return ToolOutput::error("Symbol must not be empty");
        }

        match self.quote(&symbol).await {
            Ok(quote) => ToolOutput::success(quote),
            Err(e) => ToolOutput::error(e),
        }
    }
}

/// Parse a Stooq `sd2t2ohlcv` CSV payload.
///
/// Expected shape:
/// ```text
/// Symbol,Date,Time,Open,High,Low,Close,Volume
/// AAPL.US,2026-08-05,22:00:07,201.2,204.1,200.5,203.35,41260400
/// ```
/// Unknown symbols come back with `N/D` fields.
fn parse_quote_csv(body: &str) -> Result<Quote, String> {
    let mut lines = body.lines().filter(|l| !l.trim().is_empty());

    let header = lines.next().ok_or("Empty quote response")?;
    if !header.to_lowercase().starts_with("symbol,") {
        return Err(format!("Unexpected quote response: {header}"));
    }

    let row = lines.next().ok_or("Quote response has no data row")?;
    let fields: Vec<&str> = row.split(',').map(str::trim).collect();
    if fields.len() != 8 {
        return Err(format!("Unexpected quote row: {row}"));
    }

    let quote = Quote {
        symbol: fields[0].to_string(),
        date: fields[1].to_string(),
        time: fields[2].to_string(),
        open: fields[3].to_string(),
        high: fields[4].to_string(),
        low: fields[5].to_string(),
        close: fields[6].to_string(),
        volume: fields[7].to_string(),
    };

    if quote.close == "N/D" {
        return Err(format!("No quote data for symbol {}", quote.symbol));
    }

    Ok(quote)
}

fn format_quote(quote: &Quote) -> String {
    format!(
        "{} on {} {}: open {}, high {}, low {}, close {}, volume {}",
        quote.symbol,
        quote.date,
        quote.time,
        quote.open,
        quote.high,
        quote.low,
        quote.close,
        quote.volume
    )
}
