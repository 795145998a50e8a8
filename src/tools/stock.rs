//! Stock price lookup (Alpha Vantage `GLOBAL_QUOTE`)

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{FunctionDeclaration, Tool, str_arg};
use crate::{Error, Result};

/// Latest price for a ticker symbol
pub struct StockPriceTool {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl StockPriceTool {
    #[must_use]
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

/// Turn a `GLOBAL_QUOTE` response into a spoken sentence
#[must_use]
pub fn describe_quote(ticker: &str, body: &Value) -> String {
    let price = body
        .get("Global Quote")
        .and_then(|q| q.get("05. price"))
        .and_then(Value::as_str)
        .and_then(|p| p.trim().parse::<f64>().ok());

    match price {
        Some(price) => format!("The current price of {ticker} is ${price:.2}."),
        None => format!("I couldn't retrieve the price for {ticker}. Is that a valid stock symbol?"),
    }
}

#[async_trait]
impl Tool for StockPriceTool {
    fn name(&self) -> &'static str {
        "get_stock_price"
    }

    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: self.name().to_string(),
            description: "Get the latest price for a stock using its ticker symbol.".to_string(),
            parameters: Some(json!({
                "type": "OBJECT",
                "properties": {
                    "ticker": {
                        "type": "STRING",
                        "description": "The stock ticker symbol, e.g., GOOGL for Google."
                    }
                },
                "required": ["ticker"]
            })),
        }
    }

    fn fallback(&self) -> &'static str {
        "Sorry, I couldn't fetch the stock price right now."
    }

    async fn call(&self, args: &Value) -> Result<String> {
        let ticker = str_arg(args, "ticker")?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("Alpha Vantage API key not configured".to_string()))?;

        tracing::debug!(ticker, "fetching stock quote");

        let body: Value = self
            .client
            .get(format!("{}/query", self.base_url))
            .query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", ticker),
                ("apikey", api_key),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(describe_quote(ticker, &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_price_to_cents() {
        let body = json!({
            "Global Quote": {
                "01. symbol": "GOOGL",
                "05. price": "171.2350",
                "07. latest trading day": "2024-08-16"
            }
        });
        assert_eq!(
            describe_quote("GOOGL", &body),
            "The current price of GOOGL is $171.24."
        );
    }

    #[test]
    fn empty_quote_is_invalid_symbol() {
        let body = json!({ "Global Quote": {} });
        assert_eq!(
            describe_quote("NOPE", &body),
            "I couldn't retrieve the price for NOPE. Is that a valid stock symbol?"
        );
    }

    #[test]
    fn rate_limit_note_is_invalid_symbol() {
        let body = json!({ "Note": "Thank you for using Alpha Vantage!" });
        assert!(describe_quote("IBM", &body).starts_with("I couldn't retrieve"));
    }

    #[tokio::test]
    async fn missing_key_is_an_error() {
        let tool = StockPriceTool::new("http://127.0.0.1:9".to_string(), None);
        let err = tool.call(&json!({ "ticker": "IBM" })).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn missing_ticker_is_an_error() {
        let tool = StockPriceTool::new("http://127.0.0.1:9".to_string(), Some("k".to_string()));
        assert!(matches!(tool.call(&json!({})).await, Err(Error::Tool(_))));
    }
}
