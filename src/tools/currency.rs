//! Currency conversion (ExchangeRate-API pair endpoint)

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{FunctionDeclaration, Tool, str_arg};
use crate::{Error, Result};

/// Converts an amount between two currencies
pub struct CurrencyTool {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CurrencyTool {
    #[must_use]
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

/// Render an amount the way it was asked for: whole numbers keep one decimal
#[must_use]
pub fn format_amount(amount: f64) -> String {
    if amount.fract().abs() < f64::EPSILON && amount.abs() < 1e15 {
        format!("{amount:.1}")
    } else {
        amount.to_string()
    }
}

/// Turn a pair-conversion response into a spoken sentence
///
/// Returns `None` if the body holds neither a result nor an API error.
#[must_use]
pub fn describe_conversion(amount: f64, source: &str, target: &str, body: &Value) -> Option<String> {
    if body.get("result").and_then(Value::as_str) == Some("error") {
        let error_type = body
            .get("error-type")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error");
        return Some(format!(
            "I couldn't convert the currency. The API returned an error: {error_type}"
        ));
    }

    let converted = body.get("conversion_result").and_then(Value::as_f64)?;
    Some(format!(
        "{} {source} is currently equal to {converted:.2} {target}.",
        format_amount(amount)
    ))
}

#[async_trait]
impl Tool for CurrencyTool {
    fn name(&self) -> &'static str {
        "convert_currency"
    }

    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: self.name().to_string(),
            description:
                "Converts a specific amount from a source currency to a target currency."
                    .to_string(),
            parameters: Some(json!({
                "type": "OBJECT",
                "properties": {
                    "amount": { "type": "NUMBER" },
                    "source_currency": {
                        "type": "STRING",
                        "description": "The 3-letter currency code to convert from, e.g., 'USD'."
                    },
                    "target_currency": {
                        "type": "STRING",
                        "description": "The 3-letter currency code to convert to, e.g., 'INR'."
                    }
                },
                "required": ["amount", "source_currency", "target_currency"]
            })),
        }
    }

    fn fallback(&self) -> &'static str {
        "Sorry, I couldn't convert the currency right now."
    }

    async fn call(&self, args: &Value) -> Result<String> {
        let amount = args
            .get("amount")
            .and_then(|a| a.as_f64().or_else(|| a.as_str().and_then(|s| s.parse().ok())))
            .ok_or_else(|| Error::Tool("missing argument: amount".to_string()))?;
        let source = str_arg(args, "source_currency")?.to_uppercase();
        let target = str_arg(args, "target_currency")?.to_uppercase();
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("ExchangeRate API key not configured".to_string()))?;

        tracing::debug!(amount, source = %source, target = %target, "converting currency");

        let url = format!(
            "{}/v6/{}/pair/{}/{}/{}",
            self.base_url,
            urlencoding::encode(api_key),
            urlencoding::encode(&source),
            urlencoding::encode(&target),
            amount
        );
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body: Value = response.json().await?;

        // Error bodies come back with 4xx statuses and are still worth speaking
        if let Some(sentence) = describe_conversion(amount, &source, &target, &body) {
            return Ok(sentence);
        }
        if !status.is_success() {
            return Err(Error::Tool(format!("ExchangeRate API error {status}")));
        }
        Err(Error::Tool("conversion_result missing".to_string()))
    }
}
