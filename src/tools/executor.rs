//! Tool executor: dispatches model function calls to registered tools

use serde_json::Value;

use super::{CurrencyTool, FunctionDeclaration, LiveScoresTool, StockPriceTool, Tool};
use crate::Config;

/// Registry of callable tools
#[derive(Default)]
pub struct ToolExecutor {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolExecutor {
    /// Create an empty executor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor with the stock, currency and live-score tools wired to config
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with_tool(StockPriceTool::new(
                config.endpoints.stock.clone(),
                config.api_keys.alpha_vantage.clone(),
            ))
            .with_tool(LiveScoresTool::new(
                config.endpoints.scores.clone(),
                config.api_keys.rapidapi.clone(),
            ))
            .with_tool(CurrencyTool::new(
                config.endpoints.currency.clone(),
                config.api_keys.exchange_rate.clone(),
            ))
    }

    /// Register a tool
    #[must_use]
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Box::new(tool));
        self
    }

    /// Declarations for every registered tool
    #[must_use]
    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.tools.iter().map(|t| t.declaration()).collect()
    }

    /// Run a tool call and return the sentence handed back to the model
    pub async fn execute(&self, name: &str, args: &Value) -> String {
        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            tracing::warn!(tool = name, "model requested unknown tool");
            return format!("Error: there is no tool named {name}.");
        };

        tracing::info!(tool = name, "executing tool");
        match tool.call(args).await {
            Ok(sentence) => {
                tracing::debug!(tool = name, result = %sentence, "tool finished");
                sentence
            }
            Err(e) => {
                tracing::error!(tool = name, error = %e, "tool failed");
                tool.fallback().to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Result};
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn declaration(&self) -> FunctionDeclaration {
            FunctionDeclaration {
                name: "echo".to_string(),
                description: "Echo a word".to_string(),
                parameters: None,
            }
        }

        fn fallback(&self) -> &'static str {
            "Sorry, I couldn't echo right now."
        }

        async fn call(&self, args: &Value) -> Result<String> {
            args.get("word")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::Tool("no word".to_string()))
        }
    }

    #[tokio::test]
    async fn dispatches_by_name() {
        let executor = ToolExecutor::new().with_tool(Echo);
        assert_eq!(executor.execute("echo", &json!({ "word": "hi" })).await, "hi");
    }

    #[tokio::test]
    async fn failure_becomes_fallback_sentence() {
        let executor = ToolExecutor::new().with_tool(Echo);
        assert_eq!(
            executor.execute("echo", &json!({})).await,
            "Sorry, I couldn't echo right now."
        );
    }

    #[tokio::test]
    async fn unknown_tool_gets_error_sentence() {
        let executor = ToolExecutor::new();
        assert_eq!(
            executor.execute("launch_rocket", &json!({})).await,
            "Error: there is no tool named launch_rocket."
        );
    }

    #[test]
    fn config_executor_declares_three_tools() {
        let config = Config::from_sources(&crate::config::file::RelayConfigFile::default(), |_| None)
            .unwrap();
        let names: Vec<_> = ToolExecutor::from_config(&config)
            .declarations()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, ["get_stock_price", "get_live_scores", "convert_currency"]);
    }
}
