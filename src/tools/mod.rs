//! LLM-callable tools
//!
//! Each tool is a single stateless HTTP lookup whose answer is a sentence the
//! assistant can speak. Failures never reach the model as errors: they are
//! logged and replaced with the tool's fallback sentence.

mod currency;
mod executor;
mod scores;
mod stock;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::Result;

pub use currency::{CurrencyTool, describe_conversion, format_amount};
pub use executor::ToolExecutor;
pub use scores::{LiveScoresTool, describe_matches};
pub use stock::{StockPriceTool, describe_quote};

/// Function declaration advertised to the model
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// A tool the model can call
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model calls the tool by
    fn name(&self) -> &'static str;

    /// Declaration sent with every model request
    fn declaration(&self) -> FunctionDeclaration;

    /// Sentence returned when the lookup fails
    fn fallback(&self) -> &'static str;

    /// Run the lookup
    ///
    /// # Errors
    ///
    /// Returns error on missing arguments, missing keys, or transport failure
    async fn call(&self, args: &Value) -> Result<String>;
}

/// Read a required string argument
pub(crate) fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| crate::Error::Tool(format!("missing argument: {key}")))
}
