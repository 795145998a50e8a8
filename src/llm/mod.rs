//! Gemini dialogue client
//!
//! One call to [`GeminiClient::reply`] is one user turn. The model may ask
//! for tool calls; those are run through the [`ToolExecutor`] and fed back
//! until it answers in text or the round limit is hit.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{Role, Turn};
use crate::tools::{FunctionDeclaration, ToolExecutor};
use crate::{Config, Error, Result};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini API client
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    persona: Option<String>,
    max_tool_rounds: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolBlock>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolBlock {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![Part::Text {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
    Other(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetails {
    #[serde(default)]
    code: u16,
    message: String,
}

/// Convert stored history into request contents
fn history_contents(history: &[Turn]) -> Vec<Content> {
    history
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            Content::text(role, &turn.content)
        })
        .collect()
}

/// Function calls requested in a model message
fn function_calls(content: &Content) -> Vec<FunctionCall> {
    content
        .parts
        .iter()
        .filter_map(|p| match p {
            Part::FunctionCall { function_call } => Some(function_call.clone()),
            _ => None,
        })
        .collect()
}

/// Concatenated text of a model message
fn text_of(content: &Content) -> String {
    content
        .parts
        .iter()
        .filter_map(|p| match p {
            Part::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

impl GeminiClient {
    /// Create a new Gemini client
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Gemini API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            persona: None,
            max_tool_rounds: 3,
        })
    }

    /// Client configured from the relay config with a per-connection key
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn from_config(config: &Config, api_key: String) -> Result<Self> {
        Ok(Self::new(api_key, config.llm.model.clone())?
            .with_base_url(config.endpoints.llm.clone())
            .with_persona(config.llm.persona.clone())
            .with_max_tool_rounds(config.llm.max_tool_rounds))
    }

    /// Override the API base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Set the system instruction
    #[must_use]
    pub fn with_persona(mut self, persona: String) -> Self {
        self.persona = Some(persona).filter(|p| !p.is_empty());
        self
    }

    /// Limit the number of tool-call rounds per turn
    #[must_use]
    pub const fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Produce the assistant reply to `user_text`
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or the model returns no text
    pub async fn reply(
        &self,
        history: &[Turn],
        user_text: &str,
        tools: &ToolExecutor,
    ) -> Result<String> {
        let mut contents = history_contents(history);
        contents.push(Content::text("user", user_text));

        let declarations = tools.declarations();
        let mut round = 0;

        loop {
            let content = self.generate(&contents, &declarations).await?;
            let calls = function_calls(&content);

            if calls.is_empty() || round >= self.max_tool_rounds {
                let text = text_of(&content);
                if text.is_empty() {
                    return Err(Error::Llm("model returned no text".to_string()));
                }
                tracing::debug!(rounds = round, chars = text.len(), "model replied");
                return Ok(text);
            }

            round += 1;
            tracing::info!(round, calls = calls.len(), "model requested tool calls");

            contents.push(Content {
                role: Some("model".to_string()),
                ..content
            });

            let mut parts = Vec::with_capacity(calls.len());
            for call in calls {
                let result = tools.execute(&call.name, &call.args).await;
                parts.push(Part::FunctionResponse {
                    function_response: FunctionResponse {
                        name: call.name,
                        response: serde_json::json!({ "result": result }),
                    },
                });
            }
            contents.push(Content {
                role: Some("user".to_string()),
                parts,
            });
        }
    }

    async fn generate(
        &self,
        contents: &[Content],
        declarations: &[FunctionDeclaration],
    ) -> Result<Content> {
        let request = GenerateRequest {
            contents,
            system_instruction: self.persona.as_ref().map(|p| Content {
                role: None,
                parts: vec![Part::Text { text: p.clone() }],
            }),
            tools: if declarations.is_empty() {
                Vec::new()
            } else {
                vec![ToolBlock {
                    function_declarations: declarations.to_vec(),
                }]
            },
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        tracing::debug!(model = %self.model, messages = contents.len(), "sending generateContent");

        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map_or(body, |e| format!("{} ({})", e.error.message, e.error.code));
            tracing::error!(status = %status, error = %message, "Gemini API error");
            return Err(Error::Llm(format!("Gemini API error {status}: {message}")));
        }

        let body: GenerateResponse = response.json().await?;
        let candidate = body
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| Error::Llm("no candidates returned".to_string()))?;

        candidate.content.ok_or_else(|| {
            Error::Llm(format!(
                "candidate has no content (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn turn(seq: i64, role: Role, content: &str) -> Turn {
        Turn {
            id: seq.to_string(),
            session_id: "s".to_string(),
            seq,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn history_maps_roles() {
        let contents = history_contents(&[
            turn(1, Role::User, "hi"),
            turn(2, Role::Assistant, "hello"),
        ]);
        assert_eq!(contents[0].role.as_deref(), Some("user"));
        assert_eq!(contents[1].role.as_deref(), Some("model"));
        assert_eq!(text_of(&contents[1]), "hello");
    }

    #[test]
    fn parses_function_call_parts() {
        let content: Content = serde_json::from_value(json!({
            "role": "model",
            "parts": [
                { "functionCall": { "name": "get_stock_price", "args": { "ticker": "GOOGL" } } }
            ]
        }))
        .unwrap();

        let calls = function_calls(&content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_stock_price");
        assert_eq!(calls[0].args["ticker"], "GOOGL");
        assert_eq!(text_of(&content), "");
    }

    #[test]
    fn unknown_parts_are_kept_opaque() {
        let content: Content = serde_json::from_value(json!({
            "role": "model",
            "parts": [
                { "text": "Hello " },
                { "executableCode": { "code": "1+1" } },
                { "text": "there" }
            ]
        }))
        .unwrap();
        assert!(matches!(content.parts[1], Part::Other(_)));
        assert_eq!(text_of(&content), "Hello there");
    }

    #[test]
    fn request_shape() {
        let contents = vec![Content::text("user", "price of google?")];
        let request = GenerateRequest {
            contents: &contents,
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part::Text {
                    text: "be nice".to_string(),
                }],
            }),
            tools: vec![ToolBlock {
                function_declarations: vec![FunctionDeclaration {
                    name: "get_live_scores".to_string(),
                    description: "scores".to_string(),
                    parameters: None,
                }],
            }],
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be nice");
        assert!(value["systemInstruction"].get("role").is_none());
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(
            value["tools"][0]["functionDeclarations"][0]["name"],
            "get_live_scores"
        );
        assert!(value["tools"][0]["functionDeclarations"][0].get("parameters").is_none());
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(GeminiClient::new(String::new(), "gemini-1.5-flash".to_string()).is_err());
    }
}
