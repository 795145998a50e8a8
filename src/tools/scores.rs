//! Live cricket scores (Cricbuzz via `RapidAPI`)

use async_trait::async_trait;
use serde_json::Value;

use super::{FunctionDeclaration, Tool};
use crate::{Error, Result};

/// Matches mentioned in one reply
const MAX_MATCHES: usize = 3;

/// Scores of current live matches
pub struct LiveScoresTool {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl LiveScoresTool {
    #[must_use]
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    fn host(&self) -> Result<String> {
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("invalid scores endpoint: {e}")))?;
        url.host_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Config("scores endpoint has no host".to_string()))
    }
}

/// Turn a live-matches response into a spoken summary
#[must_use]
pub fn describe_matches(body: &Value) -> String {
    let matches = body
        .get("matches")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    if matches.is_empty() {
        return "There are no live cricket matches at the moment.".to_string();
    }

    let team = |m: &Value, key: &str| {
        m.get(key)
            .and_then(|t| t.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("N/A")
            .to_string()
    };

    let mut summary = String::from("Here are the current live scores: ");
    for m in matches.iter().take(MAX_MATCHES) {
        let status = m.get("status").and_then(Value::as_str).unwrap_or_default();
        summary.push_str(&format!(
            "{} versus {}, the status is: {status}. ",
            team(m, "team1"),
            team(m, "team2")
        ));
    }
    summary
}

#[async_trait]
impl Tool for LiveScoresTool {
    fn name(&self) -> &'static str {
        "get_live_scores"
    }

    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: self.name().to_string(),
            description: "Get the scores of current live cricket matches.".to_string(),
            parameters: None,
        }
    }

    fn fallback(&self) -> &'static str {
        "Sorry, I couldn't fetch the live cricket scores right now."
    }

    async fn call(&self, _args: &Value) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("RapidAPI key not configured".to_string()))?;
        let host = self.host()?;

        tracing::debug!(host = %host, "fetching live scores");

        let body: Value = self
            .client
            .get(format!(
                "{}/cricbuzz-android-widget/live-matches",
                self.base_url
            ))
            .header("X-RapidAPI-Key", api_key)
            .header("X-RapidAPI-Host", host)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(describe_matches(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_matches() {
        assert_eq!(
            describe_matches(&json!({ "matches": [] })),
            "There are no live cricket matches at the moment."
        );
        assert_eq!(
            describe_matches(&json!({})),
            "There are no live cricket matches at the moment."
        );
    }

    #[test]
    fn summarizes_first_three_matches() {
        let body = json!({
            "matches": [
                { "status": "India need 20 runs", "team1": { "name": "India" }, "team2": { "name": "Australia" } },
                { "status": "Stumps", "team1": { "name": "England" }, "team2": { "name": "Pakistan" } },
                { "status": "Innings break", "team1": { "name": "Kerala" } },
                { "status": "Rain", "team1": { "name": "A" }, "team2": { "name": "B" } }
            ]
        });

        assert_eq!(
            describe_matches(&body),
            "Here are the current live scores: \
             India versus Australia, the status is: India need 20 runs. \
             England versus Pakistan, the status is: Stumps. \
             Kerala versus N/A, the status is: Innings break. "
        );
    }

    #[test]
    fn host_comes_from_endpoint() {
        let tool = LiveScoresTool::new(
            "https://cricbuzz-cricket-match-api.p.rapidapi.com".to_string(),
            None,
        );
        assert_eq!(tool.host().unwrap(), "cricbuzz-cricket-match-api.p.rapidapi.com");
    }
}
