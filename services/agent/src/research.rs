//! Pre-session research: Brave web search plus oracle synthesis.
//!
//! Before connecting, an agent builds a briefing on the party it represents.
//! Search failures are never fatal; an agent with no research negotiates
//! from the generic fallback briefing instead.

use dealtalk_core::negotiation::Role;
use dealtalk_core::oracle::OracleClient;
use dealtalk_core::prompts;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

const SEARCH_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Spacing between consecutive queries; the free Brave tier rate-limits.
const SEARCH_SPACING: Duration = Duration::from_secs(2);
const RESULTS_PER_QUERY: u8 = 3;

const SYNTHESIS_SYSTEM: &str =
    "You are a financial research analyst. You write concise, factual briefings.";

/// Brave Search API client. Without an API key it is permanently disabled
/// and every search yields `None`.
pub struct BraveSearch {
    http: reqwest::Client,
    api_key: Option<String>,
}

impl BraveSearch {
    pub fn new(api_key: Option<String>) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(SEARCH_TIMEOUT).build()?;
        Ok(Self { http, api_key })
    }

    pub fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Runs one query and formats the top results. Any failure (transport,
    /// HTTP status, unexpected body) is logged and collapses to `None`.
    pub async fn search(&self, query: &str, count: u8) -> Option<String> {
        let api_key = self.api_key.as_ref()?;
        let response = self
            .http
            .get(SEARCH_ENDPOINT)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key)
            .query(&[
                ("q", query),
                ("count", &count.to_string()),
                ("text_decorations", "false"),
                ("search_lang", "en"),
            ])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, query, "web search request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), query, "web search returned an error status");
            return None;
        }
        match response.json::<Value>().await {
            Ok(data) => format_results(&data),
            Err(e) => {
                warn!(error = %e, query, "web search returned an unreadable body");
                None
            }
        }
    }
}

/// Formats the `web.results` array as numbered title/description/source
/// blocks. `None` when there is nothing usable.
fn format_results(data: &Value) -> Option<String> {
    let results = data.get("web")?.get("results")?.as_array()?;
    let mut lines = Vec::new();
    for (idx, result) in results.iter().take(RESULTS_PER_QUERY as usize).enumerate() {
        let title = result.get("title").and_then(Value::as_str).unwrap_or("");
        let description = result
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("");
        let url = result.get("url").and_then(Value::as_str).unwrap_or("");

        lines.push(format!("{}. {}", idx + 1, title));
        if !description.is_empty() {
            lines.push(format!("   {description}"));
        }
        lines.push(format!("   Source: {url}"));
        lines.push(String::new());
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n").trim_end().to_string())
    }
}

/// Gathers search results for the party and has the oracle synthesize them
/// into a negotiation briefing. Falls back to the generic briefing when
/// search is disabled or empty, and to the raw results when synthesis fails.
pub async fn build_briefing(
    role: Role,
    name: &str,
    search: &BraveSearch,
    oracle: &dyn OracleClient,
) -> String {
    if !search.enabled() {
        info!("no search API key; using fallback briefing");
        return prompts::fallback_briefing(role, name);
    }

    let queries = prompts::research_queries(role, name);
    let mut sections = Vec::new();
    for (i, query) in queries.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(SEARCH_SPACING).await;
        }
        match search.search(query, RESULTS_PER_QUERY).await {
            Some(results) => {
                info!(query = %query, "search succeeded");
                sections.push(format!("SEARCH: {query}\n{results}"));
            }
            None => warn!(query = %query, "search yielded nothing"),
        }
    }
    if sections.is_empty() {
        warn!("all research queries failed; using fallback briefing");
        return prompts::fallback_briefing(role, name);
    }

    let raw = sections.join("\n\n");
    let prompt = prompts::briefing_synthesis_prompt(role, name, &raw);
    match oracle.generate(SYNTHESIS_SYSTEM, &prompt).await {
        Ok(briefing) => briefing,
        Err(e) => {
            warn!(error = %e, "briefing synthesis failed; using raw search results");
            raw
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn formats_top_results() {
        let data = json!({
            "web": {
                "results": [
                    {"title": "Acme Q4 earnings", "description": "Revenue up 40%", "url": "https://example.com/a"},
                    {"title": "Acme valuation", "description": "", "url": "https://example.com/b"},
                ]
            }
        });
        let formatted = format_results(&data).unwrap();
        assert!(formatted.contains("1. Acme Q4 earnings"));
        assert!(formatted.contains("Revenue up 40%"));
        assert!(formatted.contains("2. Acme valuation"));
        assert!(formatted.contains("Source: https://example.com/b"));
    }

    #[test]
    fn empty_results_are_none() {
        assert_eq!(format_results(&json!({"web": {"results": []}})), None);
        assert_eq!(format_results(&json!({"unexpected": true})), None);
    }

    #[test]
    fn missing_key_disables_search() {
        let search = BraveSearch::new(None).unwrap();
        assert!(!search.enabled());
    }
}
