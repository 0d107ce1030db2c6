//! Oracle Client
//!
//! The "oracle" is the external text-generation service both processes lean
//! on: agents call it to produce utterances, the relay calls it for
//! termination judgments and the closing analysis. The trait keeps the
//! protocol code independent of any concrete provider and lets tests
//! substitute deterministic fakes; the shipped implementation talks to any
//! OpenAI-compatible chat-completions endpoint (OpenAI proper, or Gemini via
//! its compatibility base URL).

use crate::negotiation::{SessionMeta, TerminationDecision, TerminationStatus};
use crate::prompts;
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use serde::Deserialize;

/// Sampling temperature for utterance and conclusion generation.
const GENERATION_TEMPERATURE: f32 = 0.7;
/// Lower temperature for the termination judgment, for consistent verdicts.
const JUDGMENT_TEMPERATURE: f32 = 0.3;

const JUDGMENT_SYSTEM: &str =
    "You are a precise negotiation analyst. You always answer with a single JSON object.";

/// Errors from an oracle call.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Transport(#[from] OpenAIError),
    #[error("oracle returned no usable output")]
    EmptyResponse,
    #[error(transparent)]
    MalformedJudgment(#[from] JudgmentParseError),
}

/// The judgment text did not decode into the expected schema. Callers treat
/// this exactly like any other oracle failure: fail open to ONGOING.
#[derive(Debug, thiserror::Error)]
#[error("malformed termination judgment: {0}")]
pub struct JudgmentParseError(String);

/// Contract every oracle implementation must satisfy. Injected as
/// `Arc<dyn OracleClient>` everywhere; there are no global client instances.
#[async_trait]
pub trait OracleClient: Send + Sync {
    /// One chat completion: system context plus a single user instruction.
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, OracleError>;

    /// Asks for a structured verdict on a transcript window and strictly
    /// decodes it into a [`TerminationDecision`].
    async fn judge_termination(
        &self,
        window: &str,
        meta: &SessionMeta,
    ) -> Result<TerminationDecision, OracleError>;
}

/// Supported chat-completion backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Gemini,
}

impl Provider {
    pub fn parse(value: &str) -> Provider {
        match value.to_lowercase().as_str() {
            "openai" => Provider::OpenAi,
            _ => Provider::Gemini,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o",
            Provider::Gemini => "gemini-2.5-flash",
        }
    }

    pub fn api_base(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1/",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }
}

/// An [`OracleClient`] backed by an OpenAI-compatible chat-completions API.
pub struct ChatOracle {
    client: Client<OpenAIConfig>,
    model: String,
}

impl ChatOracle {
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }

    /// Builds a client for the given backend with its compatibility base URL.
    pub fn for_provider(provider: Provider, api_key: &str, model: String) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(provider.api_base());
        Self::new(config, model)
    }

    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, OracleError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(temperature)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()
                    .map_err(OracleError::Transport)?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()
                    .map_err(OracleError::Transport)?
                    .into(),
            ])
            .build()
            .map_err(OracleError::Transport)?;

        let response = self.client.chat().create(request).await?;
        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(str::trim)
            .unwrap_or_default();
        if text.is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl OracleClient for ChatOracle {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, OracleError> {
        self.complete(system, prompt, GENERATION_TEMPERATURE).await
    }

    async fn judge_termination(
        &self,
        window: &str,
        meta: &SessionMeta,
    ) -> Result<TerminationDecision, OracleError> {
        let prompt = prompts::termination_judgment_prompt(window, meta);
        let raw = self
            .complete(JUDGMENT_SYSTEM, &prompt, JUDGMENT_TEMPERATURE)
            .await?;
        Ok(parse_judgment(&raw)?)
    }
}

/// The schema the oracle must emit for a termination judgment.
#[derive(Deserialize, Debug)]
struct RawJudgment {
    should_end: bool,
    status: TerminationStatus,
    reason: String,
    confidence: f64,
}

/// Strictly decodes a judgment from raw oracle text.
///
/// Markdown code fences around the JSON are tolerated because models add
/// them despite instructions. Anything that does not decode into the exact
/// schema is a [`JudgmentParseError`]. `should_end == false` maps to ONGOING
/// no matter what status the model reported, and confidence is clamped to
/// [0, 1].
pub fn parse_judgment(raw: &str) -> Result<TerminationDecision, JudgmentParseError> {
    let body = strip_code_fences(raw);
    let parsed: RawJudgment =
        serde_json::from_str(body).map_err(|e| JudgmentParseError(e.to_string()))?;
    let status = if parsed.should_end {
        parsed.status
    } else {
        TerminationStatus::Ongoing
    };
    Ok(TerminationDecision {
        status,
        reason: parsed.reason,
        confidence: parsed.confidence.clamp(0.0, 1.0),
    })
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let body = if let Some(rest) = trimmed.split_once("```json").map(|(_, rest)| rest) {
        rest.split("```").next().unwrap_or(rest)
    } else if let Some(rest) = trimmed.split_once("```").map(|(_, rest)| rest) {
        rest.split("```").next().unwrap_or(rest)
    } else {
        trimmed
    };
    body.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_judgment() {
        let raw = r#"{"should_end": true, "status": "DEAL_ACCEPTED", "reason": "investor committed", "confidence": 0.85}"#;
        let decision = parse_judgment(raw).unwrap();
        assert_eq!(decision.status, TerminationStatus::DealAccepted);
        assert_eq!(decision.reason, "investor committed");
        assert!((decision.confidence - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn decodes_fenced_judgment() {
        let raw = "Here is my analysis:\n```json\n{\"should_end\": true, \"status\": \"IMPASSE\", \"reason\": \"deadlock\", \"confidence\": 0.9}\n```";
        let decision = parse_judgment(raw).unwrap();
        assert_eq!(decision.status, TerminationStatus::Impasse);
    }

    #[test]
    fn should_end_false_maps_to_ongoing() {
        let raw = r#"{"should_end": false, "status": "DEAL_ACCEPTED", "reason": "not yet", "confidence": 0.95}"#;
        let decision = parse_judgment(raw).unwrap();
        assert_eq!(decision.status, TerminationStatus::Ongoing);
        assert!(!decision.is_actionable());
    }

    #[test]
    fn confidence_is_clamped() {
        let raw = r#"{"should_end": true, "status": "DEAL_DECLINED", "reason": "pass", "confidence": 1.7}"#;
        let decision = parse_judgment(raw).unwrap();
        assert_eq!(decision.confidence, 1.0);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(parse_judgment("I think they should keep talking.").is_err());
        assert!(parse_judgment(r#"{"should_end": true}"#).is_err());
        assert!(
            parse_judgment(
                r#"{"should_end": true, "status": "MAYBE", "reason": "?", "confidence": 0.9}"#
            )
            .is_err()
        );
    }

    #[test]
    fn provider_parsing_and_defaults() {
        assert_eq!(Provider::parse("openai"), Provider::OpenAi);
        assert_eq!(Provider::parse("gemini"), Provider::Gemini);
        assert_eq!(Provider::parse("anything-else"), Provider::Gemini);
        assert_eq!(Provider::Gemini.default_model(), "gemini-2.5-flash");
    }
}
