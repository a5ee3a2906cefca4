//! Claude-backed narrative generator.

use super::{GenerationRequest, GeneratorError, NarrativeGenerator};
use crate::segment::{Outcome, Segment};
use ::claude::{Claude, Message, Request};
use async_trait::async_trait;
use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;

static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

const SYSTEM_PROMPT: &str = "\
You are an ancient, watchful force overseeing a test called the Trial of Fire.
A lone human has woken with no memory inside a dark prehistoric cave and must
escape by instinct, one choice at a time. They do not know the rules.

Voice: cold, tense, minimal. Short functional sentences. Sensory detail only,
no metaphors, no modern references, no jokes. The narrator is not the player.
Two or three sentences per beat, plus at most one quoted line from the voice.

Continuity: anything introduced (a creature, a torch, a whisper) must persist,
return, or leave signs in later beats. Never drop an element.

Every narrative starts with a terminal-style prefix such as
\"> SYSTEM ALERT:\" or \"> DANGER WARNING:\".

Reply with JSON only:
{\"narrative\": \"...\", \"optionA\": \"...\", \"optionB\": \"...\", \"outcome\": \"continue\" | \"escaped\" | \"death\"}";

/// Model settings for the Claude generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Model override; the client default is used otherwise.
    pub model: Option<String>,

    /// Maximum tokens for one beat.
    pub max_tokens: usize,

    /// Sampling temperature.
    pub temperature: Option<f32>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 600,
            temperature: Some(0.4),
        }
    }
}

/// Generates story beats with Claude.
#[derive(Clone)]
pub struct ClaudeGenerator {
    client: Claude,
    config: GeneratorConfig,
}

impl ClaudeGenerator {
    pub fn new(client: Claude) -> Self {
        Self {
            client,
            config: GeneratorConfig::default(),
        }
    }

    /// Build from the ANTHROPIC_API_KEY environment variable.
    ///
    /// The HTTP timeout is a backstop; the engine enforces the real budget.
    pub fn from_env(http_timeout: Duration) -> Result<Self, GeneratorError> {
        Ok(Self::new(Claude::from_env(http_timeout)?))
    }

    pub fn with_config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    fn build_request(&self, request: &GenerationRequest) -> Request {
        let mut claude_request = Request::new(vec![Message::user(user_prompt(request))])
            .with_system(system_prompt(request))
            .with_max_tokens(self.config.max_tokens);

        if let Some(ref model) = self.config.model {
            claude_request = claude_request.with_model(model);
        }
        if let Some(temperature) = self.config.temperature {
            claude_request = claude_request.with_temperature(temperature);
        }
        claude_request
    }
}

#[async_trait]
impl NarrativeGenerator for ClaudeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Segment, GeneratorError> {
        let claude_request = self.build_request(request);
        trace!("Generator system prompt:\n{:?}", claude_request.system);

        let response = self.client.complete(claude_request).await?;
        let text = response.text();
        debug!(
            "Generator replied for {} ({} output tokens)",
            request.key(),
            response.usage.output_tokens
        );

        parse_segment(&text)
    }

    fn name(&self) -> &str {
        "claude"
    }
}

fn system_prompt(request: &GenerationRequest) -> String {
    let mut prompt = String::from(SYSTEM_PROMPT);

    prompt.push_str(&format!(
        "\n\nThe player is on step {} of at most {}.",
        request.step, request.max_steps
    ));
    if let Some(branch) = request.branch {
        prompt.push_str(&format!(" They just chose option {branch}."));
    }

    if !request.narrative_history.is_empty() {
        prompt.push_str("\n\nPrevious narrative:\n");
        prompt.push_str(&request.narrative_history.join("\n\n"));
    }
    if !request.choice_history.is_empty() {
        prompt.push_str("\n\nPrevious choices:\n");
        prompt.push_str(&request.choice_history.join("\n"));
    }

    if request.force_ending {
        prompt.push_str(
            "\n\nThis is the final beat. The outcome MUST be \"escaped\" or \"death\", \
             following from the player's choices.",
        );
    } else {
        prompt.push_str("\n\nThe outcome must be \"continue\".");
    }
    prompt
}

fn user_prompt(request: &GenerationRequest) -> String {
    let mut prompt = format!("Generate step {} of the Trial of Fire.", request.step);
    if let Some(branch) = request.branch {
        prompt.push_str(&format!(" The player chose option {branch}."));
    }
    prompt.push_str(" Keep continuity with what came before.");
    prompt
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    narrative: String,
    option_a: String,
    option_b: String,
    #[serde(default)]
    outcome: Option<String>,
}

/// Pull a segment out of a model reply.
///
/// The reply may wrap the JSON object in prose or code fences. A missing
/// outcome means `continue`; blank text or an unknown outcome is malformed.
pub fn parse_segment(raw: &str) -> Result<Segment, GeneratorError> {
    let json = JSON_OBJECT
        .find(raw)
        .map(|m| m.as_str())
        .ok_or_else(|| GeneratorError::Malformed("no JSON object in reply".to_string()))?;

    let payload: Payload =
        serde_json::from_str(json).map_err(|e| GeneratorError::Malformed(e.to_string()))?;

    if payload.narrative.trim().is_empty() {
        return Err(GeneratorError::Malformed("empty narrative".to_string()));
    }
    if payload.option_a.trim().is_empty() || payload.option_b.trim().is_empty() {
        return Err(GeneratorError::Malformed("empty option label".to_string()));
    }

    let outcome = match payload.outcome.as_deref() {
        None => Outcome::Continue,
        Some(tag) => tag
            .parse::<Outcome>()
            .map_err(|e| GeneratorError::Malformed(e.to_string()))?,
    };

    Ok(Segment::new(
        payload.narrative.trim(),
        payload.option_a.trim(),
        payload.option_b.trim(),
        outcome,
    )
    .ensure_terminal_prefix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Branch;

    fn request(step: u32, force_ending: bool) -> GenerationRequest {
        GenerationRequest {
            narrative_history: vec!["> SYSTEM ALERT: one".into()],
            choice_history: vec!["Walk toward the glow".into()],
            step,
            branch: Some(Branch::A),
            max_steps: 8,
            force_ending,
        }
    }

    #[test]
    fn test_parse_plain_json() {
        let segment = parse_segment(
            r#"{"narrative":"> DANGER WARNING: ash","optionA":"Run","optionB":"Hide","outcome":"continue"}"#,
        )
        .unwrap();
        assert_eq!(segment.narrative, "> DANGER WARNING: ash");
        assert_eq!(segment.option(Branch::B), "Hide");
        assert_eq!(segment.outcome, Outcome::Continue);
    }

    #[test]
    fn test_parse_wrapped_json() {
        let raw = "Here you go:\n```json\n{\"narrative\": \"Stone.\", \"optionA\": \"a\", \"optionB\": \"b\", \"outcome\": \"ESCAPED\"}\n```";
        let segment = parse_segment(raw).unwrap();
        assert_eq!(segment.narrative, "> SYSTEM: Stone.");
        assert_eq!(segment.outcome, Outcome::Escaped);
    }

    #[test]
    fn test_parse_missing_outcome_continues() {
        let segment =
            parse_segment(r#"{"narrative":"> x","optionA":"a","optionB":"b"}"#).unwrap();
        assert_eq!(segment.outcome, Outcome::Continue);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            parse_segment("the cave is silent"),
            Err(GeneratorError::Malformed(_))
        ));
        assert!(matches!(
            parse_segment(r#"{"narrative":"> x","optionA":"a"}"#),
            Err(GeneratorError::Malformed(_))
        ));
        assert!(matches!(
            parse_segment(r#"{"narrative":"  ","optionA":"a","optionB":"b"}"#),
            Err(GeneratorError::Malformed(_))
        ));
        assert!(matches!(
            parse_segment(r#"{"narrative":"> x","optionA":"a","optionB":"b","outcome":"won"}"#),
            Err(GeneratorError::Malformed(_))
        ));
    }

    #[test]
    fn test_prompts_carry_context() {
        let prompt = system_prompt(&request(3, false));
        assert!(prompt.contains("step 3 of at most 8"));
        assert!(prompt.contains("chose option A"));
        assert!(prompt.contains("Walk toward the glow"));
        assert!(prompt.contains("must be \"continue\""));

        let final_prompt = system_prompt(&request(8, true));
        assert!(final_prompt.contains("MUST be \"escaped\" or \"death\""));

        assert!(user_prompt(&request(3, false)).starts_with("Generate step 3"));
    }

    #[test]
    fn test_build_request_applies_config() {
        let client = Claude::new("test-key", Duration::from_secs(1)).unwrap();
        let generator = ClaudeGenerator::new(client).with_config(GeneratorConfig {
            model: Some("claude-3-5-haiku-latest".into()),
            max_tokens: 300,
            temperature: None,
        });
        let built = generator.build_request(&request(2, false));
        assert_eq!(built.model.as_deref(), Some("claude-3-5-haiku-latest"));
        assert_eq!(built.max_tokens, 300);
        assert_eq!(built.temperature, None);
        assert_eq!(built.messages.len(), 1);
    }
}
