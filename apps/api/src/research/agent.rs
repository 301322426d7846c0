//! Research agent. Asks the model for a `ResearchResult` and keeps asking,
//! with the validation error fed back, until the reply fits the schema.

use thiserror::Error;
use tracing::{info, warn};

use crate::llm_client::prompts::SCHEMA_CORRECTION_TEMPLATE;
use crate::llm_client::{
    strip_json_fences, ChatMessage, GenerationRequest, LlmError, OutputSchema, TextGenerator,
};
use crate::research::models::{ResearchResult, UsageCounters};
use crate::research::prompts::{research_result_schema, research_system_prompt, AGENT_NAME};

pub const DEFAULT_MAX_TURNS: usize = 3;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model call failed: {0}")]
    Model(#[from] LlmError),

    #[error("no valid output after {turns} model calls: {last_error}")]
    InvalidOutput {
        turns: usize,
        last_error: String,
        usage: UsageCounters,
    },
}

/// Final output of one agent run plus the usage of every call it made.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub output: ResearchResult,
    pub usage: UsageCounters,
    pub turns: usize,
}

#[derive(Debug, Clone)]
pub struct ResearchAgent {
    max_turns: usize,
}

impl Default for ResearchAgent {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
        }
    }
}

impl ResearchAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub async fn run(
        &self,
        generator: &dyn TextGenerator,
        input: &str,
    ) -> Result<AgentRun, AgentError> {
        let mut request = GenerationRequest {
            system: research_system_prompt(),
            messages: vec![ChatMessage::user(input)],
            output_schema: OutputSchema {
                name: "ResearchResult".to_string(),
                schema: research_result_schema(),
            },
        };
        let mut usage = UsageCounters::default();
        let mut last_error = String::new();

        for turn in 1..=self.max_turns {
            let generation = generator.generate(&request).await?;
            usage.add(generation.usage);

            match parse_output(&generation.text) {
                Ok(output) => {
                    info!(
                        "{AGENT_NAME} produced output on turn {turn} - Tokens: {}",
                        usage.total_tokens
                    );
                    return Ok(AgentRun {
                        output,
                        usage,
                        turns: turn,
                    });
                }
                Err(e) => {
                    warn!("{AGENT_NAME} turn {turn} output rejected: {e}");
                    request.messages.push(ChatMessage::assistant(generation.text));
                    request
                        .messages
                        .push(ChatMessage::user(SCHEMA_CORRECTION_TEMPLATE.replace("{error}", &e)));
                    last_error = e;
                }
            }
        }

        Err(AgentError::InvalidOutput {
            turns: self.max_turns,
            last_error,
            usage,
        })
    }
}

fn parse_output(text: &str) -> Result<ResearchResult, String> {
    let output: ResearchResult = serde_json::from_str(strip_json_fences(text))
        .map_err(|e| format!("reply is not a valid ResearchResult JSON object ({e})"))?;
    output.validate()?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::testing::ScriptedGenerator;
    use crate::llm_client::Role;

    const VALID: &str = r#"{
        "role_summary": "Senior Software Engineer role focusing on backend systems",
        "requirements": ["5+ years experience", "Python expertise", "System design skills"],
        "skills": ["Python", "FastAPI", "PostgreSQL", "Docker", "AWS"],
        "company_context": "Tech startup building B2B SaaS platform"
    }"#;

    const EMPTY_SKILLS: &str = r#"{
        "role_summary": "Engineer",
        "requirements": ["Req"],
        "skills": [],
        "company_context": null
    }"#;

    #[tokio::test]
    async fn test_single_valid_reply() {
        let generator = ScriptedGenerator::new().reply(VALID, 100, 150);
        let run = ResearchAgent::new()
            .run(&generator, "Job Title: Senior Software Engineer")
            .await
            .unwrap();

        assert_eq!(run.turns, 1);
        assert_eq!(run.output.requirements.len(), 3);
        assert_eq!(run.output.skills.len(), 5);
        assert_eq!(run.usage, UsageCounters::new(100, 150));
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_fenced_reply_is_accepted() {
        let fenced = format!("```json\n{VALID}\n```");
        let generator = ScriptedGenerator::new().reply(&fenced, 1, 1);
        let run = ResearchAgent::new().run(&generator, "x").await.unwrap();
        assert_eq!(run.output.skills[0], "Python");
    }

    #[tokio::test]
    async fn test_invalid_reply_is_corrected_and_usage_summed() {
        let generator = ScriptedGenerator::new()
            .reply(EMPTY_SKILLS, 80, 20)
            .reply(VALID, 120, 130);
        let run = ResearchAgent::new().run(&generator, "x").await.unwrap();

        assert_eq!(run.turns, 2);
        assert_eq!(run.usage, UsageCounters::new(200, 150));
        assert_eq!(run.usage.total_tokens, 350);

        let second = &generator.requests()[1];
        assert_eq!(second.messages.len(), 3);
        assert_eq!(second.messages[1].role, Role::Assistant);
        assert!(second.messages[2].content.contains("skills must have between 1 and 15"));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_turns() {
        let generator = ScriptedGenerator::always("not json", 10, 5);
        let err = ResearchAgent::new()
            .with_max_turns(2)
            .run(&generator, "x")
            .await
            .unwrap_err();

        match err {
            AgentError::InvalidOutput { turns, usage, .. } => {
                assert_eq!(turns, 2);
                assert_eq!(usage, UsageCounters::new(20, 10));
            }
            other => panic!("expected InvalidOutput, got {other:?}"),
        }
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let generator = ScriptedGenerator::new().fail(401, "bad key");
        let err = ResearchAgent::new().run(&generator, "x").await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Model(LlmError::Api { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn test_request_carries_schema_and_instructions() {
        let generator = ScriptedGenerator::new().reply(VALID, 1, 1);
        ResearchAgent::new()
            .run(&generator, "Job Title: Data Scientist")
            .await
            .unwrap();

        let request = &generator.requests()[0];
        assert_eq!(request.output_schema.name, "ResearchResult");
        assert!(request.system.contains("research agent"));
        assert_eq!(request.messages[0].content, "Job Title: Data Scientist");
    }
}
