//! `ResearchWorkflow`: runs the research agent inside the workflow engine.
//!
//! Every model call the agent makes is executed as an `invoke_model` activity,
//! so the worker's start-to-close timeout and retry policy apply per call.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::engine::{ActivityError, Workflow, WorkflowContext, WorkflowError};
use crate::llm_client::{Generation, GenerationRequest, LlmError, TextGenerator};
use crate::research::agent::ResearchAgent;
use crate::research::models::{ResearchRequest, ResearchWorkflowResult};
use crate::research::prompts::build_research_input;

pub const RESEARCH_WORKFLOW: &str = "ResearchWorkflow";
const INVOKE_MODEL_ACTIVITY: &str = "invoke_model";

pub struct ResearchWorkflow {
    generator: Arc<dyn TextGenerator>,
    agent: ResearchAgent,
}

impl ResearchWorkflow {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            agent: ResearchAgent::new(),
        }
    }

    pub fn with_agent(mut self, agent: ResearchAgent) -> Self {
        self.agent = agent;
        self
    }
}

#[async_trait]
impl Workflow for ResearchWorkflow {
    fn name(&self) -> &'static str {
        RESEARCH_WORKFLOW
    }

    async fn run(&self, ctx: &WorkflowContext, input: Value) -> Result<Value, WorkflowError> {
        let request: ResearchRequest =
            serde_json::from_value(input).map_err(WorkflowError::InvalidInput)?;
        request.validate().map_err(WorkflowError::Failed)?;

        info!(
            "[{}] Starting research workflow for: {}",
            ctx.workflow_id(),
            request.job_title
        );

        let research_input = build_research_input(&request.job_title, request.job_url.as_deref());
        let generator = ActivityGenerator {
            ctx,
            inner: self.generator.as_ref(),
        };

        let run = self
            .agent
            .run(&generator, &research_input)
            .await
            .map_err(|e| {
                warn!("[{}] Research workflow failed: {e}", ctx.workflow_id());
                WorkflowError::Failed(e.to_string())
            })?;

        info!(
            "[{}] Research workflow completed - Tokens: {}",
            ctx.workflow_id(),
            run.usage.total_tokens
        );

        let result = ResearchWorkflowResult {
            job_title: request.job_title,
            job_url: request.job_url,
            result: run.output,
            usage: run.usage,
        };
        serde_json::to_value(result).map_err(|e| WorkflowError::Failed(e.to_string()))
    }
}

/// Routes each generation through `execute_activity` so it inherits the
/// run's timeout and retry policy.
struct ActivityGenerator<'a> {
    ctx: &'a WorkflowContext,
    inner: &'a dyn TextGenerator,
}

#[async_trait]
impl TextGenerator for ActivityGenerator<'_> {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError> {
        let inner = self.inner;
        self.ctx
            .execute_activity(INVOKE_MODEL_ACTIVITY, move || async move {
                inner.generate(request).await.map_err(|e| {
                    if e.is_retryable() {
                        ActivityError::retryable(e.to_string())
                    } else {
                        ActivityError::non_retryable(e.to_string())
                    }
                })
            })
            .await
            .map_err(|e| LlmError::GaveUp(e.to_string()))
    }
}
