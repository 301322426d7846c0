//! Scripted `TextGenerator` for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Generation, GenerationRequest, LlmError, TextGenerator, TokenUsage};

enum Step {
    Reply(Generation),
    ApiError { status: u16, message: String },
}

/// Replays queued replies in order. Once the script runs out, the optional
/// fallback reply is returned for every further call.
#[derive(Default)]
pub struct ScriptedGenerator {
    steps: Mutex<VecDeque<Step>>,
    fallback: Option<Generation>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every call with the same text.
    pub fn always(text: &str, input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            fallback: Some(generation(text, input_tokens, output_tokens)),
            ..Self::default()
        }
    }

    pub fn reply(self, text: &str, input_tokens: u32, output_tokens: u32) -> Self {
        self.steps
            .lock()
            .unwrap()
            .push_back(Step::Reply(generation(text, input_tokens, output_tokens)));
        self
    }

    pub fn fail(self, status: u16, message: &str) -> Self {
        self.steps.lock().unwrap().push_back(Step::ApiError {
            status,
            message: message.to_string(),
        });
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn generation(text: &str, input_tokens: u32, output_tokens: u32) -> Generation {
    Generation {
        text: text.to_string(),
        usage: TokenUsage {
            input_tokens,
            output_tokens,
        },
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(generation)) => Ok(generation),
            Some(Step::ApiError { status, message }) => Err(LlmError::Api { status, message }),
            None => self.fallback.clone().ok_or(LlmError::EmptyContent),
        }
    }
}
