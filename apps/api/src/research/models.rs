use serde::{Deserialize, Serialize};

use crate::llm_client::TokenUsage;

pub const JOB_TITLE_MAX_CHARS: usize = 50;
pub const JOB_URL_MAX_CHARS: usize = 1000;
pub const TOPIC_MAX_CHARS: usize = 3000;
pub const LIST_MIN_ITEMS: usize = 1;
pub const LIST_MAX_ITEMS: usize = 15;

/// Input of the research workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub job_title: String,
    #[serde(default)]
    pub job_url: Option<String>,
}

impl ResearchRequest {
    /// Checks field bounds. Runs before anything reaches the engine.
    pub fn validate(&self) -> Result<(), String> {
        let title_len = self.job_title.chars().count();
        if self.job_title.trim().is_empty() {
            return Err("job_title must not be empty".to_string());
        }
        if title_len > JOB_TITLE_MAX_CHARS {
            return Err(format!(
                "job_title must be at most {JOB_TITLE_MAX_CHARS} characters (got {title_len})"
            ));
        }
        if let Some(url) = &self.job_url {
            let url_len = url.chars().count();
            if url_len > JOB_URL_MAX_CHARS {
                return Err(format!(
                    "job_url must be at most {JOB_URL_MAX_CHARS} characters (got {url_len})"
                ));
            }
        }
        Ok(())
    }
}

/// Free-form research topic for the synchronous endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicRequest {
    pub topic: String,
}

impl TopicRequest {
    pub fn validate(&self) -> Result<(), String> {
        let len = self.topic.chars().count();
        if self.topic.trim().is_empty() {
            return Err("topic must not be empty".to_string());
        }
        if len > TOPIC_MAX_CHARS {
            return Err(format!(
                "topic must be at most {TOPIC_MAX_CHARS} characters (got {len})"
            ));
        }
        Ok(())
    }
}

/// Structured output of the research agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub role_summary: String,
    pub requirements: Vec<String>,
    pub skills: Vec<String>,
    #[serde(default)]
    pub company_context: Option<String>,
}

impl ResearchResult {
    pub fn validate(&self) -> Result<(), String> {
        if self.role_summary.trim().is_empty() {
            return Err("role_summary must not be empty".to_string());
        }
        check_list_bounds("requirements", &self.requirements)?;
        check_list_bounds("skills", &self.skills)?;
        Ok(())
    }
}

fn check_list_bounds(field: &str, items: &[String]) -> Result<(), String> {
    if !(LIST_MIN_ITEMS..=LIST_MAX_ITEMS).contains(&items.len()) {
        return Err(format!(
            "{field} must have between {LIST_MIN_ITEMS} and {LIST_MAX_ITEMS} items (got {})",
            items.len()
        ));
    }
    if items.iter().any(|i| i.trim().is_empty()) {
        return Err(format!("{field} must not contain empty items"));
    }
    Ok(())
}

/// Token counters summed over every model call made for one result.
/// `total_tokens` is always `prompt_tokens + completion_tokens`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl UsageCounters {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn add(&mut self, usage: TokenUsage) {
        *self = Self::new(
            self.prompt_tokens + u64::from(usage.input_tokens),
            self.completion_tokens + u64::from(usage.output_tokens),
        );
    }

    pub fn sum<I: IntoIterator<Item = TokenUsage>>(usages: I) -> Self {
        let mut total = Self::default();
        for usage in usages {
            total.add(usage);
        }
        total
    }
}

/// What the research workflow returns and the status endpoint relays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchWorkflowResult {
    pub job_title: String,
    pub job_url: Option<String>,
    pub result: ResearchResult,
    pub usage: UsageCounters,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(requirements: usize, skills: usize) -> ResearchResult {
        ResearchResult {
            role_summary: "Backend engineer".into(),
            requirements: vec!["Req".to_string(); requirements],
            skills: vec!["Skill".to_string(); skills],
            company_context: None,
        }
    }

    #[test]
    fn test_request_accepts_title_without_url() {
        let req = ResearchRequest {
            job_title: "Data Scientist".into(),
            job_url: None,
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_rejects_empty_and_blank_title() {
        for title in ["", "   "] {
            let req = ResearchRequest {
                job_title: title.into(),
                job_url: None,
            };
            assert!(req.validate().is_err(), "{title:?} should be rejected");
        }
    }

    #[test]
    fn test_request_title_limit_counts_characters() {
        let at_limit = ResearchRequest {
            job_title: "é".repeat(JOB_TITLE_MAX_CHARS),
            job_url: None,
        };
        assert!(at_limit.validate().is_ok());

        let over = ResearchRequest {
            job_title: "a".repeat(JOB_TITLE_MAX_CHARS + 1),
            job_url: None,
        };
        assert!(over.validate().unwrap_err().contains("at most 50"));
    }

    #[test]
    fn test_request_rejects_long_url() {
        let req = ResearchRequest {
            job_title: "Engineer".into(),
            job_url: Some(format!("https://x.io/{}", "a".repeat(JOB_URL_MAX_CHARS))),
        };
        assert!(req.validate().unwrap_err().contains("job_url"));
    }

    #[test]
    fn test_topic_bounds() {
        let ok = TopicRequest {
            topic: "a".repeat(TOPIC_MAX_CHARS),
        };
        assert!(ok.validate().is_ok());
        let long = TopicRequest {
            topic: "a".repeat(TOPIC_MAX_CHARS + 1),
        };
        assert!(long.validate().is_err());
        let blank = TopicRequest { topic: " ".into() };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_result_list_bounds() {
        assert!(result(1, 1).validate().is_ok());
        assert!(result(15, 15).validate().is_ok());
        assert!(result(0, 3).validate().is_err());
        assert!(result(16, 3).validate().is_err());
        assert!(result(3, 0).validate().is_err());
        assert!(result(3, 16).validate().is_err());
    }

    #[test]
    fn test_result_company_context_is_optional_in_json() {
        let json = r#"{"role_summary": "x", "requirements": ["a"], "skills": ["b"]}"#;
        let parsed: ResearchResult = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.company_context, None);
    }

    #[test]
    fn test_usage_sums_across_calls() {
        let usage = UsageCounters::sum([
            TokenUsage {
                input_tokens: 100,
                output_tokens: 150,
            },
            TokenUsage {
                input_tokens: 40,
                output_tokens: 10,
            },
        ]);
        assert_eq!(usage, UsageCounters::new(140, 160));
        assert_eq!(usage.total_tokens, usage.prompt_tokens + usage.completion_tokens);
    }

    #[test]
    fn test_usage_of_no_calls_is_zero() {
        assert_eq!(UsageCounters::sum(std::iter::empty()), UsageCounters::default());
    }
}
