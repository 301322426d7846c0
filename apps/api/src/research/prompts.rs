// Research agent prompt templates and output schema.

use serde_json::{json, Value};

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;

pub const AGENT_NAME: &str = "ResearchAgent";

pub const RESEARCH_AGENT_INSTRUCTIONS: &str = "\
You are a research agent specialized in analyzing job descriptions and roles. \
Extract key information including role summary, requirements, skills needed, \
and company context. Be specific and concise. Focus on actionable details. \
If a job URL is provided, focus on that specific posting. \
If only a job title is provided, research typical requirements for that role. \
List between 1 and 15 requirements and between 1 and 15 skills. \
Use null for company_context when nothing is known about the company.";

/// Full system prompt: agent instructions plus the JSON-only rule.
pub fn research_system_prompt() -> String {
    format!("{RESEARCH_AGENT_INSTRUCTIONS} {JSON_ONLY_SYSTEM}")
}

/// Builds the user message for a job title and optional posting URL.
/// The URL is passed through verbatim.
pub fn build_research_input(job_title: &str, job_url: Option<&str>) -> String {
    let mut input = format!("Job Title: {job_title}");
    match job_url {
        Some(url) => {
            input.push_str(&format!("\nJob URL: {url}"));
            input.push_str("\n\nPlease analyze this job posting and extract the key information.");
        }
        None => {
            input.push_str(
                "\n\nPlease research this role and provide typical requirements and skills.",
            );
        }
    }
    input
}

/// JSON schema of `ResearchResult` for structured output.
pub fn research_result_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["role_summary", "requirements", "skills", "company_context"],
        "properties": {
            "role_summary": {
                "type": "string",
                "description": "Summary of the role or topic"
            },
            "requirements": {
                "type": "array",
                "description": "Key requirements or qualifications",
                "items": { "type": "string" },
                "minItems": 1,
                "maxItems": 15
            },
            "skills": {
                "type": "array",
                "description": "Required technical and soft skills",
                "items": { "type": "string" },
                "minItems": 1,
                "maxItems": 15
            },
            "company_context": {
                "type": ["string", "null"],
                "description": "Company information if available"
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_with_url_includes_it_verbatim() {
        let url = "https://example.com/jobs/123?ref=a&b=c";
        let input = build_research_input("Senior Software Engineer", Some(url));
        assert!(input.starts_with("Job Title: Senior Software Engineer"));
        assert!(input.contains(&format!("Job URL: {url}")));
        assert!(input.contains("analyze this job posting"));
    }

    #[test]
    fn test_input_without_url_asks_for_typical_requirements() {
        let input = build_research_input("Data Scientist", None);
        assert!(!input.contains("Job URL"));
        assert!(input.contains("typical requirements"));
    }

    #[test]
    fn test_schema_bounds_match_result_limits() {
        let schema = research_result_schema();
        for field in ["requirements", "skills"] {
            assert_eq!(schema["properties"][field]["minItems"], 1);
            assert_eq!(schema["properties"][field]["maxItems"], 15);
        }
    }

    #[test]
    fn test_system_prompt_demands_json() {
        assert!(research_system_prompt().contains("valid JSON only"));
    }
}
