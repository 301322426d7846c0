// Shared prompt fragments. Each service that calls the model keeps its own
// prompts.rs alongside it; only cross-cutting pieces live here.

/// Appended to every system prompt that expects structured output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Sent back to the model when its previous reply did not fit the schema.
/// Replace `{error}` before sending.
pub const SCHEMA_CORRECTION_TEMPLATE: &str = "Your previous reply could not be accepted: {error}. \
    Reply again with a single JSON object that satisfies the required schema exactly.";
