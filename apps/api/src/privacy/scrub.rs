//! PII scrubbing for log lines and free text.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

pub const REDACTED: &str = "[REDACTED]";

struct PiiPattern {
    name: &'static str,
    regex: Regex,
    /// Whether a surviving match means the scrubber failed.
    checked: bool,
}

// Applied in order. Emails go first so the phone pattern never eats digits
// out of an address.
static PATTERNS: LazyLock<Vec<PiiPattern>> = LazyLock::new(|| {
    vec![
        PiiPattern {
            name: "email",
            regex: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
                .expect("email pattern compiles"),
            checked: true,
        },
        PiiPattern {
            name: "phone",
            regex: Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").expect("phone pattern compiles"),
            checked: true,
        },
        PiiPattern {
            name: "ssn",
            regex: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn pattern compiles"),
            checked: true,
        },
        PiiPattern {
            name: "credit_card",
            regex: Regex::new(r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b")
                .expect("credit card pattern compiles"),
            checked: false,
        },
    ]
});

/// Replaces every email, phone number, SSN and card number with `[REDACTED]`.
pub fn scrub_pii(text: &str) -> String {
    PATTERNS.iter().fold(text.to_string(), |acc, pattern| {
        pattern.regex.replace_all(&acc, REDACTED).into_owned()
    })
}

/// Names of the checked PII kinds still present in `text`.
pub fn detect_pii(text: &str) -> Vec<&'static str> {
    PATTERNS
        .iter()
        .filter(|p| p.checked && p.regex.is_match(text))
        .map(|p| p.name)
        .collect()
}

/// True when scrubbing `text` leaves no email, phone number or SSN behind.
pub fn validate_scrubber(text: &str) -> bool {
    detect_pii(&scrub_pii(text)).is_empty()
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrubCheck {
    pub original: String,
    pub scrubbed: String,
    pub valid: bool,
}

pub fn check(text: &str) -> ScrubCheck {
    ScrubCheck {
        original: text.to_string(),
        scrubbed: scrub_pii(text),
        valid: validate_scrubber(text),
    }
}
