//! Heuristic error categorization.
//!
//! The failure's type name and message are lowercased and searched for the
//! keyword sets below, in order. The first set with a hit decides the
//! category. Severity is then escalated by keywords in the text, or falls
//! back to the category's baseline.

use crate::core_types::errors::{Category, Severity};

/// Ordered keyword sets. Order matters: "invalid token" is an auth problem,
/// not a validation one.
const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Network,
        &[
            "network",
            "connection",
            "timeout",
            "timed out",
            "unreachable",
            "socket",
            "dns",
            "refused",
        ],
    ),
    (
        Category::Database,
        &["database", "sql", "query", "transaction", "deadlock", "constraint"],
    ),
    (
        Category::Api,
        &["api", "http", "endpoint", "status code", "rate limit", "bad gateway"],
    ),
    (
        Category::Auth,
        &[
            "auth",
            "unauthorized",
            "forbidden",
            "permission",
            "credential",
            "token",
            "login",
        ],
    ),
    (
        Category::Validation,
        &["validation", "invalid", "required", "malformed", "schema", "parse"],
    ),
    (
        Category::Resource,
        &["memory", "disk", "quota", "resource", "exhausted", "capacity"],
    ),
    (
        Category::Config,
        &["config", "setting", "environment variable", "missing key"],
    ),
    (
        Category::System,
        &["system", "os error", "i/o", "panic", "kernel", "thread"],
    ),
    (
        Category::Dependency,
        &["dependency", "circuit", "unavailable", "upstream", "library", "module"],
    ),
    (Category::Business, &["business", "domain rule"]),
];

const CRITICAL_KEYWORDS: &[&str] = &["critical", "fatal", "emergency"];
const HIGH_KEYWORDS: &[&str] = &["severe", "major", "high"];
const LOW_KEYWORDS: &[&str] = &["minor", "low"];

/// Assign a category and severity from a failure's type name and message.
pub fn categorize(type_name: &str, message: &str) -> (Category, Severity) {
    // Type names are snake_case; match them the same way as prose.
    let text = format!("{} {}", type_name.replace('_', " "), message).to_lowercase();

    let category = CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| contains_any(&text, keywords))
        .map_or(Category::Unknown, |(category, _)| *category);

    let severity = if contains_any(&text, CRITICAL_KEYWORDS) {
        Severity::Critical
    } else if contains_any(&text, HIGH_KEYWORDS) {
        Severity::High
    } else if contains_any(&text, LOW_KEYWORDS) {
        Severity::Low
    } else {
        baseline_severity(category)
    };

    (category, severity)
}

/// Severity implied by a category when the text carries no escalation.
pub fn baseline_severity(category: Category) -> Severity {
    match category {
        Category::Database | Category::Auth | Category::Resource | Category::System => {
            Severity::High
        }
        Category::Network | Category::Api | Category::Config | Category::Dependency => {
            Severity::Medium
        }
        Category::Validation => Severity::Low,
        Category::Business | Category::Unknown => Severity::Medium,
    }
}

/// Operator-facing remediation hints for a category.
pub fn resolution_steps(category: Category) -> Vec<String> {
    let steps: &[&str] = match category {
        Category::Network => &[
            "Check connectivity to the remote host",
            "Verify DNS resolution and firewall rules",
        ],
        Category::Database => &[
            "Check database availability and connection pool health",
            "Inspect slow or locked queries",
        ],
        Category::Api => &[
            "Check the upstream API status",
            "Review rate limits and request payloads",
        ],
        Category::Auth => &[
            "Verify credentials and token expiry",
            "Check the caller's permissions",
        ],
        Category::Validation => &["Review the input against the expected schema"],
        Category::Resource => &[
            "Check memory, disk and quota usage",
            "Scale or free resources before retrying",
        ],
        Category::Config => &["Review configuration values and environment variables"],
        Category::System => &["Inspect host and runtime logs"],
        Category::Dependency => &[
            "Check the health of the failing dependency",
            "Wait for the circuit breaker recovery window",
        ],
        Category::Business | Category::Unknown => &[],
    };
    steps.iter().map(|s| (*s).to_string()).collect()
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}
