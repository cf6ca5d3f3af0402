use crate::errors::AppError;
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_CAUSE_LEN: usize = 160;

static SECRET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"(?i)(password|passwd|pwd|token|secret|api[_-]?key)\s*[:=]\s*["']?[^\s"',;]+["']?"#)
            .expect("valid regex"),
        Regex::new(r"(?i)\b(postgres(?:ql)?|mysql|sqlite|redis)://[^\s]+").expect("valid regex"),
        Regex::new(r"(/[A-Za-z0-9._-]+){2,}\.(sqlite3?|db)\b").expect("valid regex"),
    ]
});

/// Statement text echoed back by some drivers, e.g. `near "SELECT": syntax error in SELECT ...`.
static STATEMENT_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\b(in|sql:|query:)\s*(WITH|SELECT|INSERT|UPDATE|DELETE)\b.*$").expect("valid regex")
});

/// Turns a raw failure into a single line that is safe to show a user: statement text
/// and credentials are removed and the result is bounded in length.
#[derive(Debug, Default, Clone)]
pub struct ErrorSummarizer;

impl ErrorSummarizer {
    pub fn summarize(&self, raw: &str) -> String {
        let first_line = raw.lines().map(str::trim).find(|line| !line.is_empty()).unwrap_or_default();
        let mut cause = STATEMENT_TAIL.replace(first_line, "").trim().to_string();
        for pattern in SECRET_PATTERNS.iter() {
            cause = pattern.replace_all(&cause, "[REDACTED]").to_string();
        }
        if cause.chars().count() > MAX_CAUSE_LEN {
            cause = cause.chars().take(MAX_CAUSE_LEN).collect::<String>();
            cause.push_str("...");
        }
        if cause.is_empty() {
            "unexpected failure".to_string()
        } else {
            cause
        }
    }

    /// User-facing message for an error returned at the operation boundary.
    pub fn user_message(&self, error: &AppError) -> String {
        match error {
            AppError::DataAccess(detail) => format!("Database query failed: {}", self.summarize(detail)),
            AppError::Internal(detail) => format!("Internal error: {}", self.summarize(detail)),
            other => other.detail().to_string(),
        }
    }
}
