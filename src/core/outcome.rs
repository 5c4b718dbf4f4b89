//! Per-item results of batch operations

use std::fmt;

/// Success sentinel of the line-oriented result format
pub const SUCCESS_SENTINEL: &str = "-";

/// Result of one independent batch item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome<T> {
    Success(T),
    Failure(String),
}

impl<T> JobOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success(_))
    }

    /// Diagnostic text of a failed item
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            JobOutcome::Success(_) => None,
            JobOutcome::Failure(message) => Some(message),
        }
    }

    /// One line of the legacy result format: the sentinel on success,
    /// otherwise the diagnostic flattened onto a single line
    pub fn legacy_line(&self) -> String {
        match self {
            JobOutcome::Success(_) => SUCCESS_SENTINEL.to_string(),
            JobOutcome::Failure(message) => flatten(message),
        }
    }
}

impl<T, E: fmt::Display> From<Result<T, E>> for JobOutcome<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => JobOutcome::Success(value),
            Err(e) => JobOutcome::Failure(e.to_string()),
        }
    }
}

/// Render outcomes newline-delimited, in submission order
pub fn format_legacy<T>(outcomes: &[JobOutcome<T>]) -> String {
    outcomes
        .iter()
        .map(JobOutcome::legacy_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn flatten(message: &str) -> String {
    let line = message
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if line.is_empty() {
        "unknown failure".to_string()
    } else {
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_format_keeps_one_line_per_item() {
        let outcomes: Vec<JobOutcome<()>> = vec![
            JobOutcome::Success(()),
            JobOutcome::Failure("in.wav: No such file\nConversion failed!\n".to_string()),
            JobOutcome::Success(()),
        ];
        let text = format_legacy(&outcomes);
        let lines: Vec<&str> = text.split('\n').collect();
        assert_eq!(lines, vec!["-", "in.wav: No such file Conversion failed!", "-"]);
    }

    #[test]
    fn test_empty_diagnostic_is_never_blank() {
        let outcome: JobOutcome<()> = JobOutcome::Failure("\n".to_string());
        assert_eq!(outcome.legacy_line(), "unknown failure");
    }
}
