//! Multi-level outcome reporting for numeric runs.
//!
//! Factorization trials and per-sample fits do not stop on every odd numeric
//! edge case. They record it here and carry on; only [`Severity::Critical`]
//! issues mean the run was halted and its output must not be used.
//!
//! ```rust
//! use mutsig::diagnostics::{Report, Severity};
//!
//! let mut report = Report::new();
//! report.warn("iteration cap reached");
//! assert!(report.is_valid());
//! assert!(report.has_warnings());
//! assert_eq!(report.counts()[&Severity::Warning], 1);
//! ```

use std::collections::HashMap;

/// Severity level for a recorded issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Informational, not a problem.
    Info,
    /// Unusual but the result is still usable.
    Warning,
    /// The run was halted; its result is invalid.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A single issue recorded during a run.
#[derive(Debug, Clone)]
pub struct Issue {
    /// Severity of the issue.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
    /// Iteration at which it was recorded, if any.
    pub iteration: Option<usize>,
}

impl Issue {
    /// Create a new issue.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            iteration: None,
        }
    }

    /// Attach the iteration number.
    pub fn at_iteration(mut self, iteration: usize) -> Self {
        self.iteration = Some(iteration);
        self
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)?;
        if let Some(it) = self.iteration {
            write!(f, " (iteration {})", it)?;
        }
        Ok(())
    }
}

/// Issues collected over one run.
#[derive(Debug, Clone, Default)]
pub struct Report {
    /// All issues, in the order recorded.
    pub issues: Vec<Issue>,
}

impl Report {
    /// Create an empty report.
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// Record an issue.
    pub fn add(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    /// Record an info-level issue.
    pub fn info(&mut self, message: impl Into<String>) {
        self.add(Issue::new(Severity::Info, message));
    }

    /// Record a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        let issue = Issue::new(Severity::Warning, message);
        log::warn!("{}", issue.message);
        self.add(issue);
    }

    /// Record a warning tagged with an iteration.
    pub fn warn_at(&mut self, iteration: usize, message: impl Into<String>) {
        let issue = Issue::new(Severity::Warning, message).at_iteration(iteration);
        log::warn!("{}", issue);
        self.add(issue);
    }

    /// Record a critical issue; the run is invalid from here on.
    pub fn critical_at(&mut self, iteration: usize, message: impl Into<String>) {
        let issue = Issue::new(Severity::Critical, message).at_iteration(iteration);
        log::error!("{}", issue);
        self.add(issue);
    }

    /// First critical issue, if any.
    pub fn first_critical(&self) -> Option<&Issue> {
        self.issues.iter().find(|i| i.severity == Severity::Critical)
    }

    /// No critical issue was recorded.
    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == Severity::Critical)
    }

    /// Any warnings (or worse) recorded.
    pub fn has_warnings(&self) -> bool {
        self.issues.iter().any(|i| i.severity >= Severity::Warning)
    }

    /// Nothing recorded at all.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Count issues by severity.
    pub fn counts(&self) -> HashMap<Severity, usize> {
        let mut counts = HashMap::new();
        for issue in &self.issues {
            *counts.entry(issue.severity).or_default() += 1;
        }
        counts
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_clean() {
            return write!(f, "no issues");
        }

        let counts = self.counts();
        let parts: Vec<String> = [
            (Severity::Critical, "critical"),
            (Severity::Warning, "warnings"),
            (Severity::Info, "info"),
        ]
        .iter()
        .filter_map(|(sev, name)| counts.get(sev).map(|c| format!("{} {}", c, name)))
        .collect();

        writeln!(f, "{}", parts.join(", "))?;
        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }
        Ok(())
    }
}
