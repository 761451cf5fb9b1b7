//! Check reports printed by the CLI.
//!
//! A [`Report`] is an ordered list of named [`Check`]s. It is used both for
//! dry-run validation of a conversion file and for the per-adapter outcome of
//! a conversion (committed, failed or never run).


use std::fmt;

#[cfg(feature = "colorized_output")]
use console::style;

use crate::orchestrator::{ConversionError, ConversionReport};

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    /// Passed
    Ok,
    /// Passed, with a remark
    Warning(String),
    /// Failed
    Failed(String),
    /// Not attempted because an earlier check failed
    Skipped(String),
}

impl CheckStatus {
    fn symbol(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "✓",
            CheckStatus::Warning(_) => "⚠",
            CheckStatus::Failed(_) => "✗",
            CheckStatus::Skipped(_) => "-",
        }
    }

    fn label_and_message(&self) -> Option<(&'static str, &str)> {
        match self {
            CheckStatus::Ok => None,
            CheckStatus::Warning(msg) => Some(("WARNING", msg)),
            CheckStatus::Failed(msg) => Some(("FAILED", msg)),
            CheckStatus::Skipped(msg) => Some(("SKIPPED", msg)),
        }
    }
}

/// One named check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    /// What was checked
    pub name: String,
    /// Outcome
    pub status: CheckStatus,
}

impl Check {
    /// A passed check.
    pub fn ok(name: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Ok)
    }

    /// A passed check with a remark.
    pub fn warning(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Warning(message.into()))
    }

    /// A failed check.
    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Failed(message.into()))
    }

    /// A check that was not attempted.
    pub fn skipped(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Skipped(message.into()))
    }

    fn with_status(name: impl Into<String>, status: CheckStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}

/// Ordered list of checks about one subject (a file or a store)
#[derive(Debug, Clone)]
pub struct Report {
    /// Heading
    pub title: String,
    /// What the checks are about
    pub subject: String,
    /// Checks in the order they ran
    pub checks: Vec<Check>,
}

impl Report {
    /// An empty report.
    pub fn new(title: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subject: subject.into(),
            checks: Vec::new(),
        }
    }

    /// Append a check.
    pub fn push(&mut self, check: Check) {
        self.checks.push(check);
    }

    /// Append every check of `other`, prefixing names with `prefix`.
    pub fn extend_prefixed(&mut self, prefix: &str, other: Report) {
        self.checks.extend(other.checks.into_iter().map(|mut check| {
            check.name = format!("{prefix}: {}", check.name);
            check
        }));
    }

    /// Per-adapter outcome of a successful conversion.
    pub fn from_conversion(labels: &[String], report: &ConversionReport) -> Self {
        let mut out = Self::new("Conversion Report", report.output.display().to_string());
        for label in labels {
            if report.committed.contains(label) {
                out.push(Check::ok(label.as_str()));
            } else {
                out.push(Check::skipped(label.as_str(), "not registered"));
            }
        }
        out
    }

    /// Per-adapter outcome of a failed conversion.
    pub fn from_failure(labels: &[String], output: &str, error: &ConversionError) -> Self {
        let mut out = Self::new("Conversion Report", output);
        let committed = error.committed();
        let failing = match error {
            ConversionError::AdapterExecution { label, .. } => Some(label.as_str()),
            _ => None,
        };

        let mut reached_failure = false;
        for label in labels {
            if committed.contains(label) {
                out.push(Check::ok(label.as_str()));
            } else if Some(label.as_str()) == failing {
                out.push(Check::failed(label.as_str(), error.to_string()));
                reached_failure = true;
            } else if !reached_failure && matches!(error, ConversionError::Cancelled { .. }) {
                out.push(Check::failed(label.as_str(), "cancelled"));
                reached_failure = true;
            } else {
                out.push(Check::skipped(label.as_str(), "not run"));
            }
        }
        if committed.is_empty() && failing.is_none() && !reached_failure {
            out.push(Check::failed("conversion", error.to_string()));
        }
        out
    }

    /// True if any check failed.
    pub fn has_failures(&self) -> bool {
        self.count(|s| matches!(s, CheckStatus::Failed(_))) > 0
    }

    /// True if any check warned.
    pub fn has_warnings(&self) -> bool {
        self.count(|s| matches!(s, CheckStatus::Warning(_))) > 0
    }

    fn count(&self, pred: impl Fn(&CheckStatus) -> bool) -> usize {
        self.checks.iter().filter(|c| pred(&c.status)).count()
    }

    fn summary(&self) -> (usize, usize, usize, usize) {
        (
            self.count(|s| *s == CheckStatus::Ok),
            self.count(|s| matches!(s, CheckStatus::Warning(_))),
            self.count(|s| matches!(s, CheckStatus::Failed(_))),
            self.count(|s| matches!(s, CheckStatus::Skipped(_))),
        )
    }

    fn verdict(&self) -> &'static str {
        if self.has_failures() {
            "FAILED"
        } else if self.has_warnings() {
            "PASSED with warnings"
        } else {
            "PASSED"
        }
    }

    /// Render with colours (plain `Display` without `colorized_output`).
    pub fn format_colored(&self) -> String {
        #[cfg(feature = "colorized_output")]
        {
            use console::Emoji;

            let mut output = String::new();
            let rule = "=".repeat(self.title.chars().count());
            output.push_str(&format!("{}\n", style(&self.title).bold().cyan()));
            output.push_str(&format!("{}\n", style(rule).cyan()));
            output.push_str(&format!("{}: {}\n\n", style("Subject").bold(), self.subject));

            for check in &self.checks {
                let symbol = check.status.symbol();
                let (emoji, name) = match &check.status {
                    CheckStatus::Ok => (Emoji(symbol, "[OK]"), style(check.name.as_str()).green()),
                    CheckStatus::Warning(_) => {
                        (Emoji(symbol, "[WARN]"), style(check.name.as_str()).yellow())
                    }
                    CheckStatus::Failed(_) => (Emoji(symbol, "[FAIL]"), style(check.name.as_str()).red()),
                    CheckStatus::Skipped(_) => (Emoji(symbol, "[SKIP]"), style(check.name.as_str()).dim()),
                };
                output.push_str(&format!("[{}] {}", emoji, name));
                match check.status.label_and_message() {
                    None => output.push('\n'),
                    Some((label, msg)) => {
                        output.push_str(&format!(" - {}: {}\n", style(label).bold(), msg))
                    }
                }
            }

            let (ok, warn, failed, skipped) = self.summary();
            output.push_str(&format!(
                "\n{}: {} passed, {} warnings, {} failed, {} skipped\n\n",
                style("Summary").bold(),
                style(ok).green(),
                style(warn).yellow(),
                style(failed).red(),
                style(skipped).dim()
            ));
            let verdict = format!("{} {}", self.title, self.verdict());
            let verdict = if self.has_failures() {
                style(verdict).red().bold()
            } else if self.has_warnings() {
                style(verdict).yellow().bold()
            } else {
                style(verdict).green().bold()
            };
            output.push_str(&format!("{}\n", verdict));
            output
        }

        #[cfg(not(feature = "colorized_output"))]
        {
            self.to_string()
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", "=".repeat(self.title.chars().count()))?;
        writeln!(f, "Subject: {}", self.subject)?;
        writeln!(f)?;

        for check in &self.checks {
            write!(f, "[{}] {}", check.status.symbol(), check.name)?;
            match check.status.label_and_message() {
                None => writeln!(f)?,
                Some((label, msg)) => writeln!(f, " - {}: {}", label, msg)?,
            }
        }

        let (ok, warn, failed, skipped) = self.summary();
        writeln!(f)?;
        writeln!(
            f,
            "Summary: {} passed, {} warnings, {} failed, {} skipped",
            ok, warn, failed, skipped
        )?;
        writeln!(f)?;
        writeln!(f, "{} {}", self.title, self.verdict())
    }
}
