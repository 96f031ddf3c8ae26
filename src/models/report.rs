use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Outcome {
    /// `note` carries anything worth showing next to the row, such as a
    /// declared approval document that needed no write.
    Updated { note: Option<String> },
    Skipped { reason: String },
    Error { detail: String },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Updated { .. } => "UPDATED",
            Outcome::Skipped { .. } => "SKIPPED",
            Outcome::Error { .. } => "ERROR",
        }
    }

    fn detail(&self) -> &str {
        match self {
            Outcome::Updated { note } => note.as_deref().unwrap_or_default(),
            Outcome::Skipped { reason } => reason,
            Outcome::Error { detail } => detail,
        }
    }
}

/// Result recorded for one worklist item. `environment` is `None` when the
/// failure happened before the project's environments could be listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    pub project: String,
    pub environment: Option<String>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub items: Vec<ItemResult>,
    /// Set when the run ended early on `quit` or an interrupt.
    pub cancelled: bool,
}

impl Report {
    pub fn record(&mut self, project: &str, environment: Option<&str>, outcome: Outcome) {
        match &outcome {
            Outcome::Updated { note: None } => {
                tracing::info!(project, environment, "updated")
            }
            Outcome::Updated { note: Some(note) } => {
                tracing::info!(project, environment, %note, "updated")
            }
            Outcome::Skipped { reason } => {
                tracing::info!(project, environment, %reason, "skipped")
            }
            Outcome::Error { detail } => {
                tracing::error!(project, environment, %detail, "operation failed")
            }
        }
        self.items.push(ItemResult {
            project: project.to_string(),
            environment: environment.map(String::from),
            outcome,
        });
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Updated { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped { .. }))
    }

    pub fn errored(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Error { .. }))
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.outcome)).count()
    }

    pub fn log_summary(&self) {
        tracing::info!(
            updated = self.updated(),
            skipped = self.skipped(),
            errors = self.errored(),
            cancelled = self.cancelled,
            "run complete"
        );
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cancelled {
            writeln!(f, "Run cancelled; results so far:")?;
        } else {
            writeln!(f, "Update complete!")?;
        }
        if !self.items.is_empty() {
            writeln!(f, "{:<24} {:<20} {:<8} DETAIL", "PROJECT", "ENVIRONMENT", "RESULT")?;
            for item in &self.items {
                writeln!(
                    f,
                    "{:<24} {:<20} {:<8} {}",
                    item.project,
                    item.environment.as_deref().unwrap_or("-"),
                    item.outcome.label(),
                    item.outcome.detail()
                )?;
            }
        }
        writeln!(f, "Environments updated: {}", self.updated())?;
        writeln!(f, "Environments skipped: {}", self.skipped())?;
        write!(f, "Errors encountered: {}", self.errored())
    }
}
