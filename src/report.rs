//! Result reporting: per-operation statuses folded into one [`Outcome`].

use serde::Serialize;
use std::fmt;

/// Outcome of one operation against one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "kebab-case")]
pub enum PatchStatus {
    Inserted,
    Updated,
    Removed,
    Unchanged,
    /// The target configuration does not exist in the document.
    SkippedNotFound,
    /// The key is missing and the operation does not insert it.
    SkippedAbsent,
    Failed(String),
}

impl PatchStatus {
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            PatchStatus::Inserted | PatchStatus::Updated | PatchStatus::Removed
        )
    }
}

impl fmt::Display for PatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchStatus::Inserted => write!(f, "inserted"),
            PatchStatus::Updated => write!(f, "updated"),
            PatchStatus::Removed => write!(f, "removed"),
            PatchStatus::Unchanged => write!(f, "unchanged"),
            PatchStatus::SkippedNotFound => write!(f, "skipped (configuration not found)"),
            PatchStatus::SkippedAbsent => write!(f, "skipped (setting absent)"),
            PatchStatus::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Something the caller should look at even though processing continued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Anomaly {
    /// The key occurred several times in one block; only the first was patched.
    DuplicateKey {
        block: String,
        key: String,
        occurrences: usize,
    },
    /// Brackets inside the block do not balance; its operations were not applied.
    MalformedBlock { block: String, reason: String },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::DuplicateKey {
                block,
                key,
                occurrences,
            } => write!(
                f,
                "{key} appears {occurrences} times in {block}; only the first was patched"
            ),
            Anomaly::MalformedBlock { block, reason } => {
                write!(f, "{block} is malformed: {reason}")
            }
        }
    }
}

/// Per (block, operation) result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchResult {
    pub operation: String,
    pub block: String,
    #[serde(flatten)]
    pub status: PatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<Anomaly>,
}

impl PatchResult {
    pub fn new(operation: impl Into<String>, block: impl Into<String>, status: PatchStatus) -> Self {
        Self {
            operation: operation.into(),
            block: block.into(),
            status,
            anomaly: None,
        }
    }

    pub fn with_anomaly(mut self, anomaly: Anomaly) -> Self {
        self.anomaly = Some(anomaly);
        self
    }
}

impl fmt::Display for PatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.operation, self.block, self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Outcome {
    pub any_changed: bool,
    pub details: Vec<PatchResult>,
    pub anomalies: Vec<Anomaly>,
}

/// Tallies for status lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Counts {
    pub changed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Outcome {
    pub fn counts(&self) -> Counts {
        let mut counts = Counts::default();
        for result in &self.details {
            match result.status {
                PatchStatus::Inserted | PatchStatus::Updated | PatchStatus::Removed => {
                    counts.changed += 1
                }
                PatchStatus::Unchanged => counts.unchanged += 1,
                PatchStatus::SkippedNotFound | PatchStatus::SkippedAbsent => counts.skipped += 1,
                PatchStatus::Failed(_) => counts.failed += 1,
            }
        }
        counts
    }

    pub fn has_failures(&self) -> bool {
        self.details
            .iter()
            .any(|result| matches!(result.status, PatchStatus::Failed(_)))
    }
}

/// Fold results into an [`Outcome`], keeping their order.
pub fn summarize(results: Vec<PatchResult>) -> Outcome {
    let any_changed = results.iter().any(|result| result.status.is_change());
    let anomalies = results
        .iter()
        .filter_map(|result| result.anomaly.clone())
        .collect();
    Outcome {
        any_changed,
        details: results,
        anomalies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_any_changed() {
        let outcome = summarize(vec![
            PatchResult::new("a", "Debug", PatchStatus::Unchanged),
            PatchResult::new("b", "Profile", PatchStatus::SkippedNotFound),
        ]);
        assert!(!outcome.any_changed);

        let outcome = summarize(vec![
            PatchResult::new("a", "Debug", PatchStatus::Unchanged),
            PatchResult::new("b", "Debug", PatchStatus::Removed),
        ]);
        assert!(outcome.any_changed);
        assert_eq!(outcome.counts().changed, 1);
    }

    #[test]
    fn test_summarize_collects_anomalies_in_order() {
        let duplicate = Anomaly::DuplicateKey {
            block: "Debug (X)".to_string(),
            key: "OTHER_LDFLAGS".to_string(),
            occurrences: 2,
        };
        let outcome = summarize(vec![
            PatchResult::new("a", "Debug (X)", PatchStatus::Updated).with_anomaly(duplicate.clone()),
            PatchResult::new("b", "Release", PatchStatus::Failed("bad".to_string())),
        ]);
        assert_eq!(outcome.anomalies, vec![duplicate]);
        assert!(outcome.has_failures());
        assert_eq!(outcome.details[1].operation, "b");
    }

    #[test]
    fn test_status_json_shape() {
        let result = PatchResult::new("ld", "Debug (X)", PatchStatus::SkippedNotFound);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "skipped-not-found");
        assert_eq!(json["operation"], "ld");
        assert!(json.get("anomaly").is_none());

        let failed = PatchResult::new("ld", "Debug", PatchStatus::Failed("oops".to_string()));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "oops");
    }
}
