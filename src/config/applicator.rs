//! Plan executor - applies plan steps to a document and persists the result
//!
//! This module provides:
//! - In-memory execution of ordered plan steps across every matched block
//! - Non-fatal handling of missing and malformed configurations
//! - A write-back session that snapshots before it overwrites anything

use crate::config::schema::{PatchPlan, PlanStep, ValidationError};
use crate::document::{Document, DocumentError};
use crate::pbx::{self, check_balance, locate, BlockMatch, PatchError, ScanError};
use crate::report::{summarize, Anomaly, Outcome, PatchResult, PatchStatus};
use crate::snapshot::{snapshot, BackupHandle, SnapshotError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Fatal errors: the document on disk is left exactly as it was.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("invalid patch plan: {0}")]
    InvalidPlan(#[from] ValidationError),

    #[error("patching would unbalance the document's brackets: {0}")]
    BalanceViolated(ScanError),

    #[error("{path} changed on disk while it was being patched")]
    ConcurrentModification { path: PathBuf },
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Compute the outcome without writing a backup or the document.
    pub dry_run: bool,
    /// Overrides the plan's backup suffix.
    pub backup_suffix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub outcome: Outcome,
    /// Present when the document was written.
    pub backup: Option<BackupHandle>,
    pub original: String,
    pub patched: String,
}

impl ApplyReport {
    pub fn committed(&self) -> bool {
        self.backup.is_some()
    }
}

/// Execute `steps` in order against the in-memory document.
///
/// Missing configurations are reported as `skipped-not-found` and malformed ones as
/// failures; neither stops the remaining steps. Nothing is written to disk.
pub fn execute(document: &mut Document, steps: &[PlanStep]) -> Vec<PatchResult> {
    let mut results = Vec::new();
    for step in steps {
        results.extend(execute_step(document.text_mut(), step));
    }
    results
}

fn execute_step(text: &mut String, step: &PlanStep) -> Vec<PatchResult> {
    let operation = &step.operation;
    let matches = match locate(text, &step.selector) {
        Ok(matches) => matches,
        Err(error) => {
            let block = step.selector.to_string();
            tracing::warn!(operation = %operation.id, %error, "document cannot be scanned");
            return vec![
                PatchResult::new(&operation.id, &block, PatchStatus::Failed(error.to_string()))
                    .with_anomaly(Anomaly::MalformedBlock {
                        block: block.clone(),
                        reason: error.to_string(),
                    }),
            ];
        }
    };

    if matches.is_empty() {
        tracing::debug!(
            operation = %operation.id,
            block = %step.selector,
            "configuration not found"
        );
        return vec![PatchResult::new(
            &operation.id,
            step.selector.to_string(),
            PatchStatus::SkippedNotFound,
        )];
    }

    // Patch bottom-to-top so offsets of earlier blocks stay valid.
    let mut results: Vec<PatchResult> = matches
        .iter()
        .rev()
        .map(|block| apply_to_block(text, block, operation))
        .collect();
    results.reverse();
    results
}

fn apply_to_block(
    text: &mut String,
    block: &BlockMatch,
    operation: &pbx::PatchOperation,
) -> PatchResult {
    let label = block.label();
    let block = match block {
        BlockMatch::Found(block) => block,
        BlockMatch::Malformed { error, .. } => {
            return malformed(&operation.id, label, error.to_string());
        }
    };

    let result = match pbx::apply(text, block, operation) {
        Ok(patch) => {
            let mut result = PatchResult::new(&operation.id, &label, patch.status);
            if patch.occurrences > 1 {
                result = result.with_anomaly(Anomaly::DuplicateKey {
                    block: label.clone(),
                    key: operation.key.clone(),
                    occurrences: patch.occurrences,
                });
            }
            result
        }
        Err(PatchError::Scan(error)) => return malformed(&operation.id, label, error.to_string()),
        Err(error) => {
            PatchResult::new(&operation.id, &label, PatchStatus::Failed(error.to_string()))
        }
    };

    tracing::debug!(
        operation = %result.operation,
        block = %result.block,
        status = %result.status,
        "operation applied"
    );
    if let Some(anomaly) = &result.anomaly {
        tracing::warn!(%anomaly, "anomaly detected");
    }
    result
}

fn malformed(operation: &str, block: String, reason: String) -> PatchResult {
    tracing::warn!(%operation, %block, %reason, "malformed configuration block");
    PatchResult::new(operation, &block, PatchStatus::Failed(reason.clone()))
        .with_anomaly(Anomaly::MalformedBlock { block, reason })
}

/// Load the document at `path`, run `plan`, and write it back when something changed.
///
/// The backup is written before the document; if the backup fails, the document is not
/// touched. Runs against the same path must not overlap.
pub fn apply_plan(
    path: impl AsRef<Path>,
    plan: &PatchPlan,
    options: &ApplyOptions,
) -> Result<ApplyReport, EngineError> {
    let path = path.as_ref();
    let steps = plan.steps()?;
    let mut document = Document::load(path)?;

    tracing::info!(
        plan = %plan.meta.name,
        path = %path.display(),
        steps = steps.len(),
        "executing patch plan"
    );
    let outcome = summarize(execute(&mut document, &steps));

    if check_balance(document.original()).is_ok() {
        check_balance(document.text()).map_err(EngineError::BalanceViolated)?;
    }

    let mut backup = None;
    if outcome.any_changed && !options.dry_run {
        let suffix = options
            .backup_suffix
            .as_deref()
            .unwrap_or_else(|| plan.backup_suffix());
        let handle = snapshot(path, suffix)?;
        if handle.digest != Some(xxh3_64(document.original().as_bytes())) {
            return Err(EngineError::ConcurrentModification {
                path: path.to_path_buf(),
            });
        }
        document.commit()?;
        backup = Some(handle);
    }

    Ok(ApplyReport {
        outcome,
        backup,
        original: document.original().to_string(),
        patched: document.text().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pbx::{BlockSelector, PatchOperation, SettingValue};

    const PROJECT: &str = "\
\t\tAA /* Debug */ = {
\t\t\tisa = XCBuildConfiguration;
\t\t\tbuildSettings = {
\t\t\t\tSWIFT_VERSION = 5.0;
\t\t\t};
\t\t\tname = Debug;
\t\t};
\t\tBB /* Release */ = {
\t\t\tisa = XCBuildConfiguration;
\t\t\tbuildSettings = {
\t\t\t\tSWIFT_VERSION = 5.0;
\t\t\t};
\t\t\tname = Release;
\t\t};
";

    fn flags(selector: BlockSelector) -> PlanStep {
        PlanStep::new(
            selector,
            PatchOperation::replace("ld", "OTHER_LDFLAGS", SettingValue::scalar("-lfoo")),
        )
    }

    #[test]
    fn test_execute_all_blocks_in_document_order() {
        let mut document = Document::from_text("project.pbxproj", PROJECT);
        let results = execute(&mut document, &[flags(BlockSelector::all())]);
        let blocks: Vec<_> = results.iter().map(|result| result.block.as_str()).collect();
        assert_eq!(blocks, vec!["Debug (AA)", "Release (BB)"]);
        assert!(results
            .iter()
            .all(|result| result.status == PatchStatus::Inserted));
        assert_eq!(document.text().matches("OTHER_LDFLAGS = \"-lfoo\";").count(), 2);
    }

    #[test]
    fn test_execute_missing_block_continues() {
        let mut document = Document::from_text("project.pbxproj", PROJECT);
        let results = execute(
            &mut document,
            &[
                flags(BlockSelector::named("Profile")),
                flags(BlockSelector::named("Release")),
            ],
        );
        assert_eq!(results[0].status, PatchStatus::SkippedNotFound);
        assert_eq!(results[0].block, "Profile");
        assert_eq!(results[1].status, PatchStatus::Inserted);
    }

    #[test]
    fn test_execute_later_step_sees_earlier_insert() {
        let mut document = Document::from_text("project.pbxproj", PROJECT);
        let steps = [
            PlanStep::new(
                BlockSelector::named("Debug"),
                PatchOperation::replace("init", "OTHER_LDFLAGS", SettingValue::list(["$(inherited)"])),
            ),
            PlanStep::new(
                BlockSelector::named("Debug"),
                PatchOperation::append("add", "OTHER_LDFLAGS", ["-lbar"]).skip_if_absent(),
            ),
        ];
        let results = execute(&mut document, &steps);
        assert_eq!(results[0].status, PatchStatus::Inserted);
        assert_eq!(results[1].status, PatchStatus::Updated);
        assert!(document
            .text()
            .contains("\"$(inherited)\",\n\t\t\t\t\t\"-lbar\",\n\t\t\t\t);"));
    }

    #[test]
    fn test_execute_unscannable_document() {
        let mut document = Document::from_text("project.pbxproj", "AA = { isa = \"broken;");
        let results = execute(&mut document, &[flags(BlockSelector::named("Debug"))]);
        assert!(matches!(results[0].status, PatchStatus::Failed(_)));
        assert!(matches!(
            results[0].anomaly,
            Some(Anomaly::MalformedBlock { .. })
        ));
        assert!(!document.is_modified());
    }
}
