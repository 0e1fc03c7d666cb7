//! PBX Patcher: idempotent build-setting patches for Xcode projects
//!
//! Rewrites settings inside the `XCBuildConfiguration` blocks of a `project.pbxproj`
//! so a native library can be linked differently per configuration and SDK, without
//! disturbing any byte outside the settings it touches.
//!
//! # Architecture
//!
//! - [`pbx::scanner`] tokenizes the property-list text and matches brackets.
//! - [`pbx::locator`] finds configuration blocks by their anchor.
//! - [`pbx::patcher`] inserts, updates, appends to or removes one setting per call,
//!   always through a verified [`Edit`] bounded by the block span.
//! - [`config::applicator`] runs an ordered [`PatchPlan`] and persists the result.
//! - [`snapshot`] writes the backup before the document is overwritten.
//! - [`report`] folds per-operation results into an [`Outcome`].
//!
//! # Safety
//!
//! - Edits verify expected before-text and stay inside their block
//! - Backup first, then atomic write (tempfile + fsync + rename)
//! - Bracket balance is re-checked before anything is written
//! - Re-running a plan is a no-op
//!
//! # Example
//!
//! ```no_run
//! use pbx_patcher::{apply_plan, resolve_plan, ApplyOptions};
//!
//! let plan = resolve_plan("conditional-linking")?;
//! let report = apply_plan(
//!     "App.xcodeproj/project.pbxproj",
//!     &plan,
//!     &ApplyOptions::default(),
//! )?;
//! for result in &report.outcome.details {
//!     println!("{result}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod document;
pub mod edit;
pub mod pbx;
pub mod report;
pub mod snapshot;

// Re-exports
pub use config::{
    apply_plan, builtin, builtin_names, execute, load_from_path, load_from_str, resolve_plan,
    ApplyOptions, ApplyReport, ConfigError, EngineError, PatchPlan, PlanOrigin, PlanStep,
};
pub use document::{Document, DocumentError};
pub use edit::{Edit, EditError, EditResult, EditVerification};
pub use pbx::{
    locate, AbsentPolicy, BlockMatch, BlockSelector, ConfigBlock, PatchOperation, SettingChange,
    SettingValue,
};
pub use report::{summarize, Anomaly, Outcome, PatchResult, PatchStatus};
pub use snapshot::{restore, snapshot, BackupHandle, SnapshotError, DEFAULT_BACKUP_SUFFIX};
