pub mod applicator;
pub mod loader;
pub mod presets;
pub mod schema;

pub use applicator::{apply_plan, execute, ApplyOptions, ApplyReport, EngineError};
pub use loader::{load_from_path, load_from_str, ConfigError, PlanOrigin};
pub use presets::{builtin, builtin_names, resolve_plan};
pub use schema::{
    Metadata, OperationDefinition, PatchPlan, PlanStep, ValidationError, ValidationIssue,
    ValuePolicy,
};
