use crate::pbx::{AbsentPolicy, BlockSelector, PatchOperation, SettingChange, SettingValue};
use crate::snapshot::DEFAULT_BACKUP_SUFFIX;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

/// A named, ordered list of setting changes, as written in a plan file.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchPlan {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub operations: Vec<OperationDefinition>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub backup_suffix: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OperationDefinition {
    pub id: String,
    pub block: String,
    #[serde(default)]
    pub object_id: Option<String>,
    pub key: String,
    #[serde(default)]
    pub policy: ValuePolicy,
    #[serde(default)]
    pub value: Option<SettingValue>,
    #[serde(default)]
    pub absent: AbsentPolicy,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ValuePolicy {
    #[default]
    Replace,
    Append,
    Remove,
    RemoveElements,
}

/// One validated operation bound to the blocks it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub selector: BlockSelector,
    pub operation: PatchOperation,
}

impl PlanStep {
    pub fn new(selector: BlockSelector, operation: PatchOperation) -> Self {
        Self {
            selector,
            operation,
        }
    }
}

impl PatchPlan {
    pub fn backup_suffix(&self) -> &str {
        self.meta
            .backup_suffix
            .as_deref()
            .filter(|suffix| !suffix.trim().is_empty())
            .unwrap_or(DEFAULT_BACKUP_SUFFIX)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.steps().map(|_| ())
    }

    /// Convert every definition into an executable step, reporting all problems at once.
    pub fn steps(&self) -> Result<Vec<PlanStep>, ValidationError> {
        let mut issues = Vec::new();
        let mut steps = Vec::with_capacity(self.operations.len());
        let mut seen = HashSet::new();

        if self.operations.is_empty() {
            issues.push(ValidationIssue::EmptyOperationList);
        }

        for definition in &self.operations {
            let id = definition.id.trim();
            let op_id = (!id.is_empty()).then(|| id.to_string());

            if id.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    operation_id: None,
                    field: "id",
                });
            } else if !seen.insert(id) {
                issues.push(ValidationIssue::DuplicateId { id: id.to_string() });
            }
            if definition.block.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    operation_id: op_id.clone(),
                    field: "block",
                });
            }
            if definition.key.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    operation_id: op_id.clone(),
                    field: "key",
                });
            }

            let change = match (definition.policy, &definition.value) {
                (ValuePolicy::Replace, Some(value)) => Some(SettingChange::Replace(value.clone())),
                (
                    policy @ (ValuePolicy::Append | ValuePolicy::RemoveElements),
                    Some(SettingValue::List(elements)),
                ) if elements.is_empty() => {
                    let name = if policy == ValuePolicy::Append {
                        "append"
                    } else {
                        "remove-elements"
                    };
                    issues.push(ValidationIssue::InvalidCombo {
                        operation_id: op_id.clone(),
                        message: format!("{name} requires at least one element"),
                    });
                    None
                }
                (ValuePolicy::Append, Some(value)) => Some(SettingChange::Append(
                    value.elements().into_iter().map(str::to_string).collect(),
                )),
                (ValuePolicy::RemoveElements, Some(value)) => Some(SettingChange::RemoveElements(
                    value.elements().into_iter().map(str::to_string).collect(),
                )),
                (ValuePolicy::Replace | ValuePolicy::Append | ValuePolicy::RemoveElements, None) => {
                    issues.push(ValidationIssue::MissingField {
                        operation_id: op_id.clone(),
                        field: "value",
                    });
                    None
                }
                (ValuePolicy::Remove, None) => Some(SettingChange::Remove),
                (ValuePolicy::Remove, Some(_)) => {
                    issues.push(ValidationIssue::InvalidCombo {
                        operation_id: op_id.clone(),
                        message: "remove does not take a value".to_string(),
                    });
                    None
                }
            };

            if let Some(change) = change {
                steps.push(PlanStep {
                    selector: BlockSelector::parse(
                        &definition.block,
                        definition.object_id.as_deref(),
                    ),
                    operation: PatchOperation {
                        id: id.to_string(),
                        key: definition.key.trim().to_string(),
                        change,
                        absent: definition.absent,
                    },
                });
            }
        }

        if issues.is_empty() {
            Ok(steps)
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyOperationList,
    MissingField {
        operation_id: Option<String>,
        field: &'static str,
    },
    DuplicateId {
        id: String,
    },
    InvalidCombo {
        operation_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyOperationList => write!(f, "patch plan contains no operations"),
            ValidationIssue::MissingField {
                operation_id,
                field,
            } => match operation_id {
                Some(id) => write!(f, "operation '{id}' missing required field '{field}'"),
                None => write!(f, "operation missing required field '{field}'"),
            },
            ValidationIssue::DuplicateId { id } => {
                write!(f, "operation id '{id}' is used more than once")
            }
            ValidationIssue::InvalidCombo {
                operation_id,
                message,
            } => match operation_id {
                Some(id) => write!(f, "operation '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid operation configuration: {message}"),
            },
        }
    }
}
