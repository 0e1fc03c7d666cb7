//! Plans shipped with the binary.

use crate::config::loader::{load_from_path, parse, ConfigError, PlanOrigin};
use std::io;
use crate::config::schema::PatchPlan;

const BUILTIN_PLANS: &[(&str, &str)] = &[
    (
        "basic-linking",
        include_str!("../../plans/basic-linking.toml"),
    ),
    (
        "conditional-linking",
        include_str!("../../plans/conditional-linking.toml"),
    ),
    ("xcframework", include_str!("../../plans/xcframework.toml")),
];

pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTIN_PLANS.iter().map(|(name, _)| *name)
}

/// Load a built-in plan by name.
pub fn builtin(name: &str) -> Option<Result<PatchPlan, ConfigError>> {
    BUILTIN_PLANS
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(builtin, source)| parse(source, PlanOrigin::Builtin(builtin.to_string())))
}

/// A built-in name, or else a path to a plan file.
pub fn resolve_plan(name_or_path: &str) -> Result<PatchPlan, ConfigError> {
    match builtin(name_or_path) {
        Some(plan) => plan,
        None => load_from_path(name_or_path).map_err(|error| match error {
            ConfigError::Unreadable { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                ConfigError::UnknownPlan {
                    name: name_or_path.to_string(),
                    known: builtin_names().collect::<Vec<_>>().join(", "),
                    source,
                }
            }
            other => other,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_load_and_validate() {
        for name in builtin_names() {
            let plan = builtin(name)
                .expect("listed")
                .unwrap_or_else(|err| panic!("{name}: {err}"));
            assert_eq!(plan.meta.name, name);
            assert!(!plan.steps().unwrap().is_empty());
        }
    }

    #[test]
    fn test_builtin_backup_suffixes() {
        let plan = builtin("xcframework").unwrap().unwrap();
        assert_eq!(plan.backup_suffix(), ".xcframework_backup");
    }

    #[test]
    fn test_resolve_unknown_lists_builtins() {
        let err = resolve_plan("no-such-plan").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPlan { .. }));
        let message = err.to_string();
        assert!(message.contains("'no-such-plan'"));
        assert!(message.contains("basic-linking, conditional-linking, xcframework"));
    }

    #[test]
    fn test_resolve_plan_file_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("strip.toml");
        std::fs::write(
            &path,
            "[[operations]]\nid = \"strip\"\nblock = \"*\"\nkey = \"STRIP_INSTALLED_PRODUCT\"\nvalue = \"NO\"\n",
        )
        .unwrap();
        let plan = resolve_plan(path.to_str().unwrap()).unwrap();
        assert_eq!(plan.operations.len(), 1);
    }
}
