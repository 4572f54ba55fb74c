use std::io::ErrorKind;
use std::path::Path;

use serde_json::Value;

use crate::managers::manager::ManagerResult;
use crate::models::{CoreError, CoreErrorKind, ManagerAction, ManagerId};

/// Read a manifest or lock artifact from the project root.
///
/// A missing file maps to `missing`; any other I/O failure is reported as the
/// file being malformed, since the check cannot tell the two apart usefully.
pub(crate) fn read_project_file(
    manager: ManagerId,
    action: ManagerAction,
    root: &Path,
    file_name: &str,
    missing: CoreErrorKind,
    unreadable: CoreErrorKind,
) -> ManagerResult<String> {
    let path = root.join(file_name);
    std::fs::read_to_string(&path).map_err(|error| {
        let (kind, message) = if error.kind() == ErrorKind::NotFound {
            (missing, format!("can not find {file_name} in {}", root.display()))
        } else {
            (
                unreadable,
                format!("can not read {}: {error}", path.display()),
            )
        };
        CoreError::for_manager(manager, action, kind, message)
    })
}

pub(crate) fn parse_json(
    manager: ManagerId,
    action: ManagerAction,
    file_name: &str,
    contents: &str,
    malformed: CoreErrorKind,
) -> ManagerResult<Value> {
    serde_json::from_str(contents).map_err(|error| {
        CoreError::for_manager(
            manager,
            action,
            malformed,
            format!("{file_name} is not valid JSON: {error}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_the_missing_kind() {
        let dir = tempfile::tempdir().unwrap();
        let error = read_project_file(
            ManagerId::Composer,
            ManagerAction::FindInstalled,
            dir.path(),
            "composer.lock",
            CoreErrorKind::LockNotFound,
            CoreErrorKind::LockMalformed,
        )
        .unwrap_err();

        assert_eq!(error.kind, CoreErrorKind::LockNotFound);
        assert_eq!(error.manager, Some(ManagerId::Composer));
        assert!(error.message.contains("composer.lock"));
    }

    #[test]
    fn invalid_json_uses_the_malformed_kind() {
        let error = parse_json(
            ManagerId::Npm,
            ManagerAction::FindRequired,
            "package.json",
            "{not json",
            CoreErrorKind::ConfigMalformed,
        )
        .unwrap_err();

        assert_eq!(error.kind, CoreErrorKind::ConfigMalformed);
        assert!(error.message.starts_with("package.json is not valid JSON"));
    }
}
