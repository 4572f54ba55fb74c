use crate::models::ManagerId;
use crate::version::{CompareMode, VersionError, is_later};

#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct PackageRef {
    pub manager: ManagerId,
    pub name: String,
}

/// One dependency of the checked project, as seen by one manager.
///
/// Facts are added as discovery progresses: the manifest marks it required,
/// the lock artifact marks it installed and the ecosystem tool may mark it
/// updatable. A package is never replaced, only marked further.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Package {
    package: PackageRef,
    required_version: Option<String>,
    installed_version: Option<String>,
    installed_reference: Option<String>,
    updatable_version: Option<String>,
}

impl Package {
    pub fn new(manager: ManagerId, name: impl Into<String>) -> Self {
        Self {
            package: PackageRef {
                manager,
                name: name.into(),
            },
            required_version: None,
            installed_version: None,
            installed_reference: None,
            updatable_version: None,
        }
    }

    pub fn package_ref(&self) -> &PackageRef {
        &self.package
    }

    pub fn manager(&self) -> ManagerId {
        self.package.manager
    }

    pub fn name(&self) -> &str {
        &self.package.name
    }

    pub fn required_version(&self) -> Option<&str> {
        self.required_version.as_deref()
    }

    pub fn installed_version(&self) -> Option<&str> {
        self.installed_version.as_deref()
    }

    pub fn installed_reference(&self) -> Option<&str> {
        self.installed_reference.as_deref()
    }

    pub fn updatable_version(&self) -> Option<&str> {
        self.updatable_version.as_deref()
    }

    pub fn is_required(&self) -> bool {
        self.required_version.is_some()
    }

    pub fn is_installed(&self) -> bool {
        self.installed_version.is_some()
    }

    pub fn is_installed_by_reference(&self) -> bool {
        self.installed_reference.is_some()
    }

    pub fn is_updatable(&self) -> bool {
        self.updatable_version.is_some()
    }

    /// The installed identity used for comparison: the commit reference for
    /// branch pins, the locked version otherwise.
    pub fn installed_identity(&self) -> Option<&str> {
        self.installed_reference
            .as_deref()
            .or(self.installed_version.as_deref())
    }

    pub fn mark_required(&mut self, constraint: impl Into<String>) {
        self.required_version = Some(constraint.into());
    }

    pub fn mark_installed(&mut self, version: impl Into<String>) {
        let version = version.into();
        if self.installed_version.as_deref() != Some(version.as_str()) {
            self.installed_reference = None;
        }
        self.installed_version = Some(version);
    }

    pub fn mark_installed_by_reference(&mut self, reference: impl Into<String>) {
        self.installed_reference = Some(reference.into());
    }

    pub fn mark_updatable(&mut self, version: impl Into<String>) {
        self.updatable_version = Some(version.into());
    }

    pub fn compare_mode(&self) -> CompareMode {
        if self.is_installed_by_reference() {
            CompareMode::Reference
        } else {
            CompareMode::Semantic
        }
    }

    /// Whether `candidate` is strictly newer than what is installed.
    pub fn is_later_version(&self, candidate: &str) -> Result<bool, VersionError> {
        let installed = self.installed_identity().ok_or(VersionError::NotInstalled)?;
        is_later(self.compare_mode(), installed, candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCKED_REF: &str = "abc1234567890abcdef1234567890abcdef12345";
    const NEWER_REF: &str = "def4567890abcdef1234567890abcdef12345678";

    #[test]
    fn marks_accumulate_on_one_package() {
        let mut package = Package::new(ManagerId::Composer, "vendor/a");
        assert!(!package.is_required());
        assert!(!package.is_installed());

        package.mark_required("^1.0");
        package.mark_installed("1.0.0");
        package.mark_updatable("1.2.0");

        assert_eq!(package.name(), "vendor/a");
        assert_eq!(package.manager(), ManagerId::Composer);
        assert_eq!(package.required_version(), Some("^1.0"));
        assert_eq!(package.installed_version(), Some("1.0.0"));
        assert_eq!(package.updatable_version(), Some("1.2.0"));
        assert!(!package.is_installed_by_reference());
    }

    #[test]
    fn repeated_marks_with_same_arguments_are_idempotent() {
        let mut package = Package::new(ManagerId::Composer, "vendor/a");
        package.mark_required("^1.0");
        package.mark_installed("dev-main");
        package.mark_installed_by_reference(LOCKED_REF);
        package.mark_updatable(NEWER_REF);
        let first = package.clone();

        package.mark_required("^1.0");
        package.mark_installed("dev-main");
        package.mark_updatable(NEWER_REF);

        assert_eq!(package, first);
        assert_eq!(package.installed_reference(), Some(LOCKED_REF));
    }

    #[test]
    fn installing_a_different_version_drops_the_reference() {
        let mut package = Package::new(ManagerId::Composer, "vendor/a");
        package.mark_installed("dev-main");
        package.mark_installed_by_reference(LOCKED_REF);

        package.mark_installed("1.4.0");

        assert!(!package.is_installed_by_reference());
        assert_eq!(package.installed_identity(), Some("1.4.0"));
    }

    #[test]
    fn is_later_version_uses_semantic_mode_for_releases() {
        let mut package = Package::new(ManagerId::Composer, "vendor/a");
        package.mark_installed("v1.0.0");

        assert_eq!(package.compare_mode(), CompareMode::Semantic);
        assert_eq!(package.is_later_version("1.2.0"), Ok(true));
        assert_eq!(package.is_later_version("1.0"), Ok(false));
        assert!(package.is_later_version("not-a-version").is_err());
    }

    #[test]
    fn is_later_version_uses_reference_mode_for_branch_pins() {
        let mut package = Package::new(ManagerId::Composer, "vendor/a");
        package.mark_installed("dev-main");
        package.mark_installed_by_reference(LOCKED_REF);

        assert_eq!(package.compare_mode(), CompareMode::Reference);
        assert_eq!(package.installed_identity(), Some(LOCKED_REF));
        assert_eq!(package.is_later_version(NEWER_REF), Ok(true));
        assert_eq!(package.is_later_version(LOCKED_REF), Ok(false));
    }

    #[test]
    fn is_later_version_requires_an_installed_version() {
        let package = Package::new(ManagerId::Npm, "left-pad");
        assert_eq!(
            package.is_later_version("1.3.0"),
            Err(VersionError::NotInstalled)
        );
    }
}
