use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::managers::Manager;
use crate::models::{CoreError, CoreErrorKind, ManagerId, Package, PackageRef};

pub type CheckResult<T> = Result<T, CoreError>;

/// What a check does when one manager fails.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort on the first failure; no report is produced.
    #[default]
    FailFast,
    /// Record the failure in the report and carry on with the other managers.
    Isolate,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct UpdatableEntry {
    pub manager: ManagerId,
    pub package: String,
    pub required_version: Option<String>,
    pub installed_version: Option<String>,
    pub installed_reference: Option<String>,
    pub updatable_version: String,
}

impl UpdatableEntry {
    fn from_package(package: &Package) -> Option<Self> {
        Some(Self {
            manager: package.manager(),
            package: package.name().to_string(),
            required_version: package.required_version().map(str::to_string),
            installed_version: package.installed_version().map(str::to_string),
            installed_reference: package.installed_reference().map(str::to_string),
            updatable_version: package.updatable_version()?.to_string(),
        })
    }

    pub fn is_by_reference(&self) -> bool {
        self.installed_reference.is_some()
    }

    /// Installed reference for branch pins, installed version otherwise.
    pub fn installed(&self) -> &str {
        self.installed_reference
            .as_deref()
            .or(self.installed_version.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ManagerSummary {
    pub manager: ManagerId,
    pub checked: usize,
    pub updatable: usize,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ManagerFailure {
    pub manager: ManagerId,
    pub kind: CoreErrorKind,
    pub message: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CheckReport {
    pub entries: Vec<UpdatableEntry>,
    pub summaries: Vec<ManagerSummary>,
    pub failures: Vec<ManagerFailure>,
}

impl CheckReport {
    pub fn has_updates(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Runs a set of managers and merges their updatable packages into one report.
///
/// Managers are checked in registration order and each one is registered at
/// most once. The runner borrows managers for one check; build fresh managers
/// for the next one, since their discovery results are memoized.
#[derive(Default)]
pub struct CheckRunner {
    managers: Vec<Arc<dyn Manager>>,
    policy: FailurePolicy,
}

impl CheckRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn register(&mut self, manager: Arc<dyn Manager>) -> CheckResult<()> {
        if self.managers.iter().any(|known| known.id() == manager.id()) {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("manager '{}' is already registered", manager.name()),
            ));
        }
        self.managers.push(manager);
        Ok(())
    }

    pub fn manager_ids(&self) -> Vec<ManagerId> {
        self.managers.iter().map(|manager| manager.id()).collect()
    }

    pub fn run(&self) -> CheckResult<CheckReport> {
        if self.managers.is_empty() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "no managers configured for the check",
            ));
        }

        let mut report = CheckReport::default();
        let mut seen: HashSet<PackageRef> = HashSet::new();

        for manager in &self.managers {
            match check_manager(manager.as_ref()) {
                Ok((updatable, checked)) => {
                    let before = report.entries.len();
                    for package in &updatable {
                        if !seen.insert(package.package_ref().clone()) {
                            continue;
                        }
                        if let Some(entry) = UpdatableEntry::from_package(package) {
                            report.entries.push(entry);
                        }
                    }

                    let summary = ManagerSummary {
                        manager: manager.id(),
                        checked,
                        updatable: report.entries.len() - before,
                    };
                    tracing::info!(
                        manager = manager.name(),
                        checked = summary.checked,
                        updatable = summary.updatable,
                        "manager check finished"
                    );
                    report.summaries.push(summary);
                }
                Err(error) => match self.policy {
                    FailurePolicy::FailFast => {
                        tracing::error!(manager = manager.name(), kind = ?error.kind, "{}", error.message);
                        return Err(error);
                    }
                    FailurePolicy::Isolate => {
                        tracing::warn!(manager = manager.name(), kind = ?error.kind, "{}", error.message);
                        report.failures.push(ManagerFailure {
                            manager: manager.id(),
                            kind: error.kind,
                            message: error.message,
                        });
                    }
                },
            }
        }

        Ok(report)
    }
}

fn check_manager(manager: &dyn Manager) -> CheckResult<(Vec<Package>, usize)> {
    let updatable = manager.find_updatable_packages()?;
    let checked = manager.find_required_packages()?.len();
    Ok((updatable, checked))
}
