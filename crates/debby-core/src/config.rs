use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::execution::ProcessExecutor;
use crate::managers::{ComposerManager, NpmManager, ProcessComposerSource, ProcessNpmSource};
use crate::models::{CoreError, CoreErrorKind, ManagerId};
use crate::orchestration::{CheckResult, CheckRunner, FailurePolicy};

/// Timeout for a single tool invocation (60 seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_LOOKUP_CONCURRENCY: usize = 1;

/// Settings for one check run. Every field has a default, so a config file
/// only needs to name what it changes.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CheckConfig {
    pub root_dir: PathBuf,
    pub timeout_secs: u64,
    pub lookup_concurrency: usize,
    pub failure_policy: FailurePolicy,
    pub composer: BackendConfig,
    pub npm: BackendConfig,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            lookup_concurrency: DEFAULT_LOOKUP_CONCURRENCY,
            failure_policy: FailurePolicy::default(),
            composer: BackendConfig::default(),
            npm: BackendConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// `None` checks the backend only when its manifest exists in the root.
    pub enabled: Option<bool>,
    /// Replaces the ecosystem tool found on `PATH`.
    pub executable: Option<PathBuf>,
}

impl CheckConfig {
    pub fn load(path: &Path) -> CheckResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|error| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("can not read config file {}: {error}", path.display()),
            )
        })?;
        Self::from_json(&contents).map_err(|error| {
            CoreError::new(
                error.kind,
                format!("{}: {}", path.display(), error.message),
            )
        })
    }

    pub fn from_json(contents: &str) -> CheckResult<Self> {
        serde_json::from_str(contents).map_err(|error| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("invalid config: {error}"),
            )
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backend(&self, manager: ManagerId) -> &BackendConfig {
        match manager {
            ManagerId::Composer => &self.composer,
            ManagerId::Npm => &self.npm,
        }
    }

    /// Managers to check: explicitly enabled ones plus, when left unset, those
    /// whose manifest is present in `root_dir`.
    pub fn enabled_managers(&self) -> Vec<ManagerId> {
        ManagerId::ALL
            .into_iter()
            .filter(|manager| match self.backend(*manager).enabled {
                Some(enabled) => enabled,
                None => self
                    .root_dir
                    .join(manager.descriptor().manifest_file)
                    .is_file(),
            })
            .collect()
    }

    pub fn validate(&self) -> CheckResult<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(invalid("root_dir must not be empty"));
        }
        if self.timeout_secs == 0 {
            return Err(invalid("timeout_secs must be greater than zero"));
        }
        if self.lookup_concurrency == 0 {
            return Err(invalid("lookup_concurrency must be at least 1"));
        }
        for manager in ManagerId::ALL {
            if let Some(executable) = &self.backend(manager).executable
                && executable.as_os_str().is_empty()
            {
                return Err(invalid(&format!(
                    "{} executable must not be empty",
                    manager.as_str()
                )));
            }
        }
        if self.enabled_managers().is_empty() {
            return Err(invalid(&format!(
                "no manager is enabled and no manifest was found in {}",
                self.root_dir.display()
            )));
        }
        Ok(())
    }

    /// Fresh managers for every enabled backend, registered in a runner.
    pub fn build_runner(&self, executor: Arc<dyn ProcessExecutor>) -> CheckResult<CheckRunner> {
        self.validate()?;

        let mut runner = CheckRunner::new().with_policy(self.failure_policy);
        for manager in self.enabled_managers() {
            let executable = self.backend(manager).executable.clone();
            match manager {
                ManagerId::Composer => {
                    let source =
                        ProcessComposerSource::new(executor.clone(), &self.root_dir, self.timeout())
                            .with_executable(executable);
                    runner.register(Arc::new(
                        ComposerManager::new(&self.root_dir, source)
                            .with_lookup_concurrency(self.lookup_concurrency),
                    ))?;
                }
                ManagerId::Npm => {
                    let source =
                        ProcessNpmSource::new(executor.clone(), &self.root_dir, self.timeout())
                            .with_executable(executable);
                    runner.register(Arc::new(
                        NpmManager::new(&self.root_dir, source)
                            .with_lookup_concurrency(self.lookup_concurrency),
                    ))?;
                }
            }
        }

        tracing::debug!(
            root = %self.root_dir.display(),
            managers = ?runner.manager_ids(),
            "check configured"
        );
        Ok(runner)
    }
}

fn invalid(message: &str) -> CoreError {
    CoreError::new(CoreErrorKind::InvalidInput, message)
}
