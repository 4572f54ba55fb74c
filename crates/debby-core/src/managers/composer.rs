use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;

use crate::execution::{CommandSpec, ProcessSpawnRequest};
use crate::managers::manager::{Manager, ManagerResult, PackageHandle};
use crate::managers::project::{parse_json, read_project_file};
use crate::managers::state::{LockedEntry, ManagerState, RequiredEntry};
use crate::models::{CoreError, CoreErrorKind, ManagerAction, ManagerId, Package};

const COMPOSER_COMMAND: &str = "composer";
const PHP_COMMAND: &str = "php";
const BUNDLED_PHAR: &str = "composer.phar";
const DEV_BRANCH_PREFIX: &str = "dev-";
const DEV_BRANCH_SUFFIX: &str = "-dev";

pub trait ComposerSource: Send + Sync {
    /// Output of `composer show -a <name>` for the checked project.
    fn show_all(&self, name: &str) -> ManagerResult<String>;
}

pub struct ComposerManager<S: ComposerSource> {
    root: PathBuf,
    source: S,
    lookup_concurrency: usize,
    state: ManagerState,
}

impl<S: ComposerSource> ComposerManager<S> {
    pub fn new(root: impl Into<PathBuf>, source: S) -> Self {
        Self {
            root: root.into(),
            source,
            lookup_concurrency: 1,
            state: ManagerState::new(ManagerId::Composer),
        }
    }

    pub fn with_lookup_concurrency(mut self, concurrency: usize) -> Self {
        self.lookup_concurrency = concurrency.max(1);
        self
    }

    fn latest_release(&self, package: &Package) -> ManagerResult<String> {
        let output = self.source.show_all(package.name())?;
        let latest = if package.is_installed_by_reference() {
            extract_latest_reference(&output)
        } else {
            extract_latest_version(&output)
        };

        latest.ok_or_else(|| {
            CoreError::for_manager(
                ManagerId::Composer,
                ManagerAction::FindUpdatable,
                CoreErrorKind::VersionNotFound,
                format!("can not find out latest release for {}", package.name()),
            )
        })
    }
}

impl<S: ComposerSource> Manager for ComposerManager<S> {
    fn id(&self) -> ManagerId {
        ManagerId::Composer
    }

    fn package_by_name(&self, name: &str) -> PackageHandle {
        self.state.package_by_name(name)
    }

    fn find_required_packages(&self) -> ManagerResult<Vec<Package>> {
        self.state.find_required(|| {
            let contents = read_project_file(
                ManagerId::Composer,
                ManagerAction::FindRequired,
                &self.root,
                manifest_file(),
                CoreErrorKind::ConfigNotFound,
                CoreErrorKind::ConfigMalformed,
            )?;
            parse_composer_manifest(&contents)
        })
    }

    fn find_installed_packages(&self) -> ManagerResult<Vec<Package>> {
        self.state.find_installed(|| {
            let contents = read_project_file(
                ManagerId::Composer,
                ManagerAction::FindInstalled,
                &self.root,
                lock_file(),
                CoreErrorKind::LockNotFound,
                CoreErrorKind::LockMalformed,
            )?;
            parse_composer_lock(&contents)
        })
    }

    fn find_updatable_packages(&self) -> ManagerResult<Vec<Package>> {
        self.find_installed_packages()?;
        let required = self.find_required_packages()?;

        self.state.find_updatable(
            &required,
            lock_file(),
            self.lookup_concurrency,
            |package: &Package| self.latest_release(package),
        )
    }
}

fn manifest_file() -> &'static str {
    ManagerId::Composer.descriptor().manifest_file
}

fn lock_file() -> &'static str {
    ManagerId::Composer.descriptor().lock_file
}

/// Command used to inspect packages of the project at `root`.
///
/// An explicit executable wins, then a `composer.phar` bundled in the project
/// root, then `composer` from `PATH`. Phar archives are run through `php`.
pub fn composer_command(root: &Path, executable: Option<&Path>) -> CommandSpec {
    let command = match executable {
        Some(path) if path.extension().is_some_and(|ext| ext == "phar") => {
            CommandSpec::new(PHP_COMMAND).arg(path.to_string_lossy())
        }
        Some(path) => CommandSpec::new(path),
        None if root.join(BUNDLED_PHAR).is_file() => {
            CommandSpec::new(PHP_COMMAND).arg(BUNDLED_PHAR)
        }
        None => CommandSpec::new(COMPOSER_COMMAND),
    };

    command
        .env("COMPOSER_NO_INTERACTION", "1")
        .working_dir(root)
}

pub fn composer_show_request(
    root: &Path,
    executable: Option<&Path>,
    name: &str,
    timeout: Duration,
) -> ProcessSpawnRequest {
    let command = composer_command(root, executable).args(["show", "-a", name]);
    ProcessSpawnRequest::new(ManagerId::Composer, ManagerAction::FindUpdatable, command)
        .timeout(timeout)
}

/// Required packages from `composer.json`.
///
/// Platform entries (`php`, `ext-curl`, `lib-icu`, ...) carry no vendor prefix
/// and are not installable packages, so they are skipped.
pub fn parse_composer_manifest(contents: &str) -> ManagerResult<Vec<RequiredEntry>> {
    let action = ManagerAction::FindRequired;
    let json = parse_json(
        ManagerId::Composer,
        action,
        manifest_file(),
        contents,
        CoreErrorKind::ConfigMalformed,
    )?;

    let require = match json.get("require") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(Value::Array(list)) if list.is_empty() => None,
        Some(_) => {
            return Err(error(
                action,
                CoreErrorKind::ConfigMalformed,
                format!("'require' in {} must be an object", manifest_file()),
            ));
        }
    };

    let mut entries = Vec::new();
    for (name, constraint) in require.into_iter().flatten() {
        if !name.contains('/') {
            continue;
        }

        let Some(constraint) = constraint.as_str() else {
            return Err(error(
                action,
                CoreErrorKind::ConfigMalformed,
                format!("version constraint of {name} must be a string"),
            ));
        };

        entries.push(RequiredEntry {
            name: name.clone(),
            constraint: constraint.trim().to_string(),
        });
    }

    if entries.is_empty() {
        return Err(error(
            action,
            CoreErrorKind::NoRequirements,
            format!("there are no required packages to check in {}", manifest_file()),
        ));
    }

    Ok(entries)
}

/// Installed packages from `composer.lock`.
///
/// Branch versions (`dev-main`, `1.x-dev`) have no release number; their
/// identity is the locked source reference (falling back to the dist reference).
pub fn parse_composer_lock(contents: &str) -> ManagerResult<Vec<LockedEntry>> {
    let action = ManagerAction::FindInstalled;
    let json = parse_json(
        ManagerId::Composer,
        action,
        lock_file(),
        contents,
        CoreErrorKind::LockMalformed,
    )?;

    let packages = json
        .get("packages")
        .and_then(Value::as_array)
        .filter(|packages| !packages.is_empty())
        .ok_or_else(|| {
            error(
                action,
                CoreErrorKind::LockMalformed,
                format!("{} is missing its packages", lock_file()),
            )
        })?;

    let mut entries = Vec::with_capacity(packages.len());
    for (index, record) in packages.iter().enumerate() {
        let name = record
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                error(
                    action,
                    CoreErrorKind::LockMalformed,
                    format!("package #{index} in {} has no name", lock_file()),
                )
            })?;

        let version = record
            .get("version")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|version| !version.is_empty())
            .ok_or_else(|| {
                error(
                    action,
                    CoreErrorKind::LockMalformed,
                    format!("{name} in {} has no version", lock_file()),
                )
            })?;

        let reference = if is_branch_version(version) {
            let reference = ["source", "dist"]
                .iter()
                .filter_map(|key| record.get(*key))
                .filter_map(|source| source.get("reference").and_then(Value::as_str))
                .map(str::trim)
                .find(|reference| !reference.is_empty())
                .ok_or_else(|| {
                    error(
                        action,
                        CoreErrorKind::LockMalformed,
                        format!(
                            "{name} is locked to {version} in {} without a source reference",
                            lock_file()
                        ),
                    )
                })?;
            Some(reference.to_string())
        } else {
            None
        };

        entries.push(LockedEntry {
            name: name.to_string(),
            version: version.to_string(),
            reference,
        });
    }

    Ok(entries)
}

fn is_branch_version(version: &str) -> bool {
    version.starts_with(DEV_BRANCH_PREFIX) || version.ends_with(DEV_BRANCH_SUFFIX)
}

/// First version listed on the `versions :` line of `composer show -a`.
///
/// Listings start with the newest release; branch aliases such as `dev-main`
/// and pre-releases such as `2.0.0-beta1` are passed over.
pub fn extract_latest_version(output: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?mR)versions\s*:.+?v?([0-9]+\.[0-9]+(?:\.[0-9]+)?)(?:,|$)")
            .expect("composer versions pattern is valid")
    });

    pattern
        .captures(output)
        .and_then(|captures| captures.get(1))
        .map(|version| version.as_str().to_string())
}

/// Commit reference at the end of the `source :` line of `composer show -a`.
pub fn extract_latest_reference(output: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?mR)source\s*:.+ ([a-f0-9]{40})$")
            .expect("composer source pattern is valid")
    });

    pattern
        .captures(output)
        .and_then(|captures| captures.get(1))
        .map(|reference| reference.as_str().to_string())
}

fn error(action: ManagerAction, kind: CoreErrorKind, message: String) -> CoreError {
    CoreError::for_manager(ManagerId::Composer, action, kind, message)
}
