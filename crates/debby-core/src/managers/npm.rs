use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::execution::{CommandSpec, ProcessSpawnRequest};
use crate::managers::manager::{Manager, ManagerResult, PackageHandle};
use crate::managers::project::{parse_json, read_project_file};
use crate::managers::state::{LockedEntry, ManagerState, RequiredEntry};
use crate::models::{CoreError, CoreErrorKind, ManagerAction, ManagerId, Package};

const NPM_COMMAND: &str = "npm";
const GIT_COMMAND: &str = "git";
const NODE_MODULES_PREFIX: &str = "node_modules/";
const LOCAL_SPECIFIERS: &[&str] = &["file:", "link:", "workspace:"];

pub trait NpmSource: Send + Sync {
    /// Output of `npm view <name> version`.
    fn view_version(&self, name: &str) -> ManagerResult<String>;

    /// Output of `git ls-remote <repository> HEAD`.
    fn ls_remote_head(&self, repository: &str) -> ManagerResult<String>;
}

/// An installed package as recorded in `package-lock.json`, together with the
/// repository it was cloned from when it is pinned to a git commit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NpmLockedPackage {
    pub entry: LockedEntry,
    pub repository: Option<String>,
}

pub struct NpmManager<S: NpmSource> {
    root: PathBuf,
    source: S,
    lookup_concurrency: usize,
    state: ManagerState,
    repositories: Mutex<HashMap<String, String>>,
}

impl<S: NpmSource> NpmManager<S> {
    pub fn new(root: impl Into<PathBuf>, source: S) -> Self {
        Self {
            root: root.into(),
            source,
            lookup_concurrency: 1,
            state: ManagerState::new(ManagerId::Npm),
            repositories: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_lookup_concurrency(mut self, concurrency: usize) -> Self {
        self.lookup_concurrency = concurrency.max(1);
        self
    }

    fn repository_of(&self, name: &str) -> Option<String> {
        self.repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn latest_release(&self, package: &Package) -> ManagerResult<String> {
        let latest = if package.is_installed_by_reference() {
            let repository = self.repository_of(package.name()).ok_or_else(|| {
                error(
                    ManagerAction::FindUpdatable,
                    CoreErrorKind::LockMalformed,
                    format!(
                        "{} is pinned to a commit but {} records no repository for it",
                        package.name(),
                        lock_file()
                    ),
                )
            })?;
            extract_head_reference(&self.source.ls_remote_head(&repository)?)
        } else {
            extract_view_version(&self.source.view_version(package.name())?)
        };

        latest.ok_or_else(|| {
            error(
                ManagerAction::FindUpdatable,
                CoreErrorKind::VersionNotFound,
                format!("can not find out latest release for {}", package.name()),
            )
        })
    }
}

impl<S: NpmSource> Manager for NpmManager<S> {
    fn id(&self) -> ManagerId {
        ManagerId::Npm
    }

    fn package_by_name(&self, name: &str) -> PackageHandle {
        self.state.package_by_name(name)
    }

    fn find_required_packages(&self) -> ManagerResult<Vec<Package>> {
        self.state.find_required(|| {
            let contents = read_project_file(
                ManagerId::Npm,
                ManagerAction::FindRequired,
                &self.root,
                manifest_file(),
                CoreErrorKind::ConfigNotFound,
                CoreErrorKind::ConfigMalformed,
            )?;
            parse_npm_manifest(&contents)
        })
    }

    fn find_installed_packages(&self) -> ManagerResult<Vec<Package>> {
        self.state.find_installed(|| {
            let contents = read_project_file(
                ManagerId::Npm,
                ManagerAction::FindInstalled,
                &self.root,
                lock_file(),
                CoreErrorKind::LockNotFound,
                CoreErrorKind::LockMalformed,
            )?;
            let locked = parse_npm_lock(&contents)?;

            let mut repositories = self
                .repositories
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Ok(locked
                .into_iter()
                .map(|package| {
                    if let Some(repository) = package.repository {
                        repositories.insert(package.entry.name.clone(), repository);
                    }
                    package.entry
                })
                .collect())
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
    ManagerId::Npm.descriptor().manifest_file
}

fn lock_file() -> &'static str {
    ManagerId::Npm.descriptor().lock_file
}

pub fn npm_view_request(
    root: &Path,
    executable: Option<&Path>,
    name: &str,
    timeout: Duration,
) -> ProcessSpawnRequest {
    let program = executable.map_or_else(|| PathBuf::from(NPM_COMMAND), Path::to_path_buf);
    let command = CommandSpec::new(program)
        .args(["view", name, "version"])
        .env("NPM_CONFIG_UPDATE_NOTIFIER", "false")
        .working_dir(root);
    ProcessSpawnRequest::new(ManagerId::Npm, ManagerAction::FindUpdatable, command).timeout(timeout)
}

pub fn git_ls_remote_request(root: &Path, repository: &str, timeout: Duration) -> ProcessSpawnRequest {
    let command = CommandSpec::new(GIT_COMMAND)
        .args(["ls-remote", repository, "HEAD"])
        .env("GIT_TERMINAL_PROMPT", "0")
        .working_dir(root);
    ProcessSpawnRequest::new(ManagerId::Npm, ManagerAction::FindUpdatable, command).timeout(timeout)
}

/// Registry dependencies from the `dependencies` map of `package.json`.
pub fn parse_npm_manifest(contents: &str) -> ManagerResult<Vec<RequiredEntry>> {
    let action = ManagerAction::FindRequired;
    let json = parse_json(
        ManagerId::Npm,
        action,
        manifest_file(),
        contents,
        CoreErrorKind::ConfigMalformed,
    )?;

    let dependencies = match json.get("dependencies") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => {
            return Err(error(
                action,
                CoreErrorKind::ConfigMalformed,
                format!("'dependencies' in {} must be an object", manifest_file()),
            ));
        }
    };

    let mut entries = Vec::new();
    for (name, specifier) in dependencies.into_iter().flatten() {
        let Some(specifier) = specifier.as_str() else {
            return Err(error(
                action,
                CoreErrorKind::ConfigMalformed,
                format!("version specifier of {name} must be a string"),
            ));
        };

        let specifier = specifier.trim();
        if LOCAL_SPECIFIERS
            .iter()
            .any(|prefix| specifier.starts_with(prefix))
        {
            continue;
        }

        entries.push(RequiredEntry {
            name: name.clone(),
            constraint: specifier.to_string(),
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

#[derive(Debug, Default, Deserialize)]
struct NpmLockFile {
    #[serde(default)]
    packages: Option<Map<String, Value>>,
    #[serde(default)]
    dependencies: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct NpmLockRecord {
    version: Option<String>,
    resolved: Option<String>,
    #[serde(default)]
    link: bool,
}

/// Top-level installed packages from `package-lock.json`.
///
/// Lockfile v2/v3 lists them under `packages` keyed by `node_modules/<name>`;
/// v1 only has the `dependencies` tree. Nested `node_modules` and workspace
/// links are not direct installs and are skipped.
pub fn parse_npm_lock(contents: &str) -> ManagerResult<Vec<NpmLockedPackage>> {
    let action = ManagerAction::FindInstalled;
    let json = parse_json(
        ManagerId::Npm,
        action,
        lock_file(),
        contents,
        CoreErrorKind::LockMalformed,
    )?;
    let lock = NpmLockFile::deserialize(&json).map_err(|err| {
        error(
            action,
            CoreErrorKind::LockMalformed,
            format!("{} has an unexpected layout: {err}", lock_file()),
        )
    })?;

    let records: Vec<(&str, &Value)> = match (&lock.packages, &lock.dependencies) {
        (Some(packages), _) if packages.keys().any(|key| key.starts_with(NODE_MODULES_PREFIX)) => {
            packages
                .iter()
                .filter_map(|(key, record)| {
                    let name = key.strip_prefix(NODE_MODULES_PREFIX)?;
                    (!name.contains("/node_modules/")).then_some((name, record))
                })
                .collect()
        }
        (_, Some(dependencies)) => dependencies
            .iter()
            .map(|(name, record)| (name.as_str(), record))
            .collect(),
        _ => Vec::new(),
    };

    let mut locked = Vec::with_capacity(records.len());
    for (name, record) in records {
        let record = NpmLockRecord::deserialize(record).map_err(|err| {
            error(
                action,
                CoreErrorKind::LockMalformed,
                format!("{name} in {} is not a package record: {err}", lock_file()),
            )
        })?;
        if record.link {
            continue;
        }

        let version = record
            .version
            .as_deref()
            .map(str::trim)
            .filter(|version| !version.is_empty())
            .ok_or_else(|| {
                error(
                    action,
                    CoreErrorKind::LockMalformed,
                    format!("{name} in {} has no version", lock_file()),
                )
            })?;

        let git_source = [Some(version), record.resolved.as_deref()]
            .into_iter()
            .flatten()
            .find(|source| is_git_source(source));

        let (reference, repository) = match git_source {
            Some(source) => {
                let (repository, reference) = split_git_source(source).ok_or_else(|| {
                    error(
                        action,
                        CoreErrorKind::LockMalformed,
                        format!(
                            "{name} is installed from git in {} without a commit reference",
                            lock_file()
                        ),
                    )
                })?;
                (Some(reference), Some(repository))
            }
            None => (None, None),
        };

        locked.push(NpmLockedPackage {
            entry: LockedEntry {
                name: name.to_string(),
                version: version.to_string(),
                reference,
            },
            repository,
        });
    }

    if locked.is_empty() {
        return Err(error(
            action,
            CoreErrorKind::LockMalformed,
            format!("{} is missing its packages", lock_file()),
        ));
    }

    Ok(locked)
}

fn is_git_source(source: &str) -> bool {
    source.starts_with("git+") || source.starts_with("git://")
}

/// Split `git+ssh://host/repo.git#<sha>` into the cloneable URL and the sha.
fn split_git_source(source: &str) -> Option<(String, String)> {
    let (url, fragment) = source.split_once('#')?;
    let is_sha = fragment.len() == 40 && fragment.bytes().all(|b| b.is_ascii_hexdigit());
    if !is_sha {
        return None;
    }

    let url = url.strip_prefix("git+").unwrap_or(url);
    Some((url.to_string(), fragment.to_ascii_lowercase()))
}

/// The version printed by `npm view <name> version`.
pub fn extract_view_version(output: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?mR)^\s*v?([0-9]+\.[0-9]+(?:\.[0-9]+)?)\s*$")
            .expect("npm view version pattern is valid")
    });

    pattern
        .captures(output)
        .and_then(|captures| captures.get(1))
        .map(|version| version.as_str().to_string())
}

/// The commit `HEAD` points at in `git ls-remote <repository> HEAD` output.
pub fn extract_head_reference(output: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?mR)^([a-f0-9]{40})\s+HEAD$").expect("ls-remote head pattern is valid")
    });

    pattern
        .captures(output)
        .and_then(|captures| captures.get(1))
        .map(|reference| reference.as_str().to_string())
}

fn error(action: ManagerAction, kind: CoreErrorKind, message: String) -> CoreError {
    CoreError::for_manager(ManagerId::Npm, action, kind, message)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const MANIFEST_FIXTURE: &str = include_str!("../../tests/fixtures/npm/package.json");
    const LOCK_FIXTURE: &str = include_str!("../../tests/fixtures/npm/package-lock.json");
    const LOCK_V1_FIXTURE: &str = include_str!("../../tests/fixtures/npm/package-lock-v1.json");
    const LS_REMOTE_FIXTURE: &str = include_str!("../../tests/fixtures/npm/ls_remote_head.txt");

    const WIDGETS_LOCKED_REF: &str = "5d41402abc4b2a76b9719d911017c592b8a1c3f0";
    const WIDGETS_LATEST_REF: &str = "7b52009b64fd0a2a49e6d8a939753077792b0554";
    const WIDGETS_REPOSITORY: &str = "ssh://git@github.com/acme/widgets.git";

    #[test]
    fn view_version_extraction() {
        assert_eq!(extract_view_version("4.19.2\n").as_deref(), Some("4.19.2"));
        assert_eq!(extract_view_version("  v1.2\r\n").as_deref(), Some("1.2"));
        assert_eq!(extract_view_version("5.0.0-beta.1\n"), None);
        assert_eq!(extract_view_version(""), None);
    }

    #[test]
    fn head_reference_extraction() {
        assert_eq!(
            extract_head_reference(LS_REMOTE_FIXTURE).as_deref(),
            Some(WIDGETS_LATEST_REF)
        );
        assert_eq!(
            extract_head_reference(&format!("{WIDGETS_LATEST_REF}\trefs/heads/main\n")),
            None
        );
    }

    #[test]
    fn manifest_skips_local_specifiers() {
        let entries = parse_npm_manifest(MANIFEST_FIXTURE).unwrap();
        let names: Vec<&str> = entries.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["express", "lodash", "widgets"]);
        assert_eq!(entries[2].constraint, "github:acme/widgets");
    }

    #[test]
    fn manifest_without_registry_dependencies_is_rejected() {
        for manifest in [
            r#"{"name": "app"}"#,
            r#"{"dependencies": {}}"#,
            r#"{"dependencies": {"shared": "file:../shared", "ui": "workspace:*"}}"#,
        ] {
            let error = parse_npm_manifest(manifest).unwrap_err();
            assert_eq!(error.kind, CoreErrorKind::NoRequirements, "{manifest}");
        }

        let error = parse_npm_manifest(r#"{"dependencies": ["express"]}"#).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::ConfigMalformed);
    }

    #[test]
    fn lock_v3_lists_top_level_packages_only() {
        let locked = parse_npm_lock(LOCK_FIXTURE).unwrap();
        let names: Vec<&str> = locked
            .iter()
            .map(|package| package.entry.name.as_str())
            .collect();
        assert_eq!(names, vec!["express", "lodash", "widgets", "jest"]);

        let widgets = &locked[2];
        assert_eq!(widgets.entry.version, "1.4.0");
        assert_eq!(widgets.entry.reference.as_deref(), Some(WIDGETS_LOCKED_REF));
        assert_eq!(widgets.repository.as_deref(), Some(WIDGETS_REPOSITORY));
        assert_eq!(locked[0].repository, None);
    }

    #[test]
    fn lock_v1_reads_dependency_tree() {
        let locked = parse_npm_lock(LOCK_V1_FIXTURE).unwrap();
        assert_eq!(locked.len(), 3);
        assert_eq!(locked[0].entry.name, "express");
        assert_eq!(locked[0].entry.version, "4.18.2");

        let widgets = &locked[2];
        assert!(widgets.entry.version.starts_with("git+ssh://"));
        assert_eq!(widgets.entry.reference.as_deref(), Some(WIDGETS_LOCKED_REF));
        assert_eq!(widgets.repository.as_deref(), Some(WIDGETS_REPOSITORY));
    }

    #[test]
    fn lock_structure_errors_are_malformed() {
        for lock in [
            r#"{"lockfileVersion": 3}"#,
            r#"{"packages": {"": {"name": "app"}}}"#,
            r#"{"packages": {"node_modules/a": {"resolved": "https://r/a.tgz"}}}"#,
            r#"{"packages": {"node_modules/a": "1.0.0"}}"#,
            r#"{"dependencies": {"a": {"version": "git+ssh://git@github.com/x/a.git#main"}}}"#,
            r#"{"packages": []}"#,
        ] {
            let error = parse_npm_lock(lock).unwrap_err();
            assert_eq!(error.kind, CoreErrorKind::LockMalformed, "{lock}");
        }
    }

    #[test]
    fn view_request_disables_update_notifier() {
        let request = npm_view_request(
            Path::new("/srv/app"),
            Some(Path::new("/opt/node/bin/npm")),
            "express",
            Duration::from_secs(20),
        );
        assert_eq!(request.command.program, PathBuf::from("/opt/node/bin/npm"));
        assert_eq!(request.command.args, vec!["view", "express", "version"]);
        assert_eq!(
            request
                .command
                .env
                .get("NPM_CONFIG_UPDATE_NOTIFIER")
                .map(String::as_str),
            Some("false")
        );

        let request = git_ls_remote_request(
            Path::new("/srv/app"),
            WIDGETS_REPOSITORY,
            Duration::from_secs(20),
        );
        assert_eq!(request.command.program, PathBuf::from("git"));
        assert_eq!(
            request.command.args,
            vec!["ls-remote", WIDGETS_REPOSITORY, "HEAD"]
        );
    }

    #[derive(Default)]
    struct StubNpmSource {
        versions: HashMap<String, String>,
        heads: HashMap<String, String>,
    }

    impl StubNpmSource {
        fn version(mut self, name: &str, output: &str) -> Self {
            self.versions.insert(name.to_string(), output.to_string());
            self
        }

        fn head(mut self, repository: &str, output: &str) -> Self {
            self.heads.insert(repository.to_string(), output.to_string());
            self
        }
    }

    impl NpmSource for StubNpmSource {
        fn view_version(&self, name: &str) -> ManagerResult<String> {
            self.versions.get(name).cloned().ok_or_else(|| {
                error(
                    ManagerAction::FindUpdatable,
                    CoreErrorKind::ToolInvocationFailed,
                    format!("npm ERR! 404 '{name}' is not in this registry."),
                )
            })
        }

        fn ls_remote_head(&self, repository: &str) -> ManagerResult<String> {
            self.heads.get(repository).cloned().ok_or_else(|| {
                error(
                    ManagerAction::FindUpdatable,
                    CoreErrorKind::ToolInvocationFailed,
                    format!("repository {repository} not found"),
                )
            })
        }
    }

    fn project(lock: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), MANIFEST_FIXTURE).unwrap();
        std::fs::write(dir.path().join("package-lock.json"), lock).unwrap();
        dir
    }

    #[test]
    fn finds_registry_and_git_updates() {
        let dir = project(LOCK_FIXTURE);
        let source = StubNpmSource::default()
            .version("express", "4.19.2\n")
            .version("lodash", "4.17.21\n")
            .head(WIDGETS_REPOSITORY, LS_REMOTE_FIXTURE);
        let manager = NpmManager::new(dir.path(), source).with_lookup_concurrency(2);

        let updatable = manager.find_updatable_packages().unwrap();

        assert_eq!(updatable.len(), 2);
        assert_eq!(updatable[0].name(), "express");
        assert_eq!(updatable[0].installed_version(), Some("4.18.2"));
        assert_eq!(updatable[0].updatable_version(), Some("4.19.2"));
        assert_eq!(updatable[1].name(), "widgets");
        assert_eq!(updatable[1].installed_reference(), Some(WIDGETS_LOCKED_REF));
        assert_eq!(updatable[1].updatable_version(), Some(WIDGETS_LATEST_REF));
    }

    #[test]
    fn git_pin_at_head_is_not_updatable() {
        let dir = project(LOCK_V1_FIXTURE);
        let source = StubNpmSource::default()
            .version("express", "4.18.2\n")
            .version("lodash", "4.17.21\n")
            .head(
                WIDGETS_REPOSITORY,
                &format!("{WIDGETS_LOCKED_REF}\tHEAD\n"),
            );
        let manager = NpmManager::new(dir.path(), source);

        assert!(manager.find_updatable_packages().unwrap().is_empty());
    }

    #[test]
    fn missing_lock_is_lock_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), MANIFEST_FIXTURE).unwrap();
        let manager = NpmManager::new(dir.path(), StubNpmSource::default());

        let error = manager.find_updatable_packages().unwrap_err();

        assert_eq!(error.kind, CoreErrorKind::LockNotFound);
        assert!(error.message.contains("package-lock.json"));
    }

    #[test]
    fn registry_failure_propagates() {
        let dir = project(LOCK_FIXTURE);
        let source = StubNpmSource::default()
            .version("express", "4.19.2\n")
            .head(WIDGETS_REPOSITORY, LS_REMOTE_FIXTURE);
        let manager = NpmManager::new(dir.path(), source);

        let error = manager.find_updatable_packages().unwrap_err();

        assert_eq!(error.kind, CoreErrorKind::ToolInvocationFailed);
        assert!(error.message.contains("lodash"));
    }
}
