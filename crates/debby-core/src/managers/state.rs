use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use crate::managers::manager::{ManagerResult, PackageHandle};
use crate::models::{CoreError, CoreErrorKind, ManagerAction, ManagerId, Package};

/// A `name => constraint` entry from a manifest, after backend filtering.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequiredEntry {
    pub name: String,
    pub constraint: String,
}

/// One record of a lock artifact.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LockedEntry {
    pub name: String,
    pub version: String,
    /// Commit reference, only for development-branch pins.
    pub reference: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Discovery {
    Required,
    Installed,
    Updatable,
}

impl Discovery {
    fn action(self) -> ManagerAction {
        match self {
            Discovery::Required => ManagerAction::FindRequired,
            Discovery::Installed => ManagerAction::FindInstalled,
            Discovery::Updatable => ManagerAction::FindUpdatable,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Discovery::Required => "required",
            Discovery::Installed => "installed",
            Discovery::Updatable => "updatable",
        }
    }
}

/// Package table and memoized discovery sets shared by every backend.
///
/// Each set is a slot holding the ordered package names once computed. The
/// slot mutex is held for the whole computation, so a set has a single writer
/// and is never computed twice. A failed computation leaves the slot empty.
pub struct ManagerState {
    manager: ManagerId,
    packages: Mutex<HashMap<String, PackageHandle>>,
    required: Mutex<Option<Vec<String>>>,
    installed: Mutex<Option<Vec<String>>>,
    updatable: Mutex<Option<Vec<String>>>,
}

impl ManagerState {
    pub fn new(manager: ManagerId) -> Self {
        Self {
            manager,
            packages: Mutex::new(HashMap::new()),
            required: Mutex::new(None),
            installed: Mutex::new(None),
            updatable: Mutex::new(None),
        }
    }

    pub fn manager(&self) -> ManagerId {
        self.manager
    }

    pub fn package_by_name(&self, name: &str) -> PackageHandle {
        let mut packages = lock(&self.packages);
        packages
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Package::new(self.manager, name))))
            .clone()
    }

    pub fn find_required<F>(&self, read_manifest: F) -> ManagerResult<Vec<Package>>
    where
        F: FnOnce() -> ManagerResult<Vec<RequiredEntry>>,
    {
        self.discover(Discovery::Required, || {
            let entries = read_manifest()?;
            let mut names = Vec::with_capacity(entries.len());
            for entry in entries {
                let handle = self.package_by_name(&entry.name);
                lock(&handle).mark_required(entry.constraint);
                names.push(entry.name);
            }
            Ok(names)
        })
    }

    pub fn find_installed<F>(&self, read_lock: F) -> ManagerResult<Vec<Package>>
    where
        F: FnOnce() -> ManagerResult<Vec<LockedEntry>>,
    {
        self.discover(Discovery::Installed, || {
            let entries = read_lock()?;
            let mut names = Vec::with_capacity(entries.len());
            for entry in entries {
                let handle = self.package_by_name(&entry.name);
                let mut package = lock(&handle);
                package.mark_installed(entry.version);
                if let Some(reference) = entry.reference {
                    package.mark_installed_by_reference(reference);
                }
                names.push(entry.name);
            }
            Ok(names)
        })
    }

    /// Resolve the latest candidate of every required package with `latest` and
    /// mark the packages for which it is strictly newer than the installed one.
    ///
    /// `required` must already be marked required and installed. Lookups run on
    /// up to `concurrency` scoped worker threads; packages are marked on the
    /// calling thread in `required` order.
    pub fn find_updatable<F>(
        &self,
        required: &[Package],
        lock_file: &str,
        concurrency: usize,
        latest: F,
    ) -> ManagerResult<Vec<Package>>
    where
        F: Fn(&Package) -> ManagerResult<String> + Sync,
    {
        self.discover(Discovery::Updatable, || {
            for package in required {
                if !package.is_installed() {
                    return Err(self.error(
                        Discovery::Updatable,
                        CoreErrorKind::LockMalformed,
                        format!(
                            "{} is required but not locked in {lock_file}",
                            package.name()
                        ),
                    ));
                }
            }

            let total = required.len();
            let candidates = lookup_all(self.manager, required, concurrency, &latest);

            let mut names = Vec::new();
            for (index, (package, candidate)) in required.iter().zip(candidates).enumerate() {
                tracing::debug!(
                    manager = self.manager.as_str(),
                    index = index + 1,
                    total,
                    package = package.name(),
                    "checked latest release"
                );

                let candidate = candidate?;
                let handle = self.package_by_name(package.name());
                let mut current = lock(&handle);

                let is_later = current.is_later_version(&candidate).map_err(|error| {
                    self.error(
                        Discovery::Updatable,
                        CoreErrorKind::VersionNotFound,
                        format!(
                            "can not compare latest release '{candidate}' of {}: {error}",
                            package.name()
                        ),
                    )
                })?;

                if is_later {
                    tracing::info!(
                        manager = self.manager.as_str(),
                        package = package.name(),
                        installed = current.installed_identity().unwrap_or_default(),
                        latest = %candidate,
                        "update available"
                    );
                    current.mark_updatable(candidate);
                    names.push(package.name().to_string());
                }
            }
            Ok(names)
        })
    }

    fn error(&self, action: Discovery, kind: CoreErrorKind, message: String) -> CoreError {
        CoreError::for_manager(self.manager, action.action(), kind, message)
    }

    fn discover<F>(&self, discovery: Discovery, compute: F) -> ManagerResult<Vec<Package>>
    where
        F: FnOnce() -> ManagerResult<Vec<String>>,
    {
        let mut slot = lock(self.slot(discovery));
        if let Some(names) = slot.as_ref() {
            return Ok(self.snapshot(names));
        }

        tracing::debug!(
            manager = self.manager.as_str(),
            "checking for {} packages",
            discovery.label()
        );

        let mut seen = HashSet::new();
        let names: Vec<String> = compute()?
            .into_iter()
            .filter(|name| seen.insert(name.clone()))
            .collect();

        tracing::debug!(
            manager = self.manager.as_str(),
            count = names.len(),
            "found {} packages",
            discovery.label()
        );

        let packages = self.snapshot(&names);
        *slot = Some(names);
        Ok(packages)
    }

    fn slot(&self, discovery: Discovery) -> &Mutex<Option<Vec<String>>> {
        match discovery {
            Discovery::Required => &self.required,
            Discovery::Installed => &self.installed,
            Discovery::Updatable => &self.updatable,
        }
    }

    fn snapshot(&self, names: &[String]) -> Vec<Package> {
        names
            .iter()
            .map(|name| lock(&self.package_by_name(name)).clone())
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `lookup` for every item, on up to `concurrency` scoped threads.
///
/// Results come back in item order. Workers enter the caller's tokio runtime,
/// if any, so process-backed lookups can block on it.
fn lookup_all<F>(
    manager: ManagerId,
    items: &[Package],
    concurrency: usize,
    lookup: &F,
) -> Vec<ManagerResult<String>>
where
    F: Fn(&Package) -> ManagerResult<String> + Sync,
{
    if concurrency <= 1 || items.len() <= 1 {
        return items.iter().map(lookup).collect();
    }

    let runtime = tokio::runtime::Handle::try_current().ok();
    let chunk_size = items.len().div_ceil(concurrency);

    thread::scope(|scope| {
        let workers: Vec<_> = items
            .chunks(chunk_size)
            .map(|chunk| {
                let runtime = runtime.clone();
                let handle = scope.spawn(move || {
                    let _guard = runtime.as_ref().map(|runtime| runtime.enter());
                    chunk.iter().map(lookup).collect::<Vec<_>>()
                });
                (chunk.len(), handle)
            })
            .collect();

        let mut results = Vec::with_capacity(items.len());
        for (len, worker) in workers {
            match worker.join() {
                Ok(chunk_results) => results.extend(chunk_results),
                Err(_) => results.extend((0..len).map(|_| {
                    Err(CoreError::for_manager(
                        manager,
                        ManagerAction::FindUpdatable,
                        CoreErrorKind::Internal,
                        "latest release lookup worker panicked",
                    ))
                })),
            }
        }
        results
    })
}
