use std::sync::{Arc, Mutex};

use crate::models::{CoreError, ManagerId, Package};

pub type ManagerResult<T> = Result<T, CoreError>;

/// Shared handle to the single `Package` instance a manager keeps per name.
pub type PackageHandle = Arc<Mutex<Package>>;

/// One package ecosystem backend.
///
/// Discovery runs in a fixed chain: required packages come from the manifest,
/// installed packages from the lock artifact, and updatable packages from the
/// ecosystem's own tool for every required package. Each set is computed at most
/// once per manager instance; construct a new manager for a new check.
pub trait Manager: Send + Sync {
    fn id(&self) -> ManagerId;

    fn name(&self) -> &'static str {
        self.id().as_str()
    }

    /// Lookup-or-create; repeated calls return the same shared instance.
    fn package_by_name(&self, name: &str) -> PackageHandle;

    fn find_required_packages(&self) -> ManagerResult<Vec<Package>>;

    fn find_installed_packages(&self) -> ManagerResult<Vec<Package>>;

    /// Required packages for which the ecosystem reports something strictly
    /// newer than what is installed.
    fn find_updatable_packages(&self) -> ManagerResult<Vec<Package>>;
}
