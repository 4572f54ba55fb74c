pub mod composer;
pub mod composer_process;
pub mod manager;
pub mod npm;
pub mod npm_process;
pub(crate) mod process_utils;
pub(crate) mod project;
pub mod state;

pub use composer::{
    ComposerManager, ComposerSource, composer_command, composer_show_request,
    extract_latest_reference, extract_latest_version, parse_composer_lock,
    parse_composer_manifest,
};
pub use composer_process::ProcessComposerSource;
pub use manager::{Manager, ManagerResult, PackageHandle};
pub use npm::{
    NpmLockedPackage, NpmManager, NpmSource, extract_head_reference, extract_view_version,
    git_ls_remote_request, npm_view_request, parse_npm_lock, parse_npm_manifest,
};
pub use npm_process::ProcessNpmSource;
pub use state::{LockedEntry, ManagerState, RequiredEntry};
