use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::execution::ProcessExecutor;
use crate::managers::manager::ManagerResult;
use crate::managers::npm::{NpmSource, git_ls_remote_request, npm_view_request};
use crate::managers::process_utils::run_and_collect_stdout;

pub struct ProcessNpmSource {
    executor: Arc<dyn ProcessExecutor>,
    root: PathBuf,
    executable: Option<PathBuf>,
    timeout: Duration,
}

impl ProcessNpmSource {
    pub fn new(executor: Arc<dyn ProcessExecutor>, root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executor,
            root: root.into(),
            executable: None,
            timeout,
        }
    }

    pub fn with_executable(mut self, executable: Option<PathBuf>) -> Self {
        self.executable = executable;
        self
    }
}

impl NpmSource for ProcessNpmSource {
    fn view_version(&self, name: &str) -> ManagerResult<String> {
        let request = npm_view_request(&self.root, self.executable.as_deref(), name, self.timeout);
        run_and_collect_stdout(self.executor.as_ref(), request)
    }

    fn ls_remote_head(&self, repository: &str) -> ManagerResult<String> {
        let request = git_ls_remote_request(&self.root, repository, self.timeout);
        run_and_collect_stdout(self.executor.as_ref(), request)
    }
}
