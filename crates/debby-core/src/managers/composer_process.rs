use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::execution::ProcessExecutor;
use crate::managers::composer::{ComposerSource, composer_show_request};
use crate::managers::manager::ManagerResult;
use crate::managers::process_utils::run_and_collect_stdout;

pub struct ProcessComposerSource {
    executor: Arc<dyn ProcessExecutor>,
    root: PathBuf,
    executable: Option<PathBuf>,
    timeout: Duration,
}

impl ProcessComposerSource {
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

impl ComposerSource for ProcessComposerSource {
    fn show_all(&self, name: &str) -> ManagerResult<String> {
        let request =
            composer_show_request(&self.root, self.executable.as_deref(), name, self.timeout);
        run_and_collect_stdout(self.executor.as_ref(), request)
    }
}
